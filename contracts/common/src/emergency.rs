//! Emergency Module
//!
//! Normal ⇄ Emergency switch of the pool. Emergency mode freezes stake
//! changes and opens the full-exit path for every holder. Only the owner
//! flips it, through the pool manager.

use crate::errors::{PoolError, PoolResult};
use crate::types::{PoolState, PoolStatus};

/// Result of a status change request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status changed
    Changed { from: PoolStatus, to: PoolStatus },
    /// Already in the requested status
    Unchanged,
}

/// Sets emergency mode on or off
pub fn set_emergency(state: &mut PoolState, active: bool) -> Transition {
    let target = if active { PoolStatus::Emergency } else { PoolStatus::Normal };
    if state.status == target {
        return Transition::Unchanged;
    }
    let from = state.status;
    state.status = target;
    Transition::Changed { from, to: target }
}

/// Fails with `EmergencyActive` in emergency mode
pub fn ensure_normal(state: &PoolState) -> PoolResult<()> {
    match state.status {
        PoolStatus::Normal => Ok(()),
        PoolStatus::Emergency => Err(PoolError::EmergencyActive),
    }
}

/// Fails with `NotInEmergency` outside emergency mode
pub fn ensure_emergency(state: &PoolState) -> PoolResult<()> {
    match state.status {
        PoolStatus::Emergency => Ok(()),
        PoolStatus::Normal => Err(PoolError::NotInEmergency),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_round_trip() {
        let mut state = PoolState::new([0u8; 32], 50_000, 10);
        assert!(ensure_normal(&state).is_ok());
        assert_eq!(ensure_emergency(&state), Err(PoolError::NotInEmergency));

        let transition = set_emergency(&mut state, true);
        assert_eq!(
            transition,
            Transition::Changed { from: PoolStatus::Normal, to: PoolStatus::Emergency }
        );
        assert_eq!(ensure_normal(&state), Err(PoolError::EmergencyActive));
        assert!(ensure_emergency(&state).is_ok());

        assert_eq!(set_emergency(&mut state, true), Transition::Unchanged);
        set_emergency(&mut state, false);
        assert_eq!(state.status, PoolStatus::Normal);
    }
}
