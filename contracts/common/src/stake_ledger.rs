//! Stake Ledger
//!
//! Per-holder pending and consolidated balances. A deposit waits in the
//! pending queue for one holding period from its own timestamp before it
//! counts toward the reward share or can be withdrawn.

use crate::constants::staking::MATURITY_PERIOD;
use crate::errors::{PoolError, PoolResult};
use crate::fee_accumulator;
use crate::math::{safe_add, safe_sub};
use crate::types::{PendingStake, PoolState, Position, Timestamp, U256};

/// Totals folded into the consolidated balance by one consolidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Consolidation {
    pub tst: U256,
    pub euros: U256,
    /// Number of pending entries that matured
    pub entries: u32,
}

impl Consolidation {
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

/// True once `stake` has been held for the full maturity period
pub fn is_matured(stake: &PendingStake, now: Timestamp) -> bool {
    now >= stake.deposited_at && now - stake.deposited_at >= MATURITY_PERIOD
}

/// Sum of the TST and EUROs still waiting to mature
pub fn pending_totals(position: &Position) -> PoolResult<(U256, U256)> {
    position
        .pending
        .iter()
        .try_fold((U256::zero(), U256::zero()), |(tst, euros), stake| {
            Ok((safe_add(tst, stake.tst)?, safe_add(euros, stake.euros)?))
        })
}

/// Folds matured pending entries into the consolidated balances
///
/// Entries mature independently; immature ones keep their order.
pub fn consolidate_matured(position: &mut Position, now: Timestamp) -> PoolResult<Consolidation> {
    let mut consolidation = Consolidation::default();
    if !position.pending.iter().any(|s| is_matured(s, now)) {
        return Ok(consolidation);
    }

    let mut remaining = crate::Vec::with_capacity(position.pending.len());
    for stake in position.pending.drain(..) {
        if is_matured(&stake, now) {
            consolidation.tst = safe_add(consolidation.tst, stake.tst)?;
            consolidation.euros = safe_add(consolidation.euros, stake.euros)?;
            consolidation.entries += 1;
        } else {
            remaining.push(stake);
        }
    }
    position.pending = remaining;
    position.consolidated_tst = safe_add(position.consolidated_tst, consolidation.tst)?;
    position.consolidated_euros = safe_add(position.consolidated_euros, consolidation.euros)?;

    Ok(consolidation)
}

/// Brings a position up to date: settle fees, then consolidate
///
/// Keeps `total_consolidated_tst` in step with the newly matured TST.
pub fn refresh(
    state: &mut PoolState,
    position: &mut Position,
    now: Timestamp,
) -> PoolResult<Consolidation> {
    fee_accumulator::settle(position, state.reward_accumulator)?;
    let consolidation = consolidate_matured(position, now)?;
    state.total_consolidated_tst = safe_add(state.total_consolidated_tst, consolidation.tst)?;
    Ok(consolidation)
}

/// Appends a pending deposit stamped `now`
pub fn record_stake(position: &mut Position, tst: U256, euros: U256, now: Timestamp) -> PoolResult<()> {
    if tst.is_zero() && euros.is_zero() {
        return Err(PoolError::ZeroAmount);
    }
    position.pending.push(PendingStake { tst, euros, deposited_at: now });
    Ok(())
}

/// Withdraws from the consolidated balances only
pub fn withdraw(position: &mut Position, tst: U256, euros: U256) -> PoolResult<()> {
    if tst > position.consolidated_tst || euros > position.consolidated_euros {
        return Err(PoolError::InvalidDecreaseAmount {
            requested_tst: tst,
            requested_euros: euros,
            consolidated_tst: position.consolidated_tst,
            consolidated_euros: position.consolidated_euros,
        });
    }
    position.consolidated_tst = safe_sub(position.consolidated_tst, tst)?;
    position.consolidated_euros = safe_sub(position.consolidated_euros, euros)?;
    Ok(())
}
