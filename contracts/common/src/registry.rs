//! Holder Registry
//!
//! Bounded set of active stakers kept in insertion order. Liquidations and
//! bulk consolidation iterate it, so its bound is also the bound on their
//! per-command cost.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{PoolError, PoolResult};
use crate::types::{Address, Position};
use crate::Vec;

/// Registered stakers, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct HolderRegistry {
    holders: Vec<Address>,
}

impl HolderRegistry {
    pub fn new() -> Self {
        Self { holders: Vec::new() }
    }

    pub fn contains(&self, holder: &Address) -> bool {
        self.holders.contains(holder)
    }

    /// Registers `holder`, returning true when it was not yet present
    ///
    /// Fails with `HolderLimitExceeded` when a new holder would grow the
    /// registry past `limit`. Lowering the limit never evicts anyone.
    pub fn add(&mut self, holder: Address, limit: u32) -> PoolResult<bool> {
        if self.contains(&holder) {
            return Ok(false);
        }
        if self.holders.len() >= limit as usize {
            return Err(PoolError::HolderLimitExceeded { limit });
        }
        self.holders.push(holder);
        Ok(true)
    }

    /// Removes `holder`, returning true when it was present
    pub fn remove(&mut self, holder: &Address) -> bool {
        match self.holders.iter().position(|h| h == holder) {
            Some(index) => {
                self.holders.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.holders.iter()
    }

    /// Copy of the membership, for iteration while positions change
    pub fn snapshot(&self) -> Vec<Address> {
        self.holders.clone()
    }
}

/// True when a position holds nothing and can leave the registry
pub fn is_empty(position: &Position) -> bool {
    position.consolidated_tst.is_zero()
        && position.consolidated_euros.is_zero()
        && position.pending.is_empty()
        && position.rewards.is_empty()
}
