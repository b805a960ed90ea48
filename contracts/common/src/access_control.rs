//! Access Control Module
//!
//! Two roles gate the pool: the owner drives administrative changes
//! through the pool manager, and only the pool manager may push fees,
//! collateral and parameter changes into the pool.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{PoolError, PoolResult};
use crate::types::Address;

// ============================================================================
// Types
// ============================================================================

/// Protocol roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Administrator of the pool manager
    Owner,
    /// Contract that orchestrates the pool
    PoolManager,
}

/// Permission types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Change the stakers' share of fees
    SetPoolFeePercentage,
    /// Change the holder registry bound
    SetHolderLimit,
    /// Enter or leave emergency mode
    SetEmergency,
    /// Sweep unreserved collateral to the protocol wallet
    RefundAssets,
    /// Allocate manager collateral without a purchase
    RewardDrop,
    /// Credit fees to the pool accumulator
    DistributeFees,
    /// Allocate liquidated collateral to stakers
    DistributeAssets,
    /// Hand ownership to another address
    TransferOwnership,
}

impl Permission {
    /// Role required for this permission
    pub fn required_role(&self) -> Role {
        match self {
            Permission::DistributeFees | Permission::DistributeAssets => Role::PoolManager,
            _ => Role::Owner,
        }
    }
}

/// Role holders of one contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AccessControl {
    owner: Address,
    pool_manager: Address,
}

impl AccessControl {
    pub fn new(owner: Address, pool_manager: Address) -> Self {
        Self { owner, pool_manager }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn pool_manager(&self) -> Address {
        self.pool_manager
    }

    /// Address holding `role`
    pub fn holder_of(&self, role: Role) -> Address {
        match role {
            Role::Owner => self.owner,
            Role::PoolManager => self.pool_manager,
        }
    }

    pub fn has_role(&self, account: &Address, role: Role) -> bool {
        self.holder_of(role) == *account
    }

    /// Fails unless `caller` holds the role behind `permission`
    pub fn require(&self, caller: &Address, permission: Permission) -> PoolResult<()> {
        self.require_role(caller, permission.required_role())
    }

    /// Fails unless `caller` holds `role`
    pub fn require_role(&self, caller: &Address, role: Role) -> PoolResult<()> {
        if self.has_role(caller, role) {
            return Ok(());
        }
        Err(match role {
            Role::Owner => PoolError::NotOwner { caller: *caller },
            Role::PoolManager => PoolError::NotPoolManager { caller: *caller },
        })
    }

    /// Hands ownership to `new_owner`
    pub fn transfer_ownership(&mut self, caller: &Address, new_owner: Address) -> PoolResult<()> {
        self.require(caller, Permission::TransferOwnership)?;
        self.owner = new_owner;
        Ok(())
    }
}
