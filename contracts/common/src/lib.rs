//! Liquidation Pool Common Library
//!
//! Shared types, constants, and ledger logic for the TST/EUROs
//! liquidation pool contracts.
//!
//! ## Components
//!
//! - **Stake Ledger**: pending deposits that mature after one day
//! - **Fee Accumulator**: lazy reward-per-share distribution of EUROs fees
//! - **Holder Registry**: bounded set of active stakers
//! - **Liquidation Engine**: pro-rata collateral allocation and discounted purchase
//! - **Interfaces**: traits for tokens, prices, vaults and accepted assets
//! - **Access Control**: owner and pool-manager gates
//! - **Emergency Module**: normal/emergency switch
//!
//! This crate is `no_std` compatible when built without the `std` feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export collections for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
pub use std::{collections::BTreeMap, vec::Vec};

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod events;
pub mod registry;
pub mod stake_ledger;
pub mod fee_accumulator;
pub mod liquidation;
pub mod interfaces;
pub mod access_control;
pub mod emergency;

// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
pub use events::*;
pub use registry::HolderRegistry;
pub use liquidation::{AssetQuote, HolderAllocation, HolderStake, Purchase, PurchasePlan};
pub use interfaces::*;
pub use access_control::*;
pub use emergency::{ensure_emergency, ensure_normal, Transition};
