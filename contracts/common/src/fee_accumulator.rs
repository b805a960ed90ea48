//! Fee Distribution Accumulator
//!
//! A global reward-per-share counter (EUROs per unit of consolidated TST,
//! scaled by 1e18). Distributions bump the counter in O(1); each position
//! collects its share lazily when settled against its checkpoint.

use crate::math::{accumulator_scale, mul_div, percentage_of, safe_add, safe_sub};
use crate::errors::PoolResult;
use crate::types::{PoolState, Position, U256};

/// Split of an incoming fee amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplit {
    /// Credited to stakers
    pub pool_share: U256,
    /// Sent to the protocol wallet
    pub protocol_share: U256,
}

/// Outcome of crediting a pool share to the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    /// The accumulator moved by `increment` for `credited` EUROs
    Credited { credited: U256, increment: U256 },
    /// No consolidated TST; `undistributed` EUROs wait for the next round
    Deferred { undistributed: U256 },
}

/// Splits `amount` by the pool fee percentage
pub fn split_fee(amount: U256, pool_fee_percentage: u32) -> PoolResult<FeeSplit> {
    let pool_share = percentage_of(amount, pool_fee_percentage)?;
    let protocol_share = safe_sub(amount, pool_share)?;
    Ok(FeeSplit { pool_share, protocol_share })
}

/// Accumulator increase for `pool_share` spread over `total_tst`
pub fn accumulator_increment(pool_share: U256, total_tst: U256) -> PoolResult<U256> {
    mul_div(pool_share, accumulator_scale(), total_tst)
}

/// Credits `pool_share` plus any parked fees to the accumulator
///
/// With no consolidated TST the whole amount is parked in
/// `undistributed_fees` instead of failing the distribution.
pub fn credit(state: &mut PoolState, pool_share: U256) -> PoolResult<Distribution> {
    let available = safe_add(pool_share, state.undistributed_fees)?;

    if state.total_consolidated_tst.is_zero() {
        state.undistributed_fees = available;
        return Ok(Distribution::Deferred { undistributed: available });
    }

    let increment = accumulator_increment(available, state.total_consolidated_tst)?;
    state.reward_accumulator = safe_add(state.reward_accumulator, increment)?;
    state.undistributed_fees = U256::zero();

    Ok(Distribution::Credited { credited: available, increment })
}

/// EUROs owed to `position` since its checkpoint, rounded down
pub fn pending_fees(position: &Position, accumulator: U256) -> PoolResult<U256> {
    let delta = safe_sub(accumulator, position.reward_checkpoint)?;
    if delta.is_zero() || position.consolidated_tst.is_zero() {
        return Ok(U256::zero());
    }
    mul_div(delta, position.consolidated_tst, accumulator_scale())
}

/// Moves owed fees into the consolidated EUROs and advances the checkpoint
///
/// Must run before any change to `consolidated_tst`, otherwise the new
/// balance would earn for distributions it was not part of.
pub fn settle(position: &mut Position, accumulator: U256) -> PoolResult<U256> {
    let owed = pending_fees(position, accumulator)?;
    position.consolidated_euros = safe_add(position.consolidated_euros, owed)?;
    position.reward_checkpoint = accumulator;
    Ok(owed)
}
