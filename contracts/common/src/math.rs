//! Mathematical Utilities for the Liquidation Pool
//!
//! Checked 256-bit arithmetic and the price/decimal normalizer that turns
//! any collateral amount into an 18-decimal EUR value.

use crate::constants::precision::{ACCUMULATOR_EXP, DECIMALS, HUNDRED_PC};
use crate::errors::{PoolError, PoolResult};
use crate::types::{PriceReading, U256};

// ============ Safe Math ============

/// Safe addition with overflow check
pub fn safe_add(a: U256, b: U256) -> PoolResult<U256> {
    a.checked_add(b).ok_or(PoolError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: U256, b: U256) -> PoolResult<U256> {
    a.checked_sub(b).ok_or(PoolError::Underflow)
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: U256, b: U256) -> PoolResult<U256> {
    a.checked_mul(b).ok_or(PoolError::Overflow)
}

/// Safe division with zero check
pub fn safe_div(a: U256, b: U256) -> PoolResult<U256> {
    a.checked_div(b).ok_or(PoolError::DivisionByZero)
}

/// `a * b / denominator`, rounded down
pub fn mul_div(a: U256, b: U256, denominator: U256) -> PoolResult<U256> {
    if denominator.is_zero() {
        return Err(PoolError::DivisionByZero);
    }
    safe_div(safe_mul(a, b)?, denominator)
}

/// 10^exp as U256
pub fn pow10(exp: u32) -> PoolResult<U256> {
    // 10^77 is the largest power of ten below 2^256
    if exp > 77 {
        return Err(PoolError::Overflow);
    }
    Ok(U256::exp10(exp as usize))
}

/// Scale of the reward-per-share accumulator (1e18)
pub fn accumulator_scale() -> U256 {
    U256::exp10(ACCUMULATOR_EXP)
}

// ============ Percentages ============

/// `amount * percentage / 100_000`, rounded down
pub fn percentage_of(amount: U256, percentage: u32) -> PoolResult<U256> {
    mul_div(amount, U256::from(percentage), U256::from(HUNDRED_PC))
}

/// Share of `amount` owed to `part` out of `total`, rounded down
///
/// Returns zero when `total` is zero so an empty pool distributes nothing.
pub fn pro_rata(amount: U256, part: U256, total: U256) -> PoolResult<U256> {
    if total.is_zero() {
        return Ok(U256::zero());
    }
    mul_div(amount, part, total)
}

// ============ Price / Decimal Normalizer ============

/// Rescales a token amount with `decimals` places to 18 decimals
pub fn to_decimal_precision(amount: U256, decimals: u8) -> PoolResult<U256> {
    if decimals <= DECIMALS {
        safe_mul(amount, pow10(u32::from(DECIMALS - decimals))?)
    } else {
        safe_div(amount, pow10(u32::from(decimals - DECIMALS))?)
    }
}

/// EUR value (18 decimals) of `amount` units of an asset
///
/// ```text
/// value = amount * 10^(18 - decimals) * asset_usd / eur_usd
/// ```
///
/// Feed decimals are reconciled so a feed with more decimals than the
/// EUR/USD feed does not inflate the result.
pub fn eur_value(
    amount: U256,
    decimals: u8,
    asset_usd: &PriceReading,
    eur_usd: &PriceReading,
) -> PoolResult<U256> {
    if eur_usd.answer == 0 {
        return Err(PoolError::DivisionByZero);
    }
    let normalized = to_decimal_precision(amount, decimals)?;
    let numerator = safe_mul(
        safe_mul(normalized, U256::from(asset_usd.answer))?,
        pow10(u32::from(eur_usd.decimals))?,
    )?;
    let denominator = safe_mul(
        U256::from(eur_usd.answer),
        pow10(u32::from(asset_usd.decimals))?,
    )?;
    safe_div(numerator, denominator)
}

/// Discounted EUROs price of collateral worth `value_eur` at market
///
/// `collateral_rate` is in parts per 100_000, so 110_000 sells at ~90.9%.
pub fn discounted_cost(value_eur: U256, collateral_rate: u32) -> PoolResult<U256> {
    if collateral_rate == 0 {
        return Err(PoolError::InvalidCollateralRate { rate: collateral_rate });
    }
    mul_div(value_eur, U256::from(HUNDRED_PC), U256::from(collateral_rate))
}
