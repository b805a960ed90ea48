//! Liquidation Engine
//!
//! Splits collateral released by a vault across stakers in proportion to
//! their consolidated TST, then lets each staker buy their share at a
//! discount with staked EUROs.
//!
//! ## Algorithm
//!
//! 1. Snapshot stakes and the TST total before touching any position
//! 2. `share = released * holder_tst / total_tst`, rounded down; the
//!    rounding residue is never allocated
//! 3. Per holder, in asset priority order, price the share at
//!    `eur_value * 100_000 / collateral_rate` and spend EUROs on it
//! 4. When EUROs run out mid-asset, buy the proportional part and stop

use crate::errors::PoolResult;
use crate::math::{discounted_cost, eur_value, mul_div, pro_rata, safe_add, safe_sub};
use crate::types::{Address, PriceReading, Symbol, U256};
use crate::Vec;

/// Consolidated TST of one holder at snapshot time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HolderStake {
    pub holder: Address,
    pub tst: U256,
}

/// Collateral allotted to one holder, parallel to the released assets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HolderAllocation {
    pub holder: Address,
    pub amounts: Vec<U256>,
}

/// Pricing inputs of one collateral asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetQuote {
    pub symbol: Symbol,
    pub decimals: u8,
    pub price: PriceReading,
}

/// Collateral bought by one holder for one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Purchase {
    /// Index into the released assets
    pub index: usize,
    pub amount: U256,
    pub cost: U256,
}

/// Purchases of one holder across all assets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PurchasePlan {
    pub purchases: Vec<Purchase>,
    /// EUROs spent, to be burned
    pub spent: U256,
    /// True when the holder ran out of EUROs before buying everything
    pub exhausted: bool,
}

/// Splits each released amount across the snapshot, rounding down
///
/// Holders without consolidated TST get nothing; an empty total allocates
/// nothing at all.
pub fn allocate(
    stakes: &[HolderStake],
    total_tst: U256,
    released: &[U256],
) -> PoolResult<Vec<HolderAllocation>> {
    let mut allocations = Vec::new();
    if total_tst.is_zero() {
        return Ok(allocations);
    }

    for stake in stakes.iter().filter(|s| !s.tst.is_zero()) {
        let amounts = released
            .iter()
            .map(|amount| pro_rata(*amount, stake.tst, total_tst))
            .collect::<PoolResult<Vec<_>>>()?;
        allocations.push(HolderAllocation { holder: stake.holder, amounts });
    }

    Ok(allocations)
}

/// Sum allocated for the asset at `index`
pub fn total_allocated(allocations: &[HolderAllocation], index: usize) -> PoolResult<U256> {
    allocations.iter().try_fold(U256::zero(), |acc, allocation| {
        safe_add(acc, allocation.amounts.get(index).copied().unwrap_or_default())
    })
}

/// Discounted EUROs price of `amount` units of the quoted asset
pub fn purchase_cost(
    amount: U256,
    quote: &AssetQuote,
    eur_usd: &PriceReading,
    collateral_rate: u32,
) -> PoolResult<U256> {
    let value = eur_value(amount, quote.decimals, &quote.price, eur_usd)?;
    discounted_cost(value, collateral_rate)
}

/// Buys as much of `allocation` as `available_euros` covers
///
/// Assets are visited in the order of `quotes`. Never fails on a shortfall:
/// the unbought remainder simply stays an unclaimed reward.
pub fn plan_purchases(
    available_euros: U256,
    allocation: &[U256],
    quotes: &[AssetQuote],
    eur_usd: &PriceReading,
    collateral_rate: u32,
) -> PoolResult<PurchasePlan> {
    let mut plan = PurchasePlan::default();
    let mut remaining = available_euros;

    for (index, (portion, quote)) in allocation.iter().zip(quotes.iter()).enumerate() {
        if portion.is_zero() {
            continue;
        }
        if remaining.is_zero() {
            plan.exhausted = true;
            break;
        }

        let mut amount = *portion;
        let mut cost = purchase_cost(amount, quote, eur_usd, collateral_rate)?;
        if cost > remaining {
            amount = mul_div(amount, remaining, cost)?;
            cost = remaining;
            plan.exhausted = true;
        }

        remaining = safe_sub(remaining, cost)?;
        plan.spent = safe_add(plan.spent, cost)?;
        plan.purchases.push(Purchase { index, amount, cost });

        if plan.exhausted {
            break;
        }
    }

    Ok(plan)
}
