//! Collaborator Interfaces
//!
//! Token transfers, price feeds, the vault manager and the accepted-asset
//! registry live outside the pool. The pool only talks to them through
//! these traits.

use crate::errors::{PoolError, PoolResult};
use crate::types::{Address, Asset, AssetId, PriceReading, ReleasedAsset, Symbol, VaultId, U256};
use crate::Vec;

/// Balance and allowance ledger for every asset, native included
pub trait TokenProvider {
    fn balance_of(&self, asset: &AssetId, account: &Address) -> U256;

    /// Amount `spender` may pull from `owner`; native assets have none
    fn allowance(&self, asset: &AssetId, owner: &Address, spender: &Address) -> U256;

    fn total_supply(&self, asset: &AssetId) -> U256;

    /// Sets the amount `spender` may pull from `owner`
    fn approve(&mut self, asset: &AssetId, owner: &Address, spender: &Address, amount: U256) -> PoolResult<()>;

    /// Moves `amount` out of `from`, which authorizes the call
    fn transfer(&mut self, asset: &AssetId, from: &Address, to: &Address, amount: U256) -> PoolResult<()>;

    /// Pulls `amount` from `owner` against the allowance of `spender`
    fn transfer_from(
        &mut self,
        asset: &AssetId,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: U256,
    ) -> PoolResult<()>;

    fn mint(&mut self, asset: &AssetId, to: &Address, amount: U256) -> PoolResult<()>;

    fn burn(&mut self, asset: &AssetId, from: &Address, amount: U256) -> PoolResult<()>;
}

/// Source of USD prices, keyed by feed symbol
pub trait PriceFeed {
    fn latest_price(&self, feed: &Symbol) -> PoolResult<PriceReading>;
}

/// External manager of collateralized vaults
pub trait VaultManager {
    /// Minimum collateral rate (parts per 100_000), also the purchase discount
    fn collateral_rate(&self) -> u32;

    fn is_undercollateralized(&self, vault_id: &VaultId, prices: &dyn PriceFeed) -> PoolResult<bool>;

    fn find_undercollateralized_vault(&self, prices: &dyn PriceFeed) -> PoolResult<Option<VaultId>>;

    /// Releases all collateral of the vault to `liquidator`
    fn liquidate(
        &mut self,
        vault_id: &VaultId,
        liquidator: &Address,
        tokens: &mut dyn TokenProvider,
    ) -> PoolResult<Vec<ReleasedAsset>>;
}

/// Accepted collateral, native currency first, then registration order
pub trait TokenRegistry {
    fn accepted_assets(&self) -> Vec<Asset>;

    fn asset_by_symbol(&self, symbol: &Symbol) -> PoolResult<Asset> {
        self.accepted_assets()
            .into_iter()
            .find(|a| &a.symbol == symbol)
            .ok_or(PoolError::AssetNotFound { symbol: *symbol })
    }
}

/// Checks that `from` can send `amount` of `asset`
pub fn ensure_balance(
    tokens: &dyn TokenProvider,
    asset: &AssetId,
    from: &Address,
    amount: U256,
) -> PoolResult<()> {
    let available = tokens.balance_of(asset, from);
    if available < amount {
        return Err(PoolError::InsufficientBalance { asset: *asset, available, requested: amount });
    }
    Ok(())
}

/// Checks that `spender` can pull `amount` of `asset` from `owner`
pub fn ensure_pullable(
    tokens: &dyn TokenProvider,
    asset: &AssetId,
    spender: &Address,
    owner: &Address,
    amount: U256,
) -> PoolResult<()> {
    if amount.is_zero() {
        return Ok(());
    }
    let allowed = tokens.allowance(asset, owner, spender);
    if allowed < amount {
        return Err(PoolError::InsufficientAllowance {
            asset: *asset,
            available: allowed,
            requested: amount,
        });
    }
    ensure_balance(tokens, asset, owner, amount)
}

/// Borrowed collaborators for one command
pub struct Collaborators<'a> {
    pub tokens: &'a mut dyn TokenProvider,
    pub prices: &'a dyn PriceFeed,
    pub vaults: &'a mut dyn VaultManager,
    pub assets: &'a dyn TokenRegistry,
}
