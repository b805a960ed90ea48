//! Token Ledger
//!
//! In-memory balances for every asset the pool touches: the chain's
//! native currency plus ERC-20 style tokens (TST, EUROs and collateral
//! tokens). Tokens support allowances; native currency moves only by
//! direct transfer from its holder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use lp_common::{
    constants::token::{NATIVE_DECIMALS, NATIVE_SYMBOL},
    errors::{PoolError, PoolResult},
    interfaces::TokenProvider,
    math::{safe_add, safe_sub},
    types::{Address, AssetId, Symbol, U256},
};

/// Log target for ledger diagnostics
pub const LOG_TARGET: &str = "lp::token";

// ============ Token Metadata ============

/// Registered asset and its supply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: Symbol,
    pub decimals: u8,
    pub total_supply: U256,
}

impl TokenInfo {
    pub fn new(symbol: Symbol, decimals: u8) -> Self {
        Self { symbol, decimals, total_supply: U256::zero() }
    }
}

// ============ Ledger ============

/// Balances and allowances of all registered assets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenLedger {
    assets: BTreeMap<AssetId, TokenInfo>,
    balances: BTreeMap<(AssetId, Address), U256>,
    /// Keyed by (asset, owner, spender)
    allowances: BTreeMap<(AssetId, Address, Address), U256>,
}

impl Default for TokenLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenLedger {
    /// Ledger with the native currency registered
    pub fn new() -> Self {
        let mut assets = BTreeMap::new();
        assets.insert(AssetId::Native, TokenInfo::new(NATIVE_SYMBOL, NATIVE_DECIMALS));
        Self {
            assets,
            balances: BTreeMap::new(),
            allowances: BTreeMap::new(),
        }
    }

    /// Registers a token contract; re-registering keeps existing supply
    pub fn register_token(&mut self, address: Address, symbol: Symbol, decimals: u8) -> AssetId {
        let id = AssetId::Token(address);
        self.assets
            .entry(id)
            .or_insert_with(|| TokenInfo::new(symbol, decimals));
        id
    }

    pub fn info(&self, asset: &AssetId) -> Option<&TokenInfo> {
        self.assets.get(asset)
    }

    pub fn is_registered(&self, asset: &AssetId) -> bool {
        self.assets.contains_key(asset)
    }

    fn ensure_registered(&self, asset: &AssetId) -> PoolResult<()> {
        if self.is_registered(asset) {
            Ok(())
        } else {
            Err(PoolError::UnknownAsset { asset: *asset })
        }
    }

    fn set_balance(&mut self, asset: &AssetId, account: &Address, amount: U256) {
        if amount.is_zero() {
            self.balances.remove(&(*asset, *account));
        } else {
            self.balances.insert((*asset, *account), amount);
        }
    }

    fn debit(&mut self, asset: &AssetId, account: &Address, amount: U256) -> PoolResult<()> {
        let available = self.balance_of(asset, account);
        if available < amount {
            return Err(PoolError::InsufficientBalance { asset: *asset, available, requested: amount });
        }
        self.set_balance(asset, account, safe_sub(available, amount)?);
        Ok(())
    }

    fn credit(&mut self, asset: &AssetId, account: &Address, amount: U256) -> PoolResult<()> {
        let balance = safe_add(self.balance_of(asset, account), amount)?;
        self.set_balance(asset, account, balance);
        Ok(())
    }
}

impl TokenProvider for TokenLedger {
    fn balance_of(&self, asset: &AssetId, account: &Address) -> U256 {
        self.balances.get(&(*asset, *account)).copied().unwrap_or_default()
    }

    fn allowance(&self, asset: &AssetId, owner: &Address, spender: &Address) -> U256 {
        self.allowances
            .get(&(*asset, *owner, *spender))
            .copied()
            .unwrap_or_default()
    }

    fn total_supply(&self, asset: &AssetId) -> U256 {
        self.assets
            .get(asset)
            .map(|info| info.total_supply)
            .unwrap_or_default()
    }

    fn approve(
        &mut self,
        asset: &AssetId,
        owner: &Address,
        spender: &Address,
        amount: U256,
    ) -> PoolResult<()> {
        // 1. Only registered tokens carry allowances
        if *asset == AssetId::Native || !self.is_registered(asset) {
            return Err(PoolError::UnknownAsset { asset: *asset });
        }

        // 2. Overwrite, zero clears the entry
        let key = (*asset, *owner, *spender);
        if amount.is_zero() {
            self.allowances.remove(&key);
        } else {
            self.allowances.insert(key, amount);
        }
        Ok(())
    }

    fn transfer(&mut self, asset: &AssetId, from: &Address, to: &Address, amount: U256) -> PoolResult<()> {
        // 1. Asset must exist
        self.ensure_registered(asset)?;

        // 2. Zero transfers are no-ops
        if amount.is_zero() {
            return Ok(());
        }

        // 3. Sender must have enough balance, then move it
        self.debit(asset, from, amount)?;
        self.credit(asset, to, amount)?;

        log::trace!(target: LOG_TARGET, "transfer {:?} {} {:?} -> {:?}", asset, amount, from, to);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        asset: &AssetId,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: U256,
    ) -> PoolResult<()> {
        // 1. Asset must exist
        self.ensure_registered(asset)?;
        if amount.is_zero() {
            return Ok(());
        }

        // 2. Spender must be allowed to pull the amount
        let allowed = self.allowance(asset, owner, spender);
        if allowed < amount {
            return Err(PoolError::InsufficientAllowance {
                asset: *asset,
                available: allowed,
                requested: amount,
            });
        }

        // 3. Move the funds before consuming the allowance
        self.debit(asset, owner, amount)?;
        self.credit(asset, to, amount)?;

        // 4. Consume the allowance
        let remaining = safe_sub(allowed, amount)?;
        self.approve(asset, owner, spender, remaining)
    }

    fn mint(&mut self, asset: &AssetId, to: &Address, amount: U256) -> PoolResult<()> {
        self.ensure_registered(asset)?;
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }

        let supply = safe_add(self.total_supply(asset), amount)?;
        self.credit(asset, to, amount)?;
        if let Some(info) = self.assets.get_mut(asset) {
            info.total_supply = supply;
        }

        log::debug!(target: LOG_TARGET, "mint {:?} {} to {:?}, supply {}", asset, amount, to, supply);
        Ok(())
    }

    fn burn(&mut self, asset: &AssetId, from: &Address, amount: U256) -> PoolResult<()> {
        self.ensure_registered(asset)?;
        if amount.is_zero() {
            return Ok(());
        }

        self.debit(asset, from, amount)?;
        let supply = safe_sub(self.total_supply(asset), amount)?;
        if let Some(info) = self.assets.get_mut(asset) {
            info.total_supply = supply;
        }

        log::debug!(target: LOG_TARGET, "burn {:?} {} from {:?}, supply {}", asset, amount, from, supply);
        Ok(())
    }
}

// ============ Tests ============
