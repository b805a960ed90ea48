//! Smart Vault Manager
//!
//! Collateralized vaults that mint EUROs against native currency and
//! accepted tokens. Vault collateral sits in the manager's own account;
//! a liquidation hands all of it to the liquidator (the pool manager).
//!
//! Also provides the `TokenManager`, the registry of accepted collateral
//! read by the pool when it allocates and prices liquidated assets.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use lp_common::{
    constants::{fees::DEFAULT_MINT_FEE_RATE, liquidation::DEFAULT_COLLATERAL_RATE, precision::HUNDRED_PC},
    errors::{PoolError, PoolResult},
    interfaces::{ensure_balance, PriceFeed, TokenProvider, TokenRegistry, VaultManager},
    math::{eur_value, percentage_of, safe_add},
    types::{Address, Asset, AssetBook, AssetId, ReleasedAsset, Symbol, Timestamp, VaultId, U256},
};

/// Log target for vault diagnostics
pub const LOG_TARGET: &str = "lp::vaults";

// ============ Token Manager ============

/// Accepted collateral: the native currency first, then tokens in
/// registration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TokenManager {
    assets: Vec<Asset>,
}

impl TokenManager {
    pub fn new(native_symbol: Symbol, native_decimals: u8, native_feed: Symbol) -> Self {
        Self { assets: vec![Asset::native(native_symbol, native_decimals, native_feed)] }
    }

    /// Accepts a token as collateral; returns false if the symbol is taken
    pub fn add_accepted_token(
        &mut self,
        symbol: Symbol,
        address: Address,
        decimals: u8,
        price_feed: Symbol,
    ) -> bool {
        if self.assets.iter().any(|a| a.symbol == symbol) {
            return false;
        }
        self.assets.push(Asset::token(symbol, address, decimals, price_feed));
        true
    }

    /// Stops accepting a token; the native currency cannot be removed
    pub fn remove_accepted_token(&mut self, symbol: &Symbol) -> bool {
        let before = self.assets.len();
        self.assets
            .retain(|a| a.id == AssetId::Native || &a.symbol != symbol);
        self.assets.len() != before
    }
}

impl TokenRegistry for TokenManager {
    fn accepted_assets(&self) -> Vec<Asset> {
        self.assets.clone()
    }
}

// ============ Vault Manager Config ============

/// Deployment parameters of the vault manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct VaultManagerConfig {
    /// Account holding all vault collateral
    pub address: Address,
    /// EUROs token minted against collateral
    pub euros: AssetId,
    /// EUR/USD feed used to value collateral
    pub eur_usd_feed: Symbol,
    /// Minimum collateral rate (parts per 100_000)
    pub collateral_rate: u32,
    /// Mint fee (parts per 100_000)
    pub mint_fee_rate: u32,
    /// Receiver of mint fees, normally the pool manager
    pub fee_recipient: Address,
}

impl VaultManagerConfig {
    pub fn new(address: Address, euros: AssetId, eur_usd_feed: Symbol, fee_recipient: Address) -> Self {
        Self {
            address,
            euros,
            eur_usd_feed,
            collateral_rate: DEFAULT_COLLATERAL_RATE,
            mint_fee_rate: DEFAULT_MINT_FEE_RATE,
            fee_recipient,
        }
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.collateral_rate < HUNDRED_PC {
            return Err(PoolError::InvalidCollateralRate { rate: self.collateral_rate });
        }
        Ok(())
    }
}

// ============ Vaults ============

/// One collateralized vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub owner: Address,
    /// Collateral per symbol, in token units
    pub collateral: AssetBook,
    /// EUROs owed, mint fees included
    pub minted: U256,
    pub liquidated: bool,
}

/// Vault registry and collateral custody
#[derive(Debug, Clone)]
pub struct SmartVaultManager {
    pub config: VaultManagerConfig,
    tokens: TokenManager,
    vaults: BTreeMap<VaultId, Vault>,
    /// Vault ids in opening order
    order: Vec<VaultId>,
    nonce: u64,
}

impl SmartVaultManager {
    pub fn new(config: VaultManagerConfig, tokens: TokenManager) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tokens,
            vaults: BTreeMap::new(),
            order: Vec::new(),
            nonce: 0,
        })
    }

    pub fn vault(&self, vault_id: &VaultId) -> Option<&Vault> {
        self.vaults.get(vault_id)
    }

    pub fn vault_count(&self) -> usize {
        self.order.len()
    }

    /// Opens an empty vault for `owner`
    pub fn open_vault(&mut self, owner: &Address, now: Timestamp) -> VaultId {
        let id = generate_vault_id(owner, now, self.nonce);
        self.nonce = self.nonce.wrapping_add(1);
        self.vaults.insert(
            id,
            Vault {
                id,
                owner: *owner,
                collateral: AssetBook::new(),
                minted: U256::zero(),
                liquidated: false,
            },
        );
        self.order.push(id);

        log::debug!(target: LOG_TARGET, "vault {:?} opened for {:?}", id, owner);
        id
    }

    fn active_vault(&self, vault_id: &VaultId) -> PoolResult<&Vault> {
        self.vaults
            .get(vault_id)
            .filter(|v| !v.liquidated)
            .ok_or(PoolError::VaultNotFound { vault_id: *vault_id })
    }

    /// Moves collateral from the vault owner into manager custody
    pub fn add_collateral(
        &mut self,
        caller: &Address,
        vault_id: &VaultId,
        symbol: &Symbol,
        amount: U256,
        tokens: &mut dyn TokenProvider,
    ) -> PoolResult<()> {
        // 1. Amount must be positive
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }

        // 2. Vault must exist and belong to the caller
        let vault = self.active_vault(vault_id)?;
        if vault.owner != *caller {
            return Err(PoolError::NotVaultOwner { caller: *caller });
        }

        // 3. Asset must be accepted
        let asset = self.tokens.asset_by_symbol(symbol)?;

        // 4. Take custody, then book it
        tokens.transfer(&asset.id, caller, &self.config.address, amount)?;
        if let Some(vault) = self.vaults.get_mut(vault_id) {
            vault.collateral.credit(asset.symbol, amount)?;
        }
        Ok(())
    }

    /// Mints EUROs to the vault owner; returns the fee sent to the fee recipient
    pub fn mint_euros(
        &mut self,
        caller: &Address,
        vault_id: &VaultId,
        amount: U256,
        tokens: &mut dyn TokenProvider,
        prices: &dyn PriceFeed,
    ) -> PoolResult<U256> {
        // 1. Amount must be positive
        if amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }

        // 2. Only owner can mint
        let vault = self.active_vault(vault_id)?;
        if vault.owner != *caller {
            return Err(PoolError::NotVaultOwner { caller: *caller });
        }

        // 3. Fee is owed on top of the minted amount
        let fee = percentage_of(amount, self.config.mint_fee_rate)?;
        let new_minted = safe_add(safe_add(vault.minted, amount)?, fee)?;

        // 4. New debt must stay collateralized
        let value = self.collateral_value(vault, prices)?;
        if exceeds_collateral(new_minted, value, self.config.collateral_rate)? {
            return Err(PoolError::InsufficientCollateral { vault_id: *vault_id });
        }

        // 5. Record debt, then mint
        if let Some(vault) = self.vaults.get_mut(vault_id) {
            vault.minted = new_minted;
        }
        tokens.mint(&self.config.euros, caller, amount)?;
        if !fee.is_zero() {
            tokens.mint(&self.config.euros, &self.config.fee_recipient, fee)?;
        }

        log::debug!(target: LOG_TARGET, "vault {:?} minted {} EUROs, fee {}", vault_id, amount, fee);
        Ok(fee)
    }

    /// EUR value (18 decimals) of the vault's collateral
    pub fn collateral_value(&self, vault: &Vault, prices: &dyn PriceFeed) -> PoolResult<U256> {
        let eur_usd = prices.latest_price(&self.config.eur_usd_feed)?;
        self.tokens
            .accepted_assets()
            .iter()
            .try_fold(U256::zero(), |total, asset| {
                let amount = vault.collateral.amount_of(&asset.symbol);
                if amount.is_zero() {
                    return Ok(total);
                }
                let price = prices.latest_price(&asset.price_feed)?;
                safe_add(total, eur_value(amount, asset.decimals, &price, &eur_usd)?)
            })
    }
}

impl VaultManager for SmartVaultManager {
    fn collateral_rate(&self) -> u32 {
        self.config.collateral_rate
    }

    fn is_undercollateralized(&self, vault_id: &VaultId, prices: &dyn PriceFeed) -> PoolResult<bool> {
        let vault = self
            .vaults
            .get(vault_id)
            .ok_or(PoolError::VaultNotFound { vault_id: *vault_id })?;
        if vault.liquidated || vault.minted.is_zero() {
            return Ok(false);
        }
        let value = self.collateral_value(vault, prices)?;
        exceeds_collateral(vault.minted, value, self.config.collateral_rate)
    }

    fn find_undercollateralized_vault(&self, prices: &dyn PriceFeed) -> PoolResult<Option<VaultId>> {
        for id in &self.order {
            if self.is_undercollateralized(id, prices)? {
                return Ok(Some(*id));
            }
        }
        Ok(None)
    }

    /// Releases all collateral of the vault; the caller checks its health first
    fn liquidate(
        &mut self,
        vault_id: &VaultId,
        liquidator: &Address,
        tokens: &mut dyn TokenProvider,
    ) -> PoolResult<Vec<ReleasedAsset>> {
        // 1. Collect the releasable collateral in registry order
        let vault = self.active_vault(vault_id)?;
        let released: Vec<ReleasedAsset> = self
            .tokens
            .accepted_assets()
            .into_iter()
            .filter_map(|asset| {
                let amount = vault.collateral.amount_of(&asset.symbol);
                (!amount.is_zero()).then_some(ReleasedAsset { asset, amount })
            })
            .collect();

        // 2. Custody must cover every transfer
        for item in &released {
            ensure_balance(tokens, &item.asset.id, &self.config.address, item.amount)?;
        }

        // 3. Close the vault
        if let Some(vault) = self.vaults.get_mut(vault_id) {
            vault.liquidated = true;
            vault.minted = U256::zero();
            vault.collateral = AssetBook::new();
        }

        // 4. Hand over the collateral
        for item in &released {
            tokens.transfer(&item.asset.id, &self.config.address, liquidator, item.amount)?;
        }

        log::info!(
            target: LOG_TARGET,
            "vault {:?} liquidated, {} assets released to {:?}",
            vault_id,
            released.len(),
            liquidator
        );
        Ok(released)
    }
}

// ============ Helper Functions ============

/// True when `minted` at `collateral_rate` needs more than `value`
fn exceeds_collateral(minted: U256, value: U256, collateral_rate: u32) -> PoolResult<bool> {
    Ok(percentage_of(minted, collateral_rate)? > value)
}

/// Generate a deterministic vault ID
pub fn generate_vault_id(owner: &Address, timestamp: Timestamp, nonce: u64) -> VaultId {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(owner);
    hasher.update(timestamp.to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    let result = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&result);
    id
}

// ============ Tests ============
