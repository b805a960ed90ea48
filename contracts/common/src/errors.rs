//! Error Types for the Liquidation Pool
//!
//! Typed errors shared by every contract crate. Each variant maps to a
//! stable code and a category so callers can decide whether a resubmit
//! can succeed.

use core::fmt;

use crate::types::{Address, AssetId, Symbol, VaultId, U256};

/// Result type alias for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

/// Main error enum for all pool errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    // ============ Validation Errors ============
    /// Decrease exceeds the consolidated balance of the position
    InvalidDecreaseAmount {
        requested_tst: U256,
        requested_euros: U256,
        consolidated_tst: U256,
        consolidated_euros: U256,
    },

    /// Both stake amounts are zero
    ZeroAmount,

    /// Pool fee percentage above 100%
    InvalidPoolFeePercentage { percentage: u32 },

    /// Collateral rate that cannot price a purchase
    InvalidCollateralRate { rate: u32 },

    /// Holder limit of zero
    InvalidHolderLimit,

    /// Encoded configuration or payload could not be decoded
    InvalidEncoding,

    // ============ Authorization Errors ============
    /// Only the owner can perform this action
    NotOwner { caller: Address },

    /// Only the pool manager can perform this action
    NotPoolManager { caller: Address },

    /// Only the feed operator can update this price feed
    NotFeedOperator { caller: Address },

    /// Only the vault owner can manage this vault
    NotVaultOwner { caller: Address },

    // ============ Capacity Errors ============
    /// Holder registry is full
    HolderLimitExceeded { limit: u32 },

    // ============ State Errors ============
    /// Operation blocked while the pool is in emergency mode
    EmergencyActive,

    /// Operation only available in emergency mode
    NotInEmergency,

    /// Vault is healthy and cannot be liquidated
    VaultNotUndercollateralized { vault_id: VaultId },

    /// No vault is currently liquidatable
    NoLiquidatableVaults,

    /// Minting would leave the vault undercollateralized
    InsufficientCollateral { vault_id: VaultId },

    /// Vault not found
    VaultNotFound { vault_id: VaultId },

    /// Asset not known to the token registry
    AssetNotFound { symbol: Symbol },

    // ============ Asset Transfer Errors ============
    /// Spender allowance too small for a pull
    InsufficientAllowance {
        asset: AssetId,
        available: U256,
        requested: U256,
    },

    /// Account balance too small for a transfer
    InsufficientBalance {
        asset: AssetId,
        available: U256,
        requested: U256,
    },

    /// Asset not registered with the token provider
    UnknownAsset { asset: AssetId },

    // ============ Oracle Errors ============
    /// No feed registered under the given key
    PriceFeedNotFound { feed: Symbol },

    /// Feed reports a zero price or unusable decimals
    InvalidPrice { feed: Symbol },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,
}

/// Error taxonomy used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad amounts or parameters
    Validation,
    /// Caller lacks the required role
    Authorization,
    /// Bounded resource exhausted
    Capacity,
    /// Operation not allowed in the current state
    State,
    /// Bubbled up from a token collaborator
    AssetTransfer,
    /// Bubbled up from a price feed collaborator
    Oracle,
    /// Fixed-point arithmetic failure
    Math,
}

impl PoolError {
    /// Returns a human-readable error code for logging/debugging
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDecreaseAmount { .. } => "E001_INVALID_DECREASE",
            Self::ZeroAmount => "E002_ZERO_AMOUNT",
            Self::InvalidPoolFeePercentage { .. } => "E003_INVALID_POOL_FEE",
            Self::InvalidCollateralRate { .. } => "E004_INVALID_COLLATERAL_RATE",
            Self::InvalidHolderLimit => "E005_INVALID_HOLDER_LIMIT",
            Self::InvalidEncoding => "E006_INVALID_ENCODING",
            Self::NotOwner { .. } => "E010_NOT_OWNER",
            Self::NotPoolManager { .. } => "E011_NOT_POOL_MANAGER",
            Self::NotFeedOperator { .. } => "E012_NOT_FEED_OPERATOR",
            Self::NotVaultOwner { .. } => "E013_NOT_VAULT_OWNER",
            Self::HolderLimitExceeded { .. } => "E020_HOLDER_LIMIT",
            Self::EmergencyActive => "E030_EMERGENCY_ACTIVE",
            Self::NotInEmergency => "E031_NOT_IN_EMERGENCY",
            Self::VaultNotUndercollateralized { .. } => "E032_VAULT_HEALTHY",
            Self::NoLiquidatableVaults => "E033_NO_LIQ_VAULTS",
            Self::InsufficientCollateral { .. } => "E036_INSUFFICIENT_COLLATERAL",
            Self::VaultNotFound { .. } => "E034_VAULT_NOT_FOUND",
            Self::AssetNotFound { .. } => "E035_ASSET_NOT_FOUND",
            Self::InsufficientAllowance { .. } => "E040_INSUFFICIENT_ALLOWANCE",
            Self::InsufficientBalance { .. } => "E041_INSUFFICIENT_BALANCE",
            Self::UnknownAsset { .. } => "E042_UNKNOWN_ASSET",
            Self::PriceFeedNotFound { .. } => "E050_FEED_NOT_FOUND",
            Self::InvalidPrice { .. } => "E051_INVALID_PRICE",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
        }
    }

    /// Category of the error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidDecreaseAmount { .. }
            | Self::ZeroAmount
            | Self::InvalidPoolFeePercentage { .. }
            | Self::InvalidCollateralRate { .. }
            | Self::InvalidHolderLimit
            | Self::InvalidEncoding => ErrorCategory::Validation,
            Self::NotOwner { .. }
            | Self::NotPoolManager { .. }
            | Self::NotFeedOperator { .. }
            | Self::NotVaultOwner { .. } => ErrorCategory::Authorization,
            Self::HolderLimitExceeded { .. } => ErrorCategory::Capacity,
            Self::EmergencyActive
            | Self::NotInEmergency
            | Self::VaultNotUndercollateralized { .. }
            | Self::NoLiquidatableVaults
            | Self::InsufficientCollateral { .. }
            | Self::VaultNotFound { .. }
            | Self::AssetNotFound { .. } => ErrorCategory::State,
            Self::InsufficientAllowance { .. }
            | Self::InsufficientBalance { .. }
            | Self::UnknownAsset { .. } => ErrorCategory::AssetTransfer,
            Self::PriceFeedNotFound { .. } | Self::InvalidPrice { .. } => ErrorCategory::Oracle,
            Self::Overflow | Self::Underflow | Self::DivisionByZero => ErrorCategory::Math,
        }
    }

    /// Short description without the variant payload
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidDecreaseAmount { .. } => "decrease exceeds consolidated position",
            Self::ZeroAmount => "amount must be greater than zero",
            Self::InvalidPoolFeePercentage { .. } => "pool fee percentage above 100%",
            Self::InvalidCollateralRate { .. } => "collateral rate must be greater than zero",
            Self::InvalidHolderLimit => "holder limit must be greater than zero",
            Self::InvalidEncoding => "malformed encoded data",
            Self::NotOwner { .. } => "caller is not the owner",
            Self::NotPoolManager { .. } => "caller is not the pool manager",
            Self::NotFeedOperator { .. } => "caller is not the feed operator",
            Self::NotVaultOwner { .. } => "caller does not own the vault",
            Self::HolderLimitExceeded { .. } => "holder limit exceeded",
            Self::EmergencyActive => "pool is in emergency mode",
            Self::NotInEmergency => "pool is not in emergency mode",
            Self::VaultNotUndercollateralized { .. } => "vault is not undercollateralized",
            Self::NoLiquidatableVaults => "no-liquidatable-vaults",
            Self::InsufficientCollateral { .. } => "mint exceeds vault collateral",
            Self::VaultNotFound { .. } => "vault not found",
            Self::AssetNotFound { .. } => "asset not accepted",
            Self::InsufficientAllowance { .. } => "insufficient allowance",
            Self::InsufficientBalance { .. } => "insufficient balance",
            Self::UnknownAsset { .. } => "unknown asset",
            Self::PriceFeedNotFound { .. } => "price feed not found",
            Self::InvalidPrice { .. } => "invalid price",
            Self::Overflow => "arithmetic overflow",
            Self::Underflow => "arithmetic underflow",
            Self::DivisionByZero => "division by zero",
        }
    }

    /// Returns true if this error is recoverable (user can fix it)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InsufficientAllowance { .. } => true, // Approve more
            Self::InsufficientBalance { .. } => true,   // Get more funds
            Self::InvalidDecreaseAmount { .. } => true, // Wait for maturity
            Self::HolderLimitExceeded { .. } => true,   // Wait for a free slot
            Self::InsufficientCollateral { .. } => true, // Add collateral
            _ => false,
        }
    }
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDecreaseAmount {
                requested_tst,
                requested_euros,
                consolidated_tst,
                consolidated_euros,
            } => write!(
                f,
                "[{}] {}: requested {} TST / {} EUROs, consolidated {} TST / {} EUROs",
                self.code(),
                self.message(),
                requested_tst,
                requested_euros,
                consolidated_tst,
                consolidated_euros
            ),
            Self::InsufficientAllowance { available, requested, .. }
            | Self::InsufficientBalance { available, requested, .. } => write!(
                f,
                "[{}] {}: available {}, requested {}",
                self.code(),
                self.message(),
                available,
                requested
            ),
            Self::HolderLimitExceeded { limit } => {
                write!(f, "[{}] {}: limit {}", self.code(), self.message(), limit)
            }
            Self::AssetNotFound { symbol }
            | Self::PriceFeedNotFound { feed: symbol }
            | Self::InvalidPrice { feed: symbol } => {
                write!(f, "[{}] {}: {}", self.code(), self.message(), symbol)
            }
            _ => write!(f, "[{}] {}", self.code(), self.message()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for PoolError {}
