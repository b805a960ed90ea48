//! Protocol Constants
//!
//! Fixed-point scales, holding periods and default parameters for the
//! TST/EUROs liquidation pool.
//!
//! # Network Configuration
//!
//! Use feature flags to compile for different networks:
//! - `mainnet` - Production values (larger holder registry)
//! - Default (no feature) - Testnet values (small registry for testing)
//!
//! ```toml
//! # For mainnet deployment:
//! lp-common = { path = "...", features = ["mainnet"] }
//! ```

use crate::types::Symbol;

/// Token Metadata
pub mod token {
    use super::Symbol;

    /// Stake token symbol
    pub const TST_SYMBOL: Symbol = Symbol::new("TST");
    /// Stable accounting token symbol
    pub const EUROS_SYMBOL: Symbol = Symbol::new("EUROs");
    /// Native currency pseudo-asset symbol
    pub const NATIVE_SYMBOL: Symbol = Symbol::new("ETH");

    /// TST decimal places
    pub const TST_DECIMALS: u8 = 18;
    /// EUROs decimal places
    pub const EUROS_DECIMALS: u8 = 18;
    /// Native currency decimal places
    pub const NATIVE_DECIMALS: u8 = 18;
}

/// Fixed-point precision
pub mod precision {
    /// Every normalized amount carries 18 decimals
    pub const DECIMALS: u8 = 18;

    /// Denominator of all percentages (100% = 100_000)
    pub const HUNDRED_PC: u32 = 100_000;

    /// Exponent of the reward-per-share accumulator scale (1e18)
    pub const ACCUMULATOR_EXP: usize = 18;
}

/// Staking Configuration
pub mod staking {
    /// One day in seconds
    pub const DAY: u64 = 86_400;

    /// Holding period before a pending stake becomes consolidated
    pub const MATURITY_PERIOD: u64 = DAY;

    /// Maximum number of concurrently registered holders
    /// - Mainnet: 1000 (keeps liquidation iteration bounded)
    /// - Testnet: 100 (small registry for testing)
    #[cfg(feature = "mainnet")]
    pub const DEFAULT_HOLDER_LIMIT: u32 = 1_000;
    #[cfg(not(feature = "mainnet"))]
    pub const DEFAULT_HOLDER_LIMIT: u32 = 100;
}

/// Fee Configuration (parts per 100_000)
pub mod fees {
    /// Share of distributed fees credited to stakers (50%)
    pub const DEFAULT_POOL_FEE_PERCENTAGE: u32 = 50_000;

    /// Fee charged on EUROs minted against a vault (0.5%)
    pub const DEFAULT_MINT_FEE_RATE: u32 = 500;
}

/// Liquidation Configuration (parts per 100_000)
pub mod liquidation {
    /// Minimum collateral rate of a smart vault (110%)
    ///
    /// Liquidated collateral is sold to stakers at `100_000 / rate` of
    /// its market value, roughly 90.9% for the default.
    pub const DEFAULT_COLLATERAL_RATE: u32 = 110_000;
}

/// Oracle Configuration
pub mod oracle {
    use super::Symbol;

    /// Feed used to convert USD valuations into EUR
    pub const EUR_USD_FEED: Symbol = Symbol::new("EUR/USD");

    /// Decimals reported by the reference USD feeds
    pub const FEED_DECIMALS: u8 = 8;

    /// Largest decimal count accepted from a feed
    pub const MAX_FEED_DECIMALS: u8 = 36;
}
