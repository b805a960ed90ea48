//! Core Types for the Liquidation Pool
//!
//! Identifiers, ledger records and command payloads shared by all
//! contract crates. Amounts are 256-bit unsigned integers; TST and EUROs
//! carry 18 decimals, collateral carries its own token decimals.

use core::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{PoolError, PoolResult};
use crate::events::EventLog;
use crate::Vec;

pub use casper_types::U256;

/// Account identity (32 bytes)
pub type Address = [u8; 32];

/// Vault identifier (32 bytes)
pub type VaultId = [u8; 32];

/// Unix timestamp in seconds
pub type Timestamp = u64;

// ============ Identifiers ============

/// Fixed-width asset or feed symbol, left aligned and zero padded
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub struct Symbol(pub [u8; 32]);

impl Symbol {
    /// Builds a symbol from text, truncating past 32 bytes
    pub const fn new(name: &str) -> Self {
        let bytes = name.as_bytes();
        let mut out = [0u8; 32];
        let mut i = 0;
        while i < bytes.len() && i < 32 {
            out[i] = bytes[i];
            i += 1;
        }
        Symbol(out)
    }

    /// Text form without the zero padding
    pub fn as_str(&self) -> &str {
        let len = self.0.iter().position(|b| *b == 0).unwrap_or(32);
        core::str::from_utf8(&self.0[..len]).unwrap_or("")
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an asset lives: the chain's native currency or a token contract
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum AssetId {
    /// Native currency (no allowance semantics)
    Native,
    /// ERC-20 style token at the given address
    Token(Address),
}

/// Accepted collateral asset as reported by the token registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Asset {
    /// Display symbol, also the key of reward entries
    pub symbol: Symbol,
    /// Token location
    pub id: AssetId,
    /// Decimal places of the token
    pub decimals: u8,
    /// Key of the asset's USD price feed
    pub price_feed: Symbol,
}

impl Asset {
    /// Native currency descriptor
    pub fn native(symbol: Symbol, decimals: u8, price_feed: Symbol) -> Self {
        Self { symbol, id: AssetId::Native, decimals, price_feed }
    }

    /// Token descriptor
    pub fn token(symbol: Symbol, address: Address, decimals: u8, price_feed: Symbol) -> Self {
        Self { symbol, id: AssetId::Token(address), decimals, price_feed }
    }
}

/// Latest answer of a price feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceReading {
    /// Price with `decimals` decimal places
    pub answer: u128,
    /// Decimal places of `answer`
    pub decimals: u8,
}

// ============ Ledger Records ============

/// Deposit that has not yet completed its holding period
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingStake {
    pub tst: U256,
    pub euros: U256,
    pub deposited_at: Timestamp,
}

/// Amount of one asset, keyed by symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    pub symbol: Symbol,
    pub amount: U256,
}

/// Per-symbol balances kept in first-credit order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssetBook {
    entries: Vec<AssetAmount>,
}

impl AssetBook {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Balance recorded for `symbol`
    pub fn amount_of(&self, symbol: &Symbol) -> U256 {
        self.entries
            .iter()
            .find(|e| &e.symbol == symbol)
            .map(|e| e.amount)
            .unwrap_or_default()
    }

    /// Adds to the balance of `symbol`
    pub fn credit(&mut self, symbol: Symbol, amount: U256) -> PoolResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        match self.entries.iter_mut().find(|e| e.symbol == symbol) {
            Some(entry) => {
                entry.amount = entry.amount.checked_add(amount).ok_or(PoolError::Overflow)?;
            }
            None => self.entries.push(AssetAmount { symbol, amount }),
        }
        Ok(())
    }

    /// Removes from the balance of `symbol`, dropping emptied entries
    pub fn debit(&mut self, symbol: &Symbol, amount: U256) -> PoolResult<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let index = self
            .entries
            .iter()
            .position(|e| &e.symbol == symbol)
            .ok_or(PoolError::Underflow)?;
        let remaining = self.entries[index]
            .amount
            .checked_sub(amount)
            .ok_or(PoolError::Underflow)?;
        if remaining.is_zero() {
            self.entries.remove(index);
        } else {
            self.entries[index].amount = remaining;
        }
        Ok(())
    }

    /// True when no symbol holds a balance
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.amount.is_zero())
    }

    pub fn entries(&self) -> &[AssetAmount] {
        &self.entries
    }

    /// Empties the book, returning its entries
    pub fn take(&mut self) -> Vec<AssetAmount> {
        core::mem::take(&mut self.entries)
    }
}

/// A holder's stake, fee checkpoint and unclaimed collateral
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    /// Matured TST, counts toward reward share
    pub consolidated_tst: U256,
    /// Matured EUROs plus settled fees, spendable on purchases
    pub consolidated_euros: U256,
    /// Deposits still inside their holding period, oldest first
    pub pending: Vec<PendingStake>,
    /// Accumulator value at the last settlement
    pub reward_checkpoint: U256,
    /// Gross collateral entitlement per symbol
    pub rewards: AssetBook,
}

/// Pool operating mode
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default,
    Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
pub enum PoolStatus {
    #[default]
    Normal,
    Emergency,
}

/// Global pool state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    /// Sum of all consolidated TST
    pub total_consolidated_tst: U256,
    /// Cumulative EUROs per unit TST, scaled by 1e18
    pub reward_accumulator: U256,
    /// Share of fees credited to stakers (parts per 100_000)
    pub pool_fee_percentage: u32,
    /// Maximum number of registered holders
    pub holder_limit: u32,
    /// Normal or emergency mode
    pub status: PoolStatus,
    /// Receiver of the protocol share of fees and of refunds
    pub protocol_wallet: Address,
    /// Pool share of fees received while no TST was consolidated
    pub undistributed_fees: U256,
    /// Purchased collateral held by the pool
    pub pool_collateral: AssetBook,
    /// Allocated but unpurchased collateral held by the manager
    pub reserved_collateral: AssetBook,
}

impl PoolState {
    /// Creates initial pool state
    pub fn new(protocol_wallet: Address, pool_fee_percentage: u32, holder_limit: u32) -> Self {
        Self {
            total_consolidated_tst: U256::zero(),
            reward_accumulator: U256::zero(),
            pool_fee_percentage,
            holder_limit,
            status: PoolStatus::Normal,
            protocol_wallet,
            undistributed_fees: U256::zero(),
            pool_collateral: AssetBook::new(),
            reserved_collateral: AssetBook::new(),
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.status == PoolStatus::Emergency
    }
}

// ============ Views ============

/// Read-only snapshot of a position with fees settled up to now
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PositionView {
    pub holder: Address,
    /// Consolidated TST
    pub tst: U256,
    /// Consolidated EUROs including unsettled fees
    pub euros: U256,
    /// TST still inside the holding period
    pub pending_tst: U256,
    /// EUROs still inside the holding period
    pub pending_euros: U256,
    /// Unclaimed collateral per symbol
    pub rewards: Vec<AssetAmount>,
}

impl PositionView {
    pub fn reward_of(&self, symbol: &Symbol) -> U256 {
        self.rewards
            .iter()
            .find(|r| &r.symbol == symbol)
            .map(|r| r.amount)
            .unwrap_or_default()
    }
}

/// Collateral handed over by a liquidated vault
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedAsset {
    pub asset: Asset,
    pub amount: U256,
}

// ============ Execution Context ============

/// Caller identity, clock and event sink for one command
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Account invoking the command
    pub caller: Address,
    /// Current time in seconds
    pub timestamp: Timestamp,
    /// Events emitted by the command
    pub events: EventLog,
}

impl CallContext {
    pub fn new(caller: Address, timestamp: Timestamp) -> Self {
        Self { caller, timestamp, events: EventLog::new() }
    }

    /// Context for a nested call made by `caller` at the same time
    pub fn on_behalf_of(&self, caller: Address) -> Self {
        Self::new(caller, self.timestamp)
    }
}

// ============ Action Types ============

/// Commands accepted by the pool manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolAction {
    /// Stake TST and/or EUROs
    IncreasePosition { tst: U256, euros: U256 },
    /// Withdraw consolidated TST and/or EUROs
    DecreasePosition { tst: U256, euros: U256 },
    /// Withdraw every unclaimed reward asset
    ClaimRewards,
    /// Exit everything while the pool is in emergency mode
    EmergencyRemoveStake,
    /// Split the manager's EUROs between stakers and the protocol
    DistributeFees,
    /// Liquidate a specific vault
    RunLiquidation { vault_id: VaultId },
    /// Liquidate the first undercollateralized vault
    RunLiquidations,
    /// Owner: change the stakers' share of fees
    SetPoolFeePercentage { percentage: u32 },
    /// Owner: change the registry bound
    SetHolderLimit { limit: u32 },
    /// Owner: enter or leave emergency mode
    SetEmergency { active: bool },
    /// Owner: sweep unreserved manager collateral to the protocol wallet
    RefundAssetsToProtocol,
    /// Owner: allocate unreserved manager collateral to stakers
    RewardDrop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_round_trip_text() {
        let symbol = Symbol::new("WBTC");
        assert_eq!(symbol.as_str(), "WBTC");
        assert_eq!(symbol.0[4], 0);
        assert_eq!(format!("{}", symbol), "WBTC");
    }

    #[test]
    fn test_symbol_truncates_long_names() {
        let symbol = Symbol::new("A-VERY-LONG-FEED-NAME-THAT-DOES-NOT-FIT");
        assert_eq!(symbol.as_str().len(), 32);
    }

    #[test]
    fn test_asset_book_credit_and_debit() {
        let eth = Symbol::new("ETH");
        let usdc = Symbol::new("USDC");
        let mut book = AssetBook::new();

        book.credit(eth, U256::from(5u64)).unwrap();
        book.credit(usdc, U256::from(7u64)).unwrap();
        book.credit(eth, U256::from(3u64)).unwrap();

        assert_eq!(book.amount_of(&eth), U256::from(8u64));
        assert_eq!(book.entries()[0].symbol, eth);

        book.debit(&eth, U256::from(8u64)).unwrap();
        assert_eq!(book.amount_of(&eth), U256::zero());
        assert_eq!(book.entries().len(), 1);

        assert_eq!(book.debit(&usdc, U256::from(8u64)), Err(PoolError::Underflow));
        assert!(!book.is_empty());
    }

    #[test]
    fn test_zero_credit_creates_no_entry() {
        let mut book = AssetBook::new();
        book.credit(Symbol::new("ETH"), U256::zero()).unwrap();
        assert!(book.entries().is_empty());
        assert!(book.is_empty());
    }

    #[test]
    fn test_pool_state_defaults() {
        let state = PoolState::new([9u8; 32], 50_000, 10);
        assert_eq!(state.status, PoolStatus::Normal);
        assert!(!state.is_emergency());
        assert!(state.reward_accumulator.is_zero());
    }
}
