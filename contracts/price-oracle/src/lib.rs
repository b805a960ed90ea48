//! Price Oracle Contract
//!
//! Chainlink-style USD feeds keyed by symbol (`ETH/USD`, `WBTC/USD`,
//! `EUR/USD`, ...). Each feed reports its latest answer with its own
//! decimals. The admin registers feeds; each feed has one operator who
//! pushes new rounds.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use lp_common::{
    constants::oracle::MAX_FEED_DECIMALS,
    errors::{PoolError, PoolResult},
    interfaces::PriceFeed,
    types::{Address, PriceReading, Symbol, Timestamp},
};

/// Log target for oracle diagnostics
pub const LOG_TARGET: &str = "lp::oracle";

// ============ Feed State ============

/// Latest round of one feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct FeedState {
    /// Latest answer with `decimals` decimal places
    pub answer: u128,
    pub decimals: u8,
    /// Incremented on every update, starts at 1
    pub round_id: u64,
    /// Time of the latest update
    pub updated_at: Timestamp,
    /// Account allowed to push rounds
    pub operator: Address,
}

impl FeedState {
    pub fn reading(&self) -> PriceReading {
        PriceReading { answer: self.answer, decimals: self.decimals }
    }
}

// ============ Oracle ============

/// Set of price feeds under one admin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PriceOracle {
    /// Registers feeds and changes operators
    pub admin: Address,
    feeds: BTreeMap<Symbol, FeedState>,
}

impl PriceOracle {
    pub fn new(admin: Address) -> Self {
        Self { admin, feeds: BTreeMap::new() }
    }

    /// Registers a feed with its first round
    pub fn add_feed(
        &mut self,
        caller: &Address,
        feed: Symbol,
        decimals: u8,
        operator: Address,
        answer: u128,
        now: Timestamp,
    ) -> PoolResult<()> {
        // 1. Only admin can register feeds
        if *caller != self.admin {
            return Err(PoolError::NotOwner { caller: *caller });
        }

        // 2. Answer must be usable
        validate_answer(&feed, answer, decimals)?;

        // 3. Store the first round
        self.feeds.insert(
            feed,
            FeedState { answer, decimals, round_id: 1, updated_at: now, operator },
        );

        log::debug!(target: LOG_TARGET, "feed {} added at {} ({} decimals)", feed, answer, decimals);
        Ok(())
    }

    /// Pushes a new round to `feed`
    pub fn update_price(
        &mut self,
        caller: &Address,
        feed: &Symbol,
        answer: u128,
        now: Timestamp,
    ) -> PoolResult<()> {
        let state = self
            .feeds
            .get_mut(feed)
            .ok_or(PoolError::PriceFeedNotFound { feed: *feed })?;

        // 1. Only the feed operator can update
        if *caller != state.operator {
            return Err(PoolError::NotFeedOperator { caller: *caller });
        }

        // 2. Answer must be positive
        validate_answer(feed, answer, state.decimals)?;

        // 3. Record the round
        let old_answer = state.answer;
        state.answer = answer;
        state.round_id = state.round_id.saturating_add(1);
        state.updated_at = now;

        log::debug!(
            target: LOG_TARGET,
            "feed {} round {}: {} -> {}",
            feed,
            state.round_id,
            old_answer,
            answer
        );
        Ok(())
    }

    /// Hands a feed to a new operator
    pub fn set_operator(&mut self, caller: &Address, feed: &Symbol, operator: Address) -> PoolResult<()> {
        if *caller != self.admin {
            return Err(PoolError::NotOwner { caller: *caller });
        }
        let state = self
            .feeds
            .get_mut(feed)
            .ok_or(PoolError::PriceFeedNotFound { feed: *feed })?;
        state.operator = operator;
        Ok(())
    }

    /// Latest round of `feed`, if registered
    pub fn latest_round(&self, feed: &Symbol) -> Option<&FeedState> {
        self.feeds.get(feed)
    }
}

impl PriceFeed for PriceOracle {
    fn latest_price(&self, feed: &Symbol) -> PoolResult<PriceReading> {
        let state = self
            .latest_round(feed)
            .ok_or(PoolError::PriceFeedNotFound { feed: *feed })?;
        validate_answer(feed, state.answer, state.decimals)?;
        Ok(state.reading())
    }
}

// ============ Helper Functions ============

/// Rejects zero answers and decimals past what U256 math can scale
fn validate_answer(feed: &Symbol, answer: u128, decimals: u8) -> PoolResult<()> {
    if answer == 0 || decimals > MAX_FEED_DECIMALS {
        return Err(PoolError::InvalidPrice { feed: *feed });
    }
    Ok(())
}

// ============ Tests ============
