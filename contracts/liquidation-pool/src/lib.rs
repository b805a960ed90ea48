//! Liquidation Pool Contract
//!
//! Holders stake TST and EUROs. Stakes wait one day in a pending queue
//! before they count; consolidated TST earns a share of protocol fees and
//! of the collateral released by liquidated vaults, which holders buy at a
//! discount with their staked EUROs.
//!
//! ## Custody
//!
//! The pool holds staked TST, staked EUROs and purchased collateral.
//! Allocated collateral that a holder could not afford stays with the
//! pool manager and is booked in `reserved_collateral`. Every pool method
//! moves only pool funds; payouts owed from manager custody are returned
//! to the manager as [`RewardPayout::from_manager`].
//!
//! ## Access
//!
//! Staking calls come straight from holders. Fee and asset distribution,
//! claims, emergency exits and parameter changes are accepted only from
//! the pool manager.

use std::collections::BTreeMap;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use lp_common::{
    access_control::{AccessControl, Permission, Role},
    constants::{
        fees::DEFAULT_POOL_FEE_PERCENTAGE, precision::HUNDRED_PC, staking::DEFAULT_HOLDER_LIMIT,
    },
    emergency::{self, ensure_emergency, ensure_normal, Transition},
    errors::{PoolError, PoolResult},
    events::PoolEvent,
    fee_accumulator::{self, Distribution, FeeSplit},
    interfaces::{ensure_balance, ensure_pullable, PriceFeed, TokenProvider, TokenRegistry},
    liquidation::{self, AssetQuote, HolderStake},
    math::{safe_add, safe_sub},
    registry::{self, HolderRegistry},
    stake_ledger::{self, Consolidation},
    types::{
        Address, Asset, AssetId, CallContext, PoolState, Position, PositionView, PriceReading,
        ReleasedAsset, Symbol, U256,
    },
};

/// Log target for pool diagnostics
pub const LOG_TARGET: &str = "lp::pool";

// ============ Pool Config ============

/// Deployment parameters of the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PoolConfig {
    /// Account holding pool custody
    pub address: Address,
    /// Pool manager (only caller of the distribution and admin methods)
    pub manager: Address,
    /// TST token
    pub tst: AssetId,
    /// EUROs token
    pub euros: AssetId,
    /// Receiver of the protocol share of fees
    pub protocol_wallet: Address,
    /// Initial share of fees credited to stakers (parts per 100_000)
    pub pool_fee_percentage: u32,
    /// Initial holder registry bound
    pub holder_limit: u32,
}

impl PoolConfig {
    pub fn new(
        address: Address,
        manager: Address,
        tst: AssetId,
        euros: AssetId,
        protocol_wallet: Address,
    ) -> Self {
        Self {
            address,
            manager,
            tst,
            euros,
            protocol_wallet,
            pool_fee_percentage: DEFAULT_POOL_FEE_PERCENTAGE,
            holder_limit: DEFAULT_HOLDER_LIMIT,
        }
    }

    pub fn validate(&self) -> PoolResult<()> {
        validate_pool_fee_percentage(self.pool_fee_percentage)?;
        validate_holder_limit(self.holder_limit)
    }
}

/// Pool fee percentage must not exceed 100%
pub fn validate_pool_fee_percentage(percentage: u32) -> PoolResult<()> {
    if percentage > HUNDRED_PC {
        return Err(PoolError::InvalidPoolFeePercentage { percentage });
    }
    Ok(())
}

/// Holder limit must allow at least one holder
pub fn validate_holder_limit(limit: u32) -> PoolResult<()> {
    if limit == 0 {
        return Err(PoolError::InvalidHolderLimit);
    }
    Ok(())
}

// ============ Results ============

/// Price inputs for valuing collateral in EUROs
#[derive(Clone, Copy)]
pub struct Pricing<'a> {
    pub prices: &'a dyn PriceFeed,
    pub eur_usd_feed: Symbol,
    /// Purchase discount (parts per 100_000)
    pub collateral_rate: u32,
}

impl Pricing<'_> {
    /// EUR/USD reading and a quote per asset, failing on the first unreadable feed
    pub fn quote_all<'b>(
        &self,
        assets: impl IntoIterator<Item = &'b Asset>,
    ) -> PoolResult<(PriceReading, Vec<AssetQuote>)> {
        let eur_usd = self.prices.latest_price(&self.eur_usd_feed)?;
        let quotes = assets
            .into_iter()
            .map(|asset| quote(asset, self.prices))
            .collect::<PoolResult<Vec<_>>>()?;
        Ok((eur_usd, quotes))
    }
}

/// One reward asset paid to a holder, split by custody
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardPayout {
    pub asset: Asset,
    /// Paid by the pool
    pub from_pool: U256,
    /// Owed by the pool manager
    pub from_manager: U256,
}

impl RewardPayout {
    pub fn total(&self) -> PoolResult<U256> {
        safe_add(self.from_pool, self.from_manager)
    }
}

/// Result of distributing one liquidation, parallel to the released assets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LiquidationOutcome {
    /// Collateral credited to holders as rewards
    pub allocated: Vec<U256>,
    /// Collateral bought, to move from manager to pool custody
    pub purchased: Vec<U256>,
    /// EUROs spent and burned
    pub burned: U256,
    /// Holders that received an allocation
    pub holders: u32,
}

/// Everything returned to a holder by an emergency exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmergencyExit {
    pub tst: U256,
    pub euros: U256,
    /// EUROs burned against the unclaimed rewards
    pub reward_charge: U256,
    pub rewards: Vec<RewardPayout>,
}

// ============ Liquidation Pool ============

/// Pool state, positions and holder registry
#[derive(Debug, Clone)]
pub struct LiquidationPool {
    pub config: PoolConfig,
    access: AccessControl,
    state: PoolState,
    positions: BTreeMap<Address, Position>,
    registry: HolderRegistry,
}

impl LiquidationPool {
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        let state = PoolState::new(
            config.protocol_wallet,
            config.pool_fee_percentage,
            config.holder_limit,
        );
        Ok(Self {
            access: AccessControl::new(config.manager, config.manager),
            state,
            positions: BTreeMap::new(),
            registry: HolderRegistry::new(),
            config,
        })
    }

    pub fn state(&self) -> &PoolState {
        &self.state
    }

    pub fn holders(&self) -> &HolderRegistry {
        &self.registry
    }

    /// Stored position, without settlement
    pub fn position_record(&self, holder: &Address) -> Option<&Position> {
        self.positions.get(holder)
    }

    fn only_manager(&self, caller: &Address) -> PoolResult<()> {
        self.access.require_role(caller, Role::PoolManager)
    }

    // ============ Staking ============

    /// Stakes TST and/or EUROs for the caller as a new pending entry
    pub fn increase_position(
        &mut self,
        ctx: &mut CallContext,
        tst: U256,
        euros: U256,
        tokens: &mut dyn TokenProvider,
    ) -> PoolResult<()> {
        let holder = ctx.caller;

        // 1. Pool must not be in emergency mode
        ensure_normal(&self.state)?;

        // 2. At least one amount must be positive
        if tst.is_zero() && euros.is_zero() {
            return Err(PoolError::ZeroAmount);
        }

        // 3. Both amounts must be pullable from the holder
        ensure_pullable(tokens, &self.config.tst, &self.config.address, &holder, tst)?;
        ensure_pullable(tokens, &self.config.euros, &self.config.address, &holder, euros)?;

        // 4. Settle, consolidate matured stake, then append the deposit
        let mut state = self.state.clone();
        let mut position = self.positions.get(&holder).cloned().unwrap_or_default();
        let consolidation = stake_ledger::refresh(&mut state, &mut position, ctx.timestamp)?;
        stake_ledger::record_stake(&mut position, tst, euros, ctx.timestamp)?;

        // 5. Register the holder
        self.registry.add(holder, self.state.holder_limit)?;

        // 6. Commit
        self.state = state;
        self.positions.insert(holder, position);
        emit_consolidation(ctx, holder, &consolidation);
        ctx.events.emit(PoolEvent::PositionIncreased {
            holder,
            tst,
            euros,
            timestamp: ctx.timestamp,
        });

        // 7. Pull the funds
        pull(tokens, &self.config.tst, &self.config.address, &holder, tst)?;
        pull(tokens, &self.config.euros, &self.config.address, &holder, euros)?;

        log::debug!(target: LOG_TARGET, "{:?} staked {} TST, {} EUROs", holder, tst, euros);
        Ok(())
    }

    /// Withdraws consolidated TST and/or EUROs to the caller
    ///
    /// Matured pending entries are consolidated first, so a stake held
    /// for a full day is withdrawable without any other interaction.
    pub fn decrease_position(
        &mut self,
        ctx: &mut CallContext,
        tst: U256,
        euros: U256,
        tokens: &mut dyn TokenProvider,
    ) -> PoolResult<()> {
        let holder = ctx.caller;

        // 1. Pool must not be in emergency mode
        ensure_normal(&self.state)?;

        // 2. At least one amount must be positive
        if tst.is_zero() && euros.is_zero() {
            return Err(PoolError::ZeroAmount);
        }

        // 3. Settle and consolidate before checking the bound
        let mut state = self.state.clone();
        let mut position = self.positions.get(&holder).cloned().unwrap_or_default();
        let consolidation = stake_ledger::refresh(&mut state, &mut position, ctx.timestamp)?;
        stake_ledger::withdraw(&mut position, tst, euros)?;
        state.total_consolidated_tst = safe_sub(state.total_consolidated_tst, tst)?;

        // 4. Pool custody must cover the payout
        ensure_balance(tokens, &self.config.tst, &self.config.address, tst)?;
        ensure_balance(tokens, &self.config.euros, &self.config.address, euros)?;

        // 5. Commit, dropping an emptied position
        self.state = state;
        self.store_position(holder, position);
        emit_consolidation(ctx, holder, &consolidation);
        ctx.events.emit(PoolEvent::PositionDecreased {
            holder,
            tst,
            euros,
            timestamp: ctx.timestamp,
        });

        // 6. Pay out
        send(tokens, &self.config.tst, &self.config.address, &holder, tst)?;
        send(tokens, &self.config.euros, &self.config.address, &holder, euros)?;

        log::debug!(target: LOG_TARGET, "{:?} withdrew {} TST, {} EUROs", holder, tst, euros);
        Ok(())
    }

    /// Position of `holder` as it would read after a refresh at `now`
    pub fn position(&self, holder: &Address, now: u64) -> PoolResult<PositionView> {
        let mut position = self.positions.get(holder).cloned().unwrap_or_default();
        fee_accumulator::settle(&mut position, self.state.reward_accumulator)?;
        stake_ledger::consolidate_matured(&mut position, now)?;
        let (pending_tst, pending_euros) = stake_ledger::pending_totals(&position)?;

        Ok(PositionView {
            holder: *holder,
            tst: position.consolidated_tst,
            euros: position.consolidated_euros,
            pending_tst,
            pending_euros,
            rewards: position.rewards.entries().to_vec(),
        })
    }

    // ============ Rewards ============

    /// Payout a claim by `holder` would make now, without changing state
    pub fn reward_payouts(
        &self,
        holder: &Address,
        assets: &dyn TokenRegistry,
    ) -> PoolResult<Vec<RewardPayout>> {
        let mut state = self.state.clone();
        let mut position = self.positions.get(holder).cloned().unwrap_or_default();
        take_rewards(&mut state, &mut position, assets)
    }

    /// Pays every unclaimed reward of `holder`
    ///
    /// The pool pays from its own custody first; the returned payouts
    /// carry the remainder the manager owes from reserved collateral.
    pub fn claim_rewards(
        &mut self,
        ctx: &mut CallContext,
        holder: &Address,
        tokens: &mut dyn TokenProvider,
        assets: &dyn TokenRegistry,
    ) -> PoolResult<Vec<RewardPayout>> {
        // 1. Only the manager settles claims
        self.only_manager(&ctx.caller)?;

        // 2. Nothing to claim is a no-op
        let Some(current) = self.positions.get(holder) else {
            return Ok(Vec::new());
        };
        if current.rewards.is_empty() {
            return Ok(Vec::new());
        }

        // 3. Split the payout by custody
        let mut state = self.state.clone();
        let mut position = current.clone();
        let payouts = take_rewards(&mut state, &mut position, assets)?;

        // 4. Pool custody must cover its part
        for payout in &payouts {
            ensure_balance(tokens, &payout.asset.id, &self.config.address, payout.from_pool)?;
        }

        // 5. Commit
        self.state = state;
        self.store_position(*holder, position);
        ctx.events.emit(PoolEvent::RewardsClaimed {
            holder: *holder,
            assets: payouts.len() as u32,
            timestamp: ctx.timestamp,
        });

        // 6. Pay the pool's part
        for payout in &payouts {
            send(tokens, &payout.asset.id, &self.config.address, holder, payout.from_pool)?;
        }

        Ok(payouts)
    }

    /// Full exit of `holder` while the pool is in emergency mode
    ///
    /// Unclaimed rewards are charged at their discounted EUROs price
    /// against the consolidated EUROs, saturating at zero, and the charge
    /// is burned. Everything else is returned and the holder leaves the
    /// registry. Returns `None` when the holder has no position.
    pub fn emergency_remove_stake(
        &mut self,
        ctx: &mut CallContext,
        holder: &Address,
        tokens: &mut dyn TokenProvider,
        assets: &dyn TokenRegistry,
        pricing: &Pricing<'_>,
    ) -> PoolResult<Option<EmergencyExit>> {
        // 1. Only the manager, only in emergency mode
        self.only_manager(&ctx.caller)?;
        ensure_emergency(&self.state)?;

        let Some(current) = self.positions.get(holder) else {
            return Ok(None);
        };

        // 2. Settle and consolidate
        let mut state = self.state.clone();
        let mut position = current.clone();
        stake_ledger::refresh(&mut state, &mut position, ctx.timestamp)?;

        // 3. Charge the unclaimed rewards
        let charge = reward_charge(&position, assets, pricing)?;
        let burned = charge.min(position.consolidated_euros);

        // 4. Everything else goes back to the holder
        let (pending_tst, pending_euros) = stake_ledger::pending_totals(&position)?;
        let tst = safe_add(position.consolidated_tst, pending_tst)?;
        let euros = safe_add(safe_sub(position.consolidated_euros, burned)?, pending_euros)?;
        state.total_consolidated_tst = safe_sub(state.total_consolidated_tst, position.consolidated_tst)?;
        let rewards = take_rewards(&mut state, &mut position, assets)?;

        // 5. Pool custody must cover the exit
        ensure_balance(tokens, &self.config.tst, &self.config.address, tst)?;
        ensure_balance(tokens, &self.config.euros, &self.config.address, safe_add(euros, burned)?)?;
        for payout in &rewards {
            ensure_balance(tokens, &payout.asset.id, &self.config.address, payout.from_pool)?;
        }

        // 6. Commit: the position is gone
        self.state = state;
        self.positions.remove(holder);
        self.registry.remove(holder);
        ctx.events.emit(PoolEvent::EmergencyStakeRemoved {
            holder: *holder,
            tst,
            euros,
            reward_charge: burned,
            timestamp: ctx.timestamp,
        });

        // 7. Burn the charge, return the rest
        if !burned.is_zero() {
            tokens.burn(&self.config.euros, &self.config.address, burned)?;
        }
        send(tokens, &self.config.tst, &self.config.address, holder, tst)?;
        send(tokens, &self.config.euros, &self.config.address, holder, euros)?;
        for payout in &rewards {
            send(tokens, &payout.asset.id, &self.config.address, holder, payout.from_pool)?;
        }

        log::warn!(
            target: LOG_TARGET,
            "emergency exit of {:?}: {} TST, {} EUROs, {} EUROs burned",
            holder,
            tst,
            euros,
            burned
        );
        Ok(Some(EmergencyExit { tst, euros, reward_charge: burned, rewards }))
    }

    // ============ Distribution ============

    /// Splits `amount` of manager-held EUROs fees and credits the pool share
    ///
    /// The pool pulls its share from the manager against an allowance;
    /// the manager sends the protocol share itself.
    pub fn distribute_fees(
        &mut self,
        ctx: &mut CallContext,
        amount: U256,
        tokens: &mut dyn TokenProvider,
    ) -> PoolResult<FeeSplit> {
        let manager = ctx.caller;

        // 1. Only the manager
        self.access.require(&manager, Permission::DistributeFees)?;

        // 2. Split by the pool fee percentage
        let split = fee_accumulator::split_fee(amount, self.state.pool_fee_percentage)?;

        // 3. The pool share must be pullable
        ensure_pullable(tokens, &self.config.euros, &self.config.address, &manager, split.pool_share)?;

        // 4. Matured stake joins this round
        self.refresh_all(ctx)?;

        // 5. A sweep with nothing parked or no base to place it on
        if amount.is_zero()
            && (self.state.undistributed_fees.is_zero() || self.state.total_consolidated_tst.is_zero())
        {
            return Ok(split);
        }

        // 6. Credit the accumulator, parked fees included
        match fee_accumulator::credit(&mut self.state, split.pool_share)? {
            Distribution::Credited { credited, .. } => {
                ctx.events.emit(PoolEvent::FeesDistributed {
                    amount,
                    pool_share: credited,
                    protocol_share: split.protocol_share,
                    accumulator: self.state.reward_accumulator,
                    timestamp: ctx.timestamp,
                });
                log::debug!(target: LOG_TARGET, "fees distributed: {} to stakers", credited);
            }
            Distribution::Deferred { undistributed } => {
                ctx.events.emit(PoolEvent::FeesDeferred {
                    pool_share: split.pool_share,
                    undistributed,
                    timestamp: ctx.timestamp,
                });
                log::warn!(target: LOG_TARGET, "no consolidated TST, {} EUROs of fees deferred", undistributed);
            }
        }

        // 7. Pull the pool share
        pull(tokens, &self.config.euros, &self.config.address, &manager, split.pool_share)?;

        Ok(split)
    }

    /// Allocates liquidated collateral pro-rata and runs the purchase pass
    ///
    /// Collateral stays in manager custody. The outcome tells the manager
    /// how much of each asset was bought and must move to the pool.
    pub fn distribute_assets(
        &mut self,
        ctx: &mut CallContext,
        released: &[ReleasedAsset],
        tokens: &mut dyn TokenProvider,
        pricing: &Pricing<'_>,
    ) -> PoolResult<LiquidationOutcome> {
        // 1. Only the manager
        self.access.require(&ctx.caller, Permission::DistributeAssets)?;

        // 2. Price every released asset before touching state
        let (eur_usd, quotes) = pricing.quote_all(released.iter().map(|item| &item.asset))?;
        let amounts: Vec<U256> = released.iter().map(|item| item.amount).collect();

        let mut outcome = LiquidationOutcome {
            allocated: vec![U256::zero(); released.len()],
            purchased: vec![U256::zero(); released.len()],
            burned: U256::zero(),
            holders: 0,
        };

        // 3. Consolidate matured stake, then snapshot
        self.refresh_all(ctx)?;
        let total_tst = self.state.total_consolidated_tst;
        if total_tst.is_zero() {
            log::warn!(target: LOG_TARGET, "no consolidated TST, liquidated collateral stays with the manager");
            return Ok(outcome);
        }
        let allocations = liquidation::allocate(&self.stake_snapshot(), total_tst, &amounts)?;

        // 4. Credit gross rewards, then buy what each holder's EUROs cover
        for allocation in &allocations {
            let holder = allocation.holder;
            let Some(position) = self.positions.get_mut(&holder) else {
                continue;
            };

            for (index, amount) in allocation.amounts.iter().enumerate() {
                if amount.is_zero() {
                    continue;
                }
                position.rewards.credit(quotes[index].symbol, *amount)?;
                outcome.allocated[index] = safe_add(outcome.allocated[index], *amount)?;
                ctx.events.emit(PoolEvent::CollateralAllocated {
                    holder,
                    symbol: quotes[index].symbol,
                    amount: *amount,
                    timestamp: ctx.timestamp,
                });
            }

            let plan = liquidation::plan_purchases(
                position.consolidated_euros,
                &allocation.amounts,
                &quotes,
                &eur_usd,
                pricing.collateral_rate,
            )?;
            position.consolidated_euros = safe_sub(position.consolidated_euros, plan.spent)?;

            for purchase in &plan.purchases {
                outcome.purchased[purchase.index] =
                    safe_add(outcome.purchased[purchase.index], purchase.amount)?;
                ctx.events.emit(PoolEvent::CollateralPurchased {
                    holder,
                    symbol: quotes[purchase.index].symbol,
                    amount: purchase.amount,
                    cost: purchase.cost,
                    timestamp: ctx.timestamp,
                });
            }
            if plan.exhausted {
                log::warn!(target: LOG_TARGET, "{:?} ran out of EUROs, unpurchased collateral stays reserved", holder);
            }

            outcome.burned = safe_add(outcome.burned, plan.spent)?;
            outcome.holders += 1;
        }

        // 5. Book custody: purchased with the pool, the rest reserved
        for (index, item) in quotes.iter().enumerate() {
            let reserved = safe_sub(outcome.allocated[index], outcome.purchased[index])?;
            self.state.pool_collateral.credit(item.symbol, outcome.purchased[index])?;
            self.state.reserved_collateral.credit(item.symbol, reserved)?;
        }

        // 6. Burn the spent EUROs
        if !outcome.burned.is_zero() {
            ensure_balance(tokens, &self.config.euros, &self.config.address, outcome.burned)?;
            tokens.burn(&self.config.euros, &self.config.address, outcome.burned)?;
        }

        log::info!(
            target: LOG_TARGET,
            "liquidation distributed to {} holders, {} EUROs burned",
            outcome.holders,
            outcome.burned
        );
        Ok(outcome)
    }

    /// Allocates manager-held collateral pro-rata without a purchase
    ///
    /// Returns the amount of each asset allocated; the manager moves that
    /// much into pool custody. Rounding residue stays with the manager.
    pub fn reward_drop(
        &mut self,
        ctx: &mut CallContext,
        drops: &[ReleasedAsset],
    ) -> PoolResult<Vec<U256>> {
        // 1. Only the manager
        self.access.require(&ctx.caller, Permission::DistributeAssets)?;

        // 2. Consolidate matured stake, then snapshot
        self.refresh_all(ctx)?;
        let mut allocated = vec![U256::zero(); drops.len()];
        let total_tst = self.state.total_consolidated_tst;
        if total_tst.is_zero() {
            log::warn!(target: LOG_TARGET, "no consolidated TST, reward drop skipped");
            return Ok(allocated);
        }
        let amounts: Vec<U256> = drops.iter().map(|item| item.amount).collect();
        let allocations = liquidation::allocate(&self.stake_snapshot(), total_tst, &amounts)?;

        // 3. Credit rewards
        for allocation in &allocations {
            let Some(position) = self.positions.get_mut(&allocation.holder) else {
                continue;
            };
            for (index, amount) in allocation.amounts.iter().enumerate() {
                if amount.is_zero() {
                    continue;
                }
                position.rewards.credit(drops[index].asset.symbol, *amount)?;
                allocated[index] = safe_add(allocated[index], *amount)?;
                ctx.events.emit(PoolEvent::CollateralAllocated {
                    holder: allocation.holder,
                    symbol: drops[index].asset.symbol,
                    amount: *amount,
                    timestamp: ctx.timestamp,
                });
            }
        }

        // 4. Dropped collateral is held by the pool
        for (item, amount) in drops.iter().zip(allocated.iter()) {
            if amount.is_zero() {
                continue;
            }
            self.state.pool_collateral.credit(item.asset.symbol, *amount)?;
            ctx.events.emit(PoolEvent::RewardDropped {
                symbol: item.asset.symbol,
                amount: *amount,
                timestamp: ctx.timestamp,
            });
        }

        Ok(allocated)
    }

    // ============ Admin ============

    pub fn set_pool_fee_percentage(&mut self, ctx: &mut CallContext, percentage: u32) -> PoolResult<()> {
        self.only_manager(&ctx.caller)?;
        validate_pool_fee_percentage(percentage)?;

        let old_percentage = self.state.pool_fee_percentage;
        self.state.pool_fee_percentage = percentage;
        ctx.events.emit(PoolEvent::PoolFeePercentageChanged {
            old_percentage,
            new_percentage: percentage,
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    /// Lowering the limit never evicts registered holders
    pub fn set_holder_limit(&mut self, ctx: &mut CallContext, limit: u32) -> PoolResult<()> {
        self.only_manager(&ctx.caller)?;
        validate_holder_limit(limit)?;

        let old_limit = self.state.holder_limit;
        self.state.holder_limit = limit;
        ctx.events.emit(PoolEvent::HolderLimitChanged {
            old_limit,
            new_limit: limit,
            timestamp: ctx.timestamp,
        });
        Ok(())
    }

    pub fn set_emergency(&mut self, ctx: &mut CallContext, active: bool) -> PoolResult<Transition> {
        self.only_manager(&ctx.caller)?;
        Ok(emergency::set_emergency(&mut self.state, active))
    }

    // ============ Internals ============

    /// Settles and consolidates every registered holder
    fn refresh_all(&mut self, ctx: &mut CallContext) -> PoolResult<()> {
        for holder in self.registry.snapshot() {
            if let Some(position) = self.positions.get_mut(&holder) {
                let consolidation = stake_ledger::refresh(&mut self.state, position, ctx.timestamp)?;
                emit_consolidation(ctx, holder, &consolidation);
            }
        }
        Ok(())
    }

    /// Consolidated TST of every registered holder, registry order
    fn stake_snapshot(&self) -> Vec<HolderStake> {
        self.registry
            .iter()
            .filter_map(|holder| {
                self.positions
                    .get(holder)
                    .map(|position| HolderStake { holder: *holder, tst: position.consolidated_tst })
            })
            .collect()
    }

    fn store_position(&mut self, holder: Address, position: Position) {
        if registry::is_empty(&position) {
            self.positions.remove(&holder);
            self.registry.remove(&holder);
        } else {
            self.positions.insert(holder, position);
        }
    }
}

// ============ Helper Functions ============

fn emit_consolidation(ctx: &mut CallContext, holder: Address, consolidation: &Consolidation) {
    if consolidation.is_empty() {
        return;
    }
    ctx.events.emit(PoolEvent::StakeConsolidated {
        holder,
        tst: consolidation.tst,
        euros: consolidation.euros,
        entries: consolidation.entries,
        timestamp: ctx.timestamp,
    });
}

fn quote(asset: &Asset, prices: &dyn PriceFeed) -> PoolResult<AssetQuote> {
    Ok(AssetQuote {
        symbol: asset.symbol,
        decimals: asset.decimals,
        price: prices.latest_price(&asset.price_feed)?,
    })
}

/// Discounted EUROs price of every unclaimed reward of `position`
fn reward_charge(
    position: &Position,
    assets: &dyn TokenRegistry,
    pricing: &Pricing<'_>,
) -> PoolResult<U256> {
    if position.rewards.is_empty() {
        return Ok(U256::zero());
    }
    let eur_usd: PriceReading = pricing.prices.latest_price(&pricing.eur_usd_feed)?;
    position.rewards.entries().iter().try_fold(U256::zero(), |total, reward| {
        let asset = assets.asset_by_symbol(&reward.symbol)?;
        let cost = liquidation::purchase_cost(
            reward.amount,
            &quote(&asset, pricing.prices)?,
            &eur_usd,
            pricing.collateral_rate,
        )?;
        safe_add(total, cost)
    })
}

/// Empties the rewards of `position`, paying from pool custody first
fn take_rewards(
    state: &mut PoolState,
    position: &mut Position,
    assets: &dyn TokenRegistry,
) -> PoolResult<Vec<RewardPayout>> {
    let mut payouts = Vec::new();
    for reward in position.rewards.take() {
        let asset = assets.asset_by_symbol(&reward.symbol)?;
        let from_pool = reward.amount.min(state.pool_collateral.amount_of(&reward.symbol));
        let from_manager = safe_sub(reward.amount, from_pool)?;
        state.pool_collateral.debit(&reward.symbol, from_pool)?;
        state.reserved_collateral.debit(&reward.symbol, from_manager)?;
        payouts.push(RewardPayout { asset, from_pool, from_manager });
    }
    Ok(payouts)
}

/// Pulls `amount` from `owner` into the pool, skipping zero
fn pull(
    tokens: &mut dyn TokenProvider,
    asset: &AssetId,
    pool: &Address,
    owner: &Address,
    amount: U256,
) -> PoolResult<()> {
    if amount.is_zero() {
        return Ok(());
    }
    tokens.transfer_from(asset, pool, owner, pool, amount)
}

/// Sends `amount` out of pool custody, skipping zero
fn send(
    tokens: &mut dyn TokenProvider,
    asset: &AssetId,
    pool: &Address,
    to: &Address,
    amount: U256,
) -> PoolResult<()> {
    if amount.is_zero() {
        return Ok(());
    }
    tokens.transfer(asset, pool, to, amount)
}

// ============ Tests ============
