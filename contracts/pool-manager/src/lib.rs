//! Pool Manager Contract
//!
//! Owner-facing orchestrator of the liquidation pool. It receives the
//! EUROs mint fees of the vault manager, routes them between stakers and
//! the protocol, liquidates undercollateralized vaults into the pool and
//! carries the owner-only administration.
//!
//! ## Custody
//!
//! Liquidated collateral lands at the manager address. Purchased
//! collateral is pushed to the pool right away; collateral allocated to
//! holders who could not buy it stays here, booked as reserved, until
//! they claim it. Only unreserved balances can be refunded or dropped.
//!
//! ## Atomicity
//!
//! Every command runs against a snapshot: on error the manager and pool
//! state are restored and the events emitted so far are discarded.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use lp_common::{
    access_control::{AccessControl, Permission},
    constants::{
        fees::DEFAULT_POOL_FEE_PERCENTAGE, oracle::EUR_USD_FEED, staking::DEFAULT_HOLDER_LIMIT,
    },
    emergency::Transition,
    errors::{PoolError, PoolResult},
    events::PoolEvent,
    fee_accumulator::{self, FeeSplit},
    interfaces::{ensure_balance, Collaborators, TokenProvider, TokenRegistry},
    types::{
        Address, AssetId, CallContext, PoolAction, PositionView, ReleasedAsset, Symbol, VaultId,
        U256,
    },
    Vec,
};
use lp_liquidation_pool::{
    validate_holder_limit, validate_pool_fee_percentage, EmergencyExit, LiquidationOutcome,
    LiquidationPool, PoolConfig, Pricing, RewardPayout,
};

#[cfg(test)]
mod integration_tests;

/// Log target for manager diagnostics
pub const LOG_TARGET: &str = "lp::manager";

// ============ Manager Config ============

/// Deployment descriptor of the manager and the pool it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ManagerConfig {
    /// Administrator
    pub owner: Address,
    /// Manager custody account, also the fee recipient of the vault manager
    pub address: Address,
    /// Pool custody account
    pub pool: Address,
    /// Receiver of the protocol fee share and of refunds
    pub protocol_wallet: Address,
    pub tst: AssetId,
    pub euros: AssetId,
    /// Feed converting USD valuations into EUR
    pub eur_usd_feed: Symbol,
    /// Initial share of fees credited to stakers (parts per 100_000)
    pub pool_fee_percentage: u32,
    /// Initial holder registry bound
    pub holder_limit: u32,
}

impl ManagerConfig {
    pub fn new(
        owner: Address,
        address: Address,
        pool: Address,
        protocol_wallet: Address,
        tst: AssetId,
        euros: AssetId,
    ) -> Self {
        Self {
            owner,
            address,
            pool,
            protocol_wallet,
            tst,
            euros,
            eur_usd_feed: EUR_USD_FEED,
            pool_fee_percentage: DEFAULT_POOL_FEE_PERCENTAGE,
            holder_limit: DEFAULT_HOLDER_LIMIT,
        }
    }

    pub fn validate(&self) -> PoolResult<()> {
        validate_pool_fee_percentage(self.pool_fee_percentage)?;
        validate_holder_limit(self.holder_limit)
    }

    /// Configuration of the pool deployed by this manager
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            address: self.pool,
            manager: self.address,
            tst: self.tst,
            euros: self.euros,
            protocol_wallet: self.protocol_wallet,
            pool_fee_percentage: self.pool_fee_percentage,
            holder_limit: self.holder_limit,
        }
    }

    /// CBOR deployment descriptor
    pub fn to_cbor(&self) -> PoolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(self, &mut bytes).map_err(|_| PoolError::InvalidEncoding)?;
        Ok(bytes)
    }

    /// Decodes and validates a CBOR deployment descriptor
    pub fn from_cbor(bytes: &[u8]) -> PoolResult<Self> {
        let config: Self = ciborium::de::from_reader(bytes).map_err(|_| PoolError::InvalidEncoding)?;
        config.validate()?;
        Ok(config)
    }
}

// ============ Pool Manager ============

/// Orchestrator state: configuration, roles and the managed pool
#[derive(Debug, Clone)]
pub struct PoolManager {
    pub config: ManagerConfig,
    access: AccessControl,
    pool: LiquidationPool,
}

impl PoolManager {
    /// Deploys the manager together with its pool
    pub fn new(config: ManagerConfig) -> PoolResult<Self> {
        config.validate()?;
        let pool = LiquidationPool::new(config.pool_config())?;
        Ok(Self {
            access: AccessControl::new(config.owner, config.address),
            pool,
            config,
        })
    }

    pub fn pool(&self) -> &LiquidationPool {
        &self.pool
    }

    pub fn owner(&self) -> Address {
        self.access.owner()
    }

    /// Position of `holder` as of `now`
    pub fn position(&self, holder: &Address, now: u64) -> PoolResult<PositionView> {
        self.pool.position(holder, now)
    }

    /// Dispatches one command
    pub fn execute(
        &mut self,
        ctx: &mut CallContext,
        env: &mut Collaborators<'_>,
        action: PoolAction,
    ) -> PoolResult<()> {
        log::trace!(target: LOG_TARGET, "{:?} from {:?}", action, ctx.caller);

        match action {
            PoolAction::IncreasePosition { tst, euros } => {
                self.increase_position(ctx, env.tokens, tst, euros)
            }
            PoolAction::DecreasePosition { tst, euros } => {
                self.decrease_position(ctx, env.tokens, tst, euros)
            }
            PoolAction::ClaimRewards => self.claim_rewards(ctx, env.tokens, env.assets).map(drop),
            PoolAction::EmergencyRemoveStake => self.emergency_remove_stake(ctx, env).map(drop),
            PoolAction::DistributeFees => self.distribute_fees(ctx, env.tokens).map(drop),
            PoolAction::RunLiquidation { vault_id } => {
                self.run_liquidation(ctx, env, vault_id).map(drop)
            }
            PoolAction::RunLiquidations => self.run_liquidations(ctx, env).map(drop),
            PoolAction::SetPoolFeePercentage { percentage } => {
                self.set_pool_fee_percentage(ctx, percentage)
            }
            PoolAction::SetHolderLimit { limit } => self.set_holder_limit(ctx, limit),
            PoolAction::SetEmergency { active } => self.set_emergency(ctx, active).map(drop),
            PoolAction::RefundAssetsToProtocol => {
                self.refund_assets_to_protocol(ctx, env.tokens, env.assets).map(drop)
            }
            PoolAction::RewardDrop => self.reward_drop(ctx, env.tokens, env.assets).map(drop),
        }
    }

    // ============ Staker Commands ============

    pub fn increase_position(
        &mut self,
        ctx: &mut CallContext,
        tokens: &mut dyn TokenProvider,
        tst: U256,
        euros: U256,
    ) -> PoolResult<()> {
        self.atomically(ctx, |manager, ctx| {
            manager.pool.increase_position(ctx, tst, euros, tokens)
        })
    }

    pub fn decrease_position(
        &mut self,
        ctx: &mut CallContext,
        tokens: &mut dyn TokenProvider,
        tst: U256,
        euros: U256,
    ) -> PoolResult<()> {
        self.atomically(ctx, |manager, ctx| {
            manager.pool.decrease_position(ctx, tst, euros, tokens)
        })
    }

    /// Pays the caller every unclaimed reward asset
    pub fn claim_rewards(
        &mut self,
        ctx: &mut CallContext,
        tokens: &mut dyn TokenProvider,
        assets: &dyn TokenRegistry,
    ) -> PoolResult<Vec<RewardPayout>> {
        self.atomically(ctx, |manager, ctx| {
            let holder = ctx.caller;
            let custody = manager.config.address;

            // 1. Reserved parts must be covered by manager custody
            let owed = manager.pool.reward_payouts(&holder, assets)?;
            ensure_reserved_parts(tokens, &custody, &owed)?;

            // 2. Pool pays its part and books the claim
            let mut inner = ctx.on_behalf_of(custody);
            let payouts = manager.pool.claim_rewards(&mut inner, &holder, tokens, assets)?;
            ctx.events.append(inner.events);

            // 3. Manager pays the reserved part
            pay_reserved_parts(tokens, &custody, &holder, &payouts)?;
            Ok(payouts)
        })
    }

    /// Full exit of the caller while the pool is in emergency mode
    pub fn emergency_remove_stake(
        &mut self,
        ctx: &mut CallContext,
        env: &mut Collaborators<'_>,
    ) -> PoolResult<Option<EmergencyExit>> {
        self.atomically(ctx, |manager, ctx| {
            let holder = ctx.caller;
            let custody = manager.config.address;

            // 1. Reserved parts must be covered by manager custody
            let owed = manager.pool.reward_payouts(&holder, env.assets)?;
            ensure_reserved_parts(env.tokens, &custody, &owed)?;

            // 2. Pool settles, charges and returns the stake
            let pricing = Pricing {
                prices: env.prices,
                eur_usd_feed: manager.config.eur_usd_feed,
                collateral_rate: env.vaults.collateral_rate(),
            };
            let mut inner = ctx.on_behalf_of(custody);
            let exit = manager.pool.emergency_remove_stake(
                &mut inner,
                &holder,
                env.tokens,
                env.assets,
                &pricing,
            )?;
            ctx.events.append(inner.events);

            // 3. Manager pays the reserved part
            if let Some(exit) = &exit {
                pay_reserved_parts(env.tokens, &custody, &holder, &exit.rewards)?;
            }
            Ok(exit)
        })
    }

    // ============ Fees and Liquidations ============

    /// Routes the manager's whole EUROs balance between stakers and the protocol
    pub fn distribute_fees(
        &mut self,
        ctx: &mut CallContext,
        tokens: &mut dyn TokenProvider,
    ) -> PoolResult<FeeSplit> {
        self.atomically(ctx, |manager, ctx| manager.route_fees(ctx, tokens))
    }

    /// Liquidates `vault_id` into the pool
    ///
    /// Pending fees are distributed first so that stakers who matured
    /// before the liquidation are paid at the current share split.
    pub fn run_liquidation(
        &mut self,
        ctx: &mut CallContext,
        env: &mut Collaborators<'_>,
        vault_id: VaultId,
    ) -> PoolResult<LiquidationOutcome> {
        self.atomically(ctx, |manager, ctx| manager.liquidate_vault(ctx, env, vault_id))
    }

    /// Liquidates the first undercollateralized vault
    pub fn run_liquidations(
        &mut self,
        ctx: &mut CallContext,
        env: &mut Collaborators<'_>,
    ) -> PoolResult<LiquidationOutcome> {
        self.atomically(ctx, |manager, ctx| {
            let vault_id = env
                .vaults
                .find_undercollateralized_vault(env.prices)?
                .ok_or(PoolError::NoLiquidatableVaults)?;
            manager.liquidate_vault(ctx, env, vault_id)
        })
    }

    // ============ Owner Commands ============

    pub fn set_pool_fee_percentage(&mut self, ctx: &mut CallContext, percentage: u32) -> PoolResult<()> {
        self.atomically(ctx, |manager, ctx| {
            manager.access.require(&ctx.caller, Permission::SetPoolFeePercentage)?;
            let mut inner = ctx.on_behalf_of(manager.config.address);
            manager.pool.set_pool_fee_percentage(&mut inner, percentage)?;
            ctx.events.append(inner.events);
            Ok(())
        })
    }

    pub fn set_holder_limit(&mut self, ctx: &mut CallContext, limit: u32) -> PoolResult<()> {
        self.atomically(ctx, |manager, ctx| {
            manager.access.require(&ctx.caller, Permission::SetHolderLimit)?;
            let mut inner = ctx.on_behalf_of(manager.config.address);
            manager.pool.set_holder_limit(&mut inner, limit)?;
            ctx.events.append(inner.events);
            Ok(())
        })
    }

    /// Enters or leaves emergency mode
    pub fn set_emergency(&mut self, ctx: &mut CallContext, active: bool) -> PoolResult<Transition> {
        self.atomically(ctx, |manager, ctx| {
            manager.access.require(&ctx.caller, Permission::SetEmergency)?;
            let mut inner = ctx.on_behalf_of(manager.config.address);
            let transition = manager.pool.set_emergency(&mut inner, active)?;

            if let Transition::Changed { to, .. } = transition {
                ctx.events.emit(PoolEvent::EmergencyStatusChanged {
                    active,
                    changed_by: ctx.caller,
                    timestamp: ctx.timestamp,
                });
                log::warn!(target: LOG_TARGET, "pool status set to {:?} by {:?}", to, ctx.caller);
            }
            Ok(transition)
        })
    }

    /// Sweeps unreserved collateral held by the manager to the protocol wallet
    pub fn refund_assets_to_protocol(
        &mut self,
        ctx: &mut CallContext,
        tokens: &mut dyn TokenProvider,
        assets: &dyn TokenRegistry,
    ) -> PoolResult<Vec<ReleasedAsset>> {
        self.atomically(ctx, |manager, ctx| {
            manager.access.require(&ctx.caller, Permission::RefundAssets)?;

            let custody = manager.config.address;
            let wallet = manager.config.protocol_wallet;
            let refunds = manager.unreserved_balances(tokens, assets);

            for item in &refunds {
                ctx.events.emit(PoolEvent::AssetsRefunded {
                    symbol: item.asset.symbol,
                    amount: item.amount,
                    to: wallet,
                    timestamp: ctx.timestamp,
                });
            }
            for item in &refunds {
                tokens.transfer(&item.asset.id, &custody, &wallet, item.amount)?;
            }

            log::info!(target: LOG_TARGET, "{} assets refunded to {:?}", refunds.len(), wallet);
            Ok(refunds)
        })
    }

    /// Allocates unreserved manager collateral to stakers without a purchase
    pub fn reward_drop(
        &mut self,
        ctx: &mut CallContext,
        tokens: &mut dyn TokenProvider,
        assets: &dyn TokenRegistry,
    ) -> PoolResult<Vec<ReleasedAsset>> {
        self.atomically(ctx, |manager, ctx| {
            manager.access.require(&ctx.caller, Permission::RewardDrop)?;

            let custody = manager.config.address;
            let drops = manager.unreserved_balances(tokens, assets);
            if drops.is_empty() {
                return Ok(Vec::new());
            }

            // 1. Pool credits the allocations
            let mut inner = ctx.on_behalf_of(custody);
            let allocated = manager.pool.reward_drop(&mut inner, &drops)?;
            ctx.events.append(inner.events);

            // 2. Allocated collateral moves to pool custody
            let mut dropped = Vec::new();
            for (item, amount) in drops.into_iter().zip(allocated) {
                if amount.is_zero() {
                    continue;
                }
                tokens.transfer(&item.asset.id, &custody, &manager.config.pool, amount)?;
                dropped.push(ReleasedAsset { asset: item.asset, amount });
            }
            Ok(dropped)
        })
    }

    /// Hands the owner role to `new_owner`
    pub fn transfer_ownership(&mut self, ctx: &mut CallContext, new_owner: Address) -> PoolResult<()> {
        self.atomically(ctx, |manager, ctx| {
            manager.access.transfer_ownership(&ctx.caller, new_owner)?;
            log::info!(target: LOG_TARGET, "ownership transferred to {:?}", new_owner);
            Ok(())
        })
    }

    // ============ Internals ============

    /// Runs `command`, restoring state and events if it fails
    fn atomically<T>(
        &mut self,
        ctx: &mut CallContext,
        command: impl FnOnce(&mut Self, &mut CallContext) -> PoolResult<T>,
    ) -> PoolResult<T> {
        let snapshot = self.clone();
        let mark = ctx.events.len();

        let result = command(self, ctx);
        if let Err(error) = &result {
            *self = snapshot;
            ctx.events.truncate(mark);
            if error.is_recoverable() {
                log::debug!(target: LOG_TARGET, "command from {:?} rolled back, caller can retry: {}", ctx.caller, error);
            } else {
                log::warn!(target: LOG_TARGET, "command from {:?} rolled back: {}", ctx.caller, error);
            }
        }
        result
    }

    fn route_fees(&mut self, ctx: &mut CallContext, tokens: &mut dyn TokenProvider) -> PoolResult<FeeSplit> {
        let custody = self.config.address;
        let euros = self.config.euros;

        // 1. Everything the manager holds in EUROs is fees; parked fees
        // still need a sweep once there is stake to credit
        let amount = tokens.balance_of(&euros, &custody);
        if amount.is_zero() && self.pool.state().undistributed_fees.is_zero() {
            return Ok(FeeSplit { pool_share: U256::zero(), protocol_share: U256::zero() });
        }

        // 2. Let the pool pull its share
        let expected = fee_accumulator::split_fee(amount, self.pool.state().pool_fee_percentage)?;
        tokens.approve(&euros, &custody, &self.config.pool, expected.pool_share)?;

        let mut inner = ctx.on_behalf_of(custody);
        let split = self.pool.distribute_fees(&mut inner, amount, tokens)?;
        ctx.events.append(inner.events);

        // 3. The rest goes to the protocol
        if !split.protocol_share.is_zero() {
            tokens.transfer(&euros, &custody, &self.config.protocol_wallet, split.protocol_share)?;
        }
        Ok(split)
    }

    fn liquidate_vault(
        &mut self,
        ctx: &mut CallContext,
        env: &mut Collaborators<'_>,
        vault_id: VaultId,
    ) -> PoolResult<LiquidationOutcome> {
        let custody = self.config.address;

        // 1. Vault must be liquidatable
        if !env.vaults.is_undercollateralized(&vault_id, env.prices)? {
            return Err(PoolError::VaultNotUndercollateralized { vault_id });
        }

        // 2. Every price the pool will read, before any funds move
        let pricing = Pricing {
            prices: env.prices,
            eur_usd_feed: self.config.eur_usd_feed,
            collateral_rate: env.vaults.collateral_rate(),
        };
        pricing.quote_all(&env.assets.accepted_assets())?;

        // 3. Pay out accrued fees before the pool changes
        self.route_fees(ctx, env.tokens)?;

        // 4. Take the collateral
        let released = env.vaults.liquidate(&vault_id, &custody, env.tokens)?;

        // 5. Allocate and sell it to the stakers
        let mut inner = ctx.on_behalf_of(custody);
        let outcome = self.pool.distribute_assets(&mut inner, &released, env.tokens, &pricing)?;
        ctx.events.append(inner.events);

        // 6. Purchased collateral moves to the pool
        for (item, purchased) in released.iter().zip(outcome.purchased.iter()) {
            if purchased.is_zero() {
                continue;
            }
            env.tokens.transfer(&item.asset.id, &custody, &self.config.pool, *purchased)?;
        }

        ctx.events.emit(PoolEvent::VaultLiquidated {
            vault_id,
            assets: released.len() as u32,
            timestamp: ctx.timestamp,
        });
        log::info!(
            target: LOG_TARGET,
            "vault {:?} liquidated: {} assets, {} EUROs burned",
            vault_id,
            released.len(),
            outcome.burned
        );
        Ok(outcome)
    }

    /// Manager balance of each accepted asset above what holders are owed
    fn unreserved_balances(&self, tokens: &dyn TokenProvider, assets: &dyn TokenRegistry) -> Vec<ReleasedAsset> {
        let reserved = &self.pool.state().reserved_collateral;
        assets
            .accepted_assets()
            .into_iter()
            .filter_map(|asset| {
                let balance = tokens.balance_of(&asset.id, &self.config.address);
                let amount = balance.saturating_sub(reserved.amount_of(&asset.symbol));
                (!amount.is_zero()).then_some(ReleasedAsset { asset, amount })
            })
            .collect()
    }
}

// ============ Helper Functions ============

fn ensure_reserved_parts(
    tokens: &dyn TokenProvider,
    custody: &Address,
    payouts: &[RewardPayout],
) -> PoolResult<()> {
    for payout in payouts {
        ensure_balance(tokens, &payout.asset.id, custody, payout.from_manager)?;
    }
    Ok(())
}

fn pay_reserved_parts(
    tokens: &mut dyn TokenProvider,
    custody: &Address,
    holder: &Address,
    payouts: &[RewardPayout],
) -> PoolResult<()> {
    for payout in payouts.iter().filter(|p| !p.from_manager.is_zero()) {
        tokens.transfer(&payout.asset.id, custody, holder, payout.from_manager)?;
    }
    Ok(())
}

// ============ Tests ============
