//! Integration tests wiring the manager, pool, vaults, oracle and token
//! ledger together.
//!
//! Reference market: ETH $1900, WBTC $35 000, USDC $1, EUR $1.06, all
//! feeds with 8 decimals; vault collateral rate 110%.

use super::*;
use lp_common::constants::{
    oracle::FEED_DECIMALS,
    precision::HUNDRED_PC,
    staking::DAY,
    token::{EUROS_SYMBOL, NATIVE_DECIMALS, NATIVE_SYMBOL, TST_SYMBOL},
};
use lp_common::events::EventType;
use lp_common::interfaces::VaultManager;
use lp_price_oracle::PriceOracle;
use lp_token::TokenLedger;
use lp_vault_manager::{SmartVaultManager, TokenManager, VaultManagerConfig};
use pretty_assertions::assert_eq;

// ============ Fixtures ============

const ADMIN: Address = [0u8; 32];
const OWNER: Address = [1u8; 32];
const KEEPER: Address = [7u8; 32];
const HOLDER1: Address = [0x11u8; 32];
const HOLDER2: Address = [0x12u8; 32];
const HOLDER3: Address = [0x13u8; 32];
const BORROWER: Address = [0x20u8; 32];
const MANAGER: Address = [0x9Eu8; 32];
const POOL: Address = [0xB0u8; 32];
const VAULTS: Address = [0x5Au8; 32];
const PROTOCOL: Address = [0xFEu8; 32];

const TST_ADDRESS: Address = [0x75u8; 32];
const EUROS_ADDRESS: Address = [0xE0u8; 32];
const WBTC_ADDRESS: Address = [0xB7u8; 32];
const USDC_ADDRESS: Address = [0xC0u8; 32];

const WBTC: Symbol = Symbol::new("WBTC");
const USDC: Symbol = Symbol::new("USDC");
const ETH_USD_FEED: Symbol = Symbol::new("ETH/USD");
const WBTC_USD_FEED: Symbol = Symbol::new("WBTC/USD");
const USDC_USD_FEED: Symbol = Symbol::new("USDC/USD");

const ETH_USD_1900: u128 = 190_000_000_000;
const ETH_USD_3000: u128 = 300_000_000_000;
const WBTC_USD_35000: u128 = 3_500_000_000_000;
const USDC_USD_1: u128 = 100_000_000;
const EUR_USD_106: u128 = 106_000_000;

const T0: u64 = 1_700_000_000;

fn ether(whole: u64) -> U256 {
    U256::from(whole) * U256::exp10(18)
}

/// Amount with 18 decimals given in hundredths
fn cents(hundredths: u64) -> U256 {
    U256::from(hundredths) * U256::exp10(16)
}

fn create_registry() -> TokenManager {
    let mut registry = TokenManager::new(NATIVE_SYMBOL, NATIVE_DECIMALS, ETH_USD_FEED);
    registry.add_accepted_token(WBTC, WBTC_ADDRESS, 8, WBTC_USD_FEED);
    registry.add_accepted_token(USDC, USDC_ADDRESS, 6, USDC_USD_FEED);
    registry
}

struct Harness {
    manager: PoolManager,
    tokens: TokenLedger,
    prices: PriceOracle,
    vaults: SmartVaultManager,
    registry: TokenManager,
    tst: AssetId,
    euros: AssetId,
    wbtc: AssetId,
    usdc: AssetId,
}

fn create_harness(mint_fee_rate: u32) -> Harness {
    let mut tokens = TokenLedger::new();
    let tst = tokens.register_token(TST_ADDRESS, TST_SYMBOL, 18);
    let euros = tokens.register_token(EUROS_ADDRESS, EUROS_SYMBOL, 18);
    let wbtc = tokens.register_token(WBTC_ADDRESS, WBTC, 8);
    let usdc = tokens.register_token(USDC_ADDRESS, USDC, 6);

    let mut prices = PriceOracle::new(ADMIN);
    prices.add_feed(&ADMIN, ETH_USD_FEED, FEED_DECIMALS, ADMIN, ETH_USD_1900, T0).unwrap();
    prices.add_feed(&ADMIN, WBTC_USD_FEED, FEED_DECIMALS, ADMIN, WBTC_USD_35000, T0).unwrap();
    prices.add_feed(&ADMIN, USDC_USD_FEED, FEED_DECIMALS, ADMIN, USDC_USD_1, T0).unwrap();
    prices.add_feed(&ADMIN, EUR_USD_FEED, FEED_DECIMALS, ADMIN, EUR_USD_106, T0).unwrap();

    let mut vault_config = VaultManagerConfig::new(VAULTS, euros, EUR_USD_FEED, MANAGER);
    vault_config.mint_fee_rate = mint_fee_rate;
    let vaults = SmartVaultManager::new(vault_config, create_registry()).unwrap();

    let config = ManagerConfig::new(OWNER, MANAGER, POOL, PROTOCOL, tst, euros);
    let manager = PoolManager::new(config).unwrap();

    Harness {
        manager,
        tokens,
        prices,
        vaults,
        registry: create_registry(),
        tst,
        euros,
        wbtc,
        usdc,
    }
}

impl Harness {
    fn run(&mut self, caller: Address, at: u64, action: PoolAction) -> PoolResult<CallContext> {
        let mut ctx = CallContext::new(caller, at);
        let mut env = Collaborators {
            tokens: &mut self.tokens,
            prices: &self.prices,
            vaults: &mut self.vaults,
            assets: &self.registry,
        };
        self.manager.execute(&mut ctx, &mut env, action)?;
        Ok(ctx)
    }

    fn fund(&mut self, holder: Address, tst: U256, euros: U256) {
        if !tst.is_zero() {
            self.tokens.mint(&self.tst, &holder, tst).unwrap();
            self.tokens.approve(&self.tst, &holder, &POOL, tst).unwrap();
        }
        if !euros.is_zero() {
            self.tokens.mint(&self.euros, &holder, euros).unwrap();
            self.tokens.approve(&self.euros, &holder, &POOL, euros).unwrap();
        }
    }

    fn stake(&mut self, holder: Address, tst: u64, euros: u64, at: u64) {
        self.fund(holder, ether(tst), ether(euros));
        self.run(holder, at, PoolAction::IncreasePosition { tst: ether(tst), euros: ether(euros) })
            .unwrap();
    }

    /// Simulates mint fees accrued at the manager
    fn accrue_fees(&mut self, amount: U256) {
        self.tokens.mint(&self.euros, &MANAGER, amount).unwrap();
    }

    fn position(&self, holder: &Address, at: u64) -> PositionView {
        self.manager.position(holder, at).unwrap()
    }

    fn set_eth_price(&mut self, answer: u128, at: u64) {
        self.prices.update_price(&ADMIN, &ETH_USD_FEED, answer, at).unwrap();
    }

    /// Opens a vault for BORROWER with the given collateral and debt
    fn open_vault(&mut self, collateral: &[(Symbol, AssetId, U256)], minted: U256, at: u64) -> VaultId {
        let vault_id = self.vaults.open_vault(&BORROWER, at);
        for (symbol, asset, amount) in collateral {
            self.tokens.mint(asset, &BORROWER, *amount).unwrap();
            self.vaults
                .add_collateral(&BORROWER, &vault_id, symbol, *amount, &mut self.tokens)
                .unwrap();
        }
        self.vaults
            .mint_euros(&BORROWER, &vault_id, minted, &mut self.tokens, &self.prices)
            .unwrap();
        vault_id
    }

    /// 0.5 ETH, 0.01 WBTC and 500 USDC backing 1600 EUROs, opened while
    /// ETH traded at $3000 and left undercollateralized at $1900
    fn open_risky_vault(&mut self, at: u64) -> VaultId {
        self.set_eth_price(ETH_USD_3000, at);
        let collateral = [
            (NATIVE_SYMBOL, AssetId::Native, U256::exp10(17) * U256::from(5u64)),
            (WBTC, self.wbtc, U256::from(1_000_000u64)),
            (USDC, self.usdc, U256::from(500_000_000u64)),
        ];
        let vault_id = self.open_vault(&collateral, ether(1_600), at);
        self.set_eth_price(ETH_USD_1900, at);
        vault_id
    }
}

// ============ Fee Distribution ============

#[test]
fn test_fee_scenario() {
    let mut h = create_harness(0);
    h.run(OWNER, T0, PoolAction::SetPoolFeePercentage { percentage: HUNDRED_PC })
        .unwrap();
    h.stake(HOLDER1, 10_000, 0, T0);
    h.stake(HOLDER2, 90_000, 0, T0);

    // Round one: both stakes matured
    h.accrue_fees(ether(100));
    let ctx = h.run(KEEPER, T0 + DAY, PoolAction::DistributeFees).unwrap();
    assert_eq!(ctx.events.filter_by_type(EventType::FeesDistributed).len(), 1);
    assert_eq!(h.position(&HOLDER1, T0 + DAY).euros, ether(10));
    assert_eq!(h.position(&HOLDER2, T0 + DAY).euros, ether(90));

    // A late staker earns nothing from past rounds
    h.stake(HOLDER3, 100_000, 0, T0 + DAY);
    assert_eq!(h.position(&HOLDER3, T0 + 2 * DAY).euros, U256::zero());

    // Round two: HOLDER3 matured, HOLDER1's top-up still pending
    h.stake(HOLDER1, 100_000, 0, T0 + 2 * DAY);
    h.accrue_fees(ether(100));
    h.run(KEEPER, T0 + 2 * DAY, PoolAction::DistributeFees).unwrap();

    assert_eq!(h.position(&HOLDER1, T0 + 2 * DAY).euros, ether(15));
    assert_eq!(h.position(&HOLDER2, T0 + 2 * DAY).euros, ether(135));
    assert_eq!(h.position(&HOLDER3, T0 + 2 * DAY).euros, ether(50));
    assert_eq!(h.position(&HOLDER1, T0 + 2 * DAY).pending_tst, ether(100_000));
    assert_eq!(h.tokens.balance_of(&h.euros, &PROTOCOL), U256::zero());
    assert_eq!(h.tokens.balance_of(&h.euros, &POOL), ether(200));
}

#[test]
fn test_mint_fees_flow_to_stakers_and_protocol() {
    let mut h = create_harness(500);
    h.stake(HOLDER1, 1_000, 0, T0);

    // 0.5% of 1000 EUROs lands at the manager
    h.open_vault(&[(NATIVE_SYMBOL, AssetId::Native, ether(1))], ether(1_000), T0);
    assert_eq!(h.tokens.balance_of(&h.euros, &MANAGER), ether(5));

    h.run(KEEPER, T0 + DAY, PoolAction::DistributeFees).unwrap();

    assert_eq!(h.position(&HOLDER1, T0 + DAY).euros, cents(250));
    assert_eq!(h.tokens.balance_of(&h.euros, &PROTOCOL), cents(250));
    assert_eq!(h.tokens.balance_of(&h.euros, &MANAGER), U256::zero());
}

#[test]
fn test_stake_ignored_until_matured() {
    let mut h = create_harness(0);
    h.run(OWNER, T0, PoolAction::SetPoolFeePercentage { percentage: HUNDRED_PC })
        .unwrap();
    h.stake(HOLDER1, 1_000, 0, T0);

    // One second short of a day: parked, not distributed
    h.accrue_fees(ether(30));
    let ctx = h.run(KEEPER, T0 + DAY - 1, PoolAction::DistributeFees).unwrap();
    assert_eq!(ctx.events.filter_by_type(EventType::FeesDeferred).len(), 1);
    assert_eq!(h.position(&HOLDER1, T0 + DAY - 1).euros, U256::zero());
    assert_eq!(h.manager.pool().state().undistributed_fees, ether(30));

    // At exactly one day the stake counts and collects the parked fees
    h.accrue_fees(ether(10));
    h.run(KEEPER, T0 + DAY, PoolAction::DistributeFees).unwrap();
    assert_eq!(h.position(&HOLDER1, T0 + DAY).euros, ether(40));
    assert!(h.manager.pool().state().undistributed_fees.is_zero());
}

#[test]
fn test_distribute_fees_without_balance_is_noop() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 1_000, 0, T0);

    let ctx = h.run(KEEPER, T0 + DAY, PoolAction::DistributeFees).unwrap();

    assert!(!ctx.events.has_events());
    assert!(h.manager.pool().state().reward_accumulator.is_zero());
}

#[test]
fn test_parked_fees_swept_without_new_fees() {
    let mut h = create_harness(0);
    h.run(OWNER, T0, PoolAction::SetPoolFeePercentage { percentage: HUNDRED_PC })
        .unwrap();
    h.stake(HOLDER1, 1_000, 0, T0);
    h.accrue_fees(ether(30));
    h.run(KEEPER, T0 + 1, PoolAction::DistributeFees).unwrap();
    assert_eq!(h.manager.pool().state().undistributed_fees, ether(30));

    // Nothing new at the manager, but the stake has matured
    assert!(h.tokens.balance_of(&h.euros, &MANAGER).is_zero());
    let ctx = h.run(KEEPER, T0 + DAY, PoolAction::DistributeFees).unwrap();

    assert_eq!(ctx.events.filter_by_type(EventType::FeesDistributed).len(), 1);
    assert_eq!(h.position(&HOLDER1, T0 + DAY).euros, ether(30));
    assert!(h.manager.pool().state().undistributed_fees.is_zero());
}

// ============ Staking Bounds ============

#[test]
fn test_decrease_bounded_regardless_of_pool_balance() {
    let mut h = create_harness(0);
    h.stake(HOLDER2, 1_000, 1_000, T0 - DAY);
    h.stake(HOLDER1, 100, 100, T0);

    // The pool holds plenty, but HOLDER1 has nothing consolidated
    let result = h.run(HOLDER1, T0 + 1, PoolAction::DecreasePosition { tst: ether(50), euros: U256::zero() });
    assert!(matches!(result, Err(PoolError::InvalidDecreaseAmount { .. })));
    assert_eq!(h.tokens.balance_of(&h.tst, &HOLDER1), U256::zero());

    // Matured stake is withdrawable without any other interaction
    h.run(HOLDER1, T0 + DAY, PoolAction::DecreasePosition { tst: ether(50), euros: ether(100) })
        .unwrap();
    assert_eq!(h.tokens.balance_of(&h.tst, &HOLDER1), ether(50));
    assert_eq!(h.tokens.balance_of(&h.euros, &HOLDER1), ether(100));
}

#[test]
fn test_zero_decrease_rejected() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 100, 0, T0);

    let result = h.run(HOLDER1, T0 + DAY, PoolAction::DecreasePosition { tst: U256::zero(), euros: U256::zero() });
    assert_eq!(result.map(|_| ()), Err(PoolError::ZeroAmount));
}

#[test]
fn test_holder_cap() {
    let mut h = create_harness(0);
    h.run(OWNER, T0, PoolAction::SetHolderLimit { limit: 2 }).unwrap();
    h.stake(HOLDER1, 10, 0, T0);
    h.stake(HOLDER2, 10, 0, T0);

    h.fund(HOLDER3, ether(10), U256::zero());
    let result = h.run(HOLDER3, T0, PoolAction::IncreasePosition { tst: ether(10), euros: U256::zero() });
    assert_eq!(result.map(|_| ()), Err(PoolError::HolderLimitExceeded { limit: 2 }));
    assert_eq!(h.tokens.balance_of(&h.tst, &HOLDER3), ether(10));

    // A full exit frees the slot
    h.run(HOLDER1, T0 + DAY, PoolAction::DecreasePosition { tst: ether(10), euros: U256::zero() })
        .unwrap();
    h.run(HOLDER3, T0 + DAY, PoolAction::IncreasePosition { tst: ether(10), euros: U256::zero() })
        .unwrap();
    assert!(h.manager.pool().holders().contains(&HOLDER3));
    assert!(!h.manager.pool().holders().contains(&HOLDER1));
}

// ============ Liquidations ============

#[test]
fn test_liquidation_scenario() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 1_000, 2_000, T0);
    h.stake(HOLDER2, 3_000, 3_000, T0);
    let vault_id = h.open_risky_vault(T0);
    assert!(h.vaults.is_undercollateralized(&vault_id, &h.prices).unwrap());
    let supply_before = h.tokens.total_supply(&h.euros);

    let ctx = h.run(KEEPER, T0 + DAY, PoolAction::RunLiquidation { vault_id }).unwrap();

    // 25% / 75% of the collateral, bought at a 1/1.1 discount
    let holder1 = h.position(&HOLDER1, T0 + DAY);
    let holder2 = h.position(&HOLDER2, T0 + DAY);
    assert!(holder1.euros >= cents(161_406) && holder1.euros <= cents(161_407));
    assert!(holder2.euros >= cents(184_219) && holder2.euros <= cents(184_220));

    assert_eq!(holder1.reward_of(&NATIVE_SYMBOL), U256::exp10(15) * U256::from(125u64));
    assert_eq!(holder1.reward_of(&WBTC), U256::from(250_000u64));
    assert_eq!(holder1.reward_of(&USDC), U256::from(125_000_000u64));
    assert_eq!(holder2.reward_of(&NATIVE_SYMBOL), U256::exp10(15) * U256::from(375u64));
    assert_eq!(holder2.reward_of(&WBTC), U256::from(750_000u64));
    assert_eq!(holder2.reward_of(&USDC), U256::from(375_000_000u64));

    // EUROs spent == EUROs burned == supply delta
    let spent = ether(5_000) - holder1.euros - holder2.euros;
    assert_eq!(supply_before - h.tokens.total_supply(&h.euros), spent);

    // Everything was bought, so everything sits with the pool
    assert_eq!(h.tokens.balance_of(&AssetId::Native, &POOL), U256::exp10(17) * U256::from(5u64));
    assert_eq!(h.tokens.balance_of(&h.wbtc, &POOL), U256::from(1_000_000u64));
    assert_eq!(h.tokens.balance_of(&h.usdc, &POOL), U256::from(500_000_000u64));
    assert_eq!(h.tokens.balance_of(&AssetId::Native, &MANAGER), U256::zero());
    assert!(h.manager.pool().state().reserved_collateral.is_empty());

    assert_eq!(ctx.events.filter_by_type(EventType::VaultLiquidated).len(), 1);
    assert_eq!(ctx.events.filter_by_type(EventType::CollateralPurchased).len(), 6);
    assert!(h.vaults.vault(&vault_id).unwrap().liquidated);

    // HOLDER1 collects the purchased collateral
    h.run(HOLDER1, T0 + DAY, PoolAction::ClaimRewards).unwrap();
    assert_eq!(h.tokens.balance_of(&h.wbtc, &HOLDER1), U256::from(250_000u64));
    assert_eq!(h.tokens.balance_of(&AssetId::Native, &HOLDER1), U256::exp10(15) * U256::from(125u64));
    assert!(h.position(&HOLDER1, T0 + DAY).rewards.is_empty());
}

#[test]
fn test_healthy_vault_not_liquidated() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 1_000, 2_000, T0);
    let vault_id = h.open_vault(&[(NATIVE_SYMBOL, AssetId::Native, ether(1))], ether(100), T0);

    let result = h.run(KEEPER, T0 + DAY, PoolAction::RunLiquidation { vault_id });
    assert_eq!(result.map(|_| ()), Err(PoolError::VaultNotUndercollateralized { vault_id }));

    let result = h.run(KEEPER, T0 + DAY, PoolAction::RunLiquidations);
    let error = result.map(|_| ()).unwrap_err();
    assert_eq!(error, PoolError::NoLiquidatableVaults);
    assert_eq!(error.message(), "no-liquidatable-vaults");
}

#[test]
fn test_run_liquidations_finds_vault() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 1_000, 5_000, T0);
    let vault_id = h.open_risky_vault(T0);

    h.run(KEEPER, T0 + DAY, PoolAction::RunLiquidations).unwrap();

    assert!(h.vaults.vault(&vault_id).unwrap().liquidated);
    let result = h.run(KEEPER, T0 + DAY, PoolAction::RunLiquidations);
    assert_eq!(result.map(|_| ()), Err(PoolError::NoLiquidatableVaults));
}

#[test]
fn test_unpurchased_collateral_stays_reserved() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 1_000, 2_000, T0);
    h.stake(HOLDER2, 3_000, 0, T0);
    let vault_id = h.open_risky_vault(T0);

    h.run(KEEPER, T0 + DAY, PoolAction::RunLiquidation { vault_id }).unwrap();

    // HOLDER2 had no EUROs: entitled to 75% that never left the manager
    let reserved = &h.manager.pool().state().reserved_collateral;
    assert_eq!(reserved.amount_of(&WBTC), U256::from(750_000u64));
    assert_eq!(h.tokens.balance_of(&h.wbtc, &MANAGER), U256::from(750_000u64));

    // A refund leaves reserved collateral alone
    let ctx = h.run(OWNER, T0 + DAY, PoolAction::RefundAssetsToProtocol).unwrap();
    assert!(ctx.events.filter_by_type(EventType::AssetsRefunded).is_empty());
    assert_eq!(h.tokens.balance_of(&h.wbtc, &PROTOCOL), U256::zero());

    // Pool custody pays first, the manager covers the rest
    h.run(HOLDER2, T0 + DAY, PoolAction::ClaimRewards).unwrap();
    assert_eq!(h.tokens.balance_of(&h.wbtc, &HOLDER2), U256::from(750_000u64));
    assert_eq!(h.tokens.balance_of(&h.usdc, &HOLDER2), U256::from(375_000_000u64));
    assert_eq!(
        h.tokens.balance_of(&h.wbtc, &MANAGER),
        h.manager.pool().state().reserved_collateral.amount_of(&WBTC)
    );

    h.run(HOLDER1, T0 + DAY, PoolAction::ClaimRewards).unwrap();
    assert_eq!(h.tokens.balance_of(&h.wbtc, &HOLDER1), U256::from(250_000u64));
    assert_eq!(h.tokens.balance_of(&h.wbtc, &MANAGER), U256::zero());
    assert_eq!(h.tokens.balance_of(&h.wbtc, &POOL), U256::zero());
    assert!(h.manager.pool().state().reserved_collateral.is_empty());
}

#[test]
fn test_liquidation_without_stakers_parks_collateral() {
    let mut h = create_harness(0);
    let vault_id = h.open_risky_vault(T0);

    h.run(KEEPER, T0 + DAY, PoolAction::RunLiquidation { vault_id }).unwrap();

    assert_eq!(h.tokens.balance_of(&h.usdc, &MANAGER), U256::from(500_000_000u64));
    assert!(h.manager.pool().state().reserved_collateral.is_empty());

    // Nothing is owed, so the owner can sweep it
    h.run(OWNER, T0 + DAY, PoolAction::RefundAssetsToProtocol).unwrap();
    assert_eq!(h.tokens.balance_of(&h.usdc, &PROTOCOL), U256::from(500_000_000u64));
    assert_eq!(h.tokens.balance_of(&AssetId::Native, &PROTOCOL), U256::exp10(17) * U256::from(5u64));
}

#[test]
fn test_fees_distributed_before_liquidation() {
    let mut h = create_harness(0);
    h.run(OWNER, T0, PoolAction::SetPoolFeePercentage { percentage: HUNDRED_PC })
        .unwrap();
    h.stake(HOLDER1, 1_000, 0, T0);
    let vault_id = h.open_risky_vault(T0);
    h.accrue_fees(ether(100));
    let supply_before = h.tokens.total_supply(&h.euros);

    let ctx = h.run(KEEPER, T0 + DAY, PoolAction::RunLiquidation { vault_id }).unwrap();

    // The fees became HOLDER1's EUROs and were spent on collateral
    assert_eq!(supply_before - h.tokens.total_supply(&h.euros), ether(100));
    assert!(h.position(&HOLDER1, T0 + DAY).euros.is_zero());
    assert!(h.tokens.balance_of(&h.euros, &MANAGER).is_zero());
    assert!(!h.tokens.balance_of(&AssetId::Native, &POOL).is_zero());

    let kinds: Vec<EventType> = ctx.events.events().iter().map(|e| e.event_type()).collect();
    let fees_at = kinds.iter().position(|k| *k == EventType::FeesDistributed).unwrap();
    let purchase_at = kinds.iter().position(|k| *k == EventType::CollateralPurchased).unwrap();
    assert!(fees_at < purchase_at);
}

#[test]
fn test_unpriceable_liquidation_moves_nothing() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 1_000, 2_000, T0);
    let vault_id = h.open_risky_vault(T0);
    h.accrue_fees(ether(10));
    let missing = Symbol::new("EUR/CHF");
    h.manager.config.eur_usd_feed = missing;

    let result = h.run(KEEPER, T0 + DAY, PoolAction::RunLiquidation { vault_id });

    assert_eq!(result.map(|_| ()), Err(PoolError::PriceFeedNotFound { feed: missing }));
    assert_eq!(h.tokens.balance_of(&h.euros, &MANAGER), ether(10));
    assert!(h.tokens.balance_of(&h.euros, &PROTOCOL).is_zero());
    assert!(h.tokens.balance_of(&h.usdc, &MANAGER).is_zero());
    assert!(!h.vaults.vault(&vault_id).unwrap().liquidated);
    assert!(h.manager.pool().state().reward_accumulator.is_zero());
}

// ============ Owner Operations ============

#[test]
fn test_refund_requires_owner() {
    let mut h = create_harness(0);
    h.tokens.mint(&h.usdc, &MANAGER, U256::from(50_000_000u64)).unwrap();

    let result = h.run(KEEPER, T0, PoolAction::RefundAssetsToProtocol);
    assert_eq!(result.map(|_| ()), Err(PoolError::NotOwner { caller: KEEPER }));

    let ctx = h.run(OWNER, T0, PoolAction::RefundAssetsToProtocol).unwrap();
    assert_eq!(ctx.events.filter_by_type(EventType::AssetsRefunded).len(), 1);
    assert_eq!(h.tokens.balance_of(&h.usdc, &PROTOCOL), U256::from(50_000_000u64));
}

#[test]
fn test_reward_drop_allocates_pro_rata() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 1_000, 0, T0);
    h.stake(HOLDER2, 3_000, 0, T0);
    h.tokens.mint(&h.usdc, &MANAGER, U256::from(400_000_000u64)).unwrap();

    let ctx = h.run(OWNER, T0 + DAY, PoolAction::RewardDrop).unwrap();

    assert_eq!(ctx.events.filter_by_type(EventType::RewardDropped).len(), 1);
    assert_eq!(h.position(&HOLDER1, T0 + DAY).reward_of(&USDC), U256::from(100_000_000u64));
    assert_eq!(h.position(&HOLDER2, T0 + DAY).reward_of(&USDC), U256::from(300_000_000u64));
    assert_eq!(h.tokens.balance_of(&h.usdc, &POOL), U256::from(400_000_000u64));
    assert_eq!(h.tokens.balance_of(&h.usdc, &MANAGER), U256::zero());
}

// ============ Emergency ============

#[test]
fn test_emergency_flow() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 1_000, 100, T0);
    h.stake(HOLDER2, 3_000, 0, T0);
    h.tokens.mint(&h.usdc, &MANAGER, U256::from(400_000_000u64)).unwrap();
    h.run(OWNER, T0 + DAY, PoolAction::RewardDrop).unwrap();
    h.stake(HOLDER1, 50, 10, T0 + DAY);

    // Exit is only open in emergency mode
    let result = h.run(HOLDER1, T0 + DAY, PoolAction::EmergencyRemoveStake);
    assert_eq!(result.map(|_| ()), Err(PoolError::NotInEmergency));

    let ctx = h.run(OWNER, T0 + DAY, PoolAction::SetEmergency { active: true }).unwrap();
    assert_eq!(ctx.events.filter_by_type(EventType::EmergencyStatusChanged).len(), 1);

    // Staking is frozen
    h.fund(HOLDER3, ether(1), U256::zero());
    let result = h.run(HOLDER3, T0 + DAY, PoolAction::IncreasePosition { tst: ether(1), euros: U256::zero() });
    assert_eq!(result.map(|_| ()), Err(PoolError::EmergencyActive));
    let result = h.run(HOLDER2, T0 + DAY, PoolAction::DecreasePosition { tst: ether(1), euros: U256::zero() });
    assert_eq!(result.map(|_| ()), Err(PoolError::EmergencyActive));

    // 100 USDC of rewards cost ~85.76 EUROs at the discount
    let supply_before = h.tokens.total_supply(&h.euros);
    h.run(HOLDER1, T0 + DAY, PoolAction::EmergencyRemoveStake).unwrap();
    let burned = supply_before - h.tokens.total_supply(&h.euros);
    assert!(burned > cents(8_576) && burned < cents(8_577));
    assert_eq!(h.tokens.balance_of(&h.tst, &HOLDER1), ether(1_050));
    assert_eq!(h.tokens.balance_of(&h.euros, &HOLDER1), ether(110) - burned);
    assert_eq!(h.tokens.balance_of(&h.usdc, &HOLDER1), U256::from(100_000_000u64));

    // No EUROs to charge: the charge saturates at zero
    h.run(HOLDER2, T0 + DAY, PoolAction::EmergencyRemoveStake).unwrap();
    assert_eq!(h.tokens.balance_of(&h.tst, &HOLDER2), ether(3_000));
    assert_eq!(h.tokens.balance_of(&h.usdc, &HOLDER2), U256::from(300_000_000u64));

    assert!(h.manager.pool().holders().is_empty());
    assert!(h.manager.pool().state().total_consolidated_tst.is_zero());
    assert_eq!(h.tokens.balance_of(&h.tst, &POOL), U256::zero());
    assert_eq!(h.tokens.balance_of(&h.euros, &POOL), U256::zero());

    // Back to normal operation
    h.run(OWNER, T0 + DAY, PoolAction::SetEmergency { active: false }).unwrap();
    h.run(HOLDER3, T0 + DAY, PoolAction::IncreasePosition { tst: ether(1), euros: U256::zero() })
        .unwrap();
}

#[test]
fn test_failed_command_leaves_no_trace() {
    let mut h = create_harness(0);
    h.stake(HOLDER1, 1_000, 0, T0);
    let state_before = h.manager.pool().state().clone();

    // Approved TST, but no EUROs allowance
    h.tokens.mint(&h.tst, &HOLDER1, ether(5)).unwrap();
    h.tokens.approve(&h.tst, &HOLDER1, &POOL, ether(5)).unwrap();
    h.tokens.mint(&h.euros, &HOLDER1, ether(5)).unwrap();
    let result = h.run(HOLDER1, T0 + DAY, PoolAction::IncreasePosition { tst: ether(5), euros: ether(5) });

    assert!(matches!(result, Err(PoolError::InsufficientAllowance { .. })));
    assert_eq!(h.manager.pool().state(), &state_before);
    assert_eq!(h.position(&HOLDER1, T0 + DAY).tst, ether(1_000));
    assert_eq!(h.tokens.balance_of(&h.tst, &HOLDER1), ether(5));
}
