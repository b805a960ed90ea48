//! Pool Events
//!
//! Events are emitted during command execution and can be indexed
//! off-chain for building dashboards and notifications.

use crate::errors::{PoolError, PoolResult};
use crate::types::{Address, Symbol, Timestamp, VaultId, U256};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Log target for encoded events
pub const LOG_TARGET: &str = "lp::events";

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Stake Events (0x01 - 0x1F)
    PositionIncreased = 0x01,
    PositionDecreased = 0x02,
    StakeConsolidated = 0x03,
    RewardsClaimed = 0x04,
    EmergencyStakeRemoved = 0x05,

    // Fee Events (0x20 - 0x2F)
    FeesDistributed = 0x20,
    FeesDeferred = 0x21,

    // Liquidation Events (0x30 - 0x3F)
    VaultLiquidated = 0x30,
    CollateralAllocated = 0x31,
    CollateralPurchased = 0x32,
    RewardDropped = 0x33,

    // Treasury Events (0x40 - 0x4F)
    AssetsRefunded = 0x40,

    // Admin Events (0x50 - 0x5F)
    PoolFeePercentageChanged = 0x50,
    HolderLimitChanged = 0x51,
    EmergencyStatusChanged = 0x52,
}

/// Main event enum containing all pool events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolEvent {
    // ============ Stake Events ============
    /// New pending stake recorded
    PositionIncreased {
        holder: Address,
        tst: U256,
        euros: U256,
        timestamp: Timestamp,
    },

    /// Consolidated stake withdrawn
    PositionDecreased {
        holder: Address,
        tst: U256,
        euros: U256,
        timestamp: Timestamp,
    },

    /// Matured pending entries folded into the consolidated balance
    StakeConsolidated {
        holder: Address,
        tst: U256,
        euros: U256,
        entries: u32,
        timestamp: Timestamp,
    },

    /// Unclaimed collateral paid out
    RewardsClaimed {
        holder: Address,
        assets: u32,
        timestamp: Timestamp,
    },

    /// Full exit during emergency mode
    EmergencyStakeRemoved {
        holder: Address,
        tst: U256,
        euros: U256,
        /// EUROs burned to pay for the force-claimed rewards
        reward_charge: U256,
        timestamp: Timestamp,
    },

    // ============ Fee Events ============
    /// Fees split and credited to the accumulator
    FeesDistributed {
        amount: U256,
        pool_share: U256,
        protocol_share: U256,
        accumulator: U256,
        timestamp: Timestamp,
    },

    /// Pool share parked because no TST was consolidated
    FeesDeferred {
        pool_share: U256,
        undistributed: U256,
        timestamp: Timestamp,
    },

    // ============ Liquidation Events ============
    /// Vault collateral pulled into manager custody
    VaultLiquidated {
        vault_id: VaultId,
        assets: u32,
        timestamp: Timestamp,
    },

    /// Collateral credited to a holder's rewards
    CollateralAllocated {
        holder: Address,
        symbol: Symbol,
        amount: U256,
        timestamp: Timestamp,
    },

    /// Holder bought collateral with staked EUROs
    CollateralPurchased {
        holder: Address,
        symbol: Symbol,
        amount: U256,
        cost: U256,
        timestamp: Timestamp,
    },

    /// Manager collateral allocated without a purchase
    RewardDropped {
        symbol: Symbol,
        amount: U256,
        timestamp: Timestamp,
    },

    // ============ Treasury Events ============
    /// Unreserved manager collateral returned to the protocol
    AssetsRefunded {
        symbol: Symbol,
        amount: U256,
        to: Address,
        timestamp: Timestamp,
    },

    // ============ Admin Events ============
    PoolFeePercentageChanged {
        old_percentage: u32,
        new_percentage: u32,
        timestamp: Timestamp,
    },

    HolderLimitChanged {
        old_limit: u32,
        new_limit: u32,
        timestamp: Timestamp,
    },

    EmergencyStatusChanged {
        active: bool,
        changed_by: Address,
        timestamp: Timestamp,
    },
}

impl PoolEvent {
    /// Get the event type
    pub fn event_type(&self) -> EventType {
        match self {
            Self::PositionIncreased { .. } => EventType::PositionIncreased,
            Self::PositionDecreased { .. } => EventType::PositionDecreased,
            Self::StakeConsolidated { .. } => EventType::StakeConsolidated,
            Self::RewardsClaimed { .. } => EventType::RewardsClaimed,
            Self::EmergencyStakeRemoved { .. } => EventType::EmergencyStakeRemoved,
            Self::FeesDistributed { .. } => EventType::FeesDistributed,
            Self::FeesDeferred { .. } => EventType::FeesDeferred,
            Self::VaultLiquidated { .. } => EventType::VaultLiquidated,
            Self::CollateralAllocated { .. } => EventType::CollateralAllocated,
            Self::CollateralPurchased { .. } => EventType::CollateralPurchased,
            Self::RewardDropped { .. } => EventType::RewardDropped,
            Self::AssetsRefunded { .. } => EventType::AssetsRefunded,
            Self::PoolFeePercentageChanged { .. } => EventType::PoolFeePercentageChanged,
            Self::HolderLimitChanged { .. } => EventType::HolderLimitChanged,
            Self::EmergencyStatusChanged { .. } => EventType::EmergencyStatusChanged,
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> Timestamp {
        match self {
            Self::PositionIncreased { timestamp, .. }
            | Self::PositionDecreased { timestamp, .. }
            | Self::StakeConsolidated { timestamp, .. }
            | Self::RewardsClaimed { timestamp, .. }
            | Self::EmergencyStakeRemoved { timestamp, .. }
            | Self::FeesDistributed { timestamp, .. }
            | Self::FeesDeferred { timestamp, .. }
            | Self::VaultLiquidated { timestamp, .. }
            | Self::CollateralAllocated { timestamp, .. }
            | Self::CollateralPurchased { timestamp, .. }
            | Self::RewardDropped { timestamp, .. }
            | Self::AssetsRefunded { timestamp, .. }
            | Self::PoolFeePercentageChanged { timestamp, .. }
            | Self::HolderLimitChanged { timestamp, .. }
            | Self::EmergencyStatusChanged { timestamp, .. } => *timestamp,
        }
    }

    /// Serialize event to JSON bytes for indexing
    pub fn to_bytes(&self) -> PoolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|_| PoolError::InvalidEncoding)
    }

    /// Deserialize event from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> PoolResult<Self> {
        serde_json::from_slice(bytes).map_err(|_| PoolError::InvalidEncoding)
    }
}

/// Event log for collecting multiple events during execution
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<PoolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log); traced as JSON for indexers
    pub fn emit(&mut self, event: PoolEvent) {
        if log::log_enabled!(target: LOG_TARGET, log::Level::Trace) {
            match event.to_bytes() {
                Ok(bytes) => {
                    log::trace!(target: LOG_TARGET, "{}", core::str::from_utf8(&bytes).unwrap_or_default())
                }
                Err(error) => log::warn!(target: LOG_TARGET, "{:?} not encodable: {}", event.event_type(), error),
            }
        }
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[PoolEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<PoolEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&PoolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Move the events of a nested call into this log
    pub fn append(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Drop events emitted after the log had `len` entries
    pub fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
