//! Incentive ledger for the RelayNet relay network
//!
//! Accounts register an identity, stake tokens to run relay nodes and earn
//! rewards for relaying messages and staying online. The ledger tracks:
//! - **Identities**: public key and display name per account
//! - **Stake**: deposits held in custody on an external asset ledger
//! - **Tiers**: Bronze to Platinum from daily uptime and declared storage
//! - **Rewards**: per-message payments plus a daily settlement of the
//!   relay-volume and tier fee-pool channels
//! - **Reputation**: violation reports, slashing and blacklisting
//!
//! ## Execution model
//!
//! [`IncentiveLedger`] applies one operation at a time. Each operation stages
//! its record writes and asset transfers in a [`transaction::Transaction`]
//! and commits them together, so a rejected call changes nothing.
//! [`LedgerService`] puts the ledger behind an async job queue.

pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod identity;
pub mod ledger;
pub mod metrics;
pub mod rate_limit;
pub mod registry;
pub mod reputation_guard;
pub mod reward_distributor;
pub mod service;
pub mod stake_ledger;
pub mod store;
pub mod tier;
pub mod transaction;
pub mod types;
pub mod uptime;

pub use config::{LedgerConfig, RateLimitConfig, TierRequirements, TierTable};
pub use error::{ErrorKind, LedgerError, Result};
pub use events::{LedgerEvent, RewardChannel};
pub use guard::{GuardTicket, ReentrancyGuard};
pub use identity::IdentityStore;
pub use ledger::{Components, IncentiveLedger};
pub use metrics::{
    get_registry, observe_event, observe_operation, record_rejection, register_metrics,
    update_network_stats, LedgerMetrics,
};
pub use rate_limit::RateLimiter;
pub use registry::RelayNodeRegistry;
pub use reputation_guard::ReputationGuard;
pub use reward_distributor::{FeeParticipant, RelayVolume, RewardDistributor};
pub use service::{LedgerHandle, LedgerService};
pub use stake_ledger::StakeLedger;
pub use store::{KvBackend, MemoryBackend, SledBackend};
pub use tier::TierEngine;
pub use types::{
    BlacklistOutcome, CycleReport, GlobalState, HeartbeatReceipt, Identity, NetworkStats,
    NodePayout, NodeSecurityInfo, RateLimitStatus, RelayNode, RelayReceipt, RelayedMessage,
    ReputationRecord, ReputationStatus, SlashOutcome, Tier, TierAssessment, TierSettlement,
    ViolationReceipt,
};
pub use uptime::{UptimeState, UptimeTracker};
