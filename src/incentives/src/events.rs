//! Notifications emitted by committed ledger operations

use relaynet_core::{serde_amount, AccountId, Amount, MessageId, Timestamp, TokenId};
use serde::{Deserialize, Serialize};

use crate::types::Tier;

/// Reward payout channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardChannel {
    /// Per-message payment recorded by the relay authority
    RelayMessage,
    /// Cycle top-up of the relay-volume channel
    RelayVolume,
    /// Tier fee-pool claim
    TierFee,
}

impl RewardChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RewardChannel::RelayMessage => "relay_message",
            RewardChannel::RelayVolume => "relay_volume",
            RewardChannel::TierFee => "tier_fee",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    IdentityRegistered {
        account: AccountId,
        display_name: String,
        at: Timestamp,
    },
    IdentityUpdated {
        account: AccountId,
        field: String,
        at: Timestamp,
    },
    IdentityDeactivated {
        account: AccountId,
        at: Timestamp,
    },
    RelayRegistered {
        account: AccountId,
        endpoint: String,
        #[serde(with = "serde_amount")]
        stake: Amount,
        storage_capacity_mb: u64,
        at: Timestamp,
    },
    RelayDeactivated {
        account: AccountId,
        #[serde(with = "serde_amount")]
        stake_returned: Amount,
        forced: bool,
        at: Timestamp,
    },
    MessageRelayed {
        account: AccountId,
        message_id: MessageId,
        #[serde(with = "serde_amount")]
        reward_paid: Amount,
        at: Timestamp,
    },
    HeartbeatReceived {
        account: AccountId,
        daily_uptime_seconds: u64,
        total_uptime_seconds: u64,
        tier: Tier,
        at: Timestamp,
    },
    StorageUpdated {
        account: AccountId,
        storage_capacity_mb: u64,
        tier: Tier,
        at: Timestamp,
    },
    EndpointUpdated {
        account: AccountId,
        endpoint: String,
        at: Timestamp,
    },
    TierChanged {
        account: AccountId,
        from: Tier,
        to: Tier,
        at: Timestamp,
    },
    NodeSlashed {
        account: AccountId,
        #[serde(with = "serde_amount")]
        amount: Amount,
        #[serde(with = "serde_amount")]
        remaining_stake: Amount,
        reason: String,
        at: Timestamp,
    },
    NodeBlacklisted {
        account: AccountId,
        reason: String,
        at: Timestamp,
    },
    ReputationChanged {
        account: AccountId,
        from: u8,
        to: u8,
        at: Timestamp,
    },
    ViolationReported {
        reporter: AccountId,
        target: AccountId,
        reason: String,
        violation_count: u32,
        at: Timestamp,
    },
    RewardPaid {
        account: AccountId,
        channel: RewardChannel,
        #[serde(with = "serde_amount")]
        amount: Amount,
        at: Timestamp,
    },
    CycleSettled {
        day: u64,
        participants: usize,
        #[serde(with = "serde_amount")]
        relay_paid: Amount,
        #[serde(with = "serde_amount")]
        fee_credited: Amount,
        at: Timestamp,
    },
    RewardPoolFunded {
        from: AccountId,
        #[serde(with = "serde_amount")]
        amount: Amount,
        at: Timestamp,
    },
    ExcessWithdrawn {
        to: AccountId,
        #[serde(with = "serde_amount")]
        amount: Amount,
        at: Timestamp,
    },
    MinRelayStakeUpdated {
        #[serde(with = "serde_amount")]
        previous: Amount,
        #[serde(with = "serde_amount")]
        current: Amount,
        at: Timestamp,
    },
    AssetTokenUpdated {
        previous: TokenId,
        current: TokenId,
        at: Timestamp,
    },
}

impl LedgerEvent {
    /// Stable event name, used as a metric label
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::IdentityRegistered { .. } => "identity_registered",
            LedgerEvent::IdentityUpdated { .. } => "identity_updated",
            LedgerEvent::IdentityDeactivated { .. } => "identity_deactivated",
            LedgerEvent::RelayRegistered { .. } => "relay_registered",
            LedgerEvent::RelayDeactivated { .. } => "relay_deactivated",
            LedgerEvent::MessageRelayed { .. } => "message_relayed",
            LedgerEvent::HeartbeatReceived { .. } => "heartbeat_received",
            LedgerEvent::StorageUpdated { .. } => "storage_updated",
            LedgerEvent::EndpointUpdated { .. } => "endpoint_updated",
            LedgerEvent::TierChanged { .. } => "tier_changed",
            LedgerEvent::NodeSlashed { .. } => "node_slashed",
            LedgerEvent::NodeBlacklisted { .. } => "node_blacklisted",
            LedgerEvent::ReputationChanged { .. } => "reputation_changed",
            LedgerEvent::ViolationReported { .. } => "violation_reported",
            LedgerEvent::RewardPaid { .. } => "reward_paid",
            LedgerEvent::CycleSettled { .. } => "cycle_settled",
            LedgerEvent::RewardPoolFunded { .. } => "reward_pool_funded",
            LedgerEvent::ExcessWithdrawn { .. } => "excess_withdrawn",
            LedgerEvent::MinRelayStakeUpdated { .. } => "min_relay_stake_updated",
            LedgerEvent::AssetTokenUpdated { .. } => "asset_token_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let event = LedgerEvent::TierChanged {
            account: AccountId::from_label("n"),
            from: Tier::Bronze,
            to: Tier::Silver,
            at: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "tier_changed");
        assert_eq!(json["to"], "Silver");
        assert_eq!(event.name(), "tier_changed");
    }
}
