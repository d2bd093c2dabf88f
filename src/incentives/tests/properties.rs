//! Property tests for tiers, uptime accrual and reward conservation

mod common;

use common::{Harness, T0};
use proptest::prelude::*;
use relaynet_core::{AccountId, Amount, SECONDS_PER_DAY};
use relaynet_incentives::config::{BASE_REWARD_PER_1000_MSG, DAILY_POOL_CAP, HEARTBEAT_TIMEOUT_SECS};
use relaynet_incentives::{
    FeeParticipant, RelayVolume, RewardDistributor, StakeLedger, Tier, TierEngine,
};

fn distributor() -> RewardDistributor {
    RewardDistributor::new(BASE_REWARD_PER_1000_MSG, TierEngine::default(), StakeLedger::new(10))
}

fn tier_strategy() -> impl Strategy<Value = Tier> {
    prop_oneof![
        Just(Tier::Bronze),
        Just(Tier::Silver),
        Just(Tier::Gold),
        Just(Tier::Platinum),
    ]
}

proptest! {
    #[test]
    fn test_tier_monotonic_in_both_axes(
        uptime in 0u64..=SECONDS_PER_DAY,
        storage in 0u64..5_000,
        more_uptime in 0u64..SECONDS_PER_DAY,
        more_storage in 0u64..5_000,
    ) {
        let engine = TierEngine::default();
        let base = engine.compute_tier(uptime, storage);
        let raised = engine.compute_tier(
            (uptime + more_uptime).min(SECONDS_PER_DAY),
            storage + more_storage,
        );
        prop_assert!(raised >= base);

        if base > Tier::Bronze {
            let req = engine.requirements(base);
            prop_assert!(uptime >= req.min_uptime_secs);
            prop_assert!(storage >= req.min_storage_mb);
        }
    }

    #[test]
    fn test_relay_channel_never_exceeds_caps(
        messages in prop::collection::vec(0u64..500_000_000, 1..12),
    ) {
        let d = distributor();
        let volumes: Vec<RelayVolume> = messages
            .iter()
            .enumerate()
            .map(|(i, m)| RelayVolume { account: AccountId::new([i as u8; 20]), messages: *m })
            .collect();

        let payouts = d.relay_channel(&volumes, DAILY_POOL_CAP);
        let total: Amount = payouts.iter().map(|p| p.amount).sum();
        let network: u64 = messages.iter().sum();

        prop_assert!(total <= DAILY_POOL_CAP);
        prop_assert!(total <= d.base_entitlement(network));
        for (payout, volume) in payouts.iter().zip(&volumes) {
            prop_assert!(payout.amount <= d.base_entitlement(volume.messages));
        }
    }

    #[test]
    fn test_tier_fee_channel_bounded_by_tier_pool(
        members in prop::collection::vec((tier_strategy(), 0u64..=SECONDS_PER_DAY), 1..20),
    ) {
        let d = distributor();
        let participants: Vec<FeeParticipant> = members
            .iter()
            .enumerate()
            .map(|(i, (tier, uptime))| FeeParticipant {
                account: AccountId::new([i as u8; 20]),
                tier: *tier,
                daily_uptime_seconds: *uptime,
            })
            .collect();

        for settlement in d.tier_fee_channel(&participants, DAILY_POOL_CAP) {
            let paid: Amount = settlement.entitlements.iter().map(|e| e.amount).sum();
            prop_assert!(paid <= settlement.tier_pool);
            prop_assert!(settlement.redistributed <= settlement.missed_total);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_daily_uptime_capped_and_gaps_not_credited(
        gaps in prop::collection::vec(1u64..900, 1..400),
    ) {
        let mut h = Harness::new();
        let alice = h.relay("alice", 100, T0);

        let mut now = T0;
        for gap in gaps {
            now += gap;
            let receipt = h.ledger.heartbeat(alice, now).unwrap();
            prop_assert!(receipt.daily_uptime_seconds <= SECONDS_PER_DAY);
            if gap > HEARTBEAT_TIMEOUT_SECS {
                prop_assert_eq!(receipt.credited_seconds, 0);
            } else {
                prop_assert!(receipt.credited_seconds <= gap);
            }
        }
    }
}
