//! End-to-end ledger scenarios: registration, uptime, rewards, reputation
//! and governance flows against the in-memory and sled stores.

mod common;

use common::{Harness, DAY0, STARTING_BALANCE, T0};
use relaynet_core::{
    day_index, AccountId, InMemoryAssetLedger, MessageId, PublicKey, TokenId, ONE_TOKEN,
    SECONDS_PER_DAY,
};
use relaynet_incentives::{
    IncentiveLedger, LedgerConfig, LedgerError, LedgerEvent, RateLimitConfig, ReputationStatus,
    SledBackend, Tier,
};

fn message(n: u64) -> MessageId {
    MessageId::from_data(&n.to_be_bytes())
}

// ---- identities ----

#[test]
fn test_identity_lifecycle() {
    let mut h = Harness::new();
    let alice = h.user("alice", T0);

    assert!(h.ledger.is_registered(&alice).unwrap());
    assert_eq!(h.ledger.global_state().unwrap().total_users, 1);
    assert!(matches!(
        h.ledger.register(alice, common::key_for("alice"), "again", T0),
        Err(LedgerError::AlreadyRegistered(_))
    ));

    let renamed = h.ledger.update_display_name(alice, "  Alice Relay ", T0 + 10).unwrap();
    assert_eq!(renamed.display_name, "Alice Relay");

    let rotated = h.ledger.rotate_key(alice, PublicKey::new([9; 32]), T0 + 20).unwrap();
    assert_eq!(rotated.public_key, PublicKey::new([9; 32]));
    assert!(matches!(
        h.ledger.rotate_key(alice, PublicKey::new([0; 32]), T0 + 30),
        Err(LedgerError::InvalidKey)
    ));

    h.ledger.deactivate(alice, T0 + 40).unwrap();
    assert!(!h.ledger.is_registered(&alice).unwrap());
    assert_eq!(h.ledger.global_state().unwrap().total_users, 0);

    // Re-registration keeps the original registration time
    let again = h.ledger.register(alice, PublicKey::new([3; 32]), "back", T0 + 50).unwrap();
    assert_eq!(again.registered_at, T0);
    assert_eq!(again.last_updated, T0 + 50);
}

#[test]
fn test_identity_with_active_relay_cannot_deactivate() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 100, T0);

    assert!(matches!(
        h.ledger.deactivate(alice, T0 + 5),
        Err(LedgerError::RelayStillActive(_))
    ));
    h.ledger.deactivate_relay(alice, T0 + 10).unwrap();
    h.ledger.deactivate(alice, T0 + 20).unwrap();
}

#[test]
fn test_queries_on_unknown_accounts_return_sentinels() {
    let h = Harness::new();
    let ghost = AccountId::from_label("ghost");

    assert!(!h.ledger.is_registered(&ghost).unwrap());
    assert!(h.ledger.get_identity(&ghost).unwrap().is_none());
    assert!(h.ledger.get_relay_node(&ghost).unwrap().is_none());
    assert!(!h.ledger.is_node_online(&ghost, T0).unwrap());
    assert_eq!(h.ledger.get_reward_multiplier(&ghost).unwrap(), 0);

    let info = h.ledger.get_node_security_info(&ghost).unwrap();
    assert_eq!(info.score, 50);
    assert_eq!(info.status, ReputationStatus::Normal);
    assert!(!info.relay_active);
}

// ---- relay registration and uptime ----

#[test]
fn test_register_as_relay_preconditions() {
    let mut h = Harness::new();
    let stranger = AccountId::from_label("stranger");
    assert!(matches!(
        h.ledger.register_as_relay(stranger, "wss://x", 100, T0),
        Err(LedgerError::IdentityRequired(_))
    ));

    let alice = h.user("alice", T0);
    assert!(matches!(
        h.ledger.register_as_relay(alice, "   ", 100, T0),
        Err(LedgerError::InvalidEndpoint(_))
    ));

    let node = h.ledger.register_as_relay(alice, "wss://alice", 100, T0).unwrap();
    assert_eq!(node.tier, Tier::Bronze);
    assert_eq!(node.staked_amount, 100 * ONE_TOKEN);
    assert_eq!(h.balance(&alice), STARTING_BALANCE - 100 * ONE_TOKEN);
    assert!(matches!(
        h.ledger.register_as_relay(alice, "wss://alice", 100, T0),
        Err(LedgerError::AlreadyRelaying(_))
    ));

    let state = h.ledger.global_state().unwrap();
    assert_eq!(state.total_relay_nodes, 1);
    assert_eq!(state.total_staked, 100 * ONE_TOKEN);
    assert_eq!(h.ledger.get_active_relay_nodes().unwrap(), vec![alice]);
    assert_eq!(h.ledger.get_reputation(&alice).unwrap().unwrap().score, 50);
}

#[test]
fn test_legacy_registration_defaults_storage() {
    let mut h = Harness::new();
    let alice = h.user("alice", T0);
    let node = h.ledger.register_as_relay_legacy(alice, "wss://alice", T0).unwrap();
    assert_eq!(node.storage_capacity_mb, 50);
}

#[test]
fn test_silver_after_four_hours_ten_minutes() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 1_024, T0);

    // 239 beats of 60s: 14_340s, still short of Silver
    let now = h.beat(alice, T0, 60, 239);
    assert_eq!(h.ledger.get_relay_node(&alice).unwrap().unwrap().tier, Tier::Bronze);

    let now = h.beat(alice, now, 60, 11);
    let node = h.ledger.get_relay_node(&alice).unwrap().unwrap();
    assert_eq!(node.daily_uptime_seconds, 15_000);
    assert_eq!(node.tier, Tier::Silver);
    assert_eq!(h.ledger.get_reward_multiplier(&alice).unwrap(), 150);
    assert!(h.ledger.is_node_online(&alice, now).unwrap());

    let promoted = h.ledger.drain_events().into_iter().any(|event| {
        matches!(event, LedgerEvent::TierChanged { to: Tier::Silver, .. })
    });
    assert!(promoted);
}

#[test]
fn test_deactivation_reports_final_uptime() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 1_024, T0);
    let now = h.beat(alice, T0, 60, 239);
    h.ledger.drain_events();

    // The closing interval reaches the Silver threshold
    h.ledger.deactivate_relay(alice, now + 60).unwrap();
    let events = h.ledger.drain_events();

    assert!(events.iter().any(|event| matches!(
        event,
        LedgerEvent::HeartbeatReceived { daily_uptime_seconds: 14_400, .. }
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        LedgerEvent::TierChanged { from: Tier::Bronze, to: Tier::Silver, .. }
    )));
    assert!(matches!(events.last(), Some(LedgerEvent::RelayDeactivated { forced: false, .. })));
}

#[test]
fn test_gaps_beyond_timeout_are_not_credited() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 100, T0);

    h.ledger.heartbeat(alice, T0 + 120).unwrap();
    let receipt = h.ledger.heartbeat(alice, T0 + 120 + 301).unwrap();
    assert_eq!(receipt.credited_seconds, 0);
    assert_eq!(receipt.daily_uptime_seconds, 120);

    // Repeating a heartbeat in the same second credits nothing
    let receipt = h.ledger.heartbeat(alice, T0 + 421).unwrap();
    assert_eq!(receipt.credited_seconds, 0);
    assert!(!h.ledger.is_node_online(&alice, T0 + 421 + 301).unwrap());
}

#[test]
fn test_day_rollover_resets_once() {
    let mut h = Harness::new();
    let start = DAY0 + SECONDS_PER_DAY - 600;
    let alice = h.relay("alice", 100, start);
    let before_midnight = h.beat(alice, start, 60, 9);
    assert_eq!(h.ledger.get_relay_node(&alice).unwrap().unwrap().daily_uptime_seconds, 540);

    // First beat after midnight rolls the day, the next one does not
    let first = h.ledger.heartbeat(alice, before_midnight + 120).unwrap();
    assert!(first.day_rolled_over);
    assert_eq!(first.daily_uptime_seconds, 60);
    let second = h.ledger.heartbeat(alice, before_midnight + 150).unwrap();
    assert!(!second.day_rolled_over);
    assert_eq!(second.daily_uptime_seconds, 90);
    assert_eq!(second.total_uptime_seconds, 540 + 120 + 30);
}

#[test]
fn test_storage_update_moves_tier_immediately() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 100, T0);
    h.beat(alice, T0, 60, 250);
    assert_eq!(h.ledger.get_relay_node(&alice).unwrap().unwrap().tier, Tier::Bronze);

    let node = h.ledger.update_storage(alice, 1_024, T0 + 15_010).unwrap();
    assert_eq!(node.tier, Tier::Silver);

    let node = h.ledger.update_endpoint(alice, "wss://new.alice", T0 + 15_020).unwrap();
    assert_eq!(node.endpoint, "wss://new.alice");
}

// ---- stake ----

#[test]
fn test_stake_conservation_on_voluntary_exit() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 100, T0);

    let returned = h.ledger.deactivate_relay(alice, T0 + 60).unwrap();
    assert_eq!(returned, 100 * ONE_TOKEN);
    assert_eq!(h.balance(&alice), STARTING_BALANCE);

    let state = h.ledger.global_state().unwrap();
    assert_eq!(state.total_staked, 0);
    assert_eq!(state.total_relay_nodes, 0);
    assert!(h.ledger.get_active_relay_nodes().unwrap().is_empty());
    assert!(matches!(
        h.ledger.deactivate_relay(alice, T0 + 70),
        Err(LedgerError::NotRelaying(_))
    ));
}

// ---- rewards ----

#[test]
fn test_low_activity_pays_actual_volume_not_cap() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 100, T0);
    let bob = h.relay("bob", 100, T0);
    h.fund_pool(10 * ONE_TOKEN, T0);

    for n in 0..12 {
        h.ledger
            .record_relayed_message(h.authority, alice, message(n), 0, T0 + n)
            .unwrap();
    }
    for n in 12..20 {
        h.ledger
            .record_relayed_message(h.authority, bob, message(n), 0, T0 + n)
            .unwrap();
    }

    let alice_before = h.balance(&alice);
    let report = h.ledger.settle_cycle(h.governance, T0 + 3_000).unwrap();

    // (20 / 1000) * 0.001 = 0.00002 tokens
    assert_eq!(report.relay_paid_total, 20_000_000_000_000);
    assert_eq!(h.balance(&alice) - alice_before, 12_000_000_000_000);
    assert_eq!(report.day, DAY0 / SECONDS_PER_DAY);

    let node = h.ledger.get_relay_node(&alice).unwrap().unwrap();
    assert_eq!(node.cycle_messages, 0);
    assert_eq!(node.messages_relayed, 12);
}

#[test]
fn test_per_message_payments_count_toward_relay_share() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 100, T0);
    h.fund_pool(10 * ONE_TOKEN, T0);

    let base = ONE_TOKEN / 1_000_000;
    for n in 0..5 {
        let receipt = h
            .ledger
            .record_relayed_message(h.authority, alice, message(n), base, T0 + n)
            .unwrap();
        assert_eq!(receipt.reward_paid, base);
    }

    let report = h.ledger.settle_cycle(h.authority, T0 + 100).unwrap();
    assert_eq!(report.relay_paid_total, 0);
    assert_eq!(
        h.ledger.get_relay_node(&alice).unwrap().unwrap().rewards_earned,
        5 * base
    );
}

#[test]
fn test_record_relayed_message_rules() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 100, T0);

    assert!(matches!(
        h.ledger.record_relayed_message(alice, alice, message(1), 1, T0),
        Err(LedgerError::Unauthorized { .. })
    ));

    // Empty pool: recorded, nothing paid
    let receipt = h
        .ledger
        .record_relayed_message(h.authority, alice, message(1), ONE_TOKEN, T0)
        .unwrap();
    assert_eq!(receipt.reward_paid, 0);
    assert_eq!(receipt.messages_relayed, 1);
    assert_eq!(h.ledger.global_state().unwrap().total_messages_relayed, 1);

    assert!(matches!(
        h.ledger.record_relayed_message(h.authority, alice, message(1), 0, T0 + 1),
        Err(LedgerError::DuplicateMessage(_))
    ));
    assert!(matches!(
        h.ledger.record_relayed_message(h.authority, AccountId::from_label("nobody"), message(2), 0, T0),
        Err(LedgerError::NotRelaying(_))
    ));
}

#[test]
fn test_fee_reward_settle_and_claim() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 100, T0);
    h.fund_pool(50 * ONE_TOKEN, T0);

    assert!(matches!(
        h.ledger.claim_fee_reward(alice, T0 + 30),
        Err(LedgerError::NothingToClaim(_))
    ));

    // One hour of uptime meets the Bronze requirement in full
    let now = h.beat(alice, T0, 60, 60);
    let report = h.ledger.settle_cycle(h.governance, now).unwrap();
    assert_eq!(report.fee_credited_total, 10 * ONE_TOKEN);
    assert_eq!(h.ledger.global_state().unwrap().pending_fee_total, 10 * ONE_TOKEN);

    assert!(matches!(
        h.ledger.settle_cycle(h.governance, now + 10),
        Err(LedgerError::CycleAlreadySettled(_))
    ));

    // Offline nodes cannot claim
    assert!(matches!(
        h.ledger.claim_fee_reward(alice, now + 301),
        Err(LedgerError::MustBeOnline(_))
    ));

    let before = h.balance(&alice);
    let claimed = h.ledger.claim_fee_reward(alice, now + 30).unwrap();
    assert_eq!(claimed, 10 * ONE_TOKEN);
    assert_eq!(h.balance(&alice) - before, 10 * ONE_TOKEN);
    assert_eq!(h.ledger.global_state().unwrap().pending_fee_total, 0);
    assert!(matches!(
        h.ledger.claim_fee_reward(alice, now + 40),
        Err(LedgerError::NothingToClaim(_))
    ));
}

#[test]
fn test_previous_day_settled_after_midnight() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 100, T0);

    // Bronze uptime on DAY0, then the settlement window passes unnoticed
    let last = h.beat(alice, T0, 60, 60);
    let next_day = DAY0 + SECONDS_PER_DAY;
    h.ledger.heartbeat(alice, next_day + 120).unwrap();

    // The current day alone would see no uptime
    let day0 = day_index(DAY0);
    let report = h.ledger.settle_day(h.governance, day0, next_day + 600).unwrap();
    assert_eq!(report.day, day0);
    assert_eq!(report.fee_credited_total, 10 * ONE_TOKEN);
    assert!(last < next_day);

    assert!(matches!(
        h.ledger.settle_day(h.governance, day0, next_day + 700),
        Err(LedgerError::CycleAlreadySettled(_))
    ));
    let today = h.ledger.settle_cycle(h.governance, next_day + 800).unwrap();
    assert_eq!(today.day, day0 + 1);
}

#[test]
fn test_only_recent_days_can_be_settled() {
    let mut h = Harness::new();
    let day0 = day_index(DAY0);

    assert!(matches!(
        h.ledger.settle_day(h.governance, day0 + 1, T0),
        Err(LedgerError::CycleNotSettleable { .. })
    ));
    assert!(matches!(
        h.ledger.settle_day(h.governance, day0 - 2, T0),
        Err(LedgerError::CycleNotSettleable { .. })
    ));
    assert_eq!(h.ledger.settle_day(h.governance, day0 - 1, T0).unwrap().day, day0 - 1);
}

#[test]
fn test_settle_requires_privileged_caller() {
    let mut h = Harness::new();
    let alice = h.user("alice", T0);
    assert!(matches!(
        h.ledger.settle_cycle(alice, T0),
        Err(LedgerError::Unauthorized { .. })
    ));
}

// ---- reputation ----

#[test]
fn test_five_violations_slash_and_force_deactivate() {
    let mut h = Harness::new();
    let target = h.relay("target", 100, T0);
    let reporter = h.user("reporter", T0);

    for n in 1..=4u32 {
        let receipt = h
            .ledger
            .report_violation(reporter, target, "dropped messages", T0 + n as u64)
            .unwrap();
        assert_eq!(receipt.violation_count, n);
        assert!(receipt.slash.is_none());
    }
    let info = h.ledger.get_node_security_info(&target).unwrap();
    assert_eq!(info.status, ReputationStatus::AtRisk);
    assert_eq!(info.score, 30);

    let receipt = h
        .ledger
        .report_violation(reporter, target, "dropped messages", T0 + 10)
        .unwrap();
    let slash = receipt.slash.unwrap();
    assert_eq!(slash.slashed_amount, 10 * ONE_TOKEN);
    assert!(slash.force_deactivated);
    assert_eq!(slash.forfeited_amount, 90 * ONE_TOKEN);

    // No stake refund on forced exit
    assert_eq!(h.balance(&target), STARTING_BALANCE - 100 * ONE_TOKEN);
    let state = h.ledger.global_state().unwrap();
    assert_eq!(state.total_staked, 0);
    assert_eq!(state.fee_pool_total, 100 * ONE_TOKEN);

    let info = h.ledger.get_node_security_info(&target).unwrap();
    assert_eq!(info.status, ReputationStatus::Slashed);
    assert_eq!(info.score, 15);
    assert_eq!(info.unsettled_violations, 0);

    assert!(matches!(
        h.ledger.heartbeat(target, T0 + 20),
        Err(LedgerError::NotRelaying(_))
    ));
    assert!(matches!(
        h.ledger.claim_fee_reward(target, T0 + 20),
        Err(LedgerError::NotRelaying(_))
    ));

    // A fresh full stake brings it back; reputation history persists
    let node = h.ledger.register_as_relay(target, "wss://target", 100, T0 + 30).unwrap();
    assert_eq!(node.staked_amount, 100 * ONE_TOKEN);
    assert_eq!(node.messages_relayed, 0);
    let record = h.ledger.get_reputation(&target).unwrap().unwrap();
    assert_eq!(record.violation_count, 5);
    assert_eq!(record.slash_count, 1);
}

#[test]
fn test_violation_report_preconditions() {
    let mut h = Harness::new();
    let target = h.relay("target", 100, T0);
    let idle = h.user("idle", T0);

    assert!(matches!(
        h.ledger.report_violation(target, target, "x", T0),
        Err(LedgerError::SelfReport(_))
    ));
    assert!(matches!(
        h.ledger.report_violation(AccountId::from_label("anon"), target, "x", T0),
        Err(LedgerError::ReporterNotRegistered(_))
    ));
    assert!(matches!(
        h.ledger.report_violation(target, idle, "x", T0),
        Err(LedgerError::TargetNotActive(_))
    ));
}

#[test]
fn test_report_rate_limit() {
    let config = LedgerConfig {
        report_rate_limit: RateLimitConfig {
            max_reports: 2,
            window_secs: 600,
        },
        ..LedgerConfig::default()
    };
    let mut h = Harness::with_config(config);
    let target = h.relay("target", 100, T0);
    let reporter = h.user("reporter", T0);

    h.ledger.report_violation(reporter, target, "a", T0 + 1).unwrap();
    h.ledger.report_violation(reporter, target, "b", T0 + 2).unwrap();

    let status = h.ledger.check_rate_limit(&reporter, T0 + 3);
    assert!(!status.allowed);
    assert_eq!(status.remaining, 0);

    match h.ledger.report_violation(reporter, target, "c", T0 + 3) {
        Err(LedgerError::RateLimited { retry_after, .. }) => assert_eq!(retry_after, T0 + 601),
        other => panic!("expected rate limit, got {:?}", other),
    }
    assert_eq!(h.ledger.get_reputation(&target).unwrap().unwrap().violation_count, 2);

    assert!(h.ledger.report_violation(reporter, target, "d", T0 + 601).is_ok());
}

#[test]
fn test_governance_slash_keeps_well_collateralized_node() {
    let config = LedgerConfig {
        min_relay_stake: 50 * ONE_TOKEN,
        ..LedgerConfig::default()
    };
    let mut h = Harness::with_config(config);
    let gov = h.governance;
    let alice = h.user("alice", T0);
    // Stake is taken at the current minimum; raise it after registering
    h.ledger.set_min_relay_stake(gov, 100 * ONE_TOKEN, T0).unwrap();
    h.ledger.register_as_relay(alice, "wss://alice", 100, T0).unwrap();
    h.ledger.set_min_relay_stake(gov, 80 * ONE_TOKEN, T0 + 1).unwrap();

    assert!(matches!(
        h.ledger.slash_node(alice, alice, "x", T0 + 2),
        Err(LedgerError::Unauthorized { .. })
    ));

    let outcome = h.ledger.slash_node(gov, alice, "equivocation", T0 + 2).unwrap();
    assert_eq!(outcome.slashed_amount, 10 * ONE_TOKEN);
    assert_eq!(outcome.remaining_stake, 90 * ONE_TOKEN);
    assert!(!outcome.force_deactivated);

    let info = h.ledger.get_node_security_info(&alice).unwrap();
    assert!(info.relay_active);
    assert_eq!(info.staked_amount, 90 * ONE_TOKEN);
    assert_eq!(info.slash_count, 1);

    // Voluntary exit returns only what is left
    assert_eq!(h.ledger.deactivate_relay(alice, T0 + 3).unwrap(), 90 * ONE_TOKEN);
}

#[test]
fn test_blacklist_is_permanent() {
    let mut h = Harness::new();
    let gov = h.governance;
    let alice = h.relay("alice", 100, T0);

    let outcome = h.ledger.blacklist_node(gov, alice, "sybil", T0 + 1).unwrap();
    assert!(outcome.relay_deactivated);
    assert_eq!(outcome.forfeited_amount, 100 * ONE_TOKEN);

    let again = h.ledger.blacklist_node(gov, alice, "sybil", T0 + 2).unwrap();
    assert!(again.already_blacklisted);

    assert!(matches!(
        h.ledger.register_as_relay(alice, "wss://alice", 100, T0 + 3),
        Err(LedgerError::Blacklisted(_))
    ));
    assert!(matches!(
        h.ledger.increase_reputation(gov, alice, T0 + 4),
        Err(LedgerError::Blacklisted(_))
    ));
    let info = h.ledger.get_node_security_info(&alice).unwrap();
    assert_eq!(info.status, ReputationStatus::Blacklisted);
    assert_eq!(info.score, 0);
}

#[test]
fn test_increase_reputation_is_bounded() {
    let mut h = Harness::new();
    let gov = h.governance;
    let alice = h.relay("alice", 100, T0);

    assert!(matches!(
        h.ledger.increase_reputation(gov, AccountId::from_label("ghost"), T0),
        Err(LedgerError::ReputationNotFound(_))
    ));
    let mut score = 0;
    for n in 0..60 {
        score = h.ledger.increase_reputation(gov, alice, T0 + n).unwrap();
    }
    assert_eq!(score, 100);
}

// ---- governance ----

#[test]
fn test_pool_funding_and_excess_withdrawal() {
    let mut h = Harness::new();
    let gov = h.governance;
    let _alice = h.relay("alice", 100, T0);
    h.fund_pool(10 * ONE_TOKEN, T0);

    let stats = h.ledger.network_stats(T0).unwrap();
    assert_eq!(stats.reward_pool_available, 10 * ONE_TOKEN);
    assert_eq!(stats.total_staked, 100 * ONE_TOKEN);

    // Stake is never withdrawable
    assert!(matches!(
        h.ledger.withdraw_excess(gov, gov, 11 * ONE_TOKEN, T0 + 1),
        Err(LedgerError::InsufficientRewardPool { .. })
    ));
    h.ledger.withdraw_excess(gov, gov, 4 * ONE_TOKEN, T0 + 1).unwrap();
    assert_eq!(h.balance(&gov), 4 * ONE_TOKEN);
    assert_eq!(
        h.ledger.network_stats(T0 + 2).unwrap().reward_pool_available,
        6 * ONE_TOKEN
    );
}

#[test]
fn test_asset_token_switch_requires_no_stake() {
    let mut h = Harness::new();
    let gov = h.governance;
    let alice = h.relay("alice", 100, T0);
    let next = TokenId::new("RLY2");

    assert!(matches!(
        h.ledger.set_asset_token(gov, next.clone(), T0 + 1),
        Err(LedgerError::StakeOutstanding(_))
    ));
    h.ledger.deactivate_relay(alice, T0 + 2).unwrap();
    h.ledger.set_asset_token(gov, next.clone(), T0 + 3).unwrap();
    assert_eq!(h.ledger.token(), &next);
    assert_eq!(h.ledger.global_state().unwrap().asset_token, next);
}

#[test]
fn test_min_relay_stake_must_be_positive() {
    let mut h = Harness::new();
    let gov = h.governance;
    assert!(matches!(
        h.ledger.set_min_relay_stake(gov, 0, T0),
        Err(LedgerError::InvalidAmount(_))
    ));
}

#[test]
fn test_network_stats_counts_tiers_and_online_nodes() {
    let mut h = Harness::new();
    let alice = h.relay("alice", 1_024, T0);
    let _bob = h.relay("bob", 100, T0);
    let now = h.beat(alice, T0, 60, 250);

    let stats = h.ledger.network_stats(now).unwrap();
    assert_eq!(stats.total_users, 2);
    assert_eq!(stats.total_relay_nodes, 2);
    assert_eq!(stats.online_relay_nodes, 1);
    assert!(stats.nodes_per_tier.contains(&(Tier::Silver, 1)));
    assert!(stats.nodes_per_tier.contains(&(Tier::Bronze, 1)));
    assert!(!stats.halted);
}

// ---- persistence ----

#[test]
fn test_sled_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger");
    let alice = AccountId::from_label("alice");

    {
        let mut ledger = IncentiveLedger::open(
            Box::new(SledBackend::open(&path).unwrap()),
            InMemoryAssetLedger::new(),
            LedgerConfig::default(),
        )
        .unwrap();
        let token = ledger.token().clone();
        let custody = ledger.config().custody;
        ledger.assets_mut().mint(&token, &alice, STARTING_BALANCE);
        ledger.assets_mut().approve(&token, &alice, &custody, STARTING_BALANCE);
        ledger.register(alice, common::key_for("alice"), "alice", T0).unwrap();
        ledger.register_as_relay(alice, "wss://alice", 512, T0).unwrap();
        ledger.heartbeat(alice, T0 + 60).unwrap();
        ledger.flush().unwrap();
    }

    let ledger = IncentiveLedger::open(
        Box::new(SledBackend::open(&path).unwrap()),
        InMemoryAssetLedger::new(),
        LedgerConfig::default(),
    )
    .unwrap();
    assert!(ledger.is_registered(&alice).unwrap());
    let node = ledger.get_relay_node(&alice).unwrap().unwrap();
    assert_eq!(node.daily_uptime_seconds, 60);
    assert_eq!(node.storage_capacity_mb, 512);
    assert_eq!(ledger.get_active_relay_nodes().unwrap(), vec![alice]);
    assert_eq!(ledger.global_state().unwrap().total_staked, 100 * ONE_TOKEN);
}
