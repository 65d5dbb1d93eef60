//! Tests for the revolt deadline and the local revolt decision.

use std::sync::Arc;

use ebft_consensus::{RevoltConfig, RevoltTracker, StatusManager};
use ebft_core::ManualClock;
use ebft_types::NodeStatus;

fn config() -> RevoltConfig {
    RevoltConfig {
        timeout_ms: 1_000,
        exponential_delay_base_ms: 1_000,
        exponential_delay_max_ms: 600_000,
        fast_revolt_status_timeout_ms: None,
    }
}

fn fast_config() -> RevoltConfig {
    RevoltConfig {
        fast_revolt_status_timeout_ms: Some(500),
        ..config()
    }
}

/// Four validators, local node 1, clock at 100.
fn setup() -> (Arc<ManualClock>, StatusManager) {
    let clock = Arc::new(ManualClock::new(100));
    let manager = StatusManager::new(4, 1, 1, clock.clone()).unwrap();
    (clock, manager)
}

#[test]
fn test_deadline_reference_values() {
    let expected = [
        (0, 1_100),
        (1, 1_300),
        (2, 1_540),
        (10, 6_291),
        (34, 492_323),
        (35, 601_100),
        (36, 601_100),
        (1_000, 601_100),
    ];
    for (round, deadline) in expected {
        let (clock, mut manager) = setup();
        manager.set_my_status(NodeStatus::new(1, 1).with_round(round));
        let tracker = RevoltTracker::new(config(), &manager, clock);
        assert_eq!(tracker.deadline(), deadline, "round {}", round);
    }
}

#[test]
fn test_deadline_moves_with_round() {
    let (clock, mut manager) = setup();
    let mut tracker = RevoltTracker::new(config(), &manager, clock.clone());
    assert_eq!(tracker.deadline(), 1_100);

    manager.set_my_status(NodeStatus::new(1, 2).with_round(2));
    tracker.observe(&manager);
    assert_eq!(tracker.deadline(), 1_540);

    // Nothing changed: the deadline stays put even as time passes.
    clock.advance(300);
    tracker.observe(&manager);
    assert_eq!(tracker.deadline(), 1_540);

    assert!(manager.on_height_advance(2));
    tracker.observe(&manager);
    assert_eq!(tracker.deadline(), 400 + 1_000);
}

#[test]
fn test_revolts_strictly_after_deadline() {
    let (clock, mut manager) = setup();
    let mut tracker = RevoltTracker::new(config(), &manager, clock.clone());

    clock.set(1_100);
    assert!(!tracker.update(&mut manager, true));
    assert!(!manager.my_status().revolting);

    clock.set(1_101);
    assert!(tracker.update(&mut manager, true));
    assert!(manager.my_status().revolting);
    assert_eq!(manager.revolt_metrics().revolts_by_node(), 1);

    // Already revolting.
    clock.set(5_000);
    assert!(!tracker.update(&mut manager, true));
    assert_eq!(manager.revolt_metrics().revolts_by_node(), 1);
}

#[test]
fn test_no_revolt_without_work() {
    let (clock, mut manager) = setup();
    let mut tracker = RevoltTracker::new(config(), &manager, clock.clone());

    clock.set(50_000);
    assert!(!tracker.update(&mut manager, false));
    assert!(!manager.my_status().revolting);
}

#[test]
fn test_fast_revolt_on_silent_primary() {
    let (clock, mut manager) = setup();
    let mut tracker = RevoltTracker::new(fast_config(), &manager, clock.clone());

    assert!(manager.on_height_advance(2));
    tracker.observe(&manager);
    assert_eq!(tracker.deadline(), 1_100);

    clock.set(300);
    manager.on_status_update(0, NodeStatus::new(2, 1)).unwrap();

    clock.set(700);
    assert!(!tracker.update(&mut manager, false));

    // Primary silent for 550 ms, before the regular deadline.
    clock.set(850);
    assert!(tracker.update(&mut manager, false));
    assert!(manager.my_status().revolting);
}

#[test]
fn test_fast_revolt_waits_for_first_height() {
    let (clock, mut manager) = setup();
    let mut tracker = RevoltTracker::new(fast_config(), &manager, clock.clone());

    clock.set(10_000);
    assert!(!tracker.update(&mut manager, false));
    assert!(!manager.my_status().revolting);
}

#[test]
fn test_primary_never_fast_revolts() {
    let clock = Arc::new(ManualClock::new(100));
    let mut manager = StatusManager::new(4, 0, 1, clock.clone()).unwrap();
    let mut tracker = RevoltTracker::new(fast_config(), &manager, clock.clone());

    assert!(manager.on_height_advance(2));
    tracker.observe(&manager);

    clock.set(1_000);
    assert!(!tracker.update(&mut manager, false));
}
