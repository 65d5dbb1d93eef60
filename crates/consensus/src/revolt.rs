//! Revolt accounting and the local revolt decision.
//!
//! Three pieces live here:
//!
//! - [`RevoltMetrics`] - monotone counters of observed revolts, for diagnostics
//! - [`RoundRevoltTally`] - the distinct revolters at the current round, which
//!   is what decides a round change
//! - [`RevoltTracker`] - decides when this node gives up on the primary
//!
//! ## Revolt deadline
//!
//! When the node enters a new height or round it computes
//!
//! ```text
//! deadline = now + timeout + delay(round)
//! delay(r) = base * (1.2^r - 1)    while r < ln(max / base) / ln(1.2)
//!          = max                   afterwards
//! ```
//!
//! and revolts once `now > deadline`, provided the block engine has something
//! to build. With fast revolt enabled it also revolts as soon as the primary's
//! status has been silent for longer than the fast timeout.

use std::sync::Arc;

use ebft_core::Clock;
use ebft_types::ValidatorIndex;
use serde::Serialize;
use tracing::{debug, info};

use crate::status_manager::StatusManager;

/// Growth factor of the revolt delay per round
const DELAY_GROWTH: f64 = 1.2;

/// Counters of revolts seen by this node.
///
/// Pure observability state; nothing reads these back into a decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RevoltMetrics {
    on_node: u64,
    by_node: u64,
    between_others: u64,
}

impl RevoltMetrics {
    /// Revolts against this node as primary
    pub fn revolts_on_node(&self) -> u64 {
        self.on_node
    }

    /// Revolts started by this node
    pub fn revolts_by_node(&self) -> u64 {
        self.by_node
    }

    /// Revolts between two other validators
    pub fn revolts_between_others(&self) -> u64 {
        self.between_others
    }

    pub(crate) fn record_on_node(&mut self) {
        self.on_node += 1;
    }

    pub(crate) fn record_by_node(&mut self) {
        self.by_node += 1;
    }

    pub(crate) fn record_between_others(&mut self) {
        self.between_others += 1;
    }
}

/// Distinct validators revolting at one (height, round).
///
/// Cleared whenever the local round or height changes, independently of the
/// height-scoped reported-revolt flags.
#[derive(Debug, Clone)]
pub struct RoundRevoltTally {
    round: u64,
    revolters: Vec<bool>,
}

impl RoundRevoltTally {
    /// Empty tally for `count` validators at `round`.
    pub fn new(count: usize, round: u64) -> Self {
        Self {
            round,
            revolters: vec![false; count],
        }
    }

    /// Round the tally belongs to.
    pub fn round(&self) -> u64 {
        self.round
    }

    /// Records `index` as revolting. Returns `false` if it was already counted.
    pub fn record(&mut self, index: ValidatorIndex) -> bool {
        match self.revolters.get_mut(index) {
            Some(flag) if !*flag => {
                *flag = true;
                true
            }
            _ => false,
        }
    }

    /// Whether `index` is counted.
    pub fn contains(&self, index: ValidatorIndex) -> bool {
        self.revolters.get(index).copied().unwrap_or(false)
    }

    /// Number of distinct revolters.
    pub fn count(&self) -> usize {
        self.revolters.iter().filter(|r| **r).count()
    }

    /// Empties the tally and moves it to `round`.
    pub fn reset(&mut self, round: u64) {
        self.round = round;
        self.revolters.iter_mut().for_each(|r| *r = false);
    }
}

/// Revolt deadline settings, in milliseconds.
#[derive(Debug, Clone)]
pub struct RevoltConfig {
    /// Base time to wait for the primary
    pub timeout_ms: u64,
    /// Scale of the exponential per-round delay
    pub exponential_delay_base_ms: u64,
    /// Cap on the exponential delay
    pub exponential_delay_max_ms: u64,
    /// Primary silence that triggers an early revolt; disabled when `None`
    pub fast_revolt_status_timeout_ms: Option<u64>,
}

impl RevoltConfig {
    /// First round at which the delay is capped.
    pub fn max_delay_round(&self) -> u64 {
        let ratio = self.exponential_delay_max_ms as f64 / self.exponential_delay_base_ms.max(1) as f64;
        (ratio.ln() / DELAY_GROWTH.ln()).floor().max(0.0) as u64
    }

    /// Extra wait added to `timeout_ms` at `round`.
    pub fn delay_for_round(&self, round: u64) -> i64 {
        if round < self.max_delay_round() {
            let base = self.exponential_delay_base_ms as f64;
            ((base * DELAY_GROWTH.powf(round as f64)) as i64)
                .saturating_sub(saturating_millis(self.exponential_delay_base_ms))
        } else {
            saturating_millis(self.exponential_delay_max_ms)
        }
    }

    /// Full wait before revolting at `round`.
    pub fn revolt_wait(&self, round: u64) -> i64 {
        saturating_millis(self.timeout_ms).saturating_add(self.delay_for_round(round))
    }
}

fn saturating_millis(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

impl Default for RevoltConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            exponential_delay_base_ms: 1_000,
            exponential_delay_max_ms: 600_000,
            fast_revolt_status_timeout_ms: None,
        }
    }
}

/// Decides when the local node starts revolting.
pub struct RevoltTracker {
    config: RevoltConfig,
    clock: Arc<dyn Clock>,
    start_height: u64,
    prev_height: u64,
    prev_round: u64,
    deadline: i64,
}

impl RevoltTracker {
    /// Creates a tracker for the manager's current height and round.
    pub fn new(config: RevoltConfig, manager: &StatusManager, clock: Arc<dyn Clock>) -> Self {
        let my = manager.my_status();
        let deadline = clock.now_millis().saturating_add(config.revolt_wait(my.round));
        Self {
            start_height: my.height,
            prev_height: my.height,
            prev_round: my.round,
            deadline,
            config,
            clock,
        }
    }

    /// Current revolt deadline (milliseconds).
    pub fn deadline(&self) -> i64 {
        self.deadline
    }

    /// Re-evaluates the revolt conditions. Returns `true` if a revolt started.
    pub fn update(&mut self, manager: &mut StatusManager, should_build_block: bool) -> bool {
        let now = self.clock.now_millis();
        self.refresh_deadline(manager, now);
        let (height, round) = {
            let my = manager.my_status();
            (my.height, my.round)
        };

        if manager.my_status().revolting {
            return false;
        }

        if self.should_fast_revolt(manager, now) {
            info!(
                height,
                round,
                primary = manager.primary_index(),
                "Primary status silent, fast revolting"
            );
            manager.on_start_revolting();
            return true;
        }

        if now > self.deadline && should_build_block {
            info!(height, round, deadline = self.deadline, "Revolt deadline passed");
            manager.on_start_revolting();
            return true;
        }

        false
    }

    /// Moves the deadline if the manager entered a new height or round since
    /// the last call, without considering a revolt.
    pub fn observe(&mut self, manager: &StatusManager) {
        let now = self.clock.now_millis();
        self.refresh_deadline(manager, now);
    }

    fn refresh_deadline(&mut self, manager: &StatusManager, now: i64) {
        let my = manager.my_status();
        if my.height > self.prev_height || (my.height == self.prev_height && my.round > self.prev_round) {
            self.prev_height = my.height;
            self.prev_round = my.round;
            self.deadline = now.saturating_add(self.config.revolt_wait(my.round));
            debug!(
                height = my.height,
                round = my.round,
                deadline = self.deadline,
                "Revolt deadline reset"
            );
        }
    }

    fn should_fast_revolt(&self, manager: &StatusManager, now: i64) -> bool {
        let Some(fast_timeout) = self.config.fast_revolt_status_timeout_ms else {
            return false;
        };
        // A node that has not finished a height since it started has no
        // baseline for the primary's status cadence.
        if self.prev_height <= self.start_height || manager.is_my_node_primary() {
            return false;
        }
        let last_seen = manager
            .latest_status_timestamp(manager.primary_index())
            .unwrap_or(0);
        now.saturating_sub(last_seen) > saturating_millis(fast_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RevoltConfig {
        RevoltConfig {
            timeout_ms: 1_000,
            exponential_delay_base_ms: 1_000,
            exponential_delay_max_ms: 600_000,
            fast_revolt_status_timeout_ms: None,
        }
    }

    #[test]
    fn test_max_delay_round() {
        assert_eq!(config().max_delay_round(), 35);
    }

    #[test]
    fn test_delay_grows_then_caps() {
        let config = config();
        assert_eq!(config.delay_for_round(0), 0);
        assert_eq!(config.delay_for_round(1), 200);
        assert_eq!(config.delay_for_round(2), 440);
        assert_eq!(config.delay_for_round(10), 5_191);
        assert_eq!(config.delay_for_round(35), 600_000);
        assert_eq!(config.delay_for_round(1_000), 600_000);
        for round in 1..35 {
            assert!(config.delay_for_round(round) > config.delay_for_round(round - 1));
        }
    }

    #[test]
    fn test_oversized_settings_saturate() {
        let config = RevoltConfig {
            timeout_ms: u64::MAX,
            exponential_delay_base_ms: 1_000,
            exponential_delay_max_ms: u64::MAX,
            fast_revolt_status_timeout_ms: None,
        };
        assert_eq!(config.delay_for_round(1_000), i64::MAX);
        assert_eq!(config.revolt_wait(0), i64::MAX);
        assert_eq!(config.revolt_wait(1_000), i64::MAX);
        assert!(config.delay_for_round(3) > 0);
    }

    #[test]
    fn test_tally_distinct() {
        let mut tally = RoundRevoltTally::new(4, 3);
        assert!(tally.record(0));
        assert!(!tally.record(0));
        assert!(tally.record(2));
        assert!(!tally.record(9));
        assert_eq!(tally.count(), 2);
        assert!(tally.contains(2));
        tally.reset(4);
        assert_eq!(tally.count(), 0);
        assert_eq!(tally.round(), 4);
    }

    #[test]
    fn test_metrics_start_at_zero() {
        let metrics = RevoltMetrics::default();
        assert_eq!(metrics.revolts_on_node(), 0);
        assert_eq!(metrics.revolts_by_node(), 0);
        assert_eq!(metrics.revolts_between_others(), 0);
    }
}
