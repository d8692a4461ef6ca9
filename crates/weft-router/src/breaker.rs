//! Per-node circuit breakers
//!
//! State machine per node:
//! `closed --(N consecutive failures)--> open --(cooldown elapses)-->
//! half-open --(trial success)--> closed`, with a trial failure sending
//! the breaker back to `open` and restarting the cooldown. While open, the
//! node is invisible to the selector, and half-open admits exactly one
//! trial per cooldown window.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use weft_core::{NodeName, RouterConfig};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker for a single node. Mutated exclusively by the router after each
/// dispatch attempt.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: BreakerState,
    failures: u32,
    /// For `Open`: when the cooldown elapses. For `HalfOpen`: when a
    /// stranded trial (admitted but never dispatched) may be re-admitted.
    deadline: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    /// A fresh, closed breaker
    pub fn new() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            deadline: None,
        }
    }

    /// Current state
    pub fn state(&self) -> BreakerState {
        self.state
    }

    /// Consecutive failure count
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Decide whether a dispatch may be offered to this node. An open
    /// breaker whose cooldown has elapsed transitions to half-open and
    /// admits a single trial; further requests are denied until the trial
    /// resolves or its window expires.
    pub fn admit(&mut self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.state {
            BreakerState::Closed => true,
            BreakerState::Open | BreakerState::HalfOpen => {
                let elapsed = self.deadline.map(|d| now >= d).unwrap_or(true);
                if elapsed {
                    self.state = BreakerState::HalfOpen;
                    self.deadline = checked_deadline(now, cooldown);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// A dispatch succeeded: reset to closed
    pub fn record_success(&mut self) {
        self.state = BreakerState::Closed;
        self.failures = 0;
        self.deadline = None;
    }

    /// A dispatch failed. Returns true if this failure opened the breaker.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        threshold: u32,
        cooldown: Duration,
    ) -> bool {
        match self.state {
            BreakerState::Closed => {
                self.failures += 1;
                if self.failures >= threshold {
                    self.state = BreakerState::Open;
                    self.deadline = checked_deadline(now, cooldown);
                    return true;
                }
                false
            }
            BreakerState::HalfOpen => {
                // Trial failed: cooldown restarts.
                self.state = BreakerState::Open;
                self.failures += 1;
                self.deadline = checked_deadline(now, cooldown);
                true
            }
            BreakerState::Open => {
                self.failures += 1;
                self.deadline = checked_deadline(now, cooldown);
                false
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

fn checked_deadline(now: DateTime<Utc>, cooldown: Duration) -> Option<DateTime<Utc>> {
    ChronoDuration::from_std(cooldown)
        .ok()
        .map(|d| now + d)
}

/// The router's view over all per-node breakers. Entries are independent,
/// so each lives under its own key with per-key locking.
#[derive(Debug, Clone)]
pub struct BreakerBoard {
    breakers: Arc<DashMap<NodeName, CircuitBreaker>>,
    threshold: u32,
    cooldown: Duration,
}

impl BreakerBoard {
    /// Create a board from router configuration
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            breakers: Arc::new(DashMap::new()),
            threshold: config.failure_threshold,
            cooldown: config.breaker_cooldown,
        }
    }

    /// Whether `node` may be offered to the selector right now
    pub fn admit(&self, node: &NodeName, now: DateTime<Utc>) -> bool {
        match self.breakers.get_mut(node) {
            Some(mut breaker) => breaker.admit(now, self.cooldown),
            None => true,
        }
    }

    /// Record a successful dispatch on `node`
    pub fn on_success(&self, node: &NodeName) {
        if let Some(mut breaker) = self.breakers.get_mut(node) {
            if breaker.state() != BreakerState::Closed {
                info!(node = %node, "Circuit breaker closed");
            }
            breaker.record_success();
        }
    }

    /// Record a failed dispatch on `node`
    pub fn on_failure(&self, node: &NodeName, now: DateTime<Utc>) {
        let mut breaker = self.breakers.entry(node.clone()).or_default();
        if breaker.record_failure(now, self.threshold, self.cooldown) {
            warn!(
                node = %node,
                failures = breaker.failures(),
                cooldown = ?self.cooldown,
                "Circuit breaker opened"
            );
        }
    }

    /// Current state for a node (closed if never seen)
    pub fn state(&self, node: &NodeName) -> BreakerState {
        self.breakers
            .get(node)
            .map(|b| b.state())
            .unwrap_or(BreakerState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOLDOWN: Duration = Duration::from_secs(60);

    fn board() -> BreakerBoard {
        BreakerBoard::new(&RouterConfig::default())
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let board = board();
        let node = NodeName::from("aurora");
        let now = Utc::now();

        board.on_failure(&node, now);
        board.on_failure(&node, now);
        assert_eq!(board.state(&node), BreakerState::Closed);

        board.on_failure(&node, now);
        assert_eq!(board.state(&node), BreakerState::Open);
        // Fourth attempt within the cooldown window skips the node.
        assert!(!board.admit(&node, now + ChronoDuration::seconds(1)));
    }

    #[test]
    fn test_single_trial_after_cooldown() {
        let board = board();
        let node = NodeName::from("aurora");
        let now = Utc::now();

        for _ in 0..3 {
            board.on_failure(&node, now);
        }

        let after = now + ChronoDuration::seconds(61);
        // Exactly one trial is admitted.
        assert!(board.admit(&node, after));
        assert_eq!(board.state(&node), BreakerState::HalfOpen);
        assert!(!board.admit(&node, after));
        assert!(!board.admit(&node, after + ChronoDuration::seconds(30)));
    }

    #[test]
    fn test_trial_success_closes() {
        let board = board();
        let node = NodeName::from("aurora");
        let now = Utc::now();

        for _ in 0..3 {
            board.on_failure(&node, now);
        }
        let after = now + ChronoDuration::seconds(61);
        assert!(board.admit(&node, after));
        board.on_success(&node);

        assert_eq!(board.state(&node), BreakerState::Closed);
        assert!(board.admit(&node, after));
    }

    #[test]
    fn test_trial_failure_reopens_with_fresh_cooldown() {
        let board = board();
        let node = NodeName::from("aurora");
        let now = Utc::now();

        for _ in 0..3 {
            board.on_failure(&node, now);
        }
        let trial_at = now + ChronoDuration::seconds(61);
        assert!(board.admit(&node, trial_at));
        board.on_failure(&node, trial_at);

        assert_eq!(board.state(&node), BreakerState::Open);
        // Still within the restarted cooldown.
        assert!(!board.admit(&node, trial_at + ChronoDuration::seconds(59)));
        // New window admits a trial again.
        assert!(board.admit(&node, trial_at + ChronoDuration::seconds(61)));
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut breaker = CircuitBreaker::new();
        let now = Utc::now();

        breaker.record_failure(now, 3, COOLDOWN);
        breaker.record_failure(now, 3, COOLDOWN);
        breaker.record_success();
        assert_eq!(breaker.failures(), 0);

        // Two more failures do not reach the threshold after the reset.
        breaker.record_failure(now, 3, COOLDOWN);
        breaker.record_failure(now, 3, COOLDOWN);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_stranded_trial_readmitted_after_window() {
        let mut breaker = CircuitBreaker::new();
        let now = Utc::now();

        for _ in 0..3 {
            breaker.record_failure(now, 3, COOLDOWN);
        }
        let t1 = now + ChronoDuration::seconds(61);
        assert!(breaker.admit(t1, COOLDOWN));
        // Trial admitted but never dispatched; a later window re-admits.
        assert!(!breaker.admit(t1 + ChronoDuration::seconds(10), COOLDOWN));
        assert!(breaker.admit(t1 + ChronoDuration::seconds(61), COOLDOWN));
    }

    #[test]
    fn test_unknown_node_is_closed() {
        let board = board();
        let node = NodeName::from("never-seen");
        assert_eq!(board.state(&node), BreakerState::Closed);
        assert!(board.admit(&node, Utc::now()));
    }
}
