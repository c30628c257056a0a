//! Per-provider circuit breaker state.
//!
//! State changes only through [`CircuitState::record_success`] and
//! [`CircuitState::record_failure`]; [`CircuitState::is_open`] is a pure query
//! against an explicit `now`, so tests drive time with a [`ManualClock`].

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rollcall_core::BreakerConfig;

/// Breaker thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerPolicy {
    /// Consecutive non-transient failures that open the breaker.
    pub failure_threshold: u32,
    /// Time after the last failure before an open breaker lets calls through.
    pub cooldown: Duration,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        Self::from(&BreakerConfig::default())
    }
}

impl From<&BreakerConfig> for BreakerPolicy {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            cooldown: Duration::from_secs(config.cooldown_secs),
        }
    }
}

/// Failure bookkeeping for one provider.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, Instant};
/// use rollcall_providers::{BreakerPolicy, CircuitState};
///
/// let policy = BreakerPolicy { failure_threshold: 2, cooldown: Duration::from_secs(60) };
/// let t0 = Instant::now();
/// let mut state = CircuitState::default();
/// state.record_failure(t0, &policy);
/// assert!(!state.is_open(t0, &policy));
/// state.record_failure(t0, &policy);
/// assert!(state.is_open(t0, &policy));
/// assert!(!state.is_open(t0 + Duration::from_secs(60), &policy));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CircuitState {
    pub consecutive_failures: u32,
    pub last_failure: Option<Instant>,
    pub open: bool,
}

impl CircuitState {
    /// `true` while the breaker is open and the cool-down has not elapsed.
    pub fn is_open(&self, now: Instant, policy: &BreakerPolicy) -> bool {
        match (self.open, self.last_failure) {
            (true, Some(last)) => now.saturating_duration_since(last) < policy.cooldown,
            _ => false,
        }
    }

    /// Reset after a successful call.
    pub fn record_success(&mut self) {
        *self = Self::default();
    }

    /// Count a non-transient failure. Returns `true` when this call opened
    /// the breaker.
    pub fn record_failure(&mut self, now: Instant, policy: &BreakerPolicy) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_failure = Some(now);
        let was_open = self.open;
        self.open = self.consecutive_failures >= policy.failure_threshold;
        self.open && !was_open
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = if self.open { "open" } else { "closed" };
        write!(f, "{label} ({} consecutive failures)", self.consecutive_failures)
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rollcall_providers::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let before = clock.now();
/// clock.advance(Duration::from_secs(61));
/// assert_eq!(clock.now() - before, Duration::from_secs(61));
/// ```
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self
            .offset
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self
            .offset
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        self.start + offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BreakerPolicy {
        BreakerPolicy {
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
        }
    }

    #[test]
    fn opens_on_fifth_failure() {
        let clock = ManualClock::new();
        let mut state = CircuitState::default();
        for _ in 0..4 {
            assert!(!state.record_failure(clock.now(), &policy()));
        }
        assert!(!state.is_open(clock.now(), &policy()));
        assert!(state.record_failure(clock.now(), &policy()));
        assert!(state.is_open(clock.now(), &policy()));
    }

    #[test]
    fn closes_after_cooldown_since_last_failure() {
        let clock = ManualClock::new();
        let mut state = CircuitState::default();
        for _ in 0..5 {
            state.record_failure(clock.now(), &policy());
        }
        clock.advance(Duration::from_secs(59));
        assert!(state.is_open(clock.now(), &policy()));
        clock.advance(Duration::from_secs(1));
        assert!(!state.is_open(clock.now(), &policy()));
    }

    #[test]
    fn failed_probe_reopens_immediately() {
        let clock = ManualClock::new();
        let mut state = CircuitState::default();
        for _ in 0..5 {
            state.record_failure(clock.now(), &policy());
        }
        clock.advance(Duration::from_secs(61));
        assert!(!state.is_open(clock.now(), &policy()));
        assert!(!state.record_failure(clock.now(), &policy()));
        assert!(state.is_open(clock.now(), &policy()));
    }

    #[test]
    fn success_resets_everything() {
        let clock = ManualClock::new();
        let mut state = CircuitState::default();
        for _ in 0..5 {
            state.record_failure(clock.now(), &policy());
        }
        state.record_success();
        assert_eq!(state, CircuitState::default());
        assert!(!state.is_open(clock.now(), &policy()));
    }

    #[test]
    fn policy_from_config_never_has_zero_threshold() {
        let config = BreakerConfig {
            failure_threshold: 0,
            ..BreakerConfig::default()
        };
        assert_eq!(BreakerPolicy::from(&config).failure_threshold, 1);
    }
}
