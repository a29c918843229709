//! Circuit breaker state machine.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a bounded trial batch probes recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open:      window >= minimum_number_of_calls and a rate >= its threshold
//! Open → Half-Open:   wait_duration_in_open_state elapsed (timer or next permission check)
//! Half-Open → Closed: every trial call completed, both rates below threshold
//! Half-Open → Open:   rates over the trial batch >= threshold, as soon as evaluable
//! ```
//!
//! # Design Decisions
//! - Pure bookkeeping: no locking, no clocks, no I/O; callers pass `now`
//! - Every transition clears the window and starts a new generation
//! - Permits carry their generation so late outcomes never leak into a later episode

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::BreakerConfig;
use crate::resilience::window::{OutcomeKind, OutcomeRecord, OutcomeWindow, WindowStats};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed,
    /// Calls are rejected without reaching the dependency.
    Open,
    /// A limited number of trial calls probe the dependency.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }

    /// Numeric encoding used by the state gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::Open => 1.0,
            CircuitState::HalfOpen => 2.0,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change performed by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: CircuitState,
    pub to: CircuitState,
    /// Generation of the episode that was entered.
    pub generation: u64,
}

/// A granted permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub generation: u64,
    pub state: CircuitState,
    /// Set when granting first moved an expired OPEN episode to HALF_OPEN.
    pub transition: Option<Transition>,
}

/// Result of feeding an outcome to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    Applied { transition: Option<Transition> },
    /// The permit belonged to an episode that has already ended.
    Stale,
}

/// Thresholds copied out of [`BreakerConfig`].
#[derive(Debug, Clone, Copy)]
struct Limits {
    failure_rate_threshold: f32,
    slow_call_rate_threshold: f32,
    minimum_number_of_calls: usize,
    sliding_window_size: usize,
    permitted_in_half_open: u32,
    wait_in_open: Duration,
}

impl From<&BreakerConfig> for Limits {
    fn from(config: &BreakerConfig) -> Self {
        Self {
            failure_rate_threshold: config.failure_rate_threshold,
            slow_call_rate_threshold: config.slow_call_rate_threshold,
            minimum_number_of_calls: config.minimum_number_of_calls.max(1) as usize,
            sliding_window_size: config.sliding_window_size.max(1) as usize,
            permitted_in_half_open: config.permitted_number_of_calls_in_half_open_state.max(1),
            wait_in_open: config.wait_duration_in_open_state(),
        }
    }
}

/// Mutable per-breaker state: current state, window and episode counters.
#[derive(Debug)]
pub struct StateMachine {
    limits: Limits,
    state: CircuitState,
    window: OutcomeWindow,
    generation: u64,
    entered_at: Instant,
    half_open_granted: u32,
    half_open_completed: u32,
    not_permitted: u64,
    stale_outcomes: u64,
}

impl StateMachine {
    pub fn new(config: &BreakerConfig, now: Instant) -> Self {
        Self {
            limits: Limits::from(config),
            state: CircuitState::Closed,
            window: OutcomeWindow::new(config.sliding_window_size as usize),
            generation: 0,
            entered_at: now,
            half_open_granted: 0,
            half_open_completed: 0,
            not_permitted: 0,
            stale_outcomes: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn window_stats(&self) -> WindowStats {
        self.window.stats()
    }

    pub fn not_permitted(&self) -> u64 {
        self.not_permitted
    }

    pub fn stale_outcomes(&self) -> u64 {
        self.stale_outcomes
    }

    /// Trial permits handed out in the current HALF_OPEN episode.
    pub fn half_open_granted(&self) -> u32 {
        self.half_open_granted
    }

    /// When the current OPEN episode may start probing.
    pub fn open_deadline(&self) -> Option<Instant> {
        (self.state == CircuitState::Open).then(|| self.entered_at + self.limits.wait_in_open)
    }

    /// Move an expired OPEN episode to HALF_OPEN.
    pub fn poll(&mut self, now: Instant) -> Option<Transition> {
        match self.open_deadline() {
            Some(deadline) if now >= deadline => Some(self.transition_to(CircuitState::HalfOpen, now)),
            _ => None,
        }
    }

    /// The scheduled OPEN timer for `generation` fired. A no-op unless that
    /// exact OPEN episode is still current.
    pub fn open_wait_elapsed(&mut self, generation: u64, now: Instant) -> Option<Transition> {
        if self.state == CircuitState::Open && self.generation == generation {
            Some(self.transition_to(CircuitState::HalfOpen, now))
        } else {
            None
        }
    }

    /// Ask for permission to run one protected call.
    ///
    /// Denials are counted; the `Err` carries the state that denied.
    pub fn try_acquire(&mut self, now: Instant) -> Result<Grant, CircuitState> {
        let transition = self.poll(now);

        let granted = match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if self.half_open_granted < self.limits.permitted_in_half_open {
                    self.half_open_granted += 1;
                    true
                } else {
                    false
                }
            }
        };

        if granted {
            Ok(Grant {
                generation: self.generation,
                state: self.state,
                transition,
            })
        } else {
            self.not_permitted += 1;
            Err(self.state)
        }
    }

    /// Apply an outcome and re-evaluate the transition rules.
    pub fn record(
        &mut self,
        generation: u64,
        kind: OutcomeKind,
        duration: Duration,
        now: Instant,
    ) -> Recorded {
        if generation != self.generation || self.state == CircuitState::Open {
            self.stale_outcomes += 1;
            return Recorded::Stale;
        }

        self.window.record(OutcomeRecord {
            kind,
            duration,
            recorded_at: now,
        });
        if self.state == CircuitState::HalfOpen {
            self.half_open_completed += 1;
        }

        let transition = self.evaluate().map(|to| self.transition_to(to, now));
        Recorded::Applied { transition }
    }

    /// Force CLOSED with an empty window.
    pub fn reset(&mut self, now: Instant) -> Option<Transition> {
        if self.state == CircuitState::Closed {
            self.window.clear();
            None
        } else {
            Some(self.transition_to(CircuitState::Closed, now))
        }
    }

    fn exceeds_thresholds(&self, stats: &WindowStats) -> bool {
        stats.failure_rate() >= self.limits.failure_rate_threshold
            || stats.slow_call_rate() >= self.limits.slow_call_rate_threshold
    }

    fn evaluate(&self) -> Option<CircuitState> {
        let stats = self.window.stats();
        match self.state {
            CircuitState::Closed => {
                if stats.total < self.limits.minimum_number_of_calls {
                    return None;
                }
                self.exceeds_thresholds(&stats).then_some(CircuitState::Open)
            }
            CircuitState::HalfOpen => {
                // The trial batch is the window; it may be smaller than the sample floor.
                let evaluable = self
                    .limits
                    .minimum_number_of_calls
                    .min(self.limits.permitted_in_half_open as usize);

                if stats.total >= evaluable && self.exceeds_thresholds(&stats) {
                    Some(CircuitState::Open)
                } else if self.half_open_completed >= self.limits.permitted_in_half_open {
                    Some(CircuitState::Closed)
                } else {
                    None
                }
            }
            CircuitState::Open => None,
        }
    }

    fn transition_to(&mut self, to: CircuitState, now: Instant) -> Transition {
        let from = self.state;
        self.state = to;
        self.generation += 1;
        self.entered_at = now;

        // HALF_OPEN rates cover the whole trial batch, whatever the CLOSED window size.
        let capacity = match to {
            CircuitState::HalfOpen => self.limits.permitted_in_half_open as usize,
            CircuitState::Closed | CircuitState::Open => self.limits.sliding_window_size,
        };
        if self.window.capacity() == capacity {
            self.window.clear();
        } else {
            self.window = OutcomeWindow::new(capacity);
        }
        self.half_open_granted = 0;
        self.half_open_completed = 0;

        Transition {
            from,
            to,
            generation: self.generation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_rate_threshold: 50.0,
            slow_call_rate_threshold: 100.0,
            slow_call_duration_threshold_ms: 100,
            minimum_number_of_calls: 3,
            sliding_window_size: 10,
            wait_duration_in_open_state_ms: 1_000,
            permitted_number_of_calls_in_half_open_state: 3,
        }
    }

    fn feed(machine: &mut StateMachine, kinds: &[OutcomeKind], now: Instant) -> Option<Transition> {
        let mut last = None;
        for kind in kinds {
            let grant = machine.try_acquire(now).expect("permit");
            if let Recorded::Applied { transition: Some(t) } =
                machine.record(grant.generation, *kind, Duration::from_millis(1), now)
            {
                last = Some(t);
            }
        }
        last
    }

    fn open_machine(now: Instant) -> StateMachine {
        let mut machine = StateMachine::new(&config(), now);
        use OutcomeKind::*;
        feed(&mut machine, &[Failure, Failure, Failure], now);
        assert_eq!(machine.state(), CircuitState::Open);
        machine
    }

    #[test]
    fn test_starts_closed_and_needs_sample_floor() {
        let now = Instant::now();
        let mut machine = StateMachine::new(&config(), now);
        assert_eq!(machine.state(), CircuitState::Closed);

        // 2 failures: 100% but below minimum_number_of_calls
        let t = feed(&mut machine, &[OutcomeKind::Failure, OutcomeKind::Failure], now);
        assert!(t.is_none());
        assert_eq!(machine.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_failures_trip_at_threshold() {
        let now = Instant::now();
        let mut machine = StateMachine::new(&config(), now);
        use OutcomeKind::*;

        assert!(feed(&mut machine, &[Success, Success, Failure], now).is_none());
        let t = feed(&mut machine, &[Failure], now).unwrap();

        assert_eq!((t.from, t.to), (CircuitState::Closed, CircuitState::Open));
        assert_eq!(machine.window_stats().total, 0, "window cleared on transition");
        assert_eq!(machine.open_deadline(), Some(now + Duration::from_secs(1)));
    }

    #[test]
    fn test_slow_calls_trip() {
        let now = Instant::now();
        let mut machine = StateMachine::new(
            &BreakerConfig {
                slow_call_rate_threshold: 60.0,
                ..config()
            },
            now,
        );
        use OutcomeKind::*;

        let t = feed(&mut machine, &[SlowSuccess, SlowSuccess, Success], now).unwrap();
        assert_eq!(t.to, CircuitState::Open);
    }

    #[test]
    fn test_open_denies_until_deadline() {
        let now = Instant::now();
        let mut machine = open_machine(now);

        for _ in 0..100 {
            assert_eq!(
                machine.try_acquire(now + Duration::from_millis(999)),
                Err(CircuitState::Open)
            );
        }
        assert_eq!(machine.not_permitted(), 100);

        let grant = machine.try_acquire(now + Duration::from_secs(1)).unwrap();
        assert_eq!(grant.state, CircuitState::HalfOpen);
        let t = grant.transition.unwrap();
        assert_eq!((t.from, t.to), (CircuitState::Open, CircuitState::HalfOpen));
    }

    #[test]
    fn test_half_open_caps_trial_permits() {
        let now = Instant::now();
        let mut machine = open_machine(now);
        machine.open_wait_elapsed(machine.generation(), now).unwrap();

        for _ in 0..3 {
            assert!(machine.try_acquire(now).is_ok());
        }
        assert_eq!(machine.try_acquire(now), Err(CircuitState::HalfOpen));
        assert_eq!(machine.half_open_granted(), 3);
    }

    #[test]
    fn test_half_open_successes_close() {
        let now = Instant::now();
        let mut machine = open_machine(now);
        machine.open_wait_elapsed(machine.generation(), now).unwrap();

        use OutcomeKind::*;
        let t = feed(&mut machine, &[Success, Success, Success], now).unwrap();
        assert_eq!((t.from, t.to), (CircuitState::HalfOpen, CircuitState::Closed));
        assert_eq!(machine.window_stats(), WindowStats::default());
    }

    #[test]
    fn test_half_open_failures_reopen_and_restart_wait() {
        let now = Instant::now();
        let mut machine = open_machine(now);
        let later = now + Duration::from_secs(1);
        machine.open_wait_elapsed(machine.generation(), later).unwrap();

        use OutcomeKind::*;
        let t = feed(&mut machine, &[Failure, Failure, Success], later).unwrap();
        assert_eq!((t.from, t.to), (CircuitState::HalfOpen, CircuitState::Open));
        assert_eq!(machine.open_deadline(), Some(later + Duration::from_secs(1)));
    }

    #[test]
    fn test_trial_batch_larger_than_window() {
        let now = Instant::now();
        let config = BreakerConfig {
            failure_rate_threshold: 60.0,
            minimum_number_of_calls: 2,
            sliding_window_size: 2,
            permitted_number_of_calls_in_half_open_state: 5,
            ..config()
        };
        let mut machine = StateMachine::new(&config, now);
        use OutcomeKind::*;

        feed(&mut machine, &[Failure, Failure], now);
        machine.open_wait_elapsed(machine.generation(), now).unwrap();

        assert!(feed(&mut machine, &[Failure, Success], now).is_none());
        // 2 failures out of 3 trials, no trial evicted
        let t = feed(&mut machine, &[Failure], now).unwrap();
        assert_eq!((t.from, t.to), (CircuitState::HalfOpen, CircuitState::Open));

        // Back in CLOSED, the configured window size applies again
        machine.reset(now).unwrap();
        feed(&mut machine, &[Success, Success, Success], now);
        assert_eq!(machine.window_stats().total, 2);
    }

    #[test]
    fn test_half_open_reopens_before_batch_completes() {
        let now = Instant::now();
        let mut machine = StateMachine::new(
            &BreakerConfig {
                minimum_number_of_calls: 1,
                ..config()
            },
            now,
        );
        feed(&mut machine, &[OutcomeKind::Failure], now);
        machine.open_wait_elapsed(machine.generation(), now).unwrap();

        let first = machine.try_acquire(now).unwrap();
        let second = machine.try_acquire(now).unwrap();
        let recorded = machine.record(first.generation, OutcomeKind::Failure, Duration::ZERO, now);
        assert!(matches!(
            recorded,
            Recorded::Applied { transition: Some(Transition { to: CircuitState::Open, .. }) }
        ));

        // The outstanding trial call finishes after the episode ended
        let late = machine.record(second.generation, OutcomeKind::Success, Duration::ZERO, now);
        assert_eq!(late, Recorded::Stale);
        assert_eq!(machine.stale_outcomes(), 1);
        assert_eq!(machine.window_stats().total, 0);
    }

    #[test]
    fn test_late_timer_is_noop() {
        let now = Instant::now();
        let mut machine = open_machine(now);
        let open_generation = machine.generation();

        // Permission check observes the deadline first
        machine.try_acquire(now + Duration::from_secs(2)).unwrap();
        assert_eq!(machine.state(), CircuitState::HalfOpen);

        assert!(machine.open_wait_elapsed(open_generation, now).is_none());
        assert_eq!(machine.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_reset() {
        let now = Instant::now();
        let mut machine = open_machine(now);

        let t = machine.reset(now).unwrap();
        assert_eq!((t.from, t.to), (CircuitState::Open, CircuitState::Closed));
        assert!(machine.reset(now).is_none());
        assert!(machine.try_acquire(now).is_ok());
    }
}
