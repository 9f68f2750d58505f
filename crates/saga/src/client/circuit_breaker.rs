use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::ServiceName;
use serde::Serialize;
use tokio::time::Instant;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected until the open wait elapses.
    Open,
    /// A limited number of trial calls decide whether to close again.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failure percentage (0-100) at or above which the breaker opens.
    pub failure_rate_threshold: f64,
    /// Number of most recent calls considered.
    pub sliding_window_size: usize,
    /// Calls needed in the window before the rate is evaluated.
    pub minimum_number_of_calls: usize,
    pub wait_duration_in_open_state: Duration,
    pub permitted_calls_in_half_open_state: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            sliding_window_size: 10,
            minimum_number_of_calls: 5,
            wait_duration_in_open_state: Duration::from_secs(30),
            permitted_calls_in_half_open_state: 3,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Outcome of recent calls while closed, `true` for a failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_permits: usize,
    half_open_outcomes: Vec<bool>,
}

/// Count-based circuit breaker for one participant.
#[derive(Debug)]
pub struct CircuitBreaker {
    service: ServiceName,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(service: ServiceName, config: CircuitBreakerConfig) -> Self {
        Self {
            service,
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                half_open_permits: 0,
                half_open_outcomes: Vec::new(),
            }),
        }
    }

    /// Current state, moving OPEN to HALF_OPEN once the wait has elapsed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        inner.state
    }

    /// Asks permission for one call. On refusal returns the blocking state.
    pub fn try_acquire(&self) -> Result<(), CircuitState> {
        let mut inner = self.lock();
        self.refresh(&mut inner);
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => Err(CircuitState::Open),
            CircuitState::HalfOpen => {
                if inner.half_open_permits < self.config.permitted_calls_in_half_open_state {
                    inner.half_open_permits += 1;
                    Ok(())
                } else {
                    Err(CircuitState::HalfOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        self.record(false);
    }

    pub fn record_failure(&self) {
        self.record(true);
    }

    fn record(&self, failed: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.window.push_back(failed);
                while inner.window.len() > self.config.sliding_window_size {
                    inner.window.pop_front();
                }
                if inner.window.len() >= self.config.minimum_number_of_calls
                    && failure_rate(inner.window.iter()) >= self.config.failure_rate_threshold
                {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => {
                inner.half_open_outcomes.push(failed);
                if inner.half_open_outcomes.len() >= self.config.permitted_calls_in_half_open_state
                {
                    let rate = failure_rate(inner.half_open_outcomes.iter());
                    let next = if rate >= self.config.failure_rate_threshold {
                        CircuitState::Open
                    } else {
                        CircuitState::Closed
                    };
                    self.transition(&mut inner, next);
                }
            }
            // late result of a call admitted before the breaker opened
            CircuitState::Open => {}
        }
    }

    fn refresh(&self, inner: &mut BreakerState) {
        if inner.state == CircuitState::Open
            && inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.wait_duration_in_open_state)
        {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        inner.window.clear();
        inner.half_open_permits = 0;
        inner.half_open_outcomes.clear();
        inner.opened_at = (to == CircuitState::Open).then(Instant::now);

        metrics::counter!(
            "saga_circuit_breaker_transitions_total",
            "service" => self.service.as_str(),
            "state" => to.as_str()
        )
        .increment(1);
        if to == CircuitState::Open {
            tracing::warn!(service = %self.service, %from, %to, "circuit breaker opened");
        } else {
            tracing::info!(service = %self.service, %from, %to, "circuit breaker state changed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn failure_rate<'a>(outcomes: impl Iterator<Item = &'a bool>) -> f64 {
    let (total, failures) = outcomes.fold((0usize, 0usize), |(total, failures), failed| {
        (total + 1, failures + usize::from(*failed))
    });
    if total == 0 {
        return 0.0;
    }
    failures as f64 * 100.0 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(
            ServiceName::Logistics,
            CircuitBreakerConfig {
                failure_rate_threshold: 50.0,
                sliding_window_size: 4,
                minimum_number_of_calls: 4,
                wait_duration_in_open_state: Duration::from_secs(10),
                permitted_calls_in_half_open_state: 2,
            },
        )
    }

    fn trip(breaker: &CircuitBreaker) {
        for _ in 0..4 {
            breaker.try_acquire().unwrap();
            breaker.record_failure();
        }
    }

    #[test]
    fn stays_closed_below_minimum_calls() {
        let breaker = breaker();
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn stays_closed_below_threshold() {
        let breaker = breaker();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn opens_at_threshold_and_rejects_calls() {
        let breaker = breaker();
        breaker.record_success();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.try_acquire(), Err(CircuitState::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_successes_close_the_breaker() {
        let breaker = breaker();
        trip(&breaker);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        assert!(breaker.try_acquire().is_ok());
        assert!(breaker.try_acquire().is_ok());
        assert_eq!(breaker.try_acquire(), Err(CircuitState::HalfOpen));

        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failures_reopen_the_breaker() {
        let breaker = breaker();
        trip(&breaker);

        tokio::time::advance(Duration::from_secs(10)).await;
        breaker.try_acquire().unwrap();
        breaker.try_acquire().unwrap();
        breaker.record_failure();
        breaker.record_success();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.try_acquire(), Err(CircuitState::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn open_breaker_waits_full_duration() {
        let breaker = breaker();
        trip(&breaker);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }
}
