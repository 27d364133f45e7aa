//! Per-adapter circuit breaker state machine (§4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::models::phase::AdapterId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Admission decision handed back to the scheduler before it launches a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admit,
    Defer,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub threshold: u32,
    pub cooldown: chrono::Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            cooldown: chrono::Duration::seconds(30),
        }
    }
}

/// One breaker per [`AdapterId`] (§4.2).
#[derive(Debug, Clone)]
pub struct CircuitBreakerState {
    pub adapter: AdapterId,
    pub config: CircuitBreakerConfig,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_ts: Option<DateTime<Utc>>,
    pub open_until: Option<DateTime<Utc>>,
    pub half_open_probe_in_flight: bool,
}

impl CircuitBreakerState {
    pub fn new(adapter: AdapterId, config: CircuitBreakerConfig) -> Self {
        Self {
            adapter,
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_ts: None,
            open_until: None,
            half_open_probe_in_flight: false,
        }
    }

    /// Advances `Open -> HalfOpen` once the cooldown has elapsed (table row 4).
    fn tick(&mut self, now: DateTime<Utc>) {
        if self.state == CircuitState::Open {
            if let Some(open_until) = self.open_until {
                if now >= open_until {
                    self.state = CircuitState::HalfOpen;
                    self.half_open_probe_in_flight = false;
                }
            }
        }
    }

    /// Scheduler contract (§4.2): `Closed`/`HalfOpen` without an in-flight
    /// probe admit; `Open` and `HalfOpen` with a probe already in flight defer.
    pub fn check(&mut self, now: DateTime<Utc>) -> Admission {
        self.tick(now);
        match self.state {
            CircuitState::Closed => Admission::Admit,
            CircuitState::Open => Admission::Defer,
            CircuitState::HalfOpen => {
                if self.half_open_probe_in_flight {
                    Admission::Defer
                } else {
                    self.half_open_probe_in_flight = true;
                    Admission::Admit
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.half_open_probe_in_flight = false;
        self.state = CircuitState::Closed;
        self.open_until = None;
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.last_failure_ts = Some(now);
        self.half_open_probe_in_flight = false;

        match self.state {
            CircuitState::HalfOpen => {
                self.state = CircuitState::Open;
                self.open_until = Some(now + self.config.cooldown);
            }
            CircuitState::Closed | CircuitState::Open => {
                self.failure_count += 1;
                if self.failure_count >= self.config.threshold {
                    self.state = CircuitState::Open;
                    self.open_until = Some(now + self.config.cooldown);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32) -> CircuitBreakerState {
        CircuitBreakerState::new(
            AdapterId::new("x"),
            CircuitBreakerConfig {
                threshold,
                cooldown: chrono::Duration::milliseconds(50),
            },
        )
    }

    #[test]
    fn stays_closed_below_threshold() {
        let mut b = breaker(5);
        let now = Utc::now();
        for _ in 0..4 {
            b.record_failure(now);
        }
        assert_eq!(b.state, CircuitState::Closed);
        assert_eq!(b.check(now), Admission::Admit);
    }

    #[test]
    fn trips_open_at_threshold() {
        let mut b = breaker(2);
        let now = Utc::now();
        b.record_failure(now);
        b.record_failure(now);
        assert_eq!(b.state, CircuitState::Open);
        assert_eq!(b.check(now), Admission::Defer);
    }

    #[test]
    fn success_resets_failure_count() {
        let mut b = breaker(2);
        let now = Utc::now();
        b.record_failure(now);
        b.record_success();
        assert_eq!(b.failure_count, 0);
        b.record_failure(now);
        assert_eq!(b.state, CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_then_close() {
        let mut b = breaker(1);
        let now = Utc::now();
        b.record_failure(now);
        assert_eq!(b.state, CircuitState::Open);

        let after_cooldown = now + chrono::Duration::milliseconds(60);
        assert_eq!(b.check(after_cooldown), Admission::Admit);
        assert_eq!(b.state, CircuitState::HalfOpen);
        assert!(b.half_open_probe_in_flight);

        assert_eq!(b.check(after_cooldown), Admission::Defer);

        b.record_success();
        assert_eq!(b.state, CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let mut b = breaker(1);
        let now = Utc::now();
        b.record_failure(now);
        let after_cooldown = now + chrono::Duration::milliseconds(60);
        b.check(after_cooldown);
        b.record_failure(after_cooldown);
        assert_eq!(b.state, CircuitState::Open);
    }
}
