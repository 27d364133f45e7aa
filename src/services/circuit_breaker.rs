//! Shared breaker table keyed by [`AdapterId`] (§4.2, §5).
//!
//! The context itself needs no lock because all mutation happens on the
//! orchestrator thread between phase completions; the breaker table is the
//! one piece of shared state that concurrent probes can touch, so it sits
//! behind a `tokio::sync::RwLock`.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::models::circuit_breaker::{Admission, CircuitBreakerConfig, CircuitBreakerState, CircuitState};
use crate::domain::models::phase::AdapterId;

pub struct CircuitBreakerTable {
    default_config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<AdapterId, CircuitBreakerState>>,
}

impl CircuitBreakerTable {
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            default_config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Scheduler admission check before launching a phase bound to `adapter` (P7).
    pub async fn check(&self, adapter: &AdapterId) -> Admission {
        let mut guard = self.breakers.write().await;
        let breaker = guard
            .entry(adapter.clone())
            .or_insert_with(|| CircuitBreakerState::new(adapter.clone(), self.default_config.clone()));
        breaker.check(Utc::now())
    }

    pub async fn record_success(&self, adapter: &AdapterId) {
        let mut guard = self.breakers.write().await;
        let breaker = guard
            .entry(adapter.clone())
            .or_insert_with(|| CircuitBreakerState::new(adapter.clone(), self.default_config.clone()));
        breaker.record_success();
    }

    pub async fn record_failure(&self, adapter: &AdapterId) {
        let mut guard = self.breakers.write().await;
        let breaker = guard
            .entry(adapter.clone())
            .or_insert_with(|| CircuitBreakerState::new(adapter.clone(), self.default_config.clone()));
        breaker.record_failure(Utc::now());
    }

    pub async fn state_of(&self, adapter: &AdapterId) -> CircuitState {
        let guard = self.breakers.read().await;
        guard.get(adapter).map(|b| b.state).unwrap_or(CircuitState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admits_unknown_adapter_closed() {
        let table = CircuitBreakerTable::new(CircuitBreakerConfig::default());
        assert_eq!(table.check(&AdapterId::new("x")).await, Admission::Admit);
    }

    #[tokio::test]
    async fn trips_and_defers_after_threshold() {
        let table = CircuitBreakerTable::new(CircuitBreakerConfig {
            threshold: 2,
            cooldown: chrono::Duration::seconds(30),
        });
        let adapter = AdapterId::new("x");
        table.record_failure(&adapter).await;
        table.record_failure(&adapter).await;
        assert_eq!(table.state_of(&adapter).await, CircuitState::Open);
        assert_eq!(table.check(&adapter).await, Admission::Defer);
    }
}
