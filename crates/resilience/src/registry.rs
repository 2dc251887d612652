//! Keyed registry of circuit breakers, one per platform identifier.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::info;

use crate::breaker::{BreakerConfig, BreakerMetrics, CircuitBreaker};

/// Lazily creates and hands out breakers keyed by platform identifier.
///
/// A breaker is shared by every connection of its platform type: a burst of
/// failures from one tenant's connection fast-fails sends for other tenants
/// on the same platform until the breaker resets. Breakers live for the
/// process lifetime; there is no expiry beyond `reset`.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Get the breaker for `platform`, creating it on first use.
    pub fn for_platform(&self, platform: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.read().get(platform) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.write();
        // Double-check: another task may have created it between locks.
        if let Some(breaker) = breakers.get(platform) {
            return Arc::clone(breaker);
        }

        info!(platform, "creating circuit breaker");
        let breaker = Arc::new(CircuitBreaker::new(platform, self.config));
        breakers.insert(platform.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Snapshot of every registered breaker.
    pub fn metrics(&self) -> Vec<BreakerMetrics> {
        self.read().values().map(|b| b.metrics()).collect()
    }

    /// Manually reset one breaker. Returns false if it was never created.
    pub fn reset(&self, platform: &str) -> bool {
        match self.read().get(platform) {
            Some(breaker) => {
                breaker.manual_reset();
                true
            },
            None => false,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        match self.breakers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        match self.breakers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
