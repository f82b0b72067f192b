use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::LimiterError;

/// Strategy for switching between the primary and fallback backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwitchingStrategy {
    /// Retry on the fallback within the same call; keep no state.
    FailFast,
    /// Switch after a threshold of consecutive failures.
    #[default]
    CircuitBreaker,
    /// Switch based on a background health probe.
    HealthCheck,
}

impl FromStr for SwitchingStrategy {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail_fast" => Ok(SwitchingStrategy::FailFast),
            "circuit_breaker" => Ok(SwitchingStrategy::CircuitBreaker),
            "health_check" => Ok(SwitchingStrategy::HealthCheck),
            other => Err(LimiterError::Config(format!(
                "Unknown switching strategy: {other}"
            ))),
        }
    }
}

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CircuitState {
    /// Normal operation, traffic goes to the primary.
    #[default]
    Closed,
    /// Primary is down, traffic goes to the fallback.
    Open,
    /// Probing whether the primary is back.
    HalfOpen,
}

/// Monotonic request/failure counters shared by all switching strategies.
#[derive(Debug, Default)]
pub(crate) struct CompositeCounters {
    pub primary_requests: AtomicU64,
    pub primary_failures: AtomicU64,
    pub fallback_requests: AtomicU64,
    pub fallback_failures: AtomicU64,
    pub switches_to_fallback: AtomicU64,
    pub switches_to_primary: AtomicU64,
}

impl CompositeCounters {
    pub fn record_request(&self, primary: bool) {
        if primary {
            self.primary_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fallback_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_failure(&self, primary: bool) {
        if primary {
            self.primary_failures.fetch_add(1, Ordering::Relaxed);
        } else {
            self.fallback_failures.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time view of a composite backend's counters and breaker state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeStats {
    pub primary_requests: u64,
    pub primary_failures: u64,
    pub fallback_requests: u64,
    pub fallback_failures: u64,
    pub switches_to_fallback: u64,
    pub switches_to_primary: u64,
    pub consecutive_failures: u32,
    pub circuit_state: CircuitState,
    /// Milliseconds since the last recorded primary failure, if any.
    pub last_failure_ms_ago: Option<u64>,
    /// Milliseconds since the last recovery probe was dispatched, if any.
    pub last_recovery_attempt_ms_ago: Option<u64>,
}

impl CompositeStats {
    pub fn total_requests(&self) -> u64 {
        self.primary_requests + self.fallback_requests
    }

    pub fn total_failures(&self) -> u64 {
        self.primary_failures + self.fallback_failures
    }
}
