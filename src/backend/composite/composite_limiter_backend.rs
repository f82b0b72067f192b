use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::LimiterBackend;
use crate::clock::{Clock, MonotonicClock};
use crate::settings::LimiterSettings;
use crate::{Decision, LimiterError};

use super::stats::{CircuitState, CompositeCounters, CompositeStats, SwitchingStrategy};

/// Configuration for [`CompositeLimiterBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeBackendConfig {
    pub strategy: SwitchingStrategy,
    /// Consecutive primary failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a recovery probe.
    pub recovery_timeout: Duration,
    /// Cadence of the background probe under the health-check strategy.
    pub health_check_interval: Duration,
    /// Reserved key the health probe counts against.
    pub health_key: String,
}

impl Default for CompositeBackendConfig {
    fn default() -> Self {
        let settings = LimiterSettings::global();
        Self {
            strategy: settings.switching_strategy,
            failure_threshold: settings.failure_threshold,
            recovery_timeout: Duration::from_secs(settings.recovery_timeout_seconds),
            health_check_interval: Duration::from_secs(settings.health_check_interval_seconds),
            health_key: format!("{}:__health__", settings.default_prefix),
        }
    }
}

impl CompositeBackendConfig {
    fn validate(&self) -> Result<(), LimiterError> {
        if self.failure_threshold == 0 {
            return Err(LimiterError::Config(
                "failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.recovery_timeout.is_zero() {
            return Err(LimiterError::Config(
                "recovery_timeout must be greater than zero".to_string(),
            ));
        }
        if self.health_check_interval.is_zero() {
            return Err(LimiterError::Config(
                "health_check_interval must be greater than zero".to_string(),
            ));
        }
        #[cfg(not(any(feature = "redis-tokio", feature = "redis-smol")))]
        if self.strategy == SwitchingStrategy::HealthCheck {
            return Err(LimiterError::Config(
                "health check strategy requires the redis-tokio or redis-smol feature".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at_ms: Option<u64>,
    last_recovery_attempt_at_ms: Option<u64>,
    /// A half-open probe has been dispatched and has not resolved yet.
    probe_in_flight: bool,
}

struct CompositeShared {
    breaker: Mutex<BreakerState>,
    counters: CompositeCounters,
    primary_healthy: AtomicBool,
    connected: AtomicBool,
    /// Bumped on connect/disconnect so a stale health loop exits.
    health_generation: AtomicU64,
}

/// Which backend a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Primary { probe: bool },
    Fallback,
}

/// Backend fronting a primary and a fallback store.
///
/// Three interchangeable switching strategies decide which child serves a
/// request; on a failure of the selected child the other one is tried
/// within the same call, so only a double failure surfaces to the caller.
///
/// For the failover to work the primary must be configured with
/// [`FallbackMode::Raise`](crate::backend::FallbackMode::Raise): a primary
/// that absorbs its own failures never looks unhealthy from here.
///
/// A rate-limit rejection is a successful check. Failure means an `Err`
/// from the child, which includes operation timeouts.
pub struct CompositeLimiterBackend {
    primary: Arc<dyn LimiterBackend>,
    fallback: Arc<dyn LimiterBackend>,
    config: CompositeBackendConfig,
    clock: Arc<dyn Clock>,
    shared: Arc<CompositeShared>,
}

impl CompositeLimiterBackend {
    pub fn new(
        primary: Arc<dyn LimiterBackend>,
        fallback: Arc<dyn LimiterBackend>,
        config: CompositeBackendConfig,
    ) -> Result<Self, LimiterError> {
        config.validate()?;

        Ok(Self {
            primary,
            fallback,
            config,
            clock: Arc::new(MonotonicClock::default()),
            shared: Arc::new(CompositeShared {
                breaker: Mutex::new(BreakerState::default()),
                counters: CompositeCounters::default(),
                primary_healthy: AtomicBool::new(true),
                connected: AtomicBool::new(false),
                health_generation: AtomicU64::new(0),
            }),
        })
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> CompositeStats {
        let now = self.clock.now_millis();
        let breaker = self.shared.breaker.lock();
        let counters = &self.shared.counters;

        CompositeStats {
            primary_requests: counters.primary_requests.load(Ordering::Relaxed),
            primary_failures: counters.primary_failures.load(Ordering::Relaxed),
            fallback_requests: counters.fallback_requests.load(Ordering::Relaxed),
            fallback_failures: counters.fallback_failures.load(Ordering::Relaxed),
            switches_to_fallback: counters.switches_to_fallback.load(Ordering::Relaxed),
            switches_to_primary: counters.switches_to_primary.load(Ordering::Relaxed),
            consecutive_failures: breaker.consecutive_failures,
            circuit_state: breaker.state,
            last_failure_ms_ago: breaker
                .last_failure_at_ms
                .map(|t| now.saturating_sub(t)),
            last_recovery_attempt_ms_ago: breaker
                .last_recovery_attempt_at_ms
                .map(|t| now.saturating_sub(t)),
        }
    }

    /// Administratively close the circuit (manual recovery).
    pub fn force_switch_to_primary(&self) {
        if self.config.strategy != SwitchingStrategy::CircuitBreaker {
            return;
        }
        let mut breaker = self.shared.breaker.lock();
        breaker.state = CircuitState::Closed;
        breaker.consecutive_failures = 0;
        breaker.probe_in_flight = false;
        tracing::info!("forced switch to primary backend");
    }

    /// Administratively open the circuit (maintenance window).
    pub fn force_switch_to_fallback(&self) {
        if self.config.strategy != SwitchingStrategy::CircuitBreaker {
            return;
        }
        let mut breaker = self.shared.breaker.lock();
        breaker.state = CircuitState::Open;
        breaker.last_failure_at_ms = Some(self.clock.now_millis());
        breaker.probe_in_flight = false;
        tracing::info!("forced switch to fallback backend");
    }

    fn select_target(&self) -> Attempt {
        match self.config.strategy {
            SwitchingStrategy::FailFast => {
                if self.primary.is_connected() {
                    Attempt::Primary { probe: false }
                } else if self.fallback.is_connected() {
                    Attempt::Fallback
                } else {
                    // Let error handling deal with it.
                    Attempt::Primary { probe: false }
                }
            }
            SwitchingStrategy::CircuitBreaker => self.select_circuit_breaker(),
            SwitchingStrategy::HealthCheck => {
                if self.shared.primary_healthy.load(Ordering::Acquire)
                    && self.primary.is_connected()
                {
                    Attempt::Primary { probe: false }
                } else if self.fallback.is_connected() {
                    Attempt::Fallback
                } else {
                    Attempt::Primary { probe: false }
                }
            }
        }
    }

    fn select_circuit_breaker(&self) -> Attempt {
        let now = self.clock.now_millis();
        let mut breaker = self.shared.breaker.lock();

        match breaker.state {
            CircuitState::Closed => Attempt::Primary { probe: false },
            CircuitState::Open => {
                let recovery_due = breaker
                    .last_failure_at_ms
                    .is_none_or(|t| now.saturating_sub(t) >= self.config.recovery_timeout.as_millis() as u64);

                if recovery_due && !breaker.probe_in_flight {
                    breaker.state = CircuitState::HalfOpen;
                    breaker.probe_in_flight = true;
                    breaker.last_recovery_attempt_at_ms = Some(now);
                    tracing::info!("circuit breaker half-open, probing primary");
                    Attempt::Primary { probe: true }
                } else {
                    Attempt::Fallback
                }
            }
            CircuitState::HalfOpen => {
                if breaker.probe_in_flight {
                    // One probe at a time; everyone else keeps using the fallback.
                    Attempt::Fallback
                } else {
                    breaker.probe_in_flight = true;
                    breaker.last_recovery_attempt_at_ms = Some(now);
                    Attempt::Primary { probe: true }
                }
            }
        }
    } // end method select_circuit_breaker

    fn record_primary_success(&self, probe: bool) {
        if self.config.strategy != SwitchingStrategy::CircuitBreaker {
            return;
        }
        let mut breaker = self.shared.breaker.lock();
        if probe {
            breaker.probe_in_flight = false;
        }

        match breaker.state {
            CircuitState::HalfOpen if probe => {
                breaker.state = CircuitState::Closed;
                breaker.consecutive_failures = 0;
                self.shared
                    .counters
                    .switches_to_primary
                    .fetch_add(1, Ordering::Relaxed);
                tracing::info!("circuit breaker closed, primary recovered");
            }
            CircuitState::Closed => {
                breaker.consecutive_failures = 0;
            }
            _ => {}
        }
    }

    fn record_primary_failure(&self, probe: bool) {
        let now = self.clock.now_millis();
        let mut breaker = self.shared.breaker.lock();
        breaker.last_failure_at_ms = Some(now);

        if self.config.strategy != SwitchingStrategy::CircuitBreaker {
            return;
        }

        breaker.consecutive_failures += 1;

        if probe {
            breaker.probe_in_flight = false;
            breaker.state = CircuitState::Open;
            tracing::warn!("circuit breaker back to open after failed probe");
        } else if breaker.state == CircuitState::Closed
            && breaker.consecutive_failures >= self.config.failure_threshold
        {
            breaker.state = CircuitState::Open;
            self.shared
                .counters
                .switches_to_fallback
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                failures = breaker.consecutive_failures,
                recovery_timeout_s = self.config.recovery_timeout.as_secs(),
                "circuit breaker opened"
            );
        }
    } // end method record_primary_failure

    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    fn spawn_health_loop(&self) {
        use crate::runtime;

        let generation = self
            .shared
            .health_generation
            .fetch_add(1, Ordering::AcqRel)
            + 1;
        let shared = Arc::downgrade(&self.shared);
        let primary = Arc::clone(&self.primary);
        let interval_duration = self.config.health_check_interval;
        let health_key = self.config.health_key.clone();

        runtime::spawn_task(async move {
            let mut interval = runtime::new_interval(interval_duration);
            loop {
                runtime::tick(&mut interval).await;

                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if !shared.connected.load(Ordering::Acquire)
                    || shared.health_generation.load(Ordering::Acquire) != generation
                {
                    break;
                }

                // A rejection still proves the path works; only an error
                // marks the primary unhealthy.
                let healthy = primary.is_connected()
                    && primary.check_limit(&health_key, 1, 1_000).await.is_ok();

                let was_healthy = shared
                    .primary_healthy
                    .swap(healthy, Ordering::AcqRel);
                if was_healthy != healthy {
                    if healthy {
                        shared
                            .counters
                            .switches_to_primary
                            .fetch_add(1, Ordering::Relaxed);
                        tracing::info!("primary backend healthy again");
                    } else {
                        shared
                            .counters
                            .switches_to_fallback
                            .fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("primary backend unhealthy, routing to fallback");
                    }
                }
            }
        });
    } // end method spawn_health_loop
}

#[async_trait]
impl LimiterBackend for CompositeLimiterBackend {
    async fn connect(&self) -> Result<(), LimiterError> {
        if self.shared.connected.load(Ordering::Acquire) {
            return Ok(());
        }

        let primary_ok = match self.primary.connect().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "failed to connect primary backend");
                false
            }
        };
        let fallback_ok = match self.fallback.connect().await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "failed to connect fallback backend");
                false
            }
        };

        if !primary_ok && !fallback_ok {
            return Err(LimiterError::BackendUnavailable(
                "failed to connect both primary and fallback backends".to_string(),
            ));
        }

        if !primary_ok {
            let mut breaker = self.shared.breaker.lock();
            breaker.state = CircuitState::Open;
            breaker.last_failure_at_ms = Some(self.clock.now_millis());
        }
        self.shared
            .primary_healthy
            .store(primary_ok, Ordering::Release);
        self.shared.connected.store(true, Ordering::Release);

        if self.config.strategy == SwitchingStrategy::HealthCheck {
            #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
            self.spawn_health_loop();
        }

        tracing::info!(
            primary = primary_ok,
            fallback = fallback_ok,
            strategy = ?self.config.strategy,
            "composite backend connected"
        );
        Ok(())
    } // end method connect

    async fn disconnect(&self) -> Result<(), LimiterError> {
        self.shared.connected.store(false, Ordering::Release);
        self.shared
            .health_generation
            .fetch_add(1, Ordering::AcqRel);

        if let Err(err) = self.primary.disconnect().await {
            tracing::warn!(error = %err, "error disconnecting primary backend");
        }
        if let Err(err) = self.fallback.disconnect().await {
            tracing::warn!(error = %err, "error disconnecting fallback backend");
        }

        tracing::debug!("composite backend disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
            && (self.primary.is_connected() || self.fallback.is_connected())
    }

    async fn check_limit(
        &self,
        key: &str,
        times: u64,
        window_ms: u64,
    ) -> Result<Decision, LimiterError> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(LimiterError::NotConnected);
        }

        let attempt = self.select_target();
        let (first, first_is_primary, probe) = match attempt {
            Attempt::Primary { probe } => (&self.primary, true, probe),
            Attempt::Fallback => (&self.fallback, false, false),
        };

        self.shared.counters.record_request(first_is_primary);
        let first_error = match first.check_limit(key, times, window_ms).await {
            Ok(decision) => {
                if first_is_primary {
                    self.record_primary_success(probe);
                }
                return Ok(decision);
            }
            Err(err) => {
                self.shared.counters.record_failure(first_is_primary);
                if first_is_primary {
                    self.record_primary_failure(probe);
                }
                err
            }
        };

        let (other, other_is_primary) = if first_is_primary {
            (&self.fallback, false)
        } else {
            (&self.primary, true)
        };
        tracing::warn!(
            failed = if first_is_primary { "primary" } else { "fallback" },
            error = %first_error,
            "backend failed, delegating to the other backend"
        );

        if !other.is_connected() {
            return Err(first_error);
        }

        self.shared.counters.record_request(other_is_primary);
        match other.check_limit(key, times, window_ms).await {
            Ok(decision) => {
                if other_is_primary {
                    self.record_primary_success(false);
                }
                Ok(decision)
            }
            Err(err) => {
                self.shared.counters.record_failure(other_is_primary);
                if other_is_primary {
                    self.record_primary_failure(false);
                }
                tracing::error!(
                    first = %first_error,
                    second = %err,
                    "both backends failed"
                );
                Err(err)
            }
        }
    } // end method check_limit
}
