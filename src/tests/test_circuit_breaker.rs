use std::sync::Arc;
use std::time::Duration;

use crate::backend::{
    CircuitState, CompositeBackendConfig, CompositeLimiterBackend, LimiterBackend,
    SwitchingStrategy,
};
use crate::clock::ManualClock;
use crate::tests::mock::MockBackend;
use crate::tests::runtime::block_on;
use crate::LimiterError;

fn breaker_config(failure_threshold: u32, recovery_timeout: Duration) -> CompositeBackendConfig {
    CompositeBackendConfig {
        strategy: SwitchingStrategy::CircuitBreaker,
        failure_threshold,
        recovery_timeout,
        health_check_interval: Duration::from_secs(30),
        health_key: "fastex:__health__".to_string(),
    }
}

fn composite(
    failure_threshold: u32,
    recovery_timeout: Duration,
) -> (
    CompositeLimiterBackend,
    Arc<MockBackend>,
    Arc<MockBackend>,
    ManualClock,
) {
    let primary = MockBackend::new();
    let fallback = MockBackend::new();
    let clock = ManualClock::new(0);

    let composite = CompositeLimiterBackend::new(
        Arc::clone(&primary) as Arc<dyn LimiterBackend>,
        Arc::clone(&fallback) as Arc<dyn LimiterBackend>,
        breaker_config(failure_threshold, recovery_timeout),
    )
    .unwrap()
    .with_clock(clock.clone());

    (composite, primary, fallback, clock)
}

#[test]
fn circuit_opens_after_threshold_and_recovers() {
    let (composite, primary, fallback, clock) = composite(3, Duration::from_secs(60));

    block_on(async {
        composite.connect().await.unwrap();
        primary.set_failing(true);

        // Three consecutive primary failures; each call is still served by
        // the fallback.
        for _ in 0..3 {
            assert!(composite.check_limit("k", 5, 1_000).await.unwrap().is_admitted());
        }

        let stats = composite.stats();
        assert_eq!(stats.circuit_state, CircuitState::Open);
        assert_eq!(stats.switches_to_fallback, 1);
        assert_eq!(stats.consecutive_failures, 3);
        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 3);

        // While open, traffic goes straight to the fallback.
        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(primary.calls(), 3);
        assert_eq!(fallback.calls(), 4);

        // After the recovery timeout a single probe closes the circuit.
        primary.set_failing(false);
        clock.advance(61_000);
        assert!(composite.check_limit("k", 5, 1_000).await.unwrap().is_admitted());

        let stats = composite.stats();
        assert_eq!(stats.circuit_state, CircuitState::Closed);
        assert_eq!(stats.switches_to_primary, 1);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(primary.calls(), 4);
        assert_eq!(fallback.calls(), 4);
    });
}

#[test]
fn no_traffic_reaches_primary_before_recovery_timeout() {
    let (composite, primary, _fallback, clock) = composite(2, Duration::from_secs(60));

    block_on(async {
        composite.connect().await.unwrap();
        primary.set_failing(true);

        composite.check_limit("k", 5, 1_000).await.unwrap();
        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(composite.stats().circuit_state, CircuitState::Open);
        let calls_at_open = primary.calls();

        clock.advance(59_999);
        for _ in 0..5 {
            composite.check_limit("k", 5, 1_000).await.unwrap();
        }
        assert_eq!(primary.calls(), calls_at_open);
    });
}

#[test]
fn failed_probe_reopens_the_circuit() {
    let (composite, primary, _fallback, clock) = composite(1, Duration::from_secs(60));

    block_on(async {
        composite.connect().await.unwrap();
        primary.set_failing(true);

        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(composite.stats().circuit_state, CircuitState::Open);

        // The probe fails; the caller is still served and the open period
        // restarts from the failed attempt.
        clock.advance(61_000);
        assert!(composite.check_limit("k", 5, 1_000).await.unwrap().is_admitted());
        assert_eq!(composite.stats().circuit_state, CircuitState::Open);
        let calls_after_probe = primary.calls();

        clock.advance(59_000);
        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(primary.calls(), calls_after_probe);

        clock.advance(2_000);
        primary.set_failing(false);
        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(composite.stats().circuit_state, CircuitState::Closed);
    });
}

#[test]
fn rejections_are_not_failures() {
    let (composite, primary, fallback, _clock) = composite(2, Duration::from_secs(60));

    block_on(async {
        composite.connect().await.unwrap();
        primary.set_rejecting(true);

        for _ in 0..5 {
            let decision = composite.check_limit("k", 1, 1_000).await.unwrap();
            assert!(!decision.is_admitted());
        }

        let stats = composite.stats();
        assert_eq!(stats.circuit_state, CircuitState::Closed);
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(fallback.calls(), 0);
    });
}

#[test]
fn success_resets_consecutive_failures() {
    let (composite, primary, _fallback, _clock) = composite(3, Duration::from_secs(60));

    block_on(async {
        composite.connect().await.unwrap();

        primary.set_failing(true);
        composite.check_limit("k", 5, 1_000).await.unwrap();
        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(composite.stats().consecutive_failures, 2);

        primary.set_failing(false);
        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(composite.stats().consecutive_failures, 0);
        assert_eq!(composite.stats().circuit_state, CircuitState::Closed);
    });
}

#[test]
fn force_switches_set_the_circuit_state() {
    let (composite, primary, fallback, _clock) = composite(5, Duration::from_secs(60));

    block_on(async {
        composite.connect().await.unwrap();

        composite.force_switch_to_fallback();
        assert_eq!(composite.stats().circuit_state, CircuitState::Open);
        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(primary.calls(), 0);
        assert_eq!(fallback.calls(), 1);

        composite.force_switch_to_primary();
        assert_eq!(composite.stats().circuit_state, CircuitState::Closed);
        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(primary.calls(), 1);
    });
}

#[test]
fn primary_connect_failure_opens_the_circuit() {
    let primary = MockBackend::failing_to_connect();
    let fallback = MockBackend::new();

    let composite = CompositeLimiterBackend::new(
        Arc::clone(&primary) as Arc<dyn LimiterBackend>,
        Arc::clone(&fallback) as Arc<dyn LimiterBackend>,
        breaker_config(5, Duration::from_secs(60)),
    )
    .unwrap();

    block_on(async {
        composite.connect().await.unwrap();
        assert!(composite.is_connected());
        assert_eq!(composite.stats().circuit_state, CircuitState::Open);

        composite.check_limit("k", 5, 1_000).await.unwrap();
        assert_eq!(primary.calls(), 0);
        assert_eq!(fallback.calls(), 1);
    });
}

#[test]
fn both_backends_failing_surfaces_the_error() {
    let (composite, primary, fallback, _clock) = composite(5, Duration::from_secs(60));

    block_on(async {
        composite.connect().await.unwrap();
        primary.set_failing(true);
        fallback.set_failing(true);

        assert!(matches!(
            composite.check_limit("k", 5, 1_000).await,
            Err(LimiterError::BackendUnavailable(_))
        ));

        let stats = composite.stats();
        assert_eq!(stats.primary_failures, 1);
        assert_eq!(stats.fallback_failures, 1);
    });
}

#[test]
fn check_limit_requires_connection() {
    let (composite, _primary, _fallback, _clock) = composite(5, Duration::from_secs(60));

    block_on(async {
        assert!(matches!(
            composite.check_limit("k", 5, 1_000).await,
            Err(LimiterError::NotConnected)
        ));
    });
}

#[test]
fn connect_requires_at_least_one_backend() {
    let primary = MockBackend::failing_to_connect();
    let fallback = MockBackend::failing_to_connect();

    let composite = CompositeLimiterBackend::new(
        Arc::clone(&primary) as Arc<dyn LimiterBackend>,
        Arc::clone(&fallback) as Arc<dyn LimiterBackend>,
        breaker_config(5, Duration::from_secs(60)),
    )
    .unwrap();

    block_on(async {
        assert!(matches!(
            composite.connect().await,
            Err(LimiterError::BackendUnavailable(_))
        ));
    });
}
