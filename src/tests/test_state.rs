use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::backend::LimiterBackend;
use crate::evaluator::Evaluator;
use crate::state::{configure_limiter, configured_backend};
use crate::tests::mock::MockBackend;
use crate::tests::runtime::block_on;
use crate::LimiterError;

#[test]
fn configure_rejects_a_disconnected_backend() {
    block_on(async {
        let backend = MockBackend::new();

        assert!(matches!(
            configure_limiter(backend as Arc<dyn LimiterBackend>).await,
            Err(LimiterError::NotConnected)
        ));
    });
}

// The registry is process-wide, so the whole lifecycle lives in one test to
// keep concurrently running tests from observing each other's backends.
#[test]
fn configure_limiter_lifecycle() {
    block_on(async {
        assert!(configured_backend().is_none());
        assert!(Evaluator::from_global().is_err());

        let first = MockBackend::new();
        let first_probe = first.connected_probe();
        first.connect().await.unwrap();
        configure_limiter(Arc::clone(&first) as Arc<dyn LimiterBackend>)
            .await
            .unwrap();

        let captured = configured_backend().expect("backend should be configured");
        assert!(captured.is_connected());
        assert!(Evaluator::from_global().is_ok());

        // Reconfiguration disconnects the replaced backend once drained.
        let second = MockBackend::new();
        second.connect().await.unwrap();
        drop(first);
        drop(captured);
        configure_limiter(second as Arc<dyn LimiterBackend>)
            .await
            .unwrap();

        assert!(!first_probe.load(Ordering::SeqCst));
        assert!(configured_backend().expect("second backend").is_connected());
    });
}
