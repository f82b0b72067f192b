use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::RwLock;

use crate::backend::LimiterBackend;
use crate::LimiterError;

const DRAIN_POLL: Duration = Duration::from_millis(10);
const DRAIN_LIMIT: Duration = Duration::from_secs(5);

fn registry() -> &'static RwLock<Option<Arc<dyn LimiterBackend>>> {
    static CONFIGURED: OnceLock<RwLock<Option<Arc<dyn LimiterBackend>>>> = OnceLock::new();
    CONFIGURED.get_or_init(|| RwLock::new(None))
}

/// Install `backend` as the process-wide limiter backend.
///
/// The backend must already be connected. Reconfiguration is permitted: the
/// replaced backend is disconnected once its remaining holders (in-flight
/// checks, lingering [`Evaluator`](crate::Evaluator)s) have dropped it, or
/// after a bounded drain window.
///
/// The registry is a convenience shim; passing the backend to
/// [`Evaluator::new`](crate::Evaluator::new) directly is the primary path.
pub async fn configure_limiter(backend: Arc<dyn LimiterBackend>) -> Result<(), LimiterError> {
    if !backend.is_connected() {
        return Err(LimiterError::NotConnected);
    }

    let replaced = registry().write().replace(backend);
    if let Some(old) = replaced {
        drain(&old).await;
        if let Err(err) = old.disconnect().await {
            tracing::warn!(error = %err, "error disconnecting replaced backend");
        }
    }

    tracing::debug!("limiter backend configured");
    Ok(())
}

/// The currently configured process-wide backend, if any.
pub fn configured_backend() -> Option<Arc<dyn LimiterBackend>> {
    registry().read().clone()
}

async fn drain(backend: &Arc<dyn LimiterBackend>) {
    let mut waited = Duration::ZERO;
    while Arc::strong_count(backend) > 1 && waited < DRAIN_LIMIT {
        drain_sleep(DRAIN_POLL).await;
        waited += DRAIN_POLL;
    }

    if Arc::strong_count(backend) > 1 {
        tracing::warn!("replaced backend still referenced after drain window, disconnecting anyway");
    }
}

#[cfg(all(feature = "redis-tokio", not(feature = "redis-smol")))]
async fn drain_sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(all(feature = "redis-smol", not(feature = "redis-tokio")))]
async fn drain_sleep(duration: Duration) {
    smol::Timer::after(duration).await;
}

#[cfg(not(any(feature = "redis-tokio", feature = "redis-smol")))]
async fn drain_sleep(duration: Duration) {
    std::thread::sleep(duration);
}
