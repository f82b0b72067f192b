use std::str::FromStr;

use async_trait::async_trait;

use crate::{Decision, LimiterError};

/// What a backend returns when its backing store is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackMode {
    /// Let all traffic pass.
    #[default]
    Allow,
    /// Block all traffic until the store recovers.
    Deny,
    /// Surface a [`LimiterError`] to the caller.
    ///
    /// Composite backends configure their primary this way so failures reach
    /// the routing layer instead of being absorbed.
    Raise,
}

impl FromStr for FallbackMode {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(FallbackMode::Allow),
            "deny" => Ok(FallbackMode::Deny),
            "raise" => Ok(FallbackMode::Raise),
            other => Err(LimiterError::Config(format!(
                "Unknown fallback mode: {other}"
            ))),
        }
    }
}

impl FallbackMode {
    /// Translate a store failure into the configured decision, or surface it.
    pub(crate) fn resolve(
        self,
        error: LimiterError,
        times: u64,
        window_ms: u64,
    ) -> Result<Decision, LimiterError> {
        match self {
            FallbackMode::Allow => {
                tracing::warn!(error = %error, "store unavailable, allowing request");
                Ok(Decision::admitted(0))
            }
            FallbackMode::Deny => {
                tracing::warn!(error = %error, "store unavailable, denying request");
                Ok(Decision::rejected(window_ms, times + 1))
            }
            FallbackMode::Raise => Err(error),
        }
    }
}

/// Interface every rate limiter backend implements.
///
/// `check_limit` performs one atomic fixed-window increment-and-check for
/// `key` and reports the admission decision. It is a suspension point: the
/// remote backend performs I/O here, and callers must be prepared for the
/// call to be cancelled before the store is reached.
#[async_trait]
pub trait LimiterBackend: Send + Sync {
    /// Bring the backend up using the configuration it was built with.
    ///
    /// Idempotent: calling `connect` on a connected backend is a no-op.
    async fn connect(&self) -> Result<(), LimiterError>;

    /// Release the backend's resources. `check_limit` afterwards returns
    /// [`LimiterError::NotConnected`].
    async fn disconnect(&self) -> Result<(), LimiterError>;

    /// Whether the backend is currently usable.
    fn is_connected(&self) -> bool;

    /// Count one event against `key` and decide admission.
    async fn check_limit(
        &self,
        key: &str,
        times: u64,
        window_ms: u64,
    ) -> Result<Decision, LimiterError>;
}

pub(crate) fn validate_limit_args(times: u64, window_ms: u64) -> Result<(), LimiterError> {
    if times == 0 {
        return Err(LimiterError::Config(
            "times must be at least 1".to_string(),
        ));
    }
    if window_ms == 0 {
        return Err(LimiterError::Config(
            "window must be at least 1ms".to_string(),
        ));
    }
    Ok(())
}
