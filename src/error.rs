/// Error type for this crate.
#[derive(Debug, thiserror::Error)]
pub enum LimiterError {
    /// Invalid policy or backend configuration.
    ///
    /// Raised at construction time, never while a counter is being checked.
    #[error("configuration error: {0}")]
    Config(String),

    /// `check_limit` was called before `connect` or after `disconnect`.
    #[error("backend is not connected")]
    NotConnected,

    /// The backing store is unreachable, timed out, or failed mid-operation.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The atomic counter procedure returned an out-of-contract value.
    #[error("script error: {0}")]
    Script(String),
}

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
impl From<redis::RedisError> for LimiterError {
    fn from(err: redis::RedisError) -> Self {
        LimiterError::BackendUnavailable(err.to_string())
    }
}
