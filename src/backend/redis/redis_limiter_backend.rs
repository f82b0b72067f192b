use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;

use crate::backend::limiter_backend::validate_limit_args;
use crate::backend::{FallbackMode, LimiterBackend};
use crate::runtime;
use crate::settings::LimiterSettings;
use crate::{Decision, LimiterError};

use super::scripts::{CounterScript, FixedWindowScript};

/// Configuration for [`RedisLimiterBackend`].
#[derive(Clone)]
pub struct RedisBackendConfig {
    pub url: String,
    pub fallback_mode: FallbackMode,
    /// Upper bound on a single store round trip; a timeout counts as a
    /// store failure.
    pub command_timeout: Duration,
    pub script: Arc<dyn CounterScript>,
}

impl std::fmt::Debug for RedisBackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackendConfig")
            .field("url", &self.url)
            .field("fallback_mode", &self.fallback_mode)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisBackendConfig {
    pub fn new(url: impl Into<String>) -> Self {
        let settings = LimiterSettings::global();
        Self {
            url: url.into(),
            fallback_mode: settings.fallback_mode,
            command_timeout: Duration::from_millis(settings.command_timeout_ms),
            script: Arc::new(FixedWindowScript),
        }
    }

    /// Build from `LIMITER_REDIS_URL` / `REDIS_URL`.
    pub fn from_env() -> Result<Self, LimiterError> {
        let settings = LimiterSettings::global();
        let url = settings
            .redis_url
            .clone()
            .ok_or_else(|| LimiterError::Config("REDIS_URL is not set".to_string()))?;
        Ok(Self::new(url))
    }

    pub fn fallback_mode(mut self, mode: FallbackMode) -> Self {
        self.fallback_mode = mode;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn script<S: CounterScript + 'static>(mut self, script: S) -> Self {
        self.script = Arc::new(script);
        self
    }

    fn matches(&self, other: &Self) -> bool {
        self.url == other.url
            && self.fallback_mode == other.fallback_mode
            && self.command_timeout == other.command_timeout
            && self.script.source() == other.script.source()
    }
}

struct RedisInner {
    manager: ConnectionManager,
    lua: Arc<redis::Script>,
}

/// Rate limiter backend executing the counter script on a shared Redis.
///
/// The backend owns its connection for the duration of the registration:
/// `connect` establishes it, `disconnect` releases it, and a `check_limit`
/// in between runs one atomic script invocation bounded by
/// `command_timeout`. Store failures are translated per the configured
/// [`FallbackMode`].
pub struct RedisLimiterBackend {
    config: RwLock<RedisBackendConfig>,
    inner: RwLock<Option<RedisInner>>,
}

impl RedisLimiterBackend {
    pub fn new(config: RedisBackendConfig) -> Self {
        Self {
            config: RwLock::new(config),
            inner: RwLock::new(None),
        }
    }

    /// Reinitialize with `config` unless it matches the current one.
    pub async fn reconnect(&self, config: RedisBackendConfig) -> Result<(), LimiterError> {
        if self.is_connected() && self.config.read().matches(&config) {
            return Ok(());
        }

        *self.inner.write() = None;
        *self.config.write() = config;
        self.connect().await
    }

    async fn run_script(
        &self,
        manager: &mut ConnectionManager,
        lua: &redis::Script,
        script: &dyn CounterScript,
        key: &str,
        times: u64,
        window_ms: u64,
        command_timeout: Duration,
    ) -> Result<Decision, LimiterError> {
        let mut invocation = lua.prepare_invoke();
        for k in script.keys(key) {
            invocation.key(k);
        }
        for a in script.argv(times, window_ms) {
            invocation.arg(a);
        }

        let raw = runtime::timeout(command_timeout, invocation.invoke_async::<redis::Value>(manager))
            .await
            .map_err(|_| {
                LimiterError::BackendUnavailable(format!(
                    "store command timed out after {}ms",
                    command_timeout.as_millis()
                ))
            })??;

        script.parse(&raw)
    } // end method run_script
}

#[async_trait]
impl LimiterBackend for RedisLimiterBackend {
    async fn connect(&self) -> Result<(), LimiterError> {
        if self.is_connected() {
            return Ok(());
        }

        let config = self.config.read().clone();
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| LimiterError::Config(format!("invalid redis url: {e}")))?;
        let manager = client.get_connection_manager().await?;
        let lua = Arc::new(redis::Script::new(config.script.source()));

        let mut guard = self.inner.write();
        if guard.is_none() {
            *guard = Some(RedisInner { manager, lua });
            tracing::debug!("redis backend connected");
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), LimiterError> {
        if self.inner.write().take().is_some() {
            tracing::debug!("redis backend disconnected");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.read().is_some()
    }

    async fn check_limit(
        &self,
        key: &str,
        times: u64,
        window_ms: u64,
    ) -> Result<Decision, LimiterError> {
        validate_limit_args(times, window_ms)?;

        let (mut manager, lua, script, fallback_mode, command_timeout) = {
            let guard = self.inner.read();
            let Some(inner) = guard.as_ref() else {
                return Err(LimiterError::NotConnected);
            };
            let config = self.config.read();
            (
                inner.manager.clone(),
                Arc::clone(&inner.lua),
                Arc::clone(&config.script),
                config.fallback_mode,
                config.command_timeout,
            )
        };

        match self
            .run_script(
                &mut manager,
                &lua,
                script.as_ref(),
                key,
                times,
                window_ms,
                command_timeout,
            )
            .await
        {
            Ok(decision) => Ok(decision),
            Err(err @ LimiterError::Script(_)) => {
                tracing::error!(key = %key, error = %err, "counter script returned an out-of-contract value");
                fallback_mode.resolve(err, times, window_ms)
            }
            Err(err) => fallback_mode.resolve(err, times, window_ms),
        }
    } // end method check_limit
}
