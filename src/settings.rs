use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::backend::{FallbackMode, SwitchingStrategy};
use crate::common::KeyPrefix;

/// Crate-wide defaults, overridable through `LIMITER_`-prefixed environment
/// variables.
///
/// Unset or unparseable variables fall back to the built-in defaults, so a
/// bare environment always yields a usable configuration.
#[derive(Debug, Clone)]
pub struct LimiterSettings {
    pub default_times: u64,
    pub default_window_seconds: u64,
    pub default_prefix: KeyPrefix,
    pub trust_proxy_headers: bool,
    pub fallback_mode: FallbackMode,
    pub redis_url: Option<String>,
    pub command_timeout_ms: u64,
    pub failure_threshold: u32,
    pub recovery_timeout_seconds: u64,
    pub health_check_interval_seconds: u64,
    pub switching_strategy: SwitchingStrategy,
    pub cleanup_interval_seconds: u64,
    pub max_keys: usize,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            default_times: 100,
            default_window_seconds: 60,
            default_prefix: KeyPrefix::default_prefix(),
            trust_proxy_headers: false,
            fallback_mode: FallbackMode::Allow,
            redis_url: None,
            command_timeout_ms: 1000,
            failure_threshold: 5,
            recovery_timeout_seconds: 60,
            health_check_interval_seconds: 30,
            switching_strategy: SwitchingStrategy::CircuitBreaker,
            cleanup_interval_seconds: 300,
            max_keys: 10_000,
        }
    }
}

impl LimiterSettings {
    /// Read settings from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            default_times: env_or("LIMITER_DEFAULT_TIMES", defaults.default_times),
            default_window_seconds: env_or(
                "LIMITER_DEFAULT_WINDOW_SECONDS",
                defaults.default_window_seconds,
            ),
            default_prefix: env::var("LIMITER_DEFAULT_PREFIX")
                .ok()
                .and_then(|v| KeyPrefix::try_from(v).ok())
                .unwrap_or(defaults.default_prefix),
            trust_proxy_headers: env_or(
                "LIMITER_TRUST_PROXY_HEADERS",
                defaults.trust_proxy_headers,
            ),
            fallback_mode: env_or("LIMITER_FALLBACK_MODE", defaults.fallback_mode),
            redis_url: env::var("LIMITER_REDIS_URL")
                .or_else(|_| env::var("REDIS_URL"))
                .ok(),
            command_timeout_ms: env_or("LIMITER_COMMAND_TIMEOUT_MS", defaults.command_timeout_ms),
            failure_threshold: env_or("LIMITER_FAILURE_THRESHOLD", defaults.failure_threshold),
            recovery_timeout_seconds: env_or(
                "LIMITER_RECOVERY_TIMEOUT_SECONDS",
                defaults.recovery_timeout_seconds,
            ),
            health_check_interval_seconds: env_or(
                "LIMITER_HEALTH_CHECK_INTERVAL_SECONDS",
                defaults.health_check_interval_seconds,
            ),
            switching_strategy: env_or(
                "LIMITER_SWITCHING_STRATEGY",
                defaults.switching_strategy,
            ),
            cleanup_interval_seconds: env_or(
                "LIMITER_CLEANUP_INTERVAL_SECONDS",
                defaults.cleanup_interval_seconds,
            ),
            max_keys: env_or("LIMITER_MAX_KEYS", defaults.max_keys),
        }
    }

    /// Settings read once from the environment and cached for the process.
    pub fn global() -> &'static LimiterSettings {
        static SETTINGS: OnceLock<LimiterSettings> = OnceLock::new();
        SETTINGS.get_or_init(LimiterSettings::from_env)
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
