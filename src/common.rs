use std::ops::Deref;

use crate::LimiterError;

/// The outcome of a single `check_limit` call.
///
/// `retry_after_ms == 0` means the event was admitted; a positive value is
/// how long the caller should wait before retrying. `current_count` is the
/// counter value after this attempt and is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub retry_after_ms: u64,
    pub current_count: u64,
}

impl Decision {
    pub fn admitted(current_count: u64) -> Self {
        Self {
            retry_after_ms: 0,
            current_count,
        }
    }

    pub fn rejected(retry_after_ms: u64, current_count: u64) -> Self {
        Self {
            retry_after_ms: retry_after_ms.max(1),
            current_count,
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.retry_after_ms == 0
    }
}

/// A validated newtype for counter key prefixes.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    /// The prefix used when none is configured.
    pub fn default_prefix() -> Self {
        Self("fastex".to_string())
    }
}

impl Default for KeyPrefix {
    fn default() -> Self {
        Self::default_prefix()
    }
}

impl Deref for KeyPrefix {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for KeyPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for KeyPrefix {
    type Error = LimiterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(LimiterError::Config(
                "Key prefix must not be empty".to_string(),
            ))
        } else if value.contains(":") {
            Err(LimiterError::Config(
                "Key prefix must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<&str> for KeyPrefix {
    type Error = LimiterError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

/// Assemble the counter key for one policy application.
///
/// The `route_index` keeps counters independent when several policies guard
/// the same route.
pub(crate) fn counter_key(prefix: &KeyPrefix, identifier: &str, route_index: usize) -> String {
    format!("{prefix}:{identifier}:{route_index}")
}
