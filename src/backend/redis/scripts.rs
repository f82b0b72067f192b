use crate::{Decision, LimiterError};

const FIXED_WINDOW_LUA: &str = r#"
    local key = KEYS[1]
    local times = tonumber(ARGV[1])
    local window_ms = tonumber(ARGV[2])

    local current = redis.call("INCR", key)

    local ttl
    if current == 1 then
        redis.call("PEXPIRE", key, window_ms)
        ttl = window_ms
    else
        ttl = redis.call("PTTL", key)
        if ttl < 0 then
            redis.call("PEXPIRE", key, window_ms)
            ttl = window_ms
        end
    end

    if current > times then
        return {ttl, current}
    end

    return {0, current}
"#;

/// Capability describing how to perform the fixed-window increment-and-check
/// atomically on the store.
///
/// A script is a value, not a subclass: the default instance is
/// [`FixedWindowScript`], and user scripts are other values of the same
/// trait. The default `keys`/`argv`/`parse` cover the common single-key,
/// `{retry_after_ms, current}` contract; override them when a script needs
/// more.
pub trait CounterScript: Send + Sync {
    /// Lua source executed on the store.
    fn source(&self) -> &str;

    /// Keys the script touches.
    fn keys(&self, counter_key: &str) -> Vec<String> {
        vec![counter_key.to_string()]
    }

    /// Arguments passed after the keys.
    fn argv(&self, times: u64, window_ms: u64) -> Vec<String> {
        vec![times.to_string(), window_ms.to_string()]
    }

    /// Turn the raw script reply into a [`Decision`].
    fn parse(&self, raw: &redis::Value) -> Result<Decision, LimiterError> {
        parse_counter_reply(raw)
    }
}

/// The default fixed-window script.
///
/// The only write is an unconditional `INCR`; rejection is derived from the
/// result afterward. The first hit sets the window expiry, and a missing
/// expiry (`PTTL < 0`, possible if a previous `PEXPIRE` was lost) is
/// repaired in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedWindowScript;

impl CounterScript for FixedWindowScript {
    fn source(&self) -> &str {
        FIXED_WINDOW_LUA
    }
}

/// A user-supplied Lua script following the default conventions.
///
/// The source must expect `KEYS[1] = counter key`,
/// `ARGV = {times, window_ms}` and return `{retry_after_ms, current}`.
#[derive(Debug, Clone)]
pub struct StaticScript {
    source: String,
}

impl StaticScript {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

impl CounterScript for StaticScript {
    fn source(&self) -> &str {
        &self.source
    }
}

/// Parse the `{retry_after_ms, current}` pair every default script returns.
pub(crate) fn parse_counter_reply(raw: &redis::Value) -> Result<Decision, LimiterError> {
    let items = match raw {
        redis::Value::Array(items) if items.len() == 2 => items,
        other => {
            return Err(LimiterError::Script(format!(
                "expected a two-element reply, got {other:?}"
            )));
        }
    };

    let retry_after_ms = reply_int(&items[0])?;
    let current = reply_int(&items[1])?;

    if retry_after_ms < 0 || current < 0 {
        return Err(LimiterError::Script(format!(
            "negative value in reply: {{{retry_after_ms}, {current}}}"
        )));
    }

    if retry_after_ms > 0 {
        Ok(Decision::rejected(retry_after_ms as u64, current as u64))
    } else {
        Ok(Decision::admitted(current as u64))
    }
}

fn reply_int(value: &redis::Value) -> Result<i64, LimiterError> {
    match value {
        redis::Value::Int(n) => Ok(*n),
        other => Err(LimiterError::Script(format!(
            "expected an integer reply element, got {other:?}"
        ))),
    }
}
