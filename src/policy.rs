use crate::common::KeyPrefix;
use crate::host::{IdentifierFn, OnRejectFn};
use crate::settings::LimiterSettings;
use crate::LimiterError;

/// Immutable description of one rate limiting rule.
///
/// A policy allows `times` events per fixed window of `window_ms`
/// milliseconds. Construction goes through [`LimitPolicy::builder`], which
/// sums the window parts and validates the result before any counter is
/// touched.
///
/// # Examples
///
/// ```
/// use phragma::LimitPolicy;
///
/// // 10 requests per 30 seconds
/// let policy = LimitPolicy::builder().times(10).seconds(30).build().unwrap();
/// assert_eq!(policy.times(), 10);
/// assert_eq!(policy.window_ms(), 30_000);
/// ```
#[derive(Clone)]
pub struct LimitPolicy {
    times: u64,
    window_ms: u64,
    prefix: Option<KeyPrefix>,
    route_index: usize,
    identifier: Option<IdentifierFn>,
    on_reject: Option<OnRejectFn>,
}

impl std::fmt::Debug for LimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitPolicy")
            .field("times", &self.times)
            .field("window_ms", &self.window_ms)
            .field("prefix", &self.prefix)
            .field("route_index", &self.route_index)
            .field("identifier", &self.identifier.as_ref().map(|_| ".."))
            .field("on_reject", &self.on_reject.as_ref().map(|_| ".."))
            .finish()
    }
}

impl LimitPolicy {
    pub fn builder() -> LimitPolicyBuilder {
        LimitPolicyBuilder::default()
    }

    /// Maximum events per window.
    pub fn times(&self) -> u64 {
        self.times
    }

    /// Window length in milliseconds.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Key prefix override, when the policy does not use the evaluator's.
    pub fn prefix(&self) -> Option<&KeyPrefix> {
        self.prefix.as_ref()
    }

    /// Position of this policy among the policies guarding the same route.
    pub fn route_index(&self) -> usize {
        self.route_index
    }

    pub(crate) fn identifier(&self) -> Option<&IdentifierFn> {
        self.identifier.as_ref()
    }

    pub(crate) fn on_reject(&self) -> Option<&OnRejectFn> {
        self.on_reject.as_ref()
    }
}

/// Builder for [`LimitPolicy`].
///
/// Window parts accumulate: `.seconds(1).milliseconds(500)` yields a 1500 ms
/// window. With no parts given the window defaults to
/// `LIMITER_DEFAULT_WINDOW_SECONDS`, and `times` to `LIMITER_DEFAULT_TIMES`.
#[derive(Default)]
pub struct LimitPolicyBuilder {
    times: Option<u64>,
    milliseconds: u64,
    seconds: u64,
    minutes: u64,
    hours: u64,
    prefix: Option<KeyPrefix>,
    route_index: usize,
    identifier: Option<IdentifierFn>,
    on_reject: Option<OnRejectFn>,
}

impl LimitPolicyBuilder {
    pub fn times(mut self, times: u64) -> Self {
        self.times = Some(times);
        self
    }

    pub fn milliseconds(mut self, ms: u64) -> Self {
        self.milliseconds = ms;
        self
    }

    pub fn seconds(mut self, seconds: u64) -> Self {
        self.seconds = seconds;
        self
    }

    pub fn minutes(mut self, minutes: u64) -> Self {
        self.minutes = minutes;
        self
    }

    pub fn hours(mut self, hours: u64) -> Self {
        self.hours = hours;
        self
    }

    /// Use a specific key prefix instead of the evaluator's.
    pub fn prefix(mut self, prefix: KeyPrefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// Distinguish this policy from others guarding the same route.
    ///
    /// [`Evaluator::evaluate_all`](crate::Evaluator::evaluate_all) assigns
    /// indexes positionally; this is for hosts registering policies one at a
    /// time.
    pub fn route_index(mut self, index: usize) -> Self {
        self.route_index = index;
        self
    }

    /// Custom identifier, overriding the evaluator's default.
    pub fn identifier(mut self, identifier: IdentifierFn) -> Self {
        self.identifier = Some(identifier);
        self
    }

    /// Custom rejection handler, overriding the evaluator's default.
    pub fn on_reject(mut self, on_reject: OnRejectFn) -> Self {
        self.on_reject = Some(on_reject);
        self
    }

    pub fn build(self) -> Result<LimitPolicy, LimiterError> {
        let settings = LimiterSettings::global();

        let times = self.times.unwrap_or(settings.default_times);
        if times == 0 {
            return Err(LimiterError::Config(
                "Rate limiter must allow at least 1 event per window".to_string(),
            ));
        }

        let mut window_ms = self
            .milliseconds
            .saturating_add(self.seconds.saturating_mul(1_000))
            .saturating_add(self.minutes.saturating_mul(60_000))
            .saturating_add(self.hours.saturating_mul(3_600_000));
        if window_ms == 0 {
            window_ms = settings.default_window_seconds.saturating_mul(1_000);
        }
        if window_ms == 0 {
            return Err(LimiterError::Config(
                "Rate limiter window must be greater than 0ms".to_string(),
            ));
        }

        Ok(LimitPolicy {
            times,
            window_ms,
            prefix: self.prefix,
            route_index: self.route_index,
            identifier: self.identifier,
            on_reject: self.on_reject,
        })
    }
}
