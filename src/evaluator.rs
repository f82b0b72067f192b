use std::sync::Arc;

use crate::backend::LimiterBackend;
use crate::common::{KeyPrefix, counter_key};
use crate::host::{IdentifierFn, LimiterRequest, LimiterResponse, OnRejectFn};
use crate::policy::LimitPolicy;
use crate::settings::LimiterSettings;
use crate::{Decision, LimiterError};

/// Build the default `"{client-ip}:{path}"` identifier.
///
/// With `trust_proxy_headers` the first `X-Forwarded-For` entry takes
/// precedence over the transport address. An unknown address becomes
/// `"unknown"`.
pub fn default_identifier(trust_proxy_headers: bool) -> IdentifierFn {
    Arc::new(move |request: &dyn LimiterRequest| {
        let forwarded = if trust_proxy_headers {
            request
                .header("X-Forwarded-For")
                .and_then(|value| value.split(',').next())
                .map(|ip| ip.trim().to_string())
                .filter(|ip| !ip.is_empty())
        } else {
            None
        };

        let ip = forwarded
            .or_else(|| request.client_addr().map(|addr| addr.to_string()))
            .unwrap_or_else(|| "unknown".to_string());

        format!("{ip}:{}", request.path())
    })
}

/// Default rejection handler: HTTP 429 with a `Retry-After` header in whole
/// seconds, rounded up.
pub fn http_default_on_reject() -> OnRejectFn {
    Arc::new(
        |_request: &dyn LimiterRequest, response: &mut dyn LimiterResponse, decision: &Decision| {
            response.set_status(429);
            response.set_header(
                "Retry-After",
                &decision.retry_after_ms.div_ceil(1000).to_string(),
            );
            response.set_body("Too Many Requests");
        },
    )
}

/// Glue between the host middleware and a backend.
///
/// The host calls [`evaluate`](Evaluator::evaluate) (or
/// [`evaluate_all`](Evaluator::evaluate_all) when several policies guard one
/// route) before the user handler runs, and skips the handler unless the
/// returned decision is admitted.
///
/// # Examples
///
/// ```
/// use std::net::IpAddr;
/// use std::sync::Arc;
///
/// use phragma::backend::{InMemoryLimiterBackend, LimiterBackend, MemoryBackendConfig};
/// use phragma::{Evaluator, LimitPolicy, LimiterRequest, LimiterResponse};
///
/// struct Req;
///
/// impl LimiterRequest for Req {
///     fn client_addr(&self) -> Option<IpAddr> {
///         "10.0.0.1".parse().ok()
///     }
///     fn path(&self) -> &str {
///         "/search"
///     }
/// }
///
/// #[derive(Default)]
/// struct Resp {
///     status: u16,
///     body: String,
/// }
///
/// impl LimiterResponse for Resp {
///     fn set_status(&mut self, status: u16) {
///         self.status = status;
///     }
///     fn set_header(&mut self, _name: &str, _value: &str) {}
///     fn set_body(&mut self, body: &str) {
///         self.body = body.to_string();
///     }
/// }
///
/// # async fn demo() -> Result<(), phragma::LimiterError> {
/// let backend = Arc::new(InMemoryLimiterBackend::new(MemoryBackendConfig::default())?);
/// backend.connect().await?;
///
/// let evaluator = Evaluator::new(backend);
/// let policy = LimitPolicy::builder().times(100).minutes(1).build()?;
///
/// let mut response = Resp::default();
/// let decision = evaluator.evaluate(&policy, &Req, &mut response).await?;
/// assert!(decision.is_admitted());
/// # Ok(())
/// # }
/// ```
pub struct Evaluator {
    backend: Arc<dyn LimiterBackend>,
    prefix: KeyPrefix,
    identifier: IdentifierFn,
    on_reject: OnRejectFn,
}

impl Evaluator {
    pub fn new(backend: Arc<dyn LimiterBackend>) -> Self {
        let settings = LimiterSettings::global();
        Self {
            backend,
            prefix: settings.default_prefix.clone(),
            identifier: default_identifier(settings.trust_proxy_headers),
            on_reject: http_default_on_reject(),
        }
    }

    /// Capture the backend installed with
    /// [`configure_limiter`](crate::configure_limiter).
    pub fn from_global() -> Result<Self, LimiterError> {
        crate::state::configured_backend()
            .map(Self::new)
            .ok_or_else(|| {
                LimiterError::Config("no limiter backend has been configured".to_string())
            })
    }

    pub fn prefix(mut self, prefix: KeyPrefix) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn identifier(mut self, identifier: IdentifierFn) -> Self {
        self.identifier = identifier;
        self
    }

    pub fn on_reject(mut self, on_reject: OnRejectFn) -> Self {
        self.on_reject = on_reject;
        self
    }

    pub fn backend(&self) -> &Arc<dyn LimiterBackend> {
        &self.backend
    }

    /// Apply one policy to a request.
    ///
    /// On rejection the policy's (or the evaluator's default) on-reject
    /// handler has already run when this returns; on a backend error the
    /// response is set to HTTP 503 and the error is surfaced so the host
    /// skips the handler either way.
    pub async fn evaluate(
        &self,
        policy: &LimitPolicy,
        request: &dyn LimiterRequest,
        response: &mut dyn LimiterResponse,
    ) -> Result<Decision, LimiterError> {
        self.evaluate_at(policy, policy.route_index(), request, response)
            .await
    }

    /// Apply `policies` in order, stopping at the first rejection.
    ///
    /// `route_index` is assigned positionally, so every policy counts
    /// against its own key. Policies after a rejecting one are not
    /// evaluated and their counters stay untouched.
    pub async fn evaluate_all(
        &self,
        policies: &[LimitPolicy],
        request: &dyn LimiterRequest,
        response: &mut dyn LimiterResponse,
    ) -> Result<Decision, LimiterError> {
        let mut last = Decision::admitted(0);
        for (index, policy) in policies.iter().enumerate() {
            let decision = self.evaluate_at(policy, index, request, response).await?;
            if !decision.is_admitted() {
                return Ok(decision);
            }
            last = decision;
        }
        Ok(last)
    }

    async fn evaluate_at(
        &self,
        policy: &LimitPolicy,
        route_index: usize,
        request: &dyn LimiterRequest,
        response: &mut dyn LimiterResponse,
    ) -> Result<Decision, LimiterError> {
        let identifier = policy.identifier().unwrap_or(&self.identifier);
        let id = identifier(request);
        let prefix = policy.prefix().unwrap_or(&self.prefix);
        let key = counter_key(prefix, &id, route_index);

        let decision = match self
            .backend
            .check_limit(&key, policy.times(), policy.window_ms())
            .await
        {
            Ok(decision) => decision,
            Err(err) => {
                tracing::error!(key = %key, error = %err, "rate limit check failed");
                response.set_status(503);
                response.set_body("Rate limiter unavailable");
                return Err(err);
            }
        };

        if !decision.is_admitted() {
            tracing::warn!(
                key = %key,
                retry_after_ms = decision.retry_after_ms,
                "rate limit exceeded"
            );
            let on_reject = policy.on_reject().unwrap_or(&self.on_reject);
            on_reject(request, response, &decision);
        }

        Ok(decision)
    } // end method evaluate_at
}
