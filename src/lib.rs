//! Phragma is a fixed-window rate limiting core for HTTP services.
//!
//! Given a request identifier and a policy (N events per time window), the
//! crate decides whether the request is admitted now or must wait, and
//! maintains the counters behind that decision. It is meant to sit behind a
//! framework's middleware layer but is framework-agnostic itself: the host
//! only has to implement the small [`LimiterRequest`] / [`LimiterResponse`]
//! contract.
//!
//! The crate focuses on:
//! - one atomic fixed-window counter algorithm, shared-store
//!   ([`backend::RedisLimiterBackend`]) or in-process
//!   ([`backend::InMemoryLimiterBackend`])
//! - availability-first composition of a primary and a fallback store
//!   ([`backend::CompositeLimiterBackend`]) with circuit breaker, health
//!   check or fail-fast switching
//! - predictable failure behavior through per-backend
//!   [`FallbackMode`](backend::FallbackMode)s
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use phragma::backend::{InMemoryLimiterBackend, LimiterBackend, MemoryBackendConfig};
//! use phragma::{Evaluator, LimitPolicy};
//!
//! # async fn demo() -> Result<(), phragma::LimiterError> {
//! let backend = Arc::new(InMemoryLimiterBackend::new(MemoryBackendConfig::default())?);
//! backend.connect().await?;
//!
//! let evaluator = Evaluator::new(Arc::clone(&backend) as Arc<dyn LimiterBackend>);
//! let policy = LimitPolicy::builder().times(5).seconds(10).build()?;
//!
//! // in the middleware, per request:
//! // let decision = evaluator.evaluate(&policy, &request, &mut response).await?;
//! // if !decision.is_admitted() { /* skip the handler, response carries 429 */ }
//! # Ok(())
//! # }
//! ```

pub mod backend;

mod clock;
pub use clock::*;

mod common;
pub use common::{Decision, KeyPrefix};

mod error;
pub use error::*;

mod evaluator;
pub use evaluator::*;

mod host;
pub use host::*;

mod policy;
pub use policy::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub(crate) mod runtime;

mod settings;
pub use settings::*;

mod state;
pub use state::*;

#[cfg(test)]
mod tests;
