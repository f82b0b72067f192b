//! Rate limiter backends and the interface they share.
//!
//! Three implementations ship with the crate:
//!
//! - [`InMemoryLimiterBackend`]: process-local counters with expiry and a
//!   bounded key count
//! - [`RedisLimiterBackend`]: atomic counters on a shared Redis (behind the
//!   `redis-tokio` / `redis-smol` features)
//! - [`CompositeLimiterBackend`]: a primary and a fallback behind one of
//!   three switching strategies

mod limiter_backend;
pub use limiter_backend::*;

pub mod composite;
pub use composite::*;

pub mod memory;
pub use memory::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub mod redis;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub use redis::*;
