//! Redis-backed rate limiting.
//!
//! The counter procedure runs as a Lua script, so one round trip performs
//! the increment, the expiry bookkeeping and the admission decision
//! atomically regardless of store-side contention.

mod redis_limiter_backend;
pub use redis_limiter_backend::*;

mod scripts;
pub use scripts::*;
