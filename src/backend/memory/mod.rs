//! In-process rate limiting backend.
//!
//! Counters live in a sharded concurrent map ([`DashMap`](dashmap::DashMap)),
//! so admission checks never take a whole-map lock. A background reaper
//! thread removes expired windows, and a capacity guard keeps the map from
//! growing past `max_keys`.
//!
//! State is process-scoped and not persistent: multiple instances do not
//! share limits, and counters are lost on restart.

mod in_memory_limiter_backend;
pub use in_memory_limiter_backend::*;
