//! High-availability fronting of a primary and a fallback backend.
//!
//! The composite is availability-first, not consistent: when the primary
//! store is unreachable its counters and the fallback's are separate, and
//! the composite's job is only to keep serving decisions while the primary
//! recovers.

mod composite_limiter_backend;
pub use composite_limiter_backend::*;

mod stats;
pub use stats::*;
