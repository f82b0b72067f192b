//! The contract the host HTTP framework fulfils.
//!
//! The core never depends on a concrete framework: middleware adapters hand
//! it anything that can name the caller and carry a rejection back out.

use std::net::IpAddr;
use std::sync::Arc;

use crate::Decision;

/// Minimal view of an incoming request.
pub trait LimiterRequest: Send + Sync {
    /// Address the request arrived from, when known.
    fn client_addr(&self) -> Option<IpAddr>;

    /// Request path, used in the default counter identifier.
    fn path(&self) -> &str;

    /// Single-valued header lookup.
    ///
    /// Only consulted by identifiers that trust proxy headers; the default
    /// returns nothing.
    fn header(&self, _name: &str) -> Option<&str> {
        None
    }
}

/// Minimal view of the outgoing response.
pub trait LimiterResponse: Send {
    fn set_status(&mut self, status: u16);

    fn set_header(&mut self, name: &str, value: &str);

    fn set_body(&mut self, body: &str);
}

/// Function yielding the caller-scoped part of a counter key.
pub type IdentifierFn = Arc<dyn Fn(&dyn LimiterRequest) -> String + Send + Sync>;

/// Function invoked when a request is rejected.
pub type OnRejectFn =
    Arc<dyn Fn(&dyn LimiterRequest, &mut dyn LimiterResponse, &Decision) + Send + Sync>;
