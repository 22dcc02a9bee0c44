//! The library's client-facing API: configuration, wiring, and the `Router` itself.
mod options;
mod router;
mod wiring;

pub use options::PartitionConfig;
pub use options::RoutingOptions;
pub use router::Router;
pub use wiring::try_create_router;
pub use wiring::RouterConfig;
pub use wiring::RouterCreationError;
