mod api;
mod clock;
mod health;
mod replica;
mod replication;
mod routing;
mod server;
mod stop_signal;
#[allow(clippy::all, dead_code)]
mod grpc {
    pub mod toydb {
        pub mod data {
            include!("../generated/toydb.data.rs");
        }
        pub mod routing {
            include!("../generated/toydb.routing.rs");
        }
    }
    pub mod health {
        include!("../generated/grpc.health.v1.rs");
    }
}

pub use api::try_create_router;
pub use api::PartitionConfig;
pub use api::Router;
pub use api::RouterConfig;
pub use api::RouterCreationError;
pub use api::RoutingOptions;
pub use clock::SkewCorrectedClock;
pub use clock::TimestampSource;
pub use clock::WriteTimestamp;
pub use replica::DataType;
pub use replica::InMemoryReplica;
pub use replica::KeyValue;
pub use replica::ReplicaError;
pub use replica::ServingStatus;
pub use replication::DeadLetterOptions;
pub use replication::ReplicationError;
pub use replication::ReplicationResult;
pub use replication::RetryPolicy;
pub use replication::WriteKind;
pub use routing::RoutingError;
pub use server::shutdown_signal;
pub use server::RoutingServer;
pub use server::RoutingServerShutdownHandle;
pub use server::RoutingServerShutdownSignal;

// `crate::{root_mod}` holds no code, only `mod` and `pub use` statements. Nothing is exported via a
// `pub mod`; each public type is re-exported individually.
