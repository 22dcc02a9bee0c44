mod partition;
mod partition_router;

pub use partition::RoutingError;

pub(crate) use partition::Partition;
pub(crate) use partition_router::PartitionRouter;
