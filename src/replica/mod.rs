mod handle;
mod in_memory;
mod peer_client;
mod replica_api;
#[cfg(test)]
pub(crate) mod test_utils;

pub use in_memory::InMemoryReplica;
pub use replica_api::DataType;
pub use replica_api::KeyValue;
pub use replica_api::ReplicaError;
pub use replica_api::ServingStatus;

pub(crate) use handle::ReplicaHandle;
pub(crate) use replica_api::DeleteValueInput;
pub(crate) use replica_api::SetValueInput;
