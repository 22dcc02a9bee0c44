use crate::replica::peer_client::GrpcReplicaClient;
use crate::replica::replica_api::{
    DeleteValueInput, KeyValue, ReplicaClient, ReplicaError, ServingStatus, SetValueInput,
};
use std::fmt;
use std::sync::Arc;
use tokio::time::Duration;

/// ReplicaHandle is a cheaply cloneable connection to one replica, keyed by its configured
/// address. The address doubles as the key into the health table and the dead-letter queue.
#[derive(Clone)]
pub(crate) struct ReplicaHandle {
    address: Arc<str>,
    client: Arc<dyn ReplicaClient>,
}

impl ReplicaHandle {
    pub(crate) fn new(address: &str, client: Arc<dyn ReplicaClient>) -> Self {
        ReplicaHandle {
            address: Arc::from(address),
            client,
        }
    }

    pub(crate) fn connect_lazy(address: &str, rpc_timeout: Duration) -> Result<Self, ReplicaError> {
        let client = GrpcReplicaClient::connect_lazy(address, rpc_timeout)?;
        Ok(Self::new(address, Arc::new(client)))
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    pub(crate) async fn get_value(&self, key: &str) -> Result<KeyValue, ReplicaError> {
        self.client.get_value(key).await
    }

    pub(crate) async fn get_all_values(&self) -> Result<Vec<KeyValue>, ReplicaError> {
        self.client.get_all_values().await
    }

    pub(crate) async fn set_value(&self, input: &SetValueInput) -> Result<KeyValue, ReplicaError> {
        self.client.set_value(input).await
    }

    pub(crate) async fn delete_value(&self, input: &DeleteValueInput) -> Result<(), ReplicaError> {
        self.client.delete_value(input).await
    }

    pub(crate) async fn health_check(&self) -> Result<ServingStatus, ReplicaError> {
        self.client.health_check().await
    }
}

impl fmt::Debug for ReplicaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReplicaHandle").field(&self.address).finish()
    }
}
