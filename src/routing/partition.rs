use crate::api::PartitionConfig;
use crate::health::HealthSnapshot;
use crate::replica::{ReplicaError, ReplicaHandle, ServingStatus};
use rand::seq::SliceRandom;
use tokio::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum RoutingError {
    #[error("Partition {partition_id} has no healthy replicas for reads")]
    Unavailable { partition_id: String },

    #[error("Replica {address} failed: {source}")]
    Replica {
        address: String,
        #[source]
        source: ReplicaError,
    },

    #[error("Read task failed")]
    ReadAborted(#[source] tokio::task::JoinError),
}

/// Partition is the replica set responsible for one slice of the key space. Roles are fixed at
/// construction.
pub(crate) struct Partition {
    id: String,
    primary: ReplicaHandle,
    secondaries: Vec<ReplicaHandle>,
}

impl Partition {
    pub(crate) fn new(id: String, primary: ReplicaHandle, secondaries: Vec<ReplicaHandle>) -> Self {
        Partition {
            id,
            primary,
            secondaries,
        }
    }

    pub(crate) fn connect_lazy(config: &PartitionConfig, rpc_timeout: Duration) -> Result<Self, ReplicaError> {
        let primary = ReplicaHandle::connect_lazy(&config.primary_address, rpc_timeout)?;
        let secondaries = config
            .secondary_addresses
            .iter()
            .map(|address| ReplicaHandle::connect_lazy(address, rpc_timeout))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(config.partition_id.clone(), primary, secondaries))
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn primary(&self) -> &ReplicaHandle {
        &self.primary
    }

    pub(crate) fn secondaries(&self) -> &[ReplicaHandle] {
        &self.secondaries
    }

    /// Secondaries currently reported `Serving`, in configured order.
    pub(crate) fn healthy_secondaries(&self, health: &HealthSnapshot) -> Vec<ReplicaHandle> {
        self.secondaries
            .iter()
            .filter(|replica| health.is_serving(replica.address()))
            .cloned()
            .collect()
    }

    /// Prefers a random serving secondary. Falls back to the primary unless it is known to be
    /// down; a primary that hasn't been probed yet is assumed to be up.
    pub(crate) fn select_read_replica(&self, health: &HealthSnapshot) -> Result<ReplicaHandle, RoutingError> {
        let healthy_secondaries = self.healthy_secondaries(health);
        if let Some(replica) = healthy_secondaries.choose(&mut rand::thread_rng()) {
            return Ok(replica.clone());
        }

        match health.status(self.primary.address()) {
            ServingStatus::Serving | ServingStatus::Unknown => Ok(self.primary.clone()),
            ServingStatus::NotServing => Err(RoutingError::Unavailable {
                partition_id: self.id.clone(),
            }),
        }
    }
}
