use crate::grpc::health::health_client::HealthClient;
use crate::grpc::health::HealthCheckRequest;
use crate::grpc::toydb::data as proto;
use crate::grpc::toydb::data::data_client::DataClient;
use crate::replica::replica_api::{
    DeleteValueInput, KeyValue, ReplicaClient, ReplicaError, ServingStatus, SetValueInput,
};
use std::future::Future;
use tokio::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Status;

/// gRPC client for one replica node. Both services share a single lazily connected channel, so
/// building the client never waits on the network and an unreachable replica only shows up as
/// failed calls.
pub(crate) struct GrpcReplicaClient {
    data: DataClient<Channel>,
    health: HealthClient<Channel>,
    rpc_timeout: Duration,
}

impl GrpcReplicaClient {
    pub(crate) fn connect_lazy(address: &str, rpc_timeout: Duration) -> Result<Self, ReplicaError> {
        let endpoint = Endpoint::from_shared(endpoint_url(address)).map_err(|e| ReplicaError::InvalidAddress {
            address: address.to_string(),
            message: e.to_string(),
        })?;

        let channel = endpoint
            .timeout(rpc_timeout)
            .connect_lazy()
            .map_err(|e| ReplicaError::InvalidAddress {
                address: address.to_string(),
                message: e.to_string(),
            })?;

        Ok(GrpcReplicaClient {
            data: DataClient::new(channel.clone()),
            health: HealthClient::new(channel),
            rpc_timeout,
        })
    }

    async fn call<T, F>(&self, rpc: F) -> Result<T, ReplicaError>
    where
        F: Future<Output = Result<tonic::Response<T>, Status>>,
    {
        match tokio::time::timeout(self.rpc_timeout, rpc).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(ReplicaError::Rpc(status)),
            Err(_elapsed) => Err(ReplicaError::Timeout),
        }
    }
}

#[async_trait::async_trait]
impl ReplicaClient for GrpcReplicaClient {
    async fn get_value(&self, key: &str) -> Result<KeyValue, ReplicaError> {
        let mut client = self.data.clone();
        let request = proto::GetRequest { key: key.to_string() };
        let reply = self.call(client.get_value(request)).await?;

        KeyValue::try_from_proto(reply)
    }

    async fn get_all_values(&self) -> Result<Vec<KeyValue>, ReplicaError> {
        let mut client = self.data.clone();
        let reply = self.call(client.get_all_values(proto::GetAllValuesRequest {})).await?;

        reply.values.into_iter().map(KeyValue::try_from_proto).collect()
    }

    async fn set_value(&self, input: &SetValueInput) -> Result<KeyValue, ReplicaError> {
        let mut client = self.data.clone();
        let request = proto::KeyValueRequest {
            key: input.key.clone(),
            data_type: input.data_type.to_proto() as i32,
            value: input.value.to_vec(),
            timestamp_millis: input.timestamp.as_millis(),
        };
        let reply = self.call(client.set_value(request)).await?;

        KeyValue::try_from_proto(reply)
    }

    async fn delete_value(&self, input: &DeleteValueInput) -> Result<(), ReplicaError> {
        let mut client = self.data.clone();
        let request = proto::DeleteRequest {
            key: input.key.clone(),
            timestamp_millis: input.timestamp.as_millis(),
        };
        self.call(client.delete_value(request)).await?;

        Ok(())
    }

    async fn health_check(&self) -> Result<ServingStatus, ReplicaError> {
        let mut client = self.health.clone();
        let request = HealthCheckRequest {
            service: String::new(),
        };
        let reply = self.call(client.check(request)).await?;

        Ok(ServingStatus::from_proto(reply.status))
    }
}

/// Replica addresses may be configured as bare `host:port`.
fn endpoint_url(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}
