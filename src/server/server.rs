use crate::grpc::toydb::routing as proto;
use crate::grpc::toydb::routing::routing_server::{Routing, RoutingServer as GrpcRoutingServer};
use crate::replica::{DataType, KeyValue, ReplicaError};
use crate::replication::ReplicationError;
use crate::routing::RoutingError;
use crate::server::RoutingServerShutdownSignal;
use crate::Router;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// RoutingServer is the type that implements the client-facing routing gRPC interface.
pub struct RoutingServer {
    logger: slog::Logger,
    router: Arc<Router>,
}

impl RoutingServer {
    pub fn new(logger: slog::Logger, router: Arc<Router>) -> Self {
        RoutingServer { logger, router }
    }

    pub async fn run(
        self,
        socket_addr: SocketAddr,
        shutdown_signal: RoutingServerShutdownSignal,
    ) -> Result<(), tonic::transport::Error> {
        let logger = self.logger.clone();
        slog::info!(logger, "Listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcRoutingServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
        result
    }

    async fn handle_get_value(&self, rpc_request: proto::GetRequest) -> Result<proto::KeyValueResponse, Status> {
        let value = self
            .router
            .get_value(&rpc_request.key)
            .await
            .map_err(Self::convert_routing_error)?;

        Ok(Self::convert_key_value(value))
    }

    async fn handle_get_all_values(&self) -> Result<proto::GetAllValuesResponse, Status> {
        let values = self
            .router
            .get_all_values()
            .await
            .map_err(Self::convert_routing_error)?;

        Ok(proto::GetAllValuesResponse {
            values: values.into_iter().map(Self::convert_key_value).collect(),
        })
    }

    async fn handle_set_value(&self, rpc_request: proto::KeyValueRequest) -> Result<proto::KeyValueResponse, Status> {
        let data_type = DataType::from_proto(rpc_request.data_type).ok_or_else(|| {
            Status::invalid_argument(format!("Unknown data type {}", rpc_request.data_type))
        })?;

        let result = self
            .router
            .set_value(&rpc_request.key, data_type, Bytes::from(rpc_request.value))
            .await
            .map_err(Self::convert_replication_error)?;

        let mut rpc_reply = Self::convert_key_value(result.primary_response);
        rpc_reply.replicas_written = result.replicas_completed as i32;
        rpc_reply.replicas_total = result.replicas_total as i32;
        rpc_reply.warnings = result.warnings;
        Ok(rpc_reply)
    }

    async fn handle_delete_value(&self, rpc_request: proto::DeleteRequest) -> Result<proto::DeleteResponse, Status> {
        let result = self
            .router
            .delete_value(&rpc_request.key)
            .await
            .map_err(Self::convert_replication_error)?;

        Ok(proto::DeleteResponse {
            warnings: result.warnings,
        })
    }

    fn handle_get_health(&self) -> proto::GetHealthResponse {
        proto::GetHealthResponse {
            replicas: self
                .router
                .health_snapshot()
                .into_iter()
                .map(|(address, status)| (address, status.to_string()))
                .collect(),
        }
    }

    fn convert_key_value(value: KeyValue) -> proto::KeyValueResponse {
        proto::KeyValueResponse {
            key: value.key,
            data_type: value.data_type.to_proto() as i32,
            value: value.value.to_vec(),
            replicas_written: 0,
            replicas_total: 0,
            warnings: vec![],
        }
    }

    fn convert_routing_error(error: RoutingError) -> Status {
        match error {
            RoutingError::Unavailable { .. } => Status::unavailable(error.to_string()),
            // Whatever the replica said (e.g. NOT_FOUND) goes back to the client unchanged.
            RoutingError::Replica {
                source: ReplicaError::Rpc(status),
                ..
            } => status,
            RoutingError::Replica {
                address,
                source: ReplicaError::Timeout,
            } => Status::deadline_exceeded(format!("Timed out reading from replica {}", address)),
            RoutingError::Replica { .. } | RoutingError::ReadAborted(_) => Status::internal(error.to_string()),
        }
    }

    fn convert_replication_error(error: ReplicationError) -> Status {
        match error {
            ReplicationError::Primary { .. } => Status::unavailable(error.to_string()),
            ReplicationError::QuorumNotMet { .. } => Status::aborted(error.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl Routing for RoutingServer {
    async fn get_value(
        &self,
        rpc_request_wrapped: Request<proto::GetRequest>,
    ) -> Result<Response<proto::KeyValueResponse>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_get_value(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn get_all_values(
        &self,
        _rpc_request_wrapped: Request<proto::GetAllValuesRequest>,
    ) -> Result<Response<proto::GetAllValuesResponse>, Status> {
        let rpc_result = self.handle_get_all_values().await;
        slog::debug!(self.logger, "ServerWire - GetAllValues {:?}", rpc_result.as_ref().map(|r| r.values.len()));

        rpc_result.map(Response::new)
    }

    async fn set_value(
        &self,
        rpc_request_wrapped: Request<proto::KeyValueRequest>,
    ) -> Result<Response<proto::KeyValueResponse>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_set_value(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn delete_value(
        &self,
        rpc_request_wrapped: Request<proto::DeleteRequest>,
    ) -> Result<Response<proto::DeleteResponse>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_delete_value(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn get_health(
        &self,
        _rpc_request_wrapped: Request<proto::GetHealthRequest>,
    ) -> Result<Response<proto::GetHealthResponse>, Status> {
        Ok(Response::new(self.handle_get_health()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::WriteKind;
    use tonic::Code;

    #[test]
    fn routing_errors_map_to_status_codes() {
        let unavailable = RoutingServer::convert_routing_error(RoutingError::Unavailable {
            partition_id: "p-1".to_string(),
        });
        assert_eq!(unavailable.code(), Code::Unavailable);
        assert!(unavailable.message().contains("p-1"));

        let not_found = RoutingServer::convert_routing_error(RoutingError::Replica {
            address: "a:1".to_string(),
            source: ReplicaError::Rpc(Status::not_found("no such key")),
        });
        assert_eq!(not_found.code(), Code::NotFound);
        assert_eq!(not_found.message(), "no such key");

        let timeout = RoutingServer::convert_routing_error(RoutingError::Replica {
            address: "a:1".to_string(),
            source: ReplicaError::Timeout,
        });
        assert_eq!(timeout.code(), Code::DeadlineExceeded);
    }

    #[test]
    fn replication_errors_map_to_status_codes() {
        let primary = RoutingServer::convert_replication_error(ReplicationError::Primary {
            kind: WriteKind::Write,
            source: ReplicaError::Timeout,
        });
        assert_eq!(primary.code(), Code::Unavailable);

        let quorum = RoutingServer::convert_replication_error(ReplicationError::QuorumNotMet {
            kind: WriteKind::Delete,
            required: 2,
            achieved: 0,
        });
        assert_eq!(quorum.code(), Code::Aborted);
        assert_eq!(
            quorum.message(),
            "Failed to meet secondary delete threshold. Required: 2, Succeeded: 0"
        );
    }

    #[test]
    fn key_values_carry_type_and_bytes() {
        let reply = RoutingServer::convert_key_value(KeyValue {
            key: "k".to_string(),
            data_type: DataType::Bool,
            value: Bytes::from_static(&[1]),
        });

        assert_eq!(reply.key, "k");
        assert_eq!(reply.data_type, crate::grpc::toydb::data::DataType::Bool as i32);
        assert_eq!(reply.value, vec![1]);
        assert!(reply.warnings.is_empty());
    }
}
