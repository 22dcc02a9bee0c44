use crate::grpc::health::health_server::{Health, HealthServer};
use crate::grpc::health::{HealthCheckRequest, HealthCheckResponse};
use crate::grpc::toydb::data as proto;
use crate::grpc::toydb::data::data_server::{Data, DataServer};
use crate::replica::replica_api::{DataType, KeyValue, ServingStatus};
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// InMemoryReplica is a volatile stand-in for a storage node. It serves the replica `Data` and
/// `Health` gRPC services and resolves concurrent writes by keeping the latest write timestamp.
///
/// It exists for tests and local demos; nothing is persisted.
#[derive(Clone, Default)]
pub struct InMemoryReplica {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    entries: Mutex<HashMap<String, StoredEntry>>,
    not_serving: AtomicBool,
    rejecting_writes: AtomicBool,
}

#[derive(Clone)]
struct StoredEntry {
    data_type: DataType,
    value: Bytes,
    timestamp_millis: i64,
    // Deletes leave a tombstone so an older, late-arriving write can't resurrect the key.
    deleted: bool,
}

impl InMemoryReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip what the health endpoint reports. Data RPCs keep working either way.
    pub fn set_serving(&self, serving: bool) {
        self.shared.not_serving.store(!serving, Ordering::Release);
    }

    /// While set, writes and deletes fail with UNAVAILABLE. Health and reads are unaffected.
    pub fn set_rejecting_writes(&self, rejecting: bool) {
        self.shared.rejecting_writes.store(rejecting, Ordering::Release);
    }

    fn check_accepting_writes(&self) -> Result<(), Status> {
        if self.shared.rejecting_writes.load(Ordering::Acquire) {
            return Err(Status::unavailable("Replica is rejecting writes"));
        }

        Ok(())
    }

    pub fn serving_status(&self) -> ServingStatus {
        if self.shared.not_serving.load(Ordering::Acquire) {
            ServingStatus::NotServing
        } else {
            ServingStatus::Serving
        }
    }

    /// Live (non-deleted) value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<KeyValue> {
        let entries = self.shared.entries.lock().expect("InMemoryReplica.get() mutex guard poison");
        entries
            .get(key)
            .filter(|entry| !entry.deleted)
            .map(|entry| KeyValue {
                key: key.to_string(),
                data_type: entry.data_type,
                value: entry.value.clone(),
            })
    }

    pub fn len(&self) -> usize {
        let entries = self.shared.entries.lock().expect("InMemoryReplica.len() mutex guard poison");
        entries.values().filter(|entry| !entry.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn serve<F>(self, socket_addr: SocketAddr, shutdown_signal: F) -> Result<(), tonic::transport::Error>
    where
        F: Future<Output = ()>,
    {
        Server::builder()
            .add_service(DataServer::new(self.clone()))
            .add_service(HealthServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await
    }

    fn apply(&self, key: &str, incoming: StoredEntry) -> StoredEntry {
        let mut entries = self.shared.entries.lock().expect("InMemoryReplica.apply() mutex guard poison");
        match entries.get(key) {
            Some(existing) if existing.timestamp_millis > incoming.timestamp_millis => existing.clone(),
            _ => {
                entries.insert(key.to_string(), incoming.clone());
                incoming
            }
        }
    }

    fn read(&self, key: &str) -> proto::KeyValueResponse {
        match self.get(key) {
            Some(kv) => proto::KeyValueResponse {
                key: kv.key,
                data_type: kv.data_type.to_proto() as i32,
                value: kv.value.to_vec(),
            },
            None => null_response(key),
        }
    }
}

fn null_response(key: &str) -> proto::KeyValueResponse {
    proto::KeyValueResponse {
        key: key.to_string(),
        data_type: proto::DataType::Null as i32,
        value: Vec::new(),
    }
}

#[async_trait::async_trait]
impl Data for InMemoryReplica {
    async fn get_value(&self, request: Request<proto::GetRequest>) -> Result<Response<proto::KeyValueResponse>, Status> {
        let request = request.into_inner();
        Ok(Response::new(self.read(&request.key)))
    }

    async fn get_all_values(
        &self,
        _request: Request<proto::GetAllValuesRequest>,
    ) -> Result<Response<proto::GetAllValuesResponse>, Status> {
        let entries = self
            .shared
            .entries
            .lock()
            .expect("InMemoryReplica.get_all_values() mutex guard poison");

        let mut values: Vec<proto::KeyValueResponse> = entries
            .iter()
            .filter(|(_, entry)| !entry.deleted)
            .map(|(key, entry)| proto::KeyValueResponse {
                key: key.clone(),
                data_type: entry.data_type.to_proto() as i32,
                value: entry.value.to_vec(),
            })
            .collect();
        values.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(Response::new(proto::GetAllValuesResponse { values }))
    }

    async fn set_value(&self, request: Request<proto::KeyValueRequest>) -> Result<Response<proto::KeyValueResponse>, Status> {
        self.check_accepting_writes()?;
        let request = request.into_inner();
        let data_type = DataType::from_proto(request.data_type)
            .ok_or_else(|| Status::invalid_argument(format!("Unknown data type {}", request.data_type)))?;

        let stored = self.apply(
            &request.key,
            StoredEntry {
                data_type,
                value: Bytes::from(request.value),
                timestamp_millis: request.timestamp_millis,
                deleted: false,
            },
        );

        if stored.deleted {
            return Ok(Response::new(null_response(&request.key)));
        }

        Ok(Response::new(proto::KeyValueResponse {
            key: request.key,
            data_type: stored.data_type.to_proto() as i32,
            value: stored.value.to_vec(),
        }))
    }

    async fn delete_value(&self, request: Request<proto::DeleteRequest>) -> Result<Response<proto::DeleteResponse>, Status> {
        self.check_accepting_writes()?;
        let request = request.into_inner();
        self.apply(
            &request.key,
            StoredEntry {
                data_type: DataType::Null,
                value: Bytes::new(),
                timestamp_millis: request.timestamp_millis,
                deleted: true,
            },
        );

        Ok(Response::new(proto::DeleteResponse {}))
    }
}

#[async_trait::async_trait]
impl Health for InMemoryReplica {
    async fn check(&self, _request: Request<HealthCheckRequest>) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse {
            status: self.serving_status().to_proto() as i32,
        }))
    }
}
