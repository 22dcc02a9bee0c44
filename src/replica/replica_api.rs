use crate::clock::WriteTimestamp;
use crate::grpc::health::health_check_response;
use crate::grpc::toydb::data as proto;
use bytes::Bytes;
use std::fmt;

/// Serving status as reported by a replica's health endpoint.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ServingStatus {
    Unknown,
    Serving,
    NotServing,
}

impl ServingStatus {
    pub(crate) fn from_proto(raw: i32) -> Self {
        match health_check_response::ServingStatus::from_i32(raw) {
            Some(health_check_response::ServingStatus::Serving) => ServingStatus::Serving,
            Some(health_check_response::ServingStatus::NotServing) => ServingStatus::NotServing,
            // SERVICE_UNKNOWN and anything we can't decode carry no liveness signal.
            _ => ServingStatus::Unknown,
        }
    }

    pub(crate) fn to_proto(self) -> health_check_response::ServingStatus {
        match self {
            ServingStatus::Unknown => health_check_response::ServingStatus::Unknown,
            ServingStatus::Serving => health_check_response::ServingStatus::Serving,
            ServingStatus::NotServing => health_check_response::ServingStatus::NotServing,
        }
    }
}

impl fmt::Display for ServingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServingStatus::Unknown => "UNKNOWN",
            ServingStatus::Serving => "SERVING",
            ServingStatus::NotServing => "NOT_SERVING",
        };
        f.write_str(name)
    }
}

/// Type tag stored next to every value. The routing tier never interprets value bytes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DataType {
    Null,
    Bool,
    Int,
    Long,
    Float,
    Double,
    String,
}

impl DataType {
    pub(crate) fn from_proto(raw: i32) -> Option<Self> {
        let data_type = match proto::DataType::from_i32(raw)? {
            proto::DataType::Null => DataType::Null,
            proto::DataType::Bool => DataType::Bool,
            proto::DataType::Int => DataType::Int,
            proto::DataType::Long => DataType::Long,
            proto::DataType::Float => DataType::Float,
            proto::DataType::Double => DataType::Double,
            proto::DataType::String => DataType::String,
        };
        Some(data_type)
    }

    pub(crate) fn to_proto(self) -> proto::DataType {
        match self {
            DataType::Null => proto::DataType::Null,
            DataType::Bool => proto::DataType::Bool,
            DataType::Int => proto::DataType::Int,
            DataType::Long => proto::DataType::Long,
            DataType::Float => proto::DataType::Float,
            DataType::Double => proto::DataType::Double,
            DataType::String => proto::DataType::String,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyValue {
    pub key: String,
    pub data_type: DataType,
    pub value: Bytes,
}

impl KeyValue {
    pub(crate) fn try_from_proto(reply: proto::KeyValueResponse) -> Result<Self, ReplicaError> {
        let data_type = DataType::from_proto(reply.data_type)
            .ok_or_else(|| ReplicaError::MalformedReply(format!("Unknown data type {}", reply.data_type)))?;

        Ok(KeyValue {
            key: reply.key,
            data_type,
            value: Bytes::from(reply.value),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SetValueInput {
    pub(crate) key: String,
    pub(crate) data_type: DataType,
    pub(crate) value: Bytes,
    pub(crate) timestamp: WriteTimestamp,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct DeleteValueInput {
    pub(crate) key: String,
    pub(crate) timestamp: WriteTimestamp,
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicaError {
    #[error("Invalid replica address '{address}': {message}")]
    InvalidAddress { address: String, message: String },
    #[error("Replica RPC failed: {0}")]
    Rpc(tonic::Status),
    #[error("Timed out calling replica")]
    Timeout,
    #[error("Malformed reply from replica: {0}")]
    MalformedReply(String),
}

/// Transport to one remote replica. Primaries and secondaries speak the same protocol; the caller
/// decides how hard to retry and what to do when a call fails.
#[async_trait::async_trait]
pub(crate) trait ReplicaClient: Send + Sync {
    async fn get_value(&self, key: &str) -> Result<KeyValue, ReplicaError>;
    async fn get_all_values(&self) -> Result<Vec<KeyValue>, ReplicaError>;
    async fn set_value(&self, input: &SetValueInput) -> Result<KeyValue, ReplicaError>;
    async fn delete_value(&self, input: &DeleteValueInput) -> Result<(), ReplicaError>;
    async fn health_check(&self) -> Result<ServingStatus, ReplicaError>;
}
