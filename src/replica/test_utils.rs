use crate::clock::{TimestampSource, WriteTimestamp};
use crate::replica::handle::ReplicaHandle;
use crate::replica::replica_api::{
    DataType, DeleteValueInput, KeyValue, ReplicaClient, ReplicaError, ServingStatus, SetValueInput,
};
use bytes::Bytes;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tonic::Status;

pub(crate) fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

/// How a scripted replica answers data calls.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Script {
    Succeed,
    Fail,
    /// Fail the first N data calls, then succeed.
    FailTimes(usize),
    /// Never complete.
    Hang,
}

/// How a scripted replica answers health checks.
#[derive(Clone, Copy, Debug)]
pub(crate) enum HealthScript {
    Report(ServingStatus),
    Fail,
    Hang,
}

pub(crate) struct ScriptedReplica {
    address: String,
    script: Mutex<Script>,
    health: Mutex<HealthScript>,
    gate: Mutex<Option<Arc<Notify>>>,
    data_calls: AtomicUsize,
    health_calls: AtomicUsize,
    writes: Mutex<Vec<SetValueInput>>,
    deletes: Mutex<Vec<DeleteValueInput>>,
}

impl ScriptedReplica {
    pub(crate) fn new(address: &str, script: Script) -> Arc<Self> {
        Arc::new(ScriptedReplica {
            address: address.to_string(),
            script: Mutex::new(script),
            health: Mutex::new(HealthScript::Report(ServingStatus::Serving)),
            gate: Mutex::new(None),
            data_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            writes: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn handle(self: &Arc<Self>) -> ReplicaHandle {
        ReplicaHandle::new(&self.address, self.clone())
    }

    pub(crate) fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub(crate) fn set_health(&self, health: HealthScript) {
        *self.health.lock().unwrap() = health;
    }

    /// Data calls are counted, then park until `gate` is notified, then follow the script.
    pub(crate) fn set_gate(&self, gate: Arc<Notify>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub(crate) fn data_calls(&self) -> usize {
        self.data_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> Vec<SetValueInput> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn deletes(&self) -> Vec<DeleteValueInput> {
        self.deletes.lock().unwrap().clone()
    }

    /// Counts the call and resolves it according to the current script.
    async fn scripted_call(&self) -> Result<(), ReplicaError> {
        let call_number = self.data_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let script = *self.script.lock().unwrap();
        match script {
            Script::Succeed => Ok(()),
            Script::Fail => Err(scripted_failure()),
            Script::FailTimes(n) if call_number <= n => Err(scripted_failure()),
            Script::FailTimes(_) => Ok(()),
            Script::Hang => std::future::pending().await,
        }
    }

    /// Values read from a scripted replica carry its address so tests can tell who served them.
    fn key_value(&self, key: &str) -> KeyValue {
        KeyValue {
            key: key.to_string(),
            data_type: DataType::String,
            value: Bytes::from(self.address.clone()),
        }
    }
}

fn scripted_failure() -> ReplicaError {
    ReplicaError::Rpc(Status::unavailable("scripted failure"))
}

#[async_trait::async_trait]
impl ReplicaClient for ScriptedReplica {
    async fn get_value(&self, key: &str) -> Result<KeyValue, ReplicaError> {
        self.scripted_call().await?;
        Ok(self.key_value(key))
    }

    async fn get_all_values(&self) -> Result<Vec<KeyValue>, ReplicaError> {
        self.scripted_call().await?;
        Ok(vec![self.key_value(&format!("{}/only-key", self.address))])
    }

    async fn set_value(&self, input: &SetValueInput) -> Result<KeyValue, ReplicaError> {
        self.scripted_call().await?;
        self.writes.lock().unwrap().push(input.clone());
        Ok(KeyValue {
            key: input.key.clone(),
            data_type: input.data_type,
            value: input.value.clone(),
        })
    }

    async fn delete_value(&self, input: &DeleteValueInput) -> Result<(), ReplicaError> {
        self.scripted_call().await?;
        self.deletes.lock().unwrap().push(input.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<ServingStatus, ReplicaError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        let health = *self.health.lock().unwrap();
        match health {
            HealthScript::Report(status) => Ok(status),
            HealthScript::Fail => Err(scripted_failure()),
            HealthScript::Hang => std::future::pending().await,
        }
    }
}

pub(crate) struct FixedClock(pub(crate) WriteTimestamp);

impl TimestampSource for FixedClock {
    fn now(&self) -> WriteTimestamp {
        self.0
    }
}
