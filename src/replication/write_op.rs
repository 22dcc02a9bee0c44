use crate::replica::{DeleteValueInput, ReplicaError, ReplicaHandle, SetValueInput};
use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WriteKind {
    Write,
    Delete,
}

impl WriteKind {
    pub(crate) fn past_tense(&self) -> &'static str {
        match self {
            WriteKind::Write => "wrote",
            WriteKind::Delete => "deleted",
        }
    }
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteKind::Write => f.write_str("write"),
            WriteKind::Delete => f.write_str("delete"),
        }
    }
}

/// A replica mutation that can be replayed against any replica, any number of times. Replays are
/// safe because replicas keep whichever write carries the latest timestamp.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum WriteOp {
    Set(SetValueInput),
    Delete(DeleteValueInput),
}

impl WriteOp {
    pub(crate) fn kind(&self) -> WriteKind {
        match self {
            WriteOp::Set(_) => WriteKind::Write,
            WriteOp::Delete(_) => WriteKind::Delete,
        }
    }

    pub(crate) fn key(&self) -> &str {
        match self {
            WriteOp::Set(input) => &input.key,
            WriteOp::Delete(input) => &input.key,
        }
    }

    pub(crate) async fn apply(&self, replica: &ReplicaHandle) -> Result<(), ReplicaError> {
        match self {
            WriteOp::Set(input) => replica.set_value(input).await.map(|_| ()),
            WriteOp::Delete(input) => replica.delete_value(input).await,
        }
    }
}

/// A secondary write that ran out of retries while serving a client request, parked for replay.
#[derive(Debug)]
pub(crate) struct FailedWrite {
    pub(crate) replica: ReplicaHandle,
    pub(crate) partition_id: String,
    pub(crate) operation: WriteOp,
    pub(crate) failed_at: DateTime<Utc>,
    pub(crate) retry_count: u32,
}

impl FailedWrite {
    pub(crate) fn new(replica: ReplicaHandle, partition_id: String, operation: WriteOp) -> Self {
        FailedWrite {
            replica,
            partition_id,
            operation,
            failed_at: Utc::now(),
            retry_count: 0,
        }
    }

    pub(crate) fn key(&self) -> &str {
        self.operation.key()
    }

    pub(crate) fn kind(&self) -> WriteKind {
        self.operation.kind()
    }
}
