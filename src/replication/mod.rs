mod coordinator;
mod dead_letter;
mod retry;
mod write_op;

pub use coordinator::ReplicationError;
pub use coordinator::ReplicationResult;
pub use dead_letter::DeadLetterOptions;
pub use retry::RetryPolicy;
pub use write_op::WriteKind;

pub(crate) use coordinator::ReplicationCoordinator;
pub(crate) use dead_letter::DeadLetterDrainHandle;
pub(crate) use dead_letter::DeadLetterQueue;
pub(crate) use write_op::WriteOp;
