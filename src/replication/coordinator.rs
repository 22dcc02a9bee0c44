use crate::health::HealthView;
use crate::replica::{ReplicaError, ReplicaHandle};
use crate::replication::dead_letter::DeadLetterQueue;
use crate::replication::retry::{RetryExecutor, RetryPolicy};
use crate::replication::write_op::{FailedWrite, WriteKind, WriteOp};
use crate::routing::Partition;
use std::cmp;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outcome of a replicated write. `replicas_completed` counts the primary plus every secondary
/// that acknowledged before the coordinator stopped waiting.
#[derive(Debug)]
pub struct ReplicationResult<T> {
    pub primary_response: T,
    pub replicas_completed: usize,
    pub replicas_total: usize,
    pub warnings: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ReplicationError {
    #[error("Primary replica {kind} failed: {source}")]
    Primary {
        kind: WriteKind,
        #[source]
        source: ReplicaError,
    },

    #[error("Failed to meet secondary {kind} threshold. Required: {required}, Succeeded: {achieved}")]
    QuorumNotMet {
        kind: WriteKind,
        required: usize,
        achieved: usize,
    },
}

pub(crate) struct ReplicationCoordinator {
    logger: slog::Logger,
    retry_executor: RetryExecutor,
    primary_retry: RetryPolicy,
    secondary_retry: RetryPolicy,
    completed_secondary_writes_threshold: Option<usize>,
    health: HealthView,
    dead_letters: Arc<DeadLetterQueue>,
}

impl ReplicationCoordinator {
    pub(crate) fn new(
        logger: slog::Logger,
        completed_secondary_writes_threshold: Option<usize>,
        primary_retry: RetryPolicy,
        secondary_retry: RetryPolicy,
        health: HealthView,
        dead_letters: Arc<DeadLetterQueue>,
    ) -> Self {
        let logger = logger.new(slog::o!("Component" => "ReplicationCoordinator"));
        ReplicationCoordinator {
            retry_executor: RetryExecutor::new(logger.clone()),
            logger,
            primary_retry,
            secondary_retry,
            completed_secondary_writes_threshold,
            health,
            dead_letters,
        }
    }

    /// Runs `primary_op` against the partition's primary, then fans `secondary_op` out to every
    /// secondary that is currently serving. Returns once enough secondaries have acknowledged;
    /// the rest keep running in the background and park their failures on the dead-letter queue.
    pub(crate) async fn execute<T, F, Fut>(
        &self,
        primary_op: F,
        secondary_op: WriteOp,
        partition: &Partition,
    ) -> Result<ReplicationResult<T>, ReplicationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ReplicaError>>,
    {
        let kind = secondary_op.kind();
        let logger = self.logger.new(slog::o!(
            "Partition" => partition.id().to_string(),
            "Key" => secondary_op.key().to_string()
        ));

        let healthy_secondaries = partition.healthy_secondaries(&self.health.snapshot());
        let replicas_total = 1 + healthy_secondaries.len();

        let primary_operation_name = format!("Primary {} for key {}", kind, secondary_op.key());
        let primary_response = match self
            .retry_executor
            .run(&self.primary_retry, &primary_operation_name, primary_op)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                slog::error!(
                    logger,
                    "Primary replica {} failed for key {}: {}",
                    kind,
                    secondary_op.key(),
                    e
                );
                return Err(ReplicationError::Primary { kind, source: e });
            }
        };

        let threshold = self
            .completed_secondary_writes_threshold
            .unwrap_or_else(|| healthy_secondaries.len());

        // Sized so that no secondary ever waits on a send, even after we've stopped listening.
        let (completion_sender, mut completions) = mpsc::channel(cmp::max(1, healthy_secondaries.len()));
        for (index, replica) in healthy_secondaries.into_iter().enumerate() {
            let secondary_write = SecondaryWrite {
                logger: logger.clone(),
                retry_executor: self.retry_executor.clone(),
                policy: self.secondary_retry.clone(),
                dead_letters: self.dead_letters.clone(),
                partition_id: partition.id().to_string(),
                index,
                replica,
                operation: secondary_op.clone(),
            };
            tokio::task::spawn(secondary_write.run(completion_sender.clone()));
        }
        drop(completion_sender);

        let mut successful_secondaries = 0;
        while successful_secondaries < threshold {
            match completions.recv().await {
                Some(true) => successful_secondaries += 1,
                Some(false) => {}
                None => break,
            }
        }
        // Stragglers are detached, not cancelled. Their completions go nowhere.
        drop(completions);

        if successful_secondaries < threshold {
            slog::warn!(
                logger,
                "Secondary {} threshold not met. Required: {}, Succeeded: {}",
                kind,
                threshold,
                successful_secondaries
            );
            return Err(ReplicationError::QuorumNotMet {
                kind,
                required: threshold,
                achieved: successful_secondaries,
            });
        }

        let replicas_completed = 1 + successful_secondaries;
        let mut warnings = Vec::new();
        if replicas_completed < replicas_total {
            let message = format!(
                "Partial success: {} to {} of {} replicas ({} replica(s) failed)",
                kind.past_tense(),
                replicas_completed,
                replicas_total,
                replicas_total - replicas_completed
            );
            slog::warn!(logger, "{} for key {}", message, secondary_op.key());
            warnings.push(message);
        }

        Ok(ReplicationResult {
            primary_response,
            replicas_completed,
            replicas_total,
            warnings,
        })
    }
}

/// One secondary's share of a replicated write. Owns everything it needs so it can outlive the
/// request that started it.
struct SecondaryWrite {
    logger: slog::Logger,
    retry_executor: RetryExecutor,
    policy: RetryPolicy,
    dead_letters: Arc<DeadLetterQueue>,
    partition_id: String,
    index: usize,
    replica: ReplicaHandle,
    operation: WriteOp,
}

impl SecondaryWrite {
    async fn run(self, completions: mpsc::Sender<bool>) {
        let operation_name = format!(
            "Secondary[{}] {} for key {}",
            self.index,
            self.operation.kind(),
            self.operation.key()
        );
        let result = {
            let operation = &self.operation;
            let replica = &self.replica;
            self.retry_executor
                .run(&self.policy, &operation_name, move || operation.apply(replica))
                .await
        };

        let succeeded = match result {
            Ok(()) => true,
            Err(e) => {
                slog::warn!(
                    self.logger,
                    "Secondary replica[{}] {} failed for key {}: {}. Sending to dead-letter queue.",
                    self.index,
                    self.operation.kind(),
                    self.operation.key(),
                    e;
                    "Replica" => self.replica.address().to_string()
                );
                self.dead_letters
                    .enqueue(FailedWrite::new(self.replica, self.partition_id, self.operation));
                false
            }
        };

        // The coordinator may have stopped listening already.
        let _ = completions.send(succeeded).await;
    }
}
