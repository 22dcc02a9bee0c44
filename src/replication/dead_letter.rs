use crate::replication::retry::{RetryExecutor, RetryPolicy};
use crate::replication::write_op::FailedWrite;
use crate::stop_signal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time;
use tokio::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct DeadLetterOptions {
    /// Number of failed replay passes after which an entry is discarded.
    pub max_retries: u32,
    pub processing_interval: Duration,
    /// Retries within a single replay pass.
    pub retry_policy: RetryPolicy,
}

impl Default for DeadLetterOptions {
    fn default() -> Self {
        DeadLetterOptions {
            max_retries: 5,
            processing_interval: Duration::from_secs(30),
            retry_policy: RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(5)),
        }
    }
}

impl DeadLetterOptions {
    pub(crate) fn validate(&self) -> Result<(), &'static str> {
        if self.max_retries == 0 {
            return Err("Dead-letter max retries must be greater than zero");
        }
        if self.processing_interval == Duration::from_secs(0) {
            return Err("Dead-letter processing interval must be greater than zero");
        }

        self.retry_policy.validate()
    }
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct DrainSummary {
    pub(crate) replayed: usize,
    pub(crate) requeued: usize,
    pub(crate) discarded: usize,
}

/// DeadLetterQueue holds secondary writes that could not be applied within a client request.
/// Any number of requests enqueue; a single background task drains.
pub(crate) struct DeadLetterQueue {
    logger: slog::Logger,
    queue: Mutex<VecDeque<FailedWrite>>,
    options: DeadLetterOptions,
    retry_executor: RetryExecutor,
}

/// Dropping the handle stops the drain loop at its next tick.
pub(crate) struct DeadLetterDrainHandle {
    _stopper: stop_signal::Stopper,
}

impl DeadLetterQueue {
    pub(crate) fn new(logger: slog::Logger, options: DeadLetterOptions) -> Self {
        let logger = logger.new(slog::o!("Component" => "DeadLetterQueue"));
        DeadLetterQueue {
            retry_executor: RetryExecutor::new(logger.clone()),
            logger,
            queue: Mutex::new(VecDeque::new()),
            options,
        }
    }

    pub(crate) fn enqueue(&self, failed_write: FailedWrite) {
        self.queue
            .lock()
            .expect("DeadLetterQueue.enqueue() mutex guard poison")
            .push_back(failed_write);
    }

    pub(crate) fn depth(&self) -> usize {
        self.queue.lock().expect("DeadLetterQueue.depth() mutex guard poison").len()
    }

    fn pop_front(&self) -> Option<FailedWrite> {
        self.queue
            .lock()
            .expect("DeadLetterQueue.pop_front() mutex guard poison")
            .pop_front()
    }

    /// Replays the entries that were queued when the pass started. Entries that fail again go to
    /// the back of the queue and wait for the next pass.
    pub(crate) async fn process_once(&self) -> DrainSummary {
        let mut summary = DrainSummary::default();

        let items_to_process = self.depth();
        if items_to_process == 0 {
            return summary;
        }
        slog::info!(self.logger, "Processing {} items from dead-letter queue", items_to_process);

        for _ in 0..items_to_process {
            let mut failed_write = match self.pop_front() {
                Some(f) => f,
                None => break,
            };

            let operation_name = format!(
                "DLQ replay {} for key {} on {}",
                failed_write.kind(),
                failed_write.key(),
                failed_write.replica.address()
            );
            let result = {
                let operation = &failed_write.operation;
                let replica = &failed_write.replica;
                self.retry_executor
                    .run(&self.options.retry_policy, &operation_name, move || operation.apply(replica))
                    .await
            };

            match result {
                Ok(()) => {
                    slog::info!(
                        self.logger,
                        "Dead-letter retry succeeded for key {} on replica {} (attempt {})",
                        failed_write.key(),
                        failed_write.replica.address(),
                        failed_write.retry_count + 1
                    );
                    summary.replayed += 1;
                }
                Err(e) => {
                    failed_write.retry_count += 1;

                    if failed_write.retry_count >= self.options.max_retries {
                        slog::error!(
                            self.logger,
                            "Dead-letter retry exhausted for key {} on replica {} after {} attempts: {}. Discarding. Write is lost on this replica.",
                            failed_write.key(),
                            failed_write.replica.address(),
                            failed_write.retry_count,
                            e;
                            "Partition" => failed_write.partition_id.clone(),
                            "FailedAt" => failed_write.failed_at.to_rfc3339()
                        );
                        summary.discarded += 1;
                    } else {
                        slog::warn!(
                            self.logger,
                            "Dead-letter retry failed for key {} on replica {} (attempt {}/{}): {}. Re-enqueuing.",
                            failed_write.key(),
                            failed_write.replica.address(),
                            failed_write.retry_count,
                            self.options.max_retries,
                            e
                        );
                        self.enqueue(failed_write);
                        summary.requeued += 1;
                    }
                }
            }
        }

        summary
    }

    pub(crate) fn spawn_drain_task(queue: Arc<Self>) -> DeadLetterDrainHandle {
        let (stopper, stop_check) = stop_signal::new();
        tokio::task::spawn(Self::drain_loop(queue, stop_check));

        DeadLetterDrainHandle { _stopper: stopper }
    }

    async fn drain_loop(queue: Arc<Self>, stop_check: stop_signal::StopCheck) {
        let mut interval = time::interval(queue.options.processing_interval);
        // Skip the immediate first tick; nothing has failed yet at startup.
        interval.tick().await;

        loop {
            interval.tick().await;
            if stop_check.should_stop() {
                break;
            }
            queue.process_once().await;
        }

        slog::info!(queue.logger, "Dead-letter drain stopped with {} items queued", queue.depth());
    }
}
