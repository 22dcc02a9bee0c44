use crate::clock::TimestampSource;
use crate::health::{HealthProbeHandle, HealthView};
use crate::replica::{
    DataType, DeleteValueInput, KeyValue, ReplicaError, ReplicaHandle, ServingStatus, SetValueInput,
};
use crate::replication::{
    DeadLetterDrainHandle, DeadLetterQueue, ReplicationCoordinator, ReplicationError, ReplicationResult, WriteOp,
};
use crate::routing::{PartitionRouter, RoutingError};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Router is the client-facing API of the routing tier. Reads go to one healthy replica of the
/// key's partition; writes and deletes are replicated through the coordinator.
///
/// Dropping the router stops its health probe and dead-letter drain.
pub struct Router {
    logger: slog::Logger,
    partition_router: PartitionRouter,
    coordinator: ReplicationCoordinator,
    health: HealthView,
    dead_letters: Arc<DeadLetterQueue>,
    timestamp_source: Arc<dyn TimestampSource>,
    _health_probe: HealthProbeHandle,
    _dead_letter_drain: DeadLetterDrainHandle,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        logger: slog::Logger,
        partition_router: PartitionRouter,
        coordinator: ReplicationCoordinator,
        health: HealthView,
        dead_letters: Arc<DeadLetterQueue>,
        timestamp_source: Arc<dyn TimestampSource>,
        health_probe: HealthProbeHandle,
        dead_letter_drain: DeadLetterDrainHandle,
    ) -> Self {
        Router {
            logger: logger.new(slog::o!("Component" => "Router")),
            partition_router,
            coordinator,
            health,
            dead_letters,
            timestamp_source,
            _health_probe: health_probe,
            _dead_letter_drain: dead_letter_drain,
        }
    }

    pub async fn get_value(&self, key: &str) -> Result<KeyValue, RoutingError> {
        let partition = self.partition_router.route(key);
        let replica = partition.select_read_replica(&self.health.snapshot())?;
        slog::debug!(self.logger, "Reading key {} from {}", key, replica.address());

        replica
            .get_value(key)
            .await
            .map_err(|e| replica_failure(&replica, e))
    }

    /// Reads every partition concurrently, one replica each. The result is grouped by partition
    /// in configured order. Fails if any partition has no replica to read from.
    pub async fn get_all_values(&self) -> Result<Vec<KeyValue>, RoutingError> {
        let health = self.health.snapshot();

        let mut reads = Vec::with_capacity(self.partition_router.partitions().len());
        for partition in self.partition_router.partitions() {
            let replica = partition.select_read_replica(&health)?;
            reads.push(tokio::task::spawn(async move {
                let result = replica.get_all_values().await;
                (replica, result)
            }));
        }

        let mut values = Vec::new();
        for read in reads {
            let (replica, result) = read.await.map_err(RoutingError::ReadAborted)?;
            values.extend(result.map_err(|e| replica_failure(&replica, e))?);
        }

        Ok(values)
    }

    pub async fn set_value(
        &self,
        key: &str,
        data_type: DataType,
        value: Bytes,
    ) -> Result<ReplicationResult<KeyValue>, ReplicationError> {
        let input = SetValueInput {
            key: key.to_string(),
            data_type,
            value,
            timestamp: self.timestamp_source.now(),
        };

        let partition = self.partition_router.route(key);
        let primary = partition.primary();
        let primary_input = &input;
        self.coordinator
            .execute(
                move || primary.set_value(primary_input),
                WriteOp::Set(input.clone()),
                partition,
            )
            .await
    }

    pub async fn delete_value(&self, key: &str) -> Result<ReplicationResult<()>, ReplicationError> {
        let input = DeleteValueInput {
            key: key.to_string(),
            timestamp: self.timestamp_source.now(),
        };

        let partition = self.partition_router.route(key);
        let primary = partition.primary();
        let primary_input = &input;
        self.coordinator
            .execute(
                move || primary.delete_value(primary_input),
                WriteOp::Delete(input.clone()),
                partition,
            )
            .await
    }

    /// Last known status of every configured replica address.
    pub fn health_snapshot(&self) -> HashMap<String, ServingStatus> {
        self.health.snapshot().to_map()
    }

    /// Number of secondary writes waiting to be replayed.
    pub fn dead_letter_depth(&self) -> usize {
        self.dead_letters.depth()
    }
}

fn replica_failure(replica: &ReplicaHandle, source: ReplicaError) -> RoutingError {
    RoutingError::Replica {
        address: replica.address().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::options::{RoutingOptions, RoutingOptionsValidated};
    use crate::api::wiring::create_router;
    use crate::api::PartitionConfig;
    use crate::clock::WriteTimestamp;
    use crate::replica::test_utils::{test_logger, FixedClock, HealthScript, Script, ScriptedReplica};
    use crate::replication::RetryPolicy;
    use crate::routing::Partition;
    use std::convert::TryFrom;
    use tokio::time::Duration;

    struct ScriptedPartition {
        primary: Arc<ScriptedReplica>,
        secondaries: Vec<Arc<ScriptedReplica>>,
    }

    fn scripted_partition(index: usize, secondary_count: usize) -> ScriptedPartition {
        ScriptedPartition {
            primary: ScriptedReplica::new(&format!("primary-{}:1", index), Script::Succeed),
            secondaries: (0..secondary_count)
                .map(|s| ScriptedReplica::new(&format!("secondary-{}-{}:1", index, s), Script::Succeed))
                .collect(),
        }
    }

    fn router(scripted: &[ScriptedPartition], threshold: Option<usize>) -> Router {
        let configs = scripted
            .iter()
            .enumerate()
            .map(|(i, p)| PartitionConfig {
                partition_id: format!("p-{}", i),
                primary_address: p.primary.handle().address().to_string(),
                secondary_addresses: p.secondaries.iter().map(|s| s.handle().address().to_string()).collect(),
            })
            .collect();
        let options = RoutingOptionsValidated::try_from(RoutingOptions {
            partitions: configs,
            completed_secondary_writes_threshold: threshold,
            secondary_retry: Some(RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1))),
            health_probe_interval: Some(Duration::from_millis(20)),
            ..RoutingOptions::default()
        })
        .unwrap();

        let partitions = scripted
            .iter()
            .enumerate()
            .map(|(i, p)| {
                Partition::new(
                    format!("p-{}", i),
                    p.primary.handle(),
                    p.secondaries.iter().map(|s| s.handle()).collect(),
                )
            })
            .collect();

        create_router(
            test_logger(),
            options,
            partitions,
            Arc::new(FixedClock(WriteTimestamp::from_millis(1234))),
        )
    }

    async fn wait_for_health(router: &Router, address: &str, status: ServingStatus) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while router.health_snapshot().get(address) != Some(&status) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Timed out waiting for health probe");
    }

    #[tokio::test]
    async fn set_value_is_stamped_and_replicated() {
        let scripted = vec![scripted_partition(0, 2)];
        let router = router(&scripted, None);
        wait_for_health(&router, "secondary-0-0:1", ServingStatus::Serving).await;
        wait_for_health(&router, "secondary-0-1:1", ServingStatus::Serving).await;

        let result = router
            .set_value("k", DataType::Int, Bytes::from_static(&[0, 0, 0, 7]))
            .await
            .unwrap();

        assert_eq!(result.replicas_completed, 3);
        assert_eq!(result.replicas_total, 3);
        assert_eq!(result.primary_response.data_type, DataType::Int);
        assert_eq!(result.primary_response.value, Bytes::from_static(&[0, 0, 0, 7]));

        let primary_write = &scripted[0].primary.writes()[0];
        assert_eq!(primary_write.timestamp, WriteTimestamp::from_millis(1234));
        for secondary in scripted[0].secondaries.iter() {
            assert_eq!(secondary.writes()[0].timestamp, WriteTimestamp::from_millis(1234));
        }
    }

    #[tokio::test]
    async fn delete_value_is_stamped_and_replicated() {
        let scripted = vec![scripted_partition(0, 1)];
        let router = router(&scripted, None);
        wait_for_health(&router, "secondary-0-0:1", ServingStatus::Serving).await;

        let result = router.delete_value("k").await.unwrap();

        assert!(result.warnings.is_empty());
        assert_eq!(scripted[0].primary.deletes()[0].timestamp, WriteTimestamp::from_millis(1234));
        assert_eq!(scripted[0].secondaries[0].deletes()[0].key, "k");
    }

    #[tokio::test]
    async fn reads_go_to_a_serving_secondary() {
        let scripted = vec![scripted_partition(0, 1)];
        let router = router(&scripted, None);
        wait_for_health(&router, "secondary-0-0:1", ServingStatus::Serving).await;

        let value = router.get_value("k").await.unwrap();

        assert_eq!(value.key, "k");
        assert_eq!(value.value, Bytes::from("secondary-0-0:1"));
        assert_eq!(scripted[0].primary.data_calls(), 0);
    }

    #[tokio::test]
    async fn reads_fail_when_partition_has_no_healthy_replica() {
        let scripted = vec![scripted_partition(0, 1)];
        scripted[0].primary.set_health(HealthScript::Report(ServingStatus::NotServing));
        scripted[0].secondaries[0].set_health(HealthScript::Fail);
        let router = router(&scripted, None);
        wait_for_health(&router, "primary-0:1", ServingStatus::NotServing).await;
        wait_for_health(&router, "secondary-0-0:1", ServingStatus::NotServing).await;

        match router.get_value("k").await {
            Err(RoutingError::Unavailable { partition_id }) => assert_eq!(partition_id, "p-0"),
            other => panic!("Expected Unavailable, got {:?}", other),
        }
        assert!(router.get_all_values().await.is_err());
    }

    #[tokio::test]
    async fn replica_read_errors_name_the_replica() {
        let scripted = vec![scripted_partition(0, 0)];
        scripted[0].primary.set_script(Script::Fail);
        let router = router(&scripted, None);

        match router.get_value("k").await {
            Err(RoutingError::Replica { address, .. }) => assert_eq!(address, "primary-0:1"),
            other => panic!("Expected replica failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn get_all_values_reads_every_partition_in_order() {
        let scripted = vec![scripted_partition(0, 0), scripted_partition(1, 0), scripted_partition(2, 0)];
        let router = router(&scripted, None);

        let keys: Vec<String> = router
            .get_all_values()
            .await
            .unwrap()
            .into_iter()
            .map(|kv| kv.key)
            .collect();

        assert_eq!(
            keys,
            vec!["primary-0:1/only-key", "primary-1:1/only-key", "primary-2:1/only-key"]
        );
    }

    #[tokio::test]
    async fn failed_secondary_shows_up_in_dead_letter_depth() {
        let scripted = vec![scripted_partition(0, 1)];
        scripted[0].secondaries[0].set_script(Script::Fail);
        let router = router(&scripted, Some(0));
        wait_for_health(&router, "secondary-0-0:1", ServingStatus::Serving).await;

        let result = router.set_value("k", DataType::Null, Bytes::new()).await.unwrap();
        assert_eq!(result.replicas_completed, 1);

        tokio::time::timeout(Duration::from_secs(5), async {
            while router.dead_letter_depth() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Failed secondary write never reached the dead-letter queue");
    }
}
