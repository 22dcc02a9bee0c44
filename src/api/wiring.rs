use crate::api::options::{RoutingOptions, RoutingOptionsValidated};
use crate::api::router::Router;
use crate::clock::{SkewCorrectedClock, TimestampSource};
use crate::health::{health_table, HealthProbe};
use crate::replica::ReplicaError;
use crate::replication::{DeadLetterQueue, ReplicationCoordinator};
use crate::routing::{Partition, PartitionRouter};
use std::convert::TryFrom;
use std::sync::Arc;

pub struct RouterConfig {
    pub info_logger: slog::Logger,
    pub options: RoutingOptions,
    /// Source of write timestamps. Defaults to the local wall clock with no skew correction.
    pub timestamp_source: Option<Arc<dyn TimestampSource>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RouterCreationError {
    #[error("Illegal options for configuring router: {0}")]
    IllegalOptions(String),
    #[error("Invalid replica address")]
    InvalidReplicaAddress(#[source] ReplicaError),
}

/// Validates the options, connects (lazily) to every configured replica, and starts the health
/// probe and dead-letter drain. Must be called from within a tokio runtime.
pub async fn try_create_router(config: RouterConfig) -> Result<Router, RouterCreationError> {
    let root_logger = config.info_logger;

    let options =
        RoutingOptionsValidated::try_from(config.options).map_err(RouterCreationError::IllegalOptions)?;

    let partitions = options
        .partitions
        .iter()
        .map(|partition_config| Partition::connect_lazy(partition_config, options.replica_rpc_timeout))
        .collect::<Result<Vec<_>, _>>()
        .map_err(RouterCreationError::InvalidReplicaAddress)?;

    let timestamp_source = config
        .timestamp_source
        .unwrap_or_else(|| Arc::new(SkewCorrectedClock::new()));

    Ok(create_router(root_logger, options, partitions, timestamp_source))
}

pub(super) fn create_router(
    root_logger: slog::Logger,
    options: RoutingOptionsValidated,
    partitions: Vec<Partition>,
    timestamp_source: Arc<dyn TimestampSource>,
) -> Router {
    let replicas: Vec<_> = partitions
        .iter()
        .flat_map(|partition| std::iter::once(partition.primary()).chain(partition.secondaries().iter()))
        .cloned()
        .collect();

    let (health_writer, health_view) = health_table(replicas.iter().map(|replica| replica.address()));
    let health_probe = HealthProbe::new(
        root_logger.clone(),
        replicas,
        options.health_probe_interval,
        health_writer,
    )
    .spawn_probe_task();

    let dead_letters = Arc::new(DeadLetterQueue::new(root_logger.clone(), options.dead_letter));
    let dead_letter_drain = DeadLetterQueue::spawn_drain_task(dead_letters.clone());

    let coordinator = ReplicationCoordinator::new(
        root_logger.clone(),
        options.completed_secondary_writes_threshold,
        options.primary_retry,
        options.secondary_retry,
        health_view.clone(),
        dead_letters.clone(),
    );

    slog::info!(
        root_logger,
        "Routing across {} partitions with secondary write threshold {:?}",
        partitions.len(),
        options.completed_secondary_writes_threshold
    );
    let partition_router = PartitionRouter::new(root_logger.clone(), partitions);

    Router::new(
        root_logger,
        partition_router,
        coordinator,
        health_view,
        dead_letters,
        timestamp_source,
        health_probe,
        dead_letter_drain,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::PartitionConfig;
    use crate::replica::test_utils::test_logger;

    fn config(partitions: Vec<PartitionConfig>) -> RouterConfig {
        RouterConfig {
            info_logger: test_logger(),
            options: RoutingOptions {
                partitions,
                ..RoutingOptions::default()
            },
            timestamp_source: None,
        }
    }

    #[tokio::test]
    async fn unreachable_replicas_do_not_block_creation() {
        let router = try_create_router(config(vec![PartitionConfig {
            partition_id: "p-0".to_string(),
            primary_address: "127.0.0.1:1".to_string(),
            secondary_addresses: vec!["127.0.0.1:2".to_string()],
        }]))
        .await
        .unwrap();

        let health = router.health_snapshot();
        assert_eq!(health.len(), 2);
        assert_eq!(router.dead_letter_depth(), 0);
    }

    #[tokio::test]
    async fn illegal_options_are_reported() {
        match try_create_router(config(vec![])).await {
            Err(RouterCreationError::IllegalOptions(_)) => {}
            Err(e) => panic!("Unexpected error {:?}", e),
            Ok(_) => panic!("Router created without partitions"),
        }
    }

    #[tokio::test]
    async fn malformed_addresses_are_reported() {
        let result = try_create_router(config(vec![PartitionConfig {
            partition_id: "p-0".to_string(),
            primary_address: "not a uri".to_string(),
            secondary_addresses: vec![],
        }]))
        .await;

        match result {
            Err(RouterCreationError::InvalidReplicaAddress(_)) => {}
            Err(e) => panic!("Unexpected error {:?}", e),
            Ok(_) => panic!("Router created with a malformed address"),
        }
    }
}
