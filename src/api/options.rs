use crate::replication::{DeadLetterOptions, RetryPolicy};
use std::collections::HashSet;
use std::convert::TryFrom;
use tokio::time::Duration;

/// One partition's replica set, by address. Roles never change at runtime.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionConfig {
    pub partition_id: String,
    pub primary_address: String,
    pub secondary_addresses: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct RoutingOptions {
    pub partitions: Vec<PartitionConfig>,
    /// How many secondaries must acknowledge a write before the client gets a reply. `None` waits
    /// for every healthy secondary; `Some(0)` replies as soon as the primary has the write.
    pub completed_secondary_writes_threshold: Option<usize>,
    pub primary_retry: Option<RetryPolicy>,
    pub secondary_retry: Option<RetryPolicy>,
    pub health_probe_interval: Option<Duration>,
    pub dead_letter: Option<DeadLetterOptions>,
    pub replica_rpc_timeout: Option<Duration>,
}

pub(super) struct RoutingOptionsValidated {
    pub partitions: Vec<PartitionConfig>,
    pub completed_secondary_writes_threshold: Option<usize>,
    pub primary_retry: RetryPolicy,
    pub secondary_retry: RetryPolicy,
    pub health_probe_interval: Duration,
    pub dead_letter: DeadLetterOptions,
    pub replica_rpc_timeout: Duration,
}

impl RoutingOptionsValidated {
    fn validate(&self) -> Result<(), String> {
        if self.partitions.is_empty() {
            return Err("At least one partition must be configured".to_string());
        }

        let mut partition_ids = HashSet::new();
        for partition in self.partitions.iter() {
            if !partition_ids.insert(partition.partition_id.as_str()) {
                return Err(format!("Duplicate partition id {}", partition.partition_id));
            }
            let addresses = std::iter::once(&partition.primary_address).chain(partition.secondary_addresses.iter());
            for address in addresses {
                if address.trim().is_empty() {
                    return Err(format!("Partition {} has an empty replica address", partition.partition_id));
                }
            }
        }

        if self.health_probe_interval == Duration::from_secs(0) {
            return Err("Health probe interval must be greater than zero".to_string());
        }
        if self.replica_rpc_timeout == Duration::from_secs(0) {
            return Err("Replica RPC timeout must be greater than zero".to_string());
        }
        self.primary_retry
            .validate()
            .map_err(|e| format!("Primary retry: {}", e))?;
        self.secondary_retry
            .validate()
            .map_err(|e| format!("Secondary retry: {}", e))?;
        self.dead_letter.validate()?;

        Ok(())
    }
}

impl TryFrom<RoutingOptions> for RoutingOptionsValidated {
    type Error = String;

    fn try_from(options: RoutingOptions) -> Result<Self, Self::Error> {
        let values = RoutingOptionsValidated {
            partitions: options.partitions,
            completed_secondary_writes_threshold: options.completed_secondary_writes_threshold,
            primary_retry: options
                .primary_retry
                .unwrap_or_else(|| RetryPolicy::new(0, Duration::from_millis(100), Duration::from_secs(5))),
            secondary_retry: options
                .secondary_retry
                .unwrap_or_else(|| RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(5))),
            health_probe_interval: options.health_probe_interval.unwrap_or(Duration::from_secs(5)),
            dead_letter: options.dead_letter.unwrap_or_default(),
            replica_rpc_timeout: options.replica_rpc_timeout.unwrap_or(Duration::from_secs(2)),
        };

        values.validate()?;
        Ok(values)
    }
}
