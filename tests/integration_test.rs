use slog::Drain;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::time::{Duration, Instant};
use tonic::transport::Channel;
use toydb_router::{
    InMemoryReplica, PartitionConfig, RetryPolicy, RouterConfig, RoutingOptions, RoutingServer,
    RoutingServerShutdownHandle,
};

#[allow(clippy::all, dead_code)]
mod grpc {
    pub mod toydb {
        pub mod data {
            include!("../generated/toydb.data.rs");
        }
        pub mod routing {
            include!("../generated/toydb.routing.rs");
        }
    }
}

use grpc::toydb::data::DataType;
use grpc::toydb::routing as proto;
use grpc::toydb::routing::routing_client::RoutingClient;

#[tokio::test]
async fn set_get_delete_round_trip() -> Result<(), Box<dyn Error>> {
    let cluster = TestCluster::start(6100, &[3], None).await?;
    let mut client = cluster.client().await?;
    cluster.wait_for_all_serving(&mut client).await;

    let reply = client
        .set_value(proto::KeyValueRequest {
            key: "hello".to_string(),
            data_type: DataType::String as i32,
            value: b"world".to_vec(),
        })
        .await?
        .into_inner();
    assert_eq!(reply.replicas_written, 3);
    assert_eq!(reply.replicas_total, 3);
    assert!(reply.warnings.is_empty());
    for replica in cluster.replicas.iter() {
        assert_eq!(replica.get("hello").map(|kv| kv.value.to_vec()), Some(b"world".to_vec()));
    }

    let reply = client
        .get_value(proto::GetRequest {
            key: "hello".to_string(),
        })
        .await?
        .into_inner();
    assert_eq!(reply.data_type, DataType::String as i32);
    assert_eq!(reply.value, b"world".to_vec());

    let reply = client
        .delete_value(proto::DeleteRequest {
            key: "hello".to_string(),
        })
        .await?
        .into_inner();
    assert!(reply.warnings.is_empty());
    for replica in cluster.replicas.iter() {
        assert!(replica.get("hello").is_none());
    }

    let reply = client
        .get_value(proto::GetRequest {
            key: "hello".to_string(),
        })
        .await?
        .into_inner();
    assert_eq!(reply.data_type, DataType::Null as i32);
    assert!(reply.value.is_empty());

    Ok(())
}

#[tokio::test]
async fn not_serving_secondary_is_skipped() -> Result<(), Box<dyn Error>> {
    let cluster = TestCluster::start(6200, &[3], None).await?;
    let mut client = cluster.client().await?;
    cluster.wait_for_all_serving(&mut client).await;

    let drained = &cluster.replicas[2];
    drained.set_serving(false);
    wait_for_status(&mut client, &cluster.addresses[2], "NOT_SERVING").await;

    let reply = client
        .set_value(proto::KeyValueRequest {
            key: "k".to_string(),
            data_type: DataType::Int as i32,
            value: vec![0, 0, 0, 1],
        })
        .await?
        .into_inner();

    assert_eq!(reply.replicas_total, 2);
    assert_eq!(reply.replicas_written, 2);
    assert!(drained.get("k").is_none());
    assert!(cluster.replicas[1].get("k").is_some());

    Ok(())
}

#[tokio::test]
async fn partial_success_is_reported() -> Result<(), Box<dyn Error>> {
    let cluster = TestCluster::start(6300, &[3], Some(1)).await?;
    let mut client = cluster.client().await?;
    cluster.wait_for_all_serving(&mut client).await;

    // Still reports SERVING, but every write to it fails.
    let failing = &cluster.replicas[2];
    failing.set_rejecting_writes(true);

    let reply = client
        .set_value(proto::KeyValueRequest {
            key: "k".to_string(),
            data_type: DataType::Bool as i32,
            value: vec![1],
        })
        .await?
        .into_inner();

    assert_eq!(reply.replicas_total, 3);
    assert_eq!(reply.replicas_written, 2);
    assert_eq!(
        reply.warnings,
        vec!["Partial success: wrote to 2 of 3 replicas (1 replica(s) failed)".to_string()]
    );
    assert!(cluster.replicas[0].get("k").is_some());
    assert!(cluster.replicas[1].get("k").is_some());
    assert!(failing.get("k").is_none());

    Ok(())
}

#[tokio::test]
async fn get_all_values_spans_partitions() -> Result<(), Box<dyn Error>> {
    let cluster = TestCluster::start(6400, &[1, 1, 1], None).await?;
    let mut client = cluster.client().await?;
    cluster.wait_for_all_serving(&mut client).await;

    for i in 0..30 {
        client
            .set_value(proto::KeyValueRequest {
                key: format!("key-{}", i),
                data_type: DataType::Long as i32,
                value: (i as i64).to_le_bytes().to_vec(),
            })
            .await?;
    }

    let reply = client.get_all_values(proto::GetAllValuesRequest {}).await?.into_inner();
    let mut keys: Vec<String> = reply.values.into_iter().map(|kv| kv.key).collect();
    keys.sort();
    let mut expected: Vec<String> = (0..30).map(|i| format!("key-{}", i)).collect();
    expected.sort();
    assert_eq!(keys, expected);

    // Every key lives on exactly one partition.
    let stored: usize = cluster.replicas.iter().map(|r| r.len()).sum();
    assert_eq!(stored, 30);
    assert!(cluster.replicas.iter().filter(|r| !r.is_empty()).count() > 1);

    Ok(())
}

#[tokio::test]
async fn reads_fail_when_partition_is_down() -> Result<(), Box<dyn Error>> {
    let cluster = TestCluster::start(6500, &[1], None).await?;
    let mut client = cluster.client().await?;
    cluster.wait_for_all_serving(&mut client).await;

    cluster.replicas[0].set_serving(false);
    wait_for_status(&mut client, &cluster.addresses[0], "NOT_SERVING").await;

    let status = client
        .get_value(proto::GetRequest {
            key: "anything".to_string(),
        })
        .await
        .err()
        .expect("Read from a down partition should fail");
    assert_eq!(status.code(), tonic::Code::Unavailable);
    assert!(status.message().contains("partition-0"));

    Ok(())
}

/// In-memory replicas plus a routing server, all on localhost. Partition `i` gets
/// `replicas_per_partition[i]` replicas; the first of each is the primary.
struct TestCluster {
    router_addr: SocketAddr,
    addresses: Vec<String>,
    replicas: Vec<InMemoryReplica>,
    _shutdown_handles: Vec<RoutingServerShutdownHandle>,
}

impl TestCluster {
    async fn start(
        port_base: u16,
        replicas_per_partition: &[usize],
        threshold: Option<usize>,
    ) -> Result<Self, Box<dyn Error>> {
        let logger = create_root_logger_for_stdout(port_base);
        let mut shutdown_handles = Vec::new();
        let mut addresses = Vec::new();
        let mut replicas = Vec::new();
        let mut partitions = Vec::new();

        let mut next_port = port_base + 1;
        for (partition_index, replica_count) in replicas_per_partition.iter().enumerate() {
            let mut partition_addresses = Vec::new();
            for _ in 0..*replica_count {
                let address = format!("127.0.0.1:{}", next_port);
                next_port += 1;

                let replica = InMemoryReplica::new();
                let (handle, signal) = toydb_router::shutdown_signal();
                tokio::spawn(replica.clone().serve(address.parse()?, signal));
                shutdown_handles.push(handle);

                partition_addresses.push(address.clone());
                addresses.push(address);
                replicas.push(replica);
            }

            partitions.push(PartitionConfig {
                partition_id: format!("partition-{}", partition_index),
                primary_address: partition_addresses[0].clone(),
                secondary_addresses: partition_addresses[1..].to_vec(),
            });
        }

        let router = toydb_router::try_create_router(RouterConfig {
            info_logger: logger.clone(),
            options: RoutingOptions {
                partitions,
                completed_secondary_writes_threshold: threshold,
                secondary_retry: Some(RetryPolicy::new(1, Duration::from_millis(10), Duration::from_millis(50))),
                health_probe_interval: Some(Duration::from_millis(100)),
                replica_rpc_timeout: Some(Duration::from_secs(1)),
                ..RoutingOptions::default()
            },
            timestamp_source: None,
        })
        .await?;

        let router_addr: SocketAddr = format!("127.0.0.1:{}", port_base).parse()?;
        let (handle, signal) = toydb_router::shutdown_signal();
        tokio::spawn(RoutingServer::new(logger, Arc::new(router)).run(router_addr, signal));
        shutdown_handles.push(handle);

        Ok(TestCluster {
            router_addr,
            addresses,
            replicas,
            _shutdown_handles: shutdown_handles,
        })
    }

    /// The server is spawned, not awaited, so the first few connection attempts may be refused.
    async fn client(&self) -> Result<RoutingClient<Channel>, Box<dyn Error>> {
        let url = format!("http://{}", self.router_addr);
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match RoutingClient::connect(url.clone()).await {
                Ok(client) => return Ok(client),
                Err(e) if Instant::now() > deadline => return Err(e.into()),
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    }

    async fn wait_for_all_serving(&self, client: &mut RoutingClient<Channel>) {
        for address in self.addresses.iter() {
            wait_for_status(client, address, "SERVING").await;
        }
    }
}

async fn wait_for_status(client: &mut RoutingClient<Channel>, address: &str, status: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let health = client
            .get_health(proto::GetHealthRequest {})
            .await
            .expect("GetHealth failed")
            .into_inner();
        if health.replicas.get(address).map(|s| s.as_str()) == Some(status) {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "{} never reported {}: {:?}",
            address,
            status,
            health.replicas
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn create_root_logger_for_stdout(port_base: u16) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("TestCluster" => port_base))
}
