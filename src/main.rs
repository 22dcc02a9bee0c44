use slog::Drain;
use std::env;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use toydb_router::{InMemoryReplica, PartitionConfig, RouterConfig, RoutingOptions, RoutingServer};

const ROUTER_ADDR: &str = "127.0.0.1:5000";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let logger = create_root_logger_for_stdout();
    let partitions = fake_partition_config();

    // Handles are held until exit; dropping them stops the local replicas.
    let mut local_replica_handles = Vec::new();
    if env::args().any(|arg| arg == "--with-local-replicas") {
        for address in partitions
            .iter()
            .flat_map(|p| std::iter::once(&p.primary_address).chain(p.secondary_addresses.iter()))
        {
            let socket_addr: SocketAddr = address.parse()?;
            let (handle, signal) = toydb_router::shutdown_signal();
            let replica_logger = logger.new(slog::o!("LocalReplica" => address.clone()));
            tokio::spawn(async move {
                if let Err(e) = InMemoryReplica::new().serve(socket_addr, signal).await {
                    slog::error!(replica_logger, "Local replica exited: {}", e);
                }
            });
            local_replica_handles.push(handle);
        }
    }

    let router = toydb_router::try_create_router(RouterConfig {
        info_logger: logger.clone(),
        options: RoutingOptions {
            partitions,
            completed_secondary_writes_threshold: Some(1),
            ..RoutingOptions::default()
        },
        timestamp_source: None,
    })
    .await?;

    let (server_shutdown_handle, server_shutdown_signal) = toydb_router::shutdown_signal();
    let server = RoutingServer::new(logger.clone(), Arc::new(router));
    let server_task = tokio::spawn(server.run(ROUTER_ADDR.parse()?, server_shutdown_signal));

    tokio::signal::ctrl_c().await?;
    slog::info!(logger, "Received ctrl-c, shutting down");
    server_shutdown_handle.shutdown();
    server_task.await??;
    drop(local_replica_handles);

    Ok(())
}

fn fake_partition_config() -> Vec<PartitionConfig> {
    vec![
        PartitionConfig {
            partition_id: "partition-0".to_string(),
            primary_address: "127.0.0.1:5001".to_string(),
            secondary_addresses: vec!["127.0.0.1:5002".to_string(), "127.0.0.1:5003".to_string()],
        },
        PartitionConfig {
            partition_id: "partition-1".to_string(),
            primary_address: "127.0.0.1:5004".to_string(),
            secondary_addresses: vec!["127.0.0.1:5005".to_string(), "127.0.0.1:5006".to_string()],
        },
    ]
}

fn create_root_logger_for_stdout() -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Service" => "toydb-router"))
}
