mod server;
mod shutdown;

pub use server::RoutingServer;
pub use shutdown::shutdown_signal;
pub use shutdown::RoutingServerShutdownHandle;
pub use shutdown::RoutingServerShutdownSignal;
