//! SSH server implementation

mod channel;
mod forwarding;
mod handler;
mod listener;
mod shutdown;

pub use channel::RusshClient;
pub use forwarding::{
    bind_remote, forward_local, spawn_remote_forward, splice, tcp_port, AllowAll,
    ForwardDirection, ForwardRequest, ForwardingPolicy,
};
pub use handler::{ConnectionHandler, ServerConfig};
pub use listener::{load_or_generate_host_key, SshServer};
pub use shutdown::ShutdownCoordinator;
