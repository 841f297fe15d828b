//! SSH server implementation

mod connection;
mod dispatcher;
mod listener;

pub use connection::{
    ConnectionSupervisor, EstablishedConnection, Handshaker, RefuseGlobalRequests,
    RequestDiscarder,
};
pub use dispatcher::{ChannelDispatcher, ChannelProcessor};
pub use listener::{normalize_bind_address, ServerHandle, SshServer};
