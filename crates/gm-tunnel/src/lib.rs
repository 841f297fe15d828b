//! gm-tunnel: Public tunnel for a gmash server
//!
//! Runs an external forwarding agent (`<agent> tcp <port>`) inside a
//! pseudo-terminal, watches what it prints, and turns that into either the
//! public `host:port` the agent opened or a classified failure.

pub mod error;
pub mod executor;
pub mod scan;
#[cfg(unix)]
pub mod winsize;

pub use error::{FailureReason, TunnelError};
pub use executor::{Tunnel, TunnelExecutor, TunnelOutcome};
pub use scan::{OutputScanner, PublicAddress};
