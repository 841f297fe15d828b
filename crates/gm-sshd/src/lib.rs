//! gm-sshd: SSH session engine for gmash
//!
//! A deliberately small SSH server: every accepted connection may open
//! `session` channels, and each `pty-req` on such a channel starts the
//! configured shell in a fresh pseudo-terminal wired to the channel.
//!
//! The engine ([`server`], [`session`]) only sees the traits in
//! [`channel`]; [`bridge`] implements them on top of `russh`, which does
//! the transport, key exchange, and authentication.

pub mod auth;
pub mod bridge;
pub mod channel;
pub mod error;
pub mod server;
pub mod session;

#[cfg(test)]
mod testing;

pub use bridge::RusshHandshaker;
pub use error::SshdError;
pub use server::{ConnectionSupervisor, ServerHandle, SshServer};
pub use session::SessionHandler;
