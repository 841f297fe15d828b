//! Session channels: one shell per channel, wired through a pty

mod handler;
mod pty;

pub use handler::SessionHandler;
pub use pty::{NativePtySpawner, PtySpawner, ShellProcess};
