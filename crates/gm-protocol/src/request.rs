//! Channel and request type names used on the wire

/// The only channel type the server accepts
pub const CHANNEL_SESSION: &str = "session";

/// Allocate a pseudo-terminal
pub const PTY_REQ: &str = "pty-req";
/// Terminal dimensions changed
pub const WINDOW_CHANGE: &str = "window-change";
/// Start the user's shell
pub const SHELL: &str = "shell";
/// Run a single command
pub const EXEC: &str = "exec";
/// Set an environment variable
pub const ENV: &str = "env";
/// Start a named subsystem
pub const SUBSYSTEM: &str = "subsystem";

/// Remote port forwarding (global request)
pub const TCPIP_FORWARD: &str = "tcpip-forward";
/// Cancel remote port forwarding (global request)
pub const CANCEL_TCPIP_FORWARD: &str = "cancel-tcpip-forward";
