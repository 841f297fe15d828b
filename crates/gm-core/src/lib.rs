//! gm-core: Core abstractions and configuration for gmash
//!
//! This crate provides the configuration structures and the shell/error
//! reporting contract shared by the SSH engine, the tunnel executor, and
//! the CLI.

pub mod config;
pub mod error;
pub mod shell;
pub mod traits;

pub use error::ConfigError;
pub use shell::ShellConfig;
pub use traits::{ErrorSink, TracingErrorSink};
