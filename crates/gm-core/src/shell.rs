//! Shell configuration shared by every connection

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::traits::ErrorSink;

/// The shell to start for each session and where to report failures.
///
/// Cheap to clone; every connection and channel task holds a copy.
#[derive(Clone)]
pub struct ShellConfig {
    shell: String,
    error_sink: Arc<dyn ErrorSink>,
}

impl ShellConfig {
    /// Create a shell configuration
    pub fn new(shell: impl Into<String>, error_sink: Arc<dyn ErrorSink>) -> Self {
        Self {
            shell: shell.into(),
            error_sink,
        }
    }

    /// Path of the shell executable
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// The configured error sink
    pub fn error_sink(&self) -> &Arc<dyn ErrorSink> {
        &self.error_sink
    }

    /// Hand an error to the sink
    pub fn report(&self, error: &(dyn Error + 'static)) {
        self.error_sink.report(error);
    }
}

impl fmt::Debug for ShellConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellConfig")
            .field("shell", &self.shell)
            .finish_non_exhaustive()
    }
}
