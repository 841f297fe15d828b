//! Error reporting

use std::error::Error;

/// Fire-and-forget destination for errors the server cannot return to a
/// caller (a failed handshake, a malformed request, a shell that would not
/// start).
///
/// Reports arrive concurrently from every connection and channel task.
/// Implementations must not block for long and must not panic.
pub trait ErrorSink: Send + Sync {
    /// Record one error
    fn report(&self, error: &(dyn Error + 'static));
}

impl<F> ErrorSink for F
where
    F: Fn(&(dyn Error + 'static)) + Send + Sync,
{
    fn report(&self, error: &(dyn Error + 'static)) {
        self(error)
    }
}

/// Sink that logs every report as a `tracing` warning
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, error: &(dyn Error + 'static)) {
        tracing::warn!("{}", error);
    }
}
