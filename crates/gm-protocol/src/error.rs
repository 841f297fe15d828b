//! Protocol error types

use thiserror::Error;

/// Errors that can occur while decoding a channel-request payload
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A fixed-width or length-prefixed field ran past the end of the payload
    #[error("not enough bytes for {field}: need {needed}, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
}
