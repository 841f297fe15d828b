//! Tunnel failure classification

use std::error::Error as StdError;
use thiserror::Error;

/// Why a tunnel could not be established
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    /// The agent executable could not be found
    #[error("forwarding agent not found")]
    MissingNgrok,

    /// The agent path exists but cannot be executed
    #[error("forwarding agent is not executable")]
    UnexecutableNgrok,

    /// The agent refused to start without an auth token
    #[error("forwarding agent has no auth token")]
    MissingAuthToken,

    /// Canceled, timed out, or failed to start for another reason
    #[error("tunnel startup canceled")]
    Canceled,

    /// The agent's terminal could not be read
    #[error("could not read the agent's output")]
    CantReadFromPty,

    /// The forwarding address had an invalid port
    #[error("could not parse the forwarded port")]
    PortParsingError,

    /// The forwarding address was not a valid URL
    #[error("could not parse the forwarding URL")]
    UrlParsingError,

    /// The agent's terminal could not be resized
    #[error("could not set the agent's window size")]
    CantSetPtyWindowSize,
}

impl FailureReason {
    /// True when the failure comes from the local setup (agent missing,
    /// not executable, not authenticated) rather than from this attempt.
    /// Retrying will not help until the user fixes their environment.
    pub fn is_misconfiguration(self) -> bool {
        matches!(
            self,
            Self::MissingNgrok | Self::UnexecutableNgrok | Self::MissingAuthToken
        )
    }
}

/// A failed tunnel attempt
#[derive(Error, Debug)]
#[error("{reason}: {detail}")]
pub struct TunnelError {
    reason: FailureReason,
    #[source]
    detail: Box<dyn StdError + Send + Sync>,
}

impl TunnelError {
    /// Create a tunnel error
    pub fn new(reason: FailureReason, detail: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }

    /// The failure class
    pub fn reason(&self) -> FailureReason {
        self.reason
    }

    /// The underlying error
    pub fn detail(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.detail.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misconfiguration_class() {
        let misconfigured = [
            FailureReason::MissingNgrok,
            FailureReason::UnexecutableNgrok,
            FailureReason::MissingAuthToken,
        ];
        let operational = [
            FailureReason::Canceled,
            FailureReason::CantReadFromPty,
            FailureReason::PortParsingError,
            FailureReason::UrlParsingError,
            FailureReason::CantSetPtyWindowSize,
        ];

        assert!(misconfigured.iter().all(|r| r.is_misconfiguration()));
        assert!(operational.iter().all(|r| !r.is_misconfiguration()));
    }

    #[test]
    fn test_error_display() {
        let err = TunnelError::new(FailureReason::PortParsingError, "Unable to parse the agent's port");
        assert_eq!(err.reason(), FailureReason::PortParsingError);
        assert_eq!(
            err.to_string(),
            "could not parse the forwarded port: Unable to parse the agent's port"
        );
        assert_eq!(err.detail().to_string(), "Unable to parse the agent's port");
    }
}
