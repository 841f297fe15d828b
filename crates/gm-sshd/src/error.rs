//! SSH engine error types

use gm_protocol::ProtocolError;
use thiserror::Error;

/// Boxed error from a collaborator (russh, portable-pty)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the SSH engine
///
/// Apart from [`SshdError::Bind`], none of these are fatal to the server;
/// they are handed to the error sink and only the affected connection,
/// channel, or request fails.
#[derive(Error, Debug)]
pub enum SshdError {
    /// The listener could not be bound
    #[error("failed to listen on {addr} ({source})")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The accept loop stopped
    #[error("failed to accept TCP connection ({0})")]
    Accept(#[source] std::io::Error),

    /// The SSH handshake with a client failed
    #[error("failed to establish ssh connection ({0})")]
    Handshake(#[source] BoxError),

    /// A client offered a channel type other than `session`
    #[error("unsupported channel type: {0}")]
    UnsupportedChannelType(String),

    /// Accepting a channel offer failed
    #[error("could not accept channel ({0})")]
    ChannelAccept(#[source] Box<SshdError>),

    /// A request payload could not be decoded
    #[error("unable to parse {request} request ({source})")]
    Payload {
        request: &'static str,
        #[source]
        source: ProtocolError,
    },

    /// The shell process could not be started
    #[error("unable to start shell {shell} ({source})")]
    Spawn {
        shell: String,
        #[source]
        source: BoxError,
    },

    /// A second `pty-req` arrived on a channel that already had a shell
    #[error("a shell was already started on this channel")]
    ShellAlreadyStarted,

    /// The shell's pseudo-terminal could not be used
    #[error("pty error ({0})")]
    Pty(#[source] BoxError),

    /// The peer side of a channel is gone
    #[error("channel is closed")]
    ChannelClosed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            SshdError::UnsupportedChannelType("x11".to_string()).to_string(),
            "unsupported channel type: x11"
        );

        let err = SshdError::Payload {
            request: "pty-req",
            source: ProtocolError::Truncated {
                field: "terminal type",
                needed: 4,
                remaining: 0,
            },
        };
        assert_eq!(
            err.to_string(),
            "unable to parse pty-req request (not enough bytes for terminal type: need 4, 0 remaining)"
        );

        let err = SshdError::ChannelAccept(Box::new(SshdError::ChannelClosed));
        assert_eq!(err.to_string(), "could not accept channel (channel is closed)");
    }
}
