//! Incremental scanning of the forwarding agent's output
//!
//! The agent redraws a status screen, so the interesting line can arrive
//! split across any number of reads. Everything read so far is kept and
//! rescanned after each chunk; the buffer is never trimmed, which bounds
//! memory only through the caller's deadline or cancellation.

use std::fmt;
use std::net::Ipv6Addr;
use std::sync::OnceLock;

use regex::bytes::Regex;

use crate::error::{FailureReason, TunnelError};

/// Printed by the agent when no auth token is installed
pub const MISSING_AUTH_TOKEN_MARKER: &str = "ERR_NGROK_302";

const MISSING_AUTH_TOKEN_HELP: &str = "Please signup at https://ngrok.com/signup or make sure your \
     authtoken is installed https://dashboard.ngrok.com";

fn forwarding_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"Forwarding[ ]+(tcp://[^ ]+)[ ].*").expect("static forwarding pattern must compile")
    })
}

/// Public endpoint opened by the agent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for PublicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Accumulates agent output and decides when it is conclusive
#[derive(Debug, Default)]
pub struct OutputScanner {
    output: Vec<u8>,
}

impl OutputScanner {
    /// Create an empty scanner
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything seen so far
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Append a chunk and rescan
    ///
    /// Returns `None` while the output is inconclusive. The auth-token
    /// failure marker wins over a forwarding line if both are present.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Result<PublicAddress, TunnelError>> {
        self.output.extend_from_slice(chunk);

        if contains(&self.output, MISSING_AUTH_TOKEN_MARKER.as_bytes()) {
            return Some(Err(TunnelError::new(
                FailureReason::MissingAuthToken,
                MISSING_AUTH_TOKEN_HELP,
            )));
        }

        let captures = forwarding_pattern().captures(&self.output)?;
        let url = String::from_utf8_lossy(&captures[1]);
        tracing::debug!("agent reported forwarding url {}", url);
        Some(parse_forwarding_url(&url))
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Split `tcp://host:port` into its parts
pub fn parse_forwarding_url(url: &str) -> Result<PublicAddress, TunnelError> {
    let invalid_url = || {
        TunnelError::new(
            FailureReason::UrlParsingError,
            format!("Unable to parse the agent's forwarding url {:?}", url),
        )
    };

    let authority = url.strip_prefix("tcp://").ok_or_else(invalid_url)?;
    let authority = authority
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    let (host, port) = match authority.strip_prefix('[') {
        Some(bracketed) => {
            let (host, rest) = bracketed.split_once(']').ok_or_else(invalid_url)?;
            host.parse::<Ipv6Addr>().map_err(|_| invalid_url())?;
            let port = match rest {
                "" => "",
                rest => rest.strip_prefix(':').ok_or_else(invalid_url)?,
            };
            (host, port)
        }
        None => {
            let (host, port) = authority.rsplit_once(':').unwrap_or((authority, ""));
            if !is_valid_host(host) {
                return Err(invalid_url());
            }
            (host, port)
        }
    };

    let port = port.parse::<u16>().map_err(|_| {
        TunnelError::new(
            FailureReason::PortParsingError,
            format!("Unable to parse the agent's port {:?}", port),
        )
    })?;

    Ok(PublicAddress {
        host: host.to_string(),
        port,
    })
}

fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}
