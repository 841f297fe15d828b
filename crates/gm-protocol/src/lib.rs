//! gm-protocol: SSH channel-request payloads for gmash
//!
//! Decodes (and encodes) the fixed binary layouts carried by SSH channel
//! requests (RFC 4254 §6), most importantly `pty-req`.

pub mod error;
pub mod payload;
pub mod pty;
pub mod request;
pub mod window;

mod property_tests;

pub use error::ProtocolError;
pub use payload::{PayloadReader, PayloadWriter};
pub use pty::PtyConfig;
pub use window::WindowChange;
