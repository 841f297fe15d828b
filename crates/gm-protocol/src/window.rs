//! `window-change` payload (RFC 4254 §6.7)

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::payload::{PayloadReader, PayloadWriter};

/// New terminal dimensions sent by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowChange {
    pub width_chars: u32,
    pub height_rows: u32,
    pub width_pixels: u32,
    pub height_pixels: u32,
}

impl WindowChange {
    /// Decode a `window-change` payload
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = PayloadReader::new(payload);

        Ok(Self {
            width_chars: reader.read_u32("width in characters")?,
            height_rows: reader.read_u32("height in rows")?,
            width_pixels: reader.read_u32("width in pixels")?,
            height_pixels: reader.read_u32("height in pixels")?,
        })
    }

    /// Encode into the wire layout
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new()
            .put_u32(self.width_chars)
            .put_u32(self.height_rows)
            .put_u32(self.width_pixels)
            .put_u32(self.height_pixels)
            .finish()
    }
}
