//! `pty-req` payload (RFC 4254 §6.2)
//!
//! ```text
//! string    TERM environment variable value (e.g., vt100)
//! uint32    terminal width, characters (e.g., 80)
//! uint32    terminal height, rows (e.g., 24)
//! uint32    terminal width, pixels (e.g., 640)
//! uint32    terminal height, pixels (e.g., 480)
//! string    encoded terminal modes
//! ```
//!
//! The terminal modes are kept opaque: everything after the pixel height is
//! stored as-is, length prefix included.

use std::borrow::Cow;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::payload::{PayloadReader, PayloadWriter};

/// Opcode that terminates an encoded terminal-mode list
pub const TTY_OP_END: u8 = 0;

/// Pseudo-terminal parameters requested by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyConfig {
    /// Terminal type as sent; the wire type is a byte string
    pub term: Bytes,
    /// Width in character cells
    pub width_chars: u32,
    /// Height in rows
    pub height_rows: u32,
    /// Width in pixels
    pub width_pixels: u32,
    /// Height in pixels
    pub height_pixels: u32,
    /// Encoded terminal modes, unparsed
    pub terminal_modes: Bytes,
}

impl PtyConfig {
    /// Decode a `pty-req` payload
    ///
    /// Fails on the first field that does not fit; no partial configuration
    /// is ever returned.
    pub fn parse(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = PayloadReader::new(payload);

        let term = Bytes::copy_from_slice(reader.read_bytes("terminal type")?);
        let width_chars = reader.read_u32("width in characters")?;
        let height_rows = reader.read_u32("height in rows")?;
        let width_pixels = reader.read_u32("width in pixels")?;
        let height_pixels = reader.read_u32("height in pixels")?;
        let terminal_modes = reader.read_rest();

        Ok(Self {
            term,
            width_chars,
            height_rows,
            width_pixels,
            height_pixels,
            terminal_modes,
        })
    }

    /// Terminal type for the shell's `TERM`, with invalid UTF-8 replaced
    pub fn term_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.term)
    }

    /// Encode back into the wire layout
    pub fn encode(&self) -> Bytes {
        PayloadWriter::new()
            .put_bytes(&self.term)
            .put_u32(self.width_chars)
            .put_u32(self.height_rows)
            .put_u32(self.width_pixels)
            .put_u32(self.height_pixels)
            .put_raw(&self.terminal_modes)
            .finish()
    }
}

/// Encode `(opcode, value)` terminal modes as an SSH `string`
///
/// Each mode is one opcode byte followed by a `uint32`, and the list is
/// closed with [`TTY_OP_END`]. `TTY_OP_END` entries in `modes` are skipped.
pub fn encode_terminal_modes<I>(modes: I) -> Bytes
where
    I: IntoIterator<Item = (u8, u32)>,
{
    let mut encoded = BytesMut::new();
    for (opcode, value) in modes {
        if opcode == TTY_OP_END {
            continue;
        }
        encoded.put_u8(opcode);
        encoded.put_u32(value);
    }
    encoded.put_u8(TTY_OP_END);

    PayloadWriter::new().put_bytes(&encoded).finish()
}
