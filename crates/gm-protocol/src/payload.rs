//! Field parsers for fixed-layout SSH payloads
//!
//! SSH request payloads are a sequence of typed fields (RFC 4251 §5). A
//! message layout is decoded by composing the field readers below in order:
//! each one consumes its bytes from the front of the remaining input, and the
//! first field that does not fit aborts the whole message through `?`.
//!
//! ```
//! use gm_protocol::{PayloadReader, ProtocolError};
//!
//! fn parse(payload: &[u8]) -> Result<(Vec<u8>, u32), ProtocolError> {
//!     let mut reader = PayloadReader::new(payload);
//!     let name = reader.read_bytes("name")?.to_vec();
//!     let value = reader.read_u32("value")?;
//!     Ok((name, value))
//! }
//!
//! assert_eq!(parse(&[0, 0, 0, 1, b'x', 0, 0, 0, 7]).unwrap(), (b"x".to_vec(), 7));
//! assert!(parse(&[0, 0, 0, 1, b'x', 0, 0]).is_err());
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

/// Cursor over an SSH payload that hands out typed fields front to back
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    remaining: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    /// Start reading at the beginning of `payload`
    pub fn new(payload: &'a [u8]) -> Self {
        Self { remaining: payload }
    }

    /// Number of bytes not consumed yet
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Read a big-endian `uint32`
    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, ProtocolError> {
        self.ensure(field, 4)?;
        Ok(self.remaining.get_u32())
    }

    /// Read an SSH `string`: a `uint32` length followed by that many bytes
    pub fn read_bytes(&mut self, field: &'static str) -> Result<&'a [u8], ProtocolError> {
        let len = self.read_u32(field)? as usize;
        self.ensure(field, len)?;
        let (value, rest) = self.remaining.split_at(len);
        self.remaining = rest;
        Ok(value)
    }

    /// Consume everything that is left
    pub fn read_rest(&mut self) -> Bytes {
        let rest = Bytes::copy_from_slice(self.remaining);
        self.remaining = &[];
        rest
    }

    fn ensure(&self, field: &'static str, needed: usize) -> Result<(), ProtocolError> {
        if self.remaining.len() < needed {
            return Err(ProtocolError::Truncated {
                field,
                needed,
                remaining: self.remaining.len(),
            });
        }
        Ok(())
    }
}

/// Builder for SSH payloads, the inverse of [`PayloadReader`]
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Create an empty payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a big-endian `uint32`
    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    /// Append a length-prefixed `string`
    pub fn put_bytes(&mut self, value: &[u8]) -> &mut Self {
        self.buf.reserve(4 + value.len());
        self.buf.put_u32(value.len() as u32);
        self.buf.put_slice(value);
        self
    }

    /// Append raw bytes with no length prefix
    pub fn put_raw(&mut self, value: &[u8]) -> &mut Self {
        self.buf.put_slice(value);
        self
    }

    /// Finish the payload
    pub fn finish(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32_big_endian() {
        let mut reader = PayloadReader::new(&[0x00, 0x00, 0x01, 0x02, 0xff]);
        assert_eq!(reader.read_u32("value").unwrap(), 258);
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_read_u32_not_enough_bytes() {
        let mut reader = PayloadReader::new(&[0x00, 0x01, 0x02]);
        assert_eq!(
            reader.read_u32("width"),
            Err(ProtocolError::Truncated {
                field: "width",
                needed: 4,
                remaining: 3,
            })
        );
    }

    #[test]
    fn test_read_bytes() {
        let mut reader = PayloadReader::new(b"\x00\x00\x00\x05xterm\x00");
        assert_eq!(reader.read_bytes("term").unwrap(), b"xterm");
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_read_bytes_length_exceeds_payload() {
        let mut reader = PayloadReader::new(b"\x00\x00\x00\x09xterm");
        let err = reader.read_bytes("term").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::Truncated {
                field: "term",
                needed: 9,
                remaining: 5,
            }
        );
        assert_eq!(
            err.to_string(),
            "not enough bytes for term: need 9, 5 remaining"
        );
    }

    #[test]
    fn test_read_rest_consumes_everything() {
        let mut reader = PayloadReader::new(&[1, 2, 3]);
        assert_eq!(&reader.read_rest()[..], &[1, 2, 3]);
        assert_eq!(reader.remaining(), 0);
        assert!(reader.read_rest().is_empty());
    }

    #[test]
    fn test_writer_matches_reader_layout() {
        let payload = PayloadWriter::new()
            .put_bytes(b"vt100")
            .put_u32(42)
            .put_raw(&[9, 9])
            .finish();

        let mut reader = PayloadReader::new(&payload);
        assert_eq!(reader.read_bytes("term").unwrap(), b"vt100");
        assert_eq!(reader.read_u32("n").unwrap(), 42);
        assert_eq!(&reader.read_rest()[..], &[9, 9]);
    }
}
