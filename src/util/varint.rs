//! Variable-length integer encoding utilities.
//!
//! LEB128-style encoding: 7 bits per byte, high bit set on every byte but the
//! last. Used by the postings codec for docID and offset deltas.

use std::io::Write;

use crate::error::{HashdexError, Result};

/// Encode a u32 value using variable-length encoding.
pub fn encode_u32(value: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(5);
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        bytes.push(byte);

        if val == 0 {
            break;
        }
    }

    bytes
}

/// Decode a u32 value from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let mut result = 0u32;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 32 {
            return Err(HashdexError::codec("VarInt overflow"));
        }

        let chunk = (byte & 0x7F) as u32;
        if shift == 28 && chunk > 0x0F {
            return Err(HashdexError::codec("VarInt overflow"));
        }
        result |= chunk << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(HashdexError::codec("Incomplete VarInt"))
}

/// Write a variable-length encoded u32 to a writer.
pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> Result<usize> {
    let bytes = encode_u32(value);
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_u32() {
        let test_values = [0, 1, 127, 128, 255, 256, 16383, 16384, u32::MAX];

        for &value in &test_values {
            let encoded = encode_u32(value);
            let (decoded, bytes_read) = decode_u32(&encoded).unwrap();

            assert_eq!(value, decoded);
            assert_eq!(encoded.len(), bytes_read);
        }
    }

    #[test]
    fn test_write_u32_appends() {
        let mut buffer = vec![0xAA];
        let bytes_written = write_u32(&mut buffer, 300).unwrap();

        assert_eq!(bytes_written, 2);
        assert_eq!(buffer, vec![0xAA, 0xAC, 0x02]);
    }

    #[test]
    fn test_decode_stops_at_value_boundary() {
        let bytes = [0x05, 0x7F, 0x01];
        let (value, used) = decode_u32(&bytes).unwrap();
        assert_eq!(value, 5);
        assert_eq!(used, 1);
    }

    #[test]
    fn test_encoding_efficiency() {
        assert_eq!(encode_u32(0).len(), 1);
        assert_eq!(encode_u32(127).len(), 1);
        assert_eq!(encode_u32(128).len(), 2);
        assert_eq!(encode_u32(16383).len(), 2);
        assert_eq!(encode_u32(16384).len(), 3);
        assert_eq!(encode_u32(u32::MAX).len(), 5);
    }

    #[test]
    fn test_incomplete_varint() {
        let incomplete = vec![0x80]; // Continuation bit set but no more data
        assert!(decode_u32(&incomplete).is_err());
        assert!(decode_u32(&[]).is_err());
    }

    #[test]
    fn test_overflow() {
        let overflow_data = vec![0xFF; 10]; // Too many bytes for u32
        assert!(decode_u32(&overflow_data).is_err());

        // Fifth byte carrying more than the 4 remaining bits.
        let too_wide = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x1F];
        assert!(decode_u32(&too_wide).is_err());
    }
}
