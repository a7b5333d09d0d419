//! Unsigned variable-length integers (LEB128, 7 bits per byte).
//!
//! Used for the payload length inside a record chunk and for the length
//! prefix of framed messages. Values are written least-significant group
//! first; the high bit of every byte except the last is set.

use bytes::{Buf, BufMut};
use std::io::{self, Read};

/// Maximum number of bytes a `u64` varint can occupy.
pub const MAX_VARINT_LEN: usize = 10;

/// Returns the number of bytes [`put_uvarint`] writes for `value`.
#[inline]
#[must_use]
pub fn uvarint_len(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Appends `value` to `buf` as an unsigned varint.
pub fn put_uvarint(buf: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Decodes an unsigned varint from the front of `buf`, advancing it.
///
/// Returns `None` if `buf` ends before the varint does or if the encoding
/// overflows 64 bits. `buf` is left untouched in that case.
pub fn get_uvarint(buf: &mut impl Buf) -> Option<u64> {
    let chunk = buf.chunk();
    let mut value = 0u64;
    for (i, &byte) in chunk.iter().enumerate().take(MAX_VARINT_LEN) {
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return None;
        }
        value |= u64::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            buf.advance(i + 1);
            return Some(value);
        }
    }
    None
}

/// Reads an unsigned varint from `reader` one byte at a time.
///
/// Returns `Ok(None)` when the reader is exhausted before the first byte,
/// which callers treat as a clean end of stream. Running out of input in
/// the middle of a varint is [`io::ErrorKind::UnexpectedEof`]; an encoding
/// that overflows 64 bits is [`io::ErrorKind::InvalidData`].
///
/// On success the decoded value is returned together with the number of
/// bytes consumed.
pub fn read_uvarint<R: Read + ?Sized>(reader: &mut R) -> io::Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    let mut byte = [0u8; 1];
    for i in 0..MAX_VARINT_LEN {
        let n = loop {
            match reader.read(&mut byte) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };
        if n == 0 {
            if i == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended inside a varint",
            ));
        }
        let b = byte[0];
        if i == MAX_VARINT_LEN - 1 && b > 1 {
            break;
        }
        value |= u64::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
    }
    Err(io::Error::new(
        io::ErrorKind::InvalidData,
        "varint overflows 64 bits",
    ))
}
