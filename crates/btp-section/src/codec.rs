//! Canonical binary encoding for consensus inputs.
//!
//! Two item kinds: byte strings and lists. Items are positional; there are no
//! field names on the wire. Integers travel as byte strings holding their
//! minimal-width big-endian two's-complement representation (zero is the
//! empty string). Every value has exactly one encoding; the decoder rejects
//! anything non-canonical.
//!
//! Header rules:
//! - byte string of length 1 with value `< 0x80`: the byte itself
//! - byte string of length `< 56`: `0x80 + len`, payload
//! - byte string of length `>= 56`: `0xb7 + len_of_len`, big-endian len, payload
//! - list with payload length `< 56`: `0xc0 + len`, concatenated items
//! - list with payload length `>= 56`: `0xf7 + len_of_len`, big-endian len, items

use thiserror::Error;

/// Error type for decoding canonical bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("expected a byte string, found a list")]
    ExpectedBytes,
    #[error("expected a list, found a byte string")]
    ExpectedList,
    #[error("non-canonical encoding: {0}")]
    NonCanonical(&'static str),
    #[error("integer does not fit the target width")]
    IntegerOverflow,
    #[error("trailing bytes after value")]
    TrailingBytes,
}

const SHORT_STRING: u8 = 0x80;
const LONG_STRING: u8 = 0xb7;
const SHORT_LIST: u8 = 0xc0;
const LONG_LIST: u8 = 0xf7;
const SHORT_LIMIT: usize = 56;

/// Minimal-width big-endian two's-complement bytes of `v`; empty for zero.
pub fn int_to_bytes(v: i64) -> Vec<u8> {
    if v == 0 {
        return Vec::new();
    }
    let be = v.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let redundant = match be[start] {
            0x00 => be[start + 1] & 0x80 == 0,
            0xff => be[start + 1] & 0x80 != 0,
            _ => false,
        };
        if !redundant {
            break;
        }
        start += 1;
    }
    be[start..].to_vec()
}

/// Inverse of [`int_to_bytes`] with canonicality checks.
pub fn int_from_bytes(b: &[u8]) -> Result<i64, CodecError> {
    if b.is_empty() {
        return Ok(0);
    }
    if b.len() > 8 {
        return Err(CodecError::IntegerOverflow);
    }
    let non_minimal = match b[0] {
        0x00 => b.len() == 1 || b[1] & 0x80 == 0,
        0xff => b.len() > 1 && b[1] & 0x80 != 0,
        _ => false,
    };
    if non_minimal {
        return Err(CodecError::NonCanonical("integer has redundant leading byte"));
    }
    let mut v: i64 = if b[0] & 0x80 != 0 { -1 } else { 0 };
    for &byte in b {
        v = (v << 8) | i64::from(byte);
    }
    Ok(v)
}

fn write_header(out: &mut Vec<u8>, base: u8, len: usize) {
    if len < SHORT_LIMIT {
        out.push(base + len as u8);
    } else {
        let len_be = (len as u64).to_be_bytes();
        let skip = len_be.iter().take_while(|&&b| b == 0).count();
        out.push(base + 55 + (8 - skip) as u8);
        out.extend_from_slice(&len_be[skip..]);
    }
}

/// Builds the payload of one list, then wraps it with the list header.
///
/// Nested lists are built with their own encoder and attached with
/// [`ListEncoder::write_list`].
#[derive(Debug, Default)]
pub struct ListEncoder {
    payload: Vec<u8>,
}

impl ListEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_bytes(&mut self, b: &[u8]) -> &mut Self {
        if b.len() == 1 && b[0] < SHORT_STRING {
            self.payload.push(b[0]);
        } else {
            write_header(&mut self.payload, SHORT_STRING, b.len());
            self.payload.extend_from_slice(b);
        }
        self
    }

    pub fn write_int(&mut self, v: i64) -> &mut Self {
        let b = int_to_bytes(v);
        self.write_bytes(&b)
    }

    pub fn write_list(&mut self, inner: ListEncoder) -> &mut Self {
        self.payload.extend_from_slice(&inner.encode());
        self
    }

    /// Finish the list and return its full encoding, header included.
    pub fn encode(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 9);
        write_header(&mut out, SHORT_LIST, self.payload.len());
        out.extend_from_slice(&self.payload);
        out
    }
}

enum Header {
    Bytes { offset: usize, len: usize },
    List { offset: usize, len: usize },
}

/// Positional reader over one list payload (or a top-level item sequence).
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn has_more(&self) -> bool {
        self.pos < self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.data.len() - self.pos < n {
            return Err(CodecError::UnexpectedEnd);
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_long_len(&mut self, len_of_len: usize) -> Result<usize, CodecError> {
        let len_bytes = self.take(len_of_len)?;
        if len_bytes[0] == 0 {
            return Err(CodecError::NonCanonical("length has leading zero byte"));
        }
        let mut len: u64 = 0;
        for &b in len_bytes {
            len = (len << 8) | u64::from(b);
        }
        let len = usize::try_from(len).map_err(|_| CodecError::IntegerOverflow)?;
        if len < SHORT_LIMIT {
            return Err(CodecError::NonCanonical("long form used for short length"));
        }
        Ok(len)
    }

    fn read_header(&mut self) -> Result<Header, CodecError> {
        let b0 = self.take(1)?[0];
        match b0 {
            0x00..=0x7f => Ok(Header::Bytes {
                offset: self.pos - 1,
                len: 1,
            }),
            0x80..=0xb7 => {
                let len = usize::from(b0 - SHORT_STRING);
                let offset = self.pos;
                self.take(len)?;
                if len == 1 && self.data[offset] < SHORT_STRING {
                    return Err(CodecError::NonCanonical("single byte below 0x80 must be bare"));
                }
                Ok(Header::Bytes { offset, len })
            }
            0xb8..=0xbf => {
                let len = self.read_long_len(usize::from(b0 - LONG_STRING))?;
                let offset = self.pos;
                self.take(len)?;
                Ok(Header::Bytes { offset, len })
            }
            0xc0..=0xf7 => {
                let len = usize::from(b0 - SHORT_LIST);
                let offset = self.pos;
                self.take(len)?;
                Ok(Header::List { offset, len })
            }
            0xf8..=0xff => {
                let len = self.read_long_len(usize::from(b0 - LONG_LIST))?;
                let offset = self.pos;
                self.take(len)?;
                Ok(Header::List { offset, len })
            }
        }
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8], CodecError> {
        match self.read_header()? {
            Header::Bytes { offset, len } => Ok(&self.data[offset..offset + len]),
            Header::List { .. } => Err(CodecError::ExpectedBytes),
        }
    }

    pub fn read_int(&mut self) -> Result<i64, CodecError> {
        int_from_bytes(self.read_bytes()?)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        i32::try_from(self.read_int()?).map_err(|_| CodecError::IntegerOverflow)
    }

    /// Read one list item and return a decoder over its payload.
    pub fn read_list(&mut self) -> Result<Decoder<'a>, CodecError> {
        match self.read_header()? {
            Header::List { offset, len } => Ok(Decoder::new(&self.data[offset..offset + len])),
            Header::Bytes { .. } => Err(CodecError::ExpectedList),
        }
    }

    /// Ensure every byte of the payload has been consumed.
    pub fn expect_end(&self) -> Result<(), CodecError> {
        if self.has_more() {
            Err(CodecError::TrailingBytes)
        } else {
            Ok(())
        }
    }
}
