//! Byte-Level Codec
//!
//! Little-endian primitive writer/reader used by every message.
//! Strings are an `i32` byte length followed by UTF-8 bytes.

use thiserror::Error;

use crate::core::pose::{Pose, Quat, Vec3};
use super::tag::MAX_STRING_BYTES;

/// Decoding failures. All of them drop the message, never the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Empty datagram.
    #[error("empty message")]
    Empty,
    /// Tag byte not known for this direction.
    #[error("unknown message tag {0}")]
    UnknownTag(u8),
    /// Ran out of bytes.
    #[error("truncated payload: needed {needed} bytes, {remaining} left")]
    Truncated {
        /// Bytes the next field needs
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },
    /// Message larger than the wire limit.
    #[error("message of {0} bytes exceeds limit")]
    Oversized(usize),
    /// String length prefix negative or over the limit.
    #[error("invalid string length {0}")]
    InvalidStringLength(i32),
    /// String bytes are not UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    /// String too long to put on the wire.
    #[error("string of {0} bytes exceeds limit")]
    StringTooLong(usize),
    /// Repeated-record count negative or larger than the remaining bytes allow.
    #[error("invalid record count {0}")]
    InvalidCount(i32),
}

/// Check that `value` fits in a wire string.
pub fn check_str(value: &str) -> Result<(), CodecError> {
    if value.len() > MAX_STRING_BYTES {
        return Err(CodecError::StringTooLong(value.len()));
    }
    Ok(())
}

// =============================================================================
// WRITER
// =============================================================================

/// Append-only message buffer.
#[derive(Debug, Default, Clone)]
pub struct NetWriter {
    buf: Vec<u8>,
}

impl NetWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    /// Write a u8 value.
    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write an i32 value (little-endian).
    #[inline]
    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write an f32 value (little-endian).
    #[inline]
    pub fn put_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length-prefixed string.
    ///
    /// The value is written whole. Callers check it with [`check_str`]
    /// first; anything over `MAX_STRING_BYTES` is refused by the reader.
    pub fn put_str(&mut self, value: &str) {
        self.put_i32(i32::try_from(value.len()).unwrap_or(i32::MAX));
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Write a position.
    pub fn put_vec3(&mut self, value: Vec3) {
        for c in value.to_array() {
            self.put_f32(c);
        }
    }

    /// Write a rotation.
    pub fn put_quat(&mut self, value: Quat) {
        for c in value.to_array() {
            self.put_f32(c);
        }
    }

    /// Write position then rotation.
    pub fn put_pose(&mut self, value: &Pose) {
        self.put_vec3(value.position);
        self.put_quat(value.rotation);
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish and take the buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// =============================================================================
// READER
// =============================================================================

/// Cursor over a received message.
#[derive(Debug, Clone)]
pub struct NetReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NetReader<'a> {
    /// Start reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(CodecError::Truncated { needed, remaining });
        }
        let slice = &self.data[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut arr = [0u8; N];
        arr.copy_from_slice(self.take(N)?);
        Ok(arr)
    }

    /// Read a u8 value.
    pub fn get_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Read an i32 value (little-endian).
    pub fn get_i32(&mut self) -> Result<i32, CodecError> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Read an f32 value (little-endian).
    pub fn get_f32(&mut self) -> Result<f32, CodecError> {
        self.take_array().map(f32::from_le_bytes)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String, CodecError> {
        let len = self.get_i32()?;
        if len < 0 || len as usize > MAX_STRING_BYTES {
            return Err(CodecError::InvalidStringLength(len));
        }
        let bytes = self.take(len as usize)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read a position.
    pub fn get_vec3(&mut self) -> Result<Vec3, CodecError> {
        Ok(Vec3::new(self.get_f32()?, self.get_f32()?, self.get_f32()?))
    }

    /// Read a rotation.
    pub fn get_quat(&mut self) -> Result<Quat, CodecError> {
        Ok(Quat::new(self.get_f32()?, self.get_f32()?, self.get_f32()?, self.get_f32()?))
    }

    /// Read position then rotation.
    pub fn get_pose(&mut self) -> Result<Pose, CodecError> {
        Ok(Pose::new(self.get_vec3()?, self.get_quat()?))
    }

    /// Read a record count and check that `count * record_bytes` fits in
    /// what is left, so callers can allocate up front.
    pub fn get_count(&mut self, record_bytes: usize) -> Result<usize, CodecError> {
        let count = self.get_i32()?;
        if count < 0 {
            return Err(CodecError::InvalidCount(count));
        }
        let fits = (count as usize)
            .checked_mul(record_bytes)
            .is_some_and(|total| total <= self.remaining());
        if !fits {
            return Err(CodecError::InvalidCount(count));
        }
        Ok(count as usize)
    }
}
