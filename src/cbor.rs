//! CBOR helpers used by the profile codec
//!
//! Encoding goes through `ciborium` into a [`BoundedBuffer`], which accepts at
//! most `capacity` bytes and counts everything past that as overflow, so a
//! failed attempt reports exactly how many more bytes it needed.
//!
//! Decoding reads one complete `ciborium::Value` with [`read_value`], which
//! bounds nesting and rejects trailing input.

use ciborium::Value;
use std::io;
use thiserror::Error;

/// Self-describe CBOR tag (55799)
pub const SELF_DESCRIBE_TAG: u64 = 55799;

/// Nesting limit for containers and tags
pub const MAX_NESTING_DEPTH: usize = 32;

// ============================================================================
// Errors
// ============================================================================

/// Structural decode errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("input is empty")]
    Empty,

    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("malformed CBOR at offset {offset}")]
    Syntax { offset: usize },

    #[error("invalid CBOR item: {reason}")]
    Semantic {
        offset: Option<usize>,
        reason: String,
    },

    #[error("read error: {0}")]
    Io(String),

    #[error("nesting deeper than {max} levels")]
    NestingTooDeep { max: usize },

    #[error("expected {expected} for '{field}', found {found}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("array '{field}' declared {declared} element(s) but {extracted} were extracted")]
    ArrayLengthMismatch {
        field: &'static str,
        declared: u64,
        extracted: u64,
    },

    #[error("value {value} of '{field}' is out of range")]
    OutOfRange { field: &'static str, value: u64 },

    #[error("{count} trailing byte(s) after top-level item")]
    TrailingBytes { count: usize },
}

impl From<ciborium::de::Error<io::Error>> for DecodeError {
    fn from(err: ciborium::de::Error<io::Error>) -> Self {
        use ciborium::de::Error;
        match err {
            Error::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof => DecodeError::UnexpectedEof,
            Error::Io(e) => DecodeError::Io(e.to_string()),
            Error::Syntax(offset) => DecodeError::Syntax { offset },
            Error::Semantic(offset, reason) => DecodeError::Semantic { offset, reason },
            Error::RecursionLimitExceeded => DecodeError::NestingTooDeep {
                max: MAX_NESTING_DEPTH,
            },
        }
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Fixed-capacity sink for `ciborium::into_writer`
///
/// Writes never fail. Bytes that do not fit are dropped and counted in
/// [`BoundedBuffer::overflow`].
#[derive(Debug)]
pub struct BoundedBuffer {
    buf: Vec<u8>,
    capacity: usize,
    overflow: usize,
}

impl BoundedBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            capacity,
            overflow: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that did not fit
    pub fn overflow(&self) -> usize {
        self.overflow
    }

    /// Bytes actually written
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The written bytes, or `None` if anything overflowed
    pub fn into_inner(self) -> Option<Vec<u8>> {
        if self.overflow == 0 {
            Some(self.buf)
        } else {
            None
        }
    }
}

impl io::Write for BoundedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let room = if self.overflow == 0 {
            self.capacity.saturating_sub(self.buf.len())
        } else {
            0
        };
        let fit = room.min(data.len());
        self.buf.extend_from_slice(&data[..fit]);
        self.overflow += data.len() - fit;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Reads exactly one data item spanning all of `data`
pub fn read_value(data: &[u8]) -> Result<Value, DecodeError> {
    if data.is_empty() {
        return Err(DecodeError::Empty);
    }
    let mut rest = data;
    let value: Value =
        ciborium::de::from_reader_with_recursion_limit(&mut rest, MAX_NESTING_DEPTH)?;
    if !rest.is_empty() {
        return Err(DecodeError::TrailingBytes { count: rest.len() });
    }
    Ok(value)
}

/// Short name of a value's CBOR type, for error messages
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Integer(n) if i128::from(*n) < 0 => "negative integer",
        Value::Integer(_) => "unsigned integer",
        Value::Bytes(_) => "byte string",
        Value::Float(_) => "float",
        Value::Text(_) => "text string",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
        Value::Tag(..) => "tag",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        _ => "simple value",
    }
}
