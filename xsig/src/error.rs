/*!
Common error types for the XSig library.
*/

use crate::token::SignalKind;
use thiserror::Error;

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, XSigError>;

/// Comprehensive error type for all token operations
#[derive(Error, Debug)]
pub enum XSigError {
    /// Index outside the address space of its signal kind
    #[error("{kind} index {index} is out of range: valid indices are 1..{bound} (exclusive)")]
    IndexOutOfRange {
        kind: SignalKind,
        index: i64,
        bound: u16,
    },

    /// Serial text character with no single-byte representation
    #[error("character {ch:?} at position {position} cannot be encoded as a single byte")]
    UnsupportedCharacter { ch: char, position: usize },

    /// Serial text character that would encode to the sentinel byte
    #[error("character U+00FF at position {position} collides with the serial sentinel byte")]
    SentinelCharacter { position: usize },

    /// Malformed or truncated wire data
    #[error("Decode error: {0}")]
    Decode(#[from] crate::decoder::DecodeError),

    /// Stream decoder holds more incomplete data than allowed
    #[error("Stream buffer limit exceeded: {buffered} bytes buffered, limit is {limit}")]
    BufferLimit { buffered: usize, limit: usize },

    /// Token queue receiver has been dropped
    #[error("Token queue is closed")]
    QueueClosed,

    /// Connection key already registered
    #[error("Connection already registered: {0}")]
    DuplicateConnection(String),

    /// Unparseable token literal
    #[error("Invalid token literal: {0}")]
    InvalidLiteral(String),

    /// Literal pattern compilation errors
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl XSigError {
    /// Create a new out-of-range error for the given kind
    pub fn out_of_range(kind: SignalKind, index: i64) -> Self {
        Self::IndexOutOfRange {
            kind,
            index,
            bound: kind.index_bound(),
        }
    }

    /// Create a new invalid literal error
    pub fn invalid_literal(msg: impl Into<String>) -> Self {
        Self::InvalidLiteral(msg.into())
    }

    /// Byte offset of a decode failure, if this is one
    pub fn decode_offset(&self) -> Option<usize> {
        match self {
            Self::Decode(err) => Some(err.offset()),
            _ => None,
        }
    }
}
