//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A value could not be encoded.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// What went wrong.
        message: String,
    },

    /// Indefinite-length items are not accepted.
    #[error("indefinite-length items are forbidden")]
    IndefiniteLengthForbidden,

    /// A text string was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// Input ended in the middle of an item.
    #[error("unexpected end of input")]
    UnexpectedEof,

    /// Input was well-formed CBOR but not canonical, or malformed.
    #[error("invalid CBOR structure: {message}")]
    InvalidStructure {
        /// What went wrong.
        message: String,
    },

    /// A CBOR construct this codec does not model.
    #[error("unsupported CBOR type: {type_name}")]
    UnsupportedType {
        /// The construct that was found.
        type_name: String,
    },

    /// A declared length exceeds the decoder limits.
    #[error("size limit exceeded: claimed {claimed}, max {max_allowed}")]
    SizeLimitExceeded {
        /// Length claimed by the input.
        claimed: u64,
        /// Largest accepted length.
        max_allowed: u64,
    },

    /// Nesting exceeds [`crate::MAX_DEPTH`].
    #[error("nesting deeper than {max} levels")]
    TooDeep {
        /// The depth limit.
        max: usize,
    },

    /// Bytes remained after the top-level item.
    #[error("{count} trailing bytes after value")]
    TrailingBytes {
        /// Number of unread bytes.
        count: usize,
    },
}

impl CodecError {
    /// Creates an [`CodecError::EncodingFailed`].
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates an [`CodecError::InvalidStructure`].
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an [`CodecError::UnsupportedType`].
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}
