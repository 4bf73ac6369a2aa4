//! # KeepDB Codec
//!
//! Deterministic CBOR encoding for row payloads and schema metadata.
//!
//! ## Canonical Rules
//!
//! - Map keys are sorted by their encoded bytes, length first
//! - Integers and lengths use the shortest encoding
//! - Floats are always 64-bit and NaN has one bit pattern
//! - Strings are UTF-8
//! - No indefinite-length items
//!
//! Tags (major type 6) are preserved so callers can mark dates and links.
//!
//! ```
//! use keepdb_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let row = Value::map(vec![
//!     (Value::text("name"), Value::text("Ada")),
//!     (Value::text("score"), Value::Float(9.5)),
//! ]);
//! let bytes = to_canonical_cbor(&row).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), row);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;

/// Deepest nesting of arrays, maps and tags the codec accepts.
pub const MAX_DEPTH: usize = 128;

/// Types that encode to canonical CBOR.
pub trait Encode {
    /// Encodes `self`.
    fn encode(&self) -> CodecResult<Vec<u8>>;
}

/// Types that decode from CBOR.
pub trait Decode: Sized {
    /// Decodes a value from `bytes`.
    fn decode(bytes: &[u8]) -> CodecResult<Self>;
}

impl Encode for Value {
    fn encode(&self) -> CodecResult<Vec<u8>> {
        to_canonical_cbor(self)
    }
}

impl Decode for Value {
    fn decode(bytes: &[u8]) -> CodecResult<Self> {
        from_cbor(bytes)
    }
}
