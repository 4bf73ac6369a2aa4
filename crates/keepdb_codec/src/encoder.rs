//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;
use crate::MAX_DEPTH;

/// Bit pattern every NaN is written as.
const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

/// Encodes `value` to canonical CBOR bytes.
///
/// # Errors
///
/// Fails if the value nests deeper than [`MAX_DEPTH`].
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder writing into an owned buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
    depth: usize,
}

impl CanonicalEncoder {
    /// Creates an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder with a preallocated buffer.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            depth: 0,
        }
    }

    /// Encodes one value onto the buffer.
    ///
    /// # Errors
    ///
    /// Fails if the value nests deeper than [`MAX_DEPTH`].
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Float(f) => self.encode_float(*f),
            Value::Bytes(b) => {
                self.encode_unsigned(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.encode_unsigned(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.enter()?;
                self.encode_unsigned(4, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
                self.depth -= 1;
            }
            Value::Map(pairs) => {
                self.enter()?;
                self.encode_map(pairs)?;
                self.depth -= 1;
            }
            Value::Tagged(tag, inner) => {
                self.enter()?;
                self.encode_unsigned(6, *tag);
                self.encode(inner)?;
                self.depth -= 1;
            }
        }
        Ok(())
    }

    /// Consumes the encoder and returns the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// The bytes written so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Encoded form of a map key, used for canonical ordering.
    pub(crate) fn key_bytes(key: &Value) -> Vec<u8> {
        let mut encoder = CanonicalEncoder::new();
        // Keys deeper than the limit sort by their partial prefix.
        let _ = encoder.encode(key);
        encoder.into_bytes()
    }

    fn enter(&mut self) -> CodecResult<()> {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::encoding_failed(format!(
                "value nests deeper than {MAX_DEPTH} levels"
            )));
        }
        self.depth += 1;
        Ok(())
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_unsigned(0, n as u64);
        } else {
            // -1 encodes as 0, -2 as 1, and so on.
            self.encode_unsigned(1, (-(n + 1)) as u64);
        }
    }

    fn encode_float(&mut self, f: f64) {
        let bits = if f.is_nan() { CANONICAL_NAN } else { f.to_bits() };
        self.buffer.push(0xfb);
        self.buffer.extend_from_slice(&bits.to_be_bytes());
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_unsigned(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;
        if value < 24 {
            self.buffer.push(mt | (value as u8));
        } else if value <= u64::from(u8::MAX) {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if value <= u64::from(u16::MAX) {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u64::from(u32::MAX) {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let mut encoded: Vec<(Vec<u8>, &Value)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let mut key_encoder = CanonicalEncoder {
                buffer: Vec::new(),
                depth: self.depth,
            };
            key_encoder.encode(key)?;
            encoded.push((key_encoder.into_bytes(), value));
        }
        encoded.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
        if encoded.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(CodecError::encoding_failed("duplicate map key"));
        }

        self.encode_unsigned(5, pairs.len() as u64);
        for (key, value) in encoded {
            self.buffer.extend_from_slice(&key);
            self.encode(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc(value: &Value) -> Vec<u8> {
        to_canonical_cbor(value).unwrap()
    }

    #[test]
    fn simple_values() {
        assert_eq!(enc(&Value::Null), vec![0xf6]);
        assert_eq!(enc(&Value::Bool(false)), vec![0xf4]);
        assert_eq!(enc(&Value::Bool(true)), vec![0xf5]);
    }

    #[test]
    fn integers_use_shortest_form() {
        assert_eq!(enc(&Value::Integer(23)), vec![0x17]);
        assert_eq!(enc(&Value::Integer(24)), vec![0x18, 24]);
        assert_eq!(enc(&Value::Integer(256)), vec![0x19, 0x01, 0x00]);
        assert_eq!(enc(&Value::Integer(65_536)), vec![0x1a, 0, 1, 0, 0]);
        assert_eq!(enc(&Value::Integer(-1)), vec![0x20]);
        assert_eq!(enc(&Value::Integer(-25)), vec![0x38, 24]);
    }

    #[test]
    fn floats_are_always_double_width() {
        assert_eq!(
            enc(&Value::Float(1.0)),
            vec![0xfb, 0x3f, 0xf0, 0, 0, 0, 0, 0, 0]
        );
        let nan_a = enc(&Value::Float(f64::NAN));
        let nan_b = enc(&Value::Float(-f64::NAN));
        assert_eq!(nan_a, nan_b);
        assert_eq!(nan_a, vec![0xfb, 0x7f, 0xf8, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn tags_prefix_the_item() {
        let value = Value::Tagged(1, Box::new(Value::Integer(2)));
        assert_eq!(enc(&value), vec![0xc1, 0x02]);
        let value = Value::Tagged(1000, Box::new(Value::Null));
        assert_eq!(enc(&value), vec![0xd9, 0x03, 0xe8, 0xf6]);
    }

    #[test]
    fn map_keys_are_sorted_regardless_of_input_order() {
        let a = Value::Map(vec![
            (Value::text("zz"), Value::Integer(1)),
            (Value::text("a"), Value::Integer(2)),
        ]);
        let b = Value::Map(vec![
            (Value::text("a"), Value::Integer(2)),
            (Value::text("zz"), Value::Integer(1)),
        ]);
        assert_eq!(enc(&a), enc(&b));
        assert_eq!(enc(&a)[1..3], [0x61, b'a']);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let value = Value::Map(vec![
            (Value::text("k"), Value::Integer(1)),
            (Value::text("k"), Value::Integer(2)),
        ]);
        assert!(matches!(
            to_canonical_cbor(&value),
            Err(CodecError::EncodingFailed { .. })
        ));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut value = Value::Null;
        for _ in 0..=MAX_DEPTH {
            value = Value::Array(vec![value]);
        }
        assert!(to_canonical_cbor(&value).is_err());
    }
}
