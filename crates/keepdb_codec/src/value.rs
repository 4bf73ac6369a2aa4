//! Dynamic CBOR value type.

use crate::encoder::CanonicalEncoder;

/// A dynamic CBOR value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer over the full `i64` range.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// Byte string.
    Bytes(Vec<u8>),
    /// UTF-8 text.
    Text(String),
    /// Array.
    Array(Vec<Value>),
    /// Map; [`Value::map`] keeps keys in canonical order.
    Map(Vec<(Value, Value)>),
    /// Tagged item (major type 6).
    Tagged(u64, Box<Value>),
}

impl Value {
    /// Builds a map with keys sorted in canonical order.
    pub fn map(mut pairs: Vec<(Value, Value)>) -> Self {
        pairs.sort_by_cached_key(|(k, _)| {
            let bytes = CanonicalEncoder::key_bytes(k);
            (bytes.len(), bytes)
        });
        Value::Map(pairs)
    }

    /// Shorthand for a text value.
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The float, if this is one.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// The bytes, if this is a byte string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The text, if this is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The items, if this is an array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The pairs, if this is a map.
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// The tag and inner value, if this is tagged.
    pub fn as_tagged(&self) -> Option<(u64, &Value)> {
        match self {
            Value::Tagged(tag, inner) => Some((*tag, inner)),
            _ => None,
        }
    }

    /// Looks up a text key in a map.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_sorts_shorter_keys_first() {
        let value = Value::map(vec![
            (Value::text("bb"), Value::Integer(2)),
            (Value::text("a"), Value::Integer(1)),
            (Value::text("c"), Value::Integer(3)),
        ]);
        let keys: Vec<_> = value
            .as_map()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_text().unwrap())
            .collect();
        assert_eq!(keys, vec!["a", "c", "bb"]);
    }

    #[test]
    fn get_finds_text_keys() {
        let value = Value::map(vec![(Value::text("name"), Value::text("Ada"))]);
        assert_eq!(value.get("name"), Some(&Value::text("Ada")));
        assert_eq!(value.get("missing"), None);
        assert_eq!(Value::Null.get("name"), None);
    }

    #[test]
    fn tagged_accessor() {
        let value = Value::Tagged(1, Box::new(Value::Integer(5)));
        assert_eq!(value.as_tagged(), Some((1, &Value::Integer(5))));
        assert_eq!(Value::Integer(5).as_tagged(), None);
    }
}
