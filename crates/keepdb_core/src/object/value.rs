//! Stored values and create inputs.

use crate::object::handle::Object;
use crate::types::ObjectKey;

/// A stored property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// Binary data.
    Data(Vec<u8>),
    /// Link to a row of the target table.
    Link(ObjectKey),
    /// Ordered links to rows of the target table.
    List(Vec<ObjectKey>),
}

impl Value {
    /// Whether this is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer, if this is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Either float width widened to `f64`.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// The string, if this is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The date in milliseconds, if this is one.
    #[must_use]
    pub fn as_date(&self) -> Option<i64> {
        match self {
            Value::Date(ms) => Some(*ms),
            _ => None,
        }
    }

    /// The bytes, if this is binary data.
    #[must_use]
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Value::Data(d) => Some(d),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Data(_) => "data",
            Value::Link(_) => "link",
            Value::List(_) => "list",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Data(v)
    }
}

/// Whether `create` may overwrite an object with the same primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateMode {
    /// A primary-key collision fails with `DuplicateKey`.
    #[default]
    Disallowed,
    /// A primary-key collision merges the supplied values into the existing object.
    Upsert,
}

/// A property value as supplied to `create`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Input {
    /// Not supplied; the property keeps its default or prior value.
    #[default]
    Undefined,
    /// Clears an optional property or link.
    Null,
    /// A plain value.
    Value(Value),
    /// An existing object, for link properties.
    Object(Object),
    /// Values for a linked object created in the same call.
    Nested(Values),
    /// Items of a list property.
    List(Vec<Input>),
}

impl Input {
    /// Whether this input leaves the property untouched.
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Input::Undefined)
    }
}

macro_rules! input_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Input {
                fn from(v: $ty) -> Self {
                    Input::Value(v.into())
                }
            }
        )*
    };
}

input_from_value!(bool, i64, i32, f32, f64, &str, String, Vec<u8>);

impl From<Value> for Input {
    fn from(v: Value) -> Self {
        Input::Value(v)
    }
}

impl From<Object> for Input {
    fn from(object: Object) -> Self {
        Input::Object(object)
    }
}

impl From<&Object> for Input {
    fn from(object: &Object) -> Self {
        Input::Object(object.clone())
    }
}

impl From<Values> for Input {
    fn from(values: Values) -> Self {
        Input::Nested(values)
    }
}

/// The values argument of `create`.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    /// Property name to input, in the order supplied.
    Named(Vec<(String, Input)>),
    /// Inputs in declared property order.
    Positional(Vec<Input>),
}

impl Default for Values {
    fn default() -> Self {
        Values::Named(Vec::new())
    }
}

impl Values {
    /// An empty named mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional inputs in declared property order.
    #[must_use]
    pub fn positional(inputs: impl IntoIterator<Item = Input>) -> Self {
        Values::Positional(inputs.into_iter().collect())
    }

    /// Adds or replaces a named input. On positional values the input is
    /// appended instead.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, input: impl Into<Input>) -> Self {
        let name = name.into();
        let input = input.into();
        if matches!(&self, Values::Positional(items) if items.is_empty()) {
            self = Values::Named(Vec::new());
        }
        match &mut self {
            Values::Named(pairs) => {
                if let Some(slot) = pairs.iter_mut().find(|(n, _)| *n == name) {
                    slot.1 = input;
                } else {
                    pairs.push((name, input));
                }
            }
            Values::Positional(items) => items.push(input),
        }
        self
    }

    /// The named input, if this is a mapping.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Input> {
        match self {
            Values::Named(pairs) => pairs.iter().find(|(n, _)| n == name).map(|(_, i)| i),
            Values::Positional(_) => None,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Input)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, Input)>>(iter: I) -> Self {
        Values::Named(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
