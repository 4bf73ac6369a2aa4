//! Property types and descriptors.

use crate::object::{Input, Value};
use std::fmt;

/// Type of a property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyType {
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// Milliseconds since the Unix epoch.
    Date,
    /// Binary data.
    Data,
    /// Link to one object of the named type.
    Object(String),
    /// Ordered links to objects of the named type.
    List(String),
}

impl PropertyType {
    /// Whether properties of this type may be indexed.
    #[must_use]
    pub fn is_indexable(&self) -> bool {
        matches!(
            self,
            PropertyType::Bool | PropertyType::Int | PropertyType::String | PropertyType::Date
        )
    }

    /// Whether this is a link or link list.
    #[must_use]
    pub fn is_link(&self) -> bool {
        matches!(self, PropertyType::Object(_) | PropertyType::List(_))
    }

    /// Linked type name for links and lists.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            PropertyType::Object(t) | PropertyType::List(t) => Some(t),
            _ => None,
        }
    }

    /// Type name as written in the catalog.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            PropertyType::Bool => "bool",
            PropertyType::Int => "int",
            PropertyType::Float => "float",
            PropertyType::Double => "double",
            PropertyType::String => "string",
            PropertyType::Date => "date",
            PropertyType::Data => "data",
            PropertyType::Object(_) => "object",
            PropertyType::List(_) => "list",
        }
    }

    /// Parses a catalog type name.
    #[must_use]
    pub fn from_name(name: &str, target: Option<&str>) -> Option<Self> {
        Some(match (name, target) {
            ("bool", _) => PropertyType::Bool,
            ("int", _) => PropertyType::Int,
            ("float", _) => PropertyType::Float,
            ("double", _) => PropertyType::Double,
            ("string", _) => PropertyType::String,
            ("date", _) => PropertyType::Date,
            ("data", _) => PropertyType::Data,
            ("object", Some(t)) => PropertyType::Object(t.to_string()),
            ("list", Some(t)) => PropertyType::List(t.to_string()),
            _ => return None,
        })
    }

    /// Value a required property takes when nothing else applies.
    #[must_use]
    pub fn zero_value(&self) -> Value {
        match self {
            PropertyType::Bool => Value::Bool(false),
            PropertyType::Int => Value::Int(0),
            PropertyType::Float => Value::Float(0.0),
            PropertyType::Double => Value::Double(0.0),
            PropertyType::String => Value::String(String::new()),
            PropertyType::Date => Value::Date(0),
            PropertyType::Data => Value::Data(Vec::new()),
            PropertyType::Object(_) => Value::Null,
            PropertyType::List(_) => Value::List(Vec::new()),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.target() {
            Some(target) => write!(f, "{}<{target}>", self.name()),
            None => f.write_str(self.name()),
        }
    }
}

/// Declaration of one property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// Property name.
    pub name: String,
    /// Property type.
    pub property_type: PropertyType,
    /// Whether a secondary index is kept.
    pub indexed: bool,
    /// Whether the property may hold null.
    pub optional: bool,
    /// Value used when `create` omits the property.
    pub default: Option<Input>,
}

impl PropertyDescriptor {
    /// A required, unindexed property without a default.
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
            indexed: false,
            optional: false,
            default: None,
        }
    }

    /// Marks the property indexed.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Marks the property optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Input>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Value for a row that has none: the plain default, else null when
    /// optional, else the type's zero value.
    pub(crate) fn fill_value(&self) -> Value {
        if let Some(Input::Value(value)) = &self.default {
            if let Some(value) = coerce_value(value, &self.property_type) {
                return value;
            }
        }
        if self.optional {
            Value::Null
        } else {
            self.property_type.zero_value()
        }
    }

    /// Links are nullable, lists are never null and primary keys are indexed.
    pub(crate) fn normalize(&mut self, is_primary_key: bool) {
        match self.property_type {
            PropertyType::Object(_) => self.optional = true,
            PropertyType::List(_) => self.optional = false,
            _ => {}
        }
        if is_primary_key {
            self.indexed = true;
        }
        if matches!(self.default, Some(Input::Undefined)) {
            self.default = None;
        }
    }

    /// Checks that `default` fits the property type.
    pub(crate) fn check_default(&self) -> Result<(), String> {
        let Some(default) = &self.default else {
            return Ok(());
        };
        match (default, &self.property_type) {
            (Input::Undefined, _) => Ok(()),
            (Input::Null, _) if self.optional => Ok(()),
            (Input::Null, _) => Err("null default on a required property".to_string()),
            (Input::Object(_), _) => Err("an object handle cannot be a default".to_string()),
            (Input::Nested(_), PropertyType::Object(_)) => Ok(()),
            (Input::List(items), PropertyType::List(_)) => {
                if items.iter().all(|i| matches!(i, Input::Nested(_))) {
                    Ok(())
                } else {
                    Err("list defaults may only hold nested values".to_string())
                }
            }
            (Input::Value(value), ty) if value_fits(value, ty) => Ok(()),
            (other, ty) => Err(format!(
                "default {} does not fit type {ty}",
                describe_input(other)
            )),
        }
    }
}

/// Whether a plain value may be stored in a property of type `ty`.
pub(crate) fn value_fits(value: &Value, ty: &PropertyType) -> bool {
    coerce_value(value, ty).is_some()
}

/// Converts `value` to the representation of `ty`.
///
/// Integers widen to floats and float widths convert both ways; anything
/// else must already match.
pub(crate) fn coerce_value(value: &Value, ty: &PropertyType) -> Option<Value> {
    match (value, ty) {
        (Value::Int(i), PropertyType::Float) => Some(Value::Float(*i as f32)),
        (Value::Int(i), PropertyType::Double) => Some(Value::Double(*i as f64)),
        (Value::Double(d), PropertyType::Float) => Some(Value::Float(*d as f32)),
        (Value::Float(f), PropertyType::Double) => Some(Value::Double(f64::from(*f))),
        (Value::Bool(_), PropertyType::Bool)
        | (Value::Int(_), PropertyType::Int)
        | (Value::Float(_), PropertyType::Float)
        | (Value::Double(_), PropertyType::Double)
        | (Value::String(_), PropertyType::String)
        | (Value::Date(_), PropertyType::Date)
        | (Value::Data(_), PropertyType::Data)
        | (Value::Link(_), PropertyType::Object(_))
        | (Value::List(_), PropertyType::List(_)) => Some(value.clone()),
        _ => None,
    }
}

pub(crate) fn describe_input(input: &Input) -> &'static str {
    match input {
        Input::Undefined => "undefined",
        Input::Null => "null",
        Input::Value(v) => v.kind(),
        Input::Object(_) => "object",
        Input::Nested(_) => "nested values",
        Input::List(_) => "list",
    }
}
