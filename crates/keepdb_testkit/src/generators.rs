//! Property-based test generators using proptest.
//!
//! Strategies for schemas, property values and operation sequences, and a
//! reference model the sequences can be checked against.

use keepdb_core::{ObjectSchema, PropertyDescriptor, PropertyType, Value};
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Strategy for valid property and type names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,15}").expect("invalid regex")
}

/// Strategy for scalar property types.
pub fn scalar_type_strategy() -> impl Strategy<Value = PropertyType> {
    prop_oneof![
        Just(PropertyType::Bool),
        Just(PropertyType::Int),
        Just(PropertyType::Float),
        Just(PropertyType::Double),
        Just(PropertyType::String),
        Just(PropertyType::Date),
        Just(PropertyType::Data),
    ]
}

/// Strategy for a value that a property of type `ty` accepts unchanged.
pub fn value_strategy(ty: &PropertyType) -> BoxedStrategy<Value> {
    match ty {
        PropertyType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        PropertyType::Int => any::<i64>().prop_map(Value::Int).boxed(),
        PropertyType::Float => (-1.0e6f32..1.0e6).prop_map(Value::Float).boxed(),
        PropertyType::Double => (-1.0e12f64..1.0e12).prop_map(Value::Double).boxed(),
        PropertyType::String => ".{0,32}".prop_map(Value::String).boxed(),
        PropertyType::Date => (0i64..4_102_444_800_000).prop_map(Value::Date).boxed(),
        PropertyType::Data => prop::collection::vec(any::<u8>(), 0..64)
            .prop_map(Value::Data)
            .boxed(),
        PropertyType::Object(_) | PropertyType::List(_) => Just(Value::Null).boxed(),
    }
}

/// Strategy for valid single-type schemas with scalar properties.
///
/// Property names are unique. Some properties are optional; indexes are
/// only placed on indexable types.
pub fn object_schema_strategy() -> impl Strategy<Value = ObjectSchema> {
    (
        name_strategy(),
        prop::collection::btree_map(
            name_strategy(),
            (scalar_type_strategy(), any::<bool>(), any::<bool>()),
            1..8,
        ),
    )
        .prop_map(|(name, properties)| {
            properties.into_iter().fold(
                ObjectSchema::new(name),
                |schema, (property, (ty, optional, indexed))| {
                    let mut descriptor = PropertyDescriptor::new(property, ty);
                    descriptor.optional = optional;
                    descriptor.indexed = indexed && descriptor.property_type.is_indexable();
                    schema.with_property(descriptor)
                },
            )
        })
}

/// An operation on `IntPrimaryObject`.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKeyOp {
    /// Create; fails on an existing key.
    Create {
        /// Primary key.
        key: i64,
        /// `valueCol`.
        value: String,
    },
    /// Upsert; `None` leaves `valueCol` unchanged on an existing object.
    Upsert {
        /// Primary key.
        key: i64,
        /// `valueCol`, if supplied.
        value: Option<String>,
    },
    /// Delete by key; a missing key is skipped.
    Delete {
        /// Primary key.
        key: i64,
    },
}

/// Strategy for one operation over a small key space, so collisions are common.
pub fn primary_key_op_strategy() -> impl Strategy<Value = PrimaryKeyOp> {
    let key = 0i64..8;
    let value = "[a-z]{1,6}";
    prop_oneof![
        (key.clone(), value).prop_map(|(key, value)| PrimaryKeyOp::Create { key, value }),
        (key.clone(), prop::option::of(value))
            .prop_map(|(key, value)| PrimaryKeyOp::Upsert { key, value }),
        key.prop_map(|key| PrimaryKeyOp::Delete { key }),
    ]
}

/// Strategy for operation sequences.
pub fn primary_key_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<PrimaryKeyOp>> {
    prop::collection::vec(primary_key_op_strategy(), 1..max_len)
}

/// Reference model of `IntPrimaryObject`, in creation order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PrimaryKeyModel {
    rows: Vec<(i64, String)>,
}

impl PrimaryKeyModel {
    /// An empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `op`. Returns `false` where the store must reject it.
    ///
    /// An upsert of a new key without a value is rejected because
    /// `valueCol` is required.
    pub fn apply(&mut self, op: &PrimaryKeyOp) -> bool {
        let position = |rows: &Vec<(i64, String)>, key: i64| rows.iter().position(|(k, _)| *k == key);
        match op {
            PrimaryKeyOp::Create { key, value } => {
                if position(&self.rows, *key).is_some() {
                    return false;
                }
                self.rows.push((*key, value.clone()));
                true
            }
            PrimaryKeyOp::Upsert { key, value } => match (position(&self.rows, *key), value) {
                (Some(i), Some(value)) => {
                    self.rows[i].1 = value.clone();
                    true
                }
                (Some(_), None) => true,
                (None, Some(value)) => {
                    self.rows.push((*key, value.clone()));
                    true
                }
                (None, None) => false,
            },
            PrimaryKeyOp::Delete { key } => {
                if let Some(i) = position(&self.rows, *key) {
                    self.rows.remove(i);
                }
                true
            }
        }
    }

    /// Rows in creation order.
    pub fn rows(&self) -> &[(i64, String)] {
        &self.rows
    }

    /// Rows by key.
    pub fn by_key(&self) -> BTreeMap<i64, String> {
        self.rows.iter().cloned().collect()
    }
}
