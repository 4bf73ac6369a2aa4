//! Row payload encoding.
//!
//! A row is a canonical CBOR map from property name to value. Values that
//! CBOR has no native form for use private tags, so payloads decode
//! without the schema and survive property reordering.

use crate::error::{CoreError, CoreResult};
use crate::object::{Input, Value, Values};
use crate::schema::{coerce_value, ObjectSchema};
use crate::types::ObjectKey;
use keepdb_codec::{from_cbor, to_canonical_cbor, Value as Cbor};

const TAG_DATE: u64 = 40_001;
const TAG_FLOAT32: u64 = 40_002;
const TAG_LINK: u64 = 40_003;
const TAG_KEY_LIST: u64 = 40_004;
const TAG_UNDEFINED: u64 = 40_005;
const TAG_NAMED: u64 = 40_006;
const TAG_POSITIONAL: u64 = 40_007;

fn key_to_cbor(key: ObjectKey) -> CoreResult<Cbor> {
    i64::try_from(key.as_u64())
        .map(Cbor::Integer)
        .map_err(|_| CoreError::invalid_format(format!("object key {key} out of range")))
}

fn key_from_cbor(value: &Cbor) -> CoreResult<ObjectKey> {
    value
        .as_integer()
        .and_then(|i| u64::try_from(i).ok())
        .map(ObjectKey::new)
        .ok_or_else(|| CoreError::invalid_format("object key must be a non-negative integer"))
}

/// Encodes a stored value.
///
/// # Errors
///
/// Fails if a link key exceeds the integer range.
pub fn encode_value(value: &Value) -> CoreResult<Cbor> {
    Ok(match value {
        Value::Null => Cbor::Null,
        Value::Bool(b) => Cbor::Bool(*b),
        Value::Int(i) => Cbor::Integer(*i),
        Value::Float(f) => Cbor::Tagged(TAG_FLOAT32, Box::new(Cbor::Float(f64::from(*f)))),
        Value::Double(d) => Cbor::Float(*d),
        Value::String(s) => Cbor::Text(s.clone()),
        Value::Date(ms) => Cbor::Tagged(TAG_DATE, Box::new(Cbor::Integer(*ms))),
        Value::Data(d) => Cbor::Bytes(d.clone()),
        Value::Link(key) => Cbor::Tagged(TAG_LINK, Box::new(key_to_cbor(*key)?)),
        Value::List(keys) => Cbor::Tagged(
            TAG_KEY_LIST,
            Box::new(Cbor::Array(
                keys.iter().map(|k| key_to_cbor(*k)).collect::<CoreResult<_>>()?,
            )),
        ),
    })
}

/// Decodes a stored value.
///
/// # Errors
///
/// Fails on CBOR shapes no value encodes to.
pub fn decode_value(cbor: &Cbor) -> CoreResult<Value> {
    let invalid = || CoreError::invalid_format("unexpected value in row payload");
    Ok(match cbor {
        Cbor::Null => Value::Null,
        Cbor::Bool(b) => Value::Bool(*b),
        Cbor::Integer(i) => Value::Int(*i),
        Cbor::Float(d) => Value::Double(*d),
        Cbor::Text(s) => Value::String(s.clone()),
        Cbor::Bytes(b) => Value::Data(b.clone()),
        Cbor::Tagged(TAG_FLOAT32, inner) => {
            Value::Float(inner.as_float().ok_or_else(invalid)? as f32)
        }
        Cbor::Tagged(TAG_DATE, inner) => Value::Date(inner.as_integer().ok_or_else(invalid)?),
        Cbor::Tagged(TAG_LINK, inner) => Value::Link(key_from_cbor(inner)?),
        Cbor::Tagged(TAG_KEY_LIST, inner) => Value::List(
            inner
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(key_from_cbor)
                .collect::<CoreResult<_>>()?,
        ),
        _ => return Err(invalid()),
    })
}

/// Encodes a row of `schema`.
///
/// # Errors
///
/// Fails if the row has the wrong width.
pub fn encode_row(schema: &ObjectSchema, row: &[Value]) -> CoreResult<Vec<u8>> {
    if row.len() != schema.properties.len() {
        return Err(CoreError::invalid_format(format!(
            "row for '{}' has {} values, expected {}",
            schema.name,
            row.len(),
            schema.properties.len()
        )));
    }
    let pairs = schema
        .properties
        .iter()
        .zip(row)
        .map(|(p, v)| Ok((Cbor::text(&p.name), encode_value(v)?)))
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(to_canonical_cbor(&Cbor::map(pairs))?)
}

/// Decodes a row for `schema`.
///
/// Properties missing from the payload, or stored with a type that no
/// longer fits, take their fill value.
///
/// # Errors
///
/// Fails if the payload is not a row map.
pub fn decode_row(schema: &ObjectSchema, payload: &[u8]) -> CoreResult<Vec<Value>> {
    let cbor = from_cbor(payload)?;
    if cbor.as_map().is_none() {
        return Err(CoreError::invalid_format("row payload is not a map"));
    }
    schema
        .properties
        .iter()
        .map(|property| {
            let stored = match cbor.get(&property.name) {
                Some(value) => Some(decode_value(value)?),
                None => None,
            };
            Ok(stored
                .and_then(|v| {
                    if v.is_null() {
                        property.optional.then_some(Value::Null)
                    } else {
                        coerce_value(&v, &property.property_type)
                    }
                })
                .unwrap_or_else(|| property.fill_value()))
        })
        .collect()
}

/// Encodes a property default.
///
/// # Errors
///
/// Fails for object handles, which have no stored form.
pub fn encode_input(input: &Input) -> CoreResult<Cbor> {
    Ok(match input {
        Input::Undefined => Cbor::Tagged(TAG_UNDEFINED, Box::new(Cbor::Null)),
        Input::Null => Cbor::Null,
        Input::Value(value) => encode_value(value)?,
        Input::Object(_) => {
            return Err(CoreError::schema_validation(
                "an object handle cannot be a default",
            ))
        }
        Input::Nested(Values::Named(pairs)) => Cbor::Tagged(
            TAG_NAMED,
            Box::new(Cbor::Array(
                pairs
                    .iter()
                    .map(|(name, input)| {
                        Ok(Cbor::Array(vec![Cbor::text(name), encode_input(input)?]))
                    })
                    .collect::<CoreResult<_>>()?,
            )),
        ),
        Input::Nested(Values::Positional(items)) => Cbor::Tagged(
            TAG_POSITIONAL,
            Box::new(Cbor::Array(
                items.iter().map(encode_input).collect::<CoreResult<_>>()?,
            )),
        ),
        Input::List(items) => Cbor::Array(items.iter().map(encode_input).collect::<CoreResult<_>>()?),
    })
}

/// Decodes a property default.
///
/// # Errors
///
/// Fails on shapes [`encode_input`] never produces.
pub fn decode_input(cbor: &Cbor) -> CoreResult<Input> {
    let invalid = || CoreError::invalid_format("unexpected default value in catalog");
    Ok(match cbor {
        Cbor::Null => Input::Null,
        Cbor::Tagged(TAG_UNDEFINED, _) => Input::Undefined,
        Cbor::Tagged(TAG_NAMED, inner) => {
            let pairs = inner
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(|pair| match pair.as_array() {
                    Some([Cbor::Text(name), value]) => Ok((name.clone(), decode_input(value)?)),
                    _ => Err(invalid()),
                })
                .collect::<CoreResult<_>>()?;
            Input::Nested(Values::Named(pairs))
        }
        Cbor::Tagged(TAG_POSITIONAL, inner) => Input::Nested(Values::Positional(
            inner
                .as_array()
                .ok_or_else(invalid)?
                .iter()
                .map(decode_input)
                .collect::<CoreResult<_>>()?,
        )),
        Cbor::Array(items) => Input::List(items.iter().map(decode_input).collect::<CoreResult<_>>()?),
        other => Input::Value(decode_value(other)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertyDescriptor, PropertyType};

    fn schema() -> ObjectSchema {
        ObjectSchema::new("All")
            .with_property(PropertyDescriptor::new("b", PropertyType::Bool))
            .with_property(PropertyDescriptor::new("f", PropertyType::Float))
            .with_property(PropertyDescriptor::new("d", PropertyType::Date))
            .with_property(PropertyDescriptor::new("o", PropertyType::Object("All".into())).optional())
            .with_property(PropertyDescriptor::new("l", PropertyType::List("All".into())))
    }

    #[test]
    fn row_roundtrip_keeps_types() {
        let row = vec![
            Value::Bool(true),
            Value::Float(1.5),
            Value::Date(-5),
            Value::Link(ObjectKey::new(3)),
            Value::List(vec![ObjectKey::new(1), ObjectKey::new(2)]),
        ];
        let bytes = encode_row(&schema(), &row).unwrap();
        assert_eq!(decode_row(&schema(), &bytes).unwrap(), row);
    }

    #[test]
    fn missing_properties_take_fill_values() {
        let narrow = ObjectSchema::new("All")
            .with_property(PropertyDescriptor::new("b", PropertyType::Bool));
        let bytes = encode_row(&narrow, &[Value::Bool(true)]).unwrap();
        let row = decode_row(&schema(), &bytes).unwrap();
        assert_eq!(row[0], Value::Bool(true));
        assert_eq!(row[1], Value::Float(0.0));
        assert_eq!(row[3], Value::Null);
        assert_eq!(row[4], Value::List(Vec::new()));
    }

    #[test]
    fn wrong_width_is_rejected() {
        assert!(encode_row(&schema(), &[Value::Null]).is_err());
    }

    #[test]
    fn defaults_roundtrip_in_order() {
        let input = Input::List(vec![Input::Nested(
            Values::new().with("z", 1).with("a", Input::Undefined).with("m", Input::Null),
        )]);
        let cbor = encode_input(&input).unwrap();
        assert_eq!(decode_input(&cbor).unwrap(), input);
        let positional = Input::Nested(Values::positional([Input::from("x"), Input::from(2.5)]));
        assert_eq!(decode_input(&encode_input(&positional).unwrap()).unwrap(), positional);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(decode_value(&Cbor::Tagged(7, Box::new(Cbor::Null))).is_err());
    }
}
