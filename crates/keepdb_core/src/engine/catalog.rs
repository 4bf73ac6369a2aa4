//! Table catalog: which tables exist, their schemas and key counters.
//!
//! The catalog is stored as canonical CBOR in the manifest and in WAL
//! `Schema` records.

use crate::engine::row::{decode_input, encode_input};
use crate::error::{CoreError, CoreResult};
use crate::schema::{ObjectSchema, PropertyDescriptor, PropertyType, Schema};
use crate::types::TableId;
use keepdb_codec::{from_cbor, to_canonical_cbor, Value as Cbor};

/// One catalogued table.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Table id.
    pub id: TableId,
    /// Object type of the rows.
    pub schema: ObjectSchema,
    /// Next key to allocate.
    pub next_key: u64,
}

/// Every table of a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    /// Tables in id order.
    pub tables: Vec<CatalogEntry>,
    /// Next table id to assign.
    pub next_table_id: u32,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            next_table_id: 1,
        }
    }
}

impl Catalog {
    /// The object schemas, in table order.
    ///
    /// # Errors
    ///
    /// Fails if the stored definitions no longer validate.
    pub fn schema(&self) -> CoreResult<Schema> {
        Schema::from_object_schemas(self.tables.iter().map(|t| t.schema.clone()).collect())
    }

    /// Encodes the catalog.
    ///
    /// # Errors
    ///
    /// Fails if a default has no stored form.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let tables = self
            .tables
            .iter()
            .map(encode_entry)
            .collect::<CoreResult<Vec<_>>>()?;
        let root = Cbor::map(vec![
            (Cbor::text("next_table_id"), Cbor::from(self.next_table_id)),
            (Cbor::text("tables"), Cbor::Array(tables)),
        ]);
        Ok(to_canonical_cbor(&root)?)
    }

    /// Decodes a catalog; empty input is an empty catalog.
    ///
    /// # Errors
    ///
    /// Fails on malformed data.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.is_empty() {
            return Ok(Self::default());
        }
        let root = from_cbor(data)?;
        let next_table_id = u32::try_from(int_field(&root, "next_table_id")?)
            .map_err(|_| bad("next_table_id out of range"))?;
        let tables = root
            .get("tables")
            .and_then(Cbor::as_array)
            .ok_or_else(|| bad("missing tables"))?
            .iter()
            .map(decode_entry)
            .collect::<CoreResult<_>>()?;
        Ok(Self {
            tables,
            next_table_id,
        })
    }
}

fn bad(message: &str) -> CoreError {
    CoreError::invalid_format(format!("catalog: {message}"))
}

fn int_field(map: &Cbor, name: &str) -> CoreResult<i64> {
    map.get(name)
        .and_then(Cbor::as_integer)
        .ok_or_else(|| bad(&format!("missing integer '{name}'")))
}

fn text_field<'a>(map: &'a Cbor, name: &str) -> CoreResult<&'a str> {
    map.get(name)
        .and_then(Cbor::as_text)
        .ok_or_else(|| bad(&format!("missing text '{name}'")))
}

fn bool_field(map: &Cbor, name: &str) -> CoreResult<bool> {
    map.get(name)
        .and_then(Cbor::as_bool)
        .ok_or_else(|| bad(&format!("missing bool '{name}'")))
}

fn encode_entry(entry: &CatalogEntry) -> CoreResult<Cbor> {
    let next_key = i64::try_from(entry.next_key).map_err(|_| bad("next_key out of range"))?;
    let properties = entry
        .schema
        .properties
        .iter()
        .map(encode_property)
        .collect::<CoreResult<Vec<_>>>()?;
    Ok(Cbor::map(vec![
        (Cbor::text("id"), Cbor::from(entry.id.as_u32())),
        (Cbor::text("name"), Cbor::text(&entry.schema.name)),
        (Cbor::text("next_key"), Cbor::Integer(next_key)),
        (
            Cbor::text("primary_key"),
            entry
                .schema
                .primary_key
                .as_deref()
                .map_or(Cbor::Null, Cbor::text),
        ),
        (Cbor::text("properties"), Cbor::Array(properties)),
    ]))
}

fn decode_entry(cbor: &Cbor) -> CoreResult<CatalogEntry> {
    let id = u32::try_from(int_field(cbor, "id")?).map_err(|_| bad("table id out of range"))?;
    let next_key =
        u64::try_from(int_field(cbor, "next_key")?).map_err(|_| bad("next_key out of range"))?;
    let primary_key = match cbor.get("primary_key") {
        Some(Cbor::Text(pk)) => Some(pk.clone()),
        _ => None,
    };
    let properties = cbor
        .get("properties")
        .and_then(Cbor::as_array)
        .ok_or_else(|| bad("missing properties"))?
        .iter()
        .map(decode_property)
        .collect::<CoreResult<_>>()?;
    Ok(CatalogEntry {
        id: TableId::new(id),
        schema: ObjectSchema {
            name: text_field(cbor, "name")?.to_string(),
            properties,
            primary_key,
        },
        next_key,
    })
}

fn encode_property(property: &PropertyDescriptor) -> CoreResult<Cbor> {
    let mut pairs = vec![
        (Cbor::text("name"), Cbor::text(&property.name)),
        (Cbor::text("type"), Cbor::text(property.property_type.name())),
        (Cbor::text("indexed"), Cbor::Bool(property.indexed)),
        (Cbor::text("optional"), Cbor::Bool(property.optional)),
    ];
    if let Some(target) = property.property_type.target() {
        pairs.push((Cbor::text("target"), Cbor::text(target)));
    }
    if let Some(default) = &property.default {
        pairs.push((Cbor::text("default"), encode_input(default)?));
    }
    Ok(Cbor::map(pairs))
}

fn decode_property(cbor: &Cbor) -> CoreResult<PropertyDescriptor> {
    let type_name = text_field(cbor, "type")?;
    let target = cbor.get("target").and_then(Cbor::as_text);
    let property_type = PropertyType::from_name(type_name, target)
        .ok_or_else(|| bad(&format!("unknown property type '{type_name}'")))?;
    Ok(PropertyDescriptor {
        name: text_field(cbor, "name")?.to_string(),
        property_type,
        indexed: bool_field(cbor, "indexed")?,
        optional: bool_field(cbor, "optional")?,
        default: cbor.get("default").map(decode_input).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Values;

    fn catalog() -> Catalog {
        let schema = Schema::from_object_schemas(vec![
            ObjectSchema::new("Person")
                .with_property(PropertyDescriptor::new("id", PropertyType::String))
                .with_property(
                    PropertyDescriptor::new("age", PropertyType::Int)
                        .indexed()
                        .default_value(18),
                )
                .with_property(
                    PropertyDescriptor::new("dog", PropertyType::Object("Dog".into()))
                        .default_value(Values::new().with("name", "rex")),
                )
                .primary_key("id"),
            ObjectSchema::new("Dog")
                .with_property(PropertyDescriptor::new("name", PropertyType::String)),
        ])
        .unwrap();
        Catalog {
            tables: schema
                .object_schemas()
                .iter()
                .enumerate()
                .map(|(i, s)| CatalogEntry {
                    id: TableId::new(i as u32 + 1),
                    schema: s.clone(),
                    next_key: 10 * (i as u64 + 1),
                })
                .collect(),
            next_table_id: 3,
        }
    }

    #[test]
    fn roundtrip() {
        let catalog = catalog();
        let decoded = Catalog::decode(&catalog.encode().unwrap()).unwrap();
        assert_eq!(decoded, catalog);
        assert_eq!(decoded.schema().unwrap().len(), 2);
    }

    #[test]
    fn empty_input_is_empty_catalog() {
        let catalog = Catalog::decode(&[]).unwrap();
        assert!(catalog.tables.is_empty());
        assert_eq!(catalog.next_table_id, 1);
    }

    #[test]
    fn malformed_input_is_rejected() {
        let bytes = to_canonical_cbor(&Cbor::map(vec![(Cbor::text("tables"), Cbor::Null)])).unwrap();
        assert!(Catalog::decode(&bytes).is_err());
    }
}
