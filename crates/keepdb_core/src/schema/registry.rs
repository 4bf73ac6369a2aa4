//! Schema validation.

use crate::error::{CoreError, CoreResult};
use crate::object::ObjectFactory;
use crate::schema::object_schema::ObjectSchema;
use crate::schema::property::PropertyType;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// One entry of a configured schema.
#[derive(Clone)]
pub enum SchemaItem {
    /// A plain object type.
    Plain(ObjectSchema),
    /// An object type produced through a factory.
    Bound(Arc<dyn ObjectFactory>),
}

impl SchemaItem {
    /// Binds a factory.
    pub fn bound<F: ObjectFactory + 'static>(factory: Arc<F>) -> Self {
        SchemaItem::Bound(factory)
    }

    /// The declared object schema.
    ///
    /// # Errors
    ///
    /// Fails with `SchemaValidation` for a factory that exposes no schema.
    pub fn object_schema(&self) -> CoreResult<ObjectSchema> {
        match self {
            SchemaItem::Plain(schema) => Ok(schema.clone()),
            SchemaItem::Bound(factory) => factory.object_schema().ok_or_else(|| {
                CoreError::schema_validation(format!(
                    "factory '{}' must expose an object schema",
                    factory.name()
                ))
            }),
        }
    }

    /// The bound factory.
    #[must_use]
    pub fn factory(&self) -> Option<&Arc<dyn ObjectFactory>> {
        match self {
            SchemaItem::Plain(_) => None,
            SchemaItem::Bound(factory) => Some(factory),
        }
    }
}

impl From<ObjectSchema> for SchemaItem {
    fn from(schema: ObjectSchema) -> Self {
        SchemaItem::Plain(schema)
    }
}

impl From<Arc<dyn ObjectFactory>> for SchemaItem {
    fn from(factory: Arc<dyn ObjectFactory>) -> Self {
        SchemaItem::Bound(factory)
    }
}

impl fmt::Debug for SchemaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaItem::Plain(schema) => f.debug_tuple("Plain").field(&schema.name).finish(),
            SchemaItem::Bound(factory) => f.debug_tuple("Bound").field(&factory.name()).finish(),
        }
    }
}

/// A validated set of object types.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    object_schemas: Vec<ObjectSchema>,
}

impl Schema {
    /// Validates and normalizes `items`.
    ///
    /// # Errors
    ///
    /// Fails with `SchemaValidation` naming the offending type or property.
    pub fn validate(items: &[SchemaItem]) -> CoreResult<Self> {
        let object_schemas = items
            .iter()
            .map(SchemaItem::object_schema)
            .collect::<CoreResult<Vec<_>>>()?;
        Self::from_object_schemas(object_schemas)
    }

    /// Validates and normalizes plain object schemas.
    ///
    /// # Errors
    ///
    /// Fails with `SchemaValidation` naming the offending type or property.
    pub fn from_object_schemas(mut object_schemas: Vec<ObjectSchema>) -> CoreResult<Self> {
        for schema in &mut object_schemas {
            let pk = schema.primary_key.clone();
            for property in &mut schema.properties {
                property.normalize(pk.as_deref() == Some(property.name.as_str()));
            }
        }

        let mut names = HashSet::new();
        for schema in &object_schemas {
            if schema.name.is_empty() {
                return Err(CoreError::schema_validation("object type name must not be empty"));
            }
            if !names.insert(schema.name.as_str()) {
                return Err(CoreError::schema_validation(format!(
                    "object type '{}' is declared more than once",
                    schema.name
                )));
            }
        }

        for schema in &object_schemas {
            check_object_schema(schema, &names)?;
        }

        Ok(Self { object_schemas })
    }

    /// Wraps schemas that already passed validation.
    pub(crate) fn from_validated(object_schemas: Vec<ObjectSchema>) -> Self {
        Self { object_schemas }
    }

    /// Object types in declared order.
    #[must_use]
    pub fn object_schemas(&self) -> &[ObjectSchema] {
        &self.object_schemas
    }

    /// Looks up a type.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ObjectSchema> {
        self.object_schemas.iter().find(|s| s.name == name)
    }

    /// Type names in declared order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.object_schemas.iter().map(|s| s.name.as_str())
    }

    /// Number of types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.object_schemas.len()
    }

    /// Whether there are no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.object_schemas.is_empty()
    }

    /// `self` with every type of `other` added or replaced by name.
    ///
    /// # Errors
    ///
    /// Fails if the combined schema does not validate.
    pub fn overlay(&self, other: &Schema) -> CoreResult<Schema> {
        let mut merged = self.object_schemas.clone();
        for schema in &other.object_schemas {
            match merged.iter_mut().find(|s| s.name == schema.name) {
                Some(slot) => *slot = schema.clone(),
                None => merged.push(schema.clone()),
            }
        }
        Self::from_object_schemas(merged)
    }
}

fn check_object_schema(schema: &ObjectSchema, names: &HashSet<&str>) -> CoreResult<()> {
    let fail = |message: String| {
        Err(CoreError::schema_validation(format!(
            "object type '{}': {message}",
            schema.name
        )))
    };

    if schema.properties.is_empty() {
        return fail("properties must not be empty".to_string());
    }

    let mut seen = HashSet::new();
    for property in &schema.properties {
        if property.name.is_empty() {
            return fail("property name must not be empty".to_string());
        }
        if !seen.insert(property.name.as_str()) {
            return fail(format!("property '{}' is declared more than once", property.name));
        }
        if let Some(target) = property.property_type.target() {
            if !names.contains(target) {
                return fail(format!(
                    "property '{}' links to unknown type '{target}'",
                    property.name
                ));
            }
        }
        if property.indexed && !property.property_type.is_indexable() {
            return fail(format!(
                "property '{}' of type {} cannot be indexed",
                property.name, property.property_type
            ));
        }
        if let Err(message) = property.check_default() {
            return fail(format!("property '{}': {message}", property.name));
        }
    }

    if let Some(pk) = &schema.primary_key {
        let Some(property) = schema.property(pk) else {
            return fail(format!("primary key '{pk}' is not a property"));
        };
        if !property.property_type.is_indexable() {
            return fail(format!(
                "primary key '{pk}' has type {} which cannot be a primary key",
                property.property_type
            ));
        }
        if property.optional {
            return fail(format!("primary key '{pk}' must not be optional"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Input;
    use crate::schema::PropertyDescriptor;

    fn person() -> ObjectSchema {
        ObjectSchema::new("Person")
            .with_property(PropertyDescriptor::new("id", PropertyType::Int))
            .with_property(PropertyDescriptor::new("name", PropertyType::String))
            .with_property(PropertyDescriptor::new(
                "friends",
                PropertyType::List("Person".into()),
            ))
            .primary_key("id")
    }

    fn validate(schemas: Vec<ObjectSchema>) -> CoreResult<Schema> {
        Schema::from_object_schemas(schemas)
    }

    #[test]
    fn valid_schema_is_normalized() {
        let schema = validate(vec![person()]).unwrap();
        let person = schema.get("Person").unwrap();
        assert!(person.property("id").unwrap().indexed);
        assert_eq!(schema.names().collect::<Vec<_>>(), vec!["Person"]);
    }

    #[test]
    fn rejects_empty_name_and_duplicates() {
        assert!(validate(vec![ObjectSchema::new("")]).is_err());
        assert!(validate(vec![person(), person()]).is_err());
    }

    #[test]
    fn null_default_on_a_link_is_accepted() {
        let owner = ObjectSchema::new("Owner")
            .with_property(PropertyDescriptor::new("name", PropertyType::String));
        let pet = ObjectSchema::new("Pet").with_property(
            PropertyDescriptor::new("owner", PropertyType::Object("Owner".into()))
                .default_value(Input::Null),
        );
        let schema = validate(vec![owner, pet]).unwrap();
        assert!(schema.get("Pet").unwrap().property("owner").unwrap().optional);
    }

    #[test]
    fn rejects_empty_properties() {
        let err = validate(vec![ObjectSchema::new("Empty")]).unwrap_err();
        assert!(matches!(err, CoreError::SchemaValidation { .. }));
    }

    #[test]
    fn rejects_unknown_link_target() {
        let schema = ObjectSchema::new("Dog").with_property(PropertyDescriptor::new(
            "owner",
            PropertyType::Object("Nobody".into()),
        ));
        assert!(validate(vec![schema]).is_err());
    }

    #[test]
    fn rejects_indexes_on_unindexable_types() {
        for ty in [PropertyType::Float, PropertyType::Double, PropertyType::Data] {
            let schema = ObjectSchema::new("T")
                .with_property(PropertyDescriptor::new("v", ty).indexed());
            let err = validate(vec![schema]).unwrap_err();
            assert!(err.to_string().contains("cannot be indexed"));
        }
    }

    #[test]
    fn primary_key_rules() {
        let missing = ObjectSchema::new("T")
            .with_property(PropertyDescriptor::new("v", PropertyType::Int))
            .primary_key("id");
        assert!(validate(vec![missing]).is_err());

        let float_pk = ObjectSchema::new("T")
            .with_property(PropertyDescriptor::new("v", PropertyType::Double))
            .primary_key("v");
        assert!(validate(vec![float_pk]).is_err());

        let string_pk = ObjectSchema::new("T")
            .with_property(PropertyDescriptor::new("v", PropertyType::String))
            .primary_key("v");
        assert!(validate(vec![string_pk]).is_ok());
    }

    #[test]
    fn rejects_incompatible_default() {
        let schema = ObjectSchema::new("T").with_property(
            PropertyDescriptor::new("flag", PropertyType::Bool).default_value("yes"),
        );
        assert!(validate(vec![schema]).is_err());
    }

    #[test]
    fn overlay_adds_and_replaces() {
        let base = validate(vec![person()]).unwrap();
        let extra = validate(vec![
            ObjectSchema::new("Tag").with_property(PropertyDescriptor::new("v", PropertyType::String)),
        ])
        .unwrap();
        let merged = base.overlay(&extra).unwrap();
        assert_eq!(merged.len(), 2);

        let replaced = validate(vec![
            ObjectSchema::new("Tag").with_property(PropertyDescriptor::new("w", PropertyType::Int)),
        ])
        .unwrap();
        let merged = merged.overlay(&replaced).unwrap();
        assert!(merged.get("Tag").unwrap().property("w").is_some());
        assert_eq!(merged.len(), 2);
    }
}
