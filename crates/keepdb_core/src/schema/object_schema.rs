//! Object type declarations.

use crate::schema::property::PropertyDescriptor;

/// Declaration of an object type.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSchema {
    /// Type name, unique within a schema.
    pub name: String,
    /// Properties in declared order.
    pub properties: Vec<PropertyDescriptor>,
    /// Name of the primary-key property.
    pub primary_key: Option<String>,
}

impl ObjectSchema {
    /// An object type with no properties yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
            primary_key: None,
        }
    }

    /// Appends a property.
    #[must_use]
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Sets the primary key.
    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Column index of a property.
    #[must_use]
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Column index of the primary key.
    #[must_use]
    pub fn primary_key_index(&self) -> Option<usize> {
        self.primary_key
            .as_deref()
            .and_then(|pk| self.property_index(pk))
    }
}
