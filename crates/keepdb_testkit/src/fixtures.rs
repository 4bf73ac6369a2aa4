//! Schema fixtures and realm helpers.
//!
//! The fixture types mirror the shapes a behavioral suite needs: a single
//! double column, an integer primary key, every scalar type, optional
//! scalars, links, defaults, and a self-referencing person graph.

use keepdb_core::{
    Config, ObjectSchema, PropertyDescriptor, PropertyType, Realm, SchemaItem, UpdateMode, Value,
    Values,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `TestObject { doubleCol: double }`.
pub fn test_object() -> ObjectSchema {
    ObjectSchema::new("TestObject")
        .with_property(PropertyDescriptor::new("doubleCol", PropertyType::Double))
}

/// `IntPrimaryObject { primaryCol: int (primary key), valueCol: string }`.
pub fn int_primary() -> ObjectSchema {
    ObjectSchema::new("IntPrimaryObject")
        .with_property(PropertyDescriptor::new("primaryCol", PropertyType::Int))
        .with_property(PropertyDescriptor::new("valueCol", PropertyType::String))
        .primary_key("primaryCol")
}

/// One required property of every scalar type, plus a link and a list.
pub fn all_types() -> ObjectSchema {
    ObjectSchema::new("AllTypesObject")
        .with_property(PropertyDescriptor::new("boolCol", PropertyType::Bool))
        .with_property(PropertyDescriptor::new("intCol", PropertyType::Int))
        .with_property(PropertyDescriptor::new("floatCol", PropertyType::Float))
        .with_property(PropertyDescriptor::new("doubleCol", PropertyType::Double))
        .with_property(PropertyDescriptor::new("stringCol", PropertyType::String))
        .with_property(PropertyDescriptor::new("dateCol", PropertyType::Date))
        .with_property(PropertyDescriptor::new("dataCol", PropertyType::Data))
        .with_property(
            PropertyDescriptor::new("objectCol", PropertyType::Object("TestObject".into()))
                .optional(),
        )
        .with_property(PropertyDescriptor::new(
            "arrayCol",
            PropertyType::List("TestObject".into()),
        ))
}

/// Every scalar type, all optional.
pub fn nullable_basic_types() -> ObjectSchema {
    [
        ("boolCol", PropertyType::Bool),
        ("intCol", PropertyType::Int),
        ("floatCol", PropertyType::Float),
        ("doubleCol", PropertyType::Double),
        ("stringCol", PropertyType::String),
        ("dateCol", PropertyType::Date),
        ("dataCol", PropertyType::Data),
    ]
    .into_iter()
    .fold(ObjectSchema::new("NullableBasicTypesObject"), |schema, (name, ty)| {
        schema.with_property(PropertyDescriptor::new(name, ty).optional())
    })
}

/// Two links and a list, all to `TestObject`.
pub fn link_types() -> ObjectSchema {
    ObjectSchema::new("LinkTypesObject")
        .with_property(
            PropertyDescriptor::new("objectCol", PropertyType::Object("TestObject".into()))
                .optional(),
        )
        .with_property(
            PropertyDescriptor::new("objectCol1", PropertyType::Object("TestObject".into()))
                .optional(),
        )
        .with_property(PropertyDescriptor::new(
            "arrayCol",
            PropertyType::List("TestObject".into()),
        ))
}

/// Defaults for every scalar type and for a link.
pub fn default_values() -> ObjectSchema {
    ObjectSchema::new("DefaultValuesObject")
        .with_property(PropertyDescriptor::new("boolCol", PropertyType::Bool).default_value(true))
        .with_property(PropertyDescriptor::new("intCol", PropertyType::Int).default_value(-1))
        .with_property(
            PropertyDescriptor::new("floatCol", PropertyType::Float).default_value(-1.1f32),
        )
        .with_property(
            PropertyDescriptor::new("doubleCol", PropertyType::Double).default_value(-1.11),
        )
        .with_property(
            PropertyDescriptor::new("stringCol", PropertyType::String).default_value("defaultString"),
        )
        .with_property(
            PropertyDescriptor::new("dateCol", PropertyType::Date)
                .default_value(Value::Date(1_700_000_000_000)),
        )
        .with_property(
            PropertyDescriptor::new("dataCol", PropertyType::Data)
                .default_value(b"defaultData".to_vec()),
        )
        .with_property(
            PropertyDescriptor::new("objectCol", PropertyType::Object("TestObject".into()))
                .optional()
                .default_value(Values::new().with("doubleCol", 1.0)),
        )
        .with_property(PropertyDescriptor::new(
            "arrayCol",
            PropertyType::List("TestObject".into()),
        ))
}

/// `PersonObject { name: string (indexed), age: double, married: bool = false, children: [PersonObject] }`.
pub fn person_object() -> ObjectSchema {
    ObjectSchema::new("PersonObject")
        .with_property(PropertyDescriptor::new("name", PropertyType::String).indexed())
        .with_property(PropertyDescriptor::new("age", PropertyType::Double))
        .with_property(PropertyDescriptor::new("married", PropertyType::Bool).default_value(false))
        .with_property(PropertyDescriptor::new(
            "children",
            PropertyType::List("PersonObject".into()),
        ))
}

/// Every fixture type, in dependency order.
pub fn full_schema() -> Vec<SchemaItem> {
    vec![
        test_object().into(),
        int_primary().into(),
        all_types().into(),
        nullable_basic_types().into(),
        link_types().into(),
        default_values().into(),
        person_object().into(),
    ]
}

/// A realm in a temporary directory, removed on drop.
///
/// The realm is closed before the directory goes away.
pub struct TestRealm {
    /// The open realm.
    pub realm: Realm,
    dir: TempDir,
}

impl TestRealm {
    /// Opens a realm with every fixture type.
    pub fn new() -> Self {
        Self::with_schema(full_schema())
    }

    /// Opens a realm with `schema`.
    pub fn with_schema(schema: impl IntoIterator<Item = impl Into<SchemaItem>>) -> Self {
        let items: Vec<SchemaItem> = schema.into_iter().map(Into::into).collect();
        Self::with_config(|path| Config::new().path(path).schema(items))
    }

    /// Opens a realm with the config `build` returns for the store path.
    pub fn with_config(build: impl FnOnce(&Path) -> Config) -> Self {
        let dir = TempDir::new().expect("failed to create temp directory");
        let config = build(&dir.path().join("test.keepdb"));
        let realm = Realm::open(config).expect("failed to open realm");
        Self { realm, dir }
    }

    /// Store path.
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("test.keepdb")
    }

    /// Closes the realm and opens the same store again with `config`.
    ///
    /// `config`'s path is replaced with this store's path.
    pub fn reopen(&mut self, config: Config) -> keepdb_core::CoreResult<()> {
        self.realm.close();
        self.realm = Realm::open(config.path(self.path()))?;
        Ok(())
    }

    /// Opens another handle on the same store.
    pub fn second_handle(&self, config: Config) -> keepdb_core::CoreResult<Realm> {
        Realm::open(config.path(self.path()))
    }
}

impl Default for TestRealm {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestRealm {
    type Target = Realm;

    fn deref(&self) -> &Self::Target {
        &self.realm
    }
}

impl Drop for TestRealm {
    fn drop(&mut self) {
        self.realm.close();
    }
}

/// Runs `f` with an in-memory realm holding every fixture type.
pub fn with_memory_realm<F, R>(f: F) -> R
where
    F: FnOnce(&Realm) -> R,
{
    let realm = Realm::open_in_memory(full_schema()).expect("failed to open in-memory realm");
    let result = f(&realm);
    realm.close();
    result
}

/// Pre-populated realms.
pub mod scenarios {
    use super::*;

    /// `IntPrimaryObject`s with keys `0..count` and values `"val{key}"`.
    pub fn populate_int_primary(realm: &Realm, count: i64) {
        realm
            .write(|r| {
                for key in 0..count {
                    r.create(
                        "IntPrimaryObject",
                        Values::new()
                            .with("primaryCol", key)
                            .with("valueCol", format!("val{key}")),
                        UpdateMode::Disallowed,
                    )?;
                }
                Ok(())
            })
            .expect("failed to populate IntPrimaryObject");
    }

    /// `TestObject`s with `doubleCol` set to `0.0..count`.
    pub fn populate_test_objects(realm: &Realm, count: usize) {
        realm
            .write(|r| {
                for i in 0..count {
                    r.create(
                        "TestObject",
                        Values::new().with("doubleCol", i as f64),
                        UpdateMode::Disallowed,
                    )?;
                }
                Ok(())
            })
            .expect("failed to populate TestObject");
    }

    /// `doubleCol` of every `TestObject`, in order.
    pub fn test_object_values(realm: &Realm) -> Vec<f64> {
        realm
            .objects("TestObject")
            .and_then(|results| results.to_vec())
            .expect("failed to read TestObject")
            .iter()
            .map(|object| {
                object
                    .get("doubleCol")
                    .ok()
                    .and_then(|v| v.as_f64())
                    .expect("doubleCol is not a double")
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepdb_core::Schema;

    #[test]
    fn fixtures_validate() {
        let schema = Schema::validate(&full_schema()).unwrap();
        assert_eq!(schema.len(), 7);
        assert!(schema.get("PersonObject").unwrap().property("name").unwrap().indexed);
    }

    #[test]
    fn test_realm_opens_and_populates() {
        let test = TestRealm::new();
        scenarios::populate_test_objects(&test, 3);
        assert_eq!(scenarios::test_object_values(&test), vec![0.0, 1.0, 2.0]);
        assert!(test.path().exists());
    }

    #[test]
    fn memory_realm_has_no_path() {
        with_memory_realm(|realm| {
            assert!(realm.path().is_none());
            scenarios::populate_int_primary(realm, 2);
            assert_eq!(realm.objects("IntPrimaryObject").unwrap().len().unwrap(), 2);
        });
    }
}
