//! Live object handles.

use crate::engine::Snapshot;
use crate::error::{CoreError, CoreResult};
use crate::object::factory::same_factory;
use crate::object::{Input, ObjectFactory, Value};
use crate::realm::Realm;
use crate::types::{ObjectKey, TableId};
use std::fmt;
use std::sync::Arc;

/// A live reference to one stored object.
///
/// Reads go through the handle's current view: the open write transaction
/// if there is one, the latest commit otherwise. Once the object is deleted
/// or the realm is closed, every access fails with
/// [`CoreError::InvalidatedObject`].
#[derive(Clone)]
pub struct Object {
    realm: Realm,
    table: TableId,
    key: ObjectKey,
    object_type: Arc<str>,
}

impl Object {
    pub(crate) fn new(realm: Realm, table: TableId, key: ObjectKey, object_type: Arc<str>) -> Self {
        Self {
            realm,
            table,
            key,
            object_type,
        }
    }

    /// Row key of the object. Stable for the object's lifetime.
    #[must_use]
    pub fn key(&self) -> ObjectKey {
        self.key
    }

    /// Name of the object's type.
    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// The realm this handle was issued by.
    #[must_use]
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    pub(crate) fn table(&self) -> TableId {
        self.table
    }

    /// Whether the object still exists and its realm is open.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.read(|_, _| Ok(())).is_ok()
    }

    /// Whether the object's type is bound to `factory`.
    #[must_use]
    pub fn is_instance_of<F: ObjectFactory + ?Sized>(&self, factory: &F) -> bool {
        self.realm
            .factory_for(&self.object_type)
            .is_some_and(|bound| same_factory(bound.as_ref(), factory))
    }

    /// Reads a property.
    ///
    /// Links come back as [`Value::Link`] and lists as [`Value::List`]; use
    /// [`Object::get_link`] and [`Object::get_list`] to follow them.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidatedObject`] if the object is gone
    /// - [`CoreError::UnknownProperty`] for a property the type lacks
    pub fn get(&self, property: &str) -> CoreResult<Value> {
        self.read(|snapshot, _| self.column_value(snapshot, property))
    }

    /// Follows a link property.
    ///
    /// # Errors
    ///
    /// Fails like [`Object::get`], or with `InvalidPropertyValue` if the
    /// property is not a link.
    pub fn get_link(&self, property: &str) -> CoreResult<Option<Object>> {
        let (target, value) = self.read(|snapshot, _| {
            Ok((
                self.link_target(snapshot, property)?,
                self.column_value(snapshot, property)?,
            ))
        })?;
        match value {
            Value::Link(key) => Ok(Some(self.linked(target, key))),
            Value::Null => Ok(None),
            other => Err(self.not_a_link(property, &other)),
        }
    }

    /// Follows a list property.
    ///
    /// # Errors
    ///
    /// Fails like [`Object::get`], or with `InvalidPropertyValue` if the
    /// property is not a list.
    pub fn get_list(&self, property: &str) -> CoreResult<Vec<Object>> {
        let (target, value) = self.read(|snapshot, _| {
            Ok((
                self.link_target(snapshot, property)?,
                self.column_value(snapshot, property)?,
            ))
        })?;
        match value {
            Value::List(keys) => Ok(keys
                .into_iter()
                .map(|key| self.linked(target.clone(), key))
                .collect()),
            other => Err(self.not_a_link(property, &other)),
        }
    }

    /// Writes a property. Requires an open write transaction.
    ///
    /// Accepts the same inputs as `create`, so a link may be set to nested
    /// values, which creates the linked object.
    ///
    /// # Errors
    ///
    /// - [`CoreError::OutsideTransaction`] without a write transaction
    /// - [`CoreError::InvalidPropertyValue`] for a mistyped input
    /// - [`CoreError::DuplicateKey`] if a primary-key change collides
    pub fn set(&self, property: &str, input: impl Into<Input>) -> CoreResult<()> {
        self.realm
            .set_property(self, property, input.into())
            .map_err(|err| match err {
                CoreError::DatabaseClosed => CoreError::InvalidatedObject,
                other => other,
            })
    }

    fn read<R>(&self, f: impl FnOnce(&Snapshot, usize) -> CoreResult<R>) -> CoreResult<R> {
        self.realm
            .read(|snapshot| {
                let table = snapshot
                    .table(self.table)
                    .ok_or(CoreError::InvalidatedObject)?;
                let row = table.position(self.key).ok_or(CoreError::InvalidatedObject)?;
                f(snapshot, row)
            })
            .map_err(|err| match err {
                CoreError::DatabaseClosed => CoreError::InvalidatedObject,
                other => other,
            })
    }

    fn column_value(&self, snapshot: &Snapshot, property: &str) -> CoreResult<Value> {
        let table = snapshot
            .table(self.table)
            .ok_or(CoreError::InvalidatedObject)?;
        let column = table
            .schema()
            .property_index(property)
            .ok_or_else(|| CoreError::unknown_property(self.object_type(), property))?;
        table
            .value(self.key, column)
            .cloned()
            .ok_or(CoreError::InvalidatedObject)
    }

    fn link_target(&self, snapshot: &Snapshot, property: &str) -> CoreResult<(TableId, Arc<str>)> {
        let table = snapshot
            .table(self.table)
            .ok_or(CoreError::InvalidatedObject)?;
        let descriptor = table
            .schema()
            .property(property)
            .ok_or_else(|| CoreError::unknown_property(self.object_type(), property))?;
        let target = descriptor.property_type.target().ok_or_else(|| {
            CoreError::invalid_value(self.object_type(), property, "property is not a link")
        })?;
        let id = snapshot
            .table_id(target)
            .ok_or_else(|| CoreError::unknown_object_type(target))?;
        Ok((id, Arc::from(target)))
    }

    fn linked(&self, (table, object_type): (TableId, Arc<str>), key: ObjectKey) -> Object {
        Object::new(self.realm.clone(), table, key, object_type)
    }

    fn not_a_link(&self, property: &str, value: &Value) -> CoreError {
        CoreError::invalid_value(
            self.object_type(),
            property,
            format!("expected a link, found {}", value.kind()),
        )
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.realm.same_handle(&other.realm) && self.table == other.table && self.key == other.key
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.object_type)
            .field("key", &self.key)
            .finish()
    }
}
