//! Live result sets.

use crate::engine::{IndexKey, Snapshot};
use crate::error::{CoreError, CoreResult};
use crate::object::{Object, ObjectFactory, Value};
use crate::realm::Realm;
use crate::schema::coerce_value;
use crate::types::{ObjectKey, TableId};
use std::fmt;
use std::sync::Arc;

type Predicate = Arc<dyn Fn(&Object) -> CoreResult<bool> + Send + Sync>;

#[derive(Clone)]
enum Base {
    /// Every row of the table.
    All,
    /// A frozen key list; rows deleted since are skipped.
    Fixed(Arc<Vec<ObjectKey>>),
}

#[derive(Clone)]
enum Filter {
    Equals { column: usize, value: Value },
    Predicate(Predicate),
}

/// A live, ordered view over the objects of one type.
///
/// Nothing is cached: length and elements are recomputed against the
/// current view on every access, so inserts and deletes show up
/// immediately. Objects are ordered by creation.
///
/// ```rust,ignore
/// let people = realm.objects("Person")?;
/// let adults = people.filtered(|p| Ok(p.get("age")?.as_int() >= Some(18)));
/// realm.write(|r| r.delete(&adults))?;
/// assert!(adults.is_empty()?);
/// ```
#[derive(Clone)]
pub struct ResultSet {
    realm: Realm,
    table: TableId,
    object_type: Arc<str>,
    base: Base,
    filters: Vec<Filter>,
    factory: Option<Arc<dyn ObjectFactory>>,
}

impl ResultSet {
    pub(crate) fn new(
        realm: Realm,
        table: TableId,
        object_type: Arc<str>,
        factory: Option<Arc<dyn ObjectFactory>>,
    ) -> Self {
        Self {
            realm,
            table,
            object_type,
            base: Base::All,
            filters: Vec::new(),
            factory,
        }
    }

    /// Object type of the results.
    #[must_use]
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Number of matching objects.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidatedObject`] once the realm is closed, or an
    /// error from a filter closure.
    pub fn len(&self) -> CoreResult<usize> {
        Ok(self.keys()?.len())
    }

    /// Whether nothing matches.
    ///
    /// # Errors
    ///
    /// Same as [`ResultSet::len`].
    pub fn is_empty(&self) -> CoreResult<bool> {
        Ok(self.keys()?.is_empty())
    }

    /// The object at `index`, or `None` past the end.
    ///
    /// # Errors
    ///
    /// Same as [`ResultSet::len`].
    pub fn get(&self, index: usize) -> CoreResult<Option<Object>> {
        Ok(self.keys()?.get(index).map(|&key| self.object(key)))
    }

    /// The objects matching right now.
    ///
    /// The returned iterator is detached from the view, so deleting its
    /// objects while iterating is safe.
    ///
    /// # Errors
    ///
    /// Same as [`ResultSet::len`].
    pub fn iter(&self) -> CoreResult<std::vec::IntoIter<Object>> {
        Ok(self.to_vec()?.into_iter())
    }

    /// The objects matching right now, collected.
    ///
    /// # Errors
    ///
    /// Same as [`ResultSet::len`].
    pub fn to_vec(&self) -> CoreResult<Vec<Object>> {
        Ok(self.keys()?.into_iter().map(|key| self.object(key)).collect())
    }

    /// Narrows the results to objects for which `predicate` holds.
    ///
    /// The predicate is re-evaluated on every access.
    #[must_use]
    pub fn filtered<P>(&self, predicate: P) -> ResultSet
    where
        P: Fn(&Object) -> CoreResult<bool> + Send + Sync + 'static,
    {
        let mut narrowed = self.clone();
        narrowed.filters.push(Filter::Predicate(Arc::new(predicate)));
        narrowed
    }

    /// Narrows the results to objects whose `property` equals `value`.
    ///
    /// Uses the property's index when it has one.
    ///
    /// # Errors
    ///
    /// - [`CoreError::UnknownProperty`] for a property the type lacks
    /// - [`CoreError::InvalidPropertyValue`] if `value` cannot be stored in it
    pub fn matching(&self, property: &str, value: impl Into<Value>) -> CoreResult<ResultSet> {
        let value = value.into();
        let (column, value) = self.read(|snapshot| {
            let table = snapshot
                .table(self.table)
                .ok_or(CoreError::InvalidatedObject)?;
            let schema = table.schema();
            let column = schema
                .property_index(property)
                .ok_or_else(|| CoreError::unknown_property(self.object_type(), property))?;
            let ty = &schema.properties[column].property_type;
            let coerced = match &value {
                Value::Null => Some(Value::Null),
                other => coerce_value(other, ty),
            }
            .ok_or_else(|| {
                CoreError::invalid_value(
                    self.object_type(),
                    property,
                    format!("cannot compare {ty} with {}", value.kind()),
                )
            })?;
            Ok((column, coerced))
        })?;
        let mut narrowed = self.clone();
        narrowed.filters.push(Filter::Equals { column, value });
        Ok(narrowed)
    }

    /// Freezes the current membership.
    ///
    /// The snapshot no longer picks up new objects; objects deleted later
    /// still drop out of it.
    ///
    /// # Errors
    ///
    /// Same as [`ResultSet::len`].
    pub fn snapshot(&self) -> CoreResult<ResultSet> {
        let keys = self.keys()?;
        Ok(ResultSet {
            realm: self.realm.clone(),
            table: self.table,
            object_type: Arc::clone(&self.object_type),
            base: Base::Fixed(Arc::new(keys)),
            filters: Vec::new(),
            factory: self.factory.clone(),
        })
    }

    pub(crate) fn table(&self) -> TableId {
        self.table
    }

    pub(crate) fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Keys of the matching rows, in order.
    pub(crate) fn keys(&self) -> CoreResult<Vec<ObjectKey>> {
        let candidates = self.read(|snapshot| Ok(self.candidates(snapshot)))?;
        let predicates: Vec<&Predicate> = self
            .filters
            .iter()
            .filter_map(|f| match f {
                Filter::Predicate(p) => Some(p),
                Filter::Equals { .. } => None,
            })
            .collect();
        if predicates.is_empty() {
            return Ok(candidates);
        }

        // Predicates run user code, so no lock is held here.
        let mut keys = Vec::with_capacity(candidates.len());
        for key in candidates {
            let object = self.plain_object(key);
            let mut keep = true;
            for predicate in &predicates {
                if !predicate(&object)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn candidates(&self, snapshot: &Snapshot) -> Vec<ObjectKey> {
        let Some(table) = snapshot.table(self.table) else {
            return Vec::new();
        };

        let mut keys: Vec<ObjectKey> = match &self.base {
            Base::All => self
                .indexed_candidates(snapshot)
                .unwrap_or_else(|| table.keys().to_vec()),
            Base::Fixed(keys) => keys.iter().copied().filter(|&k| table.contains(k)).collect(),
        };

        for filter in &self.filters {
            if let Filter::Equals { column, value } = filter {
                keys.retain(|&key| table.value(key, *column) == Some(value));
            }
        }
        keys
    }

    /// Rows of the first indexed equality filter, in key order.
    fn indexed_candidates(&self, snapshot: &Snapshot) -> Option<Vec<ObjectKey>> {
        let table = snapshot.table(self.table)?;
        self.filters.iter().find_map(|filter| match filter {
            Filter::Equals { column, value } => {
                let key = IndexKey::from_value(value)?;
                let mut rows = table.find_indexed(*column, &key)?;
                rows.sort_unstable();
                Some(rows)
            }
            Filter::Predicate(_) => None,
        })
    }

    fn object(&self, key: ObjectKey) -> Object {
        let object = self.plain_object(key);
        if let Some(factory) = &self.factory {
            factory.materialized(&object);
        }
        object
    }

    fn plain_object(&self, key: ObjectKey) -> Object {
        Object::new(self.realm.clone(), self.table, key, Arc::clone(&self.object_type))
    }

    fn read<R>(&self, f: impl FnOnce(&Snapshot) -> CoreResult<R>) -> CoreResult<R> {
        self.realm.read(f).map_err(|err| match err {
            CoreError::DatabaseClosed => CoreError::InvalidatedObject,
            other => other,
        })
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSet")
            .field("type", &self.object_type)
            .field("filters", &self.filters.len())
            .field("frozen", &matches!(self.base, Base::Fixed(_)))
            .finish()
    }
}

/// What [`Realm::delete`](crate::Realm::delete) accepts.
#[derive(Debug, Clone)]
pub enum Deletable {
    /// One object.
    Object(Object),
    /// Several objects, possibly of different types.
    Objects(Vec<Object>),
    /// Everything a result set matches at the time of the call.
    Results(ResultSet),
}

impl From<Object> for Deletable {
    fn from(object: Object) -> Self {
        Deletable::Object(object)
    }
}

impl From<&Object> for Deletable {
    fn from(object: &Object) -> Self {
        Deletable::Object(object.clone())
    }
}

impl From<Vec<Object>> for Deletable {
    fn from(objects: Vec<Object>) -> Self {
        Deletable::Objects(objects)
    }
}

impl From<ResultSet> for Deletable {
    fn from(results: ResultSet) -> Self {
        Deletable::Results(results)
    }
}

impl From<&ResultSet> for Deletable {
    fn from(results: &ResultSet) -> Self {
        Deletable::Results(results.clone())
    }
}
