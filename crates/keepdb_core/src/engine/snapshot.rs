//! Immutable store state.
//!
//! A snapshot maps table ids to tables behind `Arc`s. Writers clone the
//! committed snapshot and copy a table only when they first touch it, so
//! readers holding the old snapshot are never affected.

use crate::engine::catalog::{Catalog, CatalogEntry};
use crate::engine::table::Table;
use crate::error::CoreResult;
use crate::schema::{ObjectSchema, Schema};
use crate::types::{SequenceNumber, TableId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Store state as of one commit.
#[derive(Debug, Clone)]
pub struct Snapshot {
    sequence: SequenceNumber,
    schema_version: u64,
    tables: BTreeMap<TableId, Arc<Table>>,
    names: BTreeMap<String, TableId>,
    next_table_id: u32,
}

/// Tables touched by [`Snapshot::apply_schema`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SchemaChanges {
    /// Newly created tables.
    pub added: Vec<TableId>,
    /// Tables whose layout changed; every row must be rewritten.
    pub rewritten: Vec<TableId>,
    /// Tables no longer in the schema.
    pub dropped: Vec<TableId>,
}

impl SchemaChanges {
    /// Whether nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.rewritten.is_empty() && self.dropped.is_empty()
    }
}

impl Snapshot {
    /// A snapshot with no tables.
    #[must_use]
    pub fn empty(schema_version: u64) -> Self {
        Self {
            sequence: SequenceNumber::default(),
            schema_version,
            tables: BTreeMap::new(),
            names: BTreeMap::new(),
            next_table_id: 1,
        }
    }

    /// Empty tables for every catalogued type.
    ///
    /// # Errors
    ///
    /// Fails if the catalogued schema does not validate.
    pub fn from_catalog(catalog: &Catalog, schema_version: u64) -> CoreResult<Self> {
        let schema = catalog.schema()?;
        let mut snapshot = Self::empty(schema_version);
        for (entry, object_schema) in catalog.tables.iter().zip(schema.object_schemas()) {
            let mut table = Table::new(entry.id, Arc::new(object_schema.clone()));
            table.reserve_keys(entry.next_key);
            snapshot.names.insert(object_schema.name.clone(), entry.id);
            snapshot.tables.insert(entry.id, Arc::new(table));
        }
        snapshot.next_table_id = catalog
            .next_table_id
            .max(catalog.tables.iter().map(|t| t.id.as_u32() + 1).max().unwrap_or(1));
        Ok(snapshot)
    }

    /// The catalog describing this snapshot.
    #[must_use]
    pub fn catalog(&self) -> Catalog {
        Catalog {
            tables: self
                .tables
                .values()
                .map(|t| CatalogEntry {
                    id: t.id(),
                    schema: ObjectSchema::clone(t.schema()),
                    next_key: t.next_key(),
                })
                .collect(),
            next_table_id: self.next_table_id,
        }
    }

    /// The object schemas, in table order.
    #[must_use]
    pub fn schema(&self) -> Schema {
        Schema::from_validated(
            self.tables
                .values()
                .map(|t| ObjectSchema::clone(t.schema()))
                .collect(),
        )
    }

    /// Sequence of the commit that produced this snapshot.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Sets the commit sequence.
    pub fn set_sequence(&mut self, sequence: SequenceNumber) {
        self.sequence = sequence;
    }

    /// Schema version.
    #[must_use]
    pub fn schema_version(&self) -> u64 {
        self.schema_version
    }

    /// Sets the schema version.
    pub fn set_schema_version(&mut self, version: u64) {
        self.schema_version = version;
    }

    /// A table by id.
    #[must_use]
    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.get(&id).map(|t| &**t)
    }

    /// A table by id, copied out of shared storage on first write.
    pub fn table_mut(&mut self, id: TableId) -> Option<&mut Table> {
        self.tables.get_mut(&id).map(Arc::make_mut)
    }

    /// Id of the table for `name`.
    #[must_use]
    pub fn table_id(&self, name: &str) -> Option<TableId> {
        self.names.get(name).copied()
    }

    /// A table by type name.
    #[must_use]
    pub fn table_by_name(&self, name: &str) -> Option<&Table> {
        self.table_id(name).and_then(|id| self.table(id))
    }

    /// Tables in id order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values().map(|t| &**t)
    }

    /// Ids of all tables.
    #[must_use]
    pub fn table_ids(&self) -> Vec<TableId> {
        self.tables.keys().copied().collect()
    }

    /// Inserts or replaces a whole table.
    pub fn put_table(&mut self, table: Table) {
        self.names.insert(table.name().to_string(), table.id());
        self.next_table_id = self.next_table_id.max(table.id().as_u32() + 1);
        self.tables.insert(table.id(), Arc::new(table));
    }

    /// Makes the tables match `schema`.
    ///
    /// New types get empty tables, changed types are relaid out and types
    /// missing from `schema` are dropped.
    ///
    /// # Errors
    ///
    /// Fails if a relayout breaks primary-key uniqueness.
    pub fn apply_schema(&mut self, schema: &Schema) -> CoreResult<SchemaChanges> {
        let mut changes = SchemaChanges::default();

        for id in self.table_ids() {
            let Some(table) = self.table(id) else { continue };
            if schema.get(table.name()).is_none() {
                let name = table.name().to_string();
                self.names.remove(&name);
                self.tables.remove(&id);
                changes.dropped.push(id);
            }
        }

        for object_schema in schema.object_schemas() {
            match self.table_by_name(&object_schema.name) {
                Some(table) if **table.schema() == *object_schema => {}
                Some(table) => {
                    let relaid = table.relayout(Arc::new(object_schema.clone()))?;
                    changes.rewritten.push(relaid.id());
                    self.put_table(relaid);
                }
                None => {
                    let id = TableId::new(self.next_table_id);
                    self.put_table(Table::new(id, Arc::new(object_schema.clone())));
                    changes.added.push(id);
                }
            }
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Value;
    use crate::schema::{PropertyDescriptor, PropertyType};

    fn schema(types: &[(&str, PropertyType)]) -> Schema {
        Schema::from_object_schemas(
            types
                .iter()
                .map(|(name, ty)| {
                    ObjectSchema::new(*name).with_property(PropertyDescriptor::new("v", ty.clone()))
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn apply_schema_adds_rewrites_and_drops() {
        let mut snapshot = Snapshot::empty(0);
        let changes = snapshot
            .apply_schema(&schema(&[("A", PropertyType::Int), ("B", PropertyType::Int)]))
            .unwrap();
        assert_eq!(changes.added, vec![TableId::new(1), TableId::new(2)]);

        let a = snapshot.table_id("A").unwrap();
        let table = snapshot.table_mut(a).unwrap();
        let key = table.allocate_key();
        table.insert(key, vec![Value::Int(7)]).unwrap();

        let changes = snapshot
            .apply_schema(&schema(&[("A", PropertyType::Double)]))
            .unwrap();
        assert_eq!(changes.rewritten, vec![a]);
        assert_eq!(changes.dropped, vec![TableId::new(2)]);
        assert_eq!(
            snapshot.table(a).unwrap().value(key, 0),
            Some(&Value::Double(7.0))
        );
        assert!(snapshot.table_by_name("B").is_none());

        let unchanged = snapshot
            .apply_schema(&schema(&[("A", PropertyType::Double)]))
            .unwrap();
        assert!(unchanged.is_empty());
    }

    #[test]
    fn writes_do_not_leak_into_clones() {
        let mut base = Snapshot::empty(0);
        base.apply_schema(&schema(&[("A", PropertyType::Int)])).unwrap();
        let a = base.table_id("A").unwrap();

        let mut working = base.clone();
        let table = working.table_mut(a).unwrap();
        let key = table.allocate_key();
        table.insert(key, vec![Value::Int(1)]).unwrap();

        assert_eq!(working.table(a).unwrap().len(), 1);
        assert!(base.table(a).unwrap().is_empty());
    }

    #[test]
    fn catalog_roundtrip_keeps_key_counters() {
        let mut snapshot = Snapshot::empty(4);
        snapshot.apply_schema(&schema(&[("A", PropertyType::Int)])).unwrap();
        let a = snapshot.table_id("A").unwrap();
        snapshot.table_mut(a).unwrap().reserve_keys(42);

        let restored = Snapshot::from_catalog(&snapshot.catalog(), 4).unwrap();
        assert_eq!(restored.table(a).unwrap().next_key(), 42);
        assert_eq!(restored.schema(), snapshot.schema());
    }
}
