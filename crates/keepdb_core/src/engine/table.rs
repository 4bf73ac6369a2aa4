//! Column-oriented table.
//!
//! Rows are kept in key order. Keys are allocated monotonically, so key
//! order is insertion order and a row's index in the table is its position
//! in the key vector. Each property has its own column vector indexed the
//! same way.

use crate::engine::index::{HashIndex, IndexKey, SortedIndex};
use crate::error::{CoreError, CoreResult};
use crate::object::Value;
use crate::schema::{coerce_value, ObjectSchema};
use crate::types::{ObjectKey, TableId};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Rows of one object type.
#[derive(Debug, Clone)]
pub struct Table {
    id: TableId,
    schema: Arc<ObjectSchema>,
    keys: Vec<ObjectKey>,
    columns: Vec<Vec<Value>>,
    primary: Option<(usize, HashIndex)>,
    secondary: Vec<(usize, SortedIndex)>,
    next_key: u64,
}

impl Table {
    /// An empty table for `schema`.
    pub fn new(id: TableId, schema: Arc<ObjectSchema>) -> Self {
        let primary = schema.primary_key_index().map(|c| (c, HashIndex::new()));
        let secondary = schema
            .properties
            .iter()
            .enumerate()
            .filter(|(c, p)| p.indexed && Some(*c) != primary.as_ref().map(|(pc, _)| *pc))
            .map(|(c, _)| (c, SortedIndex::new()))
            .collect();
        Self {
            id,
            columns: vec![Vec::new(); schema.properties.len()],
            schema,
            keys: Vec::new(),
            primary,
            secondary,
            next_key: 1,
        }
    }

    /// Table id.
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Object type stored here.
    #[must_use]
    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.schema
    }

    /// Object type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Row keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> &[ObjectKey] {
        &self.keys
    }

    /// Row index of `key`.
    #[must_use]
    pub fn position(&self, key: ObjectKey) -> Option<usize> {
        self.keys.binary_search(&key).ok()
    }

    /// Whether `key` names a live row.
    #[must_use]
    pub fn contains(&self, key: ObjectKey) -> bool {
        self.position(key).is_some()
    }

    /// Key of the row at `index`.
    #[must_use]
    pub fn key_at(&self, index: usize) -> Option<ObjectKey> {
        self.keys.get(index).copied()
    }

    /// One cell.
    #[must_use]
    pub fn value(&self, key: ObjectKey, column: usize) -> Option<&Value> {
        let row = self.position(key)?;
        self.columns.get(column).map(|c| &c[row])
    }

    /// A whole row in property order.
    #[must_use]
    pub fn row(&self, key: ObjectKey) -> Option<Vec<Value>> {
        let row = self.position(key)?;
        Some(self.columns.iter().map(|c| c[row].clone()).collect())
    }

    /// Every row in key order.
    pub fn rows(&self) -> impl Iterator<Item = (ObjectKey, Vec<Value>)> + '_ {
        self.keys
            .iter()
            .enumerate()
            .map(|(row, key)| (*key, self.columns.iter().map(|c| c[row].clone()).collect()))
    }

    /// Key the next insert will get.
    #[must_use]
    pub fn next_key(&self) -> u64 {
        self.next_key
    }

    /// Raises the key counter to at least `next`.
    pub fn reserve_keys(&mut self, next: u64) {
        self.next_key = self.next_key.max(next);
    }

    /// Allocates a fresh key.
    pub fn allocate_key(&mut self) -> ObjectKey {
        let key = ObjectKey::new(self.next_key);
        self.next_key += 1;
        key
    }

    /// The row whose primary key equals `key`.
    #[must_use]
    pub fn find_by_primary_key(&self, key: &IndexKey) -> Option<ObjectKey> {
        self.primary.as_ref().and_then(|(_, index)| index.get(key))
    }

    /// Rows whose `column` equals `key`, or `None` if the column has no index.
    #[must_use]
    pub fn find_indexed(&self, column: usize, key: &IndexKey) -> Option<Vec<ObjectKey>> {
        if let Some((c, index)) = &self.primary {
            if *c == column {
                return Some(index.get(key).into_iter().collect());
            }
        }
        self.secondary
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, index)| index.lookup(key))
    }

    /// Inserts a row at its key position.
    ///
    /// # Errors
    ///
    /// Fails with `DuplicateKey` on a primary-key collision, or
    /// `InvalidFormat` if the key exists or the row has the wrong width.
    pub fn insert(&mut self, key: ObjectKey, row: Vec<Value>) -> CoreResult<()> {
        if row.len() != self.columns.len() {
            return Err(CoreError::invalid_format(format!(
                "row for '{}' has {} values, expected {}",
                self.schema.name,
                row.len(),
                self.columns.len()
            )));
        }
        let Err(position) = self.keys.binary_search(&key) else {
            return Err(CoreError::invalid_format(format!(
                "row {key} already exists in '{}'",
                self.schema.name
            )));
        };

        if let Some((c, index)) = &self.primary {
            let pk = self.index_key(*c, &row[*c])?;
            if index.get(&pk).is_some() {
                return Err(self.duplicate(&pk));
            }
        }

        self.index_row(key, &row);
        self.keys.insert(position, key);
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.insert(position, value);
        }
        self.next_key = self.next_key.max(key.as_u64() + 1);
        Ok(())
    }

    /// Overwrites one cell.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidatedObject` for a missing row, or `DuplicateKey`
    /// if a primary-key change collides.
    pub fn set(&mut self, key: ObjectKey, column: usize, value: Value) -> CoreResult<()> {
        let row = self.position(key).ok_or(CoreError::InvalidatedObject)?;
        if column >= self.columns.len() {
            return Err(CoreError::invalid_format("column out of range"));
        }
        let old = &self.columns[column][row];
        if *old == value {
            return Ok(());
        }

        if let Some((c, index)) = &self.primary {
            if *c == column {
                let new_key = self.index_key(column, &value)?;
                if let Some(existing) = index.get(&new_key) {
                    if existing != key {
                        return Err(self.duplicate(&new_key));
                    }
                }
            }
        }

        let old = std::mem::replace(&mut self.columns[column][row], value);
        self.reindex(key, column, &old);
        Ok(())
    }

    /// Removes a row, shifting later rows down.
    pub fn remove(&mut self, key: ObjectKey) -> Option<Vec<Value>> {
        let row = self.position(key)?;
        self.keys.remove(row);
        let values: Vec<Value> = self.columns.iter_mut().map(|c| c.remove(row)).collect();
        self.unindex_row(key, &values);
        Some(values)
    }

    /// Removes every row; the key counter keeps counting.
    pub fn clear(&mut self) {
        self.keys.clear();
        for column in &mut self.columns {
            column.clear();
        }
        if let Some((_, index)) = &mut self.primary {
            index.clear();
        }
        for (_, index) in &mut self.secondary {
            index.clear();
        }
    }

    /// Drops links to `removed` rows of the `target` type.
    ///
    /// Links become null and list entries are removed. Returns the keys of
    /// rows that changed.
    pub fn unlink(&mut self, target: &str, removed: &BTreeSet<ObjectKey>) -> Vec<ObjectKey> {
        let mut changed = BTreeSet::new();
        for (c, property) in self.schema.properties.iter().enumerate() {
            if property.property_type.target() != Some(target) {
                continue;
            }
            for (row, value) in self.columns[c].iter_mut().enumerate() {
                match value {
                    Value::Link(k) if removed.contains(k) => {
                        *value = Value::Null;
                        changed.insert(self.keys[row]);
                    }
                    Value::List(items) => {
                        let before = items.len();
                        items.retain(|k| !removed.contains(k));
                        if items.len() != before {
                            changed.insert(self.keys[row]);
                        }
                    }
                    _ => {}
                }
            }
        }
        changed.into_iter().collect()
    }

    /// A copy of this table laid out for `schema`.
    ///
    /// Values carry over by property name and are converted where the type
    /// allows; new or incompatible properties get their fill value.
    ///
    /// # Errors
    ///
    /// Fails with `DuplicateKey` if the new primary key is not unique.
    pub fn relayout(&self, schema: Arc<ObjectSchema>) -> CoreResult<Table> {
        let mut table = Table::new(self.id, Arc::clone(&schema));
        table.next_key = self.next_key;
        let sources: Vec<Option<usize>> = schema
            .properties
            .iter()
            .map(|p| self.schema.property_index(&p.name))
            .collect();

        for (row, key) in self.keys.iter().enumerate() {
            let values = schema
                .properties
                .iter()
                .zip(&sources)
                .map(|(property, source)| {
                    source
                        .and_then(|c| coerce_value(&self.columns[c][row], &property.property_type))
                        .filter(|v| !v.is_null() || property.optional)
                        .unwrap_or_else(|| property.fill_value())
                })
                .collect();
            table.insert(*key, values)?;
        }
        Ok(table)
    }

    fn index_key(&self, column: usize, value: &Value) -> CoreResult<IndexKey> {
        IndexKey::from_value(value).ok_or_else(|| {
            CoreError::invalid_value(
                &self.schema.name,
                &self.schema.properties[column].name,
                format!("{} values cannot be indexed", value.kind()),
            )
        })
    }

    fn duplicate(&self, key: &IndexKey) -> CoreError {
        CoreError::DuplicateKey {
            object_type: self.schema.name.clone(),
            key: key.to_string(),
        }
    }

    fn index_row(&mut self, key: ObjectKey, row: &[Value]) {
        if let Some((c, index)) = &mut self.primary {
            if let Some(k) = IndexKey::from_value(&row[*c]) {
                index.insert(k, key);
            }
        }
        for (c, index) in &mut self.secondary {
            if let Some(k) = IndexKey::from_value(&row[*c]) {
                index.insert(k, key);
            }
        }
    }

    fn unindex_row(&mut self, key: ObjectKey, row: &[Value]) {
        if let Some((c, index)) = &mut self.primary {
            if let Some(k) = IndexKey::from_value(&row[*c]) {
                index.remove(&k, key);
            }
        }
        for (c, index) in &mut self.secondary {
            if let Some(k) = IndexKey::from_value(&row[*c]) {
                index.remove(&k, key);
            }
        }
    }

    fn reindex(&mut self, key: ObjectKey, column: usize, old: &Value) {
        let Some(row) = self.position(key) else {
            return;
        };
        let new = IndexKey::from_value(&self.columns[column][row]);
        let old = IndexKey::from_value(old);
        if let Some((c, index)) = &mut self.primary {
            if *c == column {
                if let Some(old) = &old {
                    index.remove(old, key);
                }
                if let Some(new) = new.clone() {
                    index.insert(new, key);
                }
            }
        }
        for (c, index) in &mut self.secondary {
            if *c == column {
                if let Some(old) = &old {
                    index.remove(old, key);
                }
                if let Some(new) = new.clone() {
                    index.insert(new, key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertyDescriptor, PropertyType, Schema};
    use proptest::prelude::*;

    fn people() -> Table {
        let schema = Schema::from_object_schemas(vec![ObjectSchema::new("Person")
            .with_property(PropertyDescriptor::new("id", PropertyType::Int))
            .with_property(PropertyDescriptor::new("name", PropertyType::String).indexed())
            .with_property(PropertyDescriptor::new("pets", PropertyType::List("Person".into())))
            .primary_key("id")])
        .unwrap();
        Table::new(TableId::new(1), Arc::new(schema.object_schemas()[0].clone()))
    }

    fn row(id: i64, name: &str) -> Vec<Value> {
        vec![Value::Int(id), Value::String(name.into()), Value::List(Vec::new())]
    }

    #[test]
    fn insert_and_lookup() {
        let mut table = people();
        let a = table.allocate_key();
        table.insert(a, row(1, "ann")).unwrap();
        let b = table.allocate_key();
        table.insert(b, row(2, "bob")).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.position(b), Some(1));
        assert_eq!(table.find_by_primary_key(&IndexKey::Int(2)), Some(b));
        assert_eq!(
            table.find_indexed(1, &IndexKey::String("ann".into())),
            Some(vec![a])
        );
        assert_eq!(table.find_indexed(2, &IndexKey::Null), None);
    }

    #[test]
    fn duplicate_primary_key_is_rejected() {
        let mut table = people();
        let a = table.allocate_key();
        table.insert(a, row(1, "ann")).unwrap();
        let b = table.allocate_key();
        assert!(matches!(
            table.insert(b, row(1, "bob")),
            Err(CoreError::DuplicateKey { .. })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn set_updates_indexes() {
        let mut table = people();
        let a = table.allocate_key();
        table.insert(a, row(1, "ann")).unwrap();
        table.set(a, 1, Value::String("amy".into())).unwrap();
        assert_eq!(table.find_indexed(1, &IndexKey::String("ann".into())), Some(vec![]));
        assert_eq!(
            table.find_indexed(1, &IndexKey::String("amy".into())),
            Some(vec![a])
        );

        let b = table.allocate_key();
        table.insert(b, row(2, "bob")).unwrap();
        assert!(table.set(b, 0, Value::Int(1)).is_err());
        table.set(b, 0, Value::Int(3)).unwrap();
        assert_eq!(table.find_by_primary_key(&IndexKey::Int(3)), Some(b));
    }

    #[test]
    fn remove_shifts_rows_down() {
        let mut table = people();
        let keys: Vec<_> = (0..4)
            .map(|i| {
                let k = table.allocate_key();
                table.insert(k, row(i, "x")).unwrap();
                k
            })
            .collect();
        table.remove(keys[1]).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.key_at(1), Some(keys[2]));
        assert_eq!(table.value(keys[2], 0), Some(&Value::Int(2)));
        assert_eq!(table.find_by_primary_key(&IndexKey::Int(1)), None);
    }

    #[test]
    fn unlink_removes_dangling_links() {
        let mut table = people();
        let a = table.allocate_key();
        let b = table.allocate_key();
        table.insert(a, row(1, "a")).unwrap();
        table
            .insert(b, vec![Value::Int(2), Value::String("b".into()), Value::List(vec![a, b])])
            .unwrap();
        let removed = BTreeSet::from([a]);
        assert_eq!(table.unlink("Person", &removed), vec![b]);
        assert_eq!(table.value(b, 2), Some(&Value::List(vec![b])));
    }

    #[test]
    fn relayout_carries_values_by_name() {
        let mut table = people();
        let a = table.allocate_key();
        table.insert(a, row(1, "ann")).unwrap();

        let schema = Arc::new(
            ObjectSchema::new("Person")
                .with_property(PropertyDescriptor::new("name", PropertyType::String))
                .with_property(PropertyDescriptor::new("age", PropertyType::Int).default_value(30)),
        );
        let moved = table.relayout(schema).unwrap();
        assert_eq!(
            moved.row(a),
            Some(vec![Value::String("ann".into()), Value::Int(30)])
        );
        assert_eq!(moved.next_key(), table.next_key());
    }

    proptest! {
        #[test]
        fn keys_stay_sorted_and_indexed(ops in prop::collection::vec((any::<bool>(), 0i64..20), 1..60)) {
            let mut table = people();
            let mut live: Vec<(ObjectKey, i64)> = Vec::new();
            for (insert, id) in ops {
                if insert {
                    if live.iter().any(|(_, i)| *i == id) {
                        continue;
                    }
                    let k = table.allocate_key();
                    table.insert(k, row(id, "p")).unwrap();
                    live.push((k, id));
                } else if let Some(pos) = live.iter().position(|(_, i)| *i == id) {
                    let (k, _) = live.remove(pos);
                    table.remove(k).unwrap();
                }
            }
            prop_assert_eq!(table.len(), live.len());
            prop_assert!(table.keys().windows(2).all(|w| w[0] < w[1]));
            for (k, id) in &live {
                prop_assert_eq!(table.find_by_primary_key(&IndexKey::Int(*id)), Some(*k));
            }
        }
    }
}
