//! Object creation, update and deletion inside a write transaction.

use crate::engine::IndexKey;
use crate::error::{CoreError, CoreResult};
use crate::object::{Input, Object, UpdateMode, Value, Values};
use crate::schema::{coerce_value, describe_input, ObjectSchema, PropertyDescriptor, PropertyType};
use crate::transaction::WriteTransaction;
use crate::types::{ObjectKey, TableId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Applies object-level writes to a transaction's working snapshot.
///
/// Records every object it creates so factory hooks can run once the
/// transaction lock is released. Inserts and cell writes are journaled so a
/// failed call can be undone without touching the rest of the transaction.
pub(crate) struct Writer<'t> {
    txn: &'t mut WriteTransaction,
    store: usize,
    created: Vec<(TableId, ObjectKey, Arc<str>)>,
    journal: Vec<Undo>,
}

/// One step of [`Writer::undo`].
#[derive(Debug)]
enum Undo {
    Inserted(TableId, ObjectKey),
    Stored(TableId, ObjectKey, usize, Value),
    Marked(TableId, ObjectKey),
}

impl<'t> Writer<'t> {
    /// `store` identifies the store the transaction belongs to; linked
    /// objects must come from the same one.
    pub(crate) fn new(txn: &'t mut WriteTransaction, store: usize) -> Self {
        Self {
            txn,
            store,
            created: Vec::new(),
            journal: Vec::new(),
        }
    }

    /// Reverts every insert and cell write made through this writer.
    pub(crate) fn undo(mut self) {
        while let Some(step) = self.journal.pop() {
            match step {
                Undo::Inserted(table_id, key) => {
                    if let Some(table) = self.txn.working_mut().table_mut(table_id) {
                        table.remove(key);
                    }
                }
                Undo::Stored(table_id, key, column, old) => {
                    let restored = self
                        .txn
                        .working_mut()
                        .table_mut(table_id)
                        .map(|table| table.set(key, column, old));
                    if let Some(Err(err)) = restored {
                        tracing::warn!(error = %err, %key, "could not restore overwritten value");
                    }
                }
                Undo::Marked(table_id, key) => self.txn.unmark_dirty(table_id, key),
            }
        }
    }

    /// Objects created so far, children before parents.
    pub(crate) fn into_created(self) -> Vec<(TableId, ObjectKey, Arc<str>)> {
        self.created
    }

    /// Creates an object, or merges into an existing one under `Upsert`.
    pub(crate) fn create(
        &mut self,
        object_type: &str,
        values: &Values,
        mode: UpdateMode,
    ) -> CoreResult<(TableId, ObjectKey)> {
        let working = self.txn.working();
        let table_id = working
            .table_id(object_type)
            .ok_or_else(|| CoreError::unknown_object_type(object_type))?;
        let schema = Arc::clone(
            working
                .table(table_id)
                .ok_or_else(|| CoreError::unknown_object_type(object_type))?
                .schema(),
        );
        let inputs = spread(&schema, values)?;

        if let Some(pk) = schema.primary_key_index() {
            if !inputs[pk].is_undefined() {
                let value = self.convert(&schema, &schema.properties[pk], &inputs[pk], mode)?;
                let existing = IndexKey::from_value(&value).and_then(|key| {
                    self.txn
                        .working()
                        .table(table_id)
                        .and_then(|t| t.find_by_primary_key(&key).map(|row| (row, key)))
                });
                if let Some((row, key)) = existing {
                    return match mode {
                        UpdateMode::Disallowed => Err(CoreError::DuplicateKey {
                            object_type: schema.name.clone(),
                            key: key.to_string(),
                        }),
                        UpdateMode::Upsert => {
                            self.merge(table_id, row, &schema, &inputs, pk, mode)?;
                            Ok((table_id, row))
                        }
                    };
                }
            }
        }

        let mut row = Vec::with_capacity(schema.properties.len());
        for (property, input) in schema.properties.iter().zip(&inputs) {
            let value = match input {
                Input::Undefined => self.fill(&schema, property, mode)?,
                input => self.convert(&schema, property, input, mode)?,
            };
            row.push(value);
        }

        let table = self
            .txn
            .working_mut()
            .table_mut(table_id)
            .ok_or_else(|| CoreError::unknown_object_type(object_type))?;
        let key = table.allocate_key();
        table.insert(key, row)?;
        self.journal.push(Undo::Inserted(table_id, key));
        self.mark(table_id, key);
        self.created.push((table_id, key, Arc::from(schema.name.as_str())));
        Ok((table_id, key))
    }

    /// Writes one property of an existing object.
    pub(crate) fn set(
        &mut self,
        table_id: TableId,
        key: ObjectKey,
        property: &str,
        input: &Input,
    ) -> CoreResult<()> {
        let table = self
            .txn
            .working()
            .table(table_id)
            .ok_or(CoreError::InvalidatedObject)?;
        if !table.contains(key) {
            return Err(CoreError::InvalidatedObject);
        }
        let schema = Arc::clone(table.schema());
        let column = schema
            .property_index(property)
            .ok_or_else(|| CoreError::unknown_property(&schema.name, property))?;
        if input.is_undefined() {
            return Ok(());
        }
        let value = self.convert(&schema, &schema.properties[column], input, UpdateMode::Disallowed)?;
        self.store_value(table_id, key, column, value)
    }

    /// Deletes rows and clears links pointing at them.
    pub(crate) fn delete(&mut self, targets: &[(TableId, ObjectKey)]) -> CoreResult<usize> {
        let mut by_table: BTreeMap<TableId, BTreeSet<ObjectKey>> = BTreeMap::new();
        for &(table, key) in targets {
            by_table.entry(table).or_default().insert(key);
        }

        let mut deleted = 0;
        for (table_id, keys) in by_table {
            let Some(table) = self.txn.working_mut().table_mut(table_id) else {
                return Err(CoreError::InvalidatedObject);
            };
            let target = table.name().to_string();
            let mut removed = BTreeSet::new();
            for key in keys {
                if table.remove(key).is_some() {
                    removed.insert(key);
                }
            }
            if removed.is_empty() {
                continue;
            }
            deleted += removed.len();
            for &key in &removed {
                self.txn.mark_dirty(table_id, key);
            }
            self.unlink(&target, &removed);
        }
        Ok(deleted)
    }

    /// Empties every table.
    pub(crate) fn delete_all(&mut self) -> usize {
        let mut deleted = 0;
        for table_id in self.txn.working().table_ids() {
            let Some(table) = self.txn.working_mut().table_mut(table_id) else {
                continue;
            };
            deleted += table.len();
            table.clear();
            self.txn.mark_rewritten(table_id);
        }
        deleted
    }

    fn unlink(&mut self, target: &str, removed: &BTreeSet<ObjectKey>) {
        let referrers: Vec<TableId> = self
            .txn
            .working()
            .tables()
            .filter(|t| {
                t.schema()
                    .properties
                    .iter()
                    .any(|p| p.property_type.target() == Some(target))
            })
            .map(|t| t.id())
            .collect();
        for table_id in referrers {
            let changed = match self.txn.working_mut().table_mut(table_id) {
                Some(table) => table.unlink(target, removed),
                None => continue,
            };
            for key in changed {
                self.txn.mark_dirty(table_id, key);
            }
        }
    }

    fn merge(
        &mut self,
        table_id: TableId,
        key: ObjectKey,
        schema: &ObjectSchema,
        inputs: &[Input],
        primary_key: usize,
        mode: UpdateMode,
    ) -> CoreResult<()> {
        let mut values = Vec::with_capacity(inputs.len());
        for (column, input) in inputs.iter().enumerate() {
            if column == primary_key || input.is_undefined() {
                continue;
            }
            values.push((column, self.convert(schema, &schema.properties[column], input, mode)?));
        }
        for (column, value) in values {
            self.store_value(table_id, key, column, value)?;
        }
        Ok(())
    }

    fn store_value(
        &mut self,
        table_id: TableId,
        key: ObjectKey,
        column: usize,
        value: Value,
    ) -> CoreResult<()> {
        let table = self
            .txn
            .working_mut()
            .table_mut(table_id)
            .ok_or(CoreError::InvalidatedObject)?;
        let old = match table.value(key, column) {
            Some(old) if *old == value => return Ok(()),
            Some(old) => old.clone(),
            None => return Err(CoreError::InvalidatedObject),
        };
        table.set(key, column, value)?;
        self.journal.push(Undo::Stored(table_id, key, column, old));
        self.mark(table_id, key);
        Ok(())
    }

    fn mark(&mut self, table_id: TableId, key: ObjectKey) {
        if !self.txn.dirty().contains(&(table_id, key)) {
            self.txn.mark_dirty(table_id, key);
            self.journal.push(Undo::Marked(table_id, key));
        }
    }

    /// Value of a property the caller left out of a new object.
    fn fill(
        &mut self,
        schema: &ObjectSchema,
        property: &PropertyDescriptor,
        mode: UpdateMode,
    ) -> CoreResult<Value> {
        if let Some(default) = &property.default {
            return self.convert(schema, property, default, mode);
        }
        match &property.property_type {
            PropertyType::List(_) => Ok(Value::List(Vec::new())),
            _ if property.optional => Ok(Value::Null),
            _ => Err(CoreError::MissingRequiredProperty {
                object_type: schema.name.clone(),
                property: property.name.clone(),
            }),
        }
    }

    fn convert(
        &mut self,
        schema: &ObjectSchema,
        property: &PropertyDescriptor,
        input: &Input,
        mode: UpdateMode,
    ) -> CoreResult<Value> {
        let mismatch = |found: &str| {
            CoreError::invalid_value(
                &schema.name,
                &property.name,
                format!("expected {}, found {found}", property.property_type),
            )
        };

        match (input, &property.property_type) {
            (Input::Undefined, _) => self.fill(schema, property, mode),
            (Input::Null, PropertyType::List(_)) => Ok(Value::List(Vec::new())),
            (Input::Null, _) if property.optional => Ok(Value::Null),
            (Input::Null, _) => Err(CoreError::invalid_value(
                &schema.name,
                &property.name,
                "null is not allowed for a required property",
            )),
            (Input::Value(Value::Link(key)), PropertyType::Object(target)) => {
                self.check_row(schema, property, target, *key)?;
                Ok(Value::Link(*key))
            }
            (Input::Value(Value::List(keys)), PropertyType::List(target)) => {
                for key in keys {
                    self.check_row(schema, property, target, *key)?;
                }
                Ok(Value::List(keys.clone()))
            }
            (Input::Value(value), ty) => {
                coerce_value(value, ty).ok_or_else(|| mismatch(value.kind()))
            }
            (Input::Object(object), PropertyType::Object(target)) => {
                let key = self.link(schema, property, target, object)?;
                Ok(Value::Link(key))
            }
            (Input::Nested(values), PropertyType::Object(target)) => {
                let (_, key) = self.create(target, values, mode)?;
                Ok(Value::Link(key))
            }
            (Input::List(items), PropertyType::List(target)) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in items {
                    let key = match item {
                        Input::Object(object) => self.link(schema, property, target, object)?,
                        Input::Nested(values) => self.create(target, values, mode)?.1,
                        other => return Err(mismatch(describe_input(other))),
                    };
                    keys.push(key);
                }
                Ok(Value::List(keys))
            }
            (other, _) => Err(mismatch(describe_input(other))),
        }
    }

    fn link(
        &self,
        schema: &ObjectSchema,
        property: &PropertyDescriptor,
        target: &str,
        object: &Object,
    ) -> CoreResult<ObjectKey> {
        if object.realm().store_id()? != self.store {
            return Err(CoreError::invalid_value(
                &schema.name,
                &property.name,
                "object belongs to a different store",
            ));
        }
        if object.object_type() != target {
            return Err(CoreError::invalid_value(
                &schema.name,
                &property.name,
                format!(
                    "expected object of type '{target}', found '{}'",
                    object.object_type()
                ),
            ));
        }
        self.check_row(schema, property, target, object.key())?;
        Ok(object.key())
    }

    fn check_row(
        &self,
        schema: &ObjectSchema,
        property: &PropertyDescriptor,
        target: &str,
        key: ObjectKey,
    ) -> CoreResult<()> {
        let exists = self
            .txn
            .working()
            .table_by_name(target)
            .is_some_and(|t| t.contains(key));
        if exists {
            Ok(())
        } else {
            Err(CoreError::invalid_value(
                &schema.name,
                &property.name,
                format!("linked '{target}' object {key} does not exist"),
            ))
        }
    }
}

/// One input per property, in declared order.
fn spread(schema: &ObjectSchema, values: &Values) -> CoreResult<Vec<Input>> {
    let mut inputs = vec![Input::Undefined; schema.properties.len()];
    match values {
        Values::Named(pairs) => {
            for (name, input) in pairs {
                let column = schema
                    .property_index(name)
                    .ok_or_else(|| CoreError::unknown_property(&schema.name, name))?;
                inputs[column] = input.clone();
            }
        }
        Values::Positional(items) => {
            if items.len() > inputs.len() {
                return Err(CoreError::configuration(format!(
                    "'{}' has {} properties but {} values were given",
                    schema.name,
                    inputs.len(),
                    items.len()
                )));
            }
            for (slot, input) in inputs.iter_mut().zip(items) {
                *slot = input.clone();
            }
        }
    }
    Ok(inputs)
}
