//! Realm handles.
//!
//! A [`Realm`] is a handle onto a shared store. Handles opened on the same
//! path in one process share the store, its writer gate and its committed
//! snapshot; each handle has its own transaction slot and listeners.
//!
//! ```rust,ignore
//! use keepdb_core::{Config, Realm, UpdateMode, Values};
//!
//! let realm = Realm::open(Config::new().path("people.keepdb").schema([person_schema()]))?;
//! realm.write(|r| {
//!     r.create("Person", Values::new().with("name", "Alice"), UpdateMode::Disallowed)?;
//!     Ok(())
//! })?;
//! assert_eq!(realm.objects("Person")?.len()?, 1);
//! realm.close();
//! ```

use crate::change_feed::ChangeEvent;
use crate::config::Config;
use crate::crypto::CryptoManager;
use crate::dir::{read_manifest, wal_path};
use crate::engine::{verify_key, CompactionStats, IndexKey, SharedStore, Snapshot};
use crate::error::{CoreError, CoreResult};
use crate::notify::{Listener, ListenerRegistry};
use crate::object::writer::Writer;
use crate::object::{
    same_factory, Deletable, Object, ObjectFactory, ResultSet, UpdateMode, Value, Values,
};
use crate::schema::{
    coerce_value, plan, MigrationContext, MigrationFn, Schema, SchemaItem, SchemaPlan,
};
use crate::transaction::{WriteScope, WriteTransaction};
use crate::types::{ObjectKey, SequenceNumber, TableId, TransactionId};
use crate::wal::{WalManager, WalRecord};
use keepdb_storage::InMemoryBackend;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Stores open in this process, by canonical path.
static OPEN_STORES: Mutex<BTreeMap<PathBuf, Weak<SharedStore>>> =
    parking_lot::const_mutex(BTreeMap::new());

type Created = Vec<(TableId, ObjectKey, Arc<str>)>;

/// A handle onto a store.
///
/// Cloning is cheap and yields the same handle: clones share the
/// transaction slot and listeners. Open another handle with
/// [`Realm::open`] to get an independent one.
#[derive(Clone)]
pub struct Realm {
    inner: Arc<RealmInner>,
}

struct RealmInner {
    handle: u64,
    path: Option<PathBuf>,
    busy_timeout: Duration,
    store: RwLock<Option<Arc<SharedStore>>>,
    bindings: HashMap<String, Arc<dyn ObjectFactory>>,
    txn: Mutex<Option<WriteTransaction>>,
    listeners: ListenerRegistry,
}

impl Drop for RealmInner {
    fn drop(&mut self) {
        let store = self.store.get_mut().take();
        if let (Some(store), Some(txn)) = (store, self.txn.get_mut().take()) {
            warn!(txid = %txn.txid(), "realm dropped inside a transaction, rolling back");
            store.rollback(txn);
        }
    }
}

/// Sizes of a store's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Sequence of the latest commit.
    pub sequence: SequenceNumber,
    /// WAL size in bytes.
    pub wal_bytes: u64,
    /// Segment file size in bytes.
    pub segment_bytes: u64,
}

impl Realm {
    /// Opens a realm.
    ///
    /// The schema is validated before any storage is touched, then
    /// reconciled against the persisted one:
    ///
    /// - a new store persists the given schema at the given version (0 if unset)
    /// - no version, or the persisted one: new types are added; changed ones
    ///   are rejected with [`CoreError::SchemaValidation`]
    /// - a lower version, or a higher one without a migration:
    ///   [`CoreError::SchemaVersionMismatch`]
    /// - a higher version with a migration: the migration runs in the
    ///   transaction that commits the new schema
    ///
    /// # Errors
    ///
    /// Schema, key and I/O errors as above, and
    /// [`CoreError::SchemaVersionMismatch`] if the path is already open in
    /// this process at another version.
    pub fn open(config: Config) -> CoreResult<Realm> {
        let (requested, bindings) = validate_items(config.schema.as_deref())?;

        let (path, store, shared) = if config.in_memory {
            (None, SharedStore::open_in_memory(&config)?, false)
        } else {
            let path = config.resolve_path()?;
            let canonical = canonical_path(&path, config.create_if_missing)?;
            let (store, shared) = acquire_store(&canonical, &config)?;
            (Some(canonical), store, shared)
        };

        let realm = Realm {
            inner: Arc::new(RealmInner {
                handle: NEXT_HANDLE.fetch_add(1, Ordering::SeqCst),
                path,
                busy_timeout: config.busy_timeout,
                store: RwLock::new(Some(store)),
                bindings,
                txn: Mutex::new(None),
                listeners: ListenerRegistry::default(),
            }),
        };
        realm.reconcile(
            requested.as_ref(),
            config.schema_version,
            config.migration.as_ref(),
            shared,
        )?;
        info!(
            path = ?realm.inner.path,
            handle = realm.inner.handle,
            schema_version = realm.schema_version()?,
            "opened realm"
        );
        Ok(realm)
    }

    /// Opens a private in-memory realm.
    ///
    /// # Errors
    ///
    /// Fails if the schema does not validate.
    pub fn open_in_memory(
        schema: impl IntoIterator<Item = impl Into<SchemaItem>>,
    ) -> CoreResult<Realm> {
        Realm::open(Config::new().in_memory(true).schema(schema))
    }

    fn reconcile(
        &self,
        requested: Option<&Schema>,
        version: Option<u64>,
        migration: Option<&MigrationFn>,
        shared: bool,
    ) -> CoreResult<()> {
        let store = self.store()?;
        if store.is_new() {
            let schema = requested.cloned().unwrap_or_default();
            if store.initialize(&schema, version.unwrap_or(0))? {
                return Ok(());
            }
        }

        let committed = store.committed();
        let persisted_version = committed.schema_version();
        let mismatch = |requested| CoreError::SchemaVersionMismatch {
            persisted: persisted_version,
            requested,
        };
        if let Some(requested_version) = version.filter(|v| shared && *v != persisted_version) {
            return Err(mismatch(requested_version));
        }

        match plan(
            &committed.schema(),
            persisted_version,
            requested,
            version,
            migration.is_some(),
        )? {
            SchemaPlan::Keep => Ok(()),
            SchemaPlan::Extend(schema) => {
                debug!(types = schema.len(), "extending persisted schema");
                self.write(|realm| realm.stage_schema(&schema, None))
            }
            SchemaPlan::Migrate {
                schema,
                version: new_version,
            } => {
                let migration = migration.ok_or_else(|| mismatch(new_version))?;
                info!(
                    from = persisted_version,
                    to = new_version,
                    "migrating schema"
                );
                self.write(|realm| {
                    realm.stage_schema(&schema, Some(new_version))?;
                    migration(&MigrationContext {
                        old_version: persisted_version,
                        new_version,
                        realm,
                    })
                })
            }
        }
    }

    fn stage_schema(&self, schema: &Schema, version: Option<u64>) -> CoreResult<()> {
        self.with_txn(|txn| {
            let changes = txn.working_mut().apply_schema(schema)?;
            for id in changes.rewritten {
                txn.mark_rewritten(id);
            }
            for id in changes.dropped {
                txn.mark_dropped(id);
            }
            if let Some(version) = version {
                txn.working_mut().set_schema_version(version);
            }
            txn.mark_schema_changed();
            Ok(())
        })
    }

    // --- transactions ---

    /// Runs `body` in a write transaction.
    ///
    /// Commits when `body` returns `Ok`, then runs the change listeners.
    /// When `body` fails or panics the transaction is rolled back and the
    /// error is returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NestedTransaction`] if the handle is already writing;
    ///   the outer transaction is unaffected
    /// - [`CoreError::Busy`] if another handle holds the writer gate too long
    /// - the body's error
    /// - the first listener error; the commit stays durable
    pub fn write<R>(&self, body: impl FnOnce(&Realm) -> CoreResult<R>) -> CoreResult<R> {
        let scope = WriteScope::begin(self)?;
        let value = body(self)?;
        scope.commit()?;
        Ok(value)
    }

    /// Starts a write transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::NestedTransaction`] if one is open on this handle,
    /// [`CoreError::Busy`] on writer-gate timeout.
    pub fn begin_transaction(&self) -> CoreResult<()> {
        let store = self.store()?;
        if self.inner.txn.lock().is_some() {
            return Err(CoreError::NestedTransaction);
        }
        let txn = store.begin(self.inner.handle, self.inner.busy_timeout)?;
        *self.inner.txn.lock() = Some(txn);
        Ok(())
    }

    /// Commits the open transaction and runs the change listeners.
    ///
    /// # Errors
    ///
    /// [`CoreError::OutsideTransaction`] without a transaction, commit I/O
    /// errors, or the first listener error.
    pub fn commit_transaction(&self) -> CoreResult<()> {
        let store = self.store()?;
        let txn = self
            .inner
            .txn
            .lock()
            .take()
            .ok_or(CoreError::OutsideTransaction)?;
        store.commit(txn)?;
        self.inner.listeners.dispatch(self)
    }

    /// Discards the open transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::OutsideTransaction`] without a transaction.
    pub fn cancel_transaction(&self) -> CoreResult<()> {
        let store = self.store()?;
        let txn = self
            .inner
            .txn
            .lock()
            .take()
            .ok_or(CoreError::OutsideTransaction)?;
        store.rollback(txn);
        Ok(())
    }

    /// Whether a write transaction is open on this handle.
    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.inner.txn.lock().is_some()
    }

    // --- objects ---

    /// Creates an object of `object_type`.
    ///
    /// `values` may name properties or list them in declared order. Missing
    /// properties take their default, null when optional, or an empty list;
    /// otherwise the create fails. Under [`UpdateMode::Upsert`] an existing
    /// object with the same primary key is updated in place with only the
    /// supplied values.
    ///
    /// # Errors
    ///
    /// - [`CoreError::OutsideTransaction`] without a write transaction
    /// - [`CoreError::UnknownObjectType`], [`CoreError::UnknownProperty`]
    /// - [`CoreError::DuplicateKey`] on a primary-key collision under
    ///   [`UpdateMode::Disallowed`]
    /// - [`CoreError::MissingRequiredProperty`], [`CoreError::InvalidPropertyValue`]
    /// - an error from the type's factory
    pub fn create(&self, object_type: &str, values: Values, mode: UpdateMode) -> CoreResult<Object> {
        let ((table, key), created) =
            self.run_writer(|writer| writer.create(object_type, &values, mode))?;
        self.construct(created)?;
        Ok(Object::new(self.clone(), table, key, Arc::from(object_type)))
    }

    /// Creates an object of the type bound to `factory`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownObjectType`] if `factory` is not registered with
    /// this realm, otherwise as [`Realm::create`].
    pub fn create_with<F: ObjectFactory + ?Sized>(
        &self,
        factory: &F,
        values: Values,
        mode: UpdateMode,
    ) -> CoreResult<Object> {
        let (object_type, _) = self.binding(factory)?;
        self.create(&object_type, values, mode)
    }

    /// All objects of `object_type`, in creation order.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownObjectType`] for a type not in the schema.
    pub fn objects(&self, object_type: &str) -> CoreResult<ResultSet> {
        let table = self.table_id(object_type)?;
        Ok(ResultSet::new(
            self.clone(),
            table,
            Arc::from(object_type),
            None,
        ))
    }

    /// All objects of the type bound to `factory`.
    ///
    /// Each object the result set hands out is passed to
    /// [`ObjectFactory::materialized`].
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownObjectType`] if `factory` is not registered.
    pub fn objects_with<F: ObjectFactory + ?Sized>(&self, factory: &F) -> CoreResult<ResultSet> {
        let (object_type, bound) = self.binding(factory)?;
        let table = self.table_id(&object_type)?;
        Ok(ResultSet::new(
            self.clone(),
            table,
            Arc::from(object_type.as_str()),
            Some(bound),
        ))
    }

    /// The object of `object_type` whose primary key equals `key`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownObjectType`], or `SchemaValidation` if the type
    /// has no primary key, or `InvalidPropertyValue` if `key` has the wrong
    /// type.
    pub fn find_by_primary_key(
        &self,
        object_type: &str,
        key: impl Into<Value>,
    ) -> CoreResult<Option<Object>> {
        let key = key.into();
        let (table_id, found) = self.read(|snapshot| {
            let table = snapshot
                .table_by_name(object_type)
                .ok_or_else(|| CoreError::unknown_object_type(object_type))?;
            let schema = table.schema();
            let column = schema.primary_key_index().ok_or_else(|| {
                CoreError::schema_validation(format!("'{object_type}' has no primary key"))
            })?;
            let property = &schema.properties[column];
            let index_key = coerce_value(&key, &property.property_type)
                .and_then(|value| IndexKey::from_value(&value))
                .ok_or_else(|| {
                    CoreError::invalid_value(
                        object_type,
                        &property.name,
                        format!("expected {}, found {}", property.property_type, key.kind()),
                    )
                })?;
            Ok((table.id(), table.find_by_primary_key(&index_key)))
        })?;
        Ok(found.map(|row| Object::new(self.clone(), table_id, row, Arc::from(object_type))))
    }

    /// Deletes objects.
    ///
    /// Links to deleted objects become null and list entries are removed.
    /// A result set is evaluated once, at the call.
    ///
    /// # Errors
    ///
    /// - [`CoreError::OutsideTransaction`] without a write transaction
    /// - [`CoreError::Configuration`] for an empty list or objects of
    ///   another store
    /// - [`CoreError::InvalidatedObject`] for an object already deleted
    pub fn delete(&self, target: impl Into<Deletable>) -> CoreResult<()> {
        let store = self.store_id()?;
        if !self.is_in_transaction() {
            return Err(CoreError::OutsideTransaction);
        }

        let targets: Vec<(TableId, ObjectKey)> = match target.into() {
            Deletable::Object(object) => vec![self.owned(&object, store)?],
            Deletable::Objects(objects) => {
                if objects.is_empty() {
                    return Err(CoreError::configuration("nothing to delete"));
                }
                objects
                    .iter()
                    .map(|object| self.owned(object, store))
                    .collect::<CoreResult<_>>()?
            }
            Deletable::Results(results) => {
                if results.realm().store_id()? != store {
                    return Err(CoreError::configuration(
                        "result set belongs to a different store",
                    ));
                }
                let table = results.table();
                results.keys()?.into_iter().map(|key| (table, key)).collect()
            }
        };

        let (deleted, _) = self.run_writer(|writer| writer.delete(&targets))?;
        debug!(deleted, "deleted objects");
        Ok(())
    }

    /// Deletes every object of every type.
    ///
    /// # Errors
    ///
    /// [`CoreError::OutsideTransaction`] without a write transaction.
    pub fn delete_all(&self) -> CoreResult<()> {
        let (deleted, _) = self.run_writer(|writer| Ok(writer.delete_all()))?;
        debug!(deleted, "deleted all objects");
        Ok(())
    }

    // --- notifications ---

    /// Registers a listener. Registering the same `Arc` again is a no-op.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownEvent`] for anything but `"change"`.
    pub fn on(&self, event: &str, listener: Listener) -> CoreResult<()> {
        self.store()?;
        self.inner.listeners.add(event, listener)
    }

    /// Removes one registration of `listener`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownEvent`] for anything but `"change"`.
    pub fn off(&self, event: &str, listener: &Listener) -> CoreResult<()> {
        self.store()?;
        self.inner.listeners.remove(event, listener)
    }

    /// Removes every listener.
    ///
    /// # Errors
    ///
    /// [`CoreError::DatabaseClosed`] after close.
    pub fn off_all(&self) -> CoreResult<()> {
        self.store()?;
        self.inner.listeners.clear();
        Ok(())
    }

    /// Per-object change events from every handle on the store.
    ///
    /// # Errors
    ///
    /// [`CoreError::DatabaseClosed`] after close.
    pub fn subscribe_changes(&self) -> CoreResult<Receiver<ChangeEvent>> {
        Ok(self.store()?.change_feed().subscribe())
    }

    /// Retained change events after `cursor`, oldest first, at most `limit`.
    ///
    /// History is bounded, so a cursor far behind may miss events.
    ///
    /// # Errors
    ///
    /// [`CoreError::DatabaseClosed`] after close.
    pub fn changes_since(&self, cursor: SequenceNumber, limit: usize) -> CoreResult<Vec<ChangeEvent>> {
        Ok(self.store()?.change_feed().poll(cursor, limit))
    }

    // --- lifecycle and maintenance ---

    /// Closes the handle. Idempotent.
    ///
    /// An open transaction is rolled back. Objects and result sets issued
    /// by the handle become invalid. The store is checkpointed and unlocked
    /// once its last handle closes.
    pub fn close(&self) {
        let Some(store) = self.inner.store.write().take() else {
            return;
        };
        if let Some(txn) = self.inner.txn.lock().take() {
            store.rollback(txn);
        }
        self.inner.listeners.clear();
        info!(path = ?self.inner.path, handle = self.inner.handle, "closed realm");
    }

    /// Whether [`Realm::close`] has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.store.read().is_none()
    }

    /// Moves committed state into the manifest and resets the WAL.
    ///
    /// # Errors
    ///
    /// I/O errors, or [`CoreError::DatabaseClosed`].
    pub fn checkpoint(&self) -> CoreResult<()> {
        self.store()?.checkpoint()
    }

    /// Rewrites the segment file with live rows only.
    ///
    /// # Errors
    ///
    /// I/O errors, or [`CoreError::DatabaseClosed`].
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        self.store()?.compact()
    }

    /// Store directory; `None` for in-memory realms.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// The schema as seen by this handle.
    ///
    /// # Errors
    ///
    /// [`CoreError::DatabaseClosed`] after close.
    pub fn schema(&self) -> CoreResult<Schema> {
        self.read(|snapshot| Ok(snapshot.schema()))
    }

    /// The schema version as seen by this handle.
    ///
    /// # Errors
    ///
    /// [`CoreError::DatabaseClosed`] after close.
    pub fn schema_version(&self) -> CoreResult<u64> {
        self.read(|snapshot| Ok(snapshot.schema_version()))
    }

    /// Whether the store is encrypted.
    ///
    /// # Errors
    ///
    /// [`CoreError::DatabaseClosed`] after close.
    pub fn is_encrypted(&self) -> CoreResult<bool> {
        Ok(self.store()?.is_encrypted())
    }

    /// Current file sizes.
    ///
    /// # Errors
    ///
    /// I/O errors, or [`CoreError::DatabaseClosed`].
    pub fn storage_stats(&self) -> CoreResult<StorageStats> {
        let store = self.store()?;
        Ok(StorageStats {
            sequence: store.committed().sequence(),
            wal_bytes: store.wal_size()?,
            segment_bytes: store.segment_size()?,
        })
    }

    /// Pins the latest commit for consistent reads.
    ///
    /// # Errors
    ///
    /// [`CoreError::DatabaseClosed`] after close.
    pub fn snapshot(&self) -> CoreResult<SnapshotView> {
        Ok(SnapshotView {
            snapshot: self.store()?.committed(),
        })
    }

    // --- crate internals ---

    fn store(&self) -> CoreResult<Arc<SharedStore>> {
        self.inner
            .store
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(CoreError::DatabaseClosed)
    }

    /// Identity of the underlying store.
    pub(crate) fn store_id(&self) -> CoreResult<usize> {
        let store = self.store()?;
        Ok(Arc::as_ptr(&store) as usize)
    }

    pub(crate) fn same_handle(&self, other: &Realm) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn factory_for(&self, object_type: &str) -> Option<&Arc<dyn ObjectFactory>> {
        self.inner.bindings.get(object_type)
    }

    /// Runs `f` against the handle's view: the working snapshot of its
    /// transaction, or the latest commit. `f` runs under the transaction
    /// lock and must not call back into the realm.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&Snapshot) -> CoreResult<R>) -> CoreResult<R> {
        let store = self.store()?;
        {
            let txn = self.inner.txn.lock();
            if let Some(txn) = txn.as_ref() {
                return f(txn.working());
            }
        }
        f(&store.committed())
    }

    pub(crate) fn set_property(
        &self,
        object: &Object,
        property: &str,
        input: crate::object::Input,
    ) -> CoreResult<()> {
        let (_, created) =
            self.run_writer(|writer| writer.set(object.table(), object.key(), property, &input))?;
        self.construct(created)
    }

    fn with_txn<R>(&self, f: impl FnOnce(&mut WriteTransaction) -> CoreResult<R>) -> CoreResult<R> {
        self.store()?;
        let mut guard = self.inner.txn.lock();
        let txn = guard.as_mut().ok_or(CoreError::OutsideTransaction)?;
        f(txn)
    }

    fn run_writer<R>(
        &self,
        f: impl FnOnce(&mut Writer<'_>) -> CoreResult<R>,
    ) -> CoreResult<(R, Created)> {
        let store = self.store_id()?;
        self.with_txn(|txn| {
            let mut writer = Writer::new(txn, store);
            match f(&mut writer) {
                Ok(result) => Ok((result, writer.into_created())),
                Err(err) => {
                    writer.undo();
                    Err(err)
                }
            }
        })
    }

    /// Runs factory hooks for new objects. No lock is held here.
    fn construct(&self, created: Created) -> CoreResult<()> {
        for (table, key, object_type) in created {
            if let Some(factory) = self.inner.bindings.get(&*object_type) {
                factory.construct(&Object::new(self.clone(), table, key, object_type))?;
            }
        }
        Ok(())
    }

    fn binding<F: ObjectFactory + ?Sized>(
        &self,
        factory: &F,
    ) -> CoreResult<(String, Arc<dyn ObjectFactory>)> {
        self.store()?;
        self.inner
            .bindings
            .iter()
            .find(|(_, bound)| same_factory(bound.as_ref(), factory))
            .map(|(name, bound)| (name.clone(), Arc::clone(bound)))
            .ok_or_else(|| CoreError::unknown_object_type(factory.name()))
    }

    fn table_id(&self, object_type: &str) -> CoreResult<TableId> {
        self.read(|snapshot| {
            snapshot
                .table_id(object_type)
                .ok_or_else(|| CoreError::unknown_object_type(object_type))
        })
    }

    fn owned(&self, object: &Object, store: usize) -> CoreResult<(TableId, ObjectKey)> {
        let owner = object
            .realm()
            .store_id()
            .map_err(|_| CoreError::InvalidatedObject)?;
        if owner != store {
            return Err(CoreError::configuration("object belongs to a different store"));
        }
        let exists = self.read(|snapshot| {
            Ok(snapshot
                .table(object.table())
                .is_some_and(|t| t.contains(object.key())))
        })?;
        if !exists {
            return Err(CoreError::InvalidatedObject);
        }
        Ok((object.table(), object.key()))
    }
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("path", &self.inner.path)
            .field("handle", &self.inner.handle)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// A frozen view of one commit.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    snapshot: Arc<Snapshot>,
}

impl SnapshotView {
    /// Sequence of the pinned commit.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.snapshot.sequence()
    }

    /// Schema version of the pinned commit.
    #[must_use]
    pub fn schema_version(&self) -> u64 {
        self.snapshot.schema_version()
    }

    /// Schema of the pinned commit.
    #[must_use]
    pub fn schema(&self) -> Schema {
        self.snapshot.schema()
    }

    /// Every object type with its object count.
    #[must_use]
    pub fn object_counts(&self) -> Vec<(String, usize)> {
        self.snapshot
            .tables()
            .map(|t| (t.name().to_string(), t.len()))
            .collect()
    }

    /// Number of objects of `object_type`.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownObjectType`] for a type not in the schema.
    pub fn len(&self, object_type: &str) -> CoreResult<usize> {
        Ok(self.table(object_type)?.len())
    }

    /// Rows of `object_type`, in creation order.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownObjectType`] for a type not in the schema.
    pub fn rows(&self, object_type: &str) -> CoreResult<Vec<(ObjectKey, Vec<Value>)>> {
        Ok(self.table(object_type)?.rows().collect())
    }

    /// One property of one object, `None` if the object does not exist.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownObjectType`] or [`CoreError::UnknownProperty`].
    pub fn get(&self, object_type: &str, key: ObjectKey, property: &str) -> CoreResult<Option<Value>> {
        let table = self.table(object_type)?;
        let column = table
            .schema()
            .property_index(property)
            .ok_or_else(|| CoreError::unknown_property(object_type, property))?;
        Ok(table.value(key, column).cloned())
    }

    fn table(&self, object_type: &str) -> CoreResult<&crate::engine::Table> {
        self.snapshot
            .table_by_name(object_type)
            .ok_or_else(|| CoreError::unknown_object_type(object_type))
    }
}

/// Schema version of the store at `path`, or -1 if there is none.
///
/// Reads the manifest and any committed schema changes still in the WAL
/// without opening the store. The version is stored unencrypted; a given
/// key is still checked.
///
/// # Errors
///
/// - [`CoreError::DecryptionFailed`] for a key that does not match
/// - [`CoreError::InvalidKeySize`] for a key of the wrong length
/// - I/O errors and corruption
pub fn schema_version_of(path: impl AsRef<Path>, encryption_key: Option<&[u8]>) -> CoreResult<i64> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(CoreError::configuration("store path must not be empty"));
    }
    let crypto = encryption_key
        .map(CryptoManager::from_store_key)
        .transpose()?;

    if let Ok(canonical) = fs::canonicalize(path) {
        let open = OPEN_STORES.lock().get(&canonical).and_then(Weak::upgrade);
        if let Some(store) = open {
            if store.is_new() {
                return Ok(-1);
            }
            if crypto.is_some() {
                verify_key(&store.manifest(), crypto.as_ref())?;
            }
            return version_number(store.schema_version());
        }
    }

    let Some(manifest) = read_manifest(path)? else {
        return Ok(-1);
    };
    if crypto.is_some() {
        verify_key(&manifest, crypto.as_ref())?;
    }

    let mut version = manifest.schema_version;
    let wal_file = wal_path(path);
    if wal_file.exists() {
        let wal = WalManager::new(
            Box::new(InMemoryBackend::with_data(fs::read(&wal_file)?)),
            false,
        );
        let mut pending: HashMap<TransactionId, u64> = HashMap::new();
        for entry in wal.iter()? {
            match entry?.1 {
                WalRecord::Schema {
                    txid,
                    version: staged,
                    ..
                } => {
                    pending.insert(txid, staged);
                }
                WalRecord::Commit { txid, .. } => {
                    if let Some(staged) = pending.remove(&txid) {
                        version = staged;
                    }
                }
                WalRecord::Abort { txid } => {
                    pending.remove(&txid);
                }
                _ => {}
            }
        }
    }
    version_number(version)
}

fn version_number(version: u64) -> CoreResult<i64> {
    i64::try_from(version).map_err(|_| CoreError::invalid_format("schema version out of range"))
}

fn validate_items(
    items: Option<&[SchemaItem]>,
) -> CoreResult<(Option<Schema>, HashMap<String, Arc<dyn ObjectFactory>>)> {
    let Some(items) = items else {
        return Ok((None, HashMap::new()));
    };
    let schema = Schema::validate(items)?;
    let mut bindings = HashMap::new();
    for item in items {
        if let Some(factory) = item.factory() {
            bindings.insert(item.object_schema()?.name, Arc::clone(factory));
        }
    }
    Ok((Some(schema), bindings))
}

fn canonical_path(path: &Path, create: bool) -> CoreResult<PathBuf> {
    if create && !path.exists() {
        fs::create_dir_all(path)?;
    }
    match fs::canonicalize(path) {
        Ok(canonical) => Ok(canonical),
        Err(_) => Ok(std::path::absolute(path)?),
    }
}

/// The store open at `path`, or a freshly opened one. The flag tells
/// whether another handle already had it open.
fn acquire_store(path: &Path, config: &Config) -> CoreResult<(Arc<SharedStore>, bool)> {
    let mut stores = OPEN_STORES.lock();
    stores.retain(|_, store| store.strong_count() > 0);
    if let Some(store) = stores.get(path).and_then(Weak::upgrade) {
        let crypto = config
            .encryption_key
            .as_deref()
            .map(CryptoManager::from_store_key)
            .transpose()?;
        verify_key(&store.manifest(), crypto.as_ref())?;
        return Ok((store, true));
    }
    let store = SharedStore::open(path, config)?;
    stores.insert(path.to_path_buf(), Arc::downgrade(&store));
    Ok((store, false))
}
