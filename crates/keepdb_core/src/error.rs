//! Error types for KeepDB core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by the object store.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] keepdb_storage::StorageError),

    /// CBOR codec error.
    #[error("codec error: {0}")]
    Codec(#[from] keepdb_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The write-ahead log is corrupted.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// The segment file is corrupted.
    #[error("segment corruption: {message}")]
    SegmentCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// A stored checksum did not match the data.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// A file on disk is not in a format this build understands.
    #[error("invalid database format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Another process holds the store's lock file.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// The handle has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// Another handle held the writer gate for longer than the busy timeout.
    #[error("store is busy: another writer held the lock for {waited_ms} ms")]
    Busy {
        /// How long this writer waited.
        waited_ms: u64,
    },

    /// Bad path or argument shape.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong.
        message: String,
    },

    /// A schema definition or factory binding was rejected.
    #[error("schema validation failed: {message}")]
    SchemaValidation {
        /// What was wrong.
        message: String,
    },

    /// The requested schema version cannot be opened.
    #[error("schema version mismatch: store is at version {persisted}, requested {requested}")]
    SchemaVersionMismatch {
        /// Version the store is currently at.
        persisted: u64,
        /// Version the caller asked for.
        requested: u64,
    },

    /// A transaction was started while one is already open on the handle.
    #[error("cannot begin a transaction: the handle is already in a transaction")]
    NestedTransaction,

    /// A mutation was attempted outside a transaction.
    #[error("cannot modify managed objects outside of a write transaction")]
    OutsideTransaction,

    /// A create collided with an existing primary key.
    #[error("attempting to create an object of type '{object_type}' with an existing primary key value '{key}'")]
    DuplicateKey {
        /// Object type.
        object_type: String,
        /// The colliding primary-key value.
        key: String,
    },

    /// A required property was neither supplied nor defaulted.
    #[error("missing value for required property '{object_type}.{property}'")]
    MissingRequiredProperty {
        /// Object type.
        object_type: String,
        /// Property name.
        property: String,
    },

    /// The object was deleted or its handle was closed.
    #[error("accessing object which has been invalidated or deleted")]
    InvalidatedObject,

    /// No object type with this name is registered.
    #[error("object type '{name}' not found in schema")]
    UnknownObjectType {
        /// The requested type.
        name: String,
    },

    /// The object type has no such property.
    #[error("property '{property}' does not exist on object type '{object_type}'")]
    UnknownProperty {
        /// Object type.
        object_type: String,
        /// Property name.
        property: String,
    },

    /// A supplied value does not fit the property.
    #[error("invalid value for property '{object_type}.{property}': {message}")]
    InvalidPropertyValue {
        /// Object type.
        object_type: String,
        /// Property name.
        property: String,
        /// Why the value was rejected.
        message: String,
    },

    /// Encryption is not compiled in.
    #[error("encryption feature not enabled")]
    EncryptionNotEnabled,

    /// Encrypting data failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decrypting data failed, usually because the key is wrong.
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// The encryption key has the wrong length.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Required length.
        expected: usize,
        /// Supplied length.
        actual: usize,
    },

    /// `on`/`off` was called with an unsupported event name.
    #[error("unknown event name '{name}'")]
    UnknownEvent {
        /// The event name.
        name: String,
    },

    /// A transaction body gave up.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason supplied by the caller.
        reason: String,
    },
}

impl CoreError {
    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates a segment corruption error.
    pub fn segment_corruption(message: impl Into<String>) -> Self {
        Self::SegmentCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a schema validation error.
    pub fn schema_validation(message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            message: message.into(),
        }
    }

    /// Creates an unknown object type error.
    pub fn unknown_object_type(name: impl Into<String>) -> Self {
        Self::UnknownObjectType { name: name.into() }
    }

    /// Creates an unknown property error.
    pub fn unknown_property(object_type: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            object_type: object_type.into(),
            property: property.into(),
        }
    }

    /// Creates an invalid property value error.
    pub fn invalid_value(
        object_type: impl Into<String>,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidPropertyValue {
            object_type: object_type.into(),
            property: property.into(),
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates an aborted error, for transaction bodies that want to roll back.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Whether this is a transaction state error (nested or missing transaction).
    #[must_use]
    pub fn is_transaction_state(&self) -> bool {
        matches!(self, Self::NestedTransaction | Self::OutsideTransaction)
    }
}
