//! Durable storage for the Ed25519 keys that sign session tokens.
//!
//! [`KeyRepository`] is the contract; [`FileSystemKeyRepository`] and
//! [`ObjectStoreKeyRepository`] are the two backends. Both share the PEM
//! codec in [`pem`] and the naming rules in [`KeyNamespace`].
//!
//! Every repository is bound to a prefix. Records are stored under
//! `<prefix>-<name>` and reported back under `<name>`, so several key
//! families can share one directory or bucket without seeing each other.

pub mod filesystem;
pub mod object_storage;
pub mod pem;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use error_stack::Report;

use crate::error::AuthError;

pub use filesystem::FileSystemKeyRepository;
pub use object_storage::ObjectStoreKeyRepository;

/// One persisted signing key.
///
/// `Debug` prints the public key only.
#[derive(Clone)]
pub struct KeyRecord {
    /// Logical name, without the repository prefix.
    pub name: String,
    pub key: SigningKey,
    /// Backend-observed write time.
    pub created_at: DateTime<Utc>,
}

impl KeyRecord {
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("name", &self.name)
            .field("verifying_key", &self.verifying_key())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Named storage of signing keys.
///
/// Implementations perform no retries. Dropping a returned future cancels
/// the operation; wrap calls in `tokio::time::timeout` to bound them.
#[async_trait]
pub trait KeyRepository: Send + Sync {
    /// Persists `key` under `name`, replacing any existing record.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKeyName`] for names that cannot be stored
    /// and [`AuthError::Storage`] if the backend write fails.
    async fn write(&self, key: &SigningKey, name: &str) -> Result<KeyRecord, Report<AuthError>>;

    /// Loads the record stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotFound`] if no such record exists and
    /// [`AuthError::Storage`] if it cannot be read or decoded.
    async fn read(&self, name: &str) -> Result<KeyRecord, Report<AuthError>>;

    /// Loads every record in this repository's namespace, newest first.
    ///
    /// The listing is a best-effort snapshot; records written or deleted
    /// concurrently may or may not appear.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if the enumeration or any record read
    /// fails. No partial listing is returned.
    async fn list(&self) -> Result<Vec<KeyRecord>, Report<AuthError>>;

    /// Removes the record stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotFound`] if no such record exists and
    /// [`AuthError::Storage`] if the backend delete fails.
    async fn delete(&self, name: &str) -> Result<(), Report<AuthError>>;
}

/// Maps logical key names to physical storage names and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyNamespace {
    prefix: String,
}

impl KeyNamespace {
    /// Binds a namespace to `prefix`.
    ///
    /// The prefix may not contain `-`, so no namespace's storage names can
    /// start with another namespace's `<prefix>-`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the prefix is empty or contains
    /// `-`, a path separator or `..`.
    pub fn new(prefix: impl Into<String>) -> Result<Self, Report<AuthError>> {
        let prefix = prefix.into();
        if !is_valid_prefix(&prefix) {
            return Err(Report::new(AuthError::Configuration {
                message: format!("invalid key prefix '{prefix}'"),
            }));
        }
        Ok(Self { prefix })
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the storage name for `name`, adding `<prefix>-` unless it is
    /// already present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKeyName`] if the name is empty or the
    /// resulting storage name contains a path separator or `..`.
    pub fn physical_name(&self, name: &str) -> Result<String, Report<AuthError>> {
        let physical = if self.logical_name(name).is_some() {
            name.to_string()
        } else {
            format!("{}-{}", self.prefix, name)
        };

        let invalid = name.is_empty()
            || self.logical_name(&physical).is_none()
            || physical.contains(|c: char| c == '/' || c == '\\')
            || physical.contains("..");
        if invalid {
            return Err(Report::new(AuthError::InvalidKeyName {
                name: name.to_string(),
            }));
        }

        Ok(physical)
    }

    /// Strips `<prefix>-` from a storage name, or returns `None` when the
    /// name belongs to another namespace.
    #[must_use]
    pub fn logical_name<'a>(&self, physical: &'a str) -> Option<&'a str> {
        physical
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('-')
            .filter(|name| !name.is_empty())
    }

    /// Label used in errors that concern the whole namespace.
    pub(crate) fn wildcard(&self) -> String {
        format!("{}-*", self.prefix)
    }
}

/// Whether `prefix` can name a namespace without overlapping another.
#[must_use]
pub fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.is_empty()
        && !prefix.contains(|c: char| c == '-' || c == '/' || c == '\\')
        && !prefix.contains("..")
}

/// Orders records newest first, breaking ties by name.
pub(crate) fn sort_newest_first(records: &mut [KeyRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
}
