//! Key repository backed by a local directory.
//!
//! Each record is one PEM file at `<base_path>/<prefix>-<name>`; the file's
//! modification time is the record's timestamp. Concurrent writes to the
//! same name race at the filesystem level and the last writer wins.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use error_stack::{Report, ResultExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use zeroize::Zeroizing;

use super::{pem, sort_newest_first, KeyNamespace, KeyRecord, KeyRepository};
use crate::error::AuthError;

pub struct FileSystemKeyRepository {
    base_path: PathBuf,
    namespace: KeyNamespace,
}

impl FileSystemKeyRepository {
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if `prefix` is not a valid
    /// namespace prefix.
    pub fn new(
        base_path: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Result<Self, Report<AuthError>> {
        Ok(Self {
            base_path: base_path.into(),
            namespace: KeyNamespace::new(prefix)?,
        })
    }

    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn load(
        &self,
        physical: &str,
        name: &str,
        operation: &'static str,
    ) -> Result<KeyRecord, Report<AuthError>> {
        let path = self.base_path.join(physical);

        let contents = fs::read_to_string(&path)
            .await
            .map(Zeroizing::new)
            .map_err(|e| io_report(e, operation, name))?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| io_report(e, operation, name))?;
        let modified = metadata
            .modified()
            .map_err(|e| io_report(e, operation, name))?;

        let key = pem::decode_private_key(&contents)
            .change_context_lazy(|| storage(operation, name))
            .attach(format!("while decoding {}", path.display()))?;

        Ok(KeyRecord {
            name: name.to_string(),
            key,
            created_at: DateTime::<Utc>::from(modified),
        })
    }
}

#[async_trait]
impl KeyRepository for FileSystemKeyRepository {
    async fn write(&self, key: &SigningKey, name: &str) -> Result<KeyRecord, Report<AuthError>> {
        let physical = self.namespace.physical_name(name)?;
        let logical = self.namespace.logical_name(&physical).unwrap_or(name);
        let path = self.base_path.join(&physical);

        let pem = pem::encode_private_key(key).change_context_lazy(|| storage("write", logical))?;

        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| io_report(e, "write", logical))
            .attach(format!("while creating {}", self.base_path.display()))?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&path)
            .await
            .map_err(|e| io_report(e, "write", logical))
            .attach(format!("while opening {}", path.display()))?;
        file.write_all(pem.as_bytes())
            .await
            .map_err(|e| io_report(e, "write", logical))?;
        file.sync_all()
            .await
            .map_err(|e| io_report(e, "write", logical))?;

        let modified = file
            .metadata()
            .await
            .and_then(|metadata| metadata.modified())
            .map_err(|e| io_report(e, "write", logical))?;

        log::info!("Stored signing key '{}' at {}", logical, path.display());

        Ok(KeyRecord {
            name: logical.to_string(),
            key: key.clone(),
            created_at: DateTime::<Utc>::from(modified),
        })
    }

    async fn read(&self, name: &str) -> Result<KeyRecord, Report<AuthError>> {
        let physical = self.namespace.physical_name(name)?;
        let logical = self.namespace.logical_name(&physical).unwrap_or(name);

        self.load(&physical, logical, "read").await
    }

    async fn list(&self) -> Result<Vec<KeyRecord>, Report<AuthError>> {
        let wildcard = self.namespace.wildcard();

        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!(
                    "Key directory {} does not exist yet",
                    self.base_path.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(io_report(e, "list", &wildcard)),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_report(e, "list", &wildcard))?
        {
            let file_name = entry.file_name();
            let Some(physical) = file_name.to_str() else {
                continue;
            };
            let Some(logical) = self.namespace.logical_name(physical) else {
                continue;
            };
            // Follows symlinks so `list` agrees with `read`.
            let metadata = match fs::metadata(entry.path()).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::debug!("Signing key '{}' was removed during listing", logical);
                    continue;
                }
                Err(e) => return Err(io_report(e, "list", logical)),
            };
            if !metadata.is_file() {
                continue;
            }

            match self.load(physical, logical, "list").await {
                Ok(record) => records.push(record),
                Err(report) if matches!(report.current_context(), AuthError::NotFound { .. }) => {
                    log::debug!("Signing key '{}' was removed during listing", logical);
                }
                Err(report) => return Err(report),
            }
        }

        sort_newest_first(&mut records);
        log::debug!("Listed {} signing keys under '{}'", records.len(), wildcard);

        Ok(records)
    }

    async fn delete(&self, name: &str) -> Result<(), Report<AuthError>> {
        let physical = self.namespace.physical_name(name)?;
        let logical = self.namespace.logical_name(&physical).unwrap_or(name);

        fs::remove_file(self.base_path.join(&physical))
            .await
            .map_err(|e| io_report(e, "delete", logical))?;

        log::info!("Deleted signing key '{}'", logical);
        Ok(())
    }
}

fn storage(operation: &'static str, name: &str) -> AuthError {
    AuthError::Storage {
        operation,
        name: name.to_string(),
    }
}

fn io_report(error: io::Error, operation: &'static str, name: &str) -> Report<AuthError> {
    let context = if error.kind() == io::ErrorKind::NotFound {
        AuthError::NotFound {
            name: name.to_string(),
        }
    } else {
        storage(operation, name)
    };
    Report::new(error).change_context(context)
}
