//! Key repository backed by cloud object storage.
//!
//! Each record is one object at `<root>/<prefix>-<name>` in any
//! [`ObjectStore`] (S3, GCS, local files or memory). The object's
//! last-modified time is the record's timestamp.

use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use error_stack::{Report, ResultExt};
use futures::TryStreamExt;
use object_store::{path::Path, ObjectMeta, ObjectStore, PutPayload};
use url::Url;
use zeroize::Zeroizing;

use super::{pem, sort_newest_first, KeyNamespace, KeyRecord, KeyRepository};
use crate::error::AuthError;

pub struct ObjectStoreKeyRepository {
    store: Arc<dyn ObjectStore>,
    root: Path,
    namespace: KeyNamespace,
}

impl ObjectStoreKeyRepository {
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if `prefix` is not a valid
    /// namespace prefix.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        root: Path,
        prefix: impl Into<String>,
    ) -> Result<Self, Report<AuthError>> {
        Ok(Self {
            store,
            root,
            namespace: KeyNamespace::new(prefix)?,
        })
    }

    /// Builds a repository from a store URL such as `gs://bucket/keys`,
    /// `s3://bucket/keys`, `file:///var/keys` or `memory:///`.
    ///
    /// The URL path becomes the root under which records are stored.
    /// `options` are passed to the provider builder (credentials, region).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the URL scheme is unsupported,
    /// the provider rejects the options or `prefix` is invalid.
    pub fn from_url<I, K, V>(
        url: &Url,
        options: I,
        prefix: impl Into<String>,
    ) -> Result<Self, Report<AuthError>>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let (store, root) = object_store::parse_url_opts(url, options).change_context_lazy(|| {
            AuthError::Configuration {
                message: format!("unsupported key store URL '{url}'"),
            }
        })?;

        Self::new(Arc::from(store), root, prefix)
    }

    fn location(&self, physical: &str) -> Path {
        self.root.child(physical)
    }

    /// Logical name for an object directly under the root, if it belongs to
    /// this namespace.
    fn logical_name(&self, location: &Path) -> Option<String> {
        let mut parts = location.prefix_match(&self.root)?;
        let part = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        self.namespace
            .logical_name(part.as_ref())
            .map(str::to_string)
    }

    async fn load(
        &self,
        location: &Path,
        name: &str,
        operation: &'static str,
    ) -> Result<KeyRecord, Report<AuthError>> {
        let result = self
            .store
            .get(location)
            .await
            .map_err(|e| store_report(e, operation, name))?;
        let created_at = result.meta.last_modified;

        let bytes = result
            .bytes()
            .await
            .map(|bytes| Zeroizing::new(bytes.to_vec()))
            .map_err(|e| store_report(e, operation, name))?;
        let contents = std::str::from_utf8(&bytes)
            .change_context_lazy(|| storage(operation, name))
            .attach(format!("while decoding {location}"))?;
        let key = pem::decode_private_key(contents)
            .change_context_lazy(|| storage(operation, name))
            .attach(format!("while decoding {location}"))?;

        Ok(KeyRecord {
            name: name.to_string(),
            key,
            created_at,
        })
    }
}

#[async_trait]
impl KeyRepository for ObjectStoreKeyRepository {
    async fn write(&self, key: &SigningKey, name: &str) -> Result<KeyRecord, Report<AuthError>> {
        let physical = self.namespace.physical_name(name)?;
        let logical = self.namespace.logical_name(&physical).unwrap_or(name);
        let location = self.location(&physical);

        let pem = pem::encode_private_key(key).change_context_lazy(|| storage("write", logical))?;

        self.store
            .put(&location, PutPayload::from(pem.as_bytes().to_vec()))
            .await
            .map_err(|e| store_report(e, "write", logical))?;
        let meta = self
            .store
            .head(&location)
            .await
            .map_err(|e| store_report(e, "write", logical))?;

        log::info!("Stored signing key '{}' at {}", logical, location);

        Ok(KeyRecord {
            name: logical.to_string(),
            key: key.clone(),
            created_at: meta.last_modified,
        })
    }

    async fn read(&self, name: &str) -> Result<KeyRecord, Report<AuthError>> {
        let physical = self.namespace.physical_name(name)?;
        let logical = self.namespace.logical_name(&physical).unwrap_or(name);

        self.load(&self.location(&physical), logical, "read").await
    }

    async fn list(&self) -> Result<Vec<KeyRecord>, Report<AuthError>> {
        let wildcard = self.namespace.wildcard();
        let prefix = (!self.root.as_ref().is_empty()).then_some(&self.root);

        // The stream follows provider pagination until the listing is exhausted.
        let objects: Vec<ObjectMeta> = self
            .store
            .list(prefix)
            .try_collect()
            .await
            .map_err(|e| store_report(e, "list", &wildcard))?;

        let mut records = Vec::new();
        for meta in objects {
            let Some(logical) = self.logical_name(&meta.location) else {
                continue;
            };

            match self.load(&meta.location, &logical, "list").await {
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
        let location = self.location(&physical);

        // Object stores report success when deleting a missing object.
        self.store
            .head(&location)
            .await
            .map_err(|e| store_report(e, "delete", logical))?;
        self.store
            .delete(&location)
            .await
            .map_err(|e| store_report(e, "delete", logical))?;

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

fn store_report(
    error: object_store::Error,
    operation: &'static str,
    name: &str,
) -> Report<AuthError> {
    let context = if matches!(error, object_store::Error::NotFound { .. }) {
        AuthError::NotFound {
            name: name.to_string(),
        }
    } else {
        storage(operation, name)
    };
    Report::new(error).change_context(context)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use object_store::memory::InMemory;

    use super::*;
    use crate::test_support::tests::{names, signing_key};

    fn shared_store() -> Arc<dyn ObjectStore> {
        Arc::new(InMemory::new())
    }

    fn repository(store: &Arc<dyn ObjectStore>, prefix: &str) -> ObjectStoreKeyRepository {
        ObjectStoreKeyRepository::new(Arc::clone(store), Path::from("keys"), prefix)
            .expect("should build repository")
    }

    async fn put_raw(store: &Arc<dyn ObjectStore>, location: &str, body: &'static str) {
        store
            .put(&Path::from(location), PutPayload::from_static(body.as_bytes()))
            .await
            .expect("should put raw object");
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let store = shared_store();
        let repo = repository(&store, "session");
        let key = signing_key(1);

        let written = repo.write(&key, "alpha").await.expect("should write key");
        let read = repo.read("alpha").await.expect("should read key");

        assert_eq!(written.name, "alpha");
        assert_eq!(read.verifying_key(), key.verifying_key());
        assert_eq!(read.created_at, written.created_at);
        store
            .head(&Path::from("keys/session-alpha"))
            .await
            .expect("object should use the prefixed name");
    }

    #[tokio::test]
    async fn overwrite_keeps_single_record_with_latest_key() {
        let store = shared_store();
        let repo = repository(&store, "session");
        let second = signing_key(2);

        repo.write(&signing_key(1), "alpha")
            .await
            .expect("should write first key");
        repo.write(&second, "alpha")
            .await
            .expect("should overwrite key");

        let records = repo.list().await.expect("should list keys");
        assert_eq!(names(&records), ["alpha"]);
        assert_eq!(records[0].verifying_key(), second.verifying_key());
    }

    #[tokio::test]
    async fn list_orders_newest_first() {
        let store = shared_store();
        let repo = repository(&store, "session");

        for (seed, name) in [(1, "alpha"), (2, "beta"), (3, "gamma"), (4, "alpha")] {
            repo.write(&signing_key(seed), name)
                .await
                .expect("should write key");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let records = repo.list().await.expect("should list keys");

        assert_eq!(names(&records), ["alpha", "gamma", "beta"]);
    }

    #[tokio::test]
    async fn list_ignores_foreign_objects_in_the_bucket() {
        let store = shared_store();
        let foo = repository(&store, "foo");
        let bar = repository(&store, "bar");

        foo.write(&signing_key(1), "shared")
            .await
            .expect("should write foo key");
        bar.write(&signing_key(2), "only-bar")
            .await
            .expect("should write bar key");
        put_raw(&store, "keys/readme.txt", "not a key").await;
        put_raw(&store, "keys/nested/foo-deep", "not a key").await;
        put_raw(&store, "foo-outside-root", "not a key").await;

        let listed = foo.list().await.expect("should list only foo keys");
        assert_eq!(names(&listed), ["shared"]);

        let err = foo
            .read("only-bar")
            .await
            .expect_err("should not see bar key");
        assert!(matches!(err.current_context(), AuthError::NotFound { .. }));
    }

    #[test]
    fn rejects_prefix_that_overlaps_another_namespace() {
        let err = ObjectStoreKeyRepository::new(shared_store(), Path::from("keys"), "foo-bar")
            .err()
            .expect("should reject dashed prefix");

        assert!(matches!(
            err.current_context(),
            AuthError::Configuration { .. }
        ));
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = shared_store();
        let repo = repository(&store, "session");

        let err = repo.read("ghost").await.expect_err("should fail read");
        assert!(matches!(
            err.current_context(),
            AuthError::NotFound { name } if name == "ghost"
        ));

        let err = repo.delete("ghost").await.expect_err("should fail delete");
        assert!(matches!(
            err.current_context(),
            AuthError::NotFound { name } if name == "ghost"
        ));
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = shared_store();
        let repo = repository(&store, "session");
        repo.write(&signing_key(1), "alpha")
            .await
            .expect("should write key");

        repo.delete("alpha").await.expect("should delete key");

        assert!(repo.list().await.expect("should list keys").is_empty());
    }

    #[tokio::test]
    async fn corrupt_record_fails_whole_listing() {
        let store = shared_store();
        let repo = repository(&store, "session");
        repo.write(&signing_key(1), "good")
            .await
            .expect("should write key");
        put_raw(&store, "keys/session-broken", "not a key").await;

        let err = repo.list().await.expect_err("should fail listing");

        assert!(matches!(
            err.current_context(),
            AuthError::Storage { operation: "list", name } if name == "broken"
        ));
    }

    #[tokio::test]
    async fn from_memory_url_stores_at_bucket_root() {
        let url = Url::parse("memory:///").expect("should parse url");
        let repo = ObjectStoreKeyRepository::from_url(&url, Vec::<(String, String)>::new(), "session")
            .expect("should build repository");

        repo.write(&signing_key(1), "alpha")
            .await
            .expect("should write key");

        let records = repo.list().await.expect("should list keys");
        assert_eq!(names(&records), ["alpha"]);
    }

    #[test]
    fn unsupported_url_is_configuration_error() {
        let url = Url::parse("ftp://example.com/keys").expect("should parse url");

        let err =
            ObjectStoreKeyRepository::from_url(&url, Vec::<(String, String)>::new(), "session")
                .err()
                .expect("should reject ftp");

        assert!(matches!(
            err.current_context(),
            AuthError::Configuration { .. }
        ));
    }
}
