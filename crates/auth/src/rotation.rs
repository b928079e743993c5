//! Signing key rotation.
//!
//! A rotation writes a freshly generated key under a new name; because
//! repositories list newest first, that key becomes the current signer while
//! the previous keys stay available for verification until they are retired.

use chrono::{DateTime, Utc};
use ed25519_dalek::{SigningKey, VerifyingKey};
use error_stack::{Report, ResultExt};
use rand::rngs::OsRng;

use crate::error::AuthError;
use crate::key_store::{KeyRecord, KeyRepository};

#[must_use]
pub fn generate_signing_key() -> SigningKey {
    let mut csprng = OsRng;
    SigningKey::generate(&mut csprng)
}

/// Name for a key created at `now`, e.g. `2024-05-01T120000Z`.
///
/// Names sort lexically in creation order and are safe as file names.
#[must_use]
pub fn generate_date_based_name(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H%M%SZ").to_string()
}

/// Generates a new signing key and stores it as the current key.
///
/// # Errors
///
/// Propagates any repository error from the write.
pub async fn rotate_key(
    repository: &dyn KeyRepository,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<KeyRecord, Report<AuthError>> {
    let name = name.map_or_else(|| generate_date_based_name(now), str::to_string);
    let record = repository
        .write(&generate_signing_key(), &name)
        .await
        .attach(format!("while rotating to signing key '{name}'"))?;

    log::info!("Rotated session signing key to '{}'", record.name);
    Ok(record)
}

/// Deletes every key except the `keep` most recent ones and returns the
/// names of the deleted keys.
///
/// # Errors
///
/// Returns [`AuthError::Configuration`] if `keep` is zero, otherwise
/// propagates repository errors. Keys already removed by someone else are
/// skipped.
pub async fn retire_keys(
    repository: &dyn KeyRepository,
    keep: usize,
) -> Result<Vec<String>, Report<AuthError>> {
    if keep == 0 {
        return Err(Report::new(AuthError::Configuration {
            message: "at least one signing key must be kept".into(),
        }));
    }

    let mut retired = Vec::new();
    for record in repository.list().await?.into_iter().skip(keep) {
        match repository.delete(&record.name).await {
            Ok(()) => retired.push(record.name),
            Err(report) if matches!(report.current_context(), AuthError::NotFound { .. }) => {
                log::debug!("Signing key '{}' was already retired", record.name);
            }
            Err(report) => return Err(report),
        }
    }

    Ok(retired)
}

/// Public keys of the `window` most recent records, in listing order.
///
/// `records` is expected to come from [`KeyRepository::list`].
#[must_use]
pub fn active_verifying_keys(records: &[KeyRecord], window: usize) -> Vec<VerifyingKey> {
    records
        .iter()
        .take(window)
        .map(KeyRecord::verifying_key)
        .collect()
}
