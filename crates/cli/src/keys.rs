//! Signing key management commands.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use inkwell_auth::jwks::jwks_from_records;
use inkwell_auth::key_store::{KeyRecord, KeyRepository};
use inkwell_auth::rotation::{retire_keys, rotate_key};

use crate::error::CliError;

fn describe(record: &KeyRecord) -> String {
    format!(
        "{}\t{}\t{}",
        record.created_at.to_rfc3339(),
        record.name,
        URL_SAFE_NO_PAD.encode(record.verifying_key().as_bytes())
    )
}

/// Generate a key and store it as the current signer.
pub async fn generate(
    repository: &dyn KeyRepository,
    name: Option<&str>,
    now: DateTime<Utc>,
) -> Result<String, CliError> {
    let record = rotate_key(repository, name, now).await?;
    Ok(format!("Generated signing key\n{}", describe(&record)))
}

/// List keys newest first; the first one signs new tokens.
pub async fn list(repository: &dyn KeyRepository) -> Result<String, CliError> {
    let records = repository.list().await?;
    if records.is_empty() {
        return Ok("No signing keys found".into());
    }

    let lines: Vec<String> = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let marker = if index == 0 { "\t(current)" } else { "" };
            format!("{}{}", describe(record), marker)
        })
        .collect();
    Ok(lines.join("\n"))
}

pub async fn show(repository: &dyn KeyRepository, name: &str) -> Result<String, CliError> {
    let record = repository.read(name).await?;
    Ok(describe(&record))
}

pub async fn delete(repository: &dyn KeyRepository, name: &str) -> Result<String, CliError> {
    repository.delete(name).await?;
    Ok(format!("Deleted signing key '{}'", name))
}

pub async fn retire(repository: &dyn KeyRepository, keep: usize) -> Result<String, CliError> {
    let retired = retire_keys(repository, keep).await?;
    if retired.is_empty() {
        return Ok("No signing keys retired".into());
    }
    Ok(format!(
        "Retired {} signing key(s): {}",
        retired.len(),
        retired.join(", ")
    ))
}

pub async fn jwks(repository: &dyn KeyRepository) -> Result<String, CliError> {
    let records = repository.list().await?;
    Ok(serde_json::to_string_pretty(&jwks_from_records(&records))?)
}
