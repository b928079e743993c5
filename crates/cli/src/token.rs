//! Session token commands.

use chrono::{DateTime, Duration, Utc};
use inkwell_auth::key_store::KeyRepository;
use inkwell_auth::rotation::active_verifying_keys;
use inkwell_auth::session_token::{decode, encode, SessionClaims, TokenHeader};
use inkwell_auth::settings::{ttl_from_seconds, MAX_TTL_SECONDS};
use uuid::Uuid;

use crate::error::CliError;

/// Parses the `--ttl-seconds` argument.
///
/// # Errors
///
/// Returns [`CliError::InvalidInput`] if the lifetime is not positive or too
/// large to represent.
pub fn ttl_argument(seconds: i64) -> Result<Duration, CliError> {
    ttl_from_seconds(seconds).map_err(|_| {
        CliError::InvalidInput(format!(
            "--ttl-seconds must be between 1 and {MAX_TTL_SECONDS}"
        ))
    })
}

/// Issue a token for `user_id`, signed with the newest key in the store.
pub async fn issue(
    repository: &dyn KeyRepository,
    user_id: Uuid,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, CliError> {
    let records = repository.list().await?;
    let current = records.first();
    if let Some(record) = current {
        log::debug!("Signing session token with key '{}'", record.name);
    }

    let token = encode(
        &SessionClaims { id: user_id },
        ttl,
        current.map(|record| &record.key),
        Uuid::new_v4(),
        now,
    )?;
    Ok(token)
}

/// Verify `token` against the `window` newest keys and print its contents.
pub async fn verify(
    repository: &dyn KeyRepository,
    token: &str,
    window: usize,
    now: DateTime<Utc>,
) -> Result<String, CliError> {
    let records = repository.list().await?;
    let trusted = active_verifying_keys(&records, window);

    let (header, claims): (TokenHeader, SessionClaims) = decode(token.trim(), &trusted, now)?;

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "header": header,
        "claims": claims,
    }))?)
}

#[cfg(test)]
mod tests {
    use error_stack::Report;
    use inkwell_auth::error::AuthError;
    use inkwell_auth::key_store::FileSystemKeyRepository;
    use inkwell_auth::rotation::rotate_key;
    use tempfile::TempDir;

    use super::*;

    fn auth_error(result: Result<String, CliError>) -> Report<AuthError> {
        match result {
            Err(CliError::Auth(report)) => report,
            other => unreachable!("expected auth error, got {:?}", other),
        }
    }

    #[test]
    fn ttl_argument_rejects_out_of_range_values() {
        assert_eq!(
            ttl_argument(60).expect("should accept one minute"),
            Duration::minutes(1)
        );

        for seconds in [0, -5, i64::MAX] {
            assert!(matches!(
                ttl_argument(seconds),
                Err(CliError::InvalidInput(message)) if message.starts_with("--ttl-seconds")
            ));
        }
    }

    #[tokio::test]
    async fn issue_without_keys_is_configuration_error() {
        let dir = TempDir::new().expect("should create temp dir");
        let repo =
            FileSystemKeyRepository::new(dir.path(), "session").expect("should build repository");

        let err = auth_error(issue(&repo, Uuid::new_v4(), Duration::hours(1), Utc::now()).await);

        assert!(matches!(
            err.current_context(),
            AuthError::Configuration { .. }
        ));
    }

    #[tokio::test]
    async fn issued_token_verifies() {
        let dir = TempDir::new().expect("should create temp dir");
        let repo =
            FileSystemKeyRepository::new(dir.path(), "session").expect("should build repository");
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        rotate_key(&repo, Some("current"), now)
            .await
            .expect("should create key");

        let token = issue(&repo, user_id, Duration::hours(1), now)
            .await
            .expect("should issue token");
        let output = verify(&repo, &format!("{token}\n"), 2, now)
            .await
            .expect("should verify token");

        let json: serde_json::Value = serde_json::from_str(&output).expect("should be JSON");
        assert_eq!(json["claims"]["id"], user_id.to_string());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let dir = TempDir::new().expect("should create temp dir");
        let repo =
            FileSystemKeyRepository::new(dir.path(), "session").expect("should build repository");
        let now = Utc::now();
        rotate_key(&repo, Some("current"), now)
            .await
            .expect("should create key");
        let token = issue(&repo, Uuid::new_v4(), Duration::minutes(5), now)
            .await
            .expect("should issue token");

        let err = auth_error(verify(&repo, &token, 2, now + Duration::minutes(6)).await);

        assert!(matches!(
            err.current_context(),
            AuthError::InvalidCredentials { message } if message.contains("expired")
        ));
    }
}
