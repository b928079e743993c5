//! Compact signed session tokens.
//!
//! A token is three unpadded base64url segments joined by `.`:
//!
//! ```text
//! base64url(json(header)).base64url(json(payload)).base64url(ed25519(signature))
//! ```
//!
//! The signature covers the UTF-8 bytes of `header.payload`. Decoding checks,
//! in order: the token shape, the signature against every trusted key, the
//! segment contents, and finally the token identifier and validity window.
//! No server-side state is kept and the clock is always supplied by the caller.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use error_stack::{Report, ResultExt};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Upper bound on the encoded token length accepted by [`decode`].
pub const MAX_TOKEN_LENGTH: usize = 8 * 1024;

static TOKEN_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{2,}\.[A-Za-z0-9_-]{2,}\.[A-Za-z0-9_-]{2,}$")
        .expect("token shape pattern should compile")
});

/// Token metadata written by [`encode`] and validated by [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenHeader {
    /// Issued-at instant.
    pub iat: DateTime<Utc>,
    /// Expiration instant, `iat + ttl`.
    pub exp: DateTime<Utc>,
    /// Caller-supplied unique token identifier. Not a key identifier.
    pub id: Uuid,
}

/// Claims carried by a forum session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Authenticated user.
    pub id: Uuid,
}

/// Encodes and signs `payload` into a session token.
///
/// # Errors
///
/// Returns [`AuthError::Configuration`] if no signing key is supplied, if
/// `now + ttl` is outside the representable time range, or if the payload
/// cannot be serialized.
pub fn encode<P>(
    payload: &P,
    ttl: Duration,
    signing_key: Option<&SigningKey>,
    token_id: Uuid,
    now: DateTime<Utc>,
) -> Result<String, Report<AuthError>>
where
    P: Serialize + ?Sized,
{
    let signing_key = signing_key.ok_or_else(|| {
        Report::new(AuthError::Configuration {
            message: "session signing key is not configured".into(),
        })
    })?;

    let exp = now.checked_add_signed(ttl).ok_or_else(|| {
        Report::new(AuthError::Configuration {
            message: format!("token lifetime {ttl} overflows the timestamp range"),
        })
    })?;

    let header = TokenHeader {
        iat: now,
        exp,
        id: token_id,
    };

    let signing_input = format!(
        "{}.{}",
        encode_segment(&header, "header")?,
        encode_segment(payload, "payload")?
    );
    let signature = signing_key.sign(signing_input.as_bytes());

    Ok(format!(
        "{}.{}",
        signing_input,
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Verifies `token` against `trusted_keys` and returns its header and payload.
///
/// Keys are tried in the order supplied and the first match wins, so passing
/// the current key followed by recently retired keys keeps older tokens valid
/// through a rotation. The keys are not consulted at all when the token fails
/// the structural check.
///
/// # Errors
///
/// - [`AuthError::MalformedToken`] if the token is empty, too long, not three
///   base64url segments, or if the header or payload cannot be decoded.
/// - [`AuthError::InvalidCredentials`] if the signature cannot be decoded,
///   matches no trusted key, or `now` falls outside `[iat, exp]`.
/// - [`AuthError::InvalidEntity`] if the token identifier is the nil UUID.
pub fn decode<'k, P, K>(
    token: &str,
    trusted_keys: K,
    now: DateTime<Utc>,
) -> Result<(TokenHeader, P), Report<AuthError>>
where
    P: DeserializeOwned,
    K: IntoIterator<Item = &'k VerifyingKey>,
{
    check_shape(token)?;

    let Some((signing_input, signature_segment)) = token.rsplit_once('.') else {
        return Err(malformed("token must have three segments"));
    };
    let Some((header_segment, payload_segment)) = signing_input.split_once('.') else {
        return Err(malformed("token must have three segments"));
    };

    let signature = decode_signature(signature_segment)?;

    let verified = trusted_keys
        .into_iter()
        .any(|key| key.verify(signing_input.as_bytes(), &signature).is_ok());
    if !verified {
        log::debug!("Rejected session token: no trusted key matched its signature");
        return Err(Report::new(AuthError::InvalidCredentials {
            message: "no signature keys can decode the current token signature".into(),
        }));
    }

    let header: TokenHeader = decode_segment(header_segment, "header")?;
    let payload: P = decode_segment(payload_segment, "payload")?;

    if header.id.is_nil() {
        log::debug!("Rejected session token: nil token identifier");
        return Err(Report::new(AuthError::InvalidEntity {
            message: "token identifier must not be the nil UUID".into(),
        }));
    }

    if header.iat > now {
        log::debug!("Rejected session token {}: not yet valid", header.id);
        return Err(Report::new(AuthError::InvalidCredentials {
            message: format!("token used before issued at {}", header.iat.to_rfc3339()),
        }));
    }

    if header.exp < now {
        log::debug!("Rejected session token {}: expired", header.id);
        return Err(Report::new(AuthError::InvalidCredentials {
            message: format!("token expired at {}", header.exp.to_rfc3339()),
        }));
    }

    Ok((header, payload))
}

fn check_shape(token: &str) -> Result<(), Report<AuthError>> {
    if token.is_empty() {
        return Err(malformed("token is empty"));
    }
    if token.len() > MAX_TOKEN_LENGTH {
        return Err(malformed(format!("token exceeds {MAX_TOKEN_LENGTH} bytes")));
    }
    if !TOKEN_SHAPE.is_match(token) {
        return Err(malformed("token must be three dot-separated base64url segments"));
    }
    Ok(())
}

fn decode_signature(segment: &str) -> Result<Signature, Report<AuthError>> {
    let invalid = || AuthError::InvalidCredentials {
        message: "the signature is invalid".into(),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .change_context_lazy(invalid)?;
    let bytes: [u8; 64] = bytes
        .try_into()
        .map_err(|_| Report::new(invalid()).attach("signature must be 64 bytes"))?;

    Ok(Signature::from_bytes(&bytes))
}

fn encode_segment<T>(value: &T, segment: &str) -> Result<String, Report<AuthError>>
where
    T: Serialize + ?Sized,
{
    let json = serde_json::to_vec(value).change_context_lazy(|| AuthError::Configuration {
        message: format!("failed to serialize token {segment}"),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T>(encoded: &str, segment: &str) -> Result<T, Report<AuthError>>
where
    T: DeserializeOwned,
{
    let json = URL_SAFE_NO_PAD
        .decode(encoded)
        .change_context_lazy(|| AuthError::MalformedToken {
            message: format!("token {segment} is not valid base64url"),
        })?;

    serde_json::from_slice(&json).change_context_lazy(|| AuthError::MalformedToken {
        message: format!("token {segment} is not valid JSON"),
    })
}

fn malformed(message: impl Into<String>) -> Report<AuthError> {
    Report::new(AuthError::MalformedToken {
        message: message.into(),
    })
}
