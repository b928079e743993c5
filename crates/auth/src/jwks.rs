//! JSON Web Key export of session verification keys.
//!
//! Lets other services verify session tokens without access to the key
//! repository: each stored key is published as a public-only OKP/Ed25519 JWK
//! whose `kid` is the record name.

use ed25519_dalek::VerifyingKey;
use jose_jwk::{
    jose_jwa::{Algorithm, Signing},
    Jwk, JwkSet, Key, Okp, OkpCurves, Parameters,
};

use crate::key_store::KeyRecord;

#[must_use]
pub fn public_jwk(kid: &str, verifying_key: &VerifyingKey) -> Jwk {
    let okp = Okp {
        crv: OkpCurves::Ed25519,
        x: verifying_key.as_bytes().to_vec().into(),
        d: None,
    };

    Jwk {
        key: Key::Okp(okp),
        prm: Parameters {
            kid: Some(kid.to_string()),
            alg: Some(Algorithm::Signing(Signing::EdDsa)),
            ..Default::default()
        },
    }
}

/// JWK set for `records`, preserving their order.
#[must_use]
pub fn jwks_from_records(records: &[KeyRecord]) -> JwkSet {
    JwkSet {
        keys: records
            .iter()
            .map(|record| public_jwk(&record.name, &record.verifying_key()))
            .collect(),
    }
}
