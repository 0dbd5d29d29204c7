//! JSON Web Key Set retrieval and key selection.
//!
//! The key set is fetched from the configured endpoint on every
//! verification; there is no cache.
//!
//! # Security
//!
//! - A token must reference exactly one key; ambiguous key sets are rejected
//! - Keys restricted to a non-signature `use` are never used for verification

use crate::errors::PipelineError;
use crate::observability::metrics;
use crate::pipeline::endpoint::Endpoint;
use crate::pipeline::Context;
use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use std::time::Instant;
use tracing::instrument;

/// JSON Web Key from a JWKS endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA", "EC" or "OKP").
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is intended for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (must be "sig" when present).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// X coordinate (EC) or public key (OKP), base64url encoded.
    #[serde(default)]
    pub x: Option<String>,

    /// Y coordinate (EC), base64url encoded.
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus, base64url encoded.
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent, base64url encoded.
    #[serde(default)]
    pub e: Option<String>,
}

impl Jwk {
    /// Whether the key may be used to verify signatures.
    pub fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().map_or(true, |key_use| key_use == "sig")
    }

    /// Build the verification key from the key material.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Verification` if the key type is unsupported
    /// or its material is missing or malformed.
    pub fn decoding_key(&self) -> Result<DecodingKey, PipelineError> {
        let missing = |field: &str| {
            tracing::warn!(target: "warden.pipeline.jwks", kid = ?self.kid, field, "JWK missing key material");
            PipelineError::Verification(format!("key is missing the '{field}' parameter"))
        };

        let result = match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or_else(|| missing("n"))?;
                let e = self.e.as_deref().ok_or_else(|| missing("e"))?;
                DecodingKey::from_rsa_components(n, e)
            }
            "EC" => {
                let x = self.x.as_deref().ok_or_else(|| missing("x"))?;
                let y = self.y.as_deref().ok_or_else(|| missing("y"))?;
                DecodingKey::from_ec_components(x, y)
            }
            "OKP" => {
                if self.crv.as_deref() != Some("Ed25519") {
                    return Err(PipelineError::Verification(format!(
                        "unsupported OKP curve {:?}",
                        self.crv
                    )));
                }
                let x = self.x.as_deref().ok_or_else(|| missing("x"))?;
                DecodingKey::from_ed_components(x)
            }
            other => {
                tracing::warn!(target: "warden.pipeline.jwks", kty = %other, "Unsupported JWK key type");
                return Err(PipelineError::Verification(format!(
                    "unsupported key type '{other}'"
                )));
            }
        };

        result.map_err(|e| {
            tracing::warn!(target: "warden.pipeline.jwks", kid = ?self.kid, error = %e, "Invalid JWK key material");
            PipelineError::Verification(format!("invalid key material: {e}"))
        })
    }
}

/// JWKS document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JwkSet {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Find the single key with the given key id.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::KeyResolution` when no key or more than one
    /// key carries the key id.
    pub fn find_unique(&self, kid: &str) -> Result<&Jwk, PipelineError> {
        let mut matching = self
            .keys
            .iter()
            .filter(|key| key.kid.as_deref() == Some(kid));

        match (matching.next(), matching.next()) {
            (Some(key), None) => Ok(key),
            (None, _) => {
                tracing::debug!(target: "warden.pipeline.jwks", kid = %kid, "Key not found in key set");
                Err(PipelineError::KeyResolution(
                    "no (unique) key found for the given key id".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                tracing::warn!(target: "warden.pipeline.jwks", kid = %kid, "Key id is not unique in key set");
                Err(PipelineError::KeyResolution(
                    "no (unique) key found for the given key id".to_string(),
                ))
            }
        }
    }
}

/// Fetch and decode the key set.
///
/// # Errors
///
/// Returns `PipelineError::Transport` if the endpoint fails or returns a
/// document that is not a key set, and propagates cancellation and
/// deadline errors.
#[instrument(skip_all, fields(url = %endpoint.url()))]
pub async fn fetch_key_set(endpoint: &Endpoint, ctx: &Context) -> Result<JwkSet, PipelineError> {
    let start = Instant::now();

    let result = endpoint
        .send_request(ctx, None)
        .await
        .and_then(|body| {
            serde_json::from_slice::<JwkSet>(&body).map_err(|e| {
                tracing::error!(target: "warden.pipeline.jwks", error = %e, "Failed to parse JWKS response");
                PipelineError::Transport(format!("invalid key set received: {e}"))
            })
        });

    match &result {
        Ok(key_set) => {
            tracing::debug!(
                target: "warden.pipeline.jwks",
                key_count = key_set.keys.len(),
                "Key set fetched"
            );
            metrics::record_key_set_fetch("success", start.elapsed());
        }
        Err(e) => {
            metrics::record_key_set_fetch(e.kind(), start.elapsed());
        }
    }

    result
}
