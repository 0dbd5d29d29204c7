//! Cryptographic fixtures for testing
//!
//! Provides ES256 (P-256) keypairs that can be published as JWKs and used to
//! sign test tokens. ECDSA keys are random; tests compare behavior, never
//! signatures.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde_json::{json, Value};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// An ES256 signing key with its key id.
pub struct TestKeypair {
    kid: String,
    pkcs8: Vec<u8>,
    x: String,
    y: String,
}

impl TestKeypair {
    /// Generate a fresh P-256 keypair.
    pub fn generate(kid: &str) -> Result<Self, FixtureError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate keypair: {:?}", e)))?;
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| FixtureError::Crypto(format!("Failed to load keypair: {:?}", e)))?;

        // Uncompressed point: 0x04 || x (32 bytes) || y (32 bytes)
        let point = key_pair.public_key().as_ref();
        let (x, y) = match (point.get(1..33), point.get(33..65)) {
            (Some(x), Some(y)) => (URL_SAFE_NO_PAD.encode(x), URL_SAFE_NO_PAD.encode(y)),
            _ => {
                return Err(FixtureError::Crypto(
                    "Unexpected public key encoding".to_string(),
                ))
            }
        };

        Ok(Self {
            kid: kid.to_string(),
            pkcs8: pkcs8.as_ref().to_vec(),
            x,
            y,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// The public key as a JWK with `alg: ES256` and `use: sig`.
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "EC",
            "kid": self.kid,
            "alg": "ES256",
            "use": "sig",
            "crv": "P-256",
            "x": self.x,
            "y": self.y,
        })
    }

    /// Sign claims with an ES256 header carrying this key's `kid`.
    pub fn sign_token(&self, claims: &Value) -> Result<String, FixtureError> {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.kid.clone());
        self.sign_token_with_header(&header, claims)
    }

    /// Sign claims with a caller-supplied header.
    pub fn sign_token_with_header(
        &self,
        header: &Header,
        claims: &Value,
    ) -> Result<String, FixtureError> {
        jsonwebtoken::encode(header, claims, &EncodingKey::from_ec_der(&self.pkcs8))
            .map_err(|e| FixtureError::Signing(e.to_string()))
    }
}

/// A key set document publishing the given JWKs.
pub fn jwk_set(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwk_has_public_coordinates() {
        let key = TestKeypair::generate("k1").unwrap();
        let jwk = key.jwk();

        assert_eq!(jwk["kid"], "k1");
        assert_eq!(jwk["kty"], "EC");
        // 32 bytes base64url without padding
        assert_eq!(jwk["x"].as_str().unwrap().len(), 43);
        assert_eq!(jwk["y"].as_str().unwrap().len(), 43);
    }

    #[test]
    fn test_signed_token_carries_kid() {
        let key = TestKeypair::generate("k1").unwrap();
        let token = key.sign_token(&json!({"sub": "alice"})).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::ES256);
        assert_eq!(header.kid.as_deref(), Some("k1"));
    }

    #[test]
    fn test_different_keys_differ() {
        let first = TestKeypair::generate("k1").unwrap();
        let second = TestKeypair::generate("k1").unwrap();

        assert_ne!(first.jwk()["x"], second.jwk()["x"]);
    }
}
