//! Builder patterns for test data construction
//!
//! Provides a fluent API for creating test token claims.

use chrono::{Duration, Utc};
use serde_json::{Map, Value};

/// Builder for creating test JWT claims
///
/// Only claims that were set (plus `sub`, `iat` and `exp`) are emitted.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_user("alice")
///     .issued_by("https://issuer.example.com")
///     .with_scope("read write")
///     .expires_in(60)
///     .build();
/// ```
pub struct TestTokenBuilder {
    sub: String,
    iss: Option<String>,
    aud: Option<Value>,
    scope: Option<String>,
    exp: Option<i64>,
    nbf: Option<i64>,
    iat: i64,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (expires in one hour)
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-subject".to_string(),
            iss: None,
            aud: None,
            scope: None,
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            nbf: None,
            iat: now.timestamp(),
        }
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = Some(issuer.to_string());
        self
    }

    /// Set a single audience (string form)
    pub fn for_audience(mut self, audience: &str) -> Self {
        self.aud = Some(Value::String(audience.to_string()));
        self
    }

    /// Set several audiences (array form)
    pub fn for_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = Some(Value::from(audiences.to_vec()));
        self
    }

    /// Set the scope (space-separated)
    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = Some(scope.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for expired tokens)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), Value::String(self.sub));
        claims.insert("iat".to_string(), Value::from(self.iat));
        if let Some(iss) = self.iss {
            claims.insert("iss".to_string(), Value::String(iss));
        }
        if let Some(aud) = self.aud {
            claims.insert("aud".to_string(), aud);
        }
        if let Some(scope) = self.scope {
            claims.insert("scope".to_string(), Value::String(scope));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), Value::from(exp));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), Value::from(nbf));
        }
        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
