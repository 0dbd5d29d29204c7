//! Claim assertions evaluated after a token's signature has been verified.
//!
//! An [`Expectation`] is the raw `jwt_assertions` configuration block; it is
//! validated once into an immutable [`AssertionPolicy`] which the verifier
//! shares across requests.

use crate::errors::PipelineError;
use common::jwt::{validate_time_window_at, JwtValidationError, DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::time::Duration;

/// Algorithms accepted when the configuration does not name any.
pub const DEFAULT_ALLOWED_ALGORITHMS: [Algorithm; 6] = [
    Algorithm::ES256,
    Algorithm::ES384,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
    Algorithm::EdDSA,
];

/// The `jwt_assertions` configuration block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    /// Accepted `iss` values. Empty accepts any issuer.
    #[serde(default)]
    pub issuers: Vec<String>,

    /// Audiences that must all be present in `aud`.
    #[serde(default)]
    pub audience: Vec<String>,

    /// Scopes that must all be granted by the token.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Allowed signature algorithms. Empty selects the defaults.
    #[serde(default)]
    pub allowed_algorithms: Vec<String>,

    /// Leeway for the time-based checks.
    #[serde(default)]
    pub validity_leeway_seconds: Option<u64>,
}

impl Expectation {
    /// Validate the block and resolve its defaults.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` for unknown or symmetric algorithms
    /// and for a leeway above the maximum.
    pub fn into_policy(self) -> Result<AssertionPolicy, PipelineError> {
        let allowed_algorithms = if self.allowed_algorithms.is_empty() {
            DEFAULT_ALLOWED_ALGORITHMS.to_vec()
        } else {
            self.allowed_algorithms
                .iter()
                .map(|name| parse_asymmetric_algorithm(name))
                .collect::<Result<Vec<_>, _>>()?
        };

        let leeway = match self.validity_leeway_seconds {
            None => DEFAULT_CLOCK_SKEW,
            Some(secs) if Duration::from_secs(secs) <= MAX_CLOCK_SKEW => Duration::from_secs(secs),
            Some(secs) => {
                return Err(PipelineError::Argument(format!(
                    "validity_leeway_seconds must not exceed {}, got {secs}",
                    MAX_CLOCK_SKEW.as_secs()
                )))
            }
        };

        Ok(AssertionPolicy {
            issuers: self.issuers,
            audience: self.audience,
            scopes: self.scopes,
            allowed_algorithms,
            leeway,
        })
    }
}

fn parse_asymmetric_algorithm(name: &str) -> Result<Algorithm, PipelineError> {
    let algorithm = Algorithm::from_str(name)
        .map_err(|_| PipelineError::Argument(format!("unknown algorithm '{name}'")))?;

    if matches!(
        algorithm,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
    ) {
        return Err(PipelineError::Argument(format!(
            "symmetric algorithm '{name}' is not allowed"
        )));
    }

    Ok(algorithm)
}

/// Validated claim checks applied to every verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionPolicy {
    issuers: Vec<String>,
    audience: Vec<String>,
    scopes: Vec<String>,
    allowed_algorithms: Vec<Algorithm>,
    leeway: Duration,
}

impl Default for AssertionPolicy {
    fn default() -> Self {
        Self {
            issuers: Vec::new(),
            audience: Vec::new(),
            scopes: Vec::new(),
            allowed_algorithms: DEFAULT_ALLOWED_ALGORITHMS.to_vec(),
            leeway: DEFAULT_CLOCK_SKEW,
        }
    }
}

impl AssertionPolicy {
    pub fn is_algorithm_allowed(&self, algorithm: Algorithm) -> bool {
        self.allowed_algorithms.contains(&algorithm)
    }

    pub fn leeway(&self) -> Duration {
        self.leeway
    }

    /// Check the claims against the current time.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::AssertionUnsatisfied` naming the first failed
    /// check.
    pub fn assert(&self, claims: &Claims) -> Result<(), PipelineError> {
        self.assert_at(claims, chrono::Utc::now().timestamp())
    }

    /// Deterministic variant of [`AssertionPolicy::assert`].
    ///
    /// # Errors
    ///
    /// See [`AssertionPolicy::assert`].
    pub fn assert_at(&self, claims: &Claims, now: i64) -> Result<(), PipelineError> {
        validate_time_window_at(
            claims.not_before,
            claims.expires_at,
            claims.issued_at,
            self.leeway,
            now,
        )
        .map_err(|e| match e {
            JwtValidationError::NotYetValid
            | JwtValidationError::Expired
            | JwtValidationError::IatTooFarInFuture => {
                PipelineError::AssertionUnsatisfied(e.to_string())
            }
            other => PipelineError::Verification(other.to_string()),
        })?;

        if !self.issuers.is_empty() {
            let trusted = claims
                .issuer
                .as_ref()
                .is_some_and(|issuer| self.issuers.contains(issuer));
            if !trusted {
                return Err(PipelineError::AssertionUnsatisfied(
                    "issuer is not trusted".to_string(),
                ));
            }
        }

        if let Some(missing) = self
            .audience
            .iter()
            .find(|expected| !claims.audience.contains(expected))
        {
            return Err(PipelineError::AssertionUnsatisfied(format!(
                "audience '{missing}' is not granted"
            )));
        }

        if let Some(missing) = self
            .scopes
            .iter()
            .find(|required| !claims.scopes.contains(required))
        {
            return Err(PipelineError::AssertionUnsatisfied(format!(
                "required scope '{missing}' is not granted"
            )));
        }

        Ok(())
    }
}

/// Registered claims relevant to the assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    pub issuer: Option<String>,
    pub audience: Vec<String>,
    pub scopes: Vec<String>,
    pub not_before: Option<i64>,
    pub expires_at: Option<i64>,
    pub issued_at: Option<i64>,
}

impl Claims {
    /// Read the registered claims from a verified payload.
    ///
    /// `aud` may be a string or an array. Scopes are read from `scp`, falling
    /// back to `scope`; either may be an array or a space-separated string.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Verification` when a registered claim has the
    /// wrong type.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, PipelineError> {
        let issuer = match payload.get("iss") {
            None | Some(Value::Null) => None,
            Some(Value::String(issuer)) => Some(issuer.clone()),
            Some(_) => return Err(malformed("iss")),
        };

        let audience = match payload.get("aud") {
            Some(Value::String(audience)) => vec![audience.clone()],
            aud => string_list(aud, "aud")?,
        };
        let scopes = match payload.get("scp") {
            None | Some(Value::Null) => string_list(payload.get("scope"), "scope")?,
            scp => string_list(scp, "scp")?,
        };

        Ok(Self {
            issuer,
            audience,
            scopes,
            not_before: numeric_date(payload.get("nbf"), "nbf")?,
            expires_at: numeric_date(payload.get("exp"), "exp")?,
            issued_at: numeric_date(payload.get("iat"), "iat")?,
        })
    }
}

fn malformed(claim: &str) -> PipelineError {
    PipelineError::Verification(format!("claim '{claim}' has an unexpected type"))
}

fn string_list(value: Option<&Value>, claim: &str) -> Result<Vec<String>, PipelineError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(value)) => Ok(value.split_whitespace().map(str::to_string).collect()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| malformed(claim)))
            .collect(),
        Some(_) => Err(malformed(claim)),
    }
}

fn numeric_date(value: Option<&Value>, claim: &str) -> Result<Option<i64>, PipelineError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => {
            if let Some(seconds) = number.as_i64() {
                Ok(Some(seconds))
            } else {
                // Fractional dates are truncated to whole seconds
                #[allow(clippy::cast_possible_truncation)]
                number
                    .as_f64()
                    .map(|seconds| Some(seconds as i64))
                    .ok_or_else(|| malformed(claim))
            }
        }
        Some(_) => Err(malformed(claim)),
    }
}
