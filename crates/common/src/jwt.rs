//! JWT utilities shared across Warden crates.
//!
//! This module provides the structural pieces of bearer token handling that
//! do not depend on a key set or an assertion policy:
//! - Size limits for DoS prevention
//! - Compact serialization checks (header.payload.signature)
//! - Protected header decoding (`alg`, `kid`)
//! - Clock skew constants and time-window validation
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing in this module verifies a signature; header values must only be
//!   used to select a key from a trusted key set
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{decode_header, validate_time_window_at, DEFAULT_CLOCK_SKEW};
//!
//! let header = decode_header(token)?;
//! // ... select the key by header.kid, verify the signature ...
//! validate_time_window_at(claims.nbf, claims.exp, claims.iat, DEFAULT_CLOCK_SKEW, now)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// JWTs larger than this size are rejected BEFORE any parsing or cryptographic
/// operations.
///
/// # Rationale
///
/// - Typical JWTs are 200-1500 bytes (header + claims + signature)
/// - RSA-4096 signed tokens with rich claims stay well below 4KB
/// - Checked BEFORE base64 decode and signature verification
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Number of dot-separated segments in a compact JWS (header.payload.signature).
pub const JWT_SEGMENT_COUNT: usize = 3;

/// Default validity leeway applied to `nbf`, `exp` and `iat` checks.
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(10);

/// Maximum allowed validity leeway (10 minutes).
///
/// Prevents misconfiguration that would keep expired tokens usable for
/// unreasonably long periods.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a JWT's structure or time window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("token exceeds the maximum allowed size")]
    TokenTooLarge,

    /// Token is not a compact JWS with exactly three segments.
    #[error("unsupported token format")]
    UnsupportedFormat,

    /// Token header could not be decoded.
    #[error("malformed token header")]
    MalformedHeader,

    /// Token `nbf` claim lies in the future.
    #[error("token is not yet valid")]
    NotYetValid,

    /// Token `exp` claim lies in the past.
    #[error("token is expired")]
    Expired,

    /// Token `iat` claim is too far in the future.
    #[error("token issued in the future")]
    IatTooFarInFuture,
}

// =============================================================================
// Header
// =============================================================================

/// The protected header fields needed to select a verification key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Signature algorithm announced by the token.
    pub alg: String,

    /// Key ID used to select the key from a key set.
    #[serde(default)]
    pub kid: Option<String>,

    /// Token type, usually `JWT`.
    #[serde(default)]
    pub typ: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Check size and compact structure of a token.
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `UnsupportedFormat` - Token does not consist of exactly three
///   dot-separated, non-empty header and payload segments
pub fn check_structure(token: &str) -> Result<(), JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != JWT_SEGMENT_COUNT {
        tracing::debug!(
            target: "common.jwt",
            parts = parts.len(),
            "Token rejected: invalid JWT format"
        );
        return Err(JwtValidationError::UnsupportedFormat);
    }

    if parts.iter().take(2).any(|part| part.is_empty()) {
        tracing::debug!(target: "common.jwt", "Token rejected: empty header or payload segment");
        return Err(JwtValidationError::UnsupportedFormat);
    }

    Ok(())
}

/// Decode the protected header of a compact JWS without verifying it.
///
/// # Errors
///
/// Returns `TokenTooLarge` or `UnsupportedFormat` from [`check_structure`],
/// or `MalformedHeader` if the header is not base64url-encoded JSON with a
/// string `alg` field.
pub fn decode_header(token: &str) -> Result<TokenHeader, JwtValidationError> {
    check_structure(token)?;

    let header_part = token
        .split('.')
        .next()
        .ok_or(JwtValidationError::UnsupportedFormat)?;

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedHeader
    })?;

    serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedHeader
    })
}

/// Validate the `nbf`, `exp` and `iat` claims against an explicit `now`
/// timestamp (seconds since the epoch).
///
/// Absent claims are not checked.
///
/// # Errors
///
/// - `NotYetValid` if `nbf > now + leeway`
/// - `Expired` if `now >= exp + leeway`
/// - `IatTooFarInFuture` if `iat > now + leeway`
pub fn validate_time_window_at(
    nbf: Option<i64>,
    exp: Option<i64>,
    iat: Option<i64>,
    leeway: Duration,
    now: i64,
) -> Result<(), JwtValidationError> {
    // Safe cast: leeway is bounded to MAX_CLOCK_SKEW by configuration validation
    #[allow(clippy::cast_possible_wrap)]
    let leeway_secs = leeway.as_secs() as i64;

    if let Some(nbf) = nbf {
        if nbf > now.saturating_add(leeway_secs) {
            tracing::debug!(target: "common.jwt", nbf, now, leeway_secs, "Token rejected: not yet valid");
            return Err(JwtValidationError::NotYetValid);
        }
    }

    if let Some(exp) = exp {
        if now >= exp.saturating_add(leeway_secs) {
            tracing::debug!(target: "common.jwt", exp, now, leeway_secs, "Token rejected: expired");
            return Err(JwtValidationError::Expired);
        }
    }

    if let Some(iat) = iat {
        if iat > now.saturating_add(leeway_secs) {
            tracing::debug!(
                target: "common.jwt",
                iat,
                now,
                leeway_secs,
                "Token rejected: iat too far in the future"
            );
            return Err(JwtValidationError::IatTooFarInFuture);
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
