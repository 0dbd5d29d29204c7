//! Bearer token (JWT) authenticator.
//!
//! Verifies compact JWS tokens against a remotely published key set and
//! turns the verified claims into a [`Subject`](crate::pipeline::Subject).
//!
//! # Security
//!
//! - Tokens are size- and structure-checked BEFORE any key lookup or parsing
//! - A token must name exactly one key of the key set (`kid`)
//! - The algorithm is pinned to the key's `alg` and checked against an
//!   allow-list of asymmetric algorithms
//! - Signature failures are reported as `Verification`, never retried
//! - Claim checks (issuer, audience, scopes, time window) run only after the
//!   signature is verified

use crate::errors::PipelineError;
use crate::pipeline::authenticators::assertions::{AssertionPolicy, Claims, Expectation};
use crate::pipeline::authenticators::jwks::{fetch_key_set, JwkSet};
use crate::pipeline::endpoint::{Endpoint, EndpointConfig};
use crate::pipeline::extractors::{
    strategy_from_config, AuthDataExtractStrategy, AuthDataSourceConfig, CompositeExtractStrategy,
};
use crate::pipeline::subject::SubjectInfo;
use crate::pipeline::{
    decode_config, is_empty_config, Authenticator, Context, RequestContext, SubjectContext,
};
use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

/// Handler configuration of the `jwt` authenticator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct JwtAuthenticatorConfig {
    jwks_endpoint: EndpointConfig,
    #[serde(default)]
    jwt_token_from: Vec<AuthDataSourceConfig>,
    #[serde(default)]
    jwt_assertions: Expectation,
    #[serde(default)]
    session: SubjectInfo,
}

/// Rule-level overrides accepted by [`JwtAuthenticator`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct JwtRuleConfig {
    #[serde(default)]
    jwt_assertions: Expectation,
}

/// Authenticates requests carrying a JWT signed by a key of a remote key set.
#[derive(Clone)]
pub struct JwtAuthenticator {
    endpoint: Arc<Endpoint>,
    auth_data: Arc<dyn AuthDataExtractStrategy>,
    subject_info: Arc<SubjectInfo>,
    policy: Arc<AssertionPolicy>,
}

impl JwtAuthenticator {
    pub fn new(
        endpoint: Endpoint,
        auth_data: Arc<dyn AuthDataExtractStrategy>,
        subject_info: SubjectInfo,
        policy: AssertionPolicy,
    ) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            auth_data,
            subject_info: Arc::new(subject_info),
            policy: Arc::new(policy),
        }
    }

    /// Build the authenticator from its handler configuration.
    ///
    /// Without `jwt_token_from` the token is looked up in the `Authorization`
    /// header (Bearer), then the `access_token` form and query parameters.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` for malformed configuration, an
    /// invalid key set endpoint or an invalid assertion policy.
    pub fn from_config(config: Option<&serde_yaml::Value>) -> Result<Self, PipelineError> {
        let config: JwtAuthenticatorConfig = decode_config(config)?;

        let endpoint = Endpoint::from_config(config.jwks_endpoint)?;
        let auth_data =
            strategy_from_config(config.jwt_token_from, CompositeExtractStrategy::bearer_token())?;
        let policy = config.jwt_assertions.into_policy()?;

        Ok(Self::new(endpoint, auth_data, config.session, policy))
    }

    pub fn policy(&self) -> &AssertionPolicy {
        &self.policy
    }

    /// Verify a token against a key set and return its claims.
    ///
    /// # Errors
    ///
    /// - `UnsupportedFormat` - oversized or structurally malformed token
    /// - `KeyResolution` - no `kid`, or not exactly one key with that `kid`
    /// - `AlgorithmNotAllowed` - algorithm unknown, not allowed, or the key
    ///   is not a signing key
    /// - `Verification` - the signature or the payload does not verify
    /// - `AssertionUnsatisfied` - the claims do not satisfy the policy
    pub fn verify_token(
        &self,
        token: &str,
        key_set: &JwkSet,
    ) -> Result<Map<String, Value>, PipelineError> {
        let header = common::jwt::decode_header(token).map_err(|e| {
            tracing::debug!(target: "warden.pipeline.jwt", error = %e, "Token has unsupported format");
            PipelineError::UnsupportedFormat
        })?;

        let kid = header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| {
                PipelineError::KeyResolution("token does not reference a key".to_string())
            })?;

        let jwk = key_set.find_unique(kid)?;

        let alg_name = jwk.alg.as_deref().unwrap_or(header.alg.as_str());
        let algorithm = Algorithm::from_str(alg_name).map_err(|_| {
            tracing::debug!(target: "warden.pipeline.jwt", alg = %alg_name, "Unknown algorithm");
            PipelineError::AlgorithmNotAllowed(alg_name.to_string())
        })?;

        if !self.policy.is_algorithm_allowed(algorithm) {
            tracing::info!(target: "warden.pipeline.jwt", alg = %alg_name, kid = %kid, "Algorithm not allowed");
            return Err(PipelineError::AlgorithmNotAllowed(alg_name.to_string()));
        }

        if !jwk.is_signing_key() {
            tracing::info!(target: "warden.pipeline.jwt", kid = %kid, "Key is not meant for signatures");
            return Err(PipelineError::AlgorithmNotAllowed(format!(
                "key '{kid}' is not usable for signature verification"
            )));
        }

        let decoding_key = jwk.decoding_key()?;

        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data =
            decode::<Map<String, Value>>(token, &decoding_key, &validation).map_err(|e| {
                tracing::info!(target: "warden.pipeline.jwt", kid = %kid, error = %e, "Token verification failed");
                PipelineError::Verification("token signature verification failed".to_string())
            })?;

        let claims = Claims::from_payload(&token_data.claims)?;
        self.policy.assert(&claims).map_err(|e| {
            tracing::info!(target: "warden.pipeline.jwt", kid = %kid, error = %e, "Token assertions not satisfied");
            e
        })?;

        Ok(token_data.claims)
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    #[instrument(skip_all, fields(jwks_url = %self.endpoint.url()))]
    async fn authenticate(
        &self,
        ctx: &Context,
        request: &dyn RequestContext,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        let token = self.auth_data.get_auth_data(request)?;
        common::jwt::check_structure(&token).map_err(|_| PipelineError::UnsupportedFormat)?;

        let key_set = fetch_key_set(&self.endpoint, ctx).await?;
        let claims = self.verify_token(&token, &key_set)?;

        let raw_claims = serde_json::to_vec(&claims)
            .map_err(|e| PipelineError::Internal(format!("failed to encode claims: {e}")))?;
        let subject = self.subject_info.get_subject(&raw_claims)?;

        tracing::debug!(target: "warden.pipeline.jwt", subject = %subject.id, "Token authenticated");
        subject_ctx.subject = Some(subject);
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authenticator>, PipelineError> {
        if is_empty_config(config) {
            return Ok(self);
        }

        let rule_config: JwtRuleConfig = decode_config(Some(config))?;
        let policy = rule_config.jwt_assertions.into_policy()?;

        Ok(Arc::new(Self {
            endpoint: Arc::clone(&self.endpoint),
            auth_data: Arc::clone(&self.auth_data),
            subject_info: Arc::clone(&self.subject_info),
            policy: Arc::new(policy),
        }))
    }
}
