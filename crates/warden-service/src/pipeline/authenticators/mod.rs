//! Authenticator variants.
//!
//! | type                  | behaviour                                        |
//! |-----------------------|--------------------------------------------------|
//! | `jwt`                 | verifies a bearer JWT against a remote key set   |
//! | `authentication_data` | resolves the subject through an identity endpoint|
//! | `anonymous`           | sets a fixed subject id                          |
//! | `noop`                | succeeds without a subject                       |
//! | `unauthorized`        | always fails                                     |

pub mod assertions;
pub mod authentication_data;
pub mod jwks;
pub mod jwt;

use crate::errors::PipelineError;
use crate::pipeline::{
    decode_config, is_empty_config, reject_config, Authenticator, Context, RequestContext, Subject,
    SubjectContext,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

pub use authentication_data::AuthenticationDataAuthenticator;
pub use jwt::JwtAuthenticator;

/// Create an authenticator prototype of the given type.
///
/// # Errors
///
/// Returns `PipelineError::Argument` for an unknown type or an invalid
/// configuration.
pub fn create_authenticator(
    kind: &str,
    config: Option<&serde_yaml::Value>,
) -> Result<Arc<dyn Authenticator>, PipelineError> {
    match kind {
        "jwt" => Ok(Arc::new(JwtAuthenticator::from_config(config)?)),
        "authentication_data" => Ok(Arc::new(AuthenticationDataAuthenticator::from_config(
            config,
        )?)),
        "anonymous" => Ok(Arc::new(AnonymousAuthenticator::from_config(config)?)),
        "noop" => {
            reject_config(&config.cloned().unwrap_or_default(), "noop authenticator")?;
            Ok(Arc::new(NoopAuthenticator))
        }
        "unauthorized" => {
            reject_config(
                &config.cloned().unwrap_or_default(),
                "unauthorized authenticator",
            )?;
            Ok(Arc::new(UnauthorizedAuthenticator))
        }
        other => Err(PipelineError::Argument(format!(
            "unsupported authenticator type '{other}'"
        ))),
    }
}

pub struct NoopAuthenticator;

#[async_trait]
impl Authenticator for NoopAuthenticator {
    async fn authenticate(
        &self,
        _ctx: &Context,
        _request: &dyn RequestContext,
        _subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authenticator>, PipelineError> {
        reject_config(config, "noop authenticator")?;
        Ok(self)
    }
}

pub struct UnauthorizedAuthenticator;

#[async_trait]
impl Authenticator for UnauthorizedAuthenticator {
    async fn authenticate(
        &self,
        _ctx: &Context,
        _request: &dyn RequestContext,
        _subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        Err(PipelineError::Unauthorized(
            "denied by authenticator".to_string(),
        ))
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authenticator>, PipelineError> {
        reject_config(config, "unauthorized authenticator")?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AnonymousConfig {
    #[serde(default)]
    subject: Option<String>,
}

/// Marks every request as coming from a fixed subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnonymousAuthenticator {
    subject: String,
}

impl AnonymousAuthenticator {
    pub const DEFAULT_SUBJECT: &'static str = "anonymous";

    /// # Errors
    ///
    /// Returns `PipelineError::Argument` for malformed configuration.
    pub fn from_config(config: Option<&serde_yaml::Value>) -> Result<Self, PipelineError> {
        let config: AnonymousConfig = decode_config(config)?;
        Ok(Self {
            subject: config
                .subject
                .filter(|subject| !subject.is_empty())
                .unwrap_or_else(|| Self::DEFAULT_SUBJECT.to_string()),
        })
    }
}

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    async fn authenticate(
        &self,
        _ctx: &Context,
        _request: &dyn RequestContext,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        subject_ctx.subject = Some(Subject::new(self.subject.clone()));
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authenticator>, PipelineError> {
        if is_empty_config(config) {
            return Ok(self);
        }
        Ok(Arc::new(Self::from_config(Some(config))?))
    }
}

/// Tries authenticators in order; the first success wins.
///
/// When every authenticator fails the last error is returned. Cancellation
/// and deadline errors end the attempt immediately.
pub struct CompositeAuthenticator {
    authenticators: Vec<Arc<dyn Authenticator>>,
}

impl CompositeAuthenticator {
    pub fn new(authenticators: Vec<Arc<dyn Authenticator>>) -> Self {
        Self { authenticators }
    }
}

#[async_trait]
impl Authenticator for CompositeAuthenticator {
    async fn authenticate(
        &self,
        ctx: &Context,
        request: &dyn RequestContext,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        let mut last_error =
            PipelineError::Argument("no authenticators configured".to_string());

        for authenticator in &self.authenticators {
            match authenticator.authenticate(ctx, request, subject_ctx).await {
                Ok(()) => return Ok(()),
                Err(e @ (PipelineError::Cancelled | PipelineError::DeadlineExceeded)) => {
                    return Err(e)
                }
                Err(e) => {
                    tracing::debug!(target: "warden.pipeline.authenticators", error = %e, "Authenticator failed, trying next");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authenticator>, PipelineError> {
        if is_empty_config(config) {
            return Ok(self);
        }
        Err(PipelineError::Argument(
            "composite authenticators cannot be reconfigured".to_string(),
        ))
    }
}
