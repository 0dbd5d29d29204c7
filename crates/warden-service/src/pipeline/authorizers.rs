//! Authorizer variants: `allow` and `deny`.

use crate::errors::PipelineError;
use crate::pipeline::{reject_config, Authorizer, Context, RequestContext, SubjectContext};
use async_trait::async_trait;
use std::sync::Arc;

/// Create an authorizer prototype of the given type.
///
/// # Errors
///
/// Returns `PipelineError::Argument` for an unknown type or a non-empty
/// configuration.
pub fn create_authorizer(
    kind: &str,
    config: Option<&serde_yaml::Value>,
) -> Result<Arc<dyn Authorizer>, PipelineError> {
    let config = config.cloned().unwrap_or_default();
    match kind {
        "allow" => {
            reject_config(&config, "allow authorizer")?;
            Ok(Arc::new(AllowAuthorizer))
        }
        "deny" => {
            reject_config(&config, "deny authorizer")?;
            Ok(Arc::new(DenyAuthorizer))
        }
        other => Err(PipelineError::Argument(format!(
            "unsupported authorizer type '{other}'"
        ))),
    }
}

pub struct AllowAuthorizer;

#[async_trait]
impl Authorizer for AllowAuthorizer {
    async fn authorize(
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
    ) -> Result<Arc<dyn Authorizer>, PipelineError> {
        reject_config(config, "allow authorizer")?;
        Ok(self)
    }
}

pub struct DenyAuthorizer;

#[async_trait]
impl Authorizer for DenyAuthorizer {
    async fn authorize(
        &self,
        _ctx: &Context,
        _request: &dyn RequestContext,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        tracing::debug!(
            target: "warden.pipeline.authorizers",
            subject = ?subject_ctx.subject.as_ref().map(|subject| subject.id.as_str()),
            "Request denied"
        );
        Err(PipelineError::Forbidden("denied by authorizer".to_string()))
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authorizer>, PipelineError> {
        reject_config(config, "deny authorizer")?;
        Ok(self)
    }
}
