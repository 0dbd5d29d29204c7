//! Mutator variants: `noop` and `header`.
//!
//! The `header` mutator derives upstream headers from the subject:
//!
//! ```yaml
//! headers:
//!   X-User-Id: subject.id
//!   X-User-Email: subject.attributes.email
//!   X-Gateway: warden
//! ```
//!
//! Values starting with `subject.` are locators; anything else is copied
//! verbatim.

use crate::errors::PipelineError;
use crate::pipeline::subject::locate;
use crate::pipeline::{
    decode_config, is_empty_config, reject_config, Context, Mutator, Subject, SubjectContext,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Create a mutator prototype of the given type.
///
/// # Errors
///
/// Returns `PipelineError::Argument` for an unknown type or an invalid
/// configuration.
pub fn create_mutator(
    kind: &str,
    config: Option<&serde_yaml::Value>,
) -> Result<Arc<dyn Mutator>, PipelineError> {
    match kind {
        "noop" => {
            reject_config(&config.cloned().unwrap_or_default(), "noop mutator")?;
            Ok(Arc::new(NoopMutator))
        }
        "header" => Ok(Arc::new(HeaderMutator::from_config(config)?)),
        other => Err(PipelineError::Argument(format!(
            "unsupported mutator type '{other}'"
        ))),
    }
}

pub struct NoopMutator;

#[async_trait]
impl Mutator for NoopMutator {
    async fn mutate(
        &self,
        _ctx: &Context,
        _subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Mutator>, PipelineError> {
        reject_config(config, "noop mutator")?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum HeaderValue {
    SubjectId,
    Attribute(String),
    Literal(String),
}

impl HeaderValue {
    fn parse(value: &str) -> Result<Self, PipelineError> {
        match value.strip_prefix("subject.") {
            None => Ok(Self::Literal(value.to_string())),
            Some("id") => Ok(Self::SubjectId),
            Some(rest) => match rest.strip_prefix("attributes.") {
                Some(path) if !path.is_empty() => Ok(Self::Attribute(path.to_string())),
                _ => Err(PipelineError::Argument(format!(
                    "invalid subject locator '{value}'"
                ))),
            },
        }
    }

    fn render(&self, subject: &Subject) -> Option<String> {
        match self {
            Self::SubjectId => Some(subject.id.clone()),
            Self::Literal(value) => Some(value.clone()),
            Self::Attribute(path) => {
                let attributes = Value::Object(subject.attributes.clone());
                match locate(&attributes, path)? {
                    Value::Null => None,
                    Value::String(value) => Some(value.clone()),
                    other => Some(other.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeaderMutatorConfig {
    headers: BTreeMap<String, String>,
}

/// Adds headers computed from the subject to the subject context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMutator {
    headers: BTreeMap<String, HeaderValue>,
}

impl HeaderMutator {
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` if no headers are configured or a
    /// locator is invalid.
    pub fn from_config(config: Option<&serde_yaml::Value>) -> Result<Self, PipelineError> {
        let config: HeaderMutatorConfig = decode_config(config)?;
        if config.headers.is_empty() {
            return Err(PipelineError::Argument(
                "header mutator requires at least one header".to_string(),
            ));
        }

        let headers = config
            .headers
            .into_iter()
            .map(|(name, value)| Ok((name, HeaderValue::parse(&value)?)))
            .collect::<Result<BTreeMap<_, _>, PipelineError>>()?;

        Ok(Self { headers })
    }
}

#[async_trait]
impl Mutator for HeaderMutator {
    async fn mutate(
        &self,
        _ctx: &Context,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        let subject = subject_ctx.subject.as_ref().ok_or_else(|| {
            PipelineError::Internal("no subject available for header mutation".to_string())
        })?;

        let mut rendered = Vec::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            match value.render(subject) {
                Some(value) => rendered.push((name.clone(), value)),
                None => {
                    tracing::debug!(target: "warden.pipeline.mutators", header = %name, "Attribute not present, header skipped");
                }
            }
        }

        subject_ctx.headers.extend(rendered);
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Mutator>, PipelineError> {
        if is_empty_config(config) {
            return Ok(self);
        }
        Ok(Arc::new(Self::from_config(Some(config))?))
    }
}

/// Runs mutators in order, stopping at the first failure.
pub struct MutatorChain {
    mutators: Vec<Arc<dyn Mutator>>,
}

impl MutatorChain {
    pub fn new(mutators: Vec<Arc<dyn Mutator>>) -> Self {
        Self { mutators }
    }
}

#[async_trait]
impl Mutator for MutatorChain {
    async fn mutate(
        &self,
        ctx: &Context,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        for mutator in &self.mutators {
            mutator.mutate(ctx, subject_ctx).await?;
        }
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Mutator>, PipelineError> {
        reject_config(config, "mutator chain")?;
        Ok(self)
    }
}
