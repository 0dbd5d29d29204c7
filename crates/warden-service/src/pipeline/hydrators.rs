//! Hydrator variants: `noop` and `static`.
//!
//! Hydrators enrich the authenticated subject. A rule's hydrators run in
//! the configured order through [`HydratorChain`].

use crate::errors::PipelineError;
use crate::pipeline::{decode_config, is_empty_config, reject_config, Context, Hydrator, SubjectContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Create a hydrator prototype of the given type.
///
/// # Errors
///
/// Returns `PipelineError::Argument` for an unknown type or an invalid
/// configuration.
pub fn create_hydrator(
    kind: &str,
    config: Option<&serde_yaml::Value>,
) -> Result<Arc<dyn Hydrator>, PipelineError> {
    match kind {
        "noop" => {
            reject_config(&config.cloned().unwrap_or_default(), "noop hydrator")?;
            Ok(Arc::new(NoopHydrator))
        }
        "static" => Ok(Arc::new(StaticHydrator::from_config(config)?)),
        other => Err(PipelineError::Argument(format!(
            "unsupported hydrator type '{other}'"
        ))),
    }
}

pub struct NoopHydrator;

#[async_trait]
impl Hydrator for NoopHydrator {
    async fn hydrate(
        &self,
        _ctx: &Context,
        _subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Hydrator>, PipelineError> {
        reject_config(config, "noop hydrator")?;
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StaticHydratorConfig {
    #[serde(default)]
    attributes: Map<String, Value>,
}

/// Merges a fixed set of attributes into the subject.
///
/// Existing attributes with the same name are overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticHydrator {
    attributes: Map<String, Value>,
}

impl StaticHydrator {
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` for malformed configuration.
    pub fn from_config(config: Option<&serde_yaml::Value>) -> Result<Self, PipelineError> {
        let config: StaticHydratorConfig = decode_config(config)?;
        Ok(Self {
            attributes: config.attributes,
        })
    }
}

#[async_trait]
impl Hydrator for StaticHydrator {
    async fn hydrate(
        &self,
        _ctx: &Context,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        let subject = subject_ctx.subject.as_mut().ok_or_else(|| {
            PipelineError::Internal("no subject available for hydration".to_string())
        })?;

        subject
            .attributes
            .extend(self.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Hydrator>, PipelineError> {
        if is_empty_config(config) {
            return Ok(self);
        }
        Ok(Arc::new(Self::from_config(Some(config))?))
    }
}

/// Runs hydrators in order, stopping at the first failure.
pub struct HydratorChain {
    hydrators: Vec<Arc<dyn Hydrator>>,
}

impl HydratorChain {
    pub fn new(hydrators: Vec<Arc<dyn Hydrator>>) -> Self {
        Self { hydrators }
    }
}

#[async_trait]
impl Hydrator for HydratorChain {
    async fn hydrate(
        &self,
        ctx: &Context,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        for hydrator in &self.hydrators {
            hydrator.hydrate(ctx, subject_ctx).await?;
        }
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Hydrator>, PipelineError> {
        reject_config(config, "hydrator chain")?;
        Ok(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::Subject;
    use serde_json::json;

    fn yaml(text: &str) -> serde_yaml::Value {
        serde_yaml::from_str(text).unwrap()
    }

    fn subject_ctx() -> SubjectContext {
        SubjectContext {
            subject: Some(Subject::new("alice")),
            ..SubjectContext::default()
        }
    }

    #[tokio::test]
    async fn test_static_hydrator_merges_attributes() {
        let hydrator =
            create_hydrator("static", Some(&yaml("attributes:\n  tier: gold\n  quota: 5"))).unwrap();
        let mut subject_ctx = subject_ctx();

        hydrator
            .hydrate(&Context::default(), &mut subject_ctx)
            .await
            .unwrap();

        let attributes = subject_ctx.subject.unwrap().attributes;
        assert_eq!(attributes.get("tier"), Some(&json!("gold")));
        assert_eq!(attributes.get("quota"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_static_hydrator_requires_subject() {
        let hydrator = StaticHydrator::from_config(None).unwrap();
        let result = hydrator
            .hydrate(&Context::default(), &mut SubjectContext::default())
            .await;

        assert!(matches!(result, Err(PipelineError::Internal(_))));
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let chain = HydratorChain::new(vec![
            create_hydrator("static", Some(&yaml("attributes:\n  tier: silver"))).unwrap(),
            create_hydrator("noop", None).unwrap(),
            create_hydrator("static", Some(&yaml("attributes:\n  tier: gold"))).unwrap(),
        ]);
        let mut subject_ctx = subject_ctx();

        chain
            .hydrate(&Context::default(), &mut subject_ctx)
            .await
            .unwrap();

        assert_eq!(
            subject_ctx.subject.unwrap().attributes.get("tier"),
            Some(&json!("gold"))
        );
    }

    #[tokio::test]
    async fn test_with_config_replaces_attributes() {
        let prototype = Arc::new(StaticHydrator::from_config(Some(&yaml("attributes:\n  a: 1"))).unwrap());
        let derived = Arc::clone(&prototype)
            .with_config(&yaml("attributes:\n  b: 2"))
            .unwrap();
        let mut subject_ctx = subject_ctx();

        derived
            .hydrate(&Context::default(), &mut subject_ctx)
            .await
            .unwrap();

        let attributes = subject_ctx.subject.unwrap().attributes;
        assert!(attributes.get("a").is_none());
        assert_eq!(attributes.get("b"), Some(&json!(2)));
        assert_eq!(prototype.attributes.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_create_hydrator_rejects_unknown_type() {
        assert!(matches!(
            create_hydrator("remote", None),
            Err(PipelineError::Argument(_))
        ));
    }
}
