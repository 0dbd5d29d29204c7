//! Construction of pipeline stages from configuration.
//!
//! The pipeline configuration declares named handler prototypes per stage
//! kind. Rules reference prototypes by id and may specialize them with a
//! rule-level `config` block:
//!
//! ```yaml
//! authenticators:
//!   - id: bearer
//!     type: jwt
//!     config:
//!       jwks_endpoint:
//!         url: https://idp.example/.well-known/jwks.json
//! authorizers:
//!   - id: allow_all
//!     type: allow
//! error_handlers:
//!   - id: default
//!     type: default
//! default_rule:
//!   authenticators: [{ id: bearer }]
//!   authorizer: { id: allow_all }
//!   error_handlers: [{ id: default }]
//! ```

use crate::errors::PipelineError;
use crate::pipeline::authenticators::{create_authenticator, CompositeAuthenticator};
use crate::pipeline::authorizers::create_authorizer;
use crate::pipeline::error_handlers::{create_error_handler, ErrorHandlerChain};
use crate::pipeline::hydrators::{create_hydrator, HydratorChain};
use crate::pipeline::mutators::{create_mutator, MutatorChain};
use crate::pipeline::{Authenticator, Authorizer, ErrorHandler, Hydrator, Mutator};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Reference from a rule to a handler prototype.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerRef {
    pub id: String,
    #[serde(default)]
    pub config: Option<serde_yaml::Value>,
}

impl HandlerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            config: None,
        }
    }
}

/// A named handler prototype.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: Option<serde_yaml::Value>,
}

/// Stage references used for stages a rule leaves out.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DefaultRuleConfig {
    #[serde(default)]
    pub authenticators: Vec<HandlerRef>,
    #[serde(default)]
    pub authorizer: Option<HandlerRef>,
    #[serde(default)]
    pub hydrators: Vec<HandlerRef>,
    #[serde(default)]
    pub mutators: Vec<HandlerRef>,
    #[serde(default)]
    pub error_handlers: Vec<HandlerRef>,
}

/// Pipeline configuration document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub authenticators: Vec<HandlerDefinition>,
    #[serde(default)]
    pub authorizers: Vec<HandlerDefinition>,
    #[serde(default)]
    pub hydrators: Vec<HandlerDefinition>,
    #[serde(default)]
    pub mutators: Vec<HandlerDefinition>,
    #[serde(default)]
    pub error_handlers: Vec<HandlerDefinition>,
    #[serde(default)]
    pub default_rule: Option<DefaultRuleConfig>,
}

impl PipelineConfig {
    /// Parse a pipeline configuration document.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` for malformed YAML or unknown fields.
    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        serde_yaml::from_str(text).map_err(|e| {
            PipelineError::Argument(format!("failed to parse pipeline configuration: {e}"))
        })
    }
}

/// Builds the stages of a rule from handler references.
pub trait HandlerFactory: Send + Sync {
    /// Several references are combined; the first successful authenticator wins.
    fn create_authenticator(
        &self,
        refs: &[HandlerRef],
    ) -> Result<Arc<dyn Authenticator>, PipelineError>;

    fn create_authorizer(&self, handler: &HandlerRef)
        -> Result<Arc<dyn Authorizer>, PipelineError>;

    fn create_hydrator(&self, refs: &[HandlerRef]) -> Result<Arc<dyn Hydrator>, PipelineError>;

    fn create_mutator(&self, refs: &[HandlerRef]) -> Result<Arc<dyn Mutator>, PipelineError>;

    fn create_error_handler(
        &self,
        refs: &[HandlerRef],
    ) -> Result<Arc<dyn ErrorHandler>, PipelineError>;
}

/// Handler factory backed by prototypes built once from [`PipelineConfig`].
pub struct PrototypeHandlerFactory {
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
    authorizers: HashMap<String, Arc<dyn Authorizer>>,
    hydrators: HashMap<String, Arc<dyn Hydrator>>,
    mutators: HashMap<String, Arc<dyn Mutator>>,
    error_handlers: HashMap<String, Arc<dyn ErrorHandler>>,
}

fn build_prototypes<T: ?Sized>(
    stage: &str,
    definitions: &[HandlerDefinition],
    create: impl Fn(&str, Option<&serde_yaml::Value>) -> Result<Arc<T>, PipelineError>,
) -> Result<HashMap<String, Arc<T>>, PipelineError> {
    let mut prototypes = HashMap::with_capacity(definitions.len());

    for definition in definitions {
        let prototype = create(&definition.kind, definition.config.as_ref()).map_err(|e| {
            tracing::error!(
                target: "warden.pipeline.factory",
                stage,
                id = %definition.id,
                error = %e,
                "Failed to create handler prototype"
            );
            PipelineError::Argument(format!(
                "failed to create {stage} '{}': {e}",
                definition.id
            ))
        })?;

        if prototypes.insert(definition.id.clone(), prototype).is_some() {
            return Err(PipelineError::Argument(format!(
                "duplicate {stage} id '{}'",
                definition.id
            )));
        }
    }

    Ok(prototypes)
}

/// Look up the prototypes for the references and apply their rule configs.
fn resolve<T: ?Sized>(
    stage: &str,
    prototypes: &HashMap<String, Arc<T>>,
    refs: &[HandlerRef],
    with_config: impl Fn(Arc<T>, &serde_yaml::Value) -> Result<Arc<T>, PipelineError>,
) -> Result<Vec<Arc<T>>, PipelineError> {
    if refs.is_empty() {
        return Err(PipelineError::Argument(format!("no {stage} configured")));
    }

    refs.iter()
        .map(|handler| {
            let prototype = prototypes.get(&handler.id).ok_or_else(|| {
                PipelineError::Argument(format!("no {stage} with id '{}'", handler.id))
            })?;

            match &handler.config {
                Some(config) => with_config(Arc::clone(prototype), config),
                None => Ok(Arc::clone(prototype)),
            }
        })
        .collect()
}

impl PrototypeHandlerFactory {
    /// Build all prototypes declared by the configuration.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` on unknown handler types, invalid
    /// handler configuration or duplicate ids.
    pub fn new(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let factory = Self {
            authenticators: build_prototypes(
                "authenticator",
                &config.authenticators,
                create_authenticator,
            )?,
            authorizers: build_prototypes("authorizer", &config.authorizers, create_authorizer)?,
            hydrators: build_prototypes("hydrator", &config.hydrators, create_hydrator)?,
            mutators: build_prototypes("mutator", &config.mutators, create_mutator)?,
            error_handlers: build_prototypes(
                "error handler",
                &config.error_handlers,
                create_error_handler,
            )?,
        };

        tracing::info!(
            target: "warden.pipeline.factory",
            authenticators = factory.authenticators.len(),
            authorizers = factory.authorizers.len(),
            hydrators = factory.hydrators.len(),
            mutators = factory.mutators.len(),
            error_handlers = factory.error_handlers.len(),
            "Handler prototypes created"
        );

        Ok(factory)
    }
}

impl HandlerFactory for PrototypeHandlerFactory {
    fn create_authenticator(
        &self,
        refs: &[HandlerRef],
    ) -> Result<Arc<dyn Authenticator>, PipelineError> {
        let mut authenticators =
            resolve("authenticator", &self.authenticators, refs, |prototype, config| {
                prototype.with_config(config)
            })?;

        if authenticators.len() == 1 {
            if let Some(authenticator) = authenticators.pop() {
                return Ok(authenticator);
            }
        }

        Ok(Arc::new(CompositeAuthenticator::new(authenticators)))
    }

    fn create_authorizer(
        &self,
        handler: &HandlerRef,
    ) -> Result<Arc<dyn Authorizer>, PipelineError> {
        let mut authorizers = resolve(
            "authorizer",
            &self.authorizers,
            std::slice::from_ref(handler),
            |prototype, config| prototype.with_config(config),
        )?;

        authorizers
            .pop()
            .ok_or_else(|| PipelineError::Argument("no authorizer configured".to_string()))
    }

    fn create_hydrator(&self, refs: &[HandlerRef]) -> Result<Arc<dyn Hydrator>, PipelineError> {
        let hydrators = resolve("hydrator", &self.hydrators, refs, |prototype, config| {
            prototype.with_config(config)
        })?;
        Ok(Arc::new(HydratorChain::new(hydrators)))
    }

    fn create_mutator(&self, refs: &[HandlerRef]) -> Result<Arc<dyn Mutator>, PipelineError> {
        let mutators = resolve("mutator", &self.mutators, refs, |prototype, config| {
            prototype.with_config(config)
        })?;
        Ok(Arc::new(MutatorChain::new(mutators)))
    }

    fn create_error_handler(
        &self,
        refs: &[HandlerRef],
    ) -> Result<Arc<dyn ErrorHandler>, PipelineError> {
        let handlers = resolve(
            "error handler",
            &self.error_handlers,
            refs,
            |prototype, config| prototype.with_config(config),
        )?;
        Ok(Arc::new(ErrorHandlerChain::new(handlers)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::testing::FakeRequest;
    use crate::pipeline::{Context, SubjectContext};

    const CONFIG: &str = r#"
authenticators:
  - id: anon
    type: anonymous
  - id: deny
    type: unauthorized
authorizers:
  - id: allow
    type: allow
hydrators:
  - id: tier
    type: static
    config:
      attributes:
        tier: gold
mutators:
  - id: noop
    type: noop
error_handlers:
  - id: default
    type: default
default_rule:
  authenticators: [{ id: deny }]
  authorizer: { id: allow }
"#;

    fn factory() -> PrototypeHandlerFactory {
        PrototypeHandlerFactory::new(&PipelineConfig::from_yaml(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_pipeline_config() {
        let config = PipelineConfig::from_yaml(CONFIG).unwrap();

        assert_eq!(config.authenticators.len(), 2);
        assert_eq!(config.authenticators.first().unwrap().kind, "anonymous");
        let default_rule = config.default_rule.unwrap();
        assert_eq!(default_rule.authorizer, Some(HandlerRef::new("allow")));
        assert!(default_rule.hydrators.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_fields() {
        let result = PipelineConfig::from_yaml("authenticators: []\nrules: []");
        assert!(matches!(result, Err(PipelineError::Argument(_))));
    }

    #[test]
    fn test_new_rejects_invalid_definitions() {
        for yaml in [
            "authenticators:\n  - id: a\n    type: kerberos",
            "authenticators:\n  - id: a\n    type: noop\n  - id: a\n    type: noop",
            "hydrators:\n  - id: h\n    type: static\n    config:\n      attrs: {}",
        ] {
            let config = PipelineConfig::from_yaml(yaml).unwrap();
            assert!(
                matches!(
                    PrototypeHandlerFactory::new(&config),
                    Err(PipelineError::Argument(_))
                ),
                "{yaml}"
            );
        }
    }

    #[test]
    fn test_unknown_reference_and_empty_list_rejected() {
        let factory = factory();

        assert!(matches!(
            factory.create_authenticator(&[HandlerRef::new("missing")]),
            Err(PipelineError::Argument(_))
        ));
        assert!(matches!(
            factory.create_mutator(&[]),
            Err(PipelineError::Argument(_))
        ));
    }

    #[tokio::test]
    async fn test_multiple_authenticators_are_combined() {
        let factory = factory();
        let authenticator = factory
            .create_authenticator(&[HandlerRef::new("deny"), HandlerRef::new("anon")])
            .unwrap();

        let mut subject_ctx = SubjectContext::default();
        authenticator
            .authenticate(&Context::default(), &FakeRequest::default(), &mut subject_ctx)
            .await
            .unwrap();

        assert_eq!(subject_ctx.subject.unwrap().id, "anonymous");
    }

    #[tokio::test]
    async fn test_reference_config_specializes_prototype() {
        let factory = factory();
        let reference = HandlerRef {
            id: "anon".to_string(),
            config: Some(serde_yaml::from_str("subject: guest").unwrap()),
        };

        let authenticator = factory.create_authenticator(&[reference]).unwrap();
        let mut subject_ctx = SubjectContext::default();
        authenticator
            .authenticate(&Context::default(), &FakeRequest::default(), &mut subject_ctx)
            .await
            .unwrap();
        assert_eq!(subject_ctx.subject.unwrap().id, "guest");

        let prototype = factory
            .create_authenticator(&[HandlerRef::new("anon")])
            .unwrap();
        let mut subject_ctx = SubjectContext::default();
        prototype
            .authenticate(&Context::default(), &FakeRequest::default(), &mut subject_ctx)
            .await
            .unwrap();
        assert_eq!(subject_ctx.subject.unwrap().id, "anonymous");
    }

    #[test]
    fn test_reference_config_rejected_by_stage() {
        let factory = factory();
        let reference = HandlerRef {
            id: "allow".to_string(),
            config: Some(serde_yaml::from_str("expression: 'true'").unwrap()),
        };

        assert!(matches!(
            factory.create_authorizer(&reference),
            Err(PipelineError::Argument(_))
        ));
    }
}
