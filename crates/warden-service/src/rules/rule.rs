//! A rule: URL/method matching metadata plus a fixed five-stage pipeline.

use crate::errors::PipelineError;
use crate::observability::metrics;
use crate::pipeline::factory::{DefaultRuleConfig, HandlerFactory, HandlerRef};
use crate::pipeline::{
    Authenticator, Authorizer, Context, ErrorHandler, Hydrator, Mutator, RequestContext,
    SubjectContext,
};
use crate::rules::config::RuleConfig;
use crate::rules::pattern::UrlPattern;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Pick the rule's references for a stage, or the default rule's.
fn refs_or_default<'a>(
    stage: &str,
    own: &'a [HandlerRef],
    default: Option<&'a [HandlerRef]>,
) -> Result<&'a [HandlerRef], PipelineError> {
    if !own.is_empty() {
        return Ok(own);
    }
    match default {
        Some(default) if !default.is_empty() => Ok(default),
        _ => Err(PipelineError::Argument(format!(
            "no {stage} configured and no default available"
        ))),
    }
}

pub struct Rule {
    id: String,
    source_id: String,
    pattern: UrlPattern,
    methods: Vec<String>,
    authenticator: Arc<dyn Authenticator>,
    authorizer: Arc<dyn Authorizer>,
    hydrator: Arc<dyn Hydrator>,
    mutator: Arc<dyn Mutator>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("source_id", &self.source_id)
            .field("pattern", &self.pattern.as_str())
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

impl Rule {
    /// Construct a rule, building every stage through the factory.
    ///
    /// Stages the rule leaves out are taken from `defaults`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` for an invalid URL pattern, an empty
    /// method name, a missing stage without default, or any stage
    /// construction failure reported by the factory.
    pub fn new(
        config: &RuleConfig,
        source_id: &str,
        factory: &dyn HandlerFactory,
        defaults: Option<&DefaultRuleConfig>,
    ) -> Result<Self, PipelineError> {
        let pattern = UrlPattern::parse(&config.url)?;

        let methods = config
            .methods
            .iter()
            .map(|method| {
                let method = method.trim();
                if method.is_empty() {
                    Err(PipelineError::Argument(
                        "method names must not be empty".to_string(),
                    ))
                } else {
                    Ok(method.to_ascii_uppercase())
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let authenticator = factory.create_authenticator(refs_or_default(
            "authenticator",
            &config.authenticators,
            defaults.map(|d| d.authenticators.as_slice()),
        )?)?;

        let authorizer_ref = config
            .authorizer
            .as_ref()
            .or_else(|| defaults.and_then(|d| d.authorizer.as_ref()))
            .ok_or_else(|| {
                PipelineError::Argument(
                    "no authorizer configured and no default available".to_string(),
                )
            })?;
        let authorizer = factory.create_authorizer(authorizer_ref)?;

        let hydrator = factory.create_hydrator(refs_or_default(
            "hydrator",
            &config.hydrators,
            defaults.map(|d| d.hydrators.as_slice()),
        )?)?;

        let mutator = factory.create_mutator(refs_or_default(
            "mutator",
            &config.mutators,
            defaults.map(|d| d.mutators.as_slice()),
        )?)?;

        let error_handler = factory.create_error_handler(refs_or_default(
            "error handler",
            &config.error_handlers,
            defaults.map(|d| d.error_handlers.as_slice()),
        )?)?;

        Ok(Self {
            id: config.id.clone(),
            source_id: source_id.to_string(),
            pattern,
            methods,
            authenticator,
            authorizer,
            hydrator,
            mutator,
            error_handler,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn pattern(&self) -> &UrlPattern {
        &self.pattern
    }

    pub fn matches_url(&self, url: &url::Url) -> bool {
        self.pattern.matches(url)
    }

    /// Set membership; a rule without methods accepts every method.
    pub fn matches_method(&self, method: &str) -> bool {
        self.methods.is_empty()
            || self
                .methods
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(method))
    }

    /// Run authenticate, authorize, hydrate and mutate.
    ///
    /// The first failing stage ends the run and its error goes to the error
    /// handler exactly once.
    ///
    /// Returns `Ok(Some(_))` on success and `Ok(None)` if the error handler
    /// suppressed the failure.
    ///
    /// # Errors
    ///
    /// Returns the error produced by the error handler.
    #[instrument(skip_all, fields(rule_id = %self.id, source_id = %self.source_id))]
    pub async fn execute(
        &self,
        ctx: &Context,
        request: &dyn RequestContext,
    ) -> Result<Option<SubjectContext>, PipelineError> {
        let start = Instant::now();
        let mut subject_ctx = SubjectContext::default();

        match self.run_stages(ctx, request, &mut subject_ctx).await {
            Ok(()) => {
                metrics::record_pipeline_execution("success", start.elapsed());
                Ok(Some(subject_ctx))
            }
            Err((stage, error)) => {
                tracing::info!(
                    target: "warden.rules.rule",
                    rule_id = %self.id,
                    stage,
                    error_kind = error.kind(),
                    error = %error,
                    "Pipeline stage failed"
                );
                let outcome = error.kind();

                match self.error_handler.handle_error(ctx, error).await {
                    Some(handled) => {
                        metrics::record_pipeline_execution(outcome, start.elapsed());
                        Err(handled)
                    }
                    None => {
                        metrics::record_pipeline_execution("suppressed", start.elapsed());
                        Ok(None)
                    }
                }
            }
        }
    }

    async fn run_stages(
        &self,
        ctx: &Context,
        request: &dyn RequestContext,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), (&'static str, PipelineError)> {
        self.authenticator
            .authenticate(ctx, request, subject_ctx)
            .await
            .map_err(|e| ("authenticate", e))?;
        self.authorizer
            .authorize(ctx, request, subject_ctx)
            .await
            .map_err(|e| ("authorize", e))?;
        self.hydrator
            .hydrate(ctx, subject_ctx)
            .await
            .map_err(|e| ("hydrate", e))?;
        self.mutator
            .mutate(ctx, subject_ctx)
            .await
            .map_err(|e| ("mutate", e))?;
        Ok(())
    }
}
