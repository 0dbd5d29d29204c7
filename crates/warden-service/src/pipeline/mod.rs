//! Pipeline stage abstractions.
//!
//! A rule runs a fixed sequence of stages over a per-request
//! [`SubjectContext`]: authenticator, authorizer, hydrator, mutator, and an
//! error handler that receives the first failure. Every stage is an
//! immutable, shareable object; per-request state lives only in the
//! `SubjectContext` and the [`Context`] passed to each call.
//!
//! Stages may be specialized per rule through `with_config`, which returns a
//! new, independent instance and never mutates the prototype.

pub mod authenticators;
pub mod authorizers;
pub mod endpoint;
pub mod error_handlers;
pub mod extractors;
pub mod factory;
pub mod hydrators;
pub mod mutators;
pub mod subject;

#[cfg(test)]
pub(crate) mod testing;

use crate::errors::PipelineError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use subject::Subject;

/// Cancellation-bearing context of a single pipeline execution.
///
/// Stages performing I/O run it through [`Context::run`] so that a cancelled
/// request or an elapsed deadline fails fast with a distinct error kind.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancellation: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Create a context bound to the given cancellation token.
    pub fn new(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            deadline: None,
        }
    }

    /// Limit the remaining execution time of this context.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// The token cancelling this execution.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Run an I/O future under this context's cancellation and deadline.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Cancelled` if the token is or becomes
    /// cancelled, `PipelineError::DeadlineExceeded` if the deadline elapses
    /// first, otherwise the future's own result.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        if self.cancellation.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(PipelineError::Cancelled),
            _ = deadline => Err(PipelineError::DeadlineExceeded),
            result = fut => result,
        }
    }
}

/// Read-only view of the inbound request, provided by the transport layer.
pub trait RequestContext: Send + Sync {
    /// Header value; lookups are case-insensitive.
    fn header(&self, name: &str) -> Option<&str>;

    fn cookie(&self, name: &str) -> Option<&str>;

    fn query_parameter(&self, name: &str) -> Option<&str>;

    fn form_parameter(&self, name: &str) -> Option<&str>;

    fn body(&self) -> &[u8];
}

/// Per-request state accumulated by the pipeline.
///
/// Created fresh for every rule execution and owned by that execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectContext {
    /// The authenticated subject, if any stage established one.
    pub subject: Option<Subject>,

    /// Headers to be forwarded upstream, populated by mutators.
    pub headers: BTreeMap<String, String>,
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(
        &self,
        ctx: &Context,
        request: &dyn RequestContext,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError>;

    /// Derive a rule-specific instance from this prototype.
    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authenticator>, PipelineError>;
}

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        ctx: &Context,
        request: &dyn RequestContext,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError>;

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authorizer>, PipelineError>;
}

#[async_trait]
pub trait Hydrator: Send + Sync {
    async fn hydrate(
        &self,
        ctx: &Context,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError>;

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Hydrator>, PipelineError>;
}

#[async_trait]
pub trait Mutator: Send + Sync {
    async fn mutate(
        &self,
        ctx: &Context,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError>;

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Mutator>, PipelineError>;
}

#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Translate a pipeline failure.
    ///
    /// Returns the error the caller should observe, or `None` if the handler
    /// fully dealt with the failure and it must be suppressed.
    async fn handle_error(&self, ctx: &Context, error: PipelineError) -> Option<PipelineError>;

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn ErrorHandler>, PipelineError>;
}

/// Decode an optional handler configuration block strictly.
///
/// A missing or `null` block yields the type's default.
pub(crate) fn decode_config<T>(config: Option<&serde_yaml::Value>) -> Result<T, PipelineError>
where
    T: DeserializeOwned + Default,
{
    match config {
        None | Some(serde_yaml::Value::Null) => Ok(T::default()),
        Some(value) => serde_yaml::from_value(value.clone())
            .map_err(|e| PipelineError::Argument(format!("failed to decode configuration: {e}"))),
    }
}

/// Fail unless the configuration block is empty, for stages without options.
pub(crate) fn reject_config(config: &serde_yaml::Value, stage: &str) -> Result<(), PipelineError> {
    if is_empty_config(config) {
        Ok(())
    } else {
        Err(PipelineError::Argument(format!(
            "{stage} does not support configuration"
        )))
    }
}

/// Whether a rule-level configuration block carries anything at all.
pub(crate) fn is_empty_config(config: &serde_yaml::Value) -> bool {
    match config {
        serde_yaml::Value::Null => true,
        serde_yaml::Value::Mapping(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Sample {
        #[serde(default)]
        name: String,
    }

    #[tokio::test]
    async fn test_run_returns_future_result() {
        let ctx = Context::default();
        let result = ctx.run(async { Ok::<_, PipelineError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_run_fails_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = Context::new(token);

        let result = ctx.run(async { Ok::<_, PipelineError>(1) }).await;
        assert_eq!(result, Err(PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_fails_when_cancelled_while_waiting() {
        let token = CancellationToken::new();
        let ctx = Context::new(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token.cancel();
        });

        let result = ctx
            .run(async {
                std::future::pending::<()>().await;
                Ok::<_, PipelineError>(())
            })
            .await;

        canceller.await.unwrap();
        assert_eq!(result, Err(PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn test_run_fails_when_deadline_elapses() {
        let ctx = Context::default().with_timeout(Duration::from_millis(10));

        let result = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, PipelineError>(())
            })
            .await;

        assert_eq!(result, Err(PipelineError::DeadlineExceeded));
    }

    #[test]
    fn test_decode_config_defaults_on_missing_block() {
        let decoded: Sample = decode_config(None).unwrap();
        assert_eq!(decoded, Sample::default());

        let decoded: Sample = decode_config(Some(&serde_yaml::Value::Null)).unwrap();
        assert_eq!(decoded, Sample::default());
    }

    #[test]
    fn test_decode_config_rejects_unknown_fields() {
        let value: serde_yaml::Value = serde_yaml::from_str("unknown: 1").unwrap();
        let result: Result<Sample, _> = decode_config(Some(&value));
        assert!(matches!(result, Err(PipelineError::Argument(_))));
    }

    #[test]
    fn test_reject_config() {
        assert!(reject_config(&serde_yaml::Value::Null, "allow authorizer").is_ok());
        assert!(matches!(
            reject_config(&serde_yaml::from_str("a: b").unwrap(), "allow authorizer"),
            Err(PipelineError::Argument(msg)) if msg.contains("allow authorizer")
        ));
    }

    #[test]
    fn test_is_empty_config() {
        assert!(is_empty_config(&serde_yaml::Value::Null));
        assert!(is_empty_config(&serde_yaml::from_str("{}").unwrap()));
        assert!(!is_empty_config(&serde_yaml::from_str("a: b").unwrap()));
    }
}
