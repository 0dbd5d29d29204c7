//! Mock pipeline stages and handler factory.
//!
//! The mocks count their invocations so tests can assert which stages a rule
//! ran. One [`MockStage`] can serve as authenticator, authorizer, hydrator or
//! mutator.
//!
//! # Example
//!
//! ```rust,ignore
//! let factory = MockHandlerFactory::new()
//!     .with_authenticator(MockStage::failing(PipelineError::Unauthorized("no".into())));
//! let rule = Rule::new(&config, "test", &factory, None)?;
//!
//! rule.execute(&Context::default(), &TestRequest::new()).await;
//! assert_eq!(factory.authorizer().call_count(), 0);
//! ```

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use warden_service::errors::PipelineError;
use warden_service::pipeline::factory::{HandlerFactory, HandlerRef};
use warden_service::pipeline::{
    Authenticator, Authorizer, Context, ErrorHandler, Hydrator, Mutator, RequestContext, Subject,
    SubjectContext,
};

/// Mock stage that succeeds or fails with a fixed error.
pub struct MockStage {
    call_count: AtomicUsize,
    failure: Option<PipelineError>,
    subject_id: Option<String>,
}

impl MockStage {
    /// Create a mock that always succeeds.
    pub fn succeeding() -> Self {
        Self {
            call_count: AtomicUsize::new(0),
            failure: None,
            subject_id: None,
        }
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(error: PipelineError) -> Self {
        Self {
            failure: Some(error),
            ..Self::succeeding()
        }
    }

    /// Create a mock that succeeds and, used as authenticator, sets the subject.
    pub fn authenticating(subject_id: &str) -> Self {
        Self {
            subject_id: Some(subject_id.to_string()),
            ..Self::succeeding()
        }
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    fn record(&self) -> Result<(), PipelineError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Authenticator for MockStage {
    async fn authenticate(
        &self,
        _ctx: &Context,
        _request: &dyn RequestContext,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        self.record()?;
        if let Some(id) = &self.subject_id {
            subject_ctx.subject = Some(Subject::new(id.clone()));
        }
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        _config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authenticator>, PipelineError> {
        Ok(self)
    }
}

#[async_trait]
impl Authorizer for MockStage {
    async fn authorize(
        &self,
        _ctx: &Context,
        _request: &dyn RequestContext,
        _subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        self.record()
    }

    fn with_config(
        self: Arc<Self>,
        _config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authorizer>, PipelineError> {
        Ok(self)
    }
}

#[async_trait]
impl Hydrator for MockStage {
    async fn hydrate(
        &self,
        _ctx: &Context,
        _subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        self.record()
    }

    fn with_config(
        self: Arc<Self>,
        _config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Hydrator>, PipelineError> {
        Ok(self)
    }
}

#[async_trait]
impl Mutator for MockStage {
    async fn mutate(
        &self,
        _ctx: &Context,
        _subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        self.record()
    }

    fn with_config(
        self: Arc<Self>,
        _config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Mutator>, PipelineError> {
        Ok(self)
    }
}

/// Mock error handler recording the errors it receives.
pub struct MockErrorHandler {
    call_count: AtomicUsize,
    received: Mutex<Vec<PipelineError>>,
    suppress: bool,
}

impl MockErrorHandler {
    /// Create a mock that passes errors through unchanged.
    pub fn passing() -> Self {
        Self {
            call_count: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
            suppress: false,
        }
    }

    /// Create a mock that suppresses every error.
    pub fn suppressing() -> Self {
        Self {
            suppress: true,
            ..Self::passing()
        }
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Errors received so far, in order.
    pub fn received(&self) -> Vec<PipelineError> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ErrorHandler for MockErrorHandler {
    async fn handle_error(&self, _ctx: &Context, error: PipelineError) -> Option<PipelineError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut received) = self.received.lock() {
            received.push(error.clone());
        }

        if self.suppress {
            None
        } else {
            Some(error)
        }
    }

    fn with_config(
        self: Arc<Self>,
        _config: &serde_yaml::Value,
    ) -> Result<Arc<dyn ErrorHandler>, PipelineError> {
        Ok(self)
    }
}

/// Handler factory handing out the same mock stages to every rule.
///
/// References to the id configured via [`MockHandlerFactory::failing_on`]
/// fail construction with `PipelineError::Argument`.
pub struct MockHandlerFactory {
    authenticator: Arc<MockStage>,
    authorizer: Arc<MockStage>,
    hydrator: Arc<MockStage>,
    mutator: Arc<MockStage>,
    error_handler: Arc<MockErrorHandler>,
    failing_id: Option<String>,
}

impl MockHandlerFactory {
    /// Create a factory whose stages all succeed.
    pub fn new() -> Self {
        Self {
            authenticator: Arc::new(MockStage::authenticating("mock-subject")),
            authorizer: Arc::new(MockStage::succeeding()),
            hydrator: Arc::new(MockStage::succeeding()),
            mutator: Arc::new(MockStage::succeeding()),
            error_handler: Arc::new(MockErrorHandler::passing()),
            failing_id: None,
        }
    }

    pub fn with_authenticator(mut self, stage: MockStage) -> Self {
        self.authenticator = Arc::new(stage);
        self
    }

    pub fn with_authorizer(mut self, stage: MockStage) -> Self {
        self.authorizer = Arc::new(stage);
        self
    }

    pub fn with_hydrator(mut self, stage: MockStage) -> Self {
        self.hydrator = Arc::new(stage);
        self
    }

    pub fn with_mutator(mut self, stage: MockStage) -> Self {
        self.mutator = Arc::new(stage);
        self
    }

    pub fn with_error_handler(mut self, handler: MockErrorHandler) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Fail construction of any stage referencing `id`.
    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing_id = Some(id.to_string());
        self
    }

    pub fn authenticator(&self) -> &MockStage {
        &self.authenticator
    }

    pub fn authorizer(&self) -> &MockStage {
        &self.authorizer
    }

    pub fn hydrator(&self) -> &MockStage {
        &self.hydrator
    }

    pub fn mutator(&self) -> &MockStage {
        &self.mutator
    }

    pub fn error_handler(&self) -> &MockErrorHandler {
        &self.error_handler
    }

    fn check(&self, refs: &[HandlerRef]) -> Result<(), PipelineError> {
        if refs.is_empty() {
            return Err(PipelineError::Argument("no handler configured".to_string()));
        }
        match &self.failing_id {
            Some(id) if refs.iter().any(|handler| &handler.id == id) => Err(
                PipelineError::Argument(format!("mock construction failure for '{}'", id)),
            ),
            _ => Ok(()),
        }
    }
}

impl Default for MockHandlerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerFactory for MockHandlerFactory {
    fn create_authenticator(
        &self,
        refs: &[HandlerRef],
    ) -> Result<Arc<dyn Authenticator>, PipelineError> {
        self.check(refs)?;
        Ok(self.authenticator.clone())
    }

    fn create_authorizer(
        &self,
        handler: &HandlerRef,
    ) -> Result<Arc<dyn Authorizer>, PipelineError> {
        self.check(std::slice::from_ref(handler))?;
        Ok(self.authorizer.clone())
    }

    fn create_hydrator(&self, refs: &[HandlerRef]) -> Result<Arc<dyn Hydrator>, PipelineError> {
        self.check(refs)?;
        Ok(self.hydrator.clone())
    }

    fn create_mutator(&self, refs: &[HandlerRef]) -> Result<Arc<dyn Mutator>, PipelineError> {
        self.check(refs)?;
        Ok(self.mutator.clone())
    }

    fn create_error_handler(
        &self,
        refs: &[HandlerRef],
    ) -> Result<Arc<dyn ErrorHandler>, PipelineError> {
        self.check(refs)?;
        Ok(self.error_handler.clone())
    }
}
