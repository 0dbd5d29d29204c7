//! Error handler variants.
//!
//! - `default` passes the error through unchanged
//! - `public` replaces detailed errors with generic, client-safe ones of the
//!   same status class
//! - `suppress` swallows the error
//!
//! A rule's error handlers form an [`ErrorHandlerChain`].

use crate::errors::PipelineError;
use crate::pipeline::{reject_config, Context, ErrorHandler};
use async_trait::async_trait;
use std::sync::Arc;

/// Create an error handler prototype of the given type.
///
/// # Errors
///
/// Returns `PipelineError::Argument` for an unknown type or a non-empty
/// configuration.
pub fn create_error_handler(
    kind: &str,
    config: Option<&serde_yaml::Value>,
) -> Result<Arc<dyn ErrorHandler>, PipelineError> {
    let config = config.cloned().unwrap_or_default();
    let handler: Arc<dyn ErrorHandler> = match kind {
        "default" => Arc::new(DefaultErrorHandler),
        "public" => Arc::new(PublicErrorHandler),
        "suppress" => Arc::new(SuppressErrorHandler),
        other => {
            return Err(PipelineError::Argument(format!(
                "unsupported error handler type '{other}'"
            )))
        }
    };
    reject_config(&config, "error handler")?;
    Ok(handler)
}

pub struct DefaultErrorHandler;

#[async_trait]
impl ErrorHandler for DefaultErrorHandler {
    async fn handle_error(&self, _ctx: &Context, error: PipelineError) -> Option<PipelineError> {
        Some(error)
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn ErrorHandler>, PipelineError> {
        reject_config(config, "default error handler")?;
        Ok(self)
    }
}

/// Hides error details from clients.
///
/// Cancellation and deadline errors carry no details and pass unchanged.
pub struct PublicErrorHandler;

impl PublicErrorHandler {
    fn translate(error: PipelineError) -> PipelineError {
        match error.status_code() {
            401 => PipelineError::Unauthorized("authentication required".to_string()),
            403 => PipelineError::Forbidden("access denied".to_string()),
            _ => match error {
                PipelineError::Transport(_) => {
                    PipelineError::Transport("upstream service unavailable".to_string())
                }
                PipelineError::Cancelled | PipelineError::DeadlineExceeded => error,
                _ => PipelineError::Internal("internal error".to_string()),
            },
        }
    }
}

#[async_trait]
impl ErrorHandler for PublicErrorHandler {
    async fn handle_error(&self, _ctx: &Context, error: PipelineError) -> Option<PipelineError> {
        Some(Self::translate(error))
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn ErrorHandler>, PipelineError> {
        reject_config(config, "public error handler")?;
        Ok(self)
    }
}

pub struct SuppressErrorHandler;

#[async_trait]
impl ErrorHandler for SuppressErrorHandler {
    async fn handle_error(&self, _ctx: &Context, error: PipelineError) -> Option<PipelineError> {
        tracing::debug!(target: "warden.pipeline.error_handlers", error = %error, "Error suppressed");
        None
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn ErrorHandler>, PipelineError> {
        reject_config(config, "suppress error handler")?;
        Ok(self)
    }
}

/// Applies handlers in order, each to the previous handler's output.
///
/// A suppression ends the chain. An empty chain passes the error through.
pub struct ErrorHandlerChain {
    handlers: Vec<Arc<dyn ErrorHandler>>,
}

impl ErrorHandlerChain {
    pub fn new(handlers: Vec<Arc<dyn ErrorHandler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl ErrorHandler for ErrorHandlerChain {
    async fn handle_error(&self, ctx: &Context, error: PipelineError) -> Option<PipelineError> {
        let mut current = error;
        for handler in &self.handlers {
            current = handler.handle_error(ctx, current).await?;
        }
        Some(current)
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn ErrorHandler>, PipelineError> {
        reject_config(config, "error handler chain")?;
        Ok(self)
    }
}
