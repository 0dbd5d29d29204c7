//! Warden error types.
//!
//! `PipelineError` is the vocabulary shared by all pipeline stages, both at
//! construction time (configuration problems) and at request time. The
//! transport layer maps it to a response via [`PipelineError::status_code`].
//! Repository lifecycle and rule-set loading have their own error types.

use thiserror::Error;

/// Error raised by pipeline stages and their construction.
///
/// Maps to HTTP status codes:
/// - Argument, SubjectDecoding, Internal: 500 Internal Server Error
/// - AuthDataMissing, UnsupportedFormat, KeyResolution, AlgorithmNotAllowed,
///   Verification, AssertionUnsatisfied, Unauthorized: 401 Unauthorized
/// - Forbidden: 403 Forbidden
/// - Transport, Cancelled: 503 Service Unavailable
/// - DeadlineExceeded: 504 Gateway Timeout
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("No authentication data: {0}")]
    AuthDataMissing(String),

    #[error("Unsupported token format")]
    UnsupportedFormat,

    #[error("Key resolution failed: {0}")]
    KeyResolution(String),

    #[error("Algorithm not allowed: {0}")]
    AlgorithmNotAllowed(String),

    #[error("Token verification failed: {0}")]
    Verification(String),

    #[error("Assertions not satisfied: {0}")]
    AssertionUnsatisfied(String),

    #[error("Subject decoding failed: {0}")]
    SubjectDecoding(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns the HTTP status code the transport layer should respond with.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::Argument(_)
            | PipelineError::SubjectDecoding(_)
            | PipelineError::Internal(_) => 500,
            PipelineError::AuthDataMissing(_)
            | PipelineError::UnsupportedFormat
            | PipelineError::KeyResolution(_)
            | PipelineError::AlgorithmNotAllowed(_)
            | PipelineError::Verification(_)
            | PipelineError::AssertionUnsatisfied(_)
            | PipelineError::Unauthorized(_) => 401,
            PipelineError::Forbidden(_) => 403,
            PipelineError::Transport(_) | PipelineError::Cancelled => 503,
            PipelineError::DeadlineExceeded => 504,
        }
    }

    /// Whether the calling layer may retry the request.
    ///
    /// Stages never retry internally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Transport(_) | PipelineError::DeadlineExceeded
        )
    }

    /// Short, bounded label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Argument(_) => "argument",
            PipelineError::AuthDataMissing(_) => "auth_data_missing",
            PipelineError::UnsupportedFormat => "unsupported_format",
            PipelineError::KeyResolution(_) => "key_resolution",
            PipelineError::AlgorithmNotAllowed(_) => "algorithm_not_allowed",
            PipelineError::Verification(_) => "verification",
            PipelineError::AssertionUnsatisfied(_) => "assertion_unsatisfied",
            PipelineError::SubjectDecoding(_) => "subject_decoding",
            PipelineError::Transport(_) => "transport",
            PipelineError::Unauthorized(_) => "unauthorized",
            PipelineError::Forbidden(_) => "forbidden",
            PipelineError::Cancelled => "cancelled",
            PipelineError::DeadlineExceeded => "deadline_exceeded",
            PipelineError::Internal(_) => "internal",
        }
    }
}

/// Rule repository errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// No rule matches the request. This is an expected outcome.
    #[error("No rule found")]
    NoRuleFound,

    #[error("Rule set watcher already started")]
    AlreadyStarted,

    #[error("Rule repository has been stopped")]
    Stopped,

    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}

/// Errors raised while turning a rule-set definition into rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleSetError {
    #[error("Failed to parse rule set: {0}")]
    Parse(String),

    #[error("Failed to create rule '{rule_id}': {source}")]
    Construction {
        rule_id: String,
        #[source]
        source: PipelineError,
    },
}

/// Errors raised by rule-set providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to read rule set '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Rule set event queue is closed")]
    QueueClosed,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_assertion_unsatisfied() {
        let error = PipelineError::AssertionUnsatisfied("token is expired".to_string());
        assert_eq!(
            format!("{}", error),
            "Assertions not satisfied: token is expired"
        );
    }

    #[test]
    fn test_display_unsupported_format() {
        assert_eq!(
            format!("{}", PipelineError::UnsupportedFormat),
            "Unsupported token format"
        );
    }

    #[test]
    fn test_token_errors_map_to_unauthorized() {
        for error in [
            PipelineError::AuthDataMissing("x".to_string()),
            PipelineError::UnsupportedFormat,
            PipelineError::KeyResolution("x".to_string()),
            PipelineError::AlgorithmNotAllowed("HS256".to_string()),
            PipelineError::Verification("x".to_string()),
            PipelineError::AssertionUnsatisfied("x".to_string()),
        ] {
            assert_eq!(error.status_code(), 401, "{error:?}");
        }
    }

    #[test]
    fn test_status_codes_for_remaining_kinds() {
        assert_eq!(PipelineError::Forbidden("x".to_string()).status_code(), 403);
        assert_eq!(PipelineError::Transport("x".to_string()).status_code(), 503);
        assert_eq!(PipelineError::DeadlineExceeded.status_code(), 504);
        assert_eq!(PipelineError::Argument("x".to_string()).status_code(), 500);
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(PipelineError::Transport("down".to_string()).is_retryable());
        assert!(PipelineError::DeadlineExceeded.is_retryable());
        assert!(!PipelineError::Verification("bad sig".to_string()).is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
    }

    #[test]
    fn test_construction_error_display_includes_rule_id() {
        let error = RuleSetError::Construction {
            rule_id: "rule-2".to_string(),
            source: PipelineError::Argument("no authenticator with id 'missing'".to_string()),
        };
        assert_eq!(
            format!("{}", error),
            "Failed to create rule 'rule-2': Invalid argument: no authenticator with id 'missing'"
        );
    }

    #[test]
    fn test_display_no_rule_found() {
        assert_eq!(format!("{}", RepositoryError::NoRuleFound), "No rule found");
    }
}
