//! Authentication data extraction strategies.
//!
//! A strategy pulls a credential (usually a bearer token) out of the
//! request. Strategies are combined with [`CompositeExtractStrategy`], which
//! tries them in configured order and returns the first hit.

use crate::errors::PipelineError;
use crate::pipeline::RequestContext;
use serde::Deserialize;
use std::sync::Arc;

/// Capability of reading a credential from a request.
pub trait AuthDataExtractStrategy: Send + Sync {
    /// # Errors
    ///
    /// Returns `PipelineError::AuthDataMissing` if the source location is
    /// absent or empty.
    fn get_auth_data(&self, request: &dyn RequestContext) -> Result<String, PipelineError>;
}

/// Strip the prefix (if configured) and surrounding whitespace.
fn normalize(value: &str, prefix: Option<&str>) -> Option<String> {
    if value.is_empty() {
        return None;
    }

    let stripped = match prefix {
        Some(prefix) => value.strip_prefix(prefix).unwrap_or(value),
        None => value,
    };

    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reads a named request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderValueExtractStrategy {
    pub name: String,
    pub prefix: Option<String>,
}

impl AuthDataExtractStrategy for HeaderValueExtractStrategy {
    fn get_auth_data(&self, request: &dyn RequestContext) -> Result<String, PipelineError> {
        request
            .header(&self.name)
            .and_then(|value| normalize(value, self.prefix.as_deref()))
            .ok_or_else(|| {
                PipelineError::AuthDataMissing(format!("no '{}' header present", self.name))
            })
    }
}

/// Reads a named query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameterExtractStrategy {
    pub name: String,
    pub prefix: Option<String>,
}

impl AuthDataExtractStrategy for QueryParameterExtractStrategy {
    fn get_auth_data(&self, request: &dyn RequestContext) -> Result<String, PipelineError> {
        request
            .query_parameter(&self.name)
            .and_then(|value| normalize(value, self.prefix.as_deref()))
            .ok_or_else(|| {
                PipelineError::AuthDataMissing(format!(
                    "no '{}' query parameter present",
                    self.name
                ))
            })
    }
}

/// Reads a named form parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormParameterExtractStrategy {
    pub name: String,
    pub prefix: Option<String>,
}

impl AuthDataExtractStrategy for FormParameterExtractStrategy {
    fn get_auth_data(&self, request: &dyn RequestContext) -> Result<String, PipelineError> {
        request
            .form_parameter(&self.name)
            .and_then(|value| normalize(value, self.prefix.as_deref()))
            .ok_or_else(|| {
                PipelineError::AuthDataMissing(format!(
                    "no '{}' form parameter present",
                    self.name
                ))
            })
    }
}

/// Reads a named cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieValueExtractStrategy {
    pub name: String,
    pub prefix: Option<String>,
}

impl AuthDataExtractStrategy for CookieValueExtractStrategy {
    fn get_auth_data(&self, request: &dyn RequestContext) -> Result<String, PipelineError> {
        request
            .cookie(&self.name)
            .and_then(|value| normalize(value, self.prefix.as_deref()))
            .ok_or_else(|| {
                PipelineError::AuthDataMissing(format!("no '{}' cookie present", self.name))
            })
    }
}

/// Tries strategies in order; the first success wins.
#[derive(Clone, Default)]
pub struct CompositeExtractStrategy {
    strategies: Vec<Arc<dyn AuthDataExtractStrategy>>,
}

impl CompositeExtractStrategy {
    pub fn new(strategies: Vec<Arc<dyn AuthDataExtractStrategy>>) -> Self {
        Self { strategies }
    }

    /// `Authorization: Bearer` header, then `access_token` form parameter,
    /// then `access_token` query parameter.
    pub fn bearer_token() -> Self {
        Self::new(vec![
            Arc::new(HeaderValueExtractStrategy {
                name: "Authorization".to_string(),
                prefix: Some("Bearer".to_string()),
            }),
            Arc::new(FormParameterExtractStrategy {
                name: "access_token".to_string(),
                prefix: None,
            }),
            Arc::new(QueryParameterExtractStrategy {
                name: "access_token".to_string(),
                prefix: None,
            }),
        ])
    }
}

impl AuthDataExtractStrategy for CompositeExtractStrategy {
    fn get_auth_data(&self, request: &dyn RequestContext) -> Result<String, PipelineError> {
        let mut failures = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            match strategy.get_auth_data(request) {
                Ok(value) => return Ok(value),
                Err(PipelineError::AuthDataMissing(reason)) => failures.push(reason),
                Err(other) => failures.push(other.to_string()),
            }
        }

        if failures.is_empty() {
            return Err(PipelineError::AuthDataMissing(
                "no extraction strategy configured".to_string(),
            ));
        }

        Err(PipelineError::AuthDataMissing(failures.join("; ")))
    }
}

/// One entry of an `authentication data source` configuration list.
///
/// Exactly one location key must be set:
///
/// ```yaml
/// - header: Authorization
///   strip_prefix: Bearer
/// - query_parameter: access_token
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthDataSourceConfig {
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub query_parameter: Option<String>,
    #[serde(default)]
    pub form_parameter: Option<String>,
    #[serde(default)]
    pub cookie: Option<String>,
    #[serde(default)]
    pub strip_prefix: Option<String>,
}

impl AuthDataSourceConfig {
    fn into_strategy(self) -> Result<Arc<dyn AuthDataExtractStrategy>, PipelineError> {
        let prefix = self.strip_prefix;
        match (
            self.header,
            self.query_parameter,
            self.form_parameter,
            self.cookie,
        ) {
            (Some(name), None, None, None) => {
                Ok(Arc::new(HeaderValueExtractStrategy { name, prefix }))
            }
            (None, Some(name), None, None) => {
                Ok(Arc::new(QueryParameterExtractStrategy { name, prefix }))
            }
            (None, None, Some(name), None) => {
                Ok(Arc::new(FormParameterExtractStrategy { name, prefix }))
            }
            (None, None, None, Some(name)) => {
                Ok(Arc::new(CookieValueExtractStrategy { name, prefix }))
            }
            _ => Err(PipelineError::Argument(
                "authentication data source entries must name exactly one of header, \
                 query_parameter, form_parameter or cookie"
                    .to_string(),
            )),
        }
    }
}

/// Build a strategy from configuration, falling back to `default` when no
/// sources are configured.
///
/// # Errors
///
/// Returns `PipelineError::Argument` for entries that do not name exactly one
/// location.
pub fn strategy_from_config(
    sources: Vec<AuthDataSourceConfig>,
    default: CompositeExtractStrategy,
) -> Result<Arc<dyn AuthDataExtractStrategy>, PipelineError> {
    if sources.is_empty() {
        return Ok(Arc::new(default));
    }

    let strategies = sources
        .into_iter()
        .map(AuthDataSourceConfig::into_strategy)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Arc::new(CompositeExtractStrategy::new(strategies)))
}
