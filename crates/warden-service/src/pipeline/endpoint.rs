//! Remote HTTP endpoints used by pipeline stages.
//!
//! Key sets and identity information are fetched through an [`Endpoint`].
//! Every call runs under the request's [`Context`], so cancellation and
//! deadlines surface as their own error kinds instead of hanging.
//!
//! # Security
//!
//! - Header values may carry credentials and are redacted in Debug output
//! - Timeouts prevent hanging connections
//! - Remote failures are logged server-side and reported as `Transport`

use crate::errors::PipelineError;
use crate::pipeline::Context;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, Method};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::instrument;

/// Default request timeout in seconds.
pub const DEFAULT_ENDPOINT_TIMEOUT_SECONDS: u64 = 10;

/// Maximum configurable request timeout in seconds.
pub const MAX_ENDPOINT_TIMEOUT_SECONDS: u64 = 60;

/// Default connect timeout in seconds.
const ENDPOINT_CONNECT_TIMEOUT_SECONDS: u64 = 5;

/// Endpoint configuration block.
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Target URL.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default)]
    pub method: Option<String>,

    /// Additional request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// A validated endpoint with its own HTTP client.
#[derive(Clone)]
pub struct Endpoint {
    url: url::Url,
    method: Method,
    headers: HeaderMap,
    client: Client,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("headers", &"[REDACTED]")
            .finish()
    }
}

impl Endpoint {
    /// Validate the configuration and build the endpoint.
    ///
    /// Adds an `Accept: application/json` header when none is configured.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` for an invalid URL, method, header
    /// or timeout, or if the HTTP client cannot be built.
    pub fn from_config(config: EndpointConfig) -> Result<Self, PipelineError> {
        Self::from_config_with_method(config, Method::GET)
    }

    /// Like [`Endpoint::from_config`] with a different default method.
    ///
    /// # Errors
    ///
    /// See [`Endpoint::from_config`].
    pub fn from_config_with_method(
        config: EndpointConfig,
        default_method: Method,
    ) -> Result<Self, PipelineError> {
        if config.url.is_empty() {
            return Err(PipelineError::Argument(
                "endpoint url must not be empty".to_string(),
            ));
        }

        let url = url::Url::parse(&config.url).map_err(|e| {
            PipelineError::Argument(format!("invalid endpoint url '{}': {e}", config.url))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PipelineError::Argument(format!(
                "unsupported endpoint url scheme '{}'",
                url.scheme()
            )));
        }

        let method = match config.method.as_deref() {
            None | Some("") => default_method,
            Some(method) => Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|e| {
                    PipelineError::Argument(format!("invalid endpoint method '{method}': {e}"))
                })?,
        };

        let timeout_secs = config
            .timeout_seconds
            .unwrap_or(DEFAULT_ENDPOINT_TIMEOUT_SECONDS);
        if timeout_secs == 0 || timeout_secs > MAX_ENDPOINT_TIMEOUT_SECONDS {
            return Err(PipelineError::Argument(format!(
                "endpoint timeout_seconds must be between 1 and {MAX_ENDPOINT_TIMEOUT_SECONDS}, got {timeout_secs}"
            )));
        }

        let mut headers = HeaderMap::with_capacity(config.headers.len() + 1);
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                PipelineError::Argument(format!("invalid endpoint header name '{name}': {e}"))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                PipelineError::Argument(format!("invalid value for endpoint header '{name}': {e}"))
            })?;
            headers.append(header_name, header_value);
        }
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(ENDPOINT_CONNECT_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| {
                tracing::error!(target: "warden.pipeline.endpoint", error = %e, "Failed to build HTTP client");
                PipelineError::Argument(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            url,
            method,
            headers,
            client,
        })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Send a request and return the response body.
    ///
    /// # Errors
    ///
    /// - `PipelineError::Transport` on connection failures, client timeouts
    ///   and non-2xx responses
    /// - `PipelineError::Cancelled` / `PipelineError::DeadlineExceeded` if the
    ///   context ends first
    #[instrument(skip_all, fields(url = %self.url, method = %self.method))]
    pub async fn send_request(
        &self,
        ctx: &Context,
        body: Option<String>,
    ) -> Result<Bytes, PipelineError> {
        let mut request = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        if let Some(body) = body {
            request = request.body(body);
        }

        ctx.run(async move {
            let response = request.send().await.map_err(|e| {
                tracing::warn!(target: "warden.pipeline.endpoint", error = %e, "Endpoint request failed");
                PipelineError::Transport(format!("request to endpoint failed: {e}"))
            })?;

            let status = response.status();
            if !status.is_success() {
                tracing::warn!(
                    target: "warden.pipeline.endpoint",
                    status = %status,
                    "Endpoint returned error"
                );
                return Err(PipelineError::Transport(format!(
                    "endpoint responded with status {status}"
                )));
            }

            response.bytes().await.map_err(|e| {
                tracing::warn!(target: "warden.pipeline.endpoint", error = %e, "Failed to read endpoint response");
                PipelineError::Transport(format!("failed to read endpoint response: {e}"))
            })
        })
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> EndpointConfig {
        EndpointConfig {
            url: url.to_string(),
            ..EndpointConfig::default()
        }
    }

    #[test]
    fn test_from_config_defaults() {
        let endpoint = Endpoint::from_config(config("http://localhost:8080/jwks")).unwrap();

        assert_eq!(endpoint.method(), &Method::GET);
        assert_eq!(endpoint.url(), "http://localhost:8080/jwks");
        assert_eq!(
            endpoint.headers.get(ACCEPT).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }

    #[test]
    fn test_from_config_keeps_explicit_accept_header() {
        let mut cfg = config("http://localhost:8080/jwks");
        cfg.headers
            .insert("accept".to_string(), "application/jwk-set+json".to_string());

        let endpoint = Endpoint::from_config(cfg).unwrap();
        assert_eq!(endpoint.headers.len(), 1);
    }

    #[test]
    fn test_from_config_rejects_invalid_url() {
        assert!(matches!(
            Endpoint::from_config(config("")),
            Err(PipelineError::Argument(_))
        ));
        assert!(matches!(
            Endpoint::from_config(config("not a url")),
            Err(PipelineError::Argument(_))
        ));
        assert!(matches!(
            Endpoint::from_config(config("ftp://example.com/keys")),
            Err(PipelineError::Argument(_))
        ));
    }

    #[test]
    fn test_from_config_rejects_invalid_method_and_timeout() {
        let mut cfg = config("http://localhost/keys");
        cfg.method = Some("NOT A METHOD".to_string());
        assert!(matches!(
            Endpoint::from_config(cfg),
            Err(PipelineError::Argument(_))
        ));

        let mut cfg = config("http://localhost/keys");
        cfg.timeout_seconds = Some(0);
        assert!(matches!(
            Endpoint::from_config(cfg),
            Err(PipelineError::Argument(_))
        ));
    }

    #[test]
    fn test_from_config_rejects_invalid_headers() {
        let mut cfg = config("http://localhost/keys");
        cfg.headers
            .insert("X Api Key".to_string(), "secret".to_string());
        assert!(matches!(
            Endpoint::from_config(cfg),
            Err(PipelineError::Argument(_))
        ));

        let mut cfg = config("http://localhost/keys");
        cfg.headers
            .insert("X-Api-Key".to_string(), "line\nbreak".to_string());
        assert!(matches!(
            Endpoint::from_config(cfg),
            Err(PipelineError::Argument(_))
        ));
    }

    #[test]
    fn test_debug_redacts_headers() {
        let mut cfg = config("http://localhost/keys");
        cfg.headers
            .insert("Authorization".to_string(), "Basic c2VjcmV0".to_string());

        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("c2VjcmV0"));

        let endpoint = Endpoint::from_config(cfg).unwrap();
        let debug_str = format!("{:?}", endpoint);
        assert!(!debug_str.contains("c2VjcmV0"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_send_request_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/userinfo"))
            .and(header("Accept", "application/json"))
            .and(body_string("token-value"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"sub":"alice"}"#))
            .mount(&server)
            .await;

        let mut cfg = config(&format!("{}/userinfo", server.uri()));
        cfg.method = Some("post".to_string());
        let endpoint = Endpoint::from_config(cfg).unwrap();

        let body = endpoint
            .send_request(&Context::default(), Some("token-value".to_string()))
            .await
            .unwrap();
        assert_eq!(body.as_ref(), br#"{"sub":"alice"}"#);
    }

    #[tokio::test]
    async fn test_send_request_maps_non_success_to_transport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let endpoint = Endpoint::from_config(config(&format!("{}/jwks", server.uri()))).unwrap();
        let result = endpoint.send_request(&Context::default(), None).await;

        assert!(matches!(result, Err(PipelineError::Transport(_))));
    }

    #[tokio::test]
    async fn test_send_request_connection_refused_is_transport() {
        let endpoint = Endpoint::from_config(config("http://127.0.0.1:1/jwks")).unwrap();
        let result = endpoint.send_request(&Context::default(), None).await;

        assert!(matches!(result, Err(PipelineError::Transport(_))));
    }

    #[tokio::test]
    async fn test_send_request_respects_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let endpoint = Endpoint::from_config(config(&format!("{}/jwks", server.uri()))).unwrap();
        let ctx = Context::default().with_timeout(Duration::from_millis(50));
        let result = endpoint.send_request(&ctx, None).await;

        assert_eq!(result, Err(PipelineError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_send_request_respects_cancellation() {
        let endpoint = Endpoint::from_config(config("http://127.0.0.1:1/jwks")).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let result = endpoint.send_request(&Context::new(token), None).await;
        assert_eq!(result, Err(PipelineError::Cancelled));
    }
}
