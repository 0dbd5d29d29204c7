//! Authenticator delegating credential checks to an identity endpoint.
//!
//! The extracted credential is sent as the request body; the endpoint's
//! response body describes the subject.

use crate::errors::PipelineError;
use crate::pipeline::endpoint::{Endpoint, EndpointConfig};
use crate::pipeline::extractors::{
    strategy_from_config, AuthDataExtractStrategy, AuthDataSourceConfig, CompositeExtractStrategy,
};
use crate::pipeline::subject::SubjectInfo;
use crate::pipeline::{
    decode_config, is_empty_config, Authenticator, Context, RequestContext, SubjectContext,
};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AuthenticationDataConfig {
    identity_info_endpoint: EndpointConfig,
    #[serde(default)]
    authentication_data_source: Vec<AuthDataSourceConfig>,
    #[serde(default)]
    session: SubjectInfo,
}

pub struct AuthenticationDataAuthenticator {
    endpoint: Endpoint,
    auth_data: Arc<dyn AuthDataExtractStrategy>,
    subject_info: SubjectInfo,
}

impl AuthenticationDataAuthenticator {
    /// Build the authenticator from its handler configuration.
    ///
    /// The endpoint defaults to `POST`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` for malformed configuration or an
    /// invalid endpoint.
    pub fn from_config(config: Option<&serde_yaml::Value>) -> Result<Self, PipelineError> {
        let config: AuthenticationDataConfig = decode_config(config)?;

        Ok(Self {
            endpoint: Endpoint::from_config_with_method(config.identity_info_endpoint, Method::POST)?,
            auth_data: strategy_from_config(
                config.authentication_data_source,
                CompositeExtractStrategy::bearer_token(),
            )?,
            subject_info: config.session,
        })
    }
}

#[async_trait]
impl Authenticator for AuthenticationDataAuthenticator {
    #[instrument(skip_all, fields(url = %self.endpoint.url()))]
    async fn authenticate(
        &self,
        ctx: &Context,
        request: &dyn RequestContext,
        subject_ctx: &mut SubjectContext,
    ) -> Result<(), PipelineError> {
        let auth_data = self.auth_data.get_auth_data(request)?;

        let body = self.endpoint.send_request(ctx, Some(auth_data)).await?;
        let subject = self.subject_info.get_subject(&body)?;

        tracing::debug!(target: "warden.pipeline.authentication_data", subject = %subject.id, "Subject resolved");
        subject_ctx.subject = Some(subject);
        Ok(())
    }

    fn with_config(
        self: Arc<Self>,
        config: &serde_yaml::Value,
    ) -> Result<Arc<dyn Authenticator>, PipelineError> {
        if is_empty_config(config) {
            return Ok(self);
        }

        Err(PipelineError::Argument(
            "reconfiguration of authentication_data authenticator is not allowed".to_string(),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::pipeline::testing::FakeRequest;
    use serde_json::json;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: &str) -> serde_yaml::Value {
        serde_yaml::from_str(&format!(
            r#"
identity_info_endpoint:
  url: {url}
authentication_data_source:
  - cookie: session
  - header: X-Session
session:
  subject_from: identity.id
  attributes_from: identity.traits
"#
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_authenticate_resolves_subject_from_identity_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions/whoami"))
            .and(body_string("session-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "identity": {"id": "user-1", "traits": {"email": "user@example.com"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let authenticator = AuthenticationDataAuthenticator::from_config(Some(&config(&format!(
            "{}/sessions/whoami",
            server.uri()
        ))))
        .unwrap();

        let mut subject_ctx = SubjectContext::default();
        authenticator
            .authenticate(
                &Context::default(),
                &FakeRequest::with_header("X-Session", "session-123"),
                &mut subject_ctx,
            )
            .await
            .unwrap();

        let subject = subject_ctx.subject.unwrap();
        assert_eq!(subject.id, "user-1");
        assert_eq!(
            subject.attributes.get("email"),
            Some(&json!("user@example.com"))
        );
    }

    #[tokio::test]
    async fn test_authenticate_rejected_session_is_transport() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let authenticator =
            AuthenticationDataAuthenticator::from_config(Some(&config(&server.uri()))).unwrap();

        let result = authenticator
            .authenticate(
                &Context::default(),
                &FakeRequest::with_header("X-Session", "expired"),
                &mut SubjectContext::default(),
            )
            .await;

        assert!(matches!(result, Err(PipelineError::Transport(_))));
    }

    #[tokio::test]
    async fn test_authenticate_without_credentials_skips_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let authenticator =
            AuthenticationDataAuthenticator::from_config(Some(&config(&server.uri()))).unwrap();

        let result = authenticator
            .authenticate(
                &Context::default(),
                &FakeRequest::default(),
                &mut SubjectContext::default(),
            )
            .await;

        assert!(matches!(result, Err(PipelineError::AuthDataMissing(_))));
    }

    #[test]
    fn test_with_config_refuses_reconfiguration() {
        let authenticator = Arc::new(
            AuthenticationDataAuthenticator::from_config(Some(&config("http://localhost/whoami")))
                .unwrap(),
        );
        let override_config: serde_yaml::Value = serde_yaml::from_str("session: {}").unwrap();

        assert!(matches!(
            authenticator.with_config(&override_config),
            Err(PipelineError::Argument(_))
        ));
    }
}
