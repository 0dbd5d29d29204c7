//! Rule pipeline integration tests.
//!
//! Verifies stage ordering and error handling with recording mock stages,
//! and cancellation of remote calls with a delayed identity endpoint.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::json;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use warden_service::errors::PipelineError;
use warden_service::pipeline::factory::{DefaultRuleConfig, HandlerRef};
use warden_service::pipeline::factory::{PipelineConfig, PrototypeHandlerFactory};
use warden_service::pipeline::Context;
use warden_service::rules::config::parse_rule_set;
use warden_service::rules::Rule;
use warden_test_utils::{MockErrorHandler, MockHandlerFactory, MockStage, TestRequest};
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn build_rule(factory: &MockHandlerFactory) -> Rule {
    let defaults = DefaultRuleConfig {
        authenticators: vec![HandlerRef::new("mock")],
        authorizer: Some(HandlerRef::new("mock")),
        hydrators: vec![HandlerRef::new("mock")],
        mutators: vec![HandlerRef::new("mock")],
        error_handlers: vec![HandlerRef::new("mock")],
    };
    let config = parse_rule_set(b"- id: r1\n  url: /**")
        .unwrap()
        .pop()
        .unwrap();
    Rule::new(&config, "test", factory, Some(&defaults)).unwrap()
}

fn stage_calls(factory: &MockHandlerFactory) -> [usize; 5] {
    [
        factory.authenticator().call_count(),
        factory.authorizer().call_count(),
        factory.hydrator().call_count(),
        factory.mutator().call_count(),
        factory.error_handler().call_count(),
    ]
}

#[tokio::test]
async fn test_successful_execution_runs_every_stage_once() {
    let factory = MockHandlerFactory::new();
    let rule = build_rule(&factory);

    let subject_ctx = rule
        .execute(&Context::default(), &TestRequest::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(subject_ctx.subject.unwrap().id, "mock-subject");
    assert_eq!(stage_calls(&factory), [1, 1, 1, 1, 0]);
}

#[tokio::test]
async fn test_authentication_failure_skips_remaining_stages() {
    let denied = PipelineError::Unauthorized("bad credentials".to_string());
    let factory =
        MockHandlerFactory::new().with_authenticator(MockStage::failing(denied.clone()));
    let rule = build_rule(&factory);

    let result = rule
        .execute(&Context::default(), &TestRequest::new())
        .await;

    assert_eq!(result, Err(denied.clone()));
    assert_eq!(stage_calls(&factory), [1, 0, 0, 0, 1]);
    assert_eq!(factory.error_handler().received(), vec![denied]);
}

#[tokio::test]
async fn test_authorization_failure_skips_hydration_and_mutation() {
    let factory = MockHandlerFactory::new().with_authorizer(MockStage::failing(
        PipelineError::Forbidden("not permitted".to_string()),
    ));
    let rule = build_rule(&factory);

    let result = rule
        .execute(&Context::default(), &TestRequest::new())
        .await;

    assert!(matches!(result, Err(PipelineError::Forbidden(_))));
    assert_eq!(stage_calls(&factory), [1, 1, 0, 0, 1]);
}

#[tokio::test]
async fn test_mutation_failure_reaches_error_handler_once() {
    let factory = MockHandlerFactory::new().with_mutator(MockStage::failing(
        PipelineError::Internal("header rendering failed".to_string()),
    ));
    let rule = build_rule(&factory);

    let result = rule
        .execute(&Context::default(), &TestRequest::new())
        .await;

    assert!(matches!(result, Err(PipelineError::Internal(_))));
    assert_eq!(stage_calls(&factory), [1, 1, 1, 1, 1]);
}

#[tokio::test]
async fn test_suppressed_failure_yields_no_subject_context() {
    let factory = MockHandlerFactory::new()
        .with_hydrator(MockStage::failing(PipelineError::Transport(
            "attribute store down".to_string(),
        )))
        .with_error_handler(MockErrorHandler::suppressing());
    let rule = build_rule(&factory);

    let result = rule
        .execute(&Context::default(), &TestRequest::new())
        .await;

    assert_eq!(result, Ok(None));
    assert_eq!(stage_calls(&factory), [1, 1, 1, 0, 1]);
}

#[tokio::test]
async fn test_rules_share_stage_instances_without_shared_state() {
    let factory = MockHandlerFactory::new();
    let first = build_rule(&factory);
    let second = build_rule(&factory);

    let ctx = Context::default();
    let request = TestRequest::new();
    let (a, b) = tokio::join!(
        first.execute(&ctx, &request),
        second.execute(&ctx, &request)
    );

    assert!(a.unwrap().is_some());
    assert!(b.unwrap().is_some());
    assert_eq!(factory.authenticator().call_count(), 2);
}

fn identity_pipeline(url: &str) -> PipelineConfig {
    PipelineConfig::from_yaml(&format!(
        r#"
authenticators:
  - id: session
    type: authentication_data
    config:
      identity_info_endpoint:
        url: {url}
      authentication_data_source:
        - cookie: session
      session:
        subject_from: identity.id
authorizers:
  - id: allow
    type: allow
hydrators:
  - id: noop
    type: noop
mutators:
  - id: noop
    type: noop
error_handlers:
  - id: default
    type: default
default_rule:
  authenticators: [{{ id: session }}]
  authorizer: {{ id: allow }}
  hydrators: [{{ id: noop }}]
  mutators: [{{ id: noop }}]
  error_handlers: [{{ id: default }}]
"#
    ))
    .unwrap()
}

async fn identity_rule(server: &MockServer) -> Rule {
    let config = identity_pipeline(&format!("{}/sessions/whoami", server.uri()));
    let factory = PrototypeHandlerFactory::new(&config).unwrap();
    let rule_config = parse_rule_set(b"- id: r1\n  url: /**")
        .unwrap()
        .pop()
        .unwrap();
    Rule::new(
        &rule_config,
        "test",
        &factory,
        config.default_rule.as_ref(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_identity_endpoint_resolves_subject() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/whoami"))
        .and(body_string("abc123"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"identity": {"id": "bob"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    let rule = identity_rule(&server).await;

    let subject_ctx = rule
        .execute(
            &Context::default(),
            &TestRequest::new().with_cookie("session", "abc123"),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(subject_ctx.subject.unwrap().id, "bob");
}

#[tokio::test]
async fn test_deadline_interrupts_slow_identity_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/whoami"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"identity": {"id": "bob"}}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let rule = identity_rule(&server).await;

    let ctx = Context::default().with_timeout(Duration::from_millis(100));
    let result = rule
        .execute(&ctx, &TestRequest::new().with_cookie("session", "abc123"))
        .await;

    assert_eq!(result, Err(PipelineError::DeadlineExceeded));
}

#[tokio::test]
async fn test_cancelled_request_stops_identity_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions/whoami"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"identity": {"id": "bob"}}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    let rule = identity_rule(&server).await;

    let token = CancellationToken::new();
    let ctx = Context::new(token.clone());
    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let result = rule
        .execute(&ctx, &TestRequest::new().with_cookie("session", "abc123"))
        .await;
    canceller.await.unwrap();

    assert_eq!(result, Err(PipelineError::Cancelled));
    assert!(!result.unwrap_err().is_retryable());
}
