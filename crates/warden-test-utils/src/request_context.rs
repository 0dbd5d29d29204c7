//! Request builder implementing [`RequestContext`].

use std::collections::HashMap;
use warden_service::pipeline::RequestContext;

/// In-memory request for driving pipelines in tests.
///
/// # Example
/// ```rust,ignore
/// let request = TestRequest::new()
///     .with_bearer(&token)
///     .with_query("tenant", "acme");
/// ```
#[derive(Debug, Default, Clone)]
pub struct TestRequest {
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    body: Vec<u8>,
}

impl TestRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header names are stored lowercase; lookups are case-insensitive.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Set `Authorization: Bearer <token>`.
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_header("Authorization", &format!("Bearer {}", token))
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_form(mut self, name: &str, value: &str) -> Self {
        self.form.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }
}

impl RequestContext for TestRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    fn query_parameter(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    fn form_parameter(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }

    fn body(&self) -> &[u8] {
        &self.body
    }
}
