//! In-crate test helpers shared by the stage unit tests.

use crate::pipeline::RequestContext;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct FakeRequest {
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
}

impl FakeRequest {
    pub fn with_header(name: &str, value: &str) -> Self {
        let mut request = Self::default();
        request.headers.insert(name.to_string(), value.to_string());
        request
    }

    pub fn bearer(token: &str) -> Self {
        Self::with_header("Authorization", &format!("Bearer {token}"))
    }
}

impl RequestContext for FakeRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn cookie(&self, _name: &str) -> Option<&str> {
        None
    }

    fn query_parameter(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    fn form_parameter(&self, _name: &str) -> Option<&str> {
        None
    }

    fn body(&self) -> &[u8] {
        &[]
    }
}
