//! URL patterns used to match requests to rules.
//!
//! ```text
//! [scheme://][host[:port]]/path
//! ```
//!
//! - scheme is optional and compared case-insensitively
//! - host labels compare case-insensitively; a `*` label matches any one label
//! - a pattern starting with `/` matches any host
//! - path segments compare case-sensitively after percent-encoding, so a
//!   literal written as `my report` matches the request path `my%20report`
//! - `*` matches exactly one non-empty segment and `**`, allowed only as the
//!   last segment, matches zero or more
//! - query strings and fragments are ignored

use crate::errors::PipelineError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Any,
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct HostPattern {
    labels: Vec<Option<String>>,
    port: Option<u16>,
}

/// A parsed URL pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    raw: String,
    scheme: Option<String>,
    host: Option<HostPattern>,
    path: Vec<Segment>,
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn invalid(pattern: &str, reason: &str) -> PipelineError {
    PipelineError::Argument(format!("invalid url pattern '{pattern}': {reason}"))
}

impl UrlPattern {
    /// Parse a pattern.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Argument` for empty patterns, malformed hosts
    /// or ports, partial wildcards, and `**` anywhere but the last segment.
    pub fn parse(pattern: &str) -> Result<Self, PipelineError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(invalid(pattern, "pattern is empty"));
        }

        let (scheme, rest) = match trimmed.split_once("://") {
            Some((scheme, _)) if scheme.is_empty() => {
                return Err(invalid(pattern, "scheme is empty"))
            }
            Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
            None => (None, trimmed),
        };

        let (authority, path) = match rest.find('/') {
            Some(index) => rest.split_at(index),
            None => (rest, "/"),
        };

        let host = if authority.is_empty() {
            if scheme.is_some() {
                return Err(invalid(pattern, "host is required after a scheme"));
            }
            None
        } else {
            Some(Self::parse_host(pattern, authority)?)
        };

        Ok(Self {
            raw: trimmed.to_string(),
            scheme,
            host,
            path: Self::parse_path(pattern, path)?,
        })
    }

    fn parse_host(pattern: &str, authority: &str) -> Result<HostPattern, PipelineError> {
        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| invalid(pattern, "port is not a number"))?;
                (host, Some(port))
            }
            None => (authority, None),
        };

        let labels = host
            .split('.')
            .map(|label| match label {
                "" => Err(invalid(pattern, "empty host label")),
                "*" => Ok(None),
                label if label.contains('*') => Err(invalid(pattern, "partial host wildcard")),
                label => Ok(Some(label.to_ascii_lowercase())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HostPattern { labels, port })
    }

    fn parse_path(pattern: &str, path: &str) -> Result<Vec<Segment>, PipelineError> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = Self::encode_path(pattern, path)?;
        let raw_segments: Vec<&str> = path.split('/').skip(1).collect();
        let last = raw_segments.len().saturating_sub(1);

        raw_segments
            .iter()
            .enumerate()
            .map(|(index, segment)| match *segment {
                "**" if index == last => Ok(Segment::Rest),
                "**" => Err(invalid(pattern, "'**' must be the last path segment")),
                "*" => Ok(Segment::Any),
                segment if segment.contains('*') => {
                    Err(invalid(pattern, "partial path wildcard"))
                }
                segment => Ok(Segment::Literal(segment.to_string())),
            })
            .collect()
    }

    /// Percent-encode a pattern path the way request URLs are encoded.
    fn encode_path(pattern: &str, path: &str) -> Result<String, PipelineError> {
        let mut base = url::Url::parse("http://localhost/")
            .map_err(|e| invalid(pattern, &e.to_string()))?;
        base.set_path(path);
        Ok(base.path().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the URL's scheme, host and path match this pattern.
    pub fn matches(&self, url: &url::Url) -> bool {
        if let Some(scheme) = &self.scheme {
            if !url.scheme().eq_ignore_ascii_case(scheme) {
                return false;
            }
        }

        if let Some(host) = &self.host {
            if !Self::matches_host(host, url) {
                return false;
            }
        }

        let segments: Vec<&str> = url.path().split('/').skip(1).collect();
        Self::matches_path(&self.path, &segments)
    }

    fn matches_host(pattern: &HostPattern, url: &url::Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        if let Some(port) = pattern.port {
            if url.port_or_known_default() != Some(port) {
                return false;
            }
        }

        let labels: Vec<&str> = host.split('.').collect();
        labels.len() == pattern.labels.len()
            && pattern
                .labels
                .iter()
                .zip(&labels)
                .all(|(expected, actual)| match expected {
                    None => true,
                    Some(expected) => expected.eq_ignore_ascii_case(actual),
                })
    }

    fn matches_path(pattern: &[Segment], segments: &[&str]) -> bool {
        match (pattern.split_first(), segments.split_first()) {
            (Some((Segment::Rest, _)), _) => true,
            (None, None) => true,
            (Some((Segment::Any, pattern_rest)), Some((actual, rest))) => {
                !actual.is_empty() && Self::matches_path(pattern_rest, rest)
            }
            (Some((Segment::Literal(expected), pattern_rest)), Some((actual, rest))) => {
                expected == actual && Self::matches_path(pattern_rest, rest)
            }
            _ => false,
        }
    }
}
