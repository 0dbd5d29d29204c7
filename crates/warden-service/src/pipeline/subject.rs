//! Subject identity and its extraction from JSON payloads.
//!
//! Authenticators hand the verified claims (or an identity endpoint's
//! response body) to a [`SubjectInfo`], which locates the subject id and the
//! attributes using two independently configured paths.
//!
//! # Path syntax
//!
//! Dot-separated object keys or array indices (`sub`, `user.id`,
//! `identities.0.email`). `@this` or an empty path selects the whole payload.

use crate::errors::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reference to the whole payload.
pub const THIS_PATH: &str = "@this";

/// Resolved identity of the request's principal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: Map::new(),
        }
    }
}

/// Locates a value inside a JSON document.
pub fn locate<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() || path == THIS_PATH {
        return Some(document);
    }

    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index)),
        _ => None,
    })
}

/// Subject extraction configuration (`session` block of authenticators).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectInfo {
    /// Path of the subject id (default: `sub`).
    #[serde(default = "default_subject_from")]
    pub subject_from: String,

    /// Path of the attributes object (default: the whole payload).
    #[serde(default = "default_attributes_from")]
    pub attributes_from: String,
}

fn default_subject_from() -> String {
    "sub".to_string()
}

fn default_attributes_from() -> String {
    THIS_PATH.to_string()
}

impl Default for SubjectInfo {
    fn default() -> Self {
        Self {
            subject_from: default_subject_from(),
            attributes_from: default_attributes_from(),
        }
    }
}

impl SubjectInfo {
    /// Build a subject from a raw JSON payload.
    ///
    /// A missing or `null` attributes value yields empty attributes.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::SubjectDecoding` if the payload is not JSON,
    /// the id path does not resolve to a string, or the attributes path
    /// resolves to something other than an object.
    pub fn get_subject(&self, raw: &[u8]) -> Result<Subject, PipelineError> {
        let document: Value = serde_json::from_slice(raw).map_err(|e| {
            PipelineError::SubjectDecoding(format!("payload is not valid JSON: {e}"))
        })?;

        let id = match locate(&document, &self.subject_from) {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => {
                return Err(PipelineError::SubjectDecoding(format!(
                    "configured subject_from path '{}' did not resolve to a value",
                    self.subject_from
                )))
            }
            Some(_) => {
                return Err(PipelineError::SubjectDecoding(format!(
                    "configured subject_from path '{}' did not resolve to a string",
                    self.subject_from
                )))
            }
        };

        let attributes = match locate(&document, &self.attributes_from) {
            Some(Value::Object(attributes)) => attributes.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(PipelineError::SubjectDecoding(format!(
                    "configured attributes_from path '{}' did not resolve to an object",
                    self.attributes_from
                )))
            }
        };

        Ok(Subject { id, attributes })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_locate_paths() {
        let doc = json!({
            "sub": "alice",
            "user": {"id": "u-1", "emails": ["a@example.com", "b@example.com"]}
        });

        assert_eq!(locate(&doc, "sub"), Some(&json!("alice")));
        assert_eq!(locate(&doc, "user.id"), Some(&json!("u-1")));
        assert_eq!(locate(&doc, "user.emails.1"), Some(&json!("b@example.com")));
        assert_eq!(locate(&doc, "@this"), Some(&doc));
        assert_eq!(locate(&doc, ""), Some(&doc));
        assert_eq!(locate(&doc, "user.missing"), None);
        assert_eq!(locate(&doc, "sub.deeper"), None);
        assert_eq!(locate(&doc, "user.emails.x"), None);
    }

    #[test]
    fn test_get_subject_defaults() {
        let info = SubjectInfo::default();
        let subject = info
            .get_subject(br#"{"sub":"alice","email":"alice@example.com"}"#)
            .unwrap();

        assert_eq!(subject.id, "alice");
        assert_eq!(subject.attributes.get("email"), Some(&json!("alice@example.com")));
        assert_eq!(subject.attributes.get("sub"), Some(&json!("alice")));
    }

    #[test]
    fn test_get_subject_custom_paths() {
        let info = SubjectInfo {
            subject_from: "identity.id".to_string(),
            attributes_from: "identity.traits".to_string(),
        };

        let subject = info
            .get_subject(br#"{"identity":{"id":"i-7","traits":{"role":"admin"}}}"#)
            .unwrap();

        assert_eq!(subject.id, "i-7");
        assert_eq!(subject.attributes.len(), 1);
        assert_eq!(subject.attributes.get("role"), Some(&json!("admin")));
    }

    #[test]
    fn test_get_subject_missing_id_is_decoding_error() {
        let info = SubjectInfo::default();
        let result = info.get_subject(br#"{"email":"alice@example.com"}"#);

        assert!(matches!(result, Err(PipelineError::SubjectDecoding(_))));
    }

    #[test]
    fn test_get_subject_non_string_id_is_decoding_error() {
        let info = SubjectInfo::default();

        assert!(matches!(
            info.get_subject(br#"{"sub":42}"#),
            Err(PipelineError::SubjectDecoding(_))
        ));
        assert!(matches!(
            info.get_subject(br#"{"sub":null}"#),
            Err(PipelineError::SubjectDecoding(_))
        ));
    }

    #[test]
    fn test_get_subject_missing_attributes_are_empty() {
        let info = SubjectInfo {
            subject_from: "sub".to_string(),
            attributes_from: "ext".to_string(),
        };

        let subject = info.get_subject(br#"{"sub":"alice"}"#).unwrap();
        assert!(subject.attributes.is_empty());
    }

    #[test]
    fn test_get_subject_non_object_attributes_is_decoding_error() {
        let info = SubjectInfo {
            subject_from: "sub".to_string(),
            attributes_from: "roles".to_string(),
        };

        let result = info.get_subject(br#"{"sub":"alice","roles":["a","b"]}"#);
        assert!(matches!(result, Err(PipelineError::SubjectDecoding(_))));
    }

    #[test]
    fn test_get_subject_malformed_payload() {
        let info = SubjectInfo::default();
        assert!(matches!(
            info.get_subject(b"not json"),
            Err(PipelineError::SubjectDecoding(_))
        ));
    }

    #[test]
    fn test_subject_info_rejects_unknown_fields() {
        let result: Result<SubjectInfo, _> = serde_yaml::from_str("subject: sub");
        assert!(result.is_err());
    }
}
