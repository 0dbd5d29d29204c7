//! Rule-set change events and the start-up file provider.

use crate::errors::ProviderError;
use bytes::Bytes;
use std::path::Path;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Create,
    Remove,
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Remove => "remove",
        }
    }
}

/// A change of the rule set published by one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSetChangeEvent {
    pub source_id: String,
    pub change_type: ChangeType,
    /// Serialized rule set; present only for `Create`.
    pub definition: Option<Bytes>,
}

impl RuleSetChangeEvent {
    pub fn create(source_id: impl Into<String>, definition: impl Into<Bytes>) -> Self {
        Self {
            source_id: source_id.into(),
            change_type: ChangeType::Create,
            definition: Some(definition.into()),
        }
    }

    pub fn remove(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            change_type: ChangeType::Remove,
            definition: None,
        }
    }
}

/// Source id used for rule sets loaded from a file.
pub fn file_source_id(path: &Path) -> String {
    format!("file:{}", path.display())
}

/// Read each rule-set file and publish it as a `Create` event.
///
/// Returns the number of published events.
///
/// # Errors
///
/// Returns `ProviderError::Read` for an unreadable file (events for earlier
/// files remain published) and `ProviderError::QueueClosed` if the
/// repository no longer accepts events.
pub async fn load_rule_set_files<P: AsRef<Path>>(
    paths: &[P],
    queue: &mpsc::Sender<RuleSetChangeEvent>,
) -> Result<usize, ProviderError> {
    let mut published = 0;

    for path in paths {
        let path = path.as_ref();
        let definition = tokio::fs::read(path)
            .await
            .map_err(|source| ProviderError::Read {
                path: path.display().to_string(),
                source,
            })?;

        let source_id = file_source_id(path);
        tracing::info!(target: "warden.rules.provider", source_id = %source_id, "Publishing rule set");

        queue
            .send(RuleSetChangeEvent::create(source_id, definition))
            .await
            .map_err(|_| ProviderError::QueueClosed)?;
        published += 1;
    }

    Ok(published)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "warden-provider-{}-{name}",
            std::process::id()
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_load_rule_set_files_publishes_create_events() {
        let first = temp_file("first.yaml", "- id: a\n  url: /a\n");
        let second = temp_file("second.yaml", "- id: b\n  url: /b\n");
        let (tx, mut rx) = mpsc::channel(4);

        let published = load_rule_set_files(&[&first, &second], &tx).await.unwrap();
        assert_eq!(published, 2);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.change_type, ChangeType::Create);
        assert_eq!(event.source_id, file_source_id(&first));
        assert_eq!(
            event.definition.as_deref(),
            Some("- id: a\n  url: /a\n".as_bytes())
        );
        assert_eq!(rx.recv().await.unwrap().source_id, file_source_id(&second));

        std::fs::remove_file(first).unwrap();
        std::fs::remove_file(second).unwrap();
    }

    #[tokio::test]
    async fn test_load_rule_set_files_missing_file() {
        let (tx, _rx) = mpsc::channel(1);
        let result = load_rule_set_files(&["/nonexistent/warden/rules.yaml"], &tx).await;

        assert!(matches!(result, Err(ProviderError::Read { .. })));
    }

    #[tokio::test]
    async fn test_load_rule_set_files_closed_queue() {
        let file = temp_file("closed.yaml", "[]");
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = load_rule_set_files(&[&file], &tx).await;
        assert!(matches!(result, Err(ProviderError::QueueClosed)));

        std::fs::remove_file(file).unwrap();
    }

    #[test]
    fn test_event_constructors() {
        let remove = RuleSetChangeEvent::remove("file:/etc/rules.yaml");
        assert_eq!(remove.change_type, ChangeType::Remove);
        assert!(remove.definition.is_none());
        assert_eq!(ChangeType::Create.as_str(), "create");
    }
}
