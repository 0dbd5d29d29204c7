//! The rule repository.
//!
//! Holds the active rules in load order and keeps them current by consuming
//! rule-set change events on a background watcher task.
//!
//! # Concurrency
//!
//! - Lookups take a shared read lock; they never wait for rule construction,
//!   which happens before the write lock is taken
//! - A rule set is swapped in (or evicted) within a single write-lock section,
//!   so readers see either the old or the new rules, never a mix
//! - The watcher owns the event queue's receiver. `stop()` cancels the
//!   watcher and awaits it; the receiver is dropped only after the watcher
//!   has stopped reading, and senders observe the closed queue as a
//!   `SendError`

use crate::errors::{RepositoryError, RuleSetError};
use crate::observability::metrics;
use crate::pipeline::factory::{DefaultRuleConfig, HandlerFactory};
use crate::rules::config::parse_rule_set;
use crate::rules::provider::{ChangeType, RuleSetChangeEvent};
use crate::rules::rule::Rule;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Rule collection and the logic applying change events to it.
struct RuleStore {
    rules: RwLock<Vec<Arc<Rule>>>,
    factory: Arc<dyn HandlerFactory>,
    default_rule: Option<DefaultRuleConfig>,
}

impl RuleStore {
    async fn on_rule_set_changed(&self, event: RuleSetChangeEvent) -> Result<(), RuleSetError> {
        let change_type = event.change_type;

        let result = match change_type {
            ChangeType::Create => match event.definition.as_deref() {
                Some(definition) => self
                    .on_rule_set_created(&event.source_id, definition)
                    .await
                    .map(|_| ()),
                None => Err(RuleSetError::Parse(
                    "create event carries no rule set".to_string(),
                )),
            },
            ChangeType::Remove => {
                self.remove_rules_for_source(&event.source_id).await;
                Ok(())
            }
        };

        match &result {
            Ok(()) => metrics::record_rule_set_change(change_type.as_str(), "success"),
            Err(e) => {
                tracing::error!(
                    target: "warden.rules.repository",
                    source_id = %event.source_id,
                    error = %e,
                    "Failed to apply rule set change"
                );
                metrics::record_rule_set_change(change_type.as_str(), "error");
            }
        }

        result
    }

    async fn on_rule_set_created(
        &self,
        source_id: &str,
        definition: &[u8],
    ) -> Result<usize, RuleSetError> {
        let rules = self.load_rules(source_id, definition)?;
        let count = rules.len();
        self.replace_rules_for_source(source_id, rules).await;
        Ok(count)
    }

    /// Build every rule of a definition, or none.
    fn load_rules(
        &self,
        source_id: &str,
        definition: &[u8],
    ) -> Result<Vec<Arc<Rule>>, RuleSetError> {
        parse_rule_set(definition)?
            .iter()
            .map(|config| {
                Rule::new(
                    config,
                    source_id,
                    self.factory.as_ref(),
                    self.default_rule.as_ref(),
                )
                .map(Arc::new)
                .map_err(|source| RuleSetError::Construction {
                    rule_id: config.id.clone(),
                    source,
                })
            })
            .collect()
    }

    async fn replace_rules_for_source(&self, source_id: &str, new_rules: Vec<Arc<Rule>>) {
        let mut rules = self.rules.write().await;
        let previous = rules.len();
        rules.retain(|rule| rule.source_id() != source_id);
        let replaced = previous - rules.len();
        let added = new_rules.len();
        rules.extend(new_rules);

        tracing::info!(
            target: "warden.rules.repository",
            source_id = %source_id,
            added,
            replaced,
            total = rules.len(),
            "Rule set loaded"
        );
        metrics::set_rules_active(rules.len());
    }

    async fn remove_rules_for_source(&self, source_id: &str) -> usize {
        let mut rules = self.rules.write().await;
        let previous = rules.len();
        rules.retain(|rule| rule.source_id() != source_id);
        let removed = previous - rules.len();

        tracing::info!(
            target: "warden.rules.repository",
            source_id = %source_id,
            removed,
            total = rules.len(),
            "Rule set removed"
        );
        metrics::set_rules_active(rules.len());
        removed
    }
}

enum Lifecycle {
    Idle(mpsc::Receiver<RuleSetChangeEvent>),
    Running(JoinHandle<()>),
    Stopped,
}

/// Concurrency-safe collection of rules fed by rule-set change events.
pub struct Repository {
    store: Arc<RuleStore>,
    lifecycle: Mutex<Lifecycle>,
    cancel: CancellationToken,
}

impl Repository {
    /// Create a repository consuming events from `queue` once started.
    pub fn new(
        factory: Arc<dyn HandlerFactory>,
        default_rule: Option<DefaultRuleConfig>,
        queue: mpsc::Receiver<RuleSetChangeEvent>,
    ) -> Self {
        Self {
            store: Arc::new(RuleStore {
                rules: RwLock::new(Vec::new()),
                factory,
                default_rule,
            }),
            lifecycle: Mutex::new(Lifecycle::Idle(queue)),
            cancel: CancellationToken::new(),
        }
    }

    /// Find the first rule, in load order, matching the URL and method.
    ///
    /// Without a method only the URL is matched.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NoRuleFound` if no rule matches.
    #[instrument(skip_all, fields(path = %url.path()))]
    pub async fn find_rule(
        &self,
        url: &url::Url,
        method: Option<&str>,
    ) -> Result<Arc<Rule>, RepositoryError> {
        let rules = self.store.rules.read().await;

        let found = rules
            .iter()
            .find(|rule| {
                rule.matches_url(url) && method.map_or(true, |method| rule.matches_method(method))
            })
            .cloned();

        metrics::record_rule_lookup(found.is_some());
        found.ok_or_else(|| {
            tracing::debug!(target: "warden.rules.repository", "No rule found");
            RepositoryError::NoRuleFound
        })
    }

    /// Apply a change event immediately, bypassing the queue.
    ///
    /// # Errors
    ///
    /// Returns the parse or construction error of a rejected rule set; the
    /// active rules are then unchanged.
    pub async fn on_rule_set_changed(&self, event: RuleSetChangeEvent) -> Result<(), RuleSetError> {
        self.store.on_rule_set_changed(event).await
    }

    /// Number of active rules.
    pub async fn rule_count(&self) -> usize {
        self.store.rules.read().await.len()
    }

    /// Start the watcher task.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::AlreadyStarted` if the watcher is running
    /// and `RepositoryError::Stopped` after `stop()`.
    pub async fn start(&self) -> Result<(), RepositoryError> {
        let mut lifecycle = self.lifecycle.lock().await;

        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(queue) => {
                let store = Arc::clone(&self.store);
                let cancel = self.cancel.clone();
                *lifecycle = Lifecycle::Running(tokio::spawn(watch(store, queue, cancel)));
                tracing::info!(target: "warden.rules.repository", "Rule set watcher started");
                Ok(())
            }
            running @ Lifecycle::Running(_) => {
                *lifecycle = running;
                Err(RepositoryError::AlreadyStarted)
            }
            Lifecycle::Stopped => Err(RepositoryError::Stopped),
        }
    }

    /// Stop the watcher and close the event queue.
    ///
    /// Returns once the watcher has exited. Calling `stop()` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Shutdown` if the watcher task panicked.
    pub async fn stop(&self) -> Result<(), RepositoryError> {
        let mut lifecycle = self.lifecycle.lock().await;

        match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
            Lifecycle::Idle(queue) => {
                drop(queue);
                Ok(())
            }
            Lifecycle::Running(handle) => {
                self.cancel.cancel();
                handle.await.map_err(|e| {
                    tracing::error!(target: "warden.rules.repository", error = %e, "Rule set watcher failed");
                    RepositoryError::Shutdown(e.to_string())
                })?;
                tracing::info!(target: "warden.rules.repository", "Rule set watcher stopped");
                Ok(())
            }
            Lifecycle::Stopped => Ok(()),
        }
    }
}

/// Watcher loop: apply events until cancelled or all senders are gone.
async fn watch(
    store: Arc<RuleStore>,
    mut queue: mpsc::Receiver<RuleSetChangeEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                tracing::debug!(target: "warden.rules.repository", "Watcher received stop signal");
                break;
            }

            event = queue.recv() => match event {
                Some(event) => {
                    tracing::debug!(
                        target: "warden.rules.repository",
                        source_id = %event.source_id,
                        change_type = event.change_type.as_str(),
                        "Rule set change received"
                    );
                    // Failures are logged and counted by the store
                    let _ = store.on_rule_set_changed(event).await;
                }
                None => {
                    tracing::info!(target: "warden.rules.repository", "Rule set event queue closed");
                    break;
                }
            }
        }
    }

    queue.close();
}
