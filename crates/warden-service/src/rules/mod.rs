//! Rules and the rule repository.
//!
//! - `config` - Rule-set definition format
//! - `pattern` - URL patterns rules match against
//! - `rule` - A rule and its stage pipeline
//! - `provider` - Rule-set change events and the file provider
//! - `repository` - Hot-reloadable rule collection

pub mod config;
pub mod pattern;
pub mod provider;
pub mod repository;
pub mod rule;

pub use pattern::UrlPattern;
pub use provider::{ChangeType, RuleSetChangeEvent};
pub use repository::Repository;
pub use rule::Rule;
