//! Warden Service Library
//!
//! The decision core of an access-control gateway. For every request the
//! gateway asks the rule repository for the first matching rule and runs
//! that rule's pipeline:
//!
//! ```text
//! authenticate -> authorize -> hydrate -> mutate   (error handler on failure)
//! ```
//!
//! Rule sets arrive as change events on a queue and are applied by a
//! background watcher, so rules can be replaced while requests are served.
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `observability` - Metrics
//! - `pipeline` - Stage traits, stage variants and the handler factory
//! - `rules` - Rules, URL patterns and the rule repository

pub mod config;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod rules;
