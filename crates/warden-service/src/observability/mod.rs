//! Observability for the warden service.
//!
//! Logging goes through `tracing` with per-module targets (`warden.rules.*`,
//! `warden.pipeline.*`). Credentials, tokens and header values never appear
//! in log fields; rule ids, source ids and error kinds do.

pub mod metrics;
