//! Common utilities shared across Warden components.

#![warn(clippy::pedantic)]

/// Module for JWT utilities (structure checks, header decoding, time windows)
pub mod jwt;
