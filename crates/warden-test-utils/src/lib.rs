//! # Warden Test Utilities
//!
//! Shared test utilities for the warden service.
//!
//! This crate provides:
//! - ES256 key fixtures producing JWKs and signed tokens
//! - Test data builders (TestTokenBuilder, TestRequest)
//! - Recording mock pipeline stages and a mock handler factory
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let key = TestKeypair::generate("key-1")?;
//!     let token = key.sign_token(
//!         &TestTokenBuilder::new().for_user("alice").expires_in(60).build(),
//!     )?;
//!
//!     let request = TestRequest::new().with_bearer(&token);
//! }
//! ```

pub mod crypto_fixtures;
pub mod mock_stages;
pub mod request_context;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use mock_stages::*;
pub use request_context::*;
pub use token_builders::*;
