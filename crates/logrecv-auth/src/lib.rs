//! AWS Signature Version 4 request verification for the logrecv S3 endpoint.
//!
//! The verifier is independent of any client signing library: it rebuilds the
//! canonical request byte for byte from the incoming request and recomputes the
//! signature from the configured secret key.
//!
//! # Usage
//!
//! ```rust
//! use logrecv_auth::{AuthError, parse};
//!
//! let (parts, ()) = http::Request::builder()
//!     .method("PUT")
//!     .uri("/20210503/file.log")
//!     .body(())
//!     .unwrap()
//!     .into_parts();
//!
//! // Requests without an Authorization header never reach signature checks.
//! assert_eq!(parse(&parts), Err(AuthError::MissingAuthHeader));
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical request construction
//! - [`error`] - Authentication error types
//! - [`sigv4`] - Claim parsing and signature verification

pub mod canonical;
pub mod error;
pub mod sigv4;

pub use error::AuthError;
pub use sigv4::{AuthorizationClaim, hash_payload, parse, verify};
