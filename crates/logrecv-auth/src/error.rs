//! Error types for SigV4 authentication.
//!
//! Every way a request can fail authentication is a variant of [`AuthError`].
//! None of them are fatal to the process; the HTTP layer maps each one to a
//! 4xx response.

/// Errors that can occur while parsing or verifying a SigV4 signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header is missing from the request.
    #[error("no authorization header present in request")]
    MissingAuthHeader,

    /// The `x-amz-content-sha256` header is missing from the request.
    #[error("no hash header present in request")]
    MissingPayloadHashHeader,

    /// The `x-amz-date` header is missing from the request.
    #[error("no x-amz-date header present in request")]
    MissingDateHeader,

    /// The `Authorization` header does not follow the
    /// `AWS4-HMAC-SHA256 Credential=..., SignedHeaders=..., Signature=...` grammar.
    #[error("malformed authorization header")]
    MalformedAuthHeader,

    /// The access key in the credential scope is not the configured one.
    #[error("invalid access key: {0}")]
    AccessKeyMismatch(String),

    /// `host` is not signed, or a signed header cannot be resolved from the request.
    #[error("error processing signed headers: {0}")]
    UnsignedHeadersError(String),

    /// The computed signature does not match the provided one.
    #[error("signature does not match")]
    SignatureMismatch,
}
