//! Wire-level S3 errors.
//!
//! [`S3Error`] is what the service turns into an `<Error>` document. The
//! library errors of the auth, core and XML crates convert into it, each
//! variant landing on the S3 code and status a client expects.

use std::fmt;

use logrecv_auth::AuthError;
use logrecv_core::StoreError;
use logrecv_xml::XmlError;

/// S3 error codes the receiver can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3ErrorCode {
    /// Missing credentials or unsigned `host`.
    AccessDenied,
    /// The `Authorization` header does not parse.
    AuthorizationHeaderMalformed,
    /// The body does not match `Content-MD5`.
    BadDigest,
    /// Fewer bytes arrived than announced, or the body could not be read.
    IncompleteBody,
    /// Server-side failure.
    InternalError,
    /// The credential names an unknown access key.
    InvalidAccessKeyId,
    /// A request parameter is out of range or unsafe.
    InvalidArgument,
    /// A manifest entry names a part that was never uploaded.
    InvalidPart,
    /// A required header is missing.
    InvalidRequest,
    /// The request XML is not well formed.
    MalformedXML,
    /// `Content-Length` is missing on an upload.
    MissingContentLength,
    /// The upload ID is unknown.
    NoSuchUpload,
    /// The verb/query combination is not supported.
    NotImplemented,
    /// The upload is being completed by another request.
    OperationAborted,
    /// The signature does not verify.
    SignatureDoesNotMatch,
}

impl S3ErrorCode {
    /// The code as it appears in `<Code>`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::AuthorizationHeaderMalformed => "AuthorizationHeaderMalformed",
            Self::BadDigest => "BadDigest",
            Self::IncompleteBody => "IncompleteBody",
            Self::InternalError => "InternalError",
            Self::InvalidAccessKeyId => "InvalidAccessKeyId",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidPart => "InvalidPart",
            Self::InvalidRequest => "InvalidRequest",
            Self::MalformedXML => "MalformedXML",
            Self::MissingContentLength => "MissingContentLength",
            Self::NoSuchUpload => "NoSuchUpload",
            Self::NotImplemented => "NotImplemented",
            Self::OperationAborted => "OperationAborted",
            Self::SignatureDoesNotMatch => "SignatureDoesNotMatch",
        }
    }

    /// The HTTP status this code is sent with.
    #[must_use]
    pub fn default_status_code(&self) -> http::StatusCode {
        match self {
            Self::AccessDenied | Self::InvalidAccessKeyId | Self::SignatureDoesNotMatch => {
                http::StatusCode::FORBIDDEN
            }
            Self::AuthorizationHeaderMalformed
            | Self::BadDigest
            | Self::IncompleteBody
            | Self::InvalidArgument
            | Self::InvalidPart
            | Self::InvalidRequest
            | Self::MalformedXML => http::StatusCode::BAD_REQUEST,
            Self::NoSuchUpload => http::StatusCode::NOT_FOUND,
            Self::OperationAborted => http::StatusCode::CONFLICT,
            Self::MissingContentLength => http::StatusCode::LENGTH_REQUIRED,
            Self::NotImplemented => http::StatusCode::NOT_IMPLEMENTED,
            Self::InternalError => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message used when no more specific one is given.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::AccessDenied => "Access Denied",
            Self::AuthorizationHeaderMalformed => "The authorization header is malformed",
            Self::BadDigest => "The Content-MD5 you specified did not match what we received",
            Self::IncompleteBody => "You did not provide the number of bytes specified",
            Self::InternalError => "We encountered an internal error. Please try again.",
            Self::InvalidAccessKeyId => "The access key ID you provided does not exist",
            Self::InvalidArgument => "Invalid Argument",
            Self::InvalidPart => "One or more of the specified parts could not be found",
            Self::InvalidRequest => "Invalid Request",
            Self::MalformedXML => "The XML you provided was not well-formed",
            Self::MissingContentLength => "You must provide the Content-Length HTTP header",
            Self::NoSuchUpload => "The specified multipart upload does not exist",
            Self::NotImplemented => "The functionality is not implemented",
            Self::OperationAborted => {
                "A conflicting conditional operation is currently in progress against this resource"
            }
            Self::SignatureDoesNotMatch => "The request signature does not match",
        }
    }
}

impl fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An S3 error response.
#[derive(Debug)]
pub struct S3Error {
    /// The error code.
    pub code: S3ErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// The resource that caused the error.
    pub resource: Option<String>,
    /// The HTTP status code.
    pub status_code: http::StatusCode,
    /// The underlying source error, if any.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for S3Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S3Error({}): {}", self.code, self.message)
    }
}

impl std::error::Error for S3Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl S3Error {
    /// Create an error with the code's default message.
    #[must_use]
    pub fn new(code: S3ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code: code.default_status_code(),
            message: message.into(),
            code,
            resource: None,
            source: None,
        }
    }

    /// Set the resource that caused this error.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the source error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Create an `InternalError` that hides `source` from the client.
    #[must_use]
    pub fn internal_error(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(S3ErrorCode::InternalError).with_source(source)
    }

    /// Create a `NotImplemented` error naming the unsupported request.
    #[must_use]
    pub fn not_implemented(what: impl fmt::Display) -> Self {
        Self::with_message(
            S3ErrorCode::NotImplemented,
            format!("{what} is not implemented"),
        )
    }

    /// Whether the server, not the client, is at fault.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code.is_server_error()
    }
}

impl From<AuthError> for S3Error {
    fn from(err: AuthError) -> Self {
        let code = match &err {
            AuthError::MissingAuthHeader | AuthError::UnsignedHeadersError(_) => {
                S3ErrorCode::AccessDenied
            }
            AuthError::MissingPayloadHashHeader | AuthError::MissingDateHeader => {
                S3ErrorCode::InvalidRequest
            }
            AuthError::MalformedAuthHeader => S3ErrorCode::AuthorizationHeaderMalformed,
            AuthError::AccessKeyMismatch(_) => S3ErrorCode::InvalidAccessKeyId,
            AuthError::SignatureMismatch => S3ErrorCode::SignatureDoesNotMatch,
        };
        Self::with_message(code, err.to_string()).with_source(err)
    }
}

impl From<StoreError> for S3Error {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::Md5Mismatch { .. } => S3ErrorCode::BadDigest,
            StoreError::IncompleteBody { .. } => S3ErrorCode::IncompleteBody,
            StoreError::PartNotFound { .. } => S3ErrorCode::InvalidPart,
            StoreError::NoSuchUpload(_) => S3ErrorCode::NoSuchUpload,
            StoreError::UploadCompleting(_) => S3ErrorCode::OperationAborted,
            StoreError::UploadTargetMismatch { .. }
            | StoreError::InvalidPartNumber(_)
            | StoreError::InvalidObjectName(_) => S3ErrorCode::InvalidArgument,
            StoreError::MalformedManifest => S3ErrorCode::MalformedXML,
            StoreError::GzipDecompressFailed(_)
            | StoreError::DirectoryCreateFailed { .. }
            | StoreError::PartWriteFailed { .. }
            | StoreError::PartReadFailed { .. }
            | StoreError::ObjectWriteFailed { .. } => S3ErrorCode::InternalError,
        };
        if code == S3ErrorCode::InternalError {
            return Self::internal_error(err);
        }
        Self::with_message(code, err.to_string()).with_source(err)
    }
}

impl From<XmlError> for S3Error {
    fn from(err: XmlError) -> Self {
        if matches!(err, XmlError::Io(_)) {
            return Self::internal_error(err);
        }
        Self::with_message(S3ErrorCode::MalformedXML, err.to_string()).with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_should_map_auth_errors() {
        let cases = [
            (AuthError::MissingAuthHeader, "AccessDenied", 403),
            (
                AuthError::UnsignedHeadersError("x-custom".to_owned()),
                "AccessDenied",
                403,
            ),
            (AuthError::MissingPayloadHashHeader, "InvalidRequest", 400),
            (AuthError::MissingDateHeader, "InvalidRequest", 400),
            (
                AuthError::MalformedAuthHeader,
                "AuthorizationHeaderMalformed",
                400,
            ),
            (
                AuthError::AccessKeyMismatch("AKIDOTHER".to_owned()),
                "InvalidAccessKeyId",
                403,
            ),
            (AuthError::SignatureMismatch, "SignatureDoesNotMatch", 403),
        ];
        for (err, code, status) in cases {
            let s3 = S3Error::from(err);
            assert_eq!(s3.code.as_str(), code);
            assert_eq!(s3.status_code.as_u16(), status);
        }
    }

    #[test]
    fn test_should_map_store_errors() {
        let s3 = S3Error::from(StoreError::PartNotFound {
            upload_id: "abc".to_owned(),
            part_number: 2,
        });
        assert_eq!(s3.code, S3ErrorCode::InvalidPart);
        assert_eq!(s3.status_code, http::StatusCode::BAD_REQUEST);

        let s3 = S3Error::from(StoreError::NoSuchUpload("abc".to_owned()));
        assert_eq!(s3.status_code, http::StatusCode::NOT_FOUND);

        let s3 = S3Error::from(StoreError::MalformedManifest);
        assert_eq!(s3.code, S3ErrorCode::MalformedXML);

        let s3 = S3Error::from(StoreError::UploadCompleting("abc".to_owned()));
        assert_eq!(s3.code, S3ErrorCode::OperationAborted);
        assert_eq!(s3.status_code, http::StatusCode::CONFLICT);
    }

    #[test]
    fn test_should_hide_io_details_behind_internal_error() {
        let s3 = S3Error::from(StoreError::ObjectWriteFailed {
            path: PathBuf::from("/secret/path/file.log"),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(s3.code, S3ErrorCode::InternalError);
        assert!(s3.is_server_error());
        assert!(!s3.message.contains("/secret/path"));
        assert!(std::error::Error::source(&s3).is_some());
    }

    #[test]
    fn test_should_report_length_required() {
        let s3 = S3Error::new(S3ErrorCode::MissingContentLength);
        assert_eq!(s3.status_code, http::StatusCode::LENGTH_REQUIRED);
        assert_eq!(s3.message, S3ErrorCode::MissingContentLength.default_message());
    }
}
