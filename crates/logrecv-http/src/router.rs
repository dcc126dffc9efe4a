//! Request routing.
//!
//! A request is identified from its method and query alone:
//!
//! | method | query | operation |
//! |---|---|---|
//! | `GET` | any | [`Operation::Status`] |
//! | `PUT` | no `uploadId` | [`Operation::PutObject`] |
//! | `PUT` | `uploadId` + `partNumber` | [`Operation::UploadPart`] |
//! | `POST` | `uploads` | [`Operation::CreateMultipartUpload`] |
//! | `POST` | `uploadId` | [`Operation::CompleteMultipartUpload`] |
//! | `DELETE` | `uploadId` | [`Operation::AbortMultipartUpload`] |
//!
//! Everything else is [`Operation::Unsupported`]. The path splits into a bucket
//! (every segment but the last, leading slash kept) and a key (the last
//! segment): `/20210503/file.log.gz` is bucket `/20210503`, key `file.log.gz`.

use std::fmt;

use http::Method;
use percent_encoding::percent_decode_str;

use crate::error::{S3Error, S3ErrorCode};

/// The operation a request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Unauthenticated liveness probe.
    Status,
    /// Single-request upload.
    PutObject,
    /// One part of a multipart upload.
    UploadPart {
        /// Upload the part belongs to.
        upload_id: String,
        /// Part number from the query.
        part_number: u32,
    },
    /// Start a multipart upload.
    CreateMultipartUpload,
    /// Assemble a multipart upload.
    CompleteMultipartUpload {
        /// Upload to complete.
        upload_id: String,
    },
    /// Drop a multipart upload.
    AbortMultipartUpload {
        /// Upload to abort.
        upload_id: String,
    },
    /// Any other verb/query combination.
    Unsupported,
}

impl Operation {
    /// S3 name of the operation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "Status",
            Self::PutObject => "PutObject",
            Self::UploadPart { .. } => "UploadPart",
            Self::CreateMultipartUpload => "CreateMultipartUpload",
            Self::CompleteMultipartUpload { .. } => "CompleteMultipartUpload",
            Self::AbortMultipartUpload { .. } => "AbortMultipartUpload",
            Self::Unsupported => "Unsupported",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The result of routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingContext {
    /// Bucket path, leading slash included.
    pub bucket: String,
    /// Object key, the last path segment.
    pub key: String,
    /// The identified operation.
    pub operation: Operation,
}

/// Route a request by method and URI.
///
/// # Errors
///
/// Returns `InvalidArgument` when an upload-part request carries no usable
/// `partNumber`.
pub fn resolve(method: &Method, uri: &http::Uri) -> Result<RoutingContext, S3Error> {
    let query_params = parse_query_params(uri.query().unwrap_or(""));
    let (bucket, key) = parse_path(uri.path());
    let operation = identify_operation(method, &query_params)?;

    Ok(RoutingContext {
        bucket,
        key,
        operation,
    })
}

fn identify_operation(
    method: &Method,
    query_params: &[(String, String)],
) -> Result<Operation, S3Error> {
    let upload_id = query_value(query_params, "uploadId").map(ToOwned::to_owned);

    let operation = match (method, upload_id) {
        (&Method::GET, _) => Operation::Status,
        (&Method::PUT, None) => Operation::PutObject,
        (&Method::PUT, Some(upload_id)) => {
            let raw = query_value(query_params, "partNumber").ok_or_else(|| {
                S3Error::with_message(
                    S3ErrorCode::InvalidArgument,
                    "partNumber is required with uploadId",
                )
            })?;
            let part_number = raw.parse::<u32>().map_err(|_| {
                S3Error::with_message(
                    S3ErrorCode::InvalidArgument,
                    format!("invalid partNumber: {raw}"),
                )
            })?;
            Operation::UploadPart {
                upload_id,
                part_number,
            }
        }
        (&Method::POST, None) if query_has_key(query_params, "uploads") => {
            Operation::CreateMultipartUpload
        }
        (&Method::POST, Some(upload_id)) => Operation::CompleteMultipartUpload { upload_id },
        (&Method::DELETE, Some(upload_id)) => Operation::AbortMultipartUpload { upload_id },
        _ => Operation::Unsupported,
    };
    Ok(operation)
}

/// Split a path into bucket and key.
fn parse_path(path: &str) -> (String, String) {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_uri_component)
        .collect();

    match segments.split_last() {
        Some((key, dirs)) => (format!("/{}", dirs.join("/")), key.clone()),
        None => ("/".to_owned(), String::new()),
    }
}

/// Decode a percent-encoded URI component.
fn decode_uri_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Parse a query string into key-value pairs.
fn parse_query_params(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode_uri_component(key), decode_uri_component(value)),
            None => (decode_uri_component(pair), String::new()),
        })
        .collect()
}

fn query_has_key(params: &[(String, String)], key: &str) -> bool {
    params.iter().any(|(k, _)| k == key)
}

fn query_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
