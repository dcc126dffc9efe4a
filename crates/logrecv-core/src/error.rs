//! Ingestion error types.
//!
//! [`StoreError`] covers every failure of the object writer and the multipart
//! coordinator. All of them are confined to the request that caused them; the
//! HTTP layer maps each variant to an S3 error code and status.

use std::io;
use std::path::PathBuf;

/// Errors produced while storing objects or coordinating multipart uploads.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // -----------------------------------------------------------------------
    // Integrity errors
    // -----------------------------------------------------------------------
    /// The body's MD5 does not match the `Content-MD5` header.
    #[error("content MD5 mismatch: declared {declared:?}, computed {computed}")]
    Md5Mismatch {
        /// Declared base64 MD5, `None` when the header was absent.
        declared: Option<String>,
        /// Base64 MD5 of the received bytes.
        computed: String,
    },

    /// Fewer (or more) bytes arrived than `Content-Length` announced.
    #[error("incomplete body: expected {expected} bytes, received {received}")]
    IncompleteBody {
        /// Declared content length.
        expected: u64,
        /// Bytes actually received.
        received: u64,
    },

    // -----------------------------------------------------------------------
    // Decode errors
    // -----------------------------------------------------------------------
    /// A `.gz` body could not be decompressed. Never fatal to a write.
    #[error("failed to decompress gzip body: {0}")]
    GzipDecompressFailed(#[source] io::Error),

    // -----------------------------------------------------------------------
    // Request shape errors
    // -----------------------------------------------------------------------
    /// The bucket or key cannot be mapped safely below the root directory.
    #[error("invalid object name: {0}")]
    InvalidObjectName(String),

    /// The part number is outside `1..=10000`.
    #[error("invalid part number: {0}")]
    InvalidPartNumber(u32),

    /// The completion manifest lists no parts.
    #[error("the completion manifest lists no parts")]
    MalformedManifest,

    // -----------------------------------------------------------------------
    // Multipart errors
    // -----------------------------------------------------------------------
    /// No upload session exists for the given ID.
    #[error("the specified upload does not exist: {0}")]
    NoSuchUpload(String),

    /// The upload is being assembled by a concurrent completion.
    #[error("upload {0} is being completed")]
    UploadCompleting(String),

    /// A completion names another bucket or key than the initiation did.
    #[error("upload {upload_id} targets {expected}, not {requested}")]
    UploadTargetMismatch {
        /// The upload ID.
        upload_id: String,
        /// `bucket/key` recorded at initiation.
        expected: String,
        /// `bucket/key` of the completion request.
        requested: String,
    },

    /// The manifest references a part that was never staged.
    #[error("part {part_number} of upload {upload_id} was not found")]
    PartNotFound {
        /// The upload ID.
        upload_id: String,
        /// The missing part number.
        part_number: u32,
    },

    // -----------------------------------------------------------------------
    // I/O errors
    // -----------------------------------------------------------------------
    /// A destination directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreateFailed {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A staged part could not be written.
    #[error("failed to write part {path}: {source}")]
    PartWriteFailed {
        /// Staging path of the part.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// A staged part could not be read.
    #[error("failed to read part {path}: {source}")]
    PartReadFailed {
        /// Staging path of the part.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// An object or aggregate file could not be written.
    #[error("failed to write object {path}: {source}")]
    ObjectWriteFailed {
        /// Destination path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_format_part_not_found() {
        let err = StoreError::PartNotFound {
            upload_id: "abc".to_owned(),
            part_number: 7,
        };
        assert_eq!(err.to_string(), "part 7 of upload abc was not found");
    }
}
