//! Single-request object ingestion.
//!
//! [`ObjectWriter::put_object`] takes a whole PUT body and:
//!
//! 1. checks the received length against `Content-Length`,
//! 2. checks the body MD5 against `Content-MD5` under the configured [`Md5Policy`],
//! 3. gunzips `.gz` keys (keeping the raw bytes when that fails),
//! 4. writes the object atomically, or appends it to the bucket's per-day
//!    aggregate file when aggregation is on.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use flate2::read::MultiGzDecoder;
use tracing::{debug, info, warn};

use crate::checksums::md5_base64;
use crate::config::Md5Policy;
use crate::error::StoreError;
use crate::storage::{FsStore, write_object};

const GZIP_SUFFIX: &str = ".gz";

/// A single-object upload as received from the wire.
#[derive(Debug, Clone)]
pub struct PutObject<'a> {
    /// Bucket path, leading slash included.
    pub bucket: &'a str,
    /// Object key (last path segment).
    pub key: &'a str,
    /// The complete body.
    pub body: Bytes,
    /// Value of `Content-Length`.
    pub content_length: u64,
    /// Value of `Content-MD5`, if present.
    pub content_md5: Option<&'a str>,
}

/// Where and how an upload was persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// File that received the bytes.
    pub path: PathBuf,
    /// ETag to return: the declared `Content-MD5`, or the computed one when absent.
    pub etag: String,
    /// Number of bytes written (after decompression).
    pub size: u64,
    /// Whether the body was gunzipped.
    pub decompressed: bool,
    /// Whether the bytes were appended to an aggregate file.
    pub aggregated: bool,
}

/// Persists whole-body uploads below a [`FsStore`].
#[derive(Debug, Clone)]
pub struct ObjectWriter {
    store: Arc<FsStore>,
    aggregate: bool,
    md5_policy: Md5Policy,
}

impl ObjectWriter {
    /// Create a writer over `store`.
    #[must_use]
    pub fn new(store: Arc<FsStore>, aggregate: bool, md5_policy: Md5Policy) -> Self {
        Self {
            store,
            aggregate,
            md5_policy,
        }
    }

    /// Store an upload, using the current UTC time for aggregation.
    pub async fn put_object(&self, req: PutObject<'_>) -> Result<StoredObject, StoreError> {
        self.put_object_at(req, Utc::now()).await
    }

    /// Store an upload as if it arrived at `now`.
    pub async fn put_object_at(
        &self,
        req: PutObject<'_>,
        now: DateTime<Utc>,
    ) -> Result<StoredObject, StoreError> {
        // Reject unsafe names before spending work on the body.
        self.store.object_path(req.bucket, req.key)?;

        let etag = check_body(
            &req.body,
            req.content_length,
            req.content_md5,
            self.md5_policy,
        )?;

        let (key, data, decompressed) = maybe_gunzip(req.key, req.body);

        let path = if self.aggregate {
            let path = self.store.aggregate_path(req.bucket, now)?;
            self.store.append(&path, &data).await?;
            path
        } else {
            let path = self.store.object_path(req.bucket, key)?;
            write_object(&path, &data).await?;
            path
        };

        info!(
            bucket = req.bucket,
            key,
            path = %path.display(),
            size = data.len(),
            decompressed,
            aggregated = self.aggregate,
            "stored object"
        );

        Ok(StoredObject {
            path,
            etag,
            size: data.len() as u64,
            decompressed,
            aggregated: self.aggregate,
        })
    }
}

/// Check a body against its declared length and MD5 and return its ETag.
///
/// The ETag is the declared `Content-MD5` when present, else the computed one.
/// A missing header counts as a mismatch.
pub(crate) fn check_body(
    body: &[u8],
    content_length: u64,
    content_md5: Option<&str>,
    policy: Md5Policy,
) -> Result<String, StoreError> {
    let received = body.len() as u64;
    if received != content_length {
        return Err(StoreError::IncompleteBody {
            expected: content_length,
            received,
        });
    }

    let computed = md5_base64(body);
    if content_md5 != Some(computed.as_str()) {
        let err = StoreError::Md5Mismatch {
            declared: content_md5.map(ToOwned::to_owned),
            computed: computed.clone(),
        };
        match policy {
            Md5Policy::Reject => return Err(err),
            Md5Policy::Warn => warn!(error = %err, "accepting body despite MD5 mismatch"),
        }
    }
    Ok(content_md5.map_or(computed, ToOwned::to_owned))
}

/// Gunzip the body of a `.gz` key.
///
/// Returns the key to store under, the bytes to store and whether they were
/// decompressed. Failure keeps the original key and bytes.
fn maybe_gunzip(key: &str, body: Bytes) -> (&str, Bytes, bool) {
    let Some(stem) = key.strip_suffix(GZIP_SUFFIX).filter(|s| !s.is_empty()) else {
        return (key, body, false);
    };

    match gunzip(&body) {
        Ok(data) => {
            debug!(key, compressed = body.len(), size = data.len(), "decompressed gzip body");
            (stem, Bytes::from(data), true)
        }
        Err(err) => {
            warn!(key, error = %err, "storing gzip body as received");
            (key, body, false)
        }
    }
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut decoder = MultiGzDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(StoreError::GzipDecompressFailed)?;
    Ok(out)
}
