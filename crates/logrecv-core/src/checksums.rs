//! MD5 helpers for `Content-MD5` checks and ETags.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use digest::Digest;

/// Base64 MD5 of `data`, the encoding used by the `Content-MD5` header.
///
/// # Examples
///
/// ```
/// use logrecv_core::checksums::md5_base64;
///
/// assert_eq!(md5_base64(b"hello"), "XUFAKrxLKna5cZ2REBfFkg==");
/// ```
#[must_use]
pub fn md5_base64(data: &[u8]) -> String {
    BASE64_STANDARD.encode(md5::Md5::digest(data))
}

/// Quoted hex form of a digest, the ETag form S3 clients expect.
///
/// # Examples
///
/// ```
/// use logrecv_core::checksums::quoted_etag;
///
/// assert_eq!(quoted_etag(&[0xab, 0x01]), "\"ab01\"");
/// ```
#[must_use]
pub fn quoted_etag(digest: &[u8]) -> String {
    format!("\"{}\"", hex::encode(digest))
}

/// Incremental MD5 over a sequence of chunks.
#[derive(Clone, Default)]
pub struct Md5Hasher(md5::Md5);

impl std::fmt::Debug for Md5Hasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Md5Hasher").finish_non_exhaustive()
    }
}

impl Md5Hasher {
    /// Create an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed another chunk.
    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    /// Finish and return the quoted hex ETag.
    #[must_use]
    pub fn finish_etag(self) -> String {
        quoted_etag(&self.0.finalize())
    }
}
