//! XML document types.

/// Response body of `POST {path}?uploads`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitiateMultipartUploadResult {
    /// Bucket path the upload targets, leading slash included.
    pub bucket: String,
    /// Object key the upload targets.
    pub key: String,
    /// Identifier for the following part uploads.
    pub upload_id: String,
}

/// Response body of a successful `POST {path}?uploadId=ID`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMultipartUploadResult {
    /// URL of the assembled object.
    pub location: String,
    /// Bucket path of the assembled object.
    pub bucket: String,
    /// Key of the assembled object.
    pub key: String,
    /// Entity tag of the assembled object.
    pub etag: String,
}

/// The ordered part manifest sent to complete an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUpload {
    /// Parts in the order the client wants them joined.
    pub parts: Vec<CompletedPart>,
}

/// One entry of a [`CompleteMultipartUpload`] manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number as used in the `UploadPart` request.
    pub part_number: u32,
    /// Entity tag returned for the part, if the client echoed it.
    pub etag: Option<String>,
}
