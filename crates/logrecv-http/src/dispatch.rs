//! Operation dispatch: hands a routed, authenticated request to the object
//! writer or the multipart coordinator and renders the outcome.

use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use logrecv_core::{
    FsStore, MultipartCoordinator, ObjectWriter, PutObject, ReceiverConfig, UploadPart,
};
use logrecv_xml::{
    CompleteMultipartUpload, CompleteMultipartUploadResult, InitiateMultipartUploadResult,
    from_xml,
};
use tracing::debug;

use crate::body::ResponseBody;
use crate::error::{S3Error, S3ErrorCode};
use crate::response::{
    etag_response, no_content_response, status_response, xml_response,
    xml_response_with_location,
};
use crate::router::{Operation, RoutingContext};

/// The ingestion back end the HTTP layer dispatches to.
#[derive(Debug)]
pub struct Receiver {
    objects: ObjectWriter,
    uploads: Arc<MultipartCoordinator>,
}

impl Receiver {
    /// Assemble a receiver from its parts.
    #[must_use]
    pub fn new(objects: ObjectWriter, uploads: Arc<MultipartCoordinator>) -> Self {
        Self { objects, uploads }
    }

    /// Build the object writer and the coordinator over one store rooted at
    /// `config.root_dir`.
    #[must_use]
    pub fn from_config(config: &ReceiverConfig) -> Self {
        let store = Arc::new(FsStore::new(config.root_dir.clone()));
        let objects = ObjectWriter::new(Arc::clone(&store), config.aggregate, config.md5_policy);
        let uploads = Arc::new(MultipartCoordinator::new(store, config));
        Self::new(objects, uploads)
    }

    /// The multipart coordinator, e.g. to start its reaper.
    #[must_use]
    pub fn uploads(&self) -> &Arc<MultipartCoordinator> {
        &self.uploads
    }
}

/// Execute a routed request.
pub async fn dispatch_operation(
    receiver: &Receiver,
    parts: &http::request::Parts,
    body: Bytes,
    ctx: RoutingContext,
) -> Result<http::Response<ResponseBody>, S3Error> {
    debug!(operation = %ctx.operation, bucket = %ctx.bucket, key = %ctx.key, "dispatching operation");

    match ctx.operation {
        Operation::Status => Ok(status_response()),
        Operation::PutObject => {
            let stored = receiver
                .objects
                .put_object(PutObject {
                    bucket: &ctx.bucket,
                    key: &ctx.key,
                    body,
                    content_length: content_length(parts)?,
                    content_md5: header_str(parts, "content-md5"),
                })
                .await?;
            etag_response(&stored.etag)
        }
        Operation::UploadPart {
            upload_id,
            part_number,
        } => {
            let etag = receiver
                .uploads
                .upload_part(UploadPart {
                    upload_id: &upload_id,
                    part_number,
                    body,
                    content_length: content_length(parts)?,
                    content_md5: header_str(parts, "content-md5"),
                })
                .await?;
            etag_response(&etag)
        }
        Operation::CreateMultipartUpload => {
            let initiated = receiver.uploads.initiate(&ctx.bucket, &ctx.key)?;
            xml_response(&InitiateMultipartUploadResult {
                bucket: initiated.bucket,
                key: initiated.key,
                upload_id: initiated.upload_id,
            })
        }
        Operation::CompleteMultipartUpload { upload_id } => {
            let manifest: CompleteMultipartUpload = from_xml(&body)?;
            let part_numbers: Vec<u32> = manifest.parts.iter().map(|p| p.part_number).collect();
            let done = receiver
                .uploads
                .complete(&upload_id, &ctx.bucket, &ctx.key, &part_numbers)
                .await?;
            xml_response_with_location(
                &CompleteMultipartUploadResult {
                    location: done.location.clone(),
                    bucket: done.bucket,
                    key: done.key,
                    etag: done.etag,
                },
                &done.location,
            )
        }
        Operation::AbortMultipartUpload { upload_id } => {
            receiver.uploads.abort(&upload_id).await?;
            Ok(no_content_response())
        }
        Operation::Unsupported => Err(S3Error::not_implemented(format_args!(
            "{} {}",
            parts.method, parts.uri
        ))),
    }
}

/// The declared `Content-Length`; uploads without one are refused.
fn content_length(parts: &http::request::Parts) -> Result<u64, S3Error> {
    parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| S3Error::new(S3ErrorCode::MissingContentLength))
}

fn header_str<'a>(parts: &'a http::request::Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}
