//! S3 XML documents for the logrecv endpoint.
//!
//! Only the multipart upload protocol speaks XML:
//!
//! - [`InitiateMultipartUploadResult`] answers `POST ?uploads`.
//! - [`CompleteMultipartUpload`] is the part manifest a client sends with
//!   `POST ?uploadId=ID`.
//! - [`CompleteMultipartUploadResult`] answers that completion.
//! - [`error_to_xml`] renders the `<Error>` body of every failed request.

pub mod deserialize;
pub mod error;
pub mod serialize;
pub mod types;

pub use deserialize::{S3Deserialize, from_xml};
pub use error::{XmlError, error_to_xml};
pub use serialize::{S3_NAMESPACE, S3Serialize, to_xml};
pub use types::{
    CompleteMultipartUpload, CompleteMultipartUploadResult, CompletedPart,
    InitiateMultipartUploadResult,
};
