//! Object ingestion for the logrecv S3 endpoint.
//!
//! This crate owns everything that happens after a request was authenticated:
//!
//! - [`object::ObjectWriter`] persists single-request uploads, with gzip
//!   decompression and optional per-day aggregation.
//! - [`multipart::MultipartCoordinator`] tracks multipart sessions, stages
//!   their parts and assembles the final object.
//! - [`storage::FsStore`] maps bucket paths and keys below the root directory
//!   and provides the atomic write and serialized append primitives both use.

pub mod checksums;
pub mod config;
pub mod error;
pub mod multipart;
pub mod object;
pub mod storage;

pub use config::{Md5Policy, ReceiverConfig};
pub use error::StoreError;
pub use multipart::{
    CompletedUpload, InitiatedUpload, MultipartCoordinator, ReapStats, UploadPart,
};
pub use object::{ObjectWriter, PutObject, StoredObject};
pub use storage::FsStore;
