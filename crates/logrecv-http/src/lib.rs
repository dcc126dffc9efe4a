//! HTTP layer of the logrecv S3 endpoint.
//!
//! - **Routing** ([`router`]): identifies the operation from method and query
//!   and splits the path into bucket and key.
//! - **Dispatch** ([`dispatch`]): runs the operation against the object writer
//!   or the multipart coordinator.
//! - **Responses** ([`response`]): ETag acknowledgements, XML documents and
//!   `<Error>` bodies.
//! - **Service** ([`service`]): the hyper [`ReceiverService`](service::ReceiverService)
//!   tying authentication, routing and dispatch together.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> ReceiverService (hyper Service)
//!     -> GET liveness probe (no auth)
//!     -> SigV4 claim parsing
//!     -> Body collection (read timeout)
//!     -> SigV4 verification
//!     -> resolve (operation, bucket, key)
//!     -> dispatch_operation (ObjectWriter | MultipartCoordinator)
//!     -> Common response headers (x-amz-request-id, Server)
//!   <- HTTP Response
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use logrecv_core::ReceiverConfig;
//! use logrecv_http::{HttpConfig, Receiver, ReceiverService};
//!
//! let receiver = Receiver::from_config(&ReceiverConfig::default());
//! let service = ReceiverService::new(receiver, HttpConfig::default());
//! // Serve `service` with hyper.
//! ```

// S3Error carries an optional boxed source next to its strings; boxing the
// whole error in every Result buys nothing on this path.
#![allow(clippy::result_large_err)]

pub mod body;
pub mod dispatch;
pub mod error;
pub mod response;
pub mod router;
pub mod service;

pub use body::ResponseBody;
pub use dispatch::{Receiver, dispatch_operation};
pub use error::{S3Error, S3ErrorCode};
pub use router::{Operation, RoutingContext, resolve};
pub use service::{HttpConfig, ReceiverService};
