//! The receiver's hyper service.
//!
//! [`ReceiverService`] runs every request through the same pipeline:
//!
//! 1. `GET` on any path answers the liveness probe, unauthenticated.
//! 2. The SigV4 claim is parsed from the headers.
//! 3. The body is collected, bounded by a read timeout.
//! 4. The signature is verified against the configured key pair.
//! 5. The request is routed and dispatched.
//! 6. Every response gets `x-amz-request-id` and `Server` headers.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::service::Service;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::body::ResponseBody;
use crate::dispatch::{Receiver, dispatch_operation};
use crate::error::{S3Error, S3ErrorCode};
use crate::response::{error_to_response, status_response};
use crate::router::resolve;

/// Value of the `Server` response header.
pub const SERVER_NAME: &str = "logrecv";

/// Configuration for the HTTP service.
#[derive(Clone)]
pub struct HttpConfig {
    /// The only access key accepted.
    pub access_key: String,
    /// Secret key paired with `access_key`.
    pub secret_key: String,
    /// Log method, URI and headers of every request.
    pub verbose: bool,
    /// Upper bound for receiving a request body.
    pub body_read_timeout: Duration,
}

impl fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpConfig")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("verbose", &self.verbose)
            .field("body_read_timeout", &self.body_read_timeout)
            .finish()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            access_key: "AKIAI44QH8DHBEXAMPLE".to_owned(),
            secret_key: "wJalrXUtnFEMI/K7MDENG/bPxRfiCYEXAMPLEKEY".to_owned(),
            verbose: false,
            body_read_timeout: Duration::from_secs(60),
        }
    }
}

/// hyper service fronting a [`Receiver`].
#[derive(Debug)]
pub struct ReceiverService {
    receiver: Arc<Receiver>,
    config: Arc<HttpConfig>,
}

impl ReceiverService {
    /// Create a service owning `receiver`.
    #[must_use]
    pub fn new(receiver: Receiver, config: HttpConfig) -> Self {
        Self::from_shared(Arc::new(receiver), config)
    }

    /// Create a service from a shared receiver.
    #[must_use]
    pub fn from_shared(receiver: Arc<Receiver>, config: HttpConfig) -> Self {
        Self {
            receiver,
            config: Arc::new(config),
        }
    }

    /// Process one request to completion.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<ResponseBody>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: fmt::Display,
    {
        let request_id = Uuid::new_v4().to_string();
        let response = process_request(req, &self.receiver, &self.config, &request_id).await;
        add_common_headers(response, &request_id)
    }
}

impl Clone for ReceiverService {
    fn clone(&self) -> Self {
        Self {
            receiver: Arc::clone(&self.receiver),
            config: Arc::clone(&self.config),
        }
    }
}

impl<B> Service<http::Request<B>> for ReceiverService
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: fmt::Display,
{
    type Response = http::Response<ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

async fn process_request<B>(
    req: http::Request<B>,
    receiver: &Receiver,
    config: &HttpConfig,
    request_id: &str,
) -> http::Response<ResponseBody>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    let method = req.method().clone();
    let uri = req.uri().clone();
    if config.verbose {
        debug!(%method, %uri, headers = ?req.headers(), request_id, "received request");
    } else {
        debug!(%method, %uri, request_id, "received request");
    }

    if method == http::Method::GET {
        return status_response();
    }

    let (parts, body) = req.into_parts();
    match authenticate_and_dispatch(parts, body, receiver, config, request_id).await {
        Ok(response) => {
            info!(%method, %uri, status = response.status().as_u16(), request_id, "request completed");
            response
        }
        Err(err) => {
            let err = err.with_resource(uri.path());
            if err.is_server_error() {
                error!(%method, %uri, error = %err, source = ?err.source, request_id, "request failed");
            } else {
                warn!(%method, %uri, error = %err, request_id, "request rejected");
            }
            error_to_response(&err, request_id)
        }
    }
}

async fn authenticate_and_dispatch<B>(
    parts: http::request::Parts,
    body: B,
    receiver: &Receiver,
    config: &HttpConfig,
    request_id: &str,
) -> Result<http::Response<ResponseBody>, S3Error>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    let claim = logrecv_auth::parse(&parts)?;
    let body = collect_body(body, config.body_read_timeout).await?;
    logrecv_auth::verify(
        &claim,
        &parts,
        &body,
        &config.secret_key,
        &config.access_key,
    )?;

    let ctx = resolve(&parts.method, &parts.uri)?;
    info!(
        operation = %ctx.operation,
        bucket = %ctx.bucket,
        key = %ctx.key,
        size = body.len(),
        request_id,
        "routed request"
    );

    dispatch_operation(receiver, &parts, body, ctx).await
}

/// Collect the full body, giving up after `limit`.
async fn collect_body<B>(body: B, limit: Duration) -> Result<Bytes, S3Error>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    match tokio::time::timeout(limit, body.collect()).await {
        Ok(Ok(collected)) => Ok(collected.to_bytes()),
        Ok(Err(e)) => Err(S3Error::with_message(
            S3ErrorCode::IncompleteBody,
            format!("failed to read request body: {e}"),
        )),
        Err(_) => Err(S3Error::with_message(
            S3ErrorCode::IncompleteBody,
            "timed out reading request body",
        )),
    }
}

/// Add the headers every response carries.
fn add_common_headers(
    mut response: http::Response<ResponseBody>,
    request_id: &str,
) -> http::Response<ResponseBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = http::header::HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv);
    }
    headers.insert(
        http::header::SERVER,
        http::header::HeaderValue::from_static(SERVER_NAME),
    );
    response
}
