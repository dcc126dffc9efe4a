//! Response builders.

use http::header::{CONTENT_TYPE, ETAG, HeaderValue, LOCATION};
use logrecv_xml::{S3Serialize, error_to_xml, to_xml};

use crate::body::ResponseBody;
use crate::error::S3Error;

/// Liveness response: `200 OK` with `ok\n`.
#[must_use]
pub fn status_response() -> http::Response<ResponseBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(ResponseBody::from_static("ok\n"))
        .expect("static status response should be valid")
}

/// `200 OK` carrying only an `ETag` header.
pub fn etag_response(etag: &str) -> Result<http::Response<ResponseBody>, S3Error> {
    let value = HeaderValue::from_str(etag).map_err(S3Error::internal_error)?;
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(ETAG, value)
        .body(ResponseBody::empty())
        .map_err(S3Error::internal_error)
}

/// `204 No Content`.
#[must_use]
pub fn no_content_response() -> http::Response<ResponseBody> {
    http::Response::builder()
        .status(http::StatusCode::NO_CONTENT)
        .body(ResponseBody::empty())
        .expect("static no-content response should be valid")
}

/// `200 OK` with an XML document.
pub fn xml_response<T: S3Serialize>(value: &T) -> Result<http::Response<ResponseBody>, S3Error> {
    let xml = to_xml(value)?;
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(CONTENT_TYPE, "application/xml")
        .body(ResponseBody::from_bytes(xml))
        .map_err(S3Error::internal_error)
}

/// [`xml_response`] that also sets `Location`.
pub fn xml_response_with_location<T: S3Serialize>(
    value: &T,
    location: &str,
) -> Result<http::Response<ResponseBody>, S3Error> {
    let mut response = xml_response(value)?;
    if let Ok(hv) = HeaderValue::from_str(location) {
        response.headers_mut().insert(LOCATION, hv);
    }
    Ok(response)
}

/// Convert an [`S3Error`] into an XML error response.
#[must_use]
pub fn error_to_response(err: &S3Error, request_id: &str) -> http::Response<ResponseBody> {
    let xml_bytes = error_to_xml(
        err.code.as_str(),
        &err.message,
        err.resource.as_deref(),
        request_id,
    );

    http::Response::builder()
        .status(err.status_code)
        .header(CONTENT_TYPE, "application/xml")
        .body(ResponseBody::from_bytes(xml_bytes))
        .unwrap_or_else(|_| {
            http::Response::builder()
                .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                .body(ResponseBody::empty())
                .expect("static response should be valid")
        })
}
