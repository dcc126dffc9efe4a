//! AWS Signature Version 4 verification.
//!
//! Verification is split in two steps so the HTTP layer can report parse failures
//! before it touches the body:
//!
//! 1. [`parse`] reads the `Authorization`, `x-amz-content-sha256` and `x-amz-date`
//!    headers into an [`AuthorizationClaim`].
//! 2. [`verify`] checks the access key, resolves every signed header, rebuilds the
//!    canonical request, derives the signing key and compares signatures in
//!    constant time.

use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::build_canonical_request;
use crate::error::AuthError;

/// The only algorithm supported by this implementation.
const SUPPORTED_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Terminator of every SigV4 credential scope.
const SCOPE_TERMINATOR: &str = "aws4_request";

/// Payload hash value for requests that do not sign their body.
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

type HmacSha256 = Hmac<Sha256>;

/// Everything a request claims about its own signature.
///
/// Parsed once per request by [`parse`] and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationClaim {
    /// The access key ID from the credential scope.
    pub access_key_id: String,
    /// Credential scope date (`YYYYMMDD`).
    pub date: String,
    /// Full request timestamp from `x-amz-date` (`YYYYMMDDTHHMMSSZ`).
    pub timestamp: String,
    /// Region from the credential scope.
    pub region: String,
    /// Service from the credential scope.
    pub service: String,
    /// Signed header names in the order the client listed them.
    pub signed_headers: Vec<String>,
    /// The hex signature the client sent.
    pub signature: String,
    /// Value of the `x-amz-content-sha256` header.
    pub payload_hash: String,
}

impl AuthorizationClaim {
    /// The credential scope string: `date/region/service/aws4_request`.
    #[must_use]
    pub fn scope(&self) -> String {
        format!(
            "{}/{}/{}/{SCOPE_TERMINATOR}",
            self.date, self.region, self.service
        )
    }
}

/// Parse the authentication headers of a request into an [`AuthorizationClaim`].
///
/// # Errors
///
/// - [`AuthError::MissingAuthHeader`] without an `Authorization` header.
/// - [`AuthError::MissingPayloadHashHeader`] without `x-amz-content-sha256`.
/// - [`AuthError::MalformedAuthHeader`] when the header does not follow the
///   SigV4 grammar.
/// - [`AuthError::MissingDateHeader`] without `x-amz-date`.
pub fn parse(parts: &http::request::Parts) -> Result<AuthorizationClaim, AuthError> {
    let auth_header = parts
        .headers
        .get(http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedAuthHeader)?;

    let payload_hash = parts
        .headers
        .get("x-amz-content-sha256")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingPayloadHashHeader)?;

    let mut claim = parse_authorization_header(auth_header)?;

    claim.timestamp = parts
        .headers
        .get("x-amz-date")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AuthError::MissingDateHeader)?
        .to_owned();
    claim.payload_hash = payload_hash.to_owned();

    debug!(
        access_key_id = %claim.access_key_id,
        date = %claim.date,
        region = %claim.region,
        service = %claim.service,
        "parsed SigV4 authorization header"
    );

    Ok(claim)
}

/// Parse an `Authorization` header value.
///
/// The returned claim has empty `timestamp` and `payload_hash`; [`parse`] fills
/// them in from their own headers.
///
/// # Examples
///
/// ```
/// use logrecv_auth::sigv4::parse_authorization_header;
///
/// let claim = parse_authorization_header(
///     "AWS4-HMAC-SHA256 Credential=AKID/20210503/us-east-1/s3/aws4_request, \
///      SignedHeaders=host;x-amz-date, Signature=abcdef0123",
/// )
/// .unwrap();
/// assert_eq!(claim.access_key_id, "AKID");
/// assert_eq!(claim.signed_headers, vec!["host", "x-amz-date"]);
/// ```
pub fn parse_authorization_header(header: &str) -> Result<AuthorizationClaim, AuthError> {
    let (algorithm, rest) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedAuthHeader)?;

    if algorithm != SUPPORTED_ALGORITHM {
        return Err(AuthError::MalformedAuthHeader);
    }

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("Credential=") {
            credential = Some(value);
        } else if let Some(value) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(value);
        } else if let Some(value) = part.strip_prefix("Signature=") {
            signature = Some(value);
        } else {
            return Err(AuthError::MalformedAuthHeader);
        }
    }

    let credential = credential.ok_or(AuthError::MalformedAuthHeader)?;
    let signed_headers = signed_headers.ok_or(AuthError::MalformedAuthHeader)?;
    let signature = signature.ok_or(AuthError::MalformedAuthHeader)?;

    // AKID/date/region/service/aws4_request
    let scope: Vec<&str> = credential.splitn(5, '/').collect();
    let [access_key_id, date, region, service, terminator] = scope.as_slice() else {
        return Err(AuthError::MalformedAuthHeader);
    };
    if access_key_id.is_empty()
        || date.len() != 8
        || !date.bytes().all(|b| b.is_ascii_digit())
        || region.is_empty()
        || service.is_empty()
        || *terminator != SCOPE_TERMINATOR
    {
        return Err(AuthError::MalformedAuthHeader);
    }

    if signed_headers.is_empty() || signed_headers.split(';').any(str::is_empty) {
        return Err(AuthError::MalformedAuthHeader);
    }
    if signature.is_empty() || !signature.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AuthError::MalformedAuthHeader);
    }

    Ok(AuthorizationClaim {
        access_key_id: (*access_key_id).to_owned(),
        date: (*date).to_owned(),
        timestamp: String::new(),
        region: (*region).to_owned(),
        service: (*service).to_owned(),
        signed_headers: signed_headers
            .split(';')
            .map(str::to_ascii_lowercase)
            .collect(),
        signature: signature.to_owned(),
        payload_hash: String::new(),
    })
}

/// Verify a parsed claim against the request it came from.
///
/// `body` is the complete request body as received.
///
/// # Errors
///
/// - [`AuthError::AccessKeyMismatch`] if the claim names another access key.
/// - [`AuthError::UnsignedHeadersError`] if `host` is not signed or a signed header
///   cannot be resolved.
/// - [`AuthError::SignatureMismatch`] if the signatures differ.
pub fn verify(
    claim: &AuthorizationClaim,
    parts: &http::request::Parts,
    body: &[u8],
    secret_key: &str,
    expected_access_key: &str,
) -> Result<(), AuthError> {
    if claim.access_key_id != expected_access_key {
        return Err(AuthError::AccessKeyMismatch(claim.access_key_id.clone()));
    }

    let expected = expected_signature(claim, parts, body, secret_key)?;

    if claim.signature.as_bytes().ct_eq(expected.as_bytes()).into() {
        debug!(access_key_id = %claim.access_key_id, "signature verification succeeded");
        Ok(())
    } else {
        debug!(provided = %claim.signature, "signature mismatch");
        Err(AuthError::SignatureMismatch)
    }
}

/// Compute the signature the request should carry for `claim`'s scope and
/// signed headers.
///
/// # Errors
///
/// Returns [`AuthError::UnsignedHeadersError`] when a signed header cannot be
/// resolved.
pub fn expected_signature(
    claim: &AuthorizationClaim,
    parts: &http::request::Parts,
    body: &[u8],
    secret_key: &str,
) -> Result<String, AuthError> {
    let resolved = resolve_signed_headers(&claim.signed_headers, parts, body.len())?;
    let header_pairs: Vec<(&str, &str)> = resolved
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let signed_refs: Vec<&str> = claim.signed_headers.iter().map(String::as_str).collect();

    let payload_hash = effective_payload_hash(&claim.payload_hash, body);

    let canonical_request = build_canonical_request(
        parts.method.as_str(),
        parts.uri.path(),
        parts.uri.query().unwrap_or(""),
        &header_pairs,
        &signed_refs,
        &payload_hash,
    );

    debug!(canonical_request, "built canonical request");

    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = build_string_to_sign(&claim.timestamp, &claim.scope(), &canonical_hash);

    let signing_key = derive_signing_key(secret_key, &claim.date, &claim.region, &claim.service);
    Ok(compute_signature(&signing_key, &string_to_sign))
}

/// Build the SigV4 string to sign.
///
/// # Examples
///
/// ```
/// use logrecv_auth::sigv4::build_string_to_sign;
///
/// let sts = build_string_to_sign(
///     "20130524T000000Z",
///     "20130524/us-east-1/s3/aws4_request",
///     "7344ae5b7ee6c3e7e6b0fe0640412a37625d1fbfff95c48bbb2dc43964946972",
/// );
/// assert!(sts.starts_with("AWS4-HMAC-SHA256\n20130524T000000Z\n"));
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{SUPPORTED_ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the SigV4 signing key.
///
/// ```text
/// DateKey              = HMAC-SHA256("AWS4" + secret_key, date)
/// DateRegionKey        = HMAC-SHA256(DateKey, region)
/// DateRegionServiceKey = HMAC-SHA256(DateRegionKey, service)
/// SigningKey           = HMAC-SHA256(DateRegionServiceKey, "aws4_request")
/// ```
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, SCOPE_TERMINATOR.as_bytes())
}

/// Hex-encoded HMAC-SHA256 of `data` under `signing_key`.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// SHA-256 of a payload as lowercase hex.
///
/// # Examples
///
/// ```
/// use logrecv_auth::sigv4::hash_payload;
///
/// assert_eq!(
///     hash_payload(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Whether a payload hash header value is a placeholder rather than a digest.
#[must_use]
pub fn is_payload_placeholder(value: &str) -> bool {
    value == UNSIGNED_PAYLOAD || value.starts_with("STREAMING-")
}

/// The payload hash that goes into the canonical request.
///
/// A concrete digest claim is replaced by the digest of the bytes actually
/// received, which binds the signature to the body.
fn effective_payload_hash(claimed: &str, body: &[u8]) -> String {
    if is_payload_placeholder(claimed) {
        claimed.to_owned()
    } else {
        hash_payload(body)
    }
}

/// Resolve the value(s) of every signed header.
///
/// Lookup order: the request header, a query parameter of the same name, then a
/// fixed default for `expect`, `host`, `transfer-encoding` and `content-length`.
fn resolve_signed_headers(
    signed_headers: &[String],
    parts: &http::request::Parts,
    body_len: usize,
) -> Result<Vec<(String, String)>, AuthError> {
    if !signed_headers.iter().any(|h| h == "host") {
        return Err(AuthError::UnsignedHeadersError(
            "host must be a signed header".to_owned(),
        ));
    }

    let query: Vec<(String, String)> =
        form_urlencoded::parse(parts.uri.query().unwrap_or("").as_bytes())
            .into_owned()
            .collect();

    let mut resolved = Vec::with_capacity(signed_headers.len());
    for name in signed_headers {
        let from_headers: Vec<String> = parts
            .headers
            .get_all(name.as_str())
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        if !from_headers.is_empty() {
            resolved.extend(from_headers.into_iter().map(|v| (name.clone(), v)));
            continue;
        }

        let from_query: Vec<&String> = query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v)
            .collect();
        if !from_query.is_empty() {
            resolved.extend(from_query.into_iter().map(|v| (name.clone(), v.clone())));
            continue;
        }

        let default = match name.as_str() {
            "expect" => "100-continue".to_owned(),
            "host" => parts
                .uri
                .authority()
                .map(ToString::to_string)
                .ok_or_else(|| AuthError::UnsignedHeadersError(name.clone()))?,
            // A request that declares encodings carries the header itself.
            "transfer-encoding" => String::new(),
            "content-length" => body_len.to_string(),
            _ => return Err(AuthError::UnsignedHeadersError(name.clone())),
        };
        resolved.push((name.clone(), default));
    }

    Ok(resolved)
}

/// Compute HMAC-SHA256 and return the raw bytes.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
