//! Canonical request construction for AWS Signature Version 4.
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Every line of `CanonicalHeaders` is itself newline-terminated, so the block is
//! followed by an empty line in the final string. All functions here are pure: the
//! same request in any header or parameter order yields the same bytes.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, percent_encode};

/// Characters left alone in query keys and values: the RFC 3986 unreserved set.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters left alone in the path: the unreserved set plus `/`.
const PATH_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

/// Build the full canonical request string from its components.
///
/// `headers` holds the already resolved values of the signed headers. A name may
/// appear more than once; its values are joined with `,` in the given order.
///
/// # Examples
///
/// ```
/// use logrecv_auth::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "GET",
///     "/test.txt",
///     "",
///     &[("host", "examplebucket.s3.amazonaws.com")],
///     &["host"],
///     "UNSIGNED-PAYLOAD",
/// );
/// assert_eq!(
///     canonical,
///     "GET\n/test.txt\n\nhost:examplebucket.s3.amazonaws.com\n\nhost\nUNSIGNED-PAYLOAD"
/// );
/// ```
#[must_use]
pub fn build_canonical_request(
    method: &str,
    path: &str,
    query: &str,
    headers: &[(&str, &str)],
    signed_headers: &[&str],
    payload_hash: &str,
) -> String {
    [
        method.to_owned(),
        build_canonical_uri(path),
        build_canonical_query_string(query),
        build_canonical_headers(headers),
        build_signed_headers_string(signed_headers),
        payload_hash.to_owned(),
    ]
    .join("\n")
}

/// Build the canonical URI from a raw request path.
///
/// The path is percent-decoded first. A decoded path made only of
/// `[A-Za-z0-9-_.~/]` is used as is; anything else is re-encoded byte by byte,
/// keeping unreserved characters and `/`.
///
/// # Examples
///
/// ```
/// use logrecv_auth::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri("/20210503/file.log.gz"), "/20210503/file.log.gz");
/// assert_eq!(build_canonical_uri("/test%24file.text"), "/test%24file.text");
/// assert_eq!(build_canonical_uri("/my file"), "/my%20file");
/// assert_eq!(build_canonical_uri(""), "/");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }

    let decoded: Vec<u8> = percent_decode_str(path).collect();
    if decoded.iter().all(|b| is_safe_path_byte(*b)) {
        return String::from_utf8_lossy(&decoded).into_owned();
    }

    percent_encode(&decoded, PATH_ENCODE_SET).to_string()
}

/// Build the canonical query string.
///
/// Parameters are decoded (`+` means space), re-encoded with the unreserved set so
/// a space becomes `%20`, then sorted by encoded key and, for equal keys, by
/// encoded value. Parameters without a value are rendered as `key=`.
///
/// # Examples
///
/// ```
/// use logrecv_auth::canonical::build_canonical_query_string;
///
/// assert_eq!(build_canonical_query_string(""), "");
/// assert_eq!(build_canonical_query_string("uploads"), "uploads=");
/// assert_eq!(build_canonical_query_string("prefix=J&max-keys=2"), "max-keys=2&prefix=J");
/// assert_eq!(build_canonical_query_string("q=a+b"), "q=a%20b");
/// ```
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    let mut params: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (encode_query_component(&k), encode_query_component(&v)))
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers block.
///
/// Names are lowercased; values are trimmed with inner whitespace runs collapsed to
/// one space, and repeated names are joined with `,`. Lines are sorted by name and
/// each ends with `\n`.
///
/// # Examples
///
/// ```
/// use logrecv_auth::canonical::build_canonical_headers;
///
/// let block = build_canonical_headers(&[
///     ("X-Amz-Date", "20130524T000000Z"),
///     ("Host", "  example.com "),
/// ]);
/// assert_eq!(block, "host:example.com\nx-amz-date:20130524T000000Z\n");
/// ```
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)]) -> String {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let trimmed_value = collapse_whitespace(value);
        header_map
            .entry(name.to_lowercase())
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&trimmed_value);
            })
            .or_insert(trimmed_value);
    }

    header_map
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect()
}

/// Build the signed headers string: lowercase names, sorted, joined with `;`.
///
/// # Examples
///
/// ```
/// use logrecv_auth::canonical::build_signed_headers_string;
///
/// assert_eq!(
///     build_signed_headers_string(&["x-amz-date", "Host"]),
///     "host;x-amz-date"
/// );
/// ```
#[must_use]
pub fn build_signed_headers_string(signed_headers: &[&str]) -> String {
    let mut sorted: Vec<String> = signed_headers.iter().map(|h| h.to_lowercase()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    sorted.join(";")
}

fn encode_query_component(input: &str) -> String {
    percent_encode(input.as_bytes(), QUERY_ENCODE_SET).to_string()
}

fn is_safe_path_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~' | b'/')
}

/// Trim the value and collapse whitespace runs to a single space.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_keep_safe_path_untouched() {
        assert_eq!(build_canonical_uri("/test.txt"), "/test.txt");
        assert_eq!(build_canonical_uri("/a-b_c.d~e/f"), "/a-b_c.d~e/f");
    }

    #[test]
    fn test_should_encode_reserved_path_characters() {
        assert_eq!(build_canonical_uri("/test$file.text"), "/test%24file.text");
        assert_eq!(build_canonical_uri("/a+b"), "/a%2Bb");
    }

    #[test]
    fn test_should_not_double_encode_path() {
        assert_eq!(build_canonical_uri("/my%20file.log"), "/my%20file.log");
    }

    #[test]
    fn test_should_encode_utf8_path_bytes() {
        assert_eq!(build_canonical_uri("/caf%C3%A9"), "/caf%C3%A9");
        assert_eq!(build_canonical_uri("/café"), "/caf%C3%A9");
    }

    #[test]
    fn test_should_sort_query_params_by_key_then_value() {
        assert_eq!(
            build_canonical_query_string("b=2&a=2&a=1"),
            "a=1&a=2&b=2"
        );
    }

    #[test]
    fn test_should_encode_query_space_as_percent_20() {
        assert_eq!(build_canonical_query_string("k=a%20b"), "k=a%20b");
        assert_eq!(build_canonical_query_string("k=a+b"), "k=a%20b");
    }

    #[test]
    fn test_should_encode_reserved_query_characters() {
        assert_eq!(
            build_canonical_query_string("prefix=logs/2021&x=a*b"),
            "prefix=logs%2F2021&x=a%2Ab"
        );
    }

    #[test]
    fn test_should_render_multipart_queries() {
        assert_eq!(
            build_canonical_query_string("partNumber=3&uploadId=abc"),
            "partNumber=3&uploadId=abc"
        );
        assert_eq!(
            build_canonical_query_string("uploadId=abc&partNumber=3"),
            "partNumber=3&uploadId=abc"
        );
    }

    #[test]
    fn test_should_join_repeated_header_values() {
        let block = build_canonical_headers(&[("x-amz-meta-a", "one"), ("X-Amz-Meta-A", "two")]);
        assert_eq!(block, "x-amz-meta-a:one,two\n");
    }

    #[test]
    fn test_should_collapse_header_whitespace() {
        let block = build_canonical_headers(&[("my-header", "  a   b \t c  ")]);
        assert_eq!(block, "my-header:a b c\n");
    }

    #[test]
    fn test_should_be_independent_of_header_order() {
        let forward = build_canonical_request(
            "PUT",
            "/bucket/key",
            "b=2&a=1",
            &[("host", "h"), ("x-amz-date", "d"), ("content-md5", "m")],
            &["host", "x-amz-date", "content-md5"],
            "UNSIGNED-PAYLOAD",
        );
        let shuffled = build_canonical_request(
            "PUT",
            "/bucket/key",
            "a=1&b=2",
            &[("content-md5", "m"), ("x-amz-date", "d"), ("host", "h")],
            &["content-md5", "host", "x-amz-date"],
            "UNSIGNED-PAYLOAD",
        );
        assert_eq!(forward, shuffled);
    }

    #[test]
    fn test_should_match_aws_get_object_canonical_request() {
        let canonical = build_canonical_request(
            "GET",
            "/test.txt",
            "",
            &[
                ("host", "examplebucket.s3.amazonaws.com"),
                ("range", "bytes=0-9"),
                (
                    "x-amz-content-sha256",
                    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
                ),
                ("x-amz-date", "20130524T000000Z"),
            ],
            &["host", "range", "x-amz-content-sha256", "x-amz-date"],
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        );
        let expected = "GET\n\
            /test.txt\n\
            \n\
            host:examplebucket.s3.amazonaws.com\n\
            range:bytes=0-9\n\
            x-amz-content-sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\n\
            x-amz-date:20130524T000000Z\n\
            \n\
            host;range;x-amz-content-sha256;x-amz-date\n\
            e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(canonical, expected);
    }
}
