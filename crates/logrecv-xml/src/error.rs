//! XML error types and the S3 `<Error>` document.

use std::io;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

/// Errors that can occur while reading or writing XML.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// An I/O error during XML writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An error from the underlying quick-xml library.
    #[error("XML processing error: {0}")]
    QuickXml(#[from] quick_xml::Error),

    /// A required XML element was missing.
    #[error("missing required XML element: {0}")]
    MissingElement(String),

    /// The document ended or nested in an unexpected place.
    #[error("unexpected XML element: {0}")]
    UnexpectedElement(String),

    /// Element text could not be parsed into the expected value.
    #[error("failed to parse value: {0}")]
    ParseError(String),
}

/// Format an S3 error document.
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Error>
///   <Code>SignatureDoesNotMatch</Code>
///   <Message>signature does not match</Message>
///   <Resource>/20210503/file.log</Resource>
///   <RequestId>4442587FB7D0A2F9</RequestId>
/// </Error>
/// ```
pub fn error_to_xml(
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    if let Err(e) = write_error_xml(&mut buf, code, message, resource, request_id) {
        tracing::error!(error = %e, "failed to serialize S3 error XML");
        buf.clear();
    }
    buf
}

fn write_error_xml(
    buf: &mut Vec<u8>,
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> io::Result<()> {
    let mut writer = Writer::new(buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.create_element("Error").write_inner_content(|w| {
        w.create_element("Code")
            .write_text_content(BytesText::new(code))?;
        w.create_element("Message")
            .write_text_content(BytesText::new(message))?;
        if let Some(res) = resource {
            w.create_element("Resource")
                .write_text_content(BytesText::new(res))?;
        }
        w.create_element("RequestId")
            .write_text_content(BytesText::new(request_id))?;
        Ok(())
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_format_error_with_resource() {
        let xml = error_to_xml(
            "SignatureDoesNotMatch",
            "signature does not match",
            Some("/20210503/file.log"),
            "req-1",
        );
        let xml = std::str::from_utf8(&xml).expect("valid UTF-8");

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Code>SignatureDoesNotMatch</Code>"));
        assert!(xml.contains("<Message>signature does not match</Message>"));
        assert!(xml.contains("<Resource>/20210503/file.log</Resource>"));
        assert!(xml.contains("<RequestId>req-1</RequestId>"));
    }

    #[test]
    fn test_should_omit_missing_resource() {
        let xml = error_to_xml("InternalError", "disk full", None, "req-2");
        let xml = std::str::from_utf8(&xml).expect("valid UTF-8");

        assert!(xml.contains("<Code>InternalError</Code>"));
        assert!(!xml.contains("<Resource>"));
    }

    #[test]
    fn test_should_escape_markup_in_messages() {
        let xml = error_to_xml("InvalidArgument", "part <0> & more", Some("/a&b"), "req-3");
        let xml = std::str::from_utf8(&xml).expect("valid UTF-8");

        assert!(xml.contains("part &lt;0&gt; &amp; more"));
        assert!(xml.contains("/a&amp;b"));
    }
}
