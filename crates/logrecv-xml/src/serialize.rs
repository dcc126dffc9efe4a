//! Serialization of response documents.
//!
//! Every document gets the `<?xml version="1.0" encoding="UTF-8"?>` declaration and
//! a root element in the S3 namespace.

use std::io::{self, Write};

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesText, Event};

use crate::error::XmlError;
use crate::types::{CompleteMultipartUploadResult, InitiateMultipartUploadResult};

/// The S3 XML namespace.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Types that write themselves as the children of a root element.
pub trait S3Serialize {
    /// Root element name of the document.
    const ROOT: &'static str;

    /// Write this value's child elements.
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()>;
}

/// Serialize a value as a complete S3 XML document.
///
/// # Examples
///
/// ```
/// use logrecv_xml::{InitiateMultipartUploadResult, to_xml};
///
/// let xml = to_xml(&InitiateMultipartUploadResult {
///     bucket: "/20210503".to_owned(),
///     key: "file.log".to_owned(),
///     upload_id: "abc".to_owned(),
/// })
/// .unwrap();
/// let xml = String::from_utf8(xml).unwrap();
/// assert!(xml.contains("<UploadId>abc</UploadId>"));
/// ```
pub fn to_xml<T: S3Serialize>(value: &T) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::with_capacity(256);
    let mut writer = Writer::new(&mut buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer
        .create_element(T::ROOT)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| value.serialize_xml(w))?;

    Ok(buf)
}

/// Write a simple `<tag>text</tag>` element.
fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

impl S3Serialize for InitiateMultipartUploadResult {
    const ROOT: &'static str = "InitiateMultipartUploadResult";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "UploadId", &self.upload_id)
    }
}

impl S3Serialize for CompleteMultipartUploadResult {
    const ROOT: &'static str = "CompleteMultipartUploadResult";

    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        write_text_element(writer, "Location", &self.location)?;
        write_text_element(writer, "Bucket", &self.bucket)?;
        write_text_element(writer, "Key", &self.key)?;
        write_text_element(writer, "ETag", &self.etag)
    }
}
