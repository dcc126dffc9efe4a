//! Parsing of request documents.

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::XmlError;
use crate::types::{CompleteMultipartUpload, CompletedPart};

/// Types parsed from the children of an already opened element.
pub trait S3Deserialize: Sized {
    /// Read child content until the matching end tag.
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError>;
}

/// Parse an XML document whose root element maps to `T`.
///
/// # Examples
///
/// ```
/// use logrecv_xml::{CompleteMultipartUpload, from_xml};
///
/// let manifest: CompleteMultipartUpload = from_xml(
///     b"<CompleteMultipartUpload><Part><PartNumber>1</PartNumber></Part></CompleteMultipartUpload>",
/// )
/// .unwrap();
/// assert_eq!(manifest.parts[0].part_number, 1);
/// ```
pub fn from_xml<T: S3Deserialize>(xml: &[u8]) -> Result<T, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(_) => return T::deserialize_xml(&mut reader),
            Event::Eof => return Err(XmlError::MissingElement("root element".to_owned())),
            _ => {}
        }
    }
}

/// Read the text of the current element and consume its end tag.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&decoded)
                    .map_err(|err| XmlError::ParseError(err.to_string()))?;
                text.push_str(&unescaped);
            }
            Event::End(_) => return Ok(text),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip over an element and all its children.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_owned(),
                ));
            }
            _ => {}
        }
    }
}

fn element_name(e: &quick_xml::events::BytesStart<'_>) -> Result<String, XmlError> {
    std::str::from_utf8(e.name().as_ref())
        .map(ToOwned::to_owned)
        .map_err(|err| XmlError::ParseError(err.to_string()))
}

impl S3Deserialize for CompletedPart {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut part_number = None;
        let mut etag = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match element_name(&e)?.as_str() {
                    "PartNumber" => {
                        let text = read_text_content(reader)?;
                        let number = text.trim().parse::<u32>().map_err(|err| {
                            XmlError::ParseError(format!("invalid PartNumber '{text}': {err}"))
                        })?;
                        part_number = Some(number);
                    }
                    "ETag" => etag = Some(read_text_content(reader)?),
                    _ => skip_element(reader)?,
                },
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in Part".to_owned(),
                    ));
                }
                _ => {}
            }
        }

        Ok(CompletedPart {
            part_number: part_number
                .ok_or_else(|| XmlError::MissingElement("PartNumber".to_owned()))?,
            etag,
        })
    }
}

impl S3Deserialize for CompleteMultipartUpload {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut parts = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    if element_name(&e)? == "Part" {
                        parts.push(CompletedPart::deserialize_xml(reader)?);
                    } else {
                        skip_element(reader)?;
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(XmlError::UnexpectedElement(
                        "unexpected EOF in CompleteMultipartUpload".to_owned(),
                    ));
                }
                _ => {}
            }
        }

        Ok(CompleteMultipartUpload { parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_parse_manifest_in_document_order() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
            <CompleteMultipartUpload xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
              <Part><PartNumber>3</PartNumber><ETag>c</ETag></Part>
              <Part><ETag>a</ETag><PartNumber>1</PartNumber></Part>
              <Part><PartNumber>2</PartNumber></Part>
            </CompleteMultipartUpload>"#;

        let manifest: CompleteMultipartUpload = from_xml(xml).unwrap();
        let numbers: Vec<u32> = manifest.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![3, 1, 2]);
        assert_eq!(manifest.parts[0].etag.as_deref(), Some("c"));
        assert_eq!(manifest.parts[1].etag.as_deref(), Some("a"));
        assert_eq!(manifest.parts[2].etag, None);
    }

    #[test]
    fn test_should_skip_unknown_elements() {
        let xml = b"<CompleteMultipartUpload>\
            <Part><PartNumber>1</PartNumber><ChecksumCRC32>x</ChecksumCRC32></Part>\
            <Extra><Nested>y</Nested></Extra>\
            </CompleteMultipartUpload>";

        let manifest: CompleteMultipartUpload = from_xml(xml).unwrap();
        assert_eq!(manifest.parts.len(), 1);
        assert_eq!(manifest.parts[0].part_number, 1);
    }

    #[test]
    fn test_should_parse_empty_manifest() {
        let manifest: CompleteMultipartUpload =
            from_xml(b"<CompleteMultipartUpload></CompleteMultipartUpload>").unwrap();
        assert!(manifest.parts.is_empty());
    }

    #[test]
    fn test_should_reject_part_without_number() {
        let result: Result<CompleteMultipartUpload, _> =
            from_xml(b"<CompleteMultipartUpload><Part><ETag>a</ETag></Part></CompleteMultipartUpload>");
        assert!(matches!(result, Err(XmlError::MissingElement(_))));
    }

    #[test]
    fn test_should_reject_non_numeric_part_number() {
        let result: Result<CompleteMultipartUpload, _> = from_xml(
            b"<CompleteMultipartUpload><Part><PartNumber>one</PartNumber></Part></CompleteMultipartUpload>",
        );
        assert!(matches!(result, Err(XmlError::ParseError(_))));
    }

    #[test]
    fn test_should_reject_empty_document() {
        let result: Result<CompleteMultipartUpload, _> = from_xml(b"");
        assert!(matches!(result, Err(XmlError::MissingElement(_))));
    }

    #[test]
    fn test_should_reject_truncated_document() {
        let result: Result<CompleteMultipartUpload, _> =
            from_xml(b"<CompleteMultipartUpload><Part><PartNumber>1</PartNumber>");
        assert!(result.is_err());
    }
}
