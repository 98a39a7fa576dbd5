//! External workbook references and their named ranges

use crate::error::{Result, SheetError};
use crate::relationships::Relationships;
use crate::schema::{REL_NS, SHEET_MAIN_NS};
use crate::xml_writer::XmlWriter;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Write;

/// A named range defined in an external workbook.
///
/// The reference string is carried verbatim; no formula parsing happens
/// on either side of a round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRange {
    pub name: String,
    pub refers_to: String,
}

impl ExternalRange {
    pub fn new(name: &str, refers_to: &str) -> Self {
        ExternalRange {
            name: name.to_string(),
            refers_to: refers_to.to_string(),
        }
    }
}

/// A reference to a workbook outside the current package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBook {
    /// Relationship id inside the external-link part's own relationships
    pub rel_id: String,
    /// Path of the referenced workbook
    pub target: String,
    /// Named ranges published by the referenced workbook
    pub ranges: Vec<ExternalRange>,
}

/// Serialize an external-link part
pub fn write_external_link<W: Write>(book: &ExternalBook, xml: &mut XmlWriter<W>) -> Result<()> {
    xml.declaration()?;
    xml.start_element("externalLink")?;
    xml.attribute("xmlns", SHEET_MAIN_NS)?;
    xml.close_start_tag()?;

    xml.start_element("externalBook")?;
    xml.attribute("xmlns:r", REL_NS)?;
    xml.attribute("r:id", &book.rel_id)?;
    xml.close_start_tag()?;

    xml.start_element("definedNames")?;
    xml.close_start_tag()?;
    for range in &book.ranges {
        xml.start_element("definedName")?;
        xml.attribute("name", &range.name)?;
        xml.attribute("refersTo", &range.refers_to)?;
        xml.close_empty()?;
    }
    xml.end_element("definedNames")?;

    xml.end_element("externalBook")?;
    xml.end_element("externalLink")?;
    xml.flush()?;
    Ok(())
}

/// Parse an external-link part, resolving the book target through the
/// part's own relationships.
///
/// `part` names the owning part, used in error reports when the book's
/// relationship id cannot be resolved.
pub fn parse_external_link(
    xml: &[u8],
    rels: &Relationships,
    part: &str,
) -> Result<ExternalBook> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut rel_id = String::new();
    let mut ranges = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"externalBook" => {
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"r:id" {
                            rel_id = attr.unescape_value()?.to_string();
                        }
                    }
                }
                b"definedName" => {
                    let mut name = String::new();
                    let mut refers_to = String::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"name" => name = attr.unescape_value()?.to_string(),
                            b"refersTo" => refers_to = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }
                    ranges.push(ExternalRange { name, refers_to });
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if rel_id.is_empty() {
        return Err(SheetError::Format(format!(
            "external link part '{}' has no externalBook reference",
            part
        )));
    }

    let target = rels
        .by_id(&rel_id)
        .ok_or_else(|| SheetError::MissingTarget {
            part: part.to_string(),
            id: rel_id.clone(),
        })?
        .target
        .clone();

    Ok(ExternalBook {
        rel_id,
        target,
        ranges,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationships::TargetMode;
    use crate::schema::rel;

    #[test]
    fn test_parse_named_ranges() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<externalLink xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<externalBook xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" r:id="rId1">
<definedNames>
<definedName name="B2range" refersTo="='Sheet1'!$A$1:$A$10"/>
<definedName name="C3" refersTo="='Sheet1'!$B$2"/>
</definedNames>
</externalBook>
</externalLink>"#;

        let mut rels = Relationships::new();
        rels.register(rel::EXTERNAL_LINK_PATH, "book1.xlsx", TargetMode::External);

        let book =
            parse_external_link(xml, &rels, "xl/externalLinks/externalLink1.xml").unwrap();
        assert_eq!(book.rel_id, "rId1");
        assert_eq!(book.target, "book1.xlsx");
        assert_eq!(book.ranges.len(), 2);
        assert_eq!(book.ranges[0].name, "B2range");
        assert_eq!(book.ranges[0].refers_to, "='Sheet1'!$A$1:$A$10");
        assert_eq!(book.ranges[1].name, "C3");
        assert_eq!(book.ranges[1].refers_to, "='Sheet1'!$B$2");
    }

    #[test]
    fn test_roundtrip() {
        let book = ExternalBook {
            rel_id: "rId1".to_string(),
            target: "over/there.xlsx".to_string(),
            ranges: vec![
                ExternalRange::new("r1", "over_there!$A$1:$B$2"),
                ExternalRange::new("r2", "somewhere_else!$C$10:$D$12"),
            ],
        };

        let mut out = Vec::new();
        {
            let mut xml = XmlWriter::new(&mut out);
            write_external_link(&book, &mut xml).unwrap();
        }

        let mut rels = Relationships::new();
        rels.register(
            rel::EXTERNAL_LINK_PATH,
            "over/there.xlsx",
            TargetMode::External,
        );
        let parsed =
            parse_external_link(&out, &rels, "xl/externalLinks/externalLink1.xml").unwrap();
        assert_eq!(parsed, book);
    }

    #[test]
    fn test_unresolvable_book_reference() {
        let xml = br#"<externalLink><externalBook r:id="rId9"/></externalLink>"#;
        let rels = Relationships::new();
        let err = parse_external_link(xml, &rels, "part.xml").unwrap_err();
        assert!(matches!(err, SheetError::MissingTarget { .. }));
    }
}
