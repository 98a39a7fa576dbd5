//! Shared string table for string deduplication

use crate::error::Result;
use crate::schema::SHEET_MAIN_NS;
use crate::xml_writer::XmlWriter;
use indexmap::IndexSet;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Write;

/// Shared string table that deduplicates strings across the workbook.
///
/// Interning is insertion-ordered: the first occurrence of a string decides
/// its index and indices never change afterwards, so indices already written
/// into worksheet parts stay valid for the whole session.
#[derive(Debug, Default)]
pub struct SharedStrings {
    strings: IndexSet<String>,
}

impl SharedStrings {
    pub fn new() -> Self {
        SharedStrings {
            strings: IndexSet::with_capacity(1000),
        }
    }

    /// Add a string and get its index
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(index) = self.strings.get_index_of(s) {
            return index as u32;
        }
        self.strings.insert_full(s.to_string()).0 as u32
    }

    /// Look up a string by index
    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get_index(index as usize).map(|s| s.as_str())
    }

    /// Get number of unique strings
    pub fn count(&self) -> usize {
        self.strings.len()
    }

    /// Write the shared string table part
    pub fn write_xml<W: Write>(&self, writer: &mut XmlWriter<W>) -> Result<()> {
        writer.declaration()?;

        writer.start_element("sst")?;
        writer.attribute("xmlns", SHEET_MAIN_NS)?;
        writer.attribute_int("count", self.strings.len() as i64)?;
        writer.attribute_int("uniqueCount", self.strings.len() as i64)?;
        writer.close_start_tag()?;

        for s in &self.strings {
            writer.start_element("si")?;
            writer.close_start_tag()?;

            writer.start_element("t")?;
            if s.starts_with(char::is_whitespace) || s.ends_with(char::is_whitespace) {
                writer.attribute("xml:space", "preserve")?;
            }
            writer.close_start_tag()?;
            writer.write_escaped(s)?;
            writer.end_element("t")?;

            writer.end_element("si")?;
        }

        writer.end_element("sst")?;
        writer.flush()?;
        Ok(())
    }

    /// Parse a shared string table part.
    ///
    /// Rich-text entries (`<si><r><t>..</t></r>..</si>`) are flattened by
    /// concatenating their runs; plain entries keep their text verbatim.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        let mut buf = Vec::new();

        let mut table = SharedStrings::new();
        let mut in_text = false;
        let mut current: Option<String> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => match e.name().as_ref() {
                    b"si" => current = Some(String::new()),
                    b"t" if current.is_some() => in_text = true,
                    _ => {}
                },
                Event::Text(e) if in_text => {
                    if let Some(text) = current.as_mut() {
                        text.push_str(&e.unescape()?);
                    }
                }
                Event::End(e) => match e.name().as_ref() {
                    b"t" => in_text = false,
                    b"si" => {
                        if let Some(text) = current.take() {
                            table.strings.insert(text);
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_strings() {
        let mut ss = SharedStrings::new();

        let idx1 = ss.intern("Hello");
        let idx2 = ss.intern("World");
        let idx3 = ss.intern("Hello"); // Duplicate

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(idx3, 0); // Should return same index
        assert_eq!(ss.count(), 2);
    }

    #[test]
    fn test_write_and_parse() {
        let mut ss = SharedStrings::new();
        ss.intern("plain");
        ss.intern("with <markup> & entities");
        ss.intern("  padded  ");

        let mut out = Vec::new();
        {
            let mut writer = XmlWriter::new(&mut out);
            ss.write_xml(&mut writer).unwrap();
        }

        let parsed = SharedStrings::parse(&out).unwrap();
        assert_eq!(parsed.count(), 3);
        assert_eq!(parsed.get(0), Some("plain"));
        assert_eq!(parsed.get(1), Some("with <markup> & entities"));
        assert_eq!(parsed.get(2), Some("  padded  "));
    }

    #[test]
    fn test_parse_rich_text_runs() {
        let xml = br#"<?xml version="1.0"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="1" uniqueCount="1">
<si><r><t>bold</t></r><r><t> and plain</t></r></si>
</sst>"#;
        let parsed = SharedStrings::parse(xml).unwrap();
        assert_eq!(parsed.get(0), Some("bold and plain"));
    }
}
