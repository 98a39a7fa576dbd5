//! The `[Content_Types].xml` part: default extensions and per-part overrides

use crate::error::Result;
use crate::schema::{content_type, CONTENT_TYPES_NS};
use crate::xml_writer::XmlWriter;
use indexmap::IndexMap;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Write;

/// Content-type declaration for the whole package
#[derive(Debug)]
pub struct ContentTypes {
    defaults: IndexMap<String, String>,
    overrides: IndexMap<String, String>,
}

impl ContentTypes {
    /// A declaration pre-seeded with the two default extensions every
    /// package carries
    pub fn new() -> Self {
        let mut defaults = IndexMap::new();
        defaults.insert("rels".to_string(), content_type::RELATIONSHIPS.to_string());
        defaults.insert("xml".to_string(), content_type::XML.to_string());
        ContentTypes {
            defaults,
            overrides: IndexMap::new(),
        }
    }

    /// An entirely empty declaration, for parsing into
    fn empty() -> Self {
        ContentTypes {
            defaults: IndexMap::new(),
            overrides: IndexMap::new(),
        }
    }

    /// Map a file extension to a content type
    pub fn add_default(&mut self, extension: &str, ct: &str) {
        self.defaults.insert(extension.to_string(), ct.to_string());
    }

    /// Map a single part (leading-slash path) to a content type
    pub fn add_override(&mut self, part_name: &str, ct: &str) {
        self.overrides.insert(part_name.to_string(), ct.to_string());
    }

    /// Drop a previously registered override
    pub fn remove_override(&mut self, part_name: &str) {
        self.overrides.shift_remove(part_name);
    }

    /// Resolve the content type of a part path (without leading slash):
    /// overrides win over extension defaults
    pub fn content_type_of(&self, part: &str) -> Option<&str> {
        let key = format!("/{}", part);
        if let Some(ct) = self.overrides.get(&key) {
            return Some(ct);
        }
        part.rsplit('.')
            .next()
            .and_then(|ext| self.defaults.get(ext))
            .map(|s| s.as_str())
    }

    pub fn write_xml<W: Write>(&self, xml: &mut XmlWriter<W>) -> Result<()> {
        xml.declaration()?;
        xml.start_element("Types")?;
        xml.attribute("xmlns", CONTENT_TYPES_NS)?;
        xml.close_start_tag()?;

        for (ext, ct) in &self.defaults {
            xml.start_element("Default")?;
            xml.attribute("Extension", ext)?;
            xml.attribute("ContentType", ct)?;
            xml.close_empty()?;
        }
        for (part, ct) in &self.overrides {
            xml.start_element("Override")?;
            xml.attribute("PartName", part)?;
            xml.attribute("ContentType", ct)?;
            xml.close_empty()?;
        }

        xml.end_element("Types")?;
        xml.flush()?;
        Ok(())
    }

    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();

        let mut types = ContentTypes::empty();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                    b"Default" => {
                        let mut ext = String::new();
                        let mut ct = String::new();
                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"Extension" => ext = attr.unescape_value()?.to_string(),
                                b"ContentType" => ct = attr.unescape_value()?.to_string(),
                                _ => {}
                            }
                        }
                        types.defaults.insert(ext, ct);
                    }
                    b"Override" => {
                        let mut part = String::new();
                        let mut ct = String::new();
                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"PartName" => part = attr.unescape_value()?.to_string(),
                                b"ContentType" => ct = attr.unescape_value()?.to_string(),
                                _ => {}
                            }
                        }
                        types.overrides.insert(part, ct);
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(types)
    }
}

impl Default for ContentTypes {
    fn default() -> Self {
        Self::new()
    }
}
