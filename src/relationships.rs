//! Per-part relationship registration, serialization and parsing
//!
//! Every part that references other parts (or external resources) owns one
//! relationship file. Identifiers are assigned as `rId<N>` in registration
//! order and are never reused within a session, even if the resource that
//! registered them is later removed.

use crate::error::Result;
use crate::schema::PKG_REL_NS;
use crate::xml_writer::XmlWriter;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::Write;

/// Whether a relationship points inside or outside the package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    Internal,
    External,
}

/// A single typed, identified reference from one part to another target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Identifier, "rId<N>"
    pub id: String,
    /// Relationship type URI. Unrecognized types are carried verbatim so
    /// they survive a read/write round trip.
    pub rel_type: String,
    /// Target path, relative to the owning part's directory (or an
    /// external URI for [`TargetMode::External`])
    pub target: String,
    pub mode: TargetMode,
}

/// The relationship set of one owning part
#[derive(Debug, Default)]
pub struct Relationships {
    entries: Vec<Relationship>,
    next_id: u32,
}

impl Relationships {
    pub fn new() -> Self {
        Relationships {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a relationship and return its assigned id.
    ///
    /// Ids are strictly increasing from "rId1" with no gaps or reuse.
    pub fn register(&mut self, rel_type: &str, target: &str, mode: TargetMode) -> String {
        let id = format!("rId{}", self.next_id);
        self.next_id += 1;
        self.entries.push(Relationship {
            id: id.clone(),
            rel_type: rel_type.to_string(),
            target: target.to_string(),
            mode,
        });
        id
    }

    /// All entries, in registration order
    pub fn iter(&self) -> std::slice::Iter<'_, Relationship> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove an entry by its id.
    ///
    /// The id counter is not rewound: a removed id is never handed out
    /// again within the session.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|r| r.id != id);
        self.entries.len() != before
    }

    /// Look up an entry by its id
    pub fn by_id(&self, id: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.id == id)
    }

    /// First entry of the given type, if any
    pub fn first_of_type(&self, rel_type: &str) -> Option<&Relationship> {
        self.entries.iter().find(|r| r.rel_type == rel_type)
    }

    /// All entries of the given type, in registration order
    pub fn of_type<'a>(&'a self, rel_type: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.entries.iter().filter(move |r| r.rel_type == rel_type)
    }

    /// Serialize as a relationship part
    pub fn write_xml<W: Write>(&self, xml: &mut XmlWriter<W>) -> Result<()> {
        xml.declaration()?;
        xml.start_element("Relationships")?;
        xml.attribute("xmlns", PKG_REL_NS)?;
        xml.close_start_tag()?;

        for rel in &self.entries {
            xml.start_element("Relationship")?;
            xml.attribute("Id", &rel.id)?;
            xml.attribute("Type", &rel.rel_type)?;
            xml.attribute("Target", &rel.target)?;
            if rel.mode == TargetMode::External {
                xml.attribute("TargetMode", "External")?;
            }
            xml.close_empty()?;
        }

        xml.end_element("Relationships")?;
        xml.flush()?;
        Ok(())
    }

    /// Parse a relationship part.
    ///
    /// Entry order is preserved verbatim and relationship types are kept
    /// as-is whether recognized or not. The id counter resumes past the
    /// highest parsed id so later registrations never collide.
    pub fn parse(xml: &[u8]) -> Result<Self> {
        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(true);
        let mut buf = Vec::new();

        let mut rels = Relationships::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"Relationship" => {
                    let mut id = String::new();
                    let mut rel_type = String::new();
                    let mut target = String::new();
                    let mut mode = TargetMode::Internal;
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"Id" => id = attr.unescape_value()?.to_string(),
                            b"Type" => rel_type = attr.unescape_value()?.to_string(),
                            b"Target" => target = attr.unescape_value()?.to_string(),
                            b"TargetMode" => {
                                if attr.value.as_ref() == b"External" {
                                    mode = TargetMode::External;
                                }
                            }
                            _ => {}
                        }
                    }
                    if let Some(n) = id
                        .strip_prefix("rId")
                        .and_then(|n| n.parse::<u32>().ok())
                    {
                        rels.next_id = rels.next_id.max(n + 1);
                    }
                    rels.entries.push(Relationship {
                        id,
                        rel_type,
                        target,
                        mode,
                    });
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        Ok(rels)
    }

    /// The conventional `.rels` sibling path for a part
    /// ("xl/workbook.xml" -> "xl/_rels/workbook.xml.rels"; the package
    /// root maps to "_rels/.rels")
    pub fn rels_path(part: &str) -> String {
        match part.rfind('/') {
            Some(pos) => format!("{}/_rels/{}.rels", &part[..pos], &part[pos + 1..]),
            None if part.is_empty() => "_rels/.rels".to_string(),
            None => format!("_rels/{}.rels", part),
        }
    }
}
