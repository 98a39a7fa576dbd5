//! Package reader: opens the archive and streams parts on demand

use crate::content_types::ContentTypes;
use crate::error::{Result, SheetError};
use crate::external::{parse_external_link, ExternalBook};
use crate::relationships::Relationships;
use crate::schema::{part, rel};
use crate::shared_strings::SharedStrings;
use crate::styles::{parse_stylesheet, FormatTable};
use crate::worksheet::RowIter;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::result::ZipError;
use zip::ZipArchive;

/// Row iterator over a lazily decompressed worksheet part
pub type SheetRows<'a> = RowIter<'a, BufReader<Box<dyn Read + 'a>>>;

/// One worksheet as declared by the workbook part
#[derive(Debug, Clone)]
pub struct SheetInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
    /// Archive path of the worksheet part
    pub part: String,
}

/// Read-session package assembler.
///
/// Opening the package loads the content-types declaration, the
/// relationship graph, the workbook metadata and the shared style/string
/// tables. Worksheet parts are only decompressed when their rows are
/// actually requested.
pub struct PackageReader {
    archive: ZipArchive<BufReader<File>>,
    content_types: ContentTypes,
    package_rels: Relationships,
    workbook_rels: Relationships,
    workbook_part: String,
    sheets: Vec<SheetInfo>,
    defined_names: Vec<(String, String)>,
    external_rel_ids: Vec<String>,
    strings: SharedStrings,
    formats: FormatTable,
}

impl PackageReader {
    /// Open a package for reading.
    ///
    /// A missing workbook part (or content-types / root-relationships
    /// part) is fatal. A missing styles part falls back to the implicit
    /// default format table; a missing shared-string part to an empty
    /// table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let content_types =
            ContentTypes::parse(&read_required(&mut archive, part::CONTENT_TYPES)?)?;
        let package_rels =
            Relationships::parse(&read_required(&mut archive, part::ROOT_RELS)?)?;

        let workbook_part = package_rels
            .first_of_type(rel::OFFICE_DOCUMENT)
            .map(|r| r.target.trim_start_matches('/').to_string())
            .ok_or_else(|| SheetError::MissingPart(part::WORKBOOK.to_string()))?;
        let workbook_xml = read_optional(&mut archive, &workbook_part)?
            .ok_or_else(|| SheetError::MissingPart(workbook_part.clone()))?;

        let workbook_rels =
            match read_optional(&mut archive, &Relationships::rels_path(&workbook_part))? {
                Some(bytes) => Relationships::parse(&bytes)?,
                None => Relationships::new(),
            };

        let (declared, defined_names, external_rel_ids) = parse_workbook(&workbook_xml)?;
        let mut sheets = Vec::with_capacity(declared.len());
        for (name, sheet_id, rel_id) in declared {
            let target = workbook_rels
                .by_id(&rel_id)
                .map(|r| r.target.clone())
                .ok_or_else(|| SheetError::MissingTarget {
                    part: workbook_part.clone(),
                    id: rel_id.clone(),
                })?;
            sheets.push(SheetInfo {
                name,
                sheet_id,
                rel_id,
                part: resolve_target(&workbook_part, &target),
            });
        }

        let strings_part = workbook_rels
            .first_of_type(rel::SHARED_STRINGS)
            .map(|r| resolve_target(&workbook_part, &r.target))
            .unwrap_or_else(|| part::SHARED_STRINGS.to_string());
        let strings = match read_optional(&mut archive, &strings_part)? {
            Some(bytes) => SharedStrings::parse(&bytes)?,
            None => SharedStrings::new(),
        };

        let styles_part = workbook_rels
            .first_of_type(rel::STYLES)
            .map(|r| resolve_target(&workbook_part, &r.target))
            .unwrap_or_else(|| part::STYLES.to_string());
        let formats = match read_optional(&mut archive, &styles_part)? {
            Some(bytes) => parse_stylesheet(&bytes)?,
            None => FormatTable::new(),
        };

        Ok(PackageReader {
            archive,
            content_types,
            package_rels,
            workbook_rels,
            workbook_part,
            sheets,
            defined_names,
            external_rel_ids,
            strings,
            formats,
        })
    }

    /// Get list of sheet names in workbook order
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|s| s.name.clone()).collect()
    }

    /// Worksheet declarations in workbook order
    pub fn sheets(&self) -> &[SheetInfo] {
        &self.sheets
    }

    /// Workbook-level defined names as (name, reference) pairs
    pub fn defined_names(&self) -> &[(String, String)] {
        &self.defined_names
    }

    /// The session's format table
    pub fn formats(&self) -> &FormatTable {
        &self.formats
    }

    /// The session's shared string table
    pub fn shared_strings(&self) -> &SharedStrings {
        &self.strings
    }

    /// The package's content-type declaration
    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    /// The package-level relationship set
    pub fn package_rels(&self) -> &Relationships {
        &self.package_rels
    }

    /// Stream the rows of a worksheet by name.
    ///
    /// The part is decompressed lazily while the iterator advances.
    pub fn rows(&mut self, sheet_name: &str) -> Result<SheetRows<'_>> {
        let info = self
            .sheets
            .iter()
            .find(|s| s.name == sheet_name)
            .cloned()
            .ok_or_else(|| SheetError::SheetNotFound {
                sheet: sheet_name.to_string(),
                available: self.sheet_names().join(", "),
            })?;

        let entry = match self.archive.by_name(&info.part) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => {
                return Err(SheetError::MissingTarget {
                    part: self.workbook_part.clone(),
                    id: info.rel_id,
                })
            }
            Err(e) => return Err(e.into()),
        };
        let stream: Box<dyn Read + '_> = Box::new(entry);

        Ok(RowIter::new(
            BufReader::with_capacity(64 * 1024, stream),
            &self.strings,
            Some(&self.formats),
        ))
    }

    /// Stream the rows of a worksheet by zero-based index
    pub fn rows_by_index(&mut self, index: usize) -> Result<SheetRows<'_>> {
        let name = self
            .sheets
            .get(index)
            .map(|s| s.name.clone())
            .ok_or_else(|| SheetError::SheetNotFound {
                sheet: format!("index {}", index),
                available: self.sheet_names().join(", "),
            })?;
        self.rows(&name)
    }

    /// Load every external workbook reference with its named ranges
    pub fn external_books(&mut self) -> Result<Vec<ExternalBook>> {
        let ids = self.external_rel_ids.clone();
        let mut books = Vec::with_capacity(ids.len());
        for id in ids {
            let target = self
                .workbook_rels
                .by_id(&id)
                .map(|r| r.target.clone())
                .ok_or_else(|| SheetError::MissingTarget {
                    part: self.workbook_part.clone(),
                    id: id.clone(),
                })?;
            let link_part = resolve_target(&self.workbook_part, &target);

            let bytes = read_optional(&mut self.archive, &link_part)?.ok_or_else(|| {
                SheetError::MissingTarget {
                    part: self.workbook_part.clone(),
                    id: id.clone(),
                }
            })?;
            let link_rels =
                match read_optional(&mut self.archive, &Relationships::rels_path(&link_part))? {
                    Some(rels_bytes) => Relationships::parse(&rels_bytes)?,
                    None => Relationships::new(),
                };

            books.push(parse_external_link(&bytes, &link_rels, &link_part)?);
        }
        Ok(books)
    }
}

/// Resolve a relationship target against the directory of its owning part
fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let dir = base_part
        .rfind('/')
        .map(|pos| &base_part[..pos])
        .unwrap_or("");
    let mut segments: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

fn read_optional(
    archive: &mut ZipArchive<BufReader<File>>,
    name: &str,
) -> Result<Option<Vec<u8>>> {
    match archive.by_name(name) {
        Ok(mut entry) => {
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut buf)?;
            Ok(Some(buf))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_required(archive: &mut ZipArchive<BufReader<File>>, name: &str) -> Result<Vec<u8>> {
    read_optional(archive, name)?.ok_or_else(|| SheetError::MissingPart(name.to_string()))
}

type DeclaredSheet = (String, u32, String);

/// Pull sheet declarations, defined names and external references out of
/// the workbook part
fn parse_workbook(xml: &[u8]) -> Result<(Vec<DeclaredSheet>, Vec<(String, String)>, Vec<String>)> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut sheets = Vec::new();
    let mut defined_names = Vec::new();
    let mut external_ids = Vec::new();
    let mut current_name: Option<String> = None;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => match e.name().as_ref() {
                b"sheet" => {
                    let mut name = String::new();
                    let mut sheet_id = 0u32;
                    let mut rel_id = String::new();
                    for attr in e.attributes() {
                        let attr = attr?;
                        match attr.key.as_ref() {
                            b"name" => name = attr.unescape_value()?.to_string(),
                            b"sheetId" => {
                                sheet_id =
                                    attr.unescape_value()?.parse().map_err(|_| {
                                        SheetError::Format("invalid sheetId".to_string())
                                    })?
                            }
                            b"r:id" => rel_id = attr.unescape_value()?.to_string(),
                            _ => {}
                        }
                    }
                    if rel_id.is_empty() {
                        return Err(SheetError::Format(format!(
                            "sheet '{}' has no relationship id",
                            name
                        )));
                    }
                    sheets.push((name, sheet_id, rel_id));
                }
                b"definedName" => {
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"name" {
                            current_name = Some(attr.unescape_value()?.to_string());
                        }
                    }
                }
                b"externalReference" => {
                    for attr in e.attributes() {
                        let attr = attr?;
                        if attr.key.as_ref() == b"r:id" {
                            external_ids.push(attr.unescape_value()?.to_string());
                        }
                    }
                }
                _ => current_name = None,
            },
            Event::Text(ref e) => {
                if let Some(name) = current_name.take() {
                    defined_names.push((name, e.unescape()?.to_string()));
                }
            }
            Event::End(ref e) => {
                if e.name().as_ref() == b"definedName" {
                    // a definedName without text is dropped
                    current_name = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok((sheets, defined_names, external_ids))
}
