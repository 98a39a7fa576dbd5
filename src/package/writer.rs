//! Package writer: assembles committed parts into the final archive

use crate::content_types::ContentTypes;
use crate::error::{Result, SheetError};
use crate::external::{write_external_link, ExternalBook, ExternalRange};
use crate::relationships::{Relationships, TargetMode};
use crate::schema::{content_type, part, rel, REL_NS, SHEET_MAIN_NS};
use crate::shared_strings::SharedStrings;
use crate::styles::{write_stylesheet, CellFormat, FormatTable};
use crate::types::SheetLayout;
use crate::worksheet::SheetWriter;
use crate::xml_writer::XmlWriter;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const CORE_PROPS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>sheetstream</dc:creator>
<cp:lastModifiedBy>sheetstream</cp:lastModifiedBy>
<dcterms:created xsi:type="dcterms:W3CDTF">2024-01-01T00:00:00Z</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">2024-01-01T00:00:00Z</dcterms:modified>
</cp:coreProperties>"#;

const APP_PROPS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>sheetstream</Application>
<DocSecurity>0</DocSecurity>
<ScaleCrop>false</ScaleCrop>
<LinksUpToDate>false</LinksUpToDate>
<SharedDoc>false</SharedDoc>
<HyperlinksChanged>false</HyperlinksChanged>
<AppVersion>1.0</AppVersion>
</Properties>"#;

#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    part: String,
    rel_id: String,
}

/// Write-session package assembler.
///
/// Each part is built in its own buffer and committed to the archive whole,
/// so an aborted sheet stream never leaves a half-written part behind. The
/// format table, shared string table and relationship sets all live for
/// exactly this one session.
pub struct PackageWriter {
    zip: ZipWriter<BufWriter<File>>,
    content_types: ContentTypes,
    formats: FormatTable,
    /// Taken by the active sheet writer, restored on finish/abandon
    strings: Option<SharedStrings>,
    root_rels: Relationships,
    workbook_rels: Relationships,
    sheets: Vec<SheetEntry>,
    defined_names: Vec<(String, String)>,
    external_rel_ids: Vec<String>,
    external_count: u32,
}

impl PackageWriter {
    /// Create the archive and write the parts that are known upfront
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::with_capacity(64 * 1024, file); // 64KB buffer
        let zip = ZipWriter::new(writer);

        let mut package = PackageWriter {
            zip,
            content_types: ContentTypes::new(),
            formats: FormatTable::new(),
            strings: Some(SharedStrings::new()),
            root_rels: Relationships::new(),
            workbook_rels: Relationships::new(),
            sheets: Vec::new(),
            defined_names: Vec::new(),
            external_rel_ids: Vec::new(),
            external_count: 0,
        };

        package
            .root_rels
            .register(rel::OFFICE_DOCUMENT, part::WORKBOOK, TargetMode::Internal);
        package.root_rels.register(
            rel::CORE_PROPERTIES,
            part::CORE_PROPERTIES,
            TargetMode::Internal,
        );
        package.root_rels.register(
            rel::EXTENDED_PROPERTIES,
            part::EXTENDED_PROPERTIES,
            TargetMode::Internal,
        );

        package
            .content_types
            .add_override("/xl/workbook.xml", content_type::WORKBOOK);
        package
            .content_types
            .add_override("/docProps/core.xml", content_type::CORE_PROPERTIES);
        package
            .content_types
            .add_override("/docProps/app.xml", content_type::EXTENDED_PROPERTIES);

        package.commit_part(part::CORE_PROPERTIES, CORE_PROPS_XML.as_bytes())?;
        package.commit_part(part::EXTENDED_PROPERTIES, APP_PROPS_XML.as_bytes())?;

        Ok(package)
    }

    /// Intern a cell format for this session and get its index
    pub fn add_format(&mut self, format: CellFormat) -> u32 {
        self.formats.intern(format)
    }

    /// Record a workbook-level defined name
    pub fn add_defined_name(&mut self, name: &str, refers_to: &str) {
        self.defined_names
            .push((name.to_string(), refers_to.to_string()));
    }

    /// Start streaming a new worksheet.
    ///
    /// The returned writer owns the session's shared string table until it
    /// is passed back through [`PackageWriter::finish_sheet`] or
    /// [`PackageWriter::abandon_sheet`]; only one sheet can be open at a
    /// time.
    pub fn begin_sheet(&mut self, name: &str) -> Result<SheetWriter<Vec<u8>>> {
        self.begin_sheet_with(name, SheetLayout::default())
    }

    /// Start streaming a new worksheet with upfront layout structures
    pub fn begin_sheet_with(
        &mut self,
        name: &str,
        layout: SheetLayout,
    ) -> Result<SheetWriter<Vec<u8>>> {
        let strings = self.strings.take().ok_or_else(|| {
            SheetError::Format("a sheet is already being written".to_string())
        })?;

        let n = self.sheets.len() as u32 + 1;
        let sheet_part = part::worksheet(n);
        let rel_id = self.workbook_rels.register(
            rel::WORKSHEET,
            &format!("worksheets/sheet{}.xml", n),
            TargetMode::Internal,
        );
        self.content_types
            .add_override(&format!("/{}", sheet_part), content_type::WORKSHEET);
        self.sheets.push(SheetEntry {
            name: name.to_string(),
            part: sheet_part,
            rel_id,
        });

        SheetWriter::with_layout(Vec::with_capacity(8 * 1024), strings, layout)
    }

    /// Commit the finished sheet's part to the archive
    pub fn finish_sheet(&mut self, sheet: SheetWriter<Vec<u8>>) -> Result<()> {
        let sheet_part = match (&self.strings, self.sheets.last()) {
            (None, Some(entry)) => entry.part.clone(),
            _ => {
                return Err(SheetError::Format(
                    "no sheet is being written".to_string(),
                ))
            }
        };
        let (buf, strings) = sheet.finish()?;
        self.strings = Some(strings);
        self.commit_part(&sheet_part, &buf)
    }

    /// Drop the sheet being written without committing anything.
    ///
    /// The relationship id the sheet consumed stays burned: later sheets
    /// get fresh ids, never a reused one.
    pub fn abandon_sheet(&mut self, sheet: SheetWriter<Vec<u8>>) -> Result<()> {
        if self.strings.is_some() {
            return Err(SheetError::Format(
                "no sheet is being written".to_string(),
            ));
        }
        let (_, strings) = sheet.finish()?;
        self.strings = Some(strings);
        if let Some(entry) = self.sheets.pop() {
            self.content_types
                .remove_override(&format!("/{}", entry.part));
            self.workbook_rels.remove(&entry.rel_id);
        }
        Ok(())
    }

    /// Add an external workbook reference with its named ranges.
    ///
    /// Writes the external-link part and its `.rels` sibling immediately;
    /// the workbook part will point at it through an `externalReferences`
    /// entry.
    pub fn add_external_book(&mut self, target: &str, ranges: Vec<ExternalRange>) -> Result<()> {
        self.external_count += 1;
        let n = self.external_count;
        let link_part = part::external_link(n);

        let workbook_rel = self.workbook_rels.register(
            rel::EXTERNAL_LINK,
            &format!("externalLinks/externalLink{}.xml", n),
            TargetMode::Internal,
        );
        self.external_rel_ids.push(workbook_rel);
        self.content_types
            .add_override(&format!("/{}", link_part), content_type::EXTERNAL_LINK);

        let mut link_rels = Relationships::new();
        let rel_id = link_rels.register(rel::EXTERNAL_LINK_PATH, target, TargetMode::External);
        let book = ExternalBook {
            rel_id,
            target: target.to_string(),
            ranges,
        };

        let mut xml = XmlWriter::new(Vec::new());
        write_external_link(&book, &mut xml)?;
        let bytes = xml.into_inner()?;
        self.commit_part(&link_part, &bytes)?;

        let mut xml = XmlWriter::new(Vec::new());
        link_rels.write_xml(&mut xml)?;
        let bytes = xml.into_inner()?;
        self.commit_part(&Relationships::rels_path(&link_part), &bytes)
    }

    /// Write the remaining parts and finalize the archive
    pub fn finish(mut self) -> Result<()> {
        let strings = self.strings.take().ok_or_else(|| {
            SheetError::Format("a sheet is still being written".to_string())
        })?;

        // the shared style and string tables resolve after the last sheet,
        // so their parts and relationships are written last
        self.workbook_rels
            .register(rel::STYLES, "styles.xml", TargetMode::Internal);
        self.workbook_rels.register(
            rel::SHARED_STRINGS,
            "sharedStrings.xml",
            TargetMode::Internal,
        );
        self.content_types
            .add_override("/xl/styles.xml", content_type::STYLES);
        self.content_types
            .add_override("/xl/sharedStrings.xml", content_type::SHARED_STRINGS);

        let mut xml = XmlWriter::new(Vec::new());
        self.write_workbook(&mut xml)?;
        let bytes = xml.into_inner()?;
        self.commit_part(part::WORKBOOK, &bytes)?;

        let mut xml = XmlWriter::new(Vec::new());
        self.workbook_rels.write_xml(&mut xml)?;
        let bytes = xml.into_inner()?;
        self.commit_part(&Relationships::rels_path(part::WORKBOOK), &bytes)?;

        let mut xml = XmlWriter::new(Vec::new());
        write_stylesheet(&self.formats, &mut xml)?;
        let bytes = xml.into_inner()?;
        self.commit_part(part::STYLES, &bytes)?;

        let mut xml = XmlWriter::new(Vec::new());
        strings.write_xml(&mut xml)?;
        let bytes = xml.into_inner()?;
        self.commit_part(part::SHARED_STRINGS, &bytes)?;

        let mut xml = XmlWriter::new(Vec::new());
        self.root_rels.write_xml(&mut xml)?;
        let bytes = xml.into_inner()?;
        self.commit_part(part::ROOT_RELS, &bytes)?;

        let mut xml = XmlWriter::new(Vec::new());
        self.content_types.write_xml(&mut xml)?;
        let bytes = xml.into_inner()?;
        self.commit_part(part::CONTENT_TYPES, &bytes)?;

        let mut inner = self.zip.finish()?;
        inner.flush()?;
        Ok(())
    }

    fn write_workbook(&self, xml: &mut XmlWriter<Vec<u8>>) -> Result<()> {
        xml.declaration()?;
        xml.start_element("workbook")?;
        xml.attribute("xmlns", SHEET_MAIN_NS)?;
        xml.attribute("xmlns:r", REL_NS)?;
        xml.close_start_tag()?;

        xml.start_element("sheets")?;
        xml.close_start_tag()?;
        for (i, sheet) in self.sheets.iter().enumerate() {
            xml.start_element("sheet")?;
            xml.attribute("name", &sheet.name)?;
            xml.attribute_int("sheetId", (i + 1) as i64)?;
            xml.attribute("r:id", &sheet.rel_id)?;
            xml.close_empty()?;
        }
        xml.end_element("sheets")?;

        if !self.external_rel_ids.is_empty() {
            xml.start_element("externalReferences")?;
            xml.close_start_tag()?;
            for id in &self.external_rel_ids {
                xml.start_element("externalReference")?;
                xml.attribute("r:id", id)?;
                xml.close_empty()?;
            }
            xml.end_element("externalReferences")?;
        }

        if !self.defined_names.is_empty() {
            xml.start_element("definedNames")?;
            xml.close_start_tag()?;
            for (name, refers_to) in &self.defined_names {
                xml.start_element("definedName")?;
                xml.attribute("name", name)?;
                xml.close_start_tag()?;
                xml.write_escaped(refers_to)?;
                xml.end_element("definedName")?;
            }
            xml.end_element("definedNames")?;
        }

        xml.end_element("workbook")?;
        Ok(())
    }

    fn commit_part(&mut self, path: &str, bytes: &[u8]) -> Result<()> {
        let options = FileOptions::<()>::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(6)); // balance between speed and ratio
        self.zip.start_file(path, options)?;
        self.zip.write_all(bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CellValue, Row};
    use tempfile::NamedTempFile;

    #[test]
    fn test_sheet_lifecycle() {
        let temp = NamedTempFile::new().unwrap();
        let mut package = PackageWriter::create(temp.path()).unwrap();

        let mut sheet = package.begin_sheet("Sheet1").unwrap();
        let mut row = Row::new(1);
        row.push(CellValue::from("hello"));
        sheet.write_row(&row).unwrap();

        // a second sheet cannot start while the first is open
        assert!(package.begin_sheet("Sheet2").is_err());

        package.finish_sheet(sheet).unwrap();
        package.finish().unwrap();
    }

    #[test]
    fn test_abandoned_sheet_burns_its_relationship_id() {
        let temp = NamedTempFile::new().unwrap();
        let mut package = PackageWriter::create(temp.path()).unwrap();

        let sheet = package.begin_sheet("Scratch").unwrap();
        package.abandon_sheet(sheet).unwrap();

        let sheet = package.begin_sheet("Kept").unwrap();
        assert_eq!(package.sheets[0].rel_id, "rId2");
        package.finish_sheet(sheet).unwrap();
        package.finish().unwrap();
    }

    #[test]
    fn test_finish_rejects_open_sheet() {
        let temp = NamedTempFile::new().unwrap();
        let mut package = PackageWriter::create(temp.path()).unwrap();
        let _sheet = package.begin_sheet("Sheet1").unwrap();
        assert!(package.finish().is_err());
    }
}
