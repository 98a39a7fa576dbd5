//! Namespace URIs, relationship types, content types and part paths
//! of the package format

/// Main spreadsheet namespace
pub const SHEET_MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

/// Document-level relationship namespace (the `r:` prefix)
pub const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Package-level relationship namespace
pub const PKG_REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";

/// Content-types namespace
pub const CONTENT_TYPES_NS: &str =
    "http://schemas.openxmlformats.org/package/2006/content-types";

/// Relationship type URIs
pub mod rel {
    pub const OFFICE_DOCUMENT: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
    pub const CORE_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties";
    pub const EXTENDED_PROPERTIES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties";
    pub const WORKSHEET: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
    pub const STYLES: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
    pub const SHARED_STRINGS: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";
    pub const EXTERNAL_LINK: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/externalLink";
    pub const EXTERNAL_LINK_PATH: &str =
        "http://schemas.openxmlformats.org/officeDocument/2006/relationships/externalLinkPath";
}

/// Content type strings
pub mod content_type {
    pub const RELATIONSHIPS: &str =
        "application/vnd.openxmlformats-package.relationships+xml";
    pub const XML: &str = "application/xml";
    pub const WORKBOOK: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
    pub const WORKSHEET: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";
    pub const STYLES: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
    pub const SHARED_STRINGS: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml";
    pub const EXTERNAL_LINK: &str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.externalLink+xml";
    pub const CORE_PROPERTIES: &str =
        "application/vnd.openxmlformats-package.core-properties+xml";
    pub const EXTENDED_PROPERTIES: &str =
        "application/vnd.openxmlformats-officedocument.extended-properties+xml";
}

/// Well-known part paths
pub mod part {
    pub const CONTENT_TYPES: &str = "[Content_Types].xml";
    pub const ROOT_RELS: &str = "_rels/.rels";
    pub const WORKBOOK: &str = "xl/workbook.xml";
    pub const STYLES: &str = "xl/styles.xml";
    pub const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
    pub const CORE_PROPERTIES: &str = "docProps/core.xml";
    pub const EXTENDED_PROPERTIES: &str = "docProps/app.xml";

    /// Worksheet part path for a 1-based sheet number
    pub fn worksheet(n: u32) -> String {
        format!("xl/worksheets/sheet{}.xml", n)
    }

    /// External link part path for a 1-based link number
    pub fn external_link(n: u32) -> String {
        format!("xl/externalLinks/externalLink{}.xml", n)
    }
}
