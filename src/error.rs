//! Error types for the sheetstream library

use thiserror::Error;

/// Result type alias for sheetstream operations
pub type Result<T> = std::result::Result<T, SheetError>;

/// Main error type for all package operations
#[derive(Error, Debug)]
pub enum SheetError {
    /// Structurally broken XML or an otherwise invalid part.
    ///
    /// Fatal for the part being read or written; no partial result is
    /// returned.
    #[error("malformed part: {0}")]
    Format(String),

    /// A part the package format requires is absent from the archive
    #[error("mandatory part '{0}' missing from package")]
    MissingPart(String),

    /// Rows must reach the streaming writer in strictly increasing order
    #[error("row {given} written after row {last}; row indices must strictly increase")]
    RowOrder { last: u32, given: u32 },

    /// Cells within a row must be written in strictly increasing column order
    #[error("cell in column {given} written after column {last} in row {row}")]
    CellOrder { row: u32, last: u32, given: u32 },

    /// A relationship points at a target that cannot be resolved.
    ///
    /// Recoverable: the caller decides whether a dangling reference is
    /// fatal for its use case.
    #[error("relationship '{id}' of '{part}' has no resolvable target")]
    MissingTarget { part: String, id: String },

    /// Invalid sheet name or sheet not found
    #[error("Sheet '{sheet}' not found. Available sheets: {available}")]
    SheetNotFound { sheet: String, available: String },

    /// Invalid cell reference
    #[error("invalid cell reference: {0}")]
    InvalidReference(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive error wrapper
    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parse error wrapper
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML attribute error wrapper
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
}
