//! # sheetstream
//!
//! A streaming reader/writer for packaged-XML spreadsheet documents.
//!
//! The package container is a zip archive of interrelated XML parts
//! (workbook, worksheets, styles, shared strings, external links,
//! relationship files). This crate serializes worksheet data as a
//! forward-only XML stream and parses it back incrementally, with a
//! session-scoped style interner and per-part relationship resolution in
//! between.
//!
//! ## Features
//!
//! - **Streaming write**: rows are emitted as they are appended; memory
//!   usage is bounded by the widest row, not the document
//! - **Streaming read**: worksheet parts are decompressed lazily and
//!   parsed row by row
//! - **Style interning**: structurally equal cell formats collapse onto
//!   one stable table index
//! - **Relationship resolution**: `rId<N>` sequences per owning part,
//!   unknown relationship types round-trip unchanged
//! - **External links**: named ranges of referenced workbooks, reference
//!   strings preserved verbatim
//!
//! ## Writing
//!
//! ```no_run
//! use sheetstream::writer::WorkbookWriter;
//! use sheetstream::types::CellValue;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = WorkbookWriter::new("output.xlsx")?;
//!
//! writer.append(&[
//!     CellValue::String("Name".to_string()),
//!     CellValue::String("Age".to_string()),
//! ])?;
//! writer.append(&[
//!     CellValue::String("Alice".to_string()),
//!     CellValue::Int(30),
//! ])?;
//!
//! writer.save()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Reading
//!
//! ```no_run
//! use sheetstream::reader::WorkbookReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut reader = WorkbookReader::open("data.xlsx")?;
//!
//! for row_result in reader.rows("Sheet1")? {
//!     let row = row_result?;
//!     println!("Row {}: {:?}", row.index, row.to_strings());
//! }
//! # Ok(())
//! # }
//! ```

pub mod content_types;
pub mod error;
pub mod external;
pub mod package;
pub mod reader;
pub mod relationships;
pub mod schema;
pub mod shared_strings;
pub mod styles;
pub mod types;
pub mod worksheet;
pub mod writer;
pub mod xml_writer;

pub use error::{Result, SheetError};
pub use external::{ExternalBook, ExternalRange};
pub use reader::WorkbookReader;
pub use relationships::{Relationship, Relationships, TargetMode};
pub use styles::{CellFormat, FormatTable, NumberFormat};
pub use types::{Cell, CellValue, ColumnSpec, ConditionalFormat, MergedRange, Row, SheetLayout};
pub use writer::WorkbookWriter;
