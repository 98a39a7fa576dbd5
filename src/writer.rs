//! Workbook writing with streaming row output
//!
//! Rows are serialized as they are appended; only the current sheet's
//! buffered part and the shared style/string tables stay in memory.

use crate::error::{Result, SheetError};
use crate::external::ExternalRange;
use crate::package::PackageWriter;
use crate::styles::CellFormat;
use crate::types::{CellValue, Row, SheetLayout};
use crate::worksheet::SheetWriter;
use std::path::Path;

/// Streaming workbook writer.
///
/// Memory usage is bounded by the widest row plus the shared tables,
/// regardless of how many rows are written.
///
/// # Examples
///
/// ```no_run
/// use sheetstream::writer::WorkbookWriter;
/// use sheetstream::types::CellValue;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut writer = WorkbookWriter::new("output.xlsx")?;
///
/// writer.append(&[
///     CellValue::String("Name".to_string()),
///     CellValue::String("Score".to_string()),
/// ])?;
/// writer.append(&[
///     CellValue::String("Alice".to_string()),
///     CellValue::Int(30),
/// ])?;
/// writer.append(&[
///     CellValue::String("Total".to_string()),
///     CellValue::Formula("=SUM(B2:B2)".to_string()),
/// ])?;
///
/// writer.save()?;
/// # Ok(())
/// # }
/// ```
pub struct WorkbookWriter {
    package: PackageWriter,
    sheet: Option<SheetWriter<Vec<u8>>>,
    next_row: u32,
}

impl WorkbookWriter {
    /// Create a workbook writer with an initial "Sheet1"
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut package = PackageWriter::create(path)?;
        let sheet = package.begin_sheet("Sheet1")?;
        Ok(WorkbookWriter {
            package,
            sheet: Some(sheet),
            next_row: 0,
        })
    }

    /// Finish the current sheet and switch to a new one
    pub fn add_sheet(&mut self, name: &str) -> Result<()> {
        self.add_sheet_with(name, SheetLayout::default())
    }

    /// Finish the current sheet and switch to a new one with upfront
    /// layout structures (column definitions, merged ranges, conditional
    /// formatting)
    pub fn add_sheet_with(&mut self, name: &str, layout: SheetLayout) -> Result<()> {
        if let Some(sheet) = self.sheet.take() {
            self.package.finish_sheet(sheet)?;
        }
        self.sheet = Some(self.package.begin_sheet_with(name, layout)?);
        self.next_row = 0;
        Ok(())
    }

    /// Intern a cell format and get its index for styled cells
    pub fn add_format(&mut self, format: CellFormat) -> u32 {
        self.package.add_format(format)
    }

    /// Record a workbook-level defined name
    pub fn add_defined_name(&mut self, name: &str, refers_to: &str) {
        self.package.add_defined_name(name, refers_to);
    }

    /// Add an external workbook reference with its named ranges
    pub fn add_external_book(&mut self, target: &str, ranges: Vec<ExternalRange>) -> Result<()> {
        self.package.add_external_book(target, ranges)
    }

    /// Write an explicit row record.
    ///
    /// Rows must be supplied in strictly increasing row-index order.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        let sheet = self
            .sheet
            .as_mut()
            .ok_or_else(|| SheetError::Format("no sheet is open".to_string()))?;
        sheet.write_row(row)?;
        self.next_row = row.index;
        Ok(())
    }

    /// Append a row of values in the next free row
    pub fn append(&mut self, values: &[CellValue]) -> Result<()> {
        let mut row = Row::new(self.next_row + 1);
        for value in values {
            row.push(value.clone());
        }
        self.write_row(&row)
    }

    /// Append a row of (value, format index) pairs in the next free row
    pub fn append_styled(&mut self, cells: &[(CellValue, u32)]) -> Result<()> {
        let mut row = Row::new(self.next_row + 1);
        for (value, style) in cells {
            row.push_styled(value.clone(), *style);
        }
        self.write_row(&row)
    }

    /// Index of the last row written to the current sheet (0 if none)
    pub fn current_row(&self) -> u32 {
        self.next_row
    }

    /// Finish the current sheet and finalize the archive
    pub fn save(mut self) -> Result<()> {
        if let Some(sheet) = self.sheet.take() {
            self.package.finish_sheet(sheet)?;
        }
        self.package.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_writer_creation() {
        let temp = NamedTempFile::new().unwrap();
        let writer = WorkbookWriter::new(temp.path());
        assert!(writer.is_ok());

        // Should be able to save immediately
        let writer = writer.unwrap();
        assert!(writer.save().is_ok());
    }

    #[test]
    fn test_append_rows() {
        let temp = NamedTempFile::new().unwrap();
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();

        writer
            .append(&[CellValue::from("A"), CellValue::from("B")])
            .unwrap();
        writer
            .append(&[CellValue::Int(1), CellValue::Int(2)])
            .unwrap();
        assert_eq!(writer.current_row(), 2);

        assert!(writer.save().is_ok());
    }

    #[test]
    fn test_explicit_rows_enforce_order() {
        let temp = NamedTempFile::new().unwrap();
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();

        writer.write_row(&Row::new(10)).unwrap();
        let err = writer.write_row(&Row::new(4)).unwrap_err();
        assert!(matches!(err, SheetError::RowOrder { last: 10, given: 4 }));
    }

    #[test]
    fn test_add_sheet_resets_row_counter() {
        let temp = NamedTempFile::new().unwrap();
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();

        writer.append(&[CellValue::from("Sheet1 data")]).unwrap();
        assert_eq!(writer.current_row(), 1);

        writer.add_sheet("Sheet2").unwrap();
        assert_eq!(writer.current_row(), 0);

        writer.append(&[CellValue::from("Sheet2 data")]).unwrap();
        assert_eq!(writer.current_row(), 1);

        assert!(writer.save().is_ok());
    }
}
