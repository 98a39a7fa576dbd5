//! Workbook reading with streaming row input

use crate::error::Result;
use crate::external::ExternalBook;
use crate::package::{PackageReader, SheetInfo, SheetRows};
use crate::styles::FormatTable;
use std::path::Path;

/// Streaming workbook reader.
///
/// Opening the workbook loads the package metadata and the shared
/// style/string tables; worksheet parts are decompressed only when their
/// rows are iterated.
///
/// # Examples
///
/// ```no_run
/// use sheetstream::reader::WorkbookReader;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut reader = WorkbookReader::open("data.xlsx")?;
///
/// for row_result in reader.rows("Sheet1")? {
///     let row = row_result?;
///     println!("Row {}: {:?}", row.index, row.to_strings());
/// }
/// # Ok(())
/// # }
/// ```
pub struct WorkbookReader {
    package: PackageReader,
}

impl std::fmt::Debug for WorkbookReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkbookReader").finish_non_exhaustive()
    }
}

impl WorkbookReader {
    /// Open a workbook package for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(WorkbookReader {
            package: PackageReader::open(path)?,
        })
    }

    /// Get list of sheet names in the workbook
    pub fn sheet_names(&self) -> Vec<String> {
        self.package.sheet_names()
    }

    /// Get the number of sheets in the workbook
    pub fn sheet_count(&self) -> usize {
        self.package.sheets().len()
    }

    /// Worksheet declarations in workbook order
    pub fn sheets(&self) -> &[SheetInfo] {
        self.package.sheets()
    }

    /// Stream rows from a sheet by name.
    ///
    /// Absent rows are not synthesized: the iterator yields exactly the
    /// row records present in the part, with their original indices.
    pub fn rows(&mut self, sheet_name: &str) -> Result<SheetRows<'_>> {
        self.package.rows(sheet_name)
    }

    /// Stream rows from a sheet by zero-based index
    pub fn rows_by_index(&mut self, index: usize) -> Result<SheetRows<'_>> {
        self.package.rows_by_index(index)
    }

    /// The workbook's format table (one default entry when the package
    /// has no styles part)
    pub fn formats(&self) -> &FormatTable {
        self.package.formats()
    }

    /// Workbook-level defined names as (name, reference) pairs
    pub fn defined_names(&self) -> &[(String, String)] {
        self.package.defined_names()
    }

    /// External workbook references with their named ranges
    pub fn external_books(&mut self) -> Result<Vec<ExternalBook>> {
        self.package.external_books()
    }
}
