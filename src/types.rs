//! Cell, row and layout types shared by the writer and the parser

use crate::error::{Result, SheetError};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::fmt;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Serial day 0 of the spreadsheet date system: 1899-12-30.
fn date_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("epoch constant")
}

/// Convert a datetime to its serial-number representation
pub fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    dt.signed_duration_since(date_epoch()).num_milliseconds() as f64 / MILLIS_PER_DAY
}

/// Convert a serial number back to a datetime.
///
/// Returns `None` for serials outside the representable range.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    let millis = (serial * MILLIS_PER_DAY).round() as i64;
    date_epoch().checked_add_signed(Duration::milliseconds(millis))
}

/// Represents a single cell value in a worksheet
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellValue {
    /// Empty cell
    Empty,
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value stored through the shared string table
    String(String),
    /// String value written inline into the worksheet part
    InlineString(String),
    /// Boolean value
    Bool(bool),
    /// Date/time value as a serial number (1899-12-30 epoch)
    DateTime(f64),
    /// Error value (e.g. "#DIV/0!")
    Error(String),
    /// Formula text (e.g. "=SUM(A1:A10)").
    /// The formula must start with '=' and use spreadsheet formula syntax.
    Formula(String),
}

impl CellValue {
    /// Build a date/time value from a chrono datetime
    pub fn from_datetime(dt: NaiveDateTime) -> Self {
        CellValue::DateTime(datetime_to_serial(dt))
    }

    /// Convert cell value to string
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::String(s) | CellValue::InlineString(s) => s.clone(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::DateTime(d) => d.to_string(),
            CellValue::Error(e) => e.clone(),
            CellValue::Formula(f) => f.clone(),
        }
    }

    /// Check if cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Try to convert to integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(i) => Some(*i),
            CellValue::Float(f) => Some(*f as i64),
            CellValue::String(s) | CellValue::InlineString(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to float
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(f) => Some(*f),
            CellValue::Int(i) => Some(*i as f64),
            CellValue::DateTime(d) => Some(*d),
            CellValue::String(s) | CellValue::InlineString(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Try to convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            CellValue::Int(i) => Some(*i != 0),
            CellValue::String(s) | CellValue::InlineString(s) => {
                match s.to_lowercase().as_str() {
                    "true" | "yes" | "1" => Some(true),
                    "false" | "no" | "0" => Some(false),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Try to convert to a chrono datetime
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(d) => serial_to_datetime(*d),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_string())
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::String(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::String(s)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<f64> for CellValue {
    fn from(f: f64) -> Self {
        CellValue::Float(f)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(dt: NaiveDateTime) -> Self {
        CellValue::from_datetime(dt)
    }
}

/// Convert a 1-based column index to its letter form (1 -> A, 26 -> Z, 27 -> AA)
pub fn column_letter(col: u32) -> String {
    let mut col_str = String::new();
    let mut n = col;
    while n > 0 {
        let rem = (n - 1) % 26;
        col_str.insert(0, (b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    col_str
}

/// Parse the leading letters of a cell reference into a 1-based column index
/// ("A1" -> 1, "Z3" -> 26, "AA1" -> 27)
pub fn column_index(reference: &str) -> u32 {
    let mut col = 0u32;
    for ch in reference.chars() {
        if ch.is_ascii_alphabetic() {
            col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        } else {
            break;
        }
    }
    col
}

/// Split a cell reference into (row, column), both 1-based ("C5" -> (5, 3))
pub fn parse_reference(reference: &str) -> Result<(u32, u32)> {
    let split = reference
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| SheetError::InvalidReference(reference.to_string()))?;
    let col = column_index(&reference[..split]);
    let row: u32 = reference[split..]
        .parse()
        .map_err(|_| SheetError::InvalidReference(reference.to_string()))?;
    if col == 0 || row == 0 {
        return Err(SheetError::InvalidReference(reference.to_string()));
    }
    Ok((row, col))
}

/// Represents a cell with its position, value and optional style index
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Cell {
    /// Row index (1-based)
    pub row: u32,
    /// Column index (1-based)
    pub col: u32,
    /// Cell value
    pub value: CellValue,
    /// Index into the session's format table, if the cell is styled
    pub style: Option<u32>,
}

impl Cell {
    /// Create a new cell without a style
    pub fn new(row: u32, col: u32, value: CellValue) -> Self {
        Cell {
            row,
            col,
            value,
            style: None,
        }
    }

    /// Create a new cell with a style index
    pub fn styled(row: u32, col: u32, value: CellValue, style: u32) -> Self {
        Cell {
            row,
            col,
            value,
            style: Some(style),
        }
    }

    /// Get the cell reference (e.g. "A1", "B2")
    pub fn reference(&self) -> String {
        format!("{}{}", column_letter(self.col), self.row)
    }
}

/// Represents a row of cells plus row-level attributes
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Row {
    /// Row index (1-based)
    pub index: u32,
    /// Cells in this row, in strictly increasing column order
    pub cells: Vec<Cell>,
    /// Row height in points
    pub height: Option<f64>,
    /// Whether the row is hidden
    pub hidden: bool,
    /// Outline (grouping) level
    pub outline_level: u8,
    /// Row-level format index
    pub style: Option<u32>,
}

impl Row {
    /// Create an empty row
    pub fn new(index: u32) -> Self {
        Row {
            index,
            ..Row::default()
        }
    }

    /// Create a row from prepared cells
    pub fn with_cells(index: u32, cells: Vec<Cell>) -> Self {
        Row {
            index,
            cells,
            ..Row::default()
        }
    }

    /// Append a value in the next free column
    pub fn push(&mut self, value: CellValue) {
        let col = self.cells.last().map(|c| c.col + 1).unwrap_or(1);
        self.cells.push(Cell::new(self.index, col, value));
    }

    /// Append a styled value in the next free column
    pub fn push_styled(&mut self, value: CellValue, style: u32) {
        let col = self.cells.last().map(|c| c.col + 1).unwrap_or(1);
        self.cells.push(Cell::styled(self.index, col, value, style));
    }

    /// Get the cell at a 1-based column index, if present
    pub fn cell(&self, col: u32) -> Option<&Cell> {
        self.cells.iter().find(|c| c.col == col)
    }

    /// Get number of cells present in the row
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if row has no cells or only empty values
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() || self.cells.iter().all(|c| c.value.is_empty())
    }

    /// Convert the row to a dense vector of strings from column 1 to the
    /// last occupied column, with gaps rendered as empty strings
    pub fn to_strings(&self) -> Vec<String> {
        let max = self.cells.last().map(|c| c.col).unwrap_or(0);
        let mut out = vec![String::new(); max as usize];
        for cell in &self.cells {
            out[(cell.col - 1) as usize] = cell.value.as_string();
        }
        out
    }
}

/// Column layout definition covering the 1-based range `min..=max`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnSpec {
    /// First column the definition applies to (1-based)
    pub min: u32,
    /// Last column the definition applies to (1-based, inclusive)
    pub max: u32,
    /// Column width in character units
    pub width: Option<f64>,
    /// Whether the columns are hidden
    pub hidden: bool,
    /// Column-level format index
    pub style: Option<u32>,
}

impl ColumnSpec {
    /// Create a width definition for a single column
    pub fn width(col: u32, width: f64) -> Self {
        ColumnSpec {
            min: col,
            max: col,
            width: Some(width),
            hidden: false,
            style: None,
        }
    }
}

/// A conditional-formatting rule applied to a cell range.
///
/// Formula texts are carried verbatim; rule evaluation is out of scope.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConditionalFormat {
    /// Range reference the rule applies to (e.g. "A1:B10")
    pub reference: String,
    /// Rule type ("cellIs", "expression", ...)
    pub rule_type: String,
    /// Rule priority (1 = highest)
    pub priority: u32,
    /// Comparison operator for "cellIs" rules
    pub operator: Option<String>,
    /// Formula texts, without the '=' prefix
    pub formulas: Vec<String>,
    /// Differential format id applied when the rule matches
    pub dxf_id: Option<u32>,
}

/// Ancillary worksheet structures supplied upfront to the streaming
/// writer.
///
/// The part schema places these after the row data, so the writer buffers
/// them until the last row is written.
#[derive(Debug, Clone, Default)]
pub struct SheetLayout {
    pub columns: Vec<ColumnSpec>,
    pub merged: Vec<MergedRange>,
    pub conditional: Vec<ConditionalFormat>,
}

/// An inclusive rectangular range of merged cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergedRange {
    pub first_row: u32,
    pub first_col: u32,
    pub last_row: u32,
    pub last_col: u32,
}

impl MergedRange {
    /// Create a merged range from 1-based corners
    pub fn new(first_row: u32, first_col: u32, last_row: u32, last_col: u32) -> Self {
        MergedRange {
            first_row,
            first_col,
            last_row,
            last_col,
        }
    }

    /// Get the range reference (e.g. "A1:B2")
    pub fn reference(&self) -> String {
        format!(
            "{}{}:{}{}",
            column_letter(self.first_col),
            self.first_row,
            column_letter(self.last_col),
            self.last_row
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_reference() {
        let cell = Cell::new(1, 1, CellValue::Empty);
        assert_eq!(cell.reference(), "A1");

        let cell = Cell::new(1, 26, CellValue::Empty);
        assert_eq!(cell.reference(), "Z1");

        let cell = Cell::new(1, 27, CellValue::Empty);
        assert_eq!(cell.reference(), "AA1");
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("A1").unwrap(), (1, 1));
        assert_eq!(parse_reference("Z3").unwrap(), (3, 26));
        assert_eq!(parse_reference("AA100").unwrap(), (100, 27));
        assert!(parse_reference("17").is_err());
        assert!(parse_reference("ABC").is_err());
    }

    #[test]
    fn test_cell_value_conversions() {
        let val = CellValue::Int(42);
        assert_eq!(val.as_i64(), Some(42));
        assert_eq!(val.as_f64(), Some(42.0));

        let val = CellValue::String("true".to_string());
        assert_eq!(val.as_bool(), Some(true));
    }

    #[test]
    fn test_date_serial_roundtrip() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let serial = datetime_to_serial(dt);
        assert_eq!(serial, 45366.5);
        assert_eq!(serial_to_datetime(serial), Some(dt));
    }

    #[test]
    fn test_row_push_and_to_strings() {
        let mut row = Row::new(3);
        row.push(CellValue::from("a"));
        row.push(CellValue::Int(7));
        assert_eq!(row.cells[1].col, 2);
        assert_eq!(row.to_strings(), vec!["a".to_string(), "7".to_string()]);

        let sparse = Row::with_cells(
            1,
            vec![
                Cell::new(1, 1, CellValue::from("x")),
                Cell::new(1, 3, CellValue::from("z")),
            ],
        );
        assert_eq!(
            sparse.to_strings(),
            vec!["x".to_string(), String::new(), "z".to_string()]
        );
    }

    #[test]
    fn test_merged_range_reference() {
        assert_eq!(MergedRange::new(1, 1, 2, 2).reference(), "A1:B2");
    }
}
