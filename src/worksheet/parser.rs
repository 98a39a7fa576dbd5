//! Incremental parser for worksheet parts

use crate::error::{Result, SheetError};
use crate::shared_strings::SharedStrings;
use crate::styles::FormatTable;
use crate::types::{column_index, Cell, CellValue, Row};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;

/// Streaming iterator over the rows of one worksheet part.
///
/// Rows are yielded in document order with their original indices; absent
/// rows and cells are simply not reported, never synthesized. Shared-string
/// cells are resolved through the caller-supplied table, and numeric cells
/// whose format is a date format come back as [`CellValue::DateTime`] when
/// a format table is supplied.
///
/// Unrecognized elements and attributes are skipped. Malformed XML ends the
/// iteration with a single fatal error.
pub struct RowIter<'a, R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    strings: &'a SharedStrings,
    formats: Option<&'a FormatTable>,
    last_row: u32,
    done: bool,
}

impl<'a, R: BufRead> std::fmt::Debug for RowIter<'a, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowIter")
            .field("last_row", &self.last_row)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// Which leaf element's text is currently being collected
#[derive(Clone, Copy, PartialEq)]
enum Capture {
    None,
    Value,
    Formula,
    Inline,
}

/// Attributes and collected text of a cell still being parsed
struct PendingCell {
    row: u32,
    col: u32,
    style: Option<u32>,
    ty: Option<String>,
    value: Option<String>,
    formula: Option<String>,
    inline: Option<String>,
}

impl<'a, R: BufRead> RowIter<'a, R> {
    /// Start streaming rows from a worksheet part.
    ///
    /// `formats` enables date classification of styled numeric cells; pass
    /// `None` when no stylesheet is available.
    pub fn new(source: R, strings: &'a SharedStrings, formats: Option<&'a FormatTable>) -> Self {
        let reader = Reader::from_reader(source);
        RowIter {
            reader,
            buf: Vec::new(),
            strings,
            formats,
            last_row: 0,
            done: false,
        }
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        enum Scan {
            Open(Row),
            Closed(Row),
            Finished,
            Skip,
        }

        loop {
            let scan = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) if e.name().as_ref() == b"row" => {
                    Scan::Open(row_from_attrs(e, self.last_row)?)
                }
                Event::Empty(ref e) if e.name().as_ref() == b"row" => {
                    Scan::Closed(row_from_attrs(e, self.last_row)?)
                }
                Event::Eof => Scan::Finished,
                _ => Scan::Skip,
            };
            self.buf.clear();

            match scan {
                Scan::Open(row) => {
                    self.last_row = row.index;
                    return self.read_cells(row).map(Some);
                }
                Scan::Closed(row) => {
                    self.last_row = row.index;
                    return Ok(Some(row));
                }
                Scan::Finished => return Ok(None),
                Scan::Skip => {}
            }
        }
    }

    fn read_cells(&mut self, mut row: Row) -> Result<Row> {
        enum Step {
            Cell(PendingCell),
            EndRow,
            Continue,
        }

        let mut last_col = 0u32;
        let mut pending: Option<PendingCell> = None;
        let mut capture = Capture::None;

        loop {
            let step = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(ref e) => match e.name().as_ref() {
                    b"c" => {
                        pending = Some(cell_from_attrs(e, row.index, &mut last_col));
                        Step::Continue
                    }
                    b"v" if pending.is_some() => {
                        capture = Capture::Value;
                        Step::Continue
                    }
                    b"f" if pending.is_some() => {
                        capture = Capture::Formula;
                        Step::Continue
                    }
                    b"t" if pending.is_some() => {
                        capture = Capture::Inline;
                        Step::Continue
                    }
                    _ => Step::Continue,
                },
                Event::Empty(ref e) if e.name().as_ref() == b"c" => {
                    Step::Cell(cell_from_attrs(e, row.index, &mut last_col))
                }
                Event::Text(ref e) => {
                    if let Some(cell) = pending.as_mut() {
                        let text = e.unescape()?;
                        let slot = match capture {
                            Capture::Value => Some(&mut cell.value),
                            Capture::Formula => Some(&mut cell.formula),
                            Capture::Inline => Some(&mut cell.inline),
                            Capture::None => None,
                        };
                        if let Some(slot) = slot {
                            slot.get_or_insert_with(String::new).push_str(&text);
                        }
                    }
                    Step::Continue
                }
                Event::End(ref e) => match e.name().as_ref() {
                    b"v" | b"f" | b"t" => {
                        capture = Capture::None;
                        Step::Continue
                    }
                    b"c" => match pending.take() {
                        Some(cell) => Step::Cell(cell),
                        None => Step::Continue,
                    },
                    b"row" => Step::EndRow,
                    _ => Step::Continue,
                },
                Event::Eof => {
                    return Err(SheetError::Format(
                        "worksheet part ended inside a row element".to_string(),
                    ))
                }
                _ => Step::Continue,
            };
            self.buf.clear();

            match step {
                Step::Cell(cell) => {
                    row.cells
                        .push(finish_cell(self.strings, self.formats, cell)?);
                }
                Step::EndRow => return Ok(row),
                Step::Continue => {}
            }
        }
    }
}

impl<'a, R: BufRead> Iterator for RowIter<'a, R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_row() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn attr_text(attr: &quick_xml::events::attributes::Attribute) -> String {
    String::from_utf8_lossy(&attr.value).to_string()
}

fn row_from_attrs(e: &BytesStart, last_row: u32) -> Result<Row> {
    let mut row = Row::new(last_row + 1);
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"r" => {
                row.index = attr_text(&attr).parse().map_err(|_| {
                    SheetError::Format(format!("invalid row index '{}'", attr_text(&attr)))
                })?;
            }
            b"ht" => row.height = attr_text(&attr).parse().ok(),
            b"hidden" => row.hidden = matches!(attr.value.as_ref(), b"1" | b"true"),
            b"outlineLevel" => row.outline_level = attr_text(&attr).parse().unwrap_or(0),
            b"s" => row.style = attr_text(&attr).parse().ok(),
            _ => {}
        }
    }
    Ok(row)
}

fn cell_from_attrs(e: &BytesStart, row_index: u32, last_col: &mut u32) -> PendingCell {
    let mut col = None;
    let mut style = None;
    let mut ty = None;
    for attr in e.attributes().flatten() {
        match attr.key.as_ref() {
            b"r" => {
                let parsed = column_index(&attr_text(&attr));
                if parsed > 0 {
                    col = Some(parsed);
                }
            }
            b"s" => style = attr_text(&attr).parse().ok(),
            b"t" => ty = Some(attr_text(&attr)),
            _ => {}
        }
    }
    // cells without a reference take the next column, as rows without an
    // index take the next row
    let col = col.unwrap_or(*last_col + 1);
    *last_col = col;
    PendingCell {
        row: row_index,
        col,
        style,
        ty,
        value: None,
        formula: None,
        inline: None,
    }
}

fn finish_cell(
    strings: &SharedStrings,
    formats: Option<&FormatTable>,
    cell: PendingCell,
) -> Result<Cell> {
    let value = if let Some(formula) = cell.formula {
        CellValue::Formula(format!("={}", formula))
    } else {
        match cell.ty.as_deref() {
            Some("s") => {
                let text = cell.value.unwrap_or_default();
                let index: u32 = text.trim().parse().map_err(|_| {
                    SheetError::Format(format!("invalid shared string reference '{}'", text))
                })?;
                let resolved = strings.get(index).ok_or_else(|| {
                    SheetError::Format(format!("shared string index {} out of range", index))
                })?;
                CellValue::String(resolved.to_string())
            }
            Some("inlineStr") => CellValue::InlineString(cell.inline.unwrap_or_default()),
            Some("str") => CellValue::String(cell.value.unwrap_or_default()),
            Some("b") => {
                CellValue::Bool(cell.value.as_deref().map(str::trim) == Some("1"))
            }
            Some("e") => CellValue::Error(cell.value.unwrap_or_default()),
            Some(other) => {
                return Err(SheetError::Format(format!(
                    "cell {} has unsupported type '{}'",
                    Cell::new(cell.row, cell.col, CellValue::Empty).reference(),
                    other
                )))
            }
            // untyped cells hold numbers (or nothing)
            None => match cell.value.as_deref().map(str::trim) {
                None | Some("") => CellValue::Empty,
                Some(text) => {
                    let is_date = match (cell.style, formats) {
                        (Some(style), Some(formats)) => formats.is_date_index(style),
                        _ => false,
                    };
                    if is_date {
                        CellValue::DateTime(text.parse().map_err(|_| {
                            SheetError::Format(format!("invalid numeric value '{}'", text))
                        })?)
                    } else if !text.contains(['.', 'e', 'E']) {
                        match text.parse::<i64>() {
                            Ok(i) => CellValue::Int(i),
                            Err(_) => CellValue::Float(text.parse().map_err(|_| {
                                SheetError::Format(format!("invalid numeric value '{}'", text))
                            })?),
                        }
                    } else {
                        CellValue::Float(text.parse().map_err(|_| {
                            SheetError::Format(format!("invalid numeric value '{}'", text))
                        })?)
                    }
                }
            },
        }
    };

    Ok(Cell {
        row: cell.row,
        col: cell.col,
        value,
        style: cell.style,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(xml: &str, strings: &SharedStrings) -> Vec<Row> {
        RowIter::new(xml.as_bytes(), strings, None)
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_gaps_are_not_synthesized() {
        let xml = r#"<?xml version="1.0"?>
<worksheet><sheetData>
<row r="1"><c r="A1"><v>1</v></c></row>
<row r="3"><c r="A3"><v>3</v></c></row>
<row r="5"><c r="A5"><v>5</v></c></row>
</sheetData></worksheet>"#;

        let strings = SharedStrings::new();
        let rows = collect(xml, &strings);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
    }

    #[test]
    fn test_sparse_cells_keep_columns() {
        let xml = r#"<worksheet><sheetData>
<row r="2"><c r="B2"><v>1</v></c><c r="E2"><v>2</v></c></row>
</sheetData></worksheet>"#;

        let strings = SharedStrings::new();
        let rows = collect(xml, &strings);
        assert_eq!(rows[0].cells.len(), 2);
        assert_eq!(rows[0].cells[0].col, 2);
        assert_eq!(rows[0].cells[1].col, 5);
    }

    #[test]
    fn test_shared_string_resolution() {
        let mut strings = SharedStrings::new();
        strings.intern("hello");
        strings.intern("world");

        let xml = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="s"><v>1</v></c></row>
</sheetData></worksheet>"#;
        let rows = collect(xml, &strings);
        assert_eq!(
            rows[0].cells[0].value,
            CellValue::String("world".to_string())
        );
    }

    #[test]
    fn test_out_of_range_shared_string_is_an_error() {
        let strings = SharedStrings::new();
        let xml = r#"<worksheet><sheetData>
<row r="1"><c r="A1" t="s"><v>7</v></c></row>
</sheetData></worksheet>"#;
        let result: Result<Vec<_>> = RowIter::new(xml.as_bytes(), &strings, None).collect();
        assert!(matches!(result, Err(SheetError::Format(_))));
    }

    #[test]
    fn test_value_types() {
        let strings = SharedStrings::new();
        let xml = r#"<worksheet><sheetData>
<row r="1">
<c r="A1"><v>42</v></c>
<c r="B1"><v>1.25</v></c>
<c r="C1" t="b"><v>1</v></c>
<c r="D1" t="e"><v>#DIV/0!</v></c>
<c r="E1"><f>SUM(A1:B1)</f></c>
<c r="F1" t="inlineStr"><is><t>inline &amp; text</t></is></c>
<c r="G1" s="2"/>
</row>
</sheetData></worksheet>"#;
        let rows = collect(xml, &strings);
        let cells = &rows[0].cells;
        assert_eq!(cells[0].value, CellValue::Int(42));
        assert_eq!(cells[1].value, CellValue::Float(1.25));
        assert_eq!(cells[2].value, CellValue::Bool(true));
        assert_eq!(cells[3].value, CellValue::Error("#DIV/0!".to_string()));
        assert_eq!(
            cells[4].value,
            CellValue::Formula("=SUM(A1:B1)".to_string())
        );
        assert_eq!(
            cells[5].value,
            CellValue::InlineString("inline & text".to_string())
        );
        assert_eq!(cells[6].value, CellValue::Empty);
        assert_eq!(cells[6].style, Some(2));
    }

    #[test]
    fn test_date_classification_through_formats() {
        use crate::styles::{CellFormat, FormatTable, NumberFormat};

        let mut formats = FormatTable::new();
        let date_style = formats.intern(CellFormat::with_number_format(NumberFormat::Builtin(14)));

        let strings = SharedStrings::new();
        let xml = format!(
            r#"<worksheet><sheetData>
<row r="1"><c r="A1" s="{}"><v>45366.5</v></c><c r="B1"><v>45366.5</v></c></row>
</sheetData></worksheet>"#,
            date_style
        );

        let rows: Vec<Row> = RowIter::new(xml.as_bytes(), &strings, Some(&formats))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(rows[0].cells[0].value, CellValue::DateTime(45366.5));
        assert_eq!(rows[0].cells[1].value, CellValue::Float(45366.5));
    }

    #[test]
    fn test_unknown_elements_are_ignored() {
        let strings = SharedStrings::new();
        let xml = r#"<worksheet>
<sheetViews><sheetView workbookViewId="0"/></sheetViews>
<sheetData>
<row r="1" spans="1:1" x:unknown="yes"><c r="A1"><v>1</v><extLst><ext uri="x"/></extLst></c></row>
</sheetData>
<pageMargins left="0.7"/>
</worksheet>"#;
        let rows = collect(xml, &strings);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells[0].value, CellValue::Int(1));
    }

    #[test]
    fn test_malformed_xml_is_fatal() {
        let strings = SharedStrings::new();
        let xml = r#"<worksheet><sheetData><row r="1"><c r="A1">"#;
        let mut iter = RowIter::new(xml.as_bytes(), &strings, None);
        assert!(iter.next().unwrap().is_err());
        // iteration stops after the fatal error
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_row_attributes() {
        let strings = SharedStrings::new();
        let xml = r#"<worksheet><sheetData>
<row r="4" ht="24" customHeight="1" hidden="1" outlineLevel="2" s="1" customFormat="1"/>
</sheetData></worksheet>"#;
        let rows = collect(xml, &strings);
        let row = &rows[0];
        assert_eq!(row.index, 4);
        assert_eq!(row.height, Some(24.0));
        assert!(row.hidden);
        assert_eq!(row.outline_level, 2);
        assert_eq!(row.style, Some(1));
        assert!(row.cells.is_empty());
    }
}
