//! Forward-only streaming writer for worksheet parts

use crate::error::{Result, SheetError};
use crate::schema::{REL_NS, SHEET_MAIN_NS};
use crate::shared_strings::SharedStrings;
use crate::types::{Cell, CellValue, Row, SheetLayout};
use crate::xml_writer::XmlWriter;
use std::io::Write;

/// Streaming worksheet writer.
///
/// Rows must arrive in strictly increasing row-index order and cells within
/// a row in strictly increasing column order; violations abort the write
/// with an ordering error, since silently reordering a forward-only stream
/// would corrupt the output. Memory usage is bounded by the widest row, not
/// by the document size.
///
/// The writer takes ownership of the session's shared string table and
/// hands it back from [`SheetWriter::finish`], so string indices keep
/// accumulating across sheets of the same workbook.
///
/// Column definitions and merged ranges are supplied upfront but emitted
/// after the row data, in the trailing position the part schema assigns
/// them.
pub struct SheetWriter<W: Write> {
    xml: XmlWriter<W>,
    strings: SharedStrings,
    layout: SheetLayout,
    last_row: u32,
}

impl<W: Write> SheetWriter<W> {
    /// Start a worksheet part without layout structures
    pub fn new(writer: W, strings: SharedStrings) -> Result<Self> {
        Self::with_layout(writer, strings, SheetLayout::default())
    }

    /// Start a worksheet part with upfront layout structures
    pub fn with_layout(writer: W, strings: SharedStrings, layout: SheetLayout) -> Result<Self> {
        let mut xml = XmlWriter::new(writer);
        xml.declaration()?;
        xml.start_element("worksheet")?;
        xml.attribute("xmlns", SHEET_MAIN_NS)?;
        xml.attribute("xmlns:r", REL_NS)?;
        xml.close_start_tag()?;
        xml.start_element("sheetData")?;
        xml.close_start_tag()?;

        Ok(SheetWriter {
            xml,
            strings,
            layout,
            last_row: 0,
        })
    }

    /// Index of the last row written, 0 before the first row
    pub fn last_row(&self) -> u32 {
        self.last_row
    }

    /// Write one row record.
    ///
    /// The row's cells are emitted immediately; nothing of the row is
    /// retained afterwards.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        if row.index <= self.last_row {
            return Err(SheetError::RowOrder {
                last: self.last_row,
                given: row.index,
            });
        }
        self.last_row = row.index;

        self.xml.start_element("row")?;
        self.xml.attribute_int("r", row.index as i64)?;
        if let Some(height) = row.height {
            self.xml.attribute_float("ht", height)?;
            self.xml.attribute("customHeight", "1")?;
        }
        if row.hidden {
            self.xml.attribute("hidden", "1")?;
        }
        if row.outline_level > 0 {
            self.xml.attribute_int("outlineLevel", row.outline_level as i64)?;
        }
        if let Some(style) = row.style {
            self.xml.attribute_int("s", style as i64)?;
            self.xml.attribute("customFormat", "1")?;
        }
        self.xml.close_start_tag()?;

        let mut last_col = 0u32;
        for cell in &row.cells {
            if cell.row != row.index {
                return Err(SheetError::Format(format!(
                    "cell {} does not belong to row {}",
                    cell.reference(),
                    row.index
                )));
            }
            if cell.col <= last_col {
                return Err(SheetError::CellOrder {
                    row: row.index,
                    last: last_col,
                    given: cell.col,
                });
            }
            last_col = cell.col;
            self.write_cell(cell)?;
        }

        self.xml.end_element("row")
    }

    fn write_cell(&mut self, cell: &Cell) -> Result<()> {
        // Unstyled empty cells carry no information and are not emitted
        if cell.value.is_empty() && cell.style.is_none() {
            return Ok(());
        }

        let reference = cell.reference();
        self.xml.start_element("c")?;
        self.xml.attribute("r", &reference)?;
        if let Some(style) = cell.style {
            self.xml.attribute_int("s", style as i64)?;
        }

        match &cell.value {
            CellValue::Empty => self.xml.close_empty(),
            CellValue::Int(i) => {
                self.xml.close_start_tag()?;
                self.xml.write_raw(b"<v>")?;
                self.xml.write_int(*i)?;
                self.xml.write_raw(b"</v>")?;
                self.xml.end_element("c")
            }
            CellValue::Float(f) => {
                self.xml.close_start_tag()?;
                self.xml.write_raw(b"<v>")?;
                self.xml.write_str(&f.to_string())?;
                self.xml.write_raw(b"</v>")?;
                self.xml.end_element("c")
            }
            CellValue::DateTime(serial) => {
                self.xml.close_start_tag()?;
                self.xml.write_raw(b"<v>")?;
                self.xml.write_str(&serial.to_string())?;
                self.xml.write_raw(b"</v>")?;
                self.xml.end_element("c")
            }
            CellValue::String(s) => {
                let index = self.strings.intern(s);
                self.xml.attribute("t", "s")?;
                self.xml.close_start_tag()?;
                self.xml.write_raw(b"<v>")?;
                self.xml.write_int(index as i64)?;
                self.xml.write_raw(b"</v>")?;
                self.xml.end_element("c")
            }
            CellValue::InlineString(s) => {
                self.xml.attribute("t", "inlineStr")?;
                self.xml.close_start_tag()?;
                self.xml.write_raw(b"<is><t>")?;
                self.xml.write_escaped(s)?;
                self.xml.write_raw(b"</t></is>")?;
                self.xml.end_element("c")
            }
            CellValue::Bool(b) => {
                self.xml.attribute("t", "b")?;
                self.xml.close_start_tag()?;
                self.xml
                    .write_raw(if *b { b"<v>1</v>" } else { b"<v>0</v>" })?;
                self.xml.end_element("c")
            }
            CellValue::Error(e) => {
                self.xml.attribute("t", "e")?;
                self.xml.close_start_tag()?;
                self.xml.write_raw(b"<v>")?;
                self.xml.write_escaped(e)?;
                self.xml.write_raw(b"</v>")?;
                self.xml.end_element("c")
            }
            CellValue::Formula(f) => {
                self.xml.close_start_tag()?;
                self.xml.write_raw(b"<f>")?;
                // the '=' prefix marks formulas in memory, not on the wire
                self.xml.write_escaped(f.strip_prefix('=').unwrap_or(f))?;
                self.xml.write_raw(b"</f>")?;
                self.xml.end_element("c")
            }
        }
    }

    /// Close the part: emits the buffered trailing sections, then returns
    /// the underlying writer and the shared string table.
    pub fn finish(mut self) -> Result<(W, SharedStrings)> {
        self.xml.end_element("sheetData")?;

        if !self.layout.columns.is_empty() {
            self.xml.start_element("cols")?;
            self.xml.close_start_tag()?;
            for col in &self.layout.columns {
                self.xml.start_element("col")?;
                self.xml.attribute_int("min", col.min as i64)?;
                self.xml.attribute_int("max", col.max as i64)?;
                if let Some(width) = col.width {
                    self.xml.attribute_float("width", width)?;
                    self.xml.attribute("customWidth", "1")?;
                }
                if col.hidden {
                    self.xml.attribute("hidden", "1")?;
                }
                if let Some(style) = col.style {
                    self.xml.attribute_int("style", style as i64)?;
                }
                self.xml.close_empty()?;
            }
            self.xml.end_element("cols")?;
        }

        if !self.layout.merged.is_empty() {
            self.xml.start_element("mergeCells")?;
            self.xml.attribute_int("count", self.layout.merged.len() as i64)?;
            self.xml.close_start_tag()?;
            for range in &self.layout.merged {
                self.xml.start_element("mergeCell")?;
                self.xml.attribute("ref", &range.reference())?;
                self.xml.close_empty()?;
            }
            self.xml.end_element("mergeCells")?;
        }

        for rule in &self.layout.conditional {
            self.xml.start_element("conditionalFormatting")?;
            self.xml.attribute("sqref", &rule.reference)?;
            self.xml.close_start_tag()?;
            self.xml.start_element("cfRule")?;
            self.xml.attribute("type", &rule.rule_type)?;
            if let Some(dxf_id) = rule.dxf_id {
                self.xml.attribute_int("dxfId", dxf_id as i64)?;
            }
            self.xml.attribute_int("priority", rule.priority as i64)?;
            if let Some(operator) = &rule.operator {
                self.xml.attribute("operator", operator)?;
            }
            if rule.formulas.is_empty() {
                self.xml.close_empty()?;
            } else {
                self.xml.close_start_tag()?;
                for formula in &rule.formulas {
                    self.xml.start_element("formula")?;
                    self.xml.close_start_tag()?;
                    self.xml.write_escaped(formula)?;
                    self.xml.end_element("formula")?;
                }
                self.xml.end_element("cfRule")?;
            }
            self.xml.end_element("conditionalFormatting")?;
        }

        self.xml.end_element("worksheet")?;
        let writer = self.xml.into_inner()?;
        Ok((writer, self.strings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSpec, ConditionalFormat, MergedRange};

    fn write_rows(rows: &[Row]) -> (String, SharedStrings) {
        let mut writer = SheetWriter::new(Vec::new(), SharedStrings::new()).unwrap();
        for row in rows {
            writer.write_row(row).unwrap();
        }
        let (buf, strings) = writer.finish().unwrap();
        (String::from_utf8(buf).unwrap(), strings)
    }

    #[test]
    fn test_write_typed_row() {
        let mut row = Row::new(1);
        row.push(CellValue::from("Name"));
        row.push(CellValue::Int(42));
        row.push(CellValue::Float(1.5));
        row.push(CellValue::Bool(true));

        let (xml, strings) = write_rows(&[row]);
        assert!(xml.contains("<row r=\"1\"><c r=\"A1\" t=\"s\"><v>0</v></c>"));
        assert!(xml.contains("<c r=\"B1\"><v>42</v></c>"));
        assert!(xml.contains("<c r=\"C1\"><v>1.5</v></c>"));
        assert!(xml.contains("<c r=\"D1\" t=\"b\"><v>1</v></c>"));
        assert_eq!(strings.count(), 1);
    }

    #[test]
    fn test_formula_written_without_prefix() {
        let mut row = Row::new(1);
        row.push(CellValue::Formula("=SUM(A1:A10)".to_string()));
        let (xml, _) = write_rows(&[row]);
        assert!(xml.contains("<c r=\"A1\"><f>SUM(A1:A10)</f></c>"));
    }

    #[test]
    fn test_rejects_out_of_order_rows() {
        let mut writer = SheetWriter::new(Vec::new(), SharedStrings::new()).unwrap();
        writer.write_row(&Row::new(5)).unwrap();

        let err = writer.write_row(&Row::new(5)).unwrap_err();
        assert!(matches!(err, SheetError::RowOrder { last: 5, given: 5 }));
        let err = writer.write_row(&Row::new(3)).unwrap_err();
        assert!(matches!(err, SheetError::RowOrder { last: 5, given: 3 }));
    }

    #[test]
    fn test_rejects_out_of_order_cells() {
        let mut writer = SheetWriter::new(Vec::new(), SharedStrings::new()).unwrap();
        let row = Row::with_cells(
            1,
            vec![
                Cell::new(1, 2, CellValue::Int(1)),
                Cell::new(1, 2, CellValue::Int(2)),
            ],
        );
        let err = writer.write_row(&row).unwrap_err();
        assert!(matches!(
            err,
            SheetError::CellOrder {
                row: 1,
                last: 2,
                given: 2
            }
        ));
    }

    #[test]
    fn test_skips_bare_empty_cells_but_keeps_styled_ones() {
        let row = Row::with_cells(
            1,
            vec![
                Cell::new(1, 1, CellValue::Empty),
                Cell::styled(1, 2, CellValue::Empty, 3),
            ],
        );
        let (xml, _) = write_rows(&[row]);
        assert!(!xml.contains("r=\"A1\""));
        assert!(xml.contains("<c r=\"B1\" s=\"3\"/>"));
    }

    #[test]
    fn test_trailing_sections_after_sheet_data() {
        let layout = SheetLayout {
            columns: vec![ColumnSpec::width(1, 20.0)],
            merged: vec![MergedRange::new(1, 1, 2, 2)],
            conditional: vec![ConditionalFormat {
                reference: "A1:A10".to_string(),
                rule_type: "cellIs".to_string(),
                priority: 1,
                operator: Some("greaterThan".to_string()),
                formulas: vec!["5".to_string()],
                dxf_id: None,
            }],
        };
        let mut writer =
            SheetWriter::with_layout(Vec::new(), SharedStrings::new(), layout).unwrap();
        writer.write_row(&Row::new(1)).unwrap();
        let (buf, _) = writer.finish().unwrap();
        let xml = String::from_utf8(buf).unwrap();

        let data_end = xml.find("</sheetData>").unwrap();
        let cols = xml.find("<cols>").unwrap();
        let merges = xml.find("<mergeCells count=\"1\">").unwrap();
        let conditional = xml.find("<conditionalFormatting sqref=\"A1:A10\">").unwrap();
        assert!(data_end < cols);
        assert!(cols < merges);
        assert!(merges < conditional);
        assert!(xml.contains("<col min=\"1\" max=\"1\" width=\"20\" customWidth=\"1\"/>"));
        assert!(xml.contains("<mergeCell ref=\"A1:B2\"/>"));
        assert!(xml.contains(
            "<cfRule type=\"cellIs\" priority=\"1\" operator=\"greaterThan\"><formula>5</formula></cfRule>"
        ));
    }

    #[test]
    fn test_row_attributes() {
        let mut row = Row::new(2);
        row.height = Some(24.0);
        row.hidden = true;
        row.outline_level = 1;
        let (xml, _) = write_rows(&[row]);
        assert!(xml.contains(
            "<row r=\"2\" ht=\"24\" customHeight=\"1\" hidden=\"1\" outlineLevel=\"1\">"
        ));
    }
}
