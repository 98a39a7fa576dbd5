//! Integration tests for sheetstream

use sheetstream::styles::{CellFormat, Font, NumberFormat};
use sheetstream::types::{
    Cell, CellValue, ColumnSpec, ConditionalFormat, MergedRange, Row, SheetLayout,
};
use sheetstream::writer::WorkbookWriter;
use sheetstream::{ExternalRange, SheetError, WorkbookReader};
use std::io::Write;
use tempfile::NamedTempFile;
use zip::write::FileOptions;

#[test]
fn test_value_types_roundtrip() {
    let temp = NamedTempFile::new().unwrap();

    let date_style;
    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        date_style = writer.add_format(CellFormat::with_number_format(NumberFormat::Builtin(14)));

        let mut row = Row::new(1);
        row.push(CellValue::Int(42));
        row.push(CellValue::Float(1234.56));
        row.push(CellValue::String("shared text".to_string()));
        row.push(CellValue::InlineString("inline text".to_string()));
        row.push(CellValue::Bool(false));
        row.push_styled(CellValue::DateTime(45366.5), date_style);
        row.push(CellValue::Error("#DIV/0!".to_string()));
        row.push(CellValue::Formula("=SUM(A1:B1)".to_string()));
        writer.write_row(&row).unwrap();

        writer.save().unwrap();
    }

    {
        let mut reader = WorkbookReader::open(temp.path()).unwrap();
        let rows: Vec<Row> = reader
            .rows("Sheet1")
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(rows.len(), 1);
        let cells = &rows[0].cells;
        assert_eq!(cells[0].value, CellValue::Int(42));
        assert_eq!(cells[1].value, CellValue::Float(1234.56));
        assert_eq!(cells[2].value, CellValue::String("shared text".to_string()));
        assert_eq!(
            cells[3].value,
            CellValue::InlineString("inline text".to_string())
        );
        assert_eq!(cells[4].value, CellValue::Bool(false));
        assert_eq!(cells[5].value, CellValue::DateTime(45366.5));
        assert_eq!(cells[5].style, Some(date_style));
        assert_eq!(cells[6].value, CellValue::Error("#DIV/0!".to_string()));
        assert_eq!(cells[7].value, CellValue::Formula("=SUM(A1:B1)".to_string()));
    }
}

#[test]
fn test_row_records_roundtrip_exactly() {
    let temp = NamedTempFile::new().unwrap();

    let mut written = vec![
        Row::with_cells(
            2,
            vec![
                Cell::new(2, 1, CellValue::Int(1)),
                Cell::new(2, 4, CellValue::String("sparse".to_string())),
            ],
        ),
        Row::with_cells(7, vec![Cell::new(7, 2, CellValue::Bool(true))]),
    ];
    written[1].height = Some(30.0);
    written[1].hidden = true;

    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        for row in &written {
            writer.write_row(row).unwrap();
        }
        writer.save().unwrap();
    }

    {
        let mut reader = WorkbookReader::open(temp.path()).unwrap();
        let rows: Vec<Row> = reader
            .rows("Sheet1")
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(rows, written);
    }
}

#[test]
fn test_sparse_rows_are_not_synthesized() {
    let temp = NamedTempFile::new().unwrap();

    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        for index in [1u32, 3, 5] {
            let row = Row::with_cells(
                index,
                vec![Cell::new(index, 1, CellValue::Int(index as i64))],
            );
            writer.write_row(&row).unwrap();
        }
        writer.save().unwrap();
    }

    {
        let mut reader = WorkbookReader::open(temp.path()).unwrap();
        let rows: Vec<Row> = reader
            .rows("Sheet1")
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
    }
}

#[test]
fn test_styled_cells_keep_their_format() {
    let temp = NamedTempFile::new().unwrap();

    let bold = CellFormat::with_font(Font {
        bold: true,
        ..Font::default()
    });

    let bold_idx;
    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        bold_idx = writer.add_format(bold.clone());
        // interning the same format again returns the same index
        assert_eq!(writer.add_format(bold.clone()), bold_idx);

        writer
            .append_styled(&[(CellValue::String("Header".to_string()), bold_idx)])
            .unwrap();
        writer.save().unwrap();
    }

    {
        let mut reader = WorkbookReader::open(temp.path()).unwrap();
        let rows: Vec<Row> = reader
            .rows("Sheet1")
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].cells[0].style, Some(bold_idx));
        assert_eq!(reader.formats().get(bold_idx), Some(&bold));
    }
}

#[test]
fn test_external_links_roundtrip() {
    let temp = NamedTempFile::new().unwrap();

    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        writer.append(&[CellValue::Int(1)]).unwrap();
        writer
            .add_external_book(
                "book1.xlsx",
                vec![
                    ExternalRange::new("B2range", "='Sheet1'!$A$1:$A$10"),
                    ExternalRange::new("C3", "='Sheet1'!$B$2"),
                ],
            )
            .unwrap();
        writer.save().unwrap();
    }

    {
        let mut reader = WorkbookReader::open(temp.path()).unwrap();
        let books = reader.external_books().unwrap();
        assert_eq!(books.len(), 1);

        let book = &books[0];
        assert_eq!(book.target, "book1.xlsx");
        assert_eq!(book.ranges.len(), 2);
        assert_eq!(book.ranges[0].name, "B2range");
        assert_eq!(book.ranges[0].refers_to, "='Sheet1'!$A$1:$A$10");
        assert_eq!(book.ranges[1].name, "C3");
        assert_eq!(book.ranges[1].refers_to, "='Sheet1'!$B$2");
    }
}

#[test]
fn test_defined_names_roundtrip() {
    let temp = NamedTempFile::new().unwrap();

    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        writer.append(&[CellValue::Int(1)]).unwrap();
        writer.add_defined_name("my_range", "Sheet1!$A$1:$B$2");
        writer.save().unwrap();
    }

    {
        let reader = WorkbookReader::open(temp.path()).unwrap();
        assert_eq!(
            reader.defined_names(),
            &[("my_range".to_string(), "Sheet1!$A$1:$B$2".to_string())]
        );
    }
}

#[test]
fn test_multi_sheet() {
    let temp = NamedTempFile::new().unwrap();

    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        writer.append(&[CellValue::from("Sheet1 data")]).unwrap();

        writer.add_sheet("Данные").unwrap(); // Unicode sheet name
        writer.append(&[CellValue::from("Russian")]).unwrap();

        writer.add_sheet("数据").unwrap();
        writer.append(&[CellValue::from("Chinese")]).unwrap();

        writer.save().unwrap();
    }

    {
        let mut reader = WorkbookReader::open(temp.path()).unwrap();
        assert_eq!(
            reader.sheet_names(),
            vec!["Sheet1", "Данные", "数据"]
        );

        let rows: Vec<Row> = reader
            .rows("Данные")
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(
            rows[0].cells[0].value,
            CellValue::String("Russian".to_string())
        );
    }
}

#[test]
fn test_special_characters() {
    let temp = NamedTempFile::new().unwrap();

    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        writer
            .append(&[
                CellValue::from("Text with <xml> tags"),
                CellValue::from("Quote: \"Hello\""),
                CellValue::from("Ampersand: &"),
                CellValue::from("Apostrophe: '"),
            ])
            .unwrap();
        writer
            .append(&[
                CellValue::from("Emoji: 😀🎉"),
                CellValue::from("Unicode: Ñoño"),
                CellValue::from("Currency: €£¥"),
            ])
            .unwrap();
        writer.save().unwrap();
    }

    {
        let mut reader = WorkbookReader::open(temp.path()).unwrap();
        let rows: Vec<Row> = reader
            .rows("Sheet1")
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert_eq!(
            rows[0].to_strings(),
            vec![
                "Text with <xml> tags",
                "Quote: \"Hello\"",
                "Ampersand: &",
                "Apostrophe: '"
            ]
        );
        assert_eq!(
            rows[1].to_strings(),
            vec!["Emoji: 😀🎉", "Unicode: Ñoño", "Currency: €£¥"]
        );
    }
}

#[test]
fn test_large_dataset_streaming() {
    let temp = NamedTempFile::new().unwrap();
    let num_rows = 1000;

    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        for i in 0..num_rows {
            writer
                .append(&[CellValue::Int(i), CellValue::Int(i * 2)])
                .unwrap();
        }
        writer.save().unwrap();
    }

    {
        let mut reader = WorkbookReader::open(temp.path()).unwrap();
        let mut count = 0i64;
        for row in reader.rows("Sheet1").unwrap() {
            let row = row.unwrap();
            assert_eq!(row.cells[1].value, CellValue::Int(count * 2));
            count += 1;
        }
        assert_eq!(count, num_rows);
    }
}

#[test]
fn test_layout_sections_are_written() {
    let temp = NamedTempFile::new().unwrap();

    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        writer
            .add_sheet_with(
                "Laid out",
                SheetLayout {
                    columns: vec![ColumnSpec::width(1, 24.0)],
                    merged: vec![MergedRange::new(1, 1, 1, 3)],
                    conditional: vec![ConditionalFormat {
                        reference: "A1:A100".to_string(),
                        rule_type: "cellIs".to_string(),
                        priority: 1,
                        operator: Some("lessThan".to_string()),
                        formulas: vec!["0".to_string()],
                        dxf_id: None,
                    }],
                },
            )
            .unwrap();
        writer.append(&[CellValue::from("merged header")]).unwrap();
        writer.save().unwrap();
    }

    // the layout sections land after the row data in the part
    let mut archive = zip::ZipArchive::new(std::fs::File::open(temp.path()).unwrap()).unwrap();
    let mut xml = String::new();
    {
        use std::io::Read;
        archive
            .by_name("xl/worksheets/sheet2.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
    }
    let data_end = xml.find("</sheetData>").unwrap();
    assert!(xml.find("<cols>").unwrap() > data_end);
    assert!(xml.contains("<mergeCell ref=\"A1:C1\"/>"));
    assert!(xml.contains("<conditionalFormatting sqref=\"A1:A100\">"));
}

#[test]
fn test_sheet_not_found_error() {
    let temp = NamedTempFile::new().unwrap();

    {
        let mut writer = WorkbookWriter::new(temp.path()).unwrap();
        writer.append(&[CellValue::from("data")]).unwrap();
        writer.save().unwrap();
    }

    {
        let mut reader = WorkbookReader::open(temp.path()).unwrap();
        let err = reader.rows("NonExistent").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("NonExistent"));
        assert!(message.contains("Available"));
        assert!(message.contains("Sheet1"));
    }
}

/// Build a minimal hand-rolled package: workbook + one sheet, no styles
/// part, no shared strings part.
fn write_minimal_package(path: &std::path::Path, include_workbook: bool) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::<()>::default();

    zip.start_file("[Content_Types].xml", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#,
    )
    .unwrap();

    zip.start_file("_rels/.rels", options).unwrap();
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#,
    )
    .unwrap();

    if include_workbook {
        zip.start_file("xl/workbook.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Only" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#,
        )
        .unwrap();

        zip.start_file("xl/_rels/workbook.xml.rels", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#,
        )
        .unwrap();

        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData><row r="1"><c r="A1"><v>7</v></c></row></sheetData>
</worksheet>"#,
        )
        .unwrap();
    }

    zip.finish().unwrap();
}

#[test]
fn test_missing_styles_part_yields_default_table() {
    let temp = NamedTempFile::new().unwrap();
    write_minimal_package(temp.path(), true);

    let mut reader = WorkbookReader::open(temp.path()).unwrap();
    assert_eq!(reader.formats().len(), 1);
    assert_eq!(
        reader.formats().get(0),
        Some(&sheetstream::CellFormat::default())
    );

    let rows: Vec<Row> = reader
        .rows("Only")
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(rows[0].cells[0].value, CellValue::Int(7));
}

#[test]
fn test_missing_workbook_part_is_fatal() {
    let temp = NamedTempFile::new().unwrap();
    write_minimal_package(temp.path(), false);

    let err = WorkbookReader::open(temp.path()).unwrap_err();
    assert!(matches!(err, SheetError::MissingPart(_)));
}
