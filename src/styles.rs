//! Style definitions and the session-scoped format interner
//!
//! Style components are plain immutable value types compared by structure,
//! never by identity: two independently built but equal definitions always
//! collapse to the same table index.

use crate::error::Result;
use crate::schema::SHEET_MAIN_NS;
use crate::xml_writer::XmlWriter;
use indexmap::{IndexMap, IndexSet};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::hash::{Hash, Hasher};
use std::io::Write;

/// First free id for custom number formats; lower ids are reserved for
/// the builtin table.
const CUSTOM_NUM_FMT_BASE: u32 = 164;

/// Font definition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Font {
    pub name: Option<String>,
    /// Size in points
    pub size: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    /// Underline style ("single", "double", ...) when underlined
    pub underline: Option<String>,
    pub strike: bool,
    /// RGB color ("FF0000") or theme reference ("theme:1")
    pub color: Option<String>,
}

impl Eq for Font {}

impl Hash for Font {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.size.map(f64::to_bits).hash(state);
        self.bold.hash(state);
        self.italic.hash(state);
        self.underline.hash(state);
        self.strike.hash(state);
        self.color.hash(state);
    }
}

/// Pattern fill definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Fill {
    /// Pattern type ("solid", "gray125", ...); `None` means no fill
    pub pattern: Option<String>,
    pub fg_color: Option<String>,
    pub bg_color: Option<String>,
}

impl Fill {
    /// Solid fill with the given foreground color
    pub fn solid(color: &str) -> Self {
        Fill {
            pattern: Some("solid".to_string()),
            fg_color: Some(color.to_string()),
            bg_color: None,
        }
    }
}

/// One side of a cell border
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BorderSide {
    /// Line style ("thin", "medium", "dashed", ...)
    pub style: Option<String>,
    pub color: Option<String>,
}

/// Cell border definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Border {
    pub left: BorderSide,
    pub right: BorderSide,
    pub top: BorderSide,
    pub bottom: BorderSide,
    pub diagonal: BorderSide,
}

impl Border {
    /// Same line style on all four outer sides
    pub fn all(style: &str) -> Self {
        let side = BorderSide {
            style: Some(style.to_string()),
            color: None,
        };
        Border {
            left: side.clone(),
            right: side.clone(),
            top: side.clone(),
            bottom: side,
            diagonal: BorderSide::default(),
        }
    }
}

/// Cell alignment definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Alignment {
    pub horizontal: Option<String>,
    pub vertical: Option<String>,
    pub wrap_text: bool,
    pub indent: u32,
}

/// Cell protection flags
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Protection {
    pub locked: bool,
    pub hidden: bool,
}

impl Default for Protection {
    fn default() -> Self {
        // Cells are locked unless a format says otherwise
        Protection {
            locked: true,
            hidden: false,
        }
    }
}

/// Number format: either one of the builtin ids or a custom format code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NumberFormat {
    Builtin(u16),
    Custom(String),
}

impl Default for NumberFormat {
    fn default() -> Self {
        NumberFormat::Builtin(0)
    }
}

impl NumberFormat {
    /// Whether values carrying this format are date/time serials.
    ///
    /// Builtin ids 14-22 and 45-47 are the date and time formats; custom
    /// codes count as dates when they contain a date token outside quoted
    /// literals and bracketed sections.
    pub fn is_date(&self) -> bool {
        match self {
            NumberFormat::Builtin(id) => matches!(id, 14..=22 | 45..=47),
            NumberFormat::Custom(code) => code_has_date_token(code),
        }
    }
}

fn code_has_date_token(code: &str) -> bool {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;
    for ch in code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            c if !in_quotes && !in_brackets => {
                if matches!(c.to_ascii_lowercase(), 'y' | 'm' | 'd' | 'h' | 's') {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// An immutable composite cell format.
///
/// Equality and hashing are fully structural, which is what makes the
/// interner in [`FormatTable`] collapse independently constructed but
/// identical formats onto one index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CellFormat {
    pub font: Font,
    pub fill: Fill,
    pub border: Border,
    pub alignment: Option<Alignment>,
    pub number_format: NumberFormat,
    pub protection: Protection,
}

impl CellFormat {
    pub fn with_font(font: Font) -> Self {
        CellFormat {
            font,
            ..CellFormat::default()
        }
    }

    pub fn with_number_format(number_format: NumberFormat) -> Self {
        CellFormat {
            number_format,
            ..CellFormat::default()
        }
    }
}

/// Session-scoped format table.
///
/// Index 0 is always the default format, present even if unused. The table
/// only grows during a session: indices already handed out stay valid.
#[derive(Debug)]
pub struct FormatTable {
    formats: IndexSet<CellFormat>,
}

impl FormatTable {
    pub fn new() -> Self {
        let mut formats = IndexSet::new();
        formats.insert(CellFormat::default());
        FormatTable { formats }
    }

    /// Intern a format: returns the existing index for a structurally equal
    /// format, otherwise assigns the next sequential index.
    pub fn intern(&mut self, format: CellFormat) -> u32 {
        self.formats.insert_full(format).0 as u32
    }

    /// Look up a format by index
    pub fn get(&self, index: u32) -> Option<&CellFormat> {
        self.formats.get_index(index as usize)
    }

    /// Number of formats in the table (at least 1)
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the format at `index` carries a date/time number format
    pub fn is_date_index(&self, index: u32) -> bool {
        self.get(index)
            .map(|f| f.number_format.is_date())
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellFormat> {
        self.formats.iter()
    }
}

impl Default for FormatTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize the format table as a stylesheet part.
///
/// Component definitions (number formats, fonts, fills, borders) are
/// interned into their own ordered tables so each distinct component is
/// written once and referenced by id from the `cellXfs` records.
pub fn write_stylesheet<W: Write>(table: &FormatTable, xml: &mut XmlWriter<W>) -> Result<()> {
    let mut custom_formats: IndexSet<&str> = IndexSet::new();
    let mut fonts: IndexSet<&Font> = IndexSet::new();
    let mut fills: IndexSet<&Fill> = IndexSet::new();
    let mut borders: IndexSet<&Border> = IndexSet::new();

    let default_fill = Fill::default();
    let gray_fill = Fill {
        pattern: Some("gray125".to_string()),
        fg_color: None,
        bg_color: None,
    };

    for format in table.iter() {
        if let NumberFormat::Custom(code) = &format.number_format {
            custom_formats.insert(code);
        }
        fonts.insert(&format.font);
        if format.fill != default_fill && format.fill != gray_fill {
            fills.insert(&format.fill);
        }
        borders.insert(&format.border);
    }

    let num_fmt_id = |nf: &NumberFormat| -> u32 {
        match nf {
            NumberFormat::Builtin(id) => *id as u32,
            NumberFormat::Custom(code) => {
                CUSTOM_NUM_FMT_BASE
                    + custom_formats.get_index_of(code.as_str()).unwrap_or(0) as u32
            }
        }
    };
    // Fill slots 0 and 1 are reserved for the two mandatory pattern fills
    let fill_id = |fill: &Fill| -> u32 {
        if *fill == default_fill {
            0
        } else if *fill == gray_fill {
            1
        } else {
            2 + fills.get_index_of(fill).unwrap_or(0) as u32
        }
    };

    xml.declaration()?;
    xml.start_element("styleSheet")?;
    xml.attribute("xmlns", SHEET_MAIN_NS)?;
    xml.close_start_tag()?;

    if !custom_formats.is_empty() {
        xml.start_element("numFmts")?;
        xml.attribute_int("count", custom_formats.len() as i64)?;
        xml.close_start_tag()?;
        for (i, code) in custom_formats.iter().enumerate() {
            xml.start_element("numFmt")?;
            xml.attribute_int("numFmtId", (CUSTOM_NUM_FMT_BASE + i as u32) as i64)?;
            xml.attribute("formatCode", code)?;
            xml.close_empty()?;
        }
        xml.end_element("numFmts")?;
    }

    xml.start_element("fonts")?;
    xml.attribute_int("count", fonts.len() as i64)?;
    xml.close_start_tag()?;
    for font in &fonts {
        write_font(font, xml)?;
    }
    xml.end_element("fonts")?;

    xml.start_element("fills")?;
    xml.attribute_int("count", (fills.len() + 2) as i64)?;
    xml.close_start_tag()?;
    write_fill(&default_fill, xml)?;
    write_fill(&gray_fill, xml)?;
    for fill in &fills {
        write_fill(fill, xml)?;
    }
    xml.end_element("fills")?;

    xml.start_element("borders")?;
    xml.attribute_int("count", borders.len() as i64)?;
    xml.close_start_tag()?;
    for border in &borders {
        write_border(border, xml)?;
    }
    xml.end_element("borders")?;

    xml.start_element("cellStyleXfs")?;
    xml.attribute_int("count", 1)?;
    xml.close_start_tag()?;
    xml.start_element("xf")?;
    xml.attribute_int("numFmtId", 0)?;
    xml.attribute_int("fontId", 0)?;
    xml.attribute_int("fillId", 0)?;
    xml.attribute_int("borderId", 0)?;
    xml.close_empty()?;
    xml.end_element("cellStyleXfs")?;

    xml.start_element("cellXfs")?;
    xml.attribute_int("count", table.len() as i64)?;
    xml.close_start_tag()?;
    for format in table.iter() {
        let font_id = fonts.get_index_of(&format.font).unwrap_or(0) as u32;
        let border_id = borders.get_index_of(&format.border).unwrap_or(0) as u32;
        let nfmt = num_fmt_id(&format.number_format);

        xml.start_element("xf")?;
        xml.attribute_int("numFmtId", nfmt as i64)?;
        xml.attribute_int("fontId", font_id as i64)?;
        xml.attribute_int("fillId", fill_id(&format.fill) as i64)?;
        xml.attribute_int("borderId", border_id as i64)?;
        xml.attribute_int("xfId", 0)?;
        if nfmt != 0 {
            xml.attribute("applyNumberFormat", "1")?;
        }
        if font_id != 0 {
            xml.attribute("applyFont", "1")?;
        }
        if format.fill != default_fill {
            xml.attribute("applyFill", "1")?;
        }
        if border_id != 0 {
            xml.attribute("applyBorder", "1")?;
        }
        if format.alignment.is_some() {
            xml.attribute("applyAlignment", "1")?;
        }
        if format.protection != Protection::default() {
            xml.attribute("applyProtection", "1")?;
        }

        let has_children =
            format.alignment.is_some() || format.protection != Protection::default();
        if has_children {
            xml.close_start_tag()?;
            if let Some(alignment) = &format.alignment {
                xml.start_element("alignment")?;
                if let Some(h) = &alignment.horizontal {
                    xml.attribute("horizontal", h)?;
                }
                if let Some(v) = &alignment.vertical {
                    xml.attribute("vertical", v)?;
                }
                if alignment.wrap_text {
                    xml.attribute("wrapText", "1")?;
                }
                if alignment.indent > 0 {
                    xml.attribute_int("indent", alignment.indent as i64)?;
                }
                xml.close_empty()?;
            }
            if format.protection != Protection::default() {
                xml.start_element("protection")?;
                if !format.protection.locked {
                    xml.attribute("locked", "0")?;
                }
                if format.protection.hidden {
                    xml.attribute("hidden", "1")?;
                }
                xml.close_empty()?;
            }
            xml.end_element("xf")?;
        } else {
            xml.close_empty()?;
        }
    }
    xml.end_element("cellXfs")?;

    xml.end_element("styleSheet")?;
    xml.flush()?;
    Ok(())
}

fn write_color<W: Write>(name: &str, color: &str, xml: &mut XmlWriter<W>) -> Result<()> {
    xml.start_element(name)?;
    if let Some(theme) = color.strip_prefix("theme:") {
        xml.attribute("theme", theme)?;
    } else {
        xml.attribute("rgb", color)?;
    }
    xml.close_empty()
}

fn write_font<W: Write>(font: &Font, xml: &mut XmlWriter<W>) -> Result<()> {
    xml.start_element("font")?;
    xml.close_start_tag()?;
    if font.bold {
        xml.write_raw(b"<b/>")?;
    }
    if font.italic {
        xml.write_raw(b"<i/>")?;
    }
    if let Some(underline) = &font.underline {
        if underline == "single" {
            xml.write_raw(b"<u/>")?;
        } else {
            xml.start_element("u")?;
            xml.attribute("val", underline)?;
            xml.close_empty()?;
        }
    }
    if font.strike {
        xml.write_raw(b"<strike/>")?;
    }
    if let Some(size) = font.size {
        xml.start_element("sz")?;
        xml.attribute_float("val", size)?;
        xml.close_empty()?;
    }
    if let Some(color) = &font.color {
        write_color("color", color, xml)?;
    }
    if let Some(name) = &font.name {
        xml.start_element("name")?;
        xml.attribute("val", name)?;
        xml.close_empty()?;
    }
    xml.end_element("font")
}

fn write_fill<W: Write>(fill: &Fill, xml: &mut XmlWriter<W>) -> Result<()> {
    xml.start_element("fill")?;
    xml.close_start_tag()?;
    xml.start_element("patternFill")?;
    match &fill.pattern {
        Some(pattern) => xml.attribute("patternType", pattern)?,
        None => xml.attribute("patternType", "none")?,
    }
    if fill.fg_color.is_none() && fill.bg_color.is_none() {
        xml.close_empty()?;
    } else {
        xml.close_start_tag()?;
        if let Some(fg) = &fill.fg_color {
            write_color("fgColor", fg, xml)?;
        }
        if let Some(bg) = &fill.bg_color {
            write_color("bgColor", bg, xml)?;
        }
        xml.end_element("patternFill")?;
    }
    xml.end_element("fill")
}

fn write_border_side<W: Write>(name: &str, side: &BorderSide, xml: &mut XmlWriter<W>) -> Result<()> {
    xml.start_element(name)?;
    match &side.style {
        None => xml.close_empty(),
        Some(style) => {
            xml.attribute("style", style)?;
            match &side.color {
                None => xml.close_empty(),
                Some(color) => {
                    xml.close_start_tag()?;
                    write_color("color", color, xml)?;
                    xml.end_element(name)
                }
            }
        }
    }
}

fn write_border<W: Write>(border: &Border, xml: &mut XmlWriter<W>) -> Result<()> {
    xml.start_element("border")?;
    xml.close_start_tag()?;
    write_border_side("left", &border.left, xml)?;
    write_border_side("right", &border.right, xml)?;
    write_border_side("top", &border.top, xml)?;
    write_border_side("bottom", &border.bottom, xml)?;
    write_border_side("diagonal", &border.diagonal, xml)?;
    xml.end_element("border")
}

fn attr_str(e: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return Some(String::from_utf8_lossy(&attr.value).to_string());
        }
    }
    None
}

fn attr_u32(e: &BytesStart, key: &[u8]) -> Option<u32> {
    attr_str(e, key).and_then(|s| s.parse().ok())
}

fn attr_color(e: &BytesStart) -> Option<String> {
    attr_str(e, b"rgb").or_else(|| attr_str(e, b"theme").map(|t| format!("theme:{}", t)))
}

/// Parse a stylesheet part back into a format table.
///
/// Unknown elements and attributes are skipped. The resulting table always
/// has the default format at index 0; by convention the first `xf` record
/// of a stylesheet is that default.
pub fn parse_stylesheet(xml: &[u8]) -> Result<FormatTable> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut fonts: Vec<Font> = Vec::new();
    let mut fills: Vec<Fill> = Vec::new();
    let mut borders: Vec<Border> = Vec::new();
    let mut num_formats: IndexMap<u32, String> = IndexMap::new();

    let mut in_font = false;
    let mut in_fill = false;
    let mut in_border = false;
    let mut in_cell_xfs = false;
    let mut border_side: Option<&'static str> = None;

    let mut font = Font::default();
    let mut fill = Fill::default();
    let mut border = Border::default();
    let mut table = FormatTable::new();
    let mut xf: Option<CellFormat> = None;
    let mut first_xf = true;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        let empty = matches!(&event, Event::Empty(_));
        match &event {
            Event::Start(e) | Event::Empty(e) => {
                match e.name().as_ref() {
                    b"font" => {
                        in_font = true;
                        font = Font::default();
                        if empty {
                            fonts.push(std::mem::take(&mut font));
                            in_font = false;
                        }
                    }
                    b"fill" => {
                        in_fill = true;
                        fill = Fill::default();
                        if empty {
                            fills.push(std::mem::take(&mut fill));
                            in_fill = false;
                        }
                    }
                    b"border" => {
                        in_border = true;
                        border = Border::default();
                        if empty {
                            borders.push(std::mem::take(&mut border));
                            in_border = false;
                        }
                    }
                    b"numFmt" => {
                        if let (Some(id), Some(code)) =
                            (attr_u32(e, b"numFmtId"), attr_str(e, b"formatCode"))
                        {
                            num_formats.insert(id, code);
                        }
                    }
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => {
                        let format = CellFormat {
                            font: attr_u32(e, b"fontId")
                                .and_then(|id| fonts.get(id as usize).cloned())
                                .unwrap_or_default(),
                            fill: attr_u32(e, b"fillId")
                                .and_then(|id| fills.get(id as usize).cloned())
                                .unwrap_or_default(),
                            border: attr_u32(e, b"borderId")
                                .and_then(|id| borders.get(id as usize).cloned())
                                .unwrap_or_default(),
                            alignment: None,
                            number_format: {
                                let id = attr_u32(e, b"numFmtId").unwrap_or(0);
                                match num_formats.get(&id) {
                                    Some(code) => NumberFormat::Custom(code.clone()),
                                    None => NumberFormat::Builtin(id as u16),
                                }
                            },
                            protection: Protection::default(),
                        };
                        if empty {
                            push_xf(&mut table, format, &mut first_xf);
                        } else {
                            xf = Some(format);
                        }
                    }
                    b"alignment" => {
                        if let Some(format) = xf.as_mut() {
                            format.alignment = Some(Alignment {
                                horizontal: attr_str(e, b"horizontal"),
                                vertical: attr_str(e, b"vertical"),
                                wrap_text: attr_str(e, b"wrapText").as_deref() == Some("1"),
                                indent: attr_u32(e, b"indent").unwrap_or(0),
                            });
                        }
                    }
                    b"protection" => {
                        if let Some(format) = xf.as_mut() {
                            format.protection = Protection {
                                locked: attr_str(e, b"locked").as_deref() != Some("0"),
                                hidden: attr_str(e, b"hidden").as_deref() == Some("1"),
                            };
                        }
                    }
                    name if in_font => parse_font_element(name, e, &mut font),
                    name if in_fill => parse_fill_element(name, e, &mut fill),
                    name if in_border => {
                        parse_border_element(name, e, empty, &mut border, &mut border_side)
                    }
                    _ => {}
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"font" => {
                    fonts.push(std::mem::take(&mut font));
                    in_font = false;
                }
                b"fill" => {
                    fills.push(std::mem::take(&mut fill));
                    in_fill = false;
                }
                b"border" => {
                    borders.push(std::mem::take(&mut border));
                    in_border = false;
                }
                b"cellXfs" => in_cell_xfs = false,
                b"xf" => {
                    if let Some(format) = xf.take() {
                        push_xf(&mut table, format, &mut first_xf);
                    }
                }
                b"left" | b"right" | b"top" | b"bottom" | b"diagonal" => border_side = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(table)
}

fn push_xf(table: &mut FormatTable, format: CellFormat, first: &mut bool) {
    // The first xf record is the stylesheet's default, already at index 0
    if *first {
        *first = false;
        if format == CellFormat::default() {
            return;
        }
    }
    table.intern(format);
}

fn parse_font_element(name: &[u8], e: &BytesStart, font: &mut Font) {
    match name {
        b"b" => font.bold = true,
        b"i" => font.italic = true,
        b"u" => font.underline = Some(attr_str(e, b"val").unwrap_or_else(|| "single".to_string())),
        b"strike" => font.strike = true,
        b"sz" => font.size = attr_str(e, b"val").and_then(|s| s.parse().ok()),
        b"name" => font.name = attr_str(e, b"val"),
        b"color" => font.color = attr_color(e),
        _ => {}
    }
}

fn parse_fill_element(name: &[u8], e: &BytesStart, fill: &mut Fill) {
    match name {
        b"patternFill" => {
            fill.pattern = attr_str(e, b"patternType").filter(|p| p != "none");
        }
        b"fgColor" => fill.fg_color = attr_color(e),
        b"bgColor" => fill.bg_color = attr_color(e),
        _ => {}
    }
}

fn parse_border_element(
    name: &[u8],
    e: &BytesStart,
    empty: bool,
    border: &mut Border,
    side: &mut Option<&'static str>,
) {
    match name {
        b"left" | b"right" | b"top" | b"bottom" | b"diagonal" => {
            let which = match name {
                b"left" => "left",
                b"right" => "right",
                b"top" => "top",
                b"bottom" => "bottom",
                _ => "diagonal",
            };
            let style = attr_str(e, b"style");
            let target = match which {
                "left" => &mut border.left,
                "right" => &mut border.right,
                "top" => &mut border.top,
                "bottom" => &mut border.bottom,
                _ => &mut border.diagonal,
            };
            target.style = style;
            *side = if empty { None } else { Some(which) };
        }
        b"color" => {
            if let Some(which) = side {
                let target = match *which {
                    "left" => &mut border.left,
                    "right" => &mut border.right,
                    "top" => &mut border.top,
                    "bottom" => &mut border.bottom,
                    _ => &mut border.diagonal,
                };
                target.color = attr_color(e);
            }
        }
        _ => {}
    }
}
