//! Buffered XML writer with minimal allocations
//!
//! All worksheet and package parts are emitted through this writer as a
//! forward-only event stream. Each part is typically built over a `Vec<u8>`
//! buffer and committed to the archive in one piece once complete.

use crate::error::Result;
use std::io::Write;

/// Fast XML writer that batches output into an internal buffer
pub struct XmlWriter<W: Write> {
    writer: W,
    buffer: Vec<u8>,
}

impl<W: Write> XmlWriter<W> {
    pub fn new(writer: W) -> Self {
        XmlWriter {
            writer,
            buffer: Vec::with_capacity(8192), // 8KB buffer
        }
    }

    /// Write the XML declaration
    pub fn declaration(&mut self) -> Result<()> {
        self.write_str("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n")
    }

    /// Write raw bytes directly
    #[inline]
    pub fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > 4096 {
            self.flush()?;
        }
        Ok(())
    }

    /// Write string data
    #[inline]
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_raw(s.as_bytes())
    }

    /// Write an integer as text content
    #[inline]
    pub fn write_int(&mut self, value: i64) -> Result<()> {
        let mut buf = itoa::Buffer::new();
        self.write_str(buf.format(value))
    }

    /// Write XML element start tag (left open for attributes)
    #[inline]
    pub fn start_element(&mut self, name: &str) -> Result<()> {
        self.write_raw(b"<")?;
        self.write_str(name)?;
        Ok(())
    }

    /// Write XML element end tag
    #[inline]
    pub fn end_element(&mut self, name: &str) -> Result<()> {
        self.write_raw(b"</")?;
        self.write_str(name)?;
        self.write_raw(b">")
    }

    /// Close the currently open start tag as self-closing
    #[inline]
    pub fn close_empty(&mut self) -> Result<()> {
        self.write_raw(b"/>")
    }

    /// Write attribute
    #[inline]
    pub fn attribute(&mut self, name: &str, value: &str) -> Result<()> {
        self.write_raw(b" ")?;
        self.write_str(name)?;
        self.write_raw(b"=\"")?;
        self.write_escaped(value)?;
        self.write_raw(b"\"")
    }

    /// Write attribute with integer value
    #[inline]
    pub fn attribute_int(&mut self, name: &str, value: i64) -> Result<()> {
        let mut buf = itoa::Buffer::new();
        self.write_raw(b" ")?;
        self.write_str(name)?;
        self.write_raw(b"=\"")?;
        self.write_str(buf.format(value))?;
        self.write_raw(b"\"")
    }

    /// Write attribute with float value
    #[inline]
    pub fn attribute_float(&mut self, name: &str, value: f64) -> Result<()> {
        self.write_raw(b" ")?;
        self.write_str(name)?;
        self.write_raw(b"=\"")?;
        self.write_str(&value.to_string())?;
        self.write_raw(b"\"")
    }

    /// Close start tag
    #[inline]
    pub fn close_start_tag(&mut self) -> Result<()> {
        self.write_raw(b">")
    }

    /// Write text content with XML escaping
    #[inline]
    pub fn write_escaped(&mut self, text: &str) -> Result<()> {
        for byte in text.bytes() {
            match byte {
                b'&' => self.write_raw(b"&amp;")?,
                b'<' => self.write_raw(b"&lt;")?,
                b'>' => self.write_raw(b"&gt;")?,
                b'"' => self.write_raw(b"&quot;")?,
                b'\'' => self.write_raw(b"&apos;")?,
                _ => self.buffer.push(byte),
            }
        }
        if self.buffer.len() > 4096 {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush buffer to underlying writer
    pub fn flush(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.writer.write_all(&self.buffer)?;
            self.buffer.clear();
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        self.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_writer() {
        let mut output = Vec::new();
        let mut writer = XmlWriter::new(&mut output);

        writer.start_element("root").unwrap();
        writer.attribute("attr", "value").unwrap();
        writer.close_start_tag().unwrap();
        writer.write_str("content").unwrap();
        writer.end_element("root").unwrap();
        writer.flush().unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "<root attr=\"value\">content</root>"
        );
    }

    #[test]
    fn test_xml_escaping() {
        let mut output = Vec::new();
        let mut writer = XmlWriter::new(&mut output);

        writer.write_escaped("<test>&value</test>").unwrap();
        writer.flush().unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "&lt;test&gt;&amp;value&lt;/test&gt;"
        );
    }

    #[test]
    fn test_int_attributes() {
        let mut output = Vec::new();
        let mut writer = XmlWriter::new(&mut output);

        writer.start_element("row").unwrap();
        writer.attribute_int("r", 42).unwrap();
        writer.close_empty().unwrap();
        writer.flush().unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), "<row r=\"42\"/>");
    }
}
