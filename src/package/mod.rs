//! Package assembly: building and opening the zip container
//!
//! The writer buffers every part independently and commits it to the
//! archive in one piece; the reader loads the content-types declaration and
//! the relationship graph first, then streams individual parts on demand.

pub mod reader;
pub mod writer;

pub use reader::{PackageReader, SheetInfo, SheetRows};
pub use writer::PackageWriter;
