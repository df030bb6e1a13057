// File I/O operations

pub mod document;

pub use document::{load_workbook, parse_workbook, save_workbook, to_json};

/// Workbook document format version
/// Increment when schema changes in a way that old versions can't read
pub const FORMAT_VERSION: u32 = 1;
