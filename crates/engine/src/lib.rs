pub mod cell;
pub mod cell_id;
pub mod formula;
pub mod sheet;
pub mod validation;
pub mod workbook;

pub use cell::{Alignment, Cell, CellKind, CellStyle, CellValue, Rgba};
pub use cell_id::{parse_a1, parse_range_ref, CellAddr, RangeRef, MAX_COLS, MAX_ROWS};
pub use formula::eval::Value;
pub use sheet::{HeaderFooter, PageSetup, Sheet, SheetProtection};
pub use validation::{ListSource, ValidationRule};
pub use workbook::{DocumentProperties, Workbook};
