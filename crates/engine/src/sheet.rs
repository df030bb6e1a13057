use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::cell::{Cell, CellStyle, CellValue};
use super::validation::{CellRange, ValidationRule, ValidationStore};

/// Sheet protection state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetProtection {
    pub protected: bool,
}

/// One header or footer band, split in its three sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFooter {
    pub left: String,
    pub center: String,
    pub right: String,
}

impl HeaderFooter {
    pub fn centered(text: impl Into<String>) -> Self {
        Self {
            center: text.into(),
            ..Self::default()
        }
    }

    /// All three sections joined with a space, empty sections skipped.
    pub fn text(&self) -> String {
        [&self.left, &self.center, &self.right]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Print configuration of a sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSetup {
    /// Print area reference, e.g. "$A$1:$F$30".
    pub print_area: Option<String>,
    /// Rows repeated on every printed page, e.g. "$1:$2".
    pub repeat_rows: Option<String>,
    /// Columns repeated on every printed page, e.g. "$A:$A".
    pub repeat_cols: Option<String>,
    pub header: HeaderFooter,
    pub footer: HeaderFooter,
}

#[derive(Debug, Clone)]
pub struct Sheet {
    pub name: String,
    cells: BTreeMap<(usize, usize), Cell>,
    pub hidden: bool,
    pub protection: SheetProtection,
    /// Zero-height rows.
    pub hidden_rows: BTreeSet<usize>,
    pub hidden_cols: BTreeSet<usize>,
    pub page_setup: PageSetup,
    pub validations: ValidationStore,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
            hidden: false,
            protection: SheetProtection::default(),
            hidden_rows: BTreeSet::new(),
            hidden_cols: BTreeSet::new(),
            page_setup: PageSetup::default(),
            validations: ValidationStore::new(),
        }
    }

    /// Set a cell's content from user-style input, keeping its style.
    pub fn set_value(&mut self, row: usize, col: usize, value: &str) {
        self.cells.entry((row, col)).or_default().set(value);
    }

    /// Replace a cell's formula, keeping its style.
    pub fn set_formula(&mut self, row: usize, col: usize, source: &str) {
        let cell = self.cells.entry((row, col)).or_default();
        cell.value = CellValue::formula(source);
        cell.cached = None;
    }

    pub fn set_style(&mut self, row: usize, col: usize, style: CellStyle) {
        self.cells.entry((row, col)).or_default().style = style;
    }

    pub fn insert_cell(&mut self, row: usize, col: usize, cell: Cell) {
        self.cells.insert((row, col), cell);
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut Cell> {
        self.cells.get_mut(&(row, col))
    }

    /// Cell at (row, col), or an empty default-styled cell.
    pub fn get_cell(&self, row: usize, col: usize) -> Cell {
        self.cells.get(&(row, col)).cloned().unwrap_or_default()
    }

    pub fn get_raw(&self, row: usize, col: usize) -> String {
        self.cells
            .get(&(row, col))
            .map(|c| c.value.raw_display())
            .unwrap_or_default()
    }

    pub fn clear_cell(&mut self, row: usize, col: usize) {
        self.cells.remove(&(row, col));
    }

    /// All stored cells in row-then-column order.
    pub fn cells_iter(&self) -> impl Iterator<Item = (&(usize, usize), &Cell)> {
        self.cells.iter()
    }

    pub fn cells_iter_mut(&mut self) -> impl Iterator<Item = (&(usize, usize), &mut Cell)> {
        self.cells.iter_mut()
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn is_row_hidden(&self, row: usize) -> bool {
        self.hidden_rows.contains(&row)
    }

    pub fn is_col_hidden(&self, col: usize) -> bool {
        self.hidden_cols.contains(&col)
    }

    pub fn set_row_hidden(&mut self, row: usize, hidden: bool) {
        if hidden {
            self.hidden_rows.insert(row);
        } else {
            self.hidden_rows.remove(&row);
        }
    }

    pub fn set_col_hidden(&mut self, col: usize, hidden: bool) {
        if hidden {
            self.hidden_cols.insert(col);
        } else {
            self.hidden_cols.remove(&col);
        }
    }

    pub fn set_validation(&mut self, range: CellRange, rule: ValidationRule) {
        self.validations.set(range, rule);
    }

    /// The list constraint governing a cell, if any.
    pub fn selection_at(&self, row: usize, col: usize) -> Option<&ValidationRule> {
        self.validations.get(row, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::{CellKind, Rgba};

    #[test]
    fn test_set_value_keeps_style() {
        let mut sheet = Sheet::new("Data");
        let mut style = CellStyle::default();
        style.fill = Some(Rgba::rgb(1, 2, 3));
        sheet.set_style(0, 0, style.clone());
        sheet.set_value(0, 0, "42");

        let cell = sheet.cell(0, 0).unwrap();
        assert_eq!(cell.style, style);
        assert_eq!(cell.kind(), CellKind::Numeric);
    }

    #[test]
    fn test_cells_iter_row_major() {
        let mut sheet = Sheet::new("Data");
        sheet.set_value(1, 0, "c");
        sheet.set_value(0, 3, "b");
        sheet.set_value(0, 1, "a");

        let order: Vec<_> = sheet.cells_iter().map(|(k, _)| *k).collect();
        assert_eq!(order, vec![(0, 1), (0, 3), (1, 0)]);
    }

    #[test]
    fn test_hidden_rows_and_cols() {
        let mut sheet = Sheet::new("Data");
        sheet.set_row_hidden(3, true);
        sheet.set_col_hidden(1, true);
        assert!(sheet.is_row_hidden(3));
        assert!(sheet.is_col_hidden(1));
        sheet.set_row_hidden(3, false);
        assert!(!sheet.is_row_hidden(3));
    }

    #[test]
    fn test_get_cell_defaults() {
        let sheet = Sheet::new("Data");
        let cell = sheet.get_cell(5, 5);
        assert_eq!(cell.kind(), CellKind::Empty);
        assert!(cell.style.locked);
        assert_eq!(sheet.get_raw(5, 5), "");
    }

    #[test]
    fn test_header_footer_text() {
        let hf = HeaderFooter {
            left: "Exercise 3".into(),
            center: String::new(),
            right: "#K7Q2".into(),
        };
        assert_eq!(hf.text(), "Exercise 3 #K7Q2");
        assert_eq!(HeaderFooter::centered("x").text(), "x");
    }

    #[test]
    fn test_selection_at() {
        let mut sheet = Sheet::new("Data");
        sheet.set_validation(CellRange::new(1, 2, 4, 2), ValidationRule::list_range("Lists!A1:A3"));
        assert!(sheet.selection_at(2, 2).is_some());
        assert!(sheet.selection_at(0, 2).is_none());
    }
}
