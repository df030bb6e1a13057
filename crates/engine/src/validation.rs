//! Selection constraints (list data validation) for cells.
//!
//! A constraint restricts a cell to a permitted set of values, given either
//! inline or as a reference to a range whose cell values form the list.
//!
//! ## Case Sensitivity
//!
//! List membership is case-sensitive. "Yes" != "yes".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maximum number of items in a resolved list.
pub const MAX_LIST_ITEMS: usize = 10_000;

// ============================================================================
// Core Types
// ============================================================================

/// A list constraint attached to a cell or range.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRule {
    pub source: ListSource,
    /// Blank entries pass the constraint.
    pub ignore_blank: bool,
    /// In-cell dropdown arrow.
    pub show_dropdown: bool,
    pub input_message: Option<InputMessage>,
    pub error_alert: Option<ErrorAlert>,
}

impl ValidationRule {
    pub fn new(source: ListSource) -> Self {
        Self {
            source,
            ignore_blank: true,
            show_dropdown: true,
            input_message: None,
            error_alert: None,
        }
    }

    /// Create a list rule from inline values.
    pub fn list_inline(values: Vec<String>) -> Self {
        Self::new(ListSource::Inline(values))
    }

    /// Create a list rule from a range reference.
    pub fn list_range(range_ref: impl Into<String>) -> Self {
        Self::new(ListSource::Range(range_ref.into()))
    }

    pub fn with_input_message(mut self, message: InputMessage) -> Self {
        self.input_message = Some(message);
        self
    }

    pub fn with_error_alert(mut self, alert: ErrorAlert) -> Self {
        self.error_alert = Some(alert);
        self
    }

    pub fn with_show_dropdown(mut self, show: bool) -> Self {
        self.show_dropdown = show;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListSource {
    Inline(Vec<String>),
    /// Range reference as written: `$A$1:$A$10`, `Lists!$B$1:$B$20`.
    Range(String),
}

impl ListSource {
    /// Parse the raw formula text a document stores for a list constraint.
    ///
    /// Quoted text is an inline list (`"Low,Medium,High"`, items split on
    /// `,` or `;`); anything else is a range reference.
    pub fn from_formula(formula: &str) -> Option<Self> {
        let formula = formula.trim();
        let formula = formula.strip_prefix('=').unwrap_or(formula).trim();
        if formula.is_empty() {
            return None;
        }
        if formula.len() >= 2 && formula.starts_with('"') && formula.ends_with('"') {
            let inner = &formula[1..formula.len() - 1];
            let items = inner
                .split([',', ';'])
                .map(|s| s.trim().trim_matches('"').to_string())
                .collect();
            return Some(ListSource::Inline(items));
        }
        Some(ListSource::Range(formula.to_string()))
    }
}

// ============================================================================
// Messages
// ============================================================================

/// Prompt shown when a constrained cell is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMessage {
    pub show: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

impl InputMessage {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            show: true,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Error box shown when an entry violates the constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorAlert {
    pub show: bool,
    #[serde(default)]
    pub style: ErrorStyle,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

impl ErrorAlert {
    pub fn stop(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            show: true,
            style: ErrorStyle::Stop,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Style of error alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorStyle {
    #[default]
    Stop,
    Warning,
    Information,
}

// ============================================================================
// Ranges and storage
// ============================================================================

/// Rectangle of cells a constraint governs. Ordered row-major by its
/// top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellRange {
    pub start_row: usize,
    pub start_col: usize,
    /// Inclusive.
    pub end_row: usize,
    /// Inclusive.
    pub end_col: usize,
}

impl CellRange {
    pub fn new(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        Self {
            start_row: start_row.min(end_row),
            start_col: start_col.min(end_col),
            end_row: start_row.max(end_row),
            end_col: start_col.max(end_col),
        }
    }

    pub fn single(row: usize, col: usize) -> Self {
        Self::new(row, col, row, col)
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.start_row && row <= self.end_row && col >= self.start_col && col <= self.end_col
    }

    pub fn overlaps(&self, other: &CellRange) -> bool {
        !(self.end_row < other.start_row
            || self.start_row > other.end_row
            || self.end_col < other.start_col
            || self.start_col > other.end_col)
    }
}

/// Constraints of one sheet, keyed by the range they govern.
///
/// BTreeMap keeps ordering deterministic. When looking up the constraint for
/// a cell, the first range (by range order) containing the cell wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationStore {
    rules: BTreeMap<CellRange, ValidationRule>,
}

impl ValidationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any rule stored for exactly this range.
    pub fn set(&mut self, range: CellRange, rule: ValidationRule) {
        self.rules.insert(range, rule);
    }

    pub fn clear_range(&mut self, range: &CellRange) {
        self.rules.retain(|r, _| !r.overlaps(range));
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&ValidationRule> {
        self.rules
            .iter()
            .find(|(range, _)| range.contains(row, col))
            .map(|(_, rule)| rule)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CellRange, &ValidationRule)> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_range_contains() {
        let range = CellRange::new(1, 1, 3, 3);
        assert!(range.contains(1, 1));
        assert!(range.contains(3, 3));
        assert!(range.contains(2, 2));
        assert!(!range.contains(0, 1));
        assert!(!range.contains(4, 3));
    }

    #[test]
    fn test_cell_range_normalizes() {
        let range = CellRange::new(5, 4, 1, 2);
        assert_eq!(range, CellRange::new(1, 2, 5, 4));
    }

    #[test]
    fn test_store_first_matching_range_wins() {
        let mut store = ValidationStore::new();
        store.set(CellRange::new(0, 0, 9, 0), ValidationRule::list_inline(vec!["a".into()]));
        store.set(CellRange::single(5, 0), ValidationRule::list_inline(vec!["b".into()]));

        let rule = store.get(5, 0).unwrap();
        assert_eq!(rule.source, ListSource::Inline(vec!["a".into()]));
        assert!(store.get(5, 1).is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_store_clear_range() {
        let mut store = ValidationStore::new();
        store.set(CellRange::single(0, 0), ValidationRule::list_range("B1:B3"));
        store.set(CellRange::single(4, 4), ValidationRule::list_range("B1:B3"));
        store.clear_range(&CellRange::new(0, 0, 1, 1));
        assert!(store.get(0, 0).is_none());
        assert!(store.get(4, 4).is_some());
    }

    #[test]
    fn test_list_source_from_formula() {
        assert_eq!(
            ListSource::from_formula("\"Low,Medium,High\""),
            Some(ListSource::Inline(vec!["Low".into(), "Medium".into(), "High".into()]))
        );
        assert_eq!(
            ListSource::from_formula("=Lists!$A$2:$A$8"),
            Some(ListSource::Range("Lists!$A$2:$A$8".into()))
        );
        assert_eq!(ListSource::from_formula("  "), None);
    }

    #[test]
    fn test_rule_builders() {
        let rule = ValidationRule::list_range("$A$1:$A$3")
            .with_input_message(InputMessage::new("Pick", "Choose a level"))
            .with_error_alert(ErrorAlert::stop("Nope", "Not allowed"))
            .with_show_dropdown(false);
        assert!(!rule.show_dropdown);
        assert!(rule.input_message.as_ref().unwrap().show);
        assert_eq!(rule.error_alert.as_ref().unwrap().style, ErrorStyle::Stop);
    }
}
