//! JSON workbook documents.
//!
//! One file holds one workbook: document properties plus, per sheet, its
//! cells (A1 address, raw input, last computed result, style), visibility
//! and protection flags, page setup and list constraints.
//!
//! ## Cell input
//! - JSON numbers are numeric constants.
//! - JSON strings are read like typed input: `"=A1*2"` is a formula, `"42"`
//!   a number, anything else text. A leading apostrophe forces text
//!   (`"'42"` is the text `42`), and is written back that way.
//!
//! ## List constraints
//! `list` holds the constraint formula as spreadsheet files store it: a
//! quoted inline list (`"\"Low,Medium,High\""`) or a range reference
//! (`"Lists!$A$2:$A$8"`).

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use calcgrade_engine::cell::{Cell, CellStyle, CellValue};
use calcgrade_engine::cell_id::{col_to_letters, parse_a1, parse_range_ref};
use calcgrade_engine::sheet::{PageSetup, Sheet, SheetProtection};
use calcgrade_engine::validation::{CellRange, ErrorAlert, InputMessage, ListSource, ValidationRule};
use calcgrade_engine::workbook::{DocumentProperties, Workbook};
use calcgrade_engine::Value;

use crate::FORMAT_VERSION;

// ============================================================================
// File schema
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct DocumentFile {
    #[serde(default = "default_version")]
    format_version: u32,
    #[serde(default)]
    properties: DocumentProperties,
    sheets: Vec<SheetEntry>,
}

fn default_version() -> u32 {
    FORMAT_VERSION
}

#[derive(Debug, Serialize, Deserialize)]
struct SheetEntry {
    name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    hidden: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    protected: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    hidden_rows: Vec<usize>,
    /// Column letters ("B", "AA").
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    hidden_cols: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default_page_setup")]
    page_setup: PageSetup,
    #[serde(default)]
    cells: Vec<CellEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    validations: Vec<ValidationEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CellEntry {
    #[serde(rename = "ref")]
    address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<RawInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cached: Option<CachedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    style: Option<CellStyle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum RawInput {
    Number(f64),
    Text(String),
}

/// Last computed result of a formula cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CachedValue {
    Number(f64),
    Boolean(bool),
    Text(String),
    Error { error: String },
}

#[derive(Debug, Serialize, Deserialize)]
struct ValidationEntry {
    range: String,
    list: String,
    #[serde(default = "default_true")]
    show_dropdown: bool,
    #[serde(default = "default_true")]
    ignore_blank: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    input_message: Option<InputMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_alert: Option<ErrorAlert>,
}

fn default_true() -> bool {
    true
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_default_page_setup(p: &PageSetup) -> bool {
    *p == PageSetup::default()
}

// ============================================================================
// Load
// ============================================================================

/// Load a workbook document from disk.
pub fn load_workbook(path: &Path) -> Result<Workbook, String> {
    let content = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    parse_workbook(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Parse a workbook document from JSON text.
pub fn parse_workbook(json: &str) -> Result<Workbook, String> {
    let file: DocumentFile = serde_json::from_str(json).map_err(|e| e.to_string())?;
    if file.format_version > FORMAT_VERSION {
        return Err(format!(
            "unsupported format version {} (this build reads up to {})",
            file.format_version, FORMAT_VERSION
        ));
    }

    let mut workbook = Workbook::new();
    workbook.properties = file.properties;
    for entry in file.sheets {
        if workbook.sheet_index(&entry.name).is_some() {
            return Err(format!("duplicate sheet name: {}", entry.name));
        }
        let sheet = sheet_from_entry(entry)?;
        workbook.push_sheet(sheet);
    }
    Ok(workbook)
}

fn sheet_from_entry(entry: SheetEntry) -> Result<Sheet, String> {
    let mut sheet = Sheet::new(entry.name);
    sheet.hidden = entry.hidden;
    sheet.protection = SheetProtection { protected: entry.protected };
    sheet.page_setup = entry.page_setup;
    for row in entry.hidden_rows {
        // 1-based in the file
        if row == 0 {
            return Err(format!("{}: hidden row numbers start at 1", sheet.name));
        }
        sheet.set_row_hidden(row - 1, true);
    }
    for letters in &entry.hidden_cols {
        let col = calcgrade_engine::cell_id::col_from_letters(letters.trim())
            .ok_or_else(|| format!("{}: invalid hidden column '{}'", sheet.name, letters))?;
        sheet.set_col_hidden(col, true);
    }

    for cell_entry in entry.cells {
        let (row, col) = parse_a1(&cell_entry.address)
            .ok_or_else(|| format!("{}: invalid cell reference '{}'", sheet.name, cell_entry.address))?;
        let mut cell = Cell::new();
        cell.value = match &cell_entry.value {
            None => CellValue::Empty,
            Some(RawInput::Number(n)) => CellValue::Number(*n),
            Some(RawInput::Text(s)) => match s.strip_prefix('\'') {
                Some(forced) => CellValue::Text(forced.to_string()),
                None => CellValue::from_input(s),
            },
        };
        if cell.is_formula() {
            cell.cached = cell_entry.cached.map(cached_to_value);
        }
        cell.style = cell_entry.style.unwrap_or_default();
        sheet.insert_cell(row, col, cell);
    }

    for v in entry.validations {
        let range = parse_range_ref(&v.range)
            .filter(|r| r.sheet.is_none())
            .ok_or_else(|| format!("{}: invalid validation range '{}'", sheet.name, v.range))?;
        let source = ListSource::from_formula(&v.list)
            .ok_or_else(|| format!("{}: empty list source for {}", sheet.name, v.range))?;
        let mut rule = ValidationRule::new(source).with_show_dropdown(v.show_dropdown);
        rule.ignore_blank = v.ignore_blank;
        rule.input_message = v.input_message;
        rule.error_alert = v.error_alert;
        sheet.set_validation(CellRange::new(range.start_row, range.start_col, range.end_row, range.end_col), rule);
    }

    Ok(sheet)
}

fn cached_to_value(cached: CachedValue) -> Value {
    match cached {
        CachedValue::Number(n) => Value::Number(n),
        CachedValue::Boolean(b) => Value::Boolean(b),
        CachedValue::Text(s) => Value::Text(s),
        CachedValue::Error { error } => Value::Error(error),
    }
}

// ============================================================================
// Save
// ============================================================================

/// Save a workbook document, pretty-printed.
pub fn save_workbook(workbook: &Workbook, path: &Path) -> Result<(), String> {
    let json = to_json(workbook)?;
    fs::write(path, json).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Serialize a workbook to the document JSON.
pub fn to_json(workbook: &Workbook) -> Result<String, String> {
    let file = DocumentFile {
        format_version: FORMAT_VERSION,
        properties: workbook.properties.clone(),
        sheets: workbook.sheets().iter().map(sheet_to_entry).collect(),
    };
    serde_json::to_string_pretty(&file).map_err(|e| e.to_string())
}

fn sheet_to_entry(sheet: &Sheet) -> SheetEntry {
    let default_style = CellStyle::default();
    let cells = sheet
        .cells_iter()
        .map(|((row, col), cell)| CellEntry {
            address: format!("{}{}", col_to_letters(*col), row + 1),
            value: raw_input(&cell.value),
            cached: cell.cached.as_ref().and_then(value_to_cached),
            style: (cell.style != default_style).then(|| cell.style.clone()),
        })
        .collect();

    let validations = sheet
        .validations
        .iter()
        .map(|(range, rule)| ValidationEntry {
            range: format!(
                "{}{}:{}{}",
                col_to_letters(range.start_col),
                range.start_row + 1,
                col_to_letters(range.end_col),
                range.end_row + 1
            ),
            list: list_formula(&rule.source),
            show_dropdown: rule.show_dropdown,
            ignore_blank: rule.ignore_blank,
            input_message: rule.input_message.clone(),
            error_alert: rule.error_alert.clone(),
        })
        .collect();

    SheetEntry {
        name: sheet.name.clone(),
        hidden: sheet.hidden,
        protected: sheet.protection.protected,
        hidden_rows: sheet.hidden_rows.iter().map(|r| r + 1).collect(),
        hidden_cols: sheet.hidden_cols.iter().map(|c| col_to_letters(*c)).collect(),
        page_setup: sheet.page_setup.clone(),
        cells,
        validations,
    }
}

fn raw_input(value: &CellValue) -> Option<RawInput> {
    match value {
        CellValue::Empty => None,
        CellValue::Number(n) => Some(RawInput::Number(*n)),
        CellValue::Formula { source, .. } => Some(RawInput::Text(source.clone())),
        CellValue::Text(s) => {
            // Text that would read back as something else keeps its apostrophe
            let needs_quote = s.starts_with('\'') || !matches!(CellValue::from_input(s), CellValue::Text(_));
            Some(RawInput::Text(if needs_quote { format!("'{}", s) } else { s.clone() }))
        }
    }
}

fn value_to_cached(value: &Value) -> Option<CachedValue> {
    match value {
        Value::Empty => None,
        Value::Number(n) => Some(CachedValue::Number(*n)),
        Value::Boolean(b) => Some(CachedValue::Boolean(*b)),
        Value::Text(s) => Some(CachedValue::Text(s.clone())),
        Value::Error(e) => Some(CachedValue::Error { error: e.clone() }),
    }
}

fn list_formula(source: &ListSource) -> String {
    match source {
        ListSource::Inline(items) => format!("\"{}\"", items.join(",")),
        ListSource::Range(reference) => reference.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcgrade_engine::cell::{CellKind, Rgba};
    use calcgrade_engine::CellAddr;

    const SAMPLE: &str = r##"{
        "properties": { "title": "Budget", "keywords": "#K7Q2" },
        "sheets": [
            {
                "name": "Calc",
                "protected": true,
                "hidden_rows": [4],
                "hidden_cols": ["C"],
                "page_setup": { "print_area": "$A$1:$D$10", "footer": { "right": "#K7Q2" } },
                "cells": [
                    { "ref": "A1", "value": 10, "style": { "fill": "FFFF99", "locked": false } },
                    { "ref": "B1", "value": "=A1*2", "cached": 20 },
                    { "ref": "C1", "value": "'007" },
                    { "ref": "D1", "value": "=1/0", "cached": { "error": "#DIV/0!" } }
                ],
                "validations": [
                    { "range": "E1:E3", "list": "\"Low,Medium,High\"" }
                ]
            },
            { "name": "Lists", "hidden": true, "cells": [ { "ref": "A1", "value": "Low" } ] }
        ]
    }"##;

    #[test]
    fn test_parse_sample() {
        let wb = parse_workbook(SAMPLE).unwrap();
        assert_eq!(wb.sheet_count(), 2);
        assert_eq!(wb.properties.keywords, "#K7Q2");

        let calc = wb.sheet(0).unwrap();
        assert!(calc.protection.protected);
        assert!(calc.is_row_hidden(3));
        assert!(calc.is_col_hidden(2));
        assert_eq!(calc.page_setup.footer.text(), "#K7Q2");

        let a1 = calc.cell(0, 0).unwrap();
        assert_eq!(a1.kind(), CellKind::Numeric);
        assert_eq!(a1.style.fill, Some(Rgba::rgb(0xFF, 0xFF, 0x99)));
        assert!(!a1.style.locked);

        let b1 = wb.cell(CellAddr::new(0, 0, 1)).unwrap();
        assert_eq!(b1.current_value(), Value::Number(20.0));
        assert_eq!(calc.cell(0, 2).unwrap().kind(), CellKind::Text);
        assert_eq!(calc.cell(0, 3).unwrap().current_value(), Value::error("#DIV/0!"));

        let rule = calc.selection_at(1, 4).unwrap();
        assert_eq!(rule.source, ListSource::Inline(vec!["Low".into(), "Medium".into(), "High".into()]));
        assert!(wb.sheet(1).unwrap().hidden);
    }

    #[test]
    fn test_save_then_parse_keeps_content() {
        let wb = parse_workbook(SAMPLE).unwrap();
        let json = to_json(&wb).unwrap();
        let again = parse_workbook(&json).unwrap();

        let calc = again.sheet(0).unwrap();
        assert_eq!(calc.get_raw(0, 2), "007");
        assert_eq!(calc.cell(0, 2).unwrap().kind(), CellKind::Text);
        assert_eq!(calc.get_raw(0, 1), "=A1*2");
        assert_eq!(calc.page_setup, wb.sheet(0).unwrap().page_setup);
        assert_eq!(calc.hidden_cols, wb.sheet(0).unwrap().hidden_cols);
        assert!(calc.selection_at(2, 4).is_some());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_workbook("{").is_err());
        assert!(parse_workbook(r#"{"sheets":[{"name":"S","cells":[{"ref":"1A"}]}]}"#).is_err());
        assert!(parse_workbook(r#"{"sheets":[{"name":"S"},{"name":"s"}]}"#).is_err());
        assert!(parse_workbook(r#"{"format_version":99,"sheets":[]}"#).is_err());
        assert!(parse_workbook(r#"{"sheets":[{"name":"S","hidden_rows":[0]}]}"#).is_err());
    }
}
