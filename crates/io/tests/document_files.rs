// Integration tests for loading and saving workbook documents on disk.

use std::path::PathBuf;

use calcgrade_engine::{CellAddr, CellKind, Value};
use calcgrade_io::{load_workbook, save_workbook};
use tempfile::tempdir;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn test_load_fixture_and_recalculate() {
    let mut wb = load_workbook(&fixture("budget.json")).unwrap();
    assert_eq!(wb.properties.keywords, "#B4DG3T");

    let total = CellAddr::new(0, 3, 1);
    assert_eq!(wb.cell(total).unwrap().kind(), CellKind::Formula);
    assert_eq!(wb.cell(total).unwrap().current_value(), Value::Number(1370.5));

    wb.set_cell_input(CellAddr::new(0, 1, 1), "1000").unwrap();
    wb.recalculate();
    assert_eq!(wb.cell(total).unwrap().current_value(), Value::Number(1420.5));
}

#[test]
fn test_save_and_reload_on_disk() {
    let mut wb = load_workbook(&fixture("budget.json")).unwrap();
    wb.recalculate();

    let dir = tempdir().unwrap();
    let path = dir.path().join("copy.json");
    save_workbook(&wb, &path).unwrap();
    let reloaded = load_workbook(&path).unwrap();

    let sheet = reloaded.sheet(0).unwrap();
    assert_eq!(sheet.name, "Budget");
    assert!(sheet.protection.protected);
    assert_eq!(sheet.page_setup.repeat_rows.as_deref(), Some("$1:$1"));
    assert_eq!(sheet.cell(1, 1).unwrap().style.number_format, "#,##0.00 [$€-813]");
    assert_eq!(sheet.cell(4, 1).unwrap().current_value(), wb.sheet(0).unwrap().cell(4, 1).unwrap().current_value());
}

#[test]
fn test_missing_file_names_the_path() {
    let err = load_workbook(&fixture("does-not-exist.json")).unwrap_err();
    assert!(err.contains("does-not-exist.json"));
}
