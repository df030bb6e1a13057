//! Dropdown (selection constraint) checks.
//!
//! For every Selection cell of the solution the submission must carry a list
//! constraint at the same address whose permitted values form the same set.
//! Each permitted value is then chosen in both documents and the Calculation
//! cells depending on the dropdown are compared. This separates "computes
//! correctly for every choice" from "picked the same choice".

use std::collections::BTreeSet;

use calcgrade_engine::validation::MAX_LIST_ITEMS;
use calcgrade_engine::{parse_range_ref, CellAddr, CellValue, ListSource, ValidationRule, Value, Workbook};

use crate::config::{GradingConfig, Messages};
use crate::error::CorrectionError;
use crate::role::{CellRole, Palette};
use crate::rule::{require_cell, require_sheet, write_literal, Document, GradingContext, Rule, RuleEffects};
use crate::values::values_equal;
use crate::verdict::Verdict;

/// Permitted values of a list constraint on sheet `sheet`, in list order
/// with duplicates and blank cells dropped.
///
/// Range sources without a sheet qualifier refer to `sheet` itself.
pub fn resolve_values(workbook: &Workbook, sheet: usize, rule: &ValidationRule) -> Result<Vec<String>, String> {
    let raw: Vec<String> = match &rule.source {
        ListSource::Inline(items) => items.clone(),
        ListSource::Range(text) => {
            let range = parse_range_ref(text).ok_or_else(|| format!("invalid list range '{text}'"))?;
            let sheet = match range.sheet.as_deref() {
                None => sheet,
                Some(name) => workbook
                    .sheet_index(name)
                    .ok_or_else(|| format!("list range refers to unknown sheet '{name}'"))?,
            };
            if range.cell_count().map_or(true, |n| n > MAX_LIST_ITEMS) {
                return Err(format!("list range '{text}' exceeds {MAX_LIST_ITEMS} cells"));
            }
            range
                .cells()
                .map(|(row, col)| current_value(workbook, CellAddr::new(sheet, row, col)))
                .filter(|v| !v.is_empty())
                .map(|v| v.to_text())
                .collect()
        }
    };

    let mut seen = BTreeSet::new();
    Ok(raw
        .into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect())
}

fn current_value(workbook: &Workbook, addr: CellAddr) -> Value {
    match workbook.cell(addr) {
        Some(cell) if cell.is_formula() && cell.cached.is_none() => workbook.evaluate(addr),
        Some(cell) => cell.current_value(),
        None => Value::Empty,
    }
}

/// Same members, order ignored.
pub fn same_value_set(a: &[String], b: &[String]) -> bool {
    let a: BTreeSet<&String> = a.iter().collect();
    let b: BTreeSet<&String> = b.iter().collect();
    a == b
}

/// Prompt and error-box settings of two constraints agree.
pub fn same_messages(a: &ValidationRule, b: &ValidationRule) -> bool {
    a.show_dropdown == b.show_dropdown && a.input_message == b.input_message && a.error_alert == b.error_alert
}

/// The literal a cell holds after picking `option` from a dropdown.
/// Read as typed input, except that an option never becomes a formula.
fn chosen_literal(option: &str) -> CellValue {
    match CellValue::from_input(option) {
        CellValue::Formula { .. } | CellValue::Empty => CellValue::Text(option.to_string()),
        literal => literal,
    }
}

fn literal_of(value: &Value) -> Option<CellValue> {
    match value {
        Value::Number(n) => Some(CellValue::Number(*n)),
        Value::Text(s) if !s.is_empty() => Some(CellValue::Text(s.clone())),
        _ => None,
    }
}

pub struct SelectionRule {
    tolerance: f64,
    check_messages: bool,
    messages: Messages,
}

enum Outcome {
    Pass,
    Missing,
    WrongSource,
    WrongMessages,
    WrongValues,
}

impl SelectionRule {
    pub fn new(config: &GradingConfig) -> Self {
        Self {
            tolerance: config.tolerance.relative,
            check_messages: config.selection.check_messages,
            messages: config.messages.clone(),
        }
    }

    fn check_cell(&self, ctx: &mut GradingContext, addr: CellAddr) -> Result<Outcome, CorrectionError> {
        let described = ctx.solution.describe(addr);
        let selection_error = |message: String| CorrectionError::Selection { cell: described.clone(), message };

        let solution_sheet = require_sheet(&ctx.solution, Document::Solution, addr.sheet)?;
        let Some(solution_rule) = solution_sheet.selection_at(addr.row, addr.col).cloned() else {
            return Err(selection_error("solution cell has no list constraint".into()));
        };
        let submission_sheet = require_sheet(&ctx.submission, Document::Submission, addr.sheet)?;
        let Some(submission_rule) = submission_sheet.selection_at(addr.row, addr.col).cloned() else {
            return Ok(Outcome::Missing);
        };

        let options = resolve_values(&ctx.solution, addr.sheet, &solution_rule)
            .map_err(selection_error)?;
        let submitted = match resolve_values(&ctx.submission, addr.sheet, &submission_rule) {
            Ok(values) => values,
            Err(message) => {
                log::debug!("selection: {described} submission list unresolved: {message}");
                return Ok(Outcome::WrongSource);
            }
        };
        if !same_value_set(&options, &submitted) {
            log::debug!("selection: {described} expected {options:?}, got {submitted:?}");
            return Ok(Outcome::WrongSource);
        }
        if self.check_messages && !same_messages(&solution_rule, &submission_rule) {
            return Ok(Outcome::WrongMessages);
        }

        let original = require_cell(&ctx.solution, Document::Solution, addr)?.current_value();
        let palette = ctx.palette.clone();
        for option in &options {
            if !self.try_option(ctx, &palette, addr, chosen_literal(option))? {
                log::debug!("selection: {described} diverges for option '{option}'");
                return Ok(Outcome::WrongValues);
            }
        }

        // Leave both documents on the solution's own choice.
        if let Some(literal) = literal_of(&original).or_else(|| options.first().map(|o| chosen_literal(o))) {
            force(ctx, addr, literal)?;
        }
        Ok(Outcome::Pass)
    }

    /// Choose `literal` in both documents and compare the dependent
    /// Calculation cells. `Ok(false)` on the first divergence.
    fn try_option(&self, ctx: &mut GradingContext, palette: &Palette, addr: CellAddr, literal: CellValue) -> Result<bool, CorrectionError> {
        let dependents = force(ctx, addr, literal)?;
        for dep in dependents {
            let solution = require_cell(&ctx.solution, Document::Solution, dep)?;
            if palette.role_of(solution) != CellRole::Calculation {
                continue;
            }
            let submission = require_cell(&ctx.submission, Document::Submission, dep)?;
            if !values_equal(solution, submission, self.tolerance) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Write the same choice into both documents and recalculate everything that
/// depends on it. Returns the solution's dependents of `addr`.
fn force(ctx: &mut GradingContext, addr: CellAddr, literal: CellValue) -> Result<Vec<CellAddr>, CorrectionError> {
    write_literal(&mut ctx.solution, Document::Solution, addr, literal.clone())?;
    write_literal(&mut ctx.submission, Document::Submission, addr, literal)?;

    let solution_deps = ctx.solution.dependents(addr);
    let submission_deps = ctx.submission.dependents(addr);
    ctx.solution.recalculate_cells(&solution_deps);
    ctx.submission.recalculate_cells(&submission_deps);
    Ok(solution_deps)
}

impl Rule for SelectionRule {
    fn name(&self) -> &str {
        "selection"
    }

    fn effects(&self) -> RuleEffects {
        RuleEffects::FORCES_SELECTIONS
    }

    fn check(&self, ctx: &mut GradingContext) -> Result<Verdict, CorrectionError> {
        let targets = crate::role::cells_with_role(&ctx.solution, &ctx.palette, CellRole::Selection);
        for addr in targets {
            let template = match self.check_cell(ctx, addr)? {
                Outcome::Pass => continue,
                Outcome::Missing => &self.messages.selection_missing,
                Outcome::WrongSource => &self.messages.selection_source,
                Outcome::WrongMessages => &self.messages.selection_messages,
                Outcome::WrongValues => &self.messages.selection_values,
            };
            let (cell, sheet) = ctx.location(addr);
            return Ok(Verdict::fail(Messages::render(template, &cell, &sheet)));
        }
        Ok(Verdict::pass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcgrade_engine::validation::{CellRange, InputMessage};
    use calcgrade_engine::CellStyle;

    use crate::role::{CALCULATION, SELECTION};

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_inline() {
        let wb = Workbook::new();
        let rule = ValidationRule::list_inline(strings(&["Low", "Medium", "", "Low", "High"]));
        assert_eq!(resolve_values(&wb, 0, &rule).unwrap(), strings(&["Low", "Medium", "High"]));
    }

    #[test]
    fn test_resolve_cross_sheet_range() {
        let mut wb = Workbook::new();
        wb.add_sheet("Task");
        let lists = wb.add_sheet("Lists");
        for (row, v) in ["Low", "Medium", "High"].iter().enumerate() {
            wb.set_cell_input(CellAddr::new(lists, row + 1, 0), v).unwrap();
        }
        let rule = ValidationRule::list_range("Lists!$A$2:$A$8");
        assert_eq!(resolve_values(&wb, 0, &rule).unwrap(), strings(&["Low", "Medium", "High"]));

        let local = ValidationRule::list_range("$A$2:$A$4");
        assert!(resolve_values(&wb, 0, &local).unwrap().is_empty());
        assert_eq!(resolve_values(&wb, lists, &local).unwrap().len(), 3);

        assert!(resolve_values(&wb, 0, &ValidationRule::list_range("Nope!A1:A2")).is_err());
        assert!(resolve_values(&wb, 0, &ValidationRule::list_range("A1:")).is_err());
    }

    #[test]
    fn test_resolve_numbers_and_formulas() {
        let mut wb = Workbook::new();
        wb.add_sheet("Lists");
        wb.set_cell_input(CellAddr::new(0, 0, 0), "10").unwrap();
        wb.set_formula(CellAddr::new(0, 1, 0), "=A1*2").unwrap();
        let rule = ValidationRule::list_range("A1:A2");
        assert_eq!(resolve_values(&wb, 0, &rule).unwrap(), strings(&["10", "20"]));
    }

    #[test]
    fn test_same_value_set() {
        let sol = strings(&["Low", "Medium", "High"]);
        assert!(same_value_set(&sol, &strings(&["High", "Low", "Medium"])));
        assert!(!same_value_set(&sol, &strings(&["Low", "Medium"])));
        assert!(!same_value_set(&sol, &strings(&["low", "Medium", "High"])));
    }

    #[test]
    fn test_same_messages() {
        let a = ValidationRule::list_inline(strings(&["a"]));
        let b = a.clone().with_input_message(InputMessage::new("Pick", "Choose one"));
        assert!(same_messages(&a, &a.clone()));
        assert!(!same_messages(&a, &b));
        assert!(!same_messages(&a, &a.clone().with_show_dropdown(false)));
    }

    #[test]
    fn test_chosen_literal_reads_like_typed_input() {
        assert!(matches!(chosen_literal("2.5"), CellValue::Number(n) if n == 2.5));
        for word in ["nan", "inf", "Infinity", "-inf", "=A1", "North"] {
            assert!(
                matches!(chosen_literal(word), CellValue::Text(ref s) if s == word),
                "{word} should stay text"
            );
        }
    }

    #[test]
    fn test_number_like_words_stay_text_in_dropdown() {
        // Equivalent only while both options are compared as text
        let list = ["inf", "NaN"];
        let solution = priced("=IF(A1=\"inf\",0.2,0.1)", &list);
        let submission = priced("=IF(A1=\"NaN\",0.1,0.2)", &list);
        let (verdict, _) = run(solution, submission);
        assert!(verdict.passed, "{verdict}");
    }

    #[test]
    fn test_oversized_list_range_is_wrong_source() {
        let solution = priced(RATE, &["Low", "High"]);
        let mut submission = priced(RATE, &["Low", "High"]);
        if let Some(sheet) = submission.sheet_mut(0) {
            let huge = ValidationRule::list_range("A1:MWLQKWV4294967296");
            sheet.set_validation(CellRange::single(0, 0), huge);
        }
        let (verdict, _) = run(solution, submission);
        assert!(verdict.reason.unwrap().contains("does not refer to the correct cells"));

        let wb = priced(RATE, &["Low"]);
        let whole_sheet = ValidationRule::list_range("A1:XFD1048576");
        assert!(resolve_values(&wb, 0, &whole_sheet).is_err());
    }

    fn paint(wb: &mut Workbook, addr: CellAddr, fill: calcgrade_engine::Rgba) {
        let mut style = CellStyle::default();
        style.fill = Some(fill);
        if let Some(cell) = wb.cell_mut(addr) {
            cell.style = style;
        } else if let Some(sheet) = wb.sheet_mut(addr.sheet) {
            sheet.set_style(addr.row, addr.col, style);
        }
    }

    /// A1 dropdown (Low/High), B1 rate lookup, C1 = 100 * rate.
    fn priced(rate_formula: &str, list: &[&str]) -> Workbook {
        let mut wb = Workbook::new();
        wb.add_sheet("Task");
        let choice = CellAddr::new(0, 0, 0);
        wb.set_cell_input(choice, "Low").unwrap();
        paint(&mut wb, choice, SELECTION);
        if let Some(sheet) = wb.sheet_mut(0) {
            sheet.set_validation(CellRange::single(0, 0), ValidationRule::list_inline(strings(list)));
        }
        wb.set_formula(CellAddr::new(0, 0, 1), rate_formula).unwrap();
        let total = CellAddr::new(0, 0, 2);
        wb.set_formula(total, "=100*B1").unwrap();
        paint(&mut wb, total, CALCULATION);
        wb
    }

    fn run(solution: Workbook, submission: Workbook) -> (Verdict, GradingContext) {
        let config = GradingConfig::default();
        let mut ctx = GradingContext::new(Workbook::new(), solution, submission, &config);
        let verdict = SelectionRule::new(&config).check(&mut ctx).unwrap();
        (verdict, ctx)
    }

    const RATE: &str = "=IF(A1=\"High\",0.2,0.1)";

    #[test]
    fn test_matching_dropdown_passes() {
        let (verdict, ctx) = run(priced(RATE, &["Low", "High"]), priced(RATE, &["High", "Low"]));
        assert!(verdict.passed, "{verdict}");
        // both documents end on the solution's choice
        let addr = CellAddr::new(0, 0, 0);
        assert_eq!(ctx.submission.cell(addr).unwrap().current_value(), Value::Text("Low".into()));
        assert_eq!(ctx.submission.cell(CellAddr::new(0, 0, 2)).unwrap().current_value(), Value::Number(10.0));
    }

    #[test]
    fn test_hardcoded_rate_fails_on_other_option() {
        let (verdict, _) = run(priced(RATE, &["Low", "High"]), priced("=0.1", &["Low", "High"]));
        assert!(!verdict.passed);
        assert!(verdict.reason.unwrap().contains("values referring to your dropdown"));
    }

    #[test]
    fn test_wrong_list_fails() {
        let (verdict, _) = run(priced(RATE, &["Low", "Medium", "High"]), priced(RATE, &["Low", "Medium"]));
        assert!(verdict.reason.unwrap().contains("does not refer to the correct cells"));
    }

    #[test]
    fn test_missing_dropdown_fails() {
        let mut submission = priced(RATE, &["Low", "High"]);
        if let Some(sheet) = submission.sheet_mut(0) {
            sheet.validations.clear_range(&CellRange::single(0, 0));
        }
        let (verdict, _) = run(priced(RATE, &["Low", "High"]), submission);
        assert!(verdict.reason.unwrap().contains("don't have a dropdown"));
    }

    #[test]
    fn test_message_flags_checked_when_enabled() {
        let solution = priced(RATE, &["Low", "High"]);
        let mut submission = priced(RATE, &["Low", "High"]);
        if let Some(sheet) = submission.sheet_mut(0) {
            let rule = ValidationRule::list_inline(strings(&["Low", "High"])).with_show_dropdown(false);
            sheet.set_validation(CellRange::single(0, 0), rule);
        }

        let (verdict, _) = run(solution.clone(), submission.clone());
        assert!(verdict.passed);

        let mut config = GradingConfig::default();
        config.selection.check_messages = true;
        let mut ctx = GradingContext::new(Workbook::new(), solution, submission, &config);
        let verdict = SelectionRule::new(&config).check(&mut ctx).unwrap();
        assert!(verdict.reason.unwrap().contains("expected messages"));
    }

    #[test]
    fn test_solution_without_constraint_is_error() {
        let mut solution = priced(RATE, &["Low", "High"]);
        if let Some(sheet) = solution.sheet_mut(0) {
            sheet.validations.clear_range(&CellRange::single(0, 0));
        }
        let config = GradingConfig::default();
        let mut ctx = GradingContext::new(Workbook::new(), solution, priced(RATE, &["Low", "High"]), &config);
        let err = SelectionRule::new(&config).check(&mut ctx).unwrap_err();
        assert_eq!(err.kind(), "selection");
    }
}
