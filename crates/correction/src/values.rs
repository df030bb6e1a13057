//! Computed-value comparison.
//!
//! Runs in three steps over solution and submission alike:
//! 1. fail on legacy formula spellings that could not be rewritten when the
//!    grading context was built,
//! 2. give CalculationHelper cells fresh values (same value in both
//!    documents) and recalculate,
//! 3. compare every Calculation cell within the tolerance band.
//!
//! Step 2 defeats hard-coded answers: a result not derived from the helper
//! cells stops matching once the helpers change.

use std::sync::OnceLock;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::Regex;

use calcgrade_engine::{Cell, CellAddr, CellValue, Value, Workbook};

use crate::config::{GradingConfig, Messages};
use crate::error::CorrectionError;
use crate::lookup::split_args_at;
use crate::role::{self, CellRole};
use crate::rule::{require_cell, write_literal, Document, GradingContext, Rule, RuleEffects};
use crate::verdict::Verdict;

/// Upper bound on rewrites in one formula; guards against runaway input.
const MAX_REWRITES: usize = 64;

fn legacy_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(DATEDIF|DAYS)\s*\(").ok()).as_ref()
}

pub fn has_legacy_function(formula: &str) -> bool {
    legacy_re().is_some_and(|re| re.is_match(formula))
}

// ---------------------------------------------------------------------------
// Legacy formula rewrite
// ---------------------------------------------------------------------------

/// Replace `DATEDIF` and `DAYS` calls with equivalent supported arithmetic.
///
/// `DATEDIF(start, end, unit)` supports the units `Y`, `M` and `D`;
/// `DAYS(end, start)` becomes a plain subtraction. Calls are rewritten
/// innermost first, so nested legacy calls are handled too.
pub fn rewrite_legacy_formula(formula: &str) -> Result<String, String> {
    let mut text = formula.to_string();
    for _ in 0..MAX_REWRITES {
        let Some(re) = legacy_re() else {
            return Ok(text);
        };
        // Rightmost call first: its arguments hold no further legacy calls.
        let Some(caps) = re.captures_iter(&text).last() else {
            return Ok(text);
        };
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            return Ok(text);
        };
        let open = whole.end() - 1;
        let name_start = whole.start();
        let name = name.as_str().to_ascii_uppercase();

        let (args, close) =
            split_args_at(&text, open).ok_or_else(|| format!("unbalanced parentheses after {name}"))?;
        let replacement = match name.as_str() {
            "DATEDIF" => datedif(&args)?,
            _ => days(&args)?,
        };
        text.replace_range(name_start..=close, &replacement);
    }
    Err(format!("more than {MAX_REWRITES} legacy calls"))
}

fn datedif(args: &[String]) -> Result<String, String> {
    let [start, end, unit] = args else {
        return Err(format!("DATEDIF expects 3 arguments, got {}", args.len()));
    };
    let unit = unit.trim().trim_matches('"').to_ascii_uppercase();
    let (s, e) = (format!("({start})"), format!("({end})"));
    match unit.as_str() {
        "Y" => Ok(format!(
            "(YEAR({e})-YEAR({s})-IF(OR(MONTH({e})<MONTH({s}),AND(MONTH({e})=MONTH({s}),DAY({e})<DAY({s}))),1,0))"
        )),
        "M" => Ok(format!(
            "((YEAR({e})-YEAR({s}))*12+MONTH({e})-MONTH({s})-IF(DAY({e})<DAY({s}),1,0))"
        )),
        "D" => Ok(format!("({e}-{s})")),
        other => Err(format!("unsupported DATEDIF unit \"{other}\"")),
    }
}

fn days(args: &[String]) -> Result<String, String> {
    let [end, start] = args else {
        return Err(format!("DAYS expects 2 arguments, got {}", args.len()));
    };
    Ok(format!("(({end})-({start}))"))
}

/// Rewrite every legacy formula in a workbook. Returns the number rewritten.
///
/// A formula that cannot be rewritten is left as it is; the first such
/// failure is returned after all others have been rewritten.
pub fn rewrite_legacy_formulas(workbook: &mut Workbook) -> Result<usize, CorrectionError> {
    let targets: Vec<(CellAddr, String)> = workbook
        .formula_cells()
        .into_iter()
        .filter_map(|addr| {
            let source = workbook.cell(addr)?.value.formula_source()?;
            has_legacy_function(source).then(|| (addr, source.to_string()))
        })
        .collect();

    let mut rewritten = 0;
    let mut first_error = None;
    for (addr, source) in &targets {
        let result = rewrite_legacy_formula(source)
            .and_then(|text| workbook.set_formula(*addr, &text).map(|()| text));
        match result {
            Ok(text) => {
                log::debug!("rewrote {}: {} -> {}", workbook.describe(*addr), source, text);
                rewritten += 1;
            }
            Err(message) => {
                first_error.get_or_insert(CorrectionError::Formula { cell: workbook.describe(*addr), message });
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(rewritten),
    }
}

// ---------------------------------------------------------------------------
// Helper randomization
// ---------------------------------------------------------------------------

/// Draws before `scaled_value` gives up on the band.
const MAX_DRAWS: usize = 16;

/// A new value within `spread` of the original's magnitude, never equal to
/// the original. Whole numbers stay whole and move by at least one.
pub fn scaled_value<R: Rng + ?Sized>(original: f64, spread: f64, rng: &mut R) -> f64 {
    let magnitude = if original == 0.0 { 1.0 } else { original.abs() };
    let whole = original.fract() == 0.0;
    for _ in 0..MAX_DRAWS {
        let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        // (0, spread], zero excluded
        let shift = spread * (1.0 - rng.gen::<f64>()) * magnitude;
        let shift = if whole { shift.round().max(1.0) } else { shift };
        let value = original + sign * shift;
        if value != original && value.is_finite() {
            return value;
        }
    }
    original * (1.0 - spread)
}

/// Shuffle `pool` so that it differs from its current order whenever it
/// holds at least two distinct strings.
fn reorder<R: Rng + ?Sized>(pool: &mut [String], rng: &mut R) {
    let before = pool.to_vec();
    pool.shuffle(rng);
    if *pool == before[..] {
        // a rotation only maps a sequence onto itself when all items are equal
        pool.rotate_left(1);
    }
}

/// Give every CalculationHelper cell of the solution a fresh value and write
/// the same value to the submission at the same address, then recalculate
/// both documents.
///
/// Numeric helpers are rescaled, so each one changes. Text helpers are
/// shuffled among themselves, so the set of strings stays the same and at
/// least one helper changes unless all strings are equal. Formula helpers are
/// left alone.
/// Returns the number of cells written.
pub fn randomize_helpers(ctx: &mut GradingContext, spread: f64) -> Result<usize, CorrectionError> {
    let helpers = role::cells_with_role(&ctx.solution, &ctx.palette, CellRole::CalculationHelper);
    let mut numbers = Vec::new();
    let mut texts = Vec::new();
    for addr in helpers {
        match ctx.solution.cell(addr).map(|c| &c.value) {
            Some(CellValue::Number(n)) => numbers.push((addr, *n)),
            Some(CellValue::Text(t)) => texts.push((addr, t.clone())),
            _ => {}
        }
    }

    let mut written = 0;
    for (addr, original) in numbers {
        let value = scaled_value(original, spread, ctx.rng());
        write_literal(&mut ctx.solution, Document::Solution, addr, CellValue::Number(value))?;
        write_literal(&mut ctx.submission, Document::Submission, addr, CellValue::Number(value))?;
        written += 1;
    }

    if texts.len() > 1 {
        let mut pool: Vec<String> = texts.iter().map(|(_, t)| t.clone()).collect();
        reorder(&mut pool, ctx.rng());
        for ((addr, _), text) in texts.iter().zip(pool) {
            write_literal(&mut ctx.solution, Document::Solution, *addr, CellValue::Text(text.clone()))?;
            write_literal(&mut ctx.submission, Document::Submission, *addr, CellValue::Text(text))?;
            written += 1;
        }
    }

    ctx.solution.recalculate();
    ctx.submission.recalculate();
    log::debug!("randomized {written} helper cells");
    Ok(written)
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// `submission` lies in the band `relative` around `solution`
/// (bounds swapped for a negative solution).
pub fn within_band(solution: f64, submission: f64, relative: f64) -> bool {
    let a = solution * (1.0 - relative);
    let b = solution * (1.0 + relative);
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    lo <= submission && submission <= hi
}

/// Tolerant comparison of two cells' current values.
///
/// Numbers must fall in the tolerance band; when both cells are formulas the
/// comparison uses absolute values. Text must match exactly. Two empty cells
/// are equal. Any type mismatch or error value is unequal.
pub fn values_equal(solution: &Cell, submission: &Cell, tolerance: f64) -> bool {
    let both_formulas = solution.is_formula() && submission.is_formula();
    match (solution.current_value(), submission.current_value()) {
        (Value::Empty, Value::Empty) => true,
        (Value::Number(s), Value::Number(v)) if both_formulas => within_band(s.abs(), v.abs(), tolerance),
        (Value::Number(s), Value::Number(v)) => within_band(s, v, tolerance),
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Boolean(a), Value::Boolean(b)) => a == b,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

pub struct ValuesRule {
    tolerance: f64,
    spread: f64,
    messages: Messages,
}

impl ValuesRule {
    pub fn new(config: &GradingConfig) -> Self {
        Self {
            tolerance: config.tolerance.relative,
            spread: config.randomization.spread,
            messages: config.messages.clone(),
        }
    }
}

impl Rule for ValuesRule {
    fn name(&self) -> &str {
        "values"
    }

    fn effects(&self) -> RuleEffects {
        RuleEffects::REWRITES_FORMULAS.union(RuleEffects::RANDOMIZES_HELPERS)
    }

    fn check(&self, ctx: &mut GradingContext) -> Result<Verdict, CorrectionError> {
        rewrite_legacy_formulas(&mut ctx.solution)?;
        rewrite_legacy_formulas(&mut ctx.submission)?;
        // recalculates both documents
        randomize_helpers(ctx, self.spread)?;

        for addr in role::cells_with_role(&ctx.solution, &ctx.palette, CellRole::Calculation) {
            let solution = require_cell(&ctx.solution, Document::Solution, addr)?;
            let submission = require_cell(&ctx.submission, Document::Submission, addr)?;
            if !values_equal(solution, submission, self.tolerance) {
                log::debug!(
                    "values: {} expected {:?}, got {:?}",
                    ctx.solution.describe(addr),
                    solution.current_value(),
                    submission.current_value()
                );
                let (cell, sheet) = ctx.location(addr);
                return Ok(Verdict::fail(Messages::render(&self.messages.wrong_value, &cell, &sheet)));
            }
        }
        Ok(Verdict::pass())
    }
}
