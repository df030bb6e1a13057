//! Formatting, protection and visibility checks.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use calcgrade_engine::{Alignment, Cell, CellKind};

use crate::config::{GradingConfig, Messages};
use crate::error::CorrectionError;
use crate::role::{self, CellRole};
use crate::rule::{require_cell, Document, GradingContext, Rule};
use crate::verdict::Verdict;

fn currency_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\$[^\]]*\]").ok()).as_ref()
}

/// Bracketed currency token of a number format, e.g. `[$€-407]`.
pub fn currency_token(format: &str) -> Option<&str> {
    currency_re()?.find(format).map(|m| m.as_str())
}

/// Format letters outside quoted literals and bracketed sections, lowercased.
fn format_codes(format: &str) -> String {
    let mut out = String::new();
    let mut in_quotes = false;
    let mut in_brackets = false;
    for ch in format.chars() {
        match ch {
            '"' if !in_brackets => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            c if !in_quotes && !in_brackets => out.push(c.to_ascii_lowercase()),
            _ => {}
        }
    }
    out
}

/// Both a day and a month token appear in the format.
pub fn has_day_and_month(format: &str) -> bool {
    let codes = format_codes(format);
    codes.contains('d') && codes.contains('m')
}

/// First difference found between a solution cell and a submission cell.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatMismatch {
    Kind { solution: CellKind, submission: CellKind },
    GeneralFormat,
    Currency(String),
    Percent,
    DayMonth,
    Locked,
    Hidden,
    Alignment { solution: Alignment, submission: Alignment },
    FontSize,
    FontName,
}

impl FormatMismatch {
    /// Locked/hidden differences get the protection message.
    pub fn is_protection(&self) -> bool {
        matches!(self, Self::Locked | Self::Hidden)
    }
}

impl fmt::Display for FormatMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kind { solution, submission } => write!(f, "cell kind {submission}, expected {solution}"),
            Self::GeneralFormat => write!(f, "number format is not General"),
            Self::Currency(token) => write!(f, "currency {token} missing"),
            Self::Percent => write!(f, "percent format missing"),
            Self::DayMonth => write!(f, "date format lacks day or month"),
            Self::Locked => write!(f, "locked flag differs"),
            Self::Hidden => write!(f, "hidden flag differs"),
            Self::Alignment { solution, submission } => {
                write!(f, "alignment {submission:?}, expected {solution:?}")
            }
            Self::FontSize => write!(f, "font size differs"),
            Self::FontName => write!(f, "font name differs"),
        }
    }
}

/// Compare presentation and protection of two cells.
///
/// Number formats are compared by family (General, currency, percent, date)
/// rather than verbatim. FormatCheck cells additionally pin alignment and
/// font.
pub fn check_cell(solution: &Cell, submission: &Cell, role: CellRole) -> Option<FormatMismatch> {
    if solution.kind() != submission.kind() {
        return Some(FormatMismatch::Kind { solution: solution.kind(), submission: submission.kind() });
    }

    let (sol, sub) = (&solution.style, &submission.style);
    if sol.has_general_format() && !sub.has_general_format() {
        return Some(FormatMismatch::GeneralFormat);
    }
    if let Some(token) = currency_token(&sol.number_format) {
        if !sub.number_format.contains(token) {
            return Some(FormatMismatch::Currency(token.to_string()));
        }
    }
    if sol.number_format.contains('%') && !sub.number_format.contains('%') {
        return Some(FormatMismatch::Percent);
    }
    if has_day_and_month(&sol.number_format) && !has_day_and_month(&sub.number_format) {
        return Some(FormatMismatch::DayMonth);
    }

    if sol.locked != sub.locked {
        return Some(FormatMismatch::Locked);
    }
    if sol.hidden != sub.hidden {
        return Some(FormatMismatch::Hidden);
    }

    if role == CellRole::FormatCheck {
        if sol.alignment != sub.alignment {
            return Some(FormatMismatch::Alignment { solution: sol.alignment, submission: sub.alignment });
        }
        if sol.font_size != sub.font_size {
            return Some(FormatMismatch::FontSize);
        }
        if sol.font_name != sub.font_name {
            return Some(FormatMismatch::FontName);
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

pub struct FormattingRule {
    messages: Messages,
}

impl FormattingRule {
    pub fn new(config: &GradingConfig) -> Self {
        Self { messages: config.messages.clone() }
    }
}

impl Rule for FormattingRule {
    fn name(&self) -> &str {
        "formatting"
    }

    fn check(&self, ctx: &mut GradingContext) -> Result<Verdict, CorrectionError> {
        for (addr, role) in role::classify(&ctx.solution, &ctx.palette) {
            if !role.participates_in_formatting() {
                continue;
            }
            let solution = require_cell(&ctx.solution, Document::Solution, addr)?;
            let submission = require_cell(&ctx.submission, Document::Submission, addr)?;
            if let Some(mismatch) = check_cell(solution, submission, role) {
                log::debug!("formatting: {} ({role}): {mismatch}", ctx.solution.describe(addr));
                let template = if mismatch.is_protection() {
                    &self.messages.wrong_protection
                } else {
                    &self.messages.wrong_format
                };
                let (cell, sheet) = ctx.location(addr);
                return Ok(Verdict::fail(Messages::render(template, &cell, &sheet)));
            }
        }
        Ok(Verdict::pass())
    }
}

/// Sheet-level visibility and protection: hidden rows, hidden columns, the
/// sheet's hidden flag and its protection flag must match, sheet by sheet.
pub struct VisibilityRule {
    messages: Messages,
}

impl VisibilityRule {
    pub fn new(config: &GradingConfig) -> Self {
        Self { messages: config.messages.clone() }
    }
}

impl Rule for VisibilityRule {
    fn name(&self) -> &str {
        "visibility"
    }

    fn check(&self, ctx: &mut GradingContext) -> Result<Verdict, CorrectionError> {
        for index in 0..ctx.solution.sheet_count() {
            let (sol, sub) = ctx.sheet_pair(index)?;
            let same = sol.hidden == sub.hidden
                && sol.protection == sub.protection
                && sol.hidden_rows == sub.hidden_rows
                && sol.hidden_cols == sub.hidden_cols;
            if !same {
                log::debug!(
                    "visibility: sheet '{}' hidden {}/{} protected {}/{} rows {:?}/{:?} cols {:?}/{:?}",
                    sol.name,
                    sol.hidden,
                    sub.hidden,
                    sol.protection.protected,
                    sub.protection.protected,
                    sol.hidden_rows,
                    sub.hidden_rows,
                    sol.hidden_cols,
                    sub.hidden_cols
                );
                return Ok(Verdict::fail(Messages::render(&self.messages.wrong_visibility, "", &sol.name)));
            }
        }
        Ok(Verdict::pass())
    }
}
