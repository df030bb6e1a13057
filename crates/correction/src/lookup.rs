//! Lookup-family equivalence.
//!
//! `LOOKUP`, `VLOOKUP` and `HLOOKUP` form one family. A solution that uses
//! one of them may be matched by a submission using another, provided both
//! agree on exact vs. approximate matching. The decision is made on formula
//! text alone; the values rule confirms the computed results separately.
//!
//! The match type of `VLOOKUP`/`HLOOKUP` is the 4th parameter. An omitted
//! 4th parameter counts as exact match here, even though a spreadsheet
//! evaluates it as approximate.

use std::sync::OnceLock;

use regex::Regex;

use calcgrade_engine::CellAddr;

use crate::config::{GradingConfig, Messages};
use crate::error::CorrectionError;
use crate::role::{self, CellRole};
use crate::rule::{require_cell, Document, GradingContext, Rule};
use crate::verdict::Verdict;

fn lookup_name_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b([VH]?LOOKUP)\s*\(").ok()).as_ref()
}

/// Any function call: the name and its opening parenthesis.
fn call_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b([A-Z_][A-Z0-9_.]*)\s*\(").ok()).as_ref()
}

/// True if the formula text calls any lookup-family function.
pub fn mentions_lookup(formula: &str) -> bool {
    lookup_name_re().is_some_and(|re| re.is_match(formula))
}

// ---------------------------------------------------------------------------
// Argument tokenizer
// ---------------------------------------------------------------------------

/// Split the argument list whose `(` sits at byte `open`.
///
/// Returns the trimmed top-level arguments and the byte index of the matching
/// `)`. Commas inside nested calls or string literals do not split; `;` is
/// accepted as a separator too. `None` if the parentheses never close.
pub(crate) fn split_args_at(text: &str, open: usize) -> Option<(Vec<String>, usize)> {
    if text.as_bytes().get(open) != Some(&b'(') {
        return None;
    }
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = open + 1;

    for (i, ch) in text[open + 1..].char_indices() {
        let i = i + open + 1;
        if in_string {
            if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '(' => depth += 1,
            ')' if depth == 0 => {
                let last = text[start..i].trim();
                if !(args.is_empty() && last.is_empty()) {
                    args.push(last.to_string());
                }
                return Some((args, i));
            }
            ')' => depth -= 1,
            ',' | ';' if depth == 0 => {
                args.push(text[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    None
}

/// Arguments of the first call to `name` in `formula` (case-insensitive).
///
/// `VLOOKUP` is not mistaken for a call to `LOOKUP`.
pub fn split_call_args(formula: &str, name: &str) -> Option<Vec<String>> {
    let call = call_re()?
        .captures_iter(formula)
        .find(|caps| caps.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case(name)))?;
    let open = call.get(0)?.end() - 1;
    split_args_at(formula, open).map(|(args, _)| args)
}

// ---------------------------------------------------------------------------
// Lookup calls
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupFunction {
    Lookup,
    VLookup,
    HLookup,
}

impl LookupFunction {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "LOOKUP" => Some(Self::Lookup),
            "VLOOKUP" => Some(Self::VLookup),
            "HLOOKUP" => Some(Self::HLookup),
            _ => None,
        }
    }

    fn is_table(self) -> bool {
        matches!(self, Self::VLookup | Self::HLookup)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    Approximate,
    /// `LOOKUP`, which has no match-type parameter.
    Sorted,
    /// A 4th parameter that is not a literal 0/1 (e.g. a cell reference).
    Unknown,
}

/// The first lookup-family call in a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupCall {
    pub function: LookupFunction,
    pub args: Vec<String>,
}

impl LookupCall {
    pub fn find(formula: &str) -> Option<Self> {
        let caps = lookup_name_re()?.captures(formula)?;
        let whole = caps.get(0)?;
        let function = LookupFunction::from_name(caps.get(1)?.as_str())?;
        let open = whole.end() - 1;
        let (args, _) = split_args_at(formula, open)?;
        Some(Self { function, args })
    }

    pub fn match_mode(&self) -> MatchMode {
        if self.function == LookupFunction::Lookup {
            return MatchMode::Sorted;
        }
        match self.args.len() {
            3 => MatchMode::Exact,
            4 => match self.args[3].trim().to_ascii_uppercase().as_str() {
                "0" | "FALSE" => MatchMode::Exact,
                "1" | "TRUE" => MatchMode::Approximate,
                _ => MatchMode::Unknown,
            },
            _ => MatchMode::Unknown,
        }
    }

    fn normalized(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_ascii_uppercase())
            .collect();
        format!("{:?}({})", self.function, args.join(","))
    }
}

/// Whether the submission's lookup technique may stand in for the solution's.
///
/// Not symmetric: an approximate `VLOOKUP` solution accepts `LOOKUP`, and a
/// `LOOKUP` solution accepts only a 4-parameter approximate table lookup.
pub fn lookup_family_acceptable(solution: &str, submission: &str) -> bool {
    let Some(sol) = LookupCall::find(solution) else {
        return true;
    };
    let Some(sub) = LookupCall::find(submission) else {
        return false;
    };
    if sol.normalized() == sub.normalized() {
        return true;
    }

    match sol.match_mode() {
        MatchMode::Exact => sub.function.is_table() && sub.match_mode() == MatchMode::Exact,
        MatchMode::Approximate => {
            sub.function == LookupFunction::Lookup
                || (sub.function.is_table() && sub.match_mode() == MatchMode::Approximate)
        }
        MatchMode::Sorted => {
            sub.function == LookupFunction::Lookup
                || (sub.function.is_table() && sub.args.len() == 4 && sub.match_mode() == MatchMode::Approximate)
        }
        MatchMode::Unknown => false,
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// Checks every Calculation cell whose solution formula uses a lookup.
pub struct LookupFamilyRule {
    messages: Messages,
}

impl LookupFamilyRule {
    pub fn new(config: &GradingConfig) -> Self {
        Self { messages: config.messages.clone() }
    }
}

impl Rule for LookupFamilyRule {
    fn name(&self) -> &str {
        "lookup_family"
    }

    fn check(&self, ctx: &mut GradingContext) -> Result<Verdict, CorrectionError> {
        let targets: Vec<(CellAddr, String)> = role::cells_with_role(&ctx.solution, &ctx.palette, CellRole::Calculation)
            .into_iter()
            .filter_map(|addr| {
                let source = ctx.solution.cell(addr)?.value.formula_source()?;
                mentions_lookup(source).then(|| (addr, source.to_string()))
            })
            .collect();

        for (addr, solution_formula) in targets {
            let cell = require_cell(&ctx.submission, Document::Submission, addr)?;
            let submission_formula = cell.value.formula_source().unwrap_or("");
            if !lookup_family_acceptable(&solution_formula, submission_formula) {
                log::debug!(
                    "lookup_family: {} solution '{}' submission '{}'",
                    ctx.solution.describe(addr),
                    solution_formula,
                    submission_formula
                );
                let (cell, sheet) = ctx.location(addr);
                return Ok(Verdict::fail(Messages::render(&self.messages.wrong_lookup, &cell, &sheet)));
            }
        }
        Ok(Verdict::pass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        assert!(lookup_name_re().is_some());
        assert!(call_re().is_some());
    }

    #[test]
    fn test_split_call_args_after_other_calls() {
        assert_eq!(
            split_call_args("=IF(LOOKUP(A1,B1:B5)>0,1,2)", "LOOKUP").unwrap(),
            vec!["A1", "B1:B5"]
        );
        assert_eq!(split_call_args("=SUM(X.LOOKUP(1,2),lookup(3,4))", "LOOKUP").unwrap(), vec!["3", "4"]);
        assert!(split_call_args("=SUM(1)", "LOOKUP").is_none());
    }

    #[test]
    fn test_split_args_nested() {
        let args = split_call_args("=VLOOKUP(A1,B1:C10,MATCH(\"x,y\",D1:D3,0),0)+1", "VLOOKUP").unwrap();
        assert_eq!(args, vec!["A1", "B1:C10", "MATCH(\"x,y\",D1:D3,0)", "0"]);
    }

    #[test]
    fn test_split_args_semicolons_and_spaces() {
        let args = split_call_args("=hlookup( A1 ; B1:J2 ; 2 )", "HLOOKUP").unwrap();
        assert_eq!(args, vec!["A1", "B1:J2", "2"]);
    }

    #[test]
    fn test_split_call_args_word_boundary() {
        assert!(split_call_args("=VLOOKUP(A1,B1:C2,2)", "LOOKUP").is_none());
        assert_eq!(
            split_call_args("=LOOKUP(A1,B1:B5)", "LOOKUP").unwrap(),
            vec!["A1", "B1:B5"]
        );
        assert!(split_call_args("=LOOKUP(A1,B1:B5", "LOOKUP").is_none());
    }

    #[test]
    fn test_split_empty_args() {
        assert_eq!(split_call_args("=TODAY()", "TODAY").unwrap(), Vec::<String>::new());
        assert_eq!(split_call_args("=IF(A1,,2)", "IF").unwrap(), vec!["A1", "", "2"]);
    }

    #[test]
    fn test_match_modes() {
        let mode = |f: &str| LookupCall::find(f).unwrap().match_mode();
        assert_eq!(mode("=VLOOKUP(A1,B1:C10,2)"), MatchMode::Exact);
        assert_eq!(mode("=VLOOKUP(A1,B1:C10,2,0)"), MatchMode::Exact);
        assert_eq!(mode("=VLOOKUP(A1,B1:C10,2,FALSE)"), MatchMode::Exact);
        assert_eq!(mode("=HLOOKUP(A1,B1:J2,2,1)"), MatchMode::Approximate);
        assert_eq!(mode("=VLOOKUP(A1,B1:C10,2,Z1)"), MatchMode::Unknown);
        assert_eq!(mode("=ROUND(LOOKUP(A1,B1:B10),2)"), MatchMode::Sorted);
        assert!(LookupCall::find("=SUM(A1:A3)").is_none());
    }

    #[test]
    fn test_exact_solution() {
        let sol = "=VLOOKUP(A1,B1:C10,2,0)";
        assert!(lookup_family_acceptable(sol, "=VLOOKUP(A1,B1:C10,2)"));
        assert!(lookup_family_acceptable(sol, "=HLOOKUP(A1,B1:J2,2,0)"));
        assert!(!lookup_family_acceptable(sol, "=VLOOKUP(A1,B1:C10,2,1)"));
        assert!(!lookup_family_acceptable(sol, "=LOOKUP(A1,B1:B10,C1:C10)"));
    }

    #[test]
    fn test_approximate_solution() {
        let sol = "=VLOOKUP(A1,B1:C10,2,1)";
        assert!(lookup_family_acceptable(sol, "=LOOKUP(A1,B1:B10,C1:C10)"));
        assert!(lookup_family_acceptable(sol, "=HLOOKUP(A1,B1:J2,2,1)"));
        assert!(!lookup_family_acceptable(sol, "=VLOOKUP(A1,B1:C10,2)"));
    }

    #[test]
    fn test_lookup_solution() {
        let sol = "=LOOKUP(A1,B1:B10)";
        assert!(lookup_family_acceptable(sol, "=HLOOKUP(A1,B1:J2,2,1)"));
        assert!(!lookup_family_acceptable(sol, "=HLOOKUP(A1,B1:J2,2,0)"));
        assert!(!lookup_family_acceptable(sol, "=HLOOKUP(A1,B1:J2,2)"));
        assert!(lookup_family_acceptable(sol, "=lookup(A1, B1:B10)"));
    }

    #[test]
    fn test_not_symmetric() {
        // approximate VLOOKUP accepts LOOKUP; LOOKUP checks the 4th parameter
        assert!(lookup_family_acceptable("=VLOOKUP(A1,B1:C10,2,1)", "=LOOKUP(A1,B1:B10)"));
        assert!(!lookup_family_acceptable("=LOOKUP(A1,B1:B10)", "=VLOOKUP(A1,B1:C10,2)"));
    }

    #[test]
    fn test_identical_and_missing() {
        assert!(lookup_family_acceptable("=VLOOKUP(A1,B1:C10,2,Z1)", "=vlookup(A1, B1:C10, 2, z1)"));
        assert!(!lookup_family_acceptable("=VLOOKUP(A1,B1:C10,2)", "=B4"));
        assert!(!lookup_family_acceptable("=VLOOKUP(A1,B1:C10,2)", ""));
        assert!(lookup_family_acceptable("=SUM(A1:A3)", "=A1+A2+A3"));
    }
}
