//! The rule contract and the per-call grading state.
//!
//! Rules run in a fixed order over one `GradingContext`. Some of them change
//! the documents they inspect (helper randomization, forced dropdown choices,
//! formula rewriting) and later rules see those changes. A rule announces
//! such mutations through `effects()` so the chain can log them and tests can
//! assert on the ordering contract.

use std::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;

use calcgrade_engine::{Cell, CellAddr, CellValue, Sheet, Workbook};

use crate::config::GradingConfig;
use crate::error::CorrectionError;
use crate::role::Palette;
use crate::values::rewrite_legacy_formulas;
use crate::verdict::Verdict;

/// Document mutations a rule may perform. A small bit set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RuleEffects(u8);

impl RuleEffects {
    pub const READ_ONLY: Self = Self(0);
    /// Formula text is rewritten in solution and submission.
    pub const REWRITES_FORMULAS: Self = Self(1);
    /// Helper cells get fresh values in solution and submission.
    pub const RANDOMIZES_HELPERS: Self = Self(1 << 1);
    /// Dropdown cells are set to the same choice in both documents.
    pub const FORCES_SELECTIONS: Self = Self(1 << 2);

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_read_only(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RuleEffects {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_read_only() {
            return write!(f, "read_only");
        }
        let names: Vec<&str> = [
            (Self::REWRITES_FORMULAS, "rewrites_formulas"),
            (Self::RANDOMIZES_HELPERS, "randomizes_helpers"),
            (Self::FORCES_SELECTIONS, "forces_selections"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        write!(f, "{}", names.join("|"))
    }
}

/// One correctness check.
pub trait Rule {
    /// Registry key, used in logs and reports.
    fn name(&self) -> &str;

    fn effects(&self) -> RuleEffects {
        RuleEffects::READ_ONLY
    }

    /// `Ok(Verdict)` for a pass or a semantic mismatch, `Err` when the
    /// documents cannot be compared at all.
    fn check(&self, ctx: &mut GradingContext) -> Result<Verdict, CorrectionError>;
}

/// Which of the three documents an error or lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Document {
    Instruction,
    Solution,
    Submission,
}

impl Document {
    pub fn label(self) -> &'static str {
        match self {
            Self::Instruction => "instruction",
            Self::Solution => "solution",
            Self::Submission => "submission",
        }
    }
}

/// State of one grading call. Owns private copies of all three documents.
pub struct GradingContext {
    pub instruction: Workbook,
    pub solution: Workbook,
    pub submission: Workbook,
    pub palette: Palette,
    rng: StdRng,
}

impl GradingContext {
    /// Build the context and bring solution and submission caches up to date.
    ///
    /// Legacy formula spellings are rewritten first, so every rule sees
    /// evaluable formulas. One that cannot be rewritten stays as it is and
    /// the values rule reports it.
    pub fn new(instruction: Workbook, mut solution: Workbook, mut submission: Workbook, config: &GradingConfig) -> Self {
        for (which, workbook) in [(Document::Solution, &mut solution), (Document::Submission, &mut submission)] {
            match rewrite_legacy_formulas(workbook) {
                Ok(0) => {}
                Ok(n) => log::debug!("{}: rewrote {n} legacy formulas", which.label()),
                Err(err) => log::debug!("{}: {err}", which.label()),
            }
        }
        solution.recalculate();
        submission.recalculate();
        let rng = match config.randomization.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            instruction,
            solution,
            submission,
            palette: config.palette.clone(),
            rng,
        }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub fn document(&self, which: Document) -> &Workbook {
        match which {
            Document::Instruction => &self.instruction,
            Document::Solution => &self.solution,
            Document::Submission => &self.submission,
        }
    }

    /// Solution sheet `index` and the submission sheet at the same position.
    pub fn sheet_pair(&self, index: usize) -> Result<(&Sheet, &Sheet), CorrectionError> {
        let solution = require_sheet(&self.solution, Document::Solution, index)?;
        let submission = self.submission.sheet(index).ok_or_else(|| CorrectionError::MissingSheet {
            document: Document::Submission.label(),
            sheet: solution.name.clone(),
        })?;
        Ok((solution, submission))
    }

    /// `{cell}` / `{sheet}` values for message templates, from the solution.
    pub fn location(&self, addr: CellAddr) -> (String, String) {
        let sheet = self
            .solution
            .sheet(addr.sheet)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("#{}", addr.sheet + 1));
        (addr.a1(), sheet)
    }
}

pub fn require_sheet(workbook: &Workbook, which: Document, index: usize) -> Result<&Sheet, CorrectionError> {
    workbook.sheet(index).ok_or_else(|| CorrectionError::MissingSheet {
        document: which.label(),
        sheet: format!("#{}", index + 1),
    })
}

/// The cell at `addr`, failing when its sheet or the cell itself is absent.
pub fn require_cell(workbook: &Workbook, which: Document, addr: CellAddr) -> Result<&Cell, CorrectionError> {
    let sheet = require_sheet(workbook, which, addr.sheet)?;
    sheet.cell(addr.row, addr.col).ok_or_else(|| CorrectionError::MissingCell {
        document: which.label(),
        cell: workbook.describe(addr),
    })
}

/// Overwrite a cell's content with a literal, keeping its style.
pub fn write_literal(workbook: &mut Workbook, which: Document, addr: CellAddr, value: CellValue) -> Result<(), CorrectionError> {
    let sheet = workbook.sheet_mut(addr.sheet).ok_or_else(|| CorrectionError::MissingSheet {
        document: which.label(),
        sheet: format!("#{}", addr.sheet + 1),
    })?;
    match sheet.cell_mut(addr.row, addr.col) {
        Some(cell) => {
            cell.value = value;
            cell.cached = None;
        }
        None => sheet.insert_cell(addr.row, addr.col, Cell { value, ..Cell::default() }),
    }
    Ok(())
}
