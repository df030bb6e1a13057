//! Correctness engine for spreadsheet exercises.
//!
//! Grades a learner's submission against the solution of an exercise:
//! cell roles come from fill colours, and an ordered, fail-fast chain of
//! rules compares computed values, lookup technique, dropdowns, formatting
//! and visibility. The result is a single `Verdict`.
//!
//! Pure: documents come in already parsed, nothing is read or written.
//!
//! ```ignore
//! let config = GradingConfig::from_toml(&text)?;
//! let chain = RuleRegistry::standard().build(&config)?;
//! let verdict = grade(instruction, solution, submission, &chain, &config);
//! ```

pub mod authenticity;
pub mod chain;
pub mod config;
pub mod error;
pub mod formatting;
pub mod lookup;
pub mod print_setup;
pub mod registry;
pub mod role;
pub mod rule;
pub mod selection;
pub mod values;
pub mod verdict;

pub use chain::{ChainReport, RuleChain};
pub use config::GradingConfig;
pub use error::CorrectionError;
pub use registry::RuleRegistry;
pub use role::{CellRole, Palette};
pub use rule::{GradingContext, Rule, RuleEffects};
pub use verdict::Verdict;

use calcgrade_engine::Workbook;

/// Grade one submission. Takes ownership of the documents; rules may
/// modify them while running.
pub fn grade(
    instruction: Workbook,
    solution: Workbook,
    submission: Workbook,
    chain: &RuleChain,
    config: &GradingConfig,
) -> Verdict {
    grade_detailed(instruction, solution, submission, chain, config).verdict
}

/// Like `grade`, also reporting which rules ran.
pub fn grade_detailed(
    instruction: Workbook,
    solution: Workbook,
    submission: Workbook,
    chain: &RuleChain,
    config: &GradingConfig,
) -> ChainReport {
    let mut ctx = GradingContext::new(instruction, solution, submission, config);
    chain.evaluate_detailed(&mut ctx)
}
