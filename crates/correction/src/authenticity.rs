//! Submission authenticity.
//!
//! Each generated instruction carries a code (`#` followed by a token) in a
//! sheet footer. The learner's submission must carry the same code in its
//! document keywords. Comparison is exact, case and whitespace included.

use std::sync::OnceLock;

use regex::Regex;

use calcgrade_engine::Workbook;

use crate::config::{GradingConfig, Messages};
use crate::error::CorrectionError;
use crate::rule::{GradingContext, Rule};
use crate::verdict::Verdict;

fn code_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\S+").ok()).as_ref()
}

/// First `#token` in a piece of text.
pub fn extract_code(text: &str) -> Option<String> {
    code_re()?.find(text).map(|m| m.as_str().to_string())
}

/// The code printed in the instruction's footers, first sheet first.
pub fn instruction_code(instruction: &Workbook) -> Option<String> {
    instruction
        .sheets()
        .iter()
        .find_map(|sheet| extract_code(&sheet.page_setup.footer.text()))
}

pub struct AuthenticityRule {
    messages: Messages,
}

impl AuthenticityRule {
    pub fn new(config: &GradingConfig) -> Self {
        Self { messages: config.messages.clone() }
    }
}

impl Rule for AuthenticityRule {
    fn name(&self) -> &str {
        "authenticity"
    }

    fn check(&self, ctx: &mut GradingContext) -> Result<Verdict, CorrectionError> {
        let expected = instruction_code(&ctx.instruction);
        let found = &ctx.submission.properties.keywords;

        match expected {
            Some(code) if *found == code => Ok(Verdict::pass()),
            Some(code) => {
                log::info!("authenticity: expected code '{code}', submission carries '{found}'");
                Ok(Verdict::fail(self.messages.wrong_instruction.clone()))
            }
            None => {
                log::warn!("authenticity: instruction has no code in any footer");
                Ok(Verdict::fail(self.messages.wrong_instruction.clone()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcgrade_engine::HeaderFooter;

    #[test]
    fn test_pattern_compiles() {
        assert!(code_re().is_some());
    }

    #[test]
    fn test_extract_code() {
        assert_eq!(extract_code("Exercise 4 #K7Q2").as_deref(), Some("#K7Q2"));
        assert_eq!(extract_code("#A1 and #A2").as_deref(), Some("#A1"));
        assert_eq!(extract_code("Page &P of &N"), None);
        assert_eq!(extract_code("# spaced"), None);
    }

    fn instruction(footer: &str) -> Workbook {
        let mut wb = Workbook::new();
        wb.add_sheet("Cover");
        wb.add_sheet("Task");
        if let Some(sheet) = wb.sheet_mut(1) {
            sheet.page_setup.footer = HeaderFooter::centered(footer);
        }
        wb
    }

    fn submission(keywords: &str) -> Workbook {
        let mut wb = Workbook::new();
        wb.add_sheet("Task");
        wb.properties.keywords = keywords.to_string();
        wb
    }

    fn run(footer: &str, keywords: &str) -> Verdict {
        let config = GradingConfig::default();
        let mut ctx = GradingContext::new(instruction(footer), Workbook::new(), submission(keywords), &config);
        AuthenticityRule::new(&config).check(&mut ctx).unwrap()
    }

    #[test]
    fn test_matching_code_passes() {
        assert!(run("Sheet #A1", "#A1").passed);
    }

    #[test]
    fn test_mismatch_fails() {
        let verdict = run("Sheet #A1", "#A2");
        assert!(!verdict.passed);
        assert_eq!(verdict.reason, Some(Messages::default().wrong_instruction));
    }

    #[test]
    fn test_exact_comparison() {
        assert!(!run("#abc", "#ABC").passed);
        assert!(!run("#abc", " #abc").passed);
    }

    #[test]
    fn test_missing_code_fails() {
        assert!(!run("no code here", "#A1").passed);
    }
}
