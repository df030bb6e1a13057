use calcgrade_engine::PageSetup;

use crate::config::{GradingConfig, Messages};
use crate::error::CorrectionError;
use crate::rule::{GradingContext, Rule};
use crate::verdict::Verdict;

/// Normalize a print reference: drop `$`, whitespace and any sheet
/// qualifier, uppercase the rest. `'Task'!$A$1:$F$30` -> `A1:F30`.
fn normalize_reference(reference: Option<&str>) -> Option<String> {
    let reference = reference?.trim();
    let body = reference.rsplit_once('!').map_or(reference, |(_, body)| body);
    let normalized: String = body
        .chars()
        .filter(|c| *c != '$' && !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    (!normalized.is_empty()).then_some(normalized)
}

/// Print area and repeated rows/columns agree.
pub fn same_print_setup(solution: &PageSetup, submission: &PageSetup) -> bool {
    let pairs = [
        (&solution.print_area, &submission.print_area),
        (&solution.repeat_rows, &submission.repeat_rows),
        (&solution.repeat_cols, &submission.repeat_cols),
    ];
    pairs
        .iter()
        .all(|(a, b)| normalize_reference(a.as_deref()) == normalize_reference(b.as_deref()))
}

pub struct PrintSetupRule {
    messages: Messages,
}

impl PrintSetupRule {
    pub fn new(config: &GradingConfig) -> Self {
        Self { messages: config.messages.clone() }
    }
}

impl Rule for PrintSetupRule {
    fn name(&self) -> &str {
        "print_setup"
    }

    fn check(&self, ctx: &mut GradingContext) -> Result<Verdict, CorrectionError> {
        for index in 0..ctx.solution.sheet_count() {
            let (sol, sub) = ctx.sheet_pair(index)?;
            if !same_print_setup(&sol.page_setup, &sub.page_setup) {
                log::debug!(
                    "print_setup: sheet '{}' expected {:?}, got {:?}",
                    sol.name,
                    sol.page_setup,
                    sub.page_setup
                );
                return Ok(Verdict::fail(Messages::render(&self.messages.wrong_print_setup, "", &sol.name)));
            }
        }
        Ok(Verdict::pass())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcgrade_engine::Workbook;

    #[test]
    fn test_normalize_reference() {
        assert_eq!(normalize_reference(Some("'Task'!$A$1:$F$30")).as_deref(), Some("A1:F30"));
        assert_eq!(normalize_reference(Some(" $1:$2 ")).as_deref(), Some("1:2"));
        assert_eq!(normalize_reference(Some("")), None);
        assert_eq!(normalize_reference(None), None);
    }

    #[test]
    fn test_same_print_setup() {
        let sol = PageSetup { print_area: Some("$A$1:$F$30".into()), ..PageSetup::default() };
        let sub = PageSetup { print_area: Some("Task!a1:f30".into()), ..PageSetup::default() };
        assert!(same_print_setup(&sol, &sub));

        let sub = PageSetup { print_area: Some("A1:F31".into()), ..PageSetup::default() };
        assert!(!same_print_setup(&sol, &sub));

        let sol = PageSetup { repeat_rows: Some("$1:$1".into()), ..PageSetup::default() };
        assert!(!same_print_setup(&sol, &PageSetup::default()));
    }

    #[test]
    fn test_rule_ignores_header_footer() {
        let mut sol = Workbook::new();
        sol.add_sheet("Task");
        let mut sub = sol.clone();
        sol.sheet_mut(0).unwrap().page_setup.footer.right = "#A1".into();

        let config = GradingConfig::default();
        let mut ctx = GradingContext::new(Workbook::new(), sol.clone(), sub.clone(), &config);
        assert!(PrintSetupRule::new(&config).check(&mut ctx).unwrap().passed);

        sub.sheet_mut(0).unwrap().page_setup.repeat_cols = Some("$A:$A".into());
        let mut ctx = GradingContext::new(Workbook::new(), sol, sub, &config);
        let verdict = PrintSetupRule::new(&config).check(&mut ctx).unwrap();
        assert!(verdict.reason.unwrap().contains("print settings of sheet Task"));
    }
}
