use std::collections::HashSet;

use serde::Deserialize;

use crate::error::CorrectionError;
use crate::role::Palette;

/// Every chain opens with this rule; nothing is graded for a foreign document.
pub const FIRST_RULE: &str = "authenticity";

/// Rules run when the configuration does not list any.
pub const DEFAULT_RULES: &[&str] = &[
    "authenticity",
    "visibility",
    "formatting",
    "lookup_family",
    "selection",
    "values",
];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Grading configuration, usually read from a `grading.toml`.
///
/// Every section is optional; an empty document yields the standard chain
/// with the documented palette, a 1% tolerance band and stock messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GradingConfig {
    /// Rule names in execution order, starting with `FIRST_RULE`.
    pub rules: Vec<String>,
    pub tolerance: ToleranceConfig,
    pub randomization: RandomizationConfig,
    pub palette: Palette,
    pub messages: Messages,
    pub selection: SelectionConfig,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.iter().map(|s| s.to_string()).collect(),
            tolerance: ToleranceConfig::default(),
            randomization: RandomizationConfig::default(),
            palette: Palette::default(),
            messages: Messages::default(),
            selection: SelectionConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToleranceConfig {
    /// Relative band around the solution value (0.01 = ±1%).
    pub relative: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self { relative: 0.01 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomizationConfig {
    /// Fixed seed for reproducible runs. Unset means seeded from entropy.
    pub seed: Option<u64>,
    /// Maximum relative change applied to a numeric helper value.
    pub spread: f64,
}

impl Default for RandomizationConfig {
    fn default() -> Self {
        Self { seed: None, spread: 0.5 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectionConfig {
    /// Also require the dropdown's prompt and error box to match.
    pub check_messages: bool,
}

/// Learner-facing failure texts.
///
/// Templates may use `{cell}` (A1 address) and `{sheet}` (sheet name).
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Messages {
    pub wrong_instruction: String,
    pub structural_error: String,
    pub wrong_value: String,
    pub wrong_lookup: String,
    pub selection_missing: String,
    pub selection_source: String,
    pub selection_values: String,
    pub selection_messages: String,
    pub wrong_format: String,
    pub wrong_protection: String,
    pub wrong_visibility: String,
    pub wrong_print_setup: String,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            wrong_instruction: "This submission was not made from your instruction file. \
                                Download your instruction again and resubmit."
                .into(),
            structural_error: "Your submission has structural errors. Please contact the administrator.".into(),
            wrong_value: "The value in cell {cell} on sheet {sheet} is not correct.".into(),
            wrong_lookup: "The formula in cell {cell} on sheet {sheet} does not use an accepted lookup technique."
                .into(),
            selection_missing: "You don't have a dropdown in the right cell ({cell} on sheet {sheet}).".into(),
            selection_source: "The dropdown in cell {cell} on sheet {sheet} does not refer to the correct cells."
                .into(),
            selection_values: "The values referring to your dropdown in cell {cell} on sheet {sheet} are not correct."
                .into(),
            selection_messages: "The dropdown in cell {cell} on sheet {sheet} does not show the expected messages."
                .into(),
            wrong_format: "Cell {cell} on sheet {sheet} is not formatted correctly.".into(),
            wrong_protection: "The protection settings of cell {cell} on sheet {sheet} are not correct.".into(),
            wrong_visibility: "The hidden or protected parts of sheet {sheet} are not correct.".into(),
            wrong_print_setup: "The print settings of sheet {sheet} are not correct.".into(),
        }
    }
}

impl Messages {
    /// Fill in the `{cell}` and `{sheet}` placeholders.
    pub fn render(template: &str, cell: &str, sheet: &str) -> String {
        template.replace("{cell}", cell).replace("{sheet}", sheet)
    }
}

// ---------------------------------------------------------------------------
// Loading + validation
// ---------------------------------------------------------------------------

impl GradingConfig {
    pub fn from_toml(input: &str) -> Result<Self, CorrectionError> {
        let config: GradingConfig =
            toml::from_str(input).map_err(|e| CorrectionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CorrectionError> {
        match self.rules.first() {
            None => return Err(CorrectionError::Config("at least one rule is required".into())),
            Some(first) if first != FIRST_RULE => {
                return Err(CorrectionError::Config(format!(
                    "rules must start with '{FIRST_RULE}', got '{first}'"
                )))
            }
            Some(_) => {}
        }

        let mut seen = HashSet::new();
        for name in &self.rules {
            if !seen.insert(name.as_str()) {
                return Err(CorrectionError::Config(format!("rule '{name}' listed twice")));
            }
        }

        let relative = self.tolerance.relative;
        if !relative.is_finite() || !(0.0..1.0).contains(&relative) {
            return Err(CorrectionError::Config(format!(
                "tolerance.relative must be in [0, 1), got {relative}"
            )));
        }

        let spread = self.randomization.spread;
        if !spread.is_finite() || spread <= 0.0 || spread > 1.0 {
            return Err(CorrectionError::Config(format!(
                "randomization.spread must be in (0, 1], got {spread}"
            )));
        }

        self.palette.validate().map_err(CorrectionError::Config)?;
        Ok(())
    }
}
