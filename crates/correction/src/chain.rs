//! Ordered, fail-fast rule execution.
//!
//! The chain never lets a rule failure escape: an `Err` or a panic inside a
//! rule becomes the structural-error verdict, and the rule name plus error
//! kind go to the log.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;

use crate::error::CorrectionError;
use crate::rule::{GradingContext, Rule};
use crate::verdict::Verdict;

/// Verdict plus which rules ran and which one stopped the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub verdict: Verdict,
    pub rules_run: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_rule: Option<String>,
    /// Error kind when the chain stopped on a structural error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

pub struct RuleChain {
    rules: Vec<Box<dyn Rule>>,
    structural_message: String,
}

impl RuleChain {
    pub fn new(rules: Vec<Box<dyn Rule>>, structural_message: impl Into<String>) -> Self {
        Self { rules, structural_message: structural_message.into() }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule in order and stop at the first failure.
    pub fn evaluate(&self, ctx: &mut GradingContext) -> Verdict {
        self.evaluate_detailed(ctx).verdict
    }

    pub fn evaluate_detailed(&self, ctx: &mut GradingContext) -> ChainReport {
        let mut rules_run = Vec::with_capacity(self.rules.len());

        for rule in &self.rules {
            let name = rule.name().to_string();
            rules_run.push(name.clone());
            if !rule.effects().is_read_only() {
                log::debug!("rule '{name}' mutates documents ({})", rule.effects());
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| rule.check(ctx)))
                .unwrap_or_else(|payload| Err(CorrectionError::Internal(panic_message(payload.as_ref()))));

            match outcome {
                Ok(verdict) if verdict.passed => {
                    log::debug!("rule '{name}' passed");
                }
                Ok(verdict) => {
                    log::info!("rule '{name}' failed: {}", verdict.reason.as_deref().unwrap_or(""));
                    return ChainReport { verdict, rules_run, failed_rule: Some(name), error_kind: None };
                }
                Err(err) => {
                    log::error!("rule '{name}' aborted [{}]: {err}", err.kind());
                    return ChainReport {
                        verdict: Verdict::fail(self.structural_message.clone()),
                        rules_run,
                        failed_rule: Some(name),
                        error_kind: Some(err.kind().to_string()),
                    };
                }
            }
        }

        log::info!("all {} rules passed", self.rules.len());
        ChainReport { verdict: Verdict::pass(), rules_run, failed_rule: None, error_kind: None }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic".to_string()
    }
}
