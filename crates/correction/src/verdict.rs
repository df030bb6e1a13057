use serde::Serialize;

/// Outcome of a rule or of a whole grading pass.
///
/// A failing verdict always carries a reason; a passing one normally has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn pass() -> Self {
        Self { passed: true, reason: None }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self { passed: false, reason: Some(reason.into()) }
    }

    pub fn is_pass(&self) -> bool {
        self.passed
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.passed, &self.reason) {
            (true, _) => write!(f, "passed"),
            (false, Some(reason)) => write!(f, "failed: {reason}"),
            (false, None) => write!(f, "failed"),
        }
    }
}
