use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionError {
    /// A document lacks a sheet the comparison needs.
    MissingSheet { document: &'static str, sheet: String },
    /// A document lacks a cell the comparison needs.
    MissingCell { document: &'static str, cell: String },
    /// A formula could not be rewritten or evaluated.
    Formula { cell: String, message: String },
    /// A selection constraint could not be resolved.
    Selection { cell: String, message: String },
    /// TOML parse / validation error.
    Config(String),
    /// A configured rule name has no implementation.
    UnknownRule(String),
    /// A rule failed in a way it did not anticipate (panic, broken invariant).
    Internal(String),
}

impl CorrectionError {
    /// Stable short identifier for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingSheet { .. } => "missing_sheet",
            Self::MissingCell { .. } => "missing_cell",
            Self::Formula { .. } => "formula",
            Self::Selection { .. } => "selection",
            Self::Config(_) => "config",
            Self::UnknownRule(_) => "unknown_rule",
            Self::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for CorrectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSheet { document, sheet } => write!(f, "{document}: missing sheet {sheet}"),
            Self::MissingCell { document, cell } => write!(f, "{document}: missing cell {cell}"),
            Self::Formula { cell, message } => write!(f, "formula error in {cell}: {message}"),
            Self::Selection { cell, message } => write!(f, "selection error in {cell}: {message}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::UnknownRule(name) => write!(f, "unknown rule: {name}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for CorrectionError {}
