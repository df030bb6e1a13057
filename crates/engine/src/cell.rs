use serde::{Deserialize, Serialize};

use super::formula::eval::Value;
use super::formula::parser::{self, Expr};

/// Horizontal text alignment
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    #[default]
    General,
    Left,
    Center,
    Right,
    Justify,
}

/// Fill colour as stored in the document (RGBA, 8 bits per channel).
///
/// Serialized as a hex string: `RRGGBB` or `AARRGGBB` (leading `#` optional).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xFF }
    }

    /// Build from a packed `0xRRGGBB` constant.
    pub const fn from_u32(rgb: u32) -> Self {
        Self::rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
    }

    /// Packed `0xRRGGBB`, alpha dropped.
    pub fn to_u32(self) -> u32 {
        ((self.r as u32) << 16) | ((self.g as u32) << 8) | self.b as u32
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        match hex.len() {
            6 => Some(Self { r: byte(0)?, g: byte(2)?, b: byte(4)?, a: 0xFF }),
            8 => Some(Self { a: byte(0)?, r: byte(2)?, g: byte(4)?, b: byte(6)? }),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 0xFF {
            format!("{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("{:02X}{:02X}{:02X}{:02X}", self.a, self.r, self.g, self.b)
        }
    }
}

impl TryFrom<String> for Rgba {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgba::from_hex(&value).ok_or_else(|| format!("invalid colour: {value}"))
    }
}

impl From<Rgba> for String {
    fn from(value: Rgba) -> Self {
        value.to_hex()
    }
}

/// Presentation and protection attributes of a cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CellStyle {
    pub fill: Option<Rgba>,
    /// Number-format code as written in the document ("General", "0.00%", ...)
    pub number_format: String,
    pub font_name: Option<String>,
    pub font_size: Option<f64>,
    pub alignment: Alignment,
    /// Locked when the sheet is protected. Spreadsheet default is locked.
    pub locked: bool,
    /// Formula hidden when the sheet is protected.
    pub hidden: bool,
}

impl Default for CellStyle {
    fn default() -> Self {
        Self {
            fill: None,
            number_format: GENERAL_FORMAT.to_string(),
            font_name: None,
            font_size: None,
            alignment: Alignment::General,
            locked: true,
            hidden: false,
        }
    }
}

pub const GENERAL_FORMAT: &str = "General";

impl CellStyle {
    /// True for the generic/default number format.
    pub fn has_general_format(&self) -> bool {
        let f = self.number_format.trim();
        f.is_empty() || f.eq_ignore_ascii_case(GENERAL_FORMAT) || f.eq_ignore_ascii_case("Standard")
    }
}

#[derive(Debug, Clone, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Formula { source: String, ast: Option<Expr> },
}

impl CellValue {
    pub fn from_input(input: &str) -> Self {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return CellValue::Empty;
        }

        if trimmed.starts_with('=') {
            return CellValue::formula(trimmed);
        }

        // "inf" and "nan" parse as f64 but are text in a sheet
        if let Ok(num) = trimmed.parse::<f64>() {
            if num.is_finite() {
                return CellValue::Number(num);
            }
        }

        CellValue::Text(input.to_string())
    }

    /// Formula cell; the AST is None when the source does not parse.
    pub fn formula(source: &str) -> Self {
        let source = source.trim();
        let ast = parser::parse(source).ok();
        CellValue::Formula {
            source: source.to_string(),
            ast,
        }
    }

    pub fn formula_source(&self) -> Option<&str> {
        match self {
            CellValue::Formula { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn formula_ast(&self) -> Option<&Expr> {
        match self {
            CellValue::Formula { ast, .. } => ast.as_ref(),
            _ => None,
        }
    }

    pub fn raw_display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => Value::Number(*n).to_text(),
            CellValue::Formula { source, .. } => source.clone(),
        }
    }
}

/// Storage kind of a cell, independent of any computed result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    Empty,
    Numeric,
    Text,
    Formula,
}

impl std::fmt::Display for CellKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Numeric => write!(f, "numeric"),
            Self::Text => write!(f, "text"),
            Self::Formula => write!(f, "formula"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub value: CellValue,
    /// Last computed result. Only formula cells carry one.
    pub cached: Option<Value>,
    pub style: CellStyle,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: &str) -> Self {
        Self {
            value: CellValue::from_input(input),
            ..Self::default()
        }
    }

    pub fn set(&mut self, input: &str) {
        self.value = CellValue::from_input(input);
        self.cached = None;
    }

    pub fn kind(&self) -> CellKind {
        match self.value {
            CellValue::Empty => CellKind::Empty,
            CellValue::Number(_) => CellKind::Numeric,
            CellValue::Text(_) => CellKind::Text,
            CellValue::Formula { .. } => CellKind::Formula,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self.value, CellValue::Formula { .. })
    }

    /// Current value as seen by a reader: the literal for constants, the
    /// cached result for formulas (Empty if never computed).
    pub fn current_value(&self) -> Value {
        match &self.value {
            CellValue::Empty => Value::Empty,
            CellValue::Text(s) => Value::Text(s.clone()),
            CellValue::Number(n) => Value::Number(*n),
            CellValue::Formula { .. } => self.cached.clone().unwrap_or(Value::Empty),
        }
    }
}
