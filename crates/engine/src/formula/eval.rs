// Formula evaluator - evaluates parsed expressions against a CellLookup

use super::parser::{Expr, Op};

pub trait CellLookup {
    /// Current value of a cell. `sheet` is the qualifier written in the
    /// formula (None = the sheet being evaluated). Unknown sheets yield
    /// `Value::Error("#REF!")`.
    fn get(&self, sheet: Option<&str>, row: usize, col: usize) -> Value;
}

// =============================================================================
// Value: The scalar primitive for all cell values
// =============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(String),
}

impl Value {
    pub fn error(code: &str) -> Self {
        Value::Error(code.to_string())
    }

    pub fn to_number(&self) -> Result<f64, String> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) if s.trim().is_empty() => Ok(0.0),
            Value::Text(s) => s.trim().parse::<f64>().map_err(|_| VALUE.to_string()),
            Value::Empty => Ok(0.0),
            Value::Error(e) => Err(e.clone()),
        }
    }

    pub fn to_text(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
            Value::Empty => String::new(),
            Value::Error(e) => e.clone(),
        }
    }

    pub fn to_bool(&self) -> Result<bool, String> {
        match self {
            Value::Boolean(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Text(s) => {
                let upper = s.to_uppercase();
                if upper == "TRUE" { Ok(true) }
                else if upper == "FALSE" { Ok(false) }
                else { Err(VALUE.to_string()) }
            }
            Value::Empty => Ok(false),
            Value::Error(e) => Err(e.clone()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }
}

pub(crate) const VALUE: &str = "#VALUE!";
pub(crate) const DIV0: &str = "#DIV/0!";
pub(crate) const NA: &str = "#N/A";
pub(crate) const REF: &str = "#REF!";
pub(crate) const NUM: &str = "#NUM!";
pub(crate) const NAME: &str = "#NAME?";

pub fn evaluate<L: CellLookup>(expr: &Expr, lookup: &L) -> Value {
    match expr {
        Expr::Number(n) => Value::Number(*n),
        Expr::Text(s) => Value::Text(s.clone()),
        Expr::Boolean(b) => Value::Boolean(*b),
        Expr::Empty => Value::Empty,
        Expr::CellRef { sheet, row, col } => lookup.get(sheet.as_deref(), *row, *col),
        // Ranges only make sense as function arguments
        Expr::Range { .. } => Value::error(VALUE),
        // Named ranges are not supported
        Expr::Name(_) => Value::error(NAME),
        Expr::Function { name, args } => evaluate_function(name, args, lookup),
        Expr::BinaryOp { op, left, right } => {
            let left = evaluate(left, lookup);
            let right = evaluate(right, lookup);
            binary_op(*op, &left, &right).unwrap_or_else(Value::Error)
        }
    }
}

fn binary_op(op: Op, left: &Value, right: &Value) -> Result<Value, String> {
    // Errors propagate, left first
    if let Value::Error(e) = left {
        return Err(e.clone());
    }
    if let Value::Error(e) = right {
        return Err(e.clone());
    }

    match op {
        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Pow => {
            let a = left.to_number()?;
            let b = right.to_number()?;
            let result = match op {
                Op::Add => a + b,
                Op::Sub => a - b,
                Op::Mul => a * b,
                Op::Div => {
                    if b == 0.0 {
                        return Err(DIV0.to_string());
                    }
                    a / b
                }
                _ => a.powf(b),
            };
            finite(result)
        }
        Op::Concat => Ok(Value::Text(format!("{}{}", left.to_text(), right.to_text()))),
        Op::Lt | Op::Gt | Op::Eq | Op::LtEq | Op::GtEq | Op::NotEq => {
            let ord = compare_values(left, right);
            let result = match op {
                Op::Lt => ord.is_lt(),
                Op::Gt => ord.is_gt(),
                Op::Eq => ord.is_eq(),
                Op::LtEq => ord.is_le(),
                Op::GtEq => ord.is_ge(),
                _ => ord.is_ne(),
            };
            Ok(Value::Boolean(result))
        }
    }
}

fn finite(n: f64) -> Result<Value, String> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(NUM.to_string())
    }
}

/// Spreadsheet comparison order: numbers < text < booleans. Empty compares
/// as 0 against numbers and "" against text. Text is case-insensitive.
pub(crate) fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(v: &Value) -> u8 {
        match v {
            Value::Number(_) | Value::Empty => 0,
            Value::Text(_) => 1,
            Value::Boolean(_) => 2,
            Value::Error(_) => 3,
        }
    }

    match (a, b) {
        (Value::Empty, Value::Text(t)) => "".cmp(t.to_lowercase().as_str()),
        (Value::Text(t), Value::Empty) => t.to_lowercase().as_str().cmp(""),
        (Value::Empty, Value::Boolean(x)) => false.cmp(x),
        (Value::Boolean(x), Value::Empty) => x.cmp(&false),
        _ if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
        (Value::Text(x), Value::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
        (Value::Error(x), Value::Error(y)) => x.cmp(y),
        _ => {
            let x = a.to_number().unwrap_or(0.0);
            let y = b.to_number().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
    }
}

// =============================================================================
// Argument helpers (shared with the eval_* modules)
// =============================================================================

/// Values of a range or single-cell argument as a row-major grid.
/// Returns None for any other expression.
pub(crate) fn range_grid<L: CellLookup>(expr: &Expr, lookup: &L) -> Option<Vec<Vec<Value>>> {
    match expr {
        Expr::Range { sheet, start_row, start_col, end_row, end_col } => Some(
            (*start_row..=*end_row)
                .map(|r| {
                    (*start_col..=*end_col)
                        .map(|c| lookup.get(sheet.as_deref(), r, c))
                        .collect()
                })
                .collect(),
        ),
        Expr::CellRef { sheet, row, col } => Some(vec![vec![lookup.get(sheet.as_deref(), *row, *col)]]),
        _ => None,
    }
}

/// Flattened values of an argument: every cell of a range, or the scalar.
pub(crate) fn flatten_arg<L: CellLookup>(expr: &Expr, lookup: &L) -> Vec<Value> {
    match expr {
        Expr::Range { .. } => range_grid(expr, lookup)
            .map(|grid| grid.into_iter().flatten().collect())
            .unwrap_or_default(),
        _ => vec![evaluate(expr, lookup)],
    }
}

pub(crate) fn arg_number<L: CellLookup>(args: &[Expr], idx: usize, lookup: &L) -> Result<f64, String> {
    match args.get(idx) {
        Some(expr) => evaluate(expr, lookup).to_number(),
        None => Err(VALUE.to_string()),
    }
}

pub(crate) fn arg_value<L: CellLookup>(args: &[Expr], idx: usize, lookup: &L) -> Result<Value, String> {
    match args.get(idx).map(|e| evaluate(e, lookup)) {
        Some(Value::Error(e)) => Err(e),
        Some(v) => Ok(v),
        None => Err(VALUE.to_string()),
    }
}

pub(crate) fn arg_text<L: CellLookup>(args: &[Expr], idx: usize, lookup: &L) -> Result<String, String> {
    arg_value(args, idx, lookup).map(|v| v.to_text())
}

pub(crate) fn check_arity(args: &[Expr], min: usize, max: usize) -> Result<(), String> {
    if args.len() < min || args.len() > max {
        Err(VALUE.to_string())
    } else {
        Ok(())
    }
}

/// Numbers for aggregate functions: range cells contribute only numeric
/// values; direct arguments are coerced. Errors propagate.
fn collect_numbers<L: CellLookup>(args: &[Expr], lookup: &L) -> Result<Vec<f64>, String> {
    let mut values = Vec::new();
    for arg in args {
        match arg {
            Expr::Range { .. } | Expr::CellRef { .. } => {
                for v in flatten_arg(arg, lookup) {
                    match v {
                        Value::Number(n) => values.push(n),
                        Value::Error(e) => return Err(e),
                        _ => {}
                    }
                }
            }
            Expr::Empty => {}
            _ => values.push(evaluate(arg, lookup).to_number()?),
        }
    }
    Ok(values)
}

fn evaluate_function<L: CellLookup>(name: &str, args: &[Expr], lookup: &L) -> Value {
    if let Some(result) = super::eval_lookup::try_evaluate(name, args, lookup) {
        return result;
    }
    if let Some(result) = super::eval_datetime::try_evaluate(name, args, lookup) {
        return result;
    }
    call(name, args, lookup).unwrap_or_else(Value::Error)
}

fn call<L: CellLookup>(name: &str, args: &[Expr], lookup: &L) -> Result<Value, String> {
    match name {
        // =====================
        // MATH FUNCTIONS
        // =====================
        "SUM" => Ok(Value::Number(collect_numbers(args, lookup)?.iter().sum())),
        "PRODUCT" => Ok(Value::Number(collect_numbers(args, lookup)?.iter().product())),
        "AVERAGE" => {
            let vals = collect_numbers(args, lookup)?;
            if vals.is_empty() {
                return Err(DIV0.to_string());
            }
            Ok(Value::Number(vals.iter().sum::<f64>() / vals.len() as f64))
        }
        "MIN" => {
            let vals = collect_numbers(args, lookup)?;
            Ok(Value::Number(if vals.is_empty() { 0.0 } else { vals.iter().cloned().fold(f64::INFINITY, f64::min) }))
        }
        "MAX" => {
            let vals = collect_numbers(args, lookup)?;
            Ok(Value::Number(if vals.is_empty() { 0.0 } else { vals.iter().cloned().fold(f64::NEG_INFINITY, f64::max) }))
        }
        "COUNT" => {
            let count = args
                .iter()
                .flat_map(|a| flatten_arg(a, lookup))
                .filter(|v| matches!(v, Value::Number(_)))
                .count();
            Ok(Value::Number(count as f64))
        }
        "COUNTA" => {
            let count = args
                .iter()
                .filter(|a| !matches!(a, Expr::Empty))
                .flat_map(|a| flatten_arg(a, lookup))
                .filter(|v| !v.is_empty())
                .count();
            Ok(Value::Number(count as f64))
        }
        "ABS" => {
            check_arity(args, 1, 1)?;
            Ok(Value::Number(arg_number(args, 0, lookup)?.abs()))
        }
        "ROUND" | "ROUNDUP" | "ROUNDDOWN" => {
            check_arity(args, 1, 2)?;
            let value = arg_number(args, 0, lookup)?;
            let digits = if args.len() == 2 { arg_number(args, 1, lookup)?.trunc().clamp(-308.0, 308.0) as i32 } else { 0 };
            let factor = 10_f64.powi(digits.abs());
            let scaled = if digits >= 0 { value * factor } else { value / factor };
            // Drop binary representation noise (2.345 * 100 = 234.49999999999997)
            let scaled = format!("{:.14e}", scaled).parse::<f64>().unwrap_or(scaled);
            let rounded = match name {
                "ROUND" => scaled.round(),
                // Away from zero
                "ROUNDUP" => scaled.abs().ceil().copysign(scaled),
                _ => scaled.trunc(),
            };
            finite(if digits >= 0 { rounded / factor } else { rounded * factor })
        }
        "INT" => {
            check_arity(args, 1, 1)?;
            Ok(Value::Number(arg_number(args, 0, lookup)?.floor()))
        }
        "MOD" => {
            check_arity(args, 2, 2)?;
            let number = arg_number(args, 0, lookup)?;
            let divisor = arg_number(args, 1, lookup)?;
            if divisor == 0.0 {
                return Err(DIV0.to_string());
            }
            // Result takes the sign of the divisor
            Ok(Value::Number(number - divisor * (number / divisor).floor()))
        }
        "POWER" => {
            check_arity(args, 2, 2)?;
            finite(arg_number(args, 0, lookup)?.powf(arg_number(args, 1, lookup)?))
        }
        "SQRT" => {
            check_arity(args, 1, 1)?;
            let n = arg_number(args, 0, lookup)?;
            if n < 0.0 {
                return Err(NUM.to_string());
            }
            Ok(Value::Number(n.sqrt()))
        }
        "SUMIF" => {
            check_arity(args, 2, 3)?;
            let criteria = arg_value(args, 1, lookup)?;
            let range = range_grid(&args[0], lookup).ok_or_else(|| VALUE.to_string())?;
            let sum_range = match args.get(2) {
                Some(expr) => range_grid(expr, lookup).ok_or_else(|| VALUE.to_string())?,
                None => range.clone(),
            };
            let mut total = 0.0;
            for (r, row) in range.iter().enumerate() {
                for (c, v) in row.iter().enumerate() {
                    if matches_criteria(v, &criteria) {
                        if let Some(Value::Number(n)) = sum_range.get(r).and_then(|row| row.get(c)) {
                            total += n;
                        }
                    }
                }
            }
            Ok(Value::Number(total))
        }
        "COUNTIF" => {
            check_arity(args, 2, 2)?;
            let criteria = arg_value(args, 1, lookup)?;
            let count = flatten_arg(&args[0], lookup)
                .iter()
                .filter(|v| matches_criteria(v, &criteria))
                .count();
            Ok(Value::Number(count as f64))
        }

        // =====================
        // LOGICAL FUNCTIONS
        // =====================
        "IF" => {
            check_arity(args, 1, 3)?;
            let condition = arg_value(args, 0, lookup)?.to_bool()?;
            let branch = if condition { args.get(1) } else { args.get(2) };
            match branch {
                // Omitted else-branch is FALSE; an empty slot is 0
                None => Ok(Value::Boolean(condition)),
                Some(Expr::Empty) => Ok(Value::Number(0.0)),
                Some(expr) => Ok(evaluate(expr, lookup)),
            }
        }
        "IFERROR" => {
            check_arity(args, 2, 2)?;
            match evaluate(&args[0], lookup) {
                Value::Error(_) => Ok(evaluate(&args[1], lookup)),
                v => Ok(v),
            }
        }
        "AND" | "OR" => {
            let mut seen = false;
            let mut acc = name == "AND";
            for v in args.iter().flat_map(|a| flatten_arg(a, lookup)) {
                let b = match v {
                    Value::Error(e) => return Err(e),
                    Value::Empty => continue,
                    Value::Text(_) => continue,
                    other => other.to_bool()?,
                };
                seen = true;
                acc = if name == "AND" { acc && b } else { acc || b };
            }
            if !seen {
                return Err(VALUE.to_string());
            }
            Ok(Value::Boolean(acc))
        }
        "NOT" => {
            check_arity(args, 1, 1)?;
            Ok(Value::Boolean(!arg_value(args, 0, lookup)?.to_bool()?))
        }

        // =====================
        // TEXT FUNCTIONS
        // =====================
        "CONCATENATE" | "CONCAT" => {
            let mut out = String::new();
            for v in args.iter().flat_map(|a| flatten_arg(a, lookup)) {
                if let Value::Error(e) = v {
                    return Err(e);
                }
                out.push_str(&v.to_text());
            }
            Ok(Value::Text(out))
        }
        "LEFT" | "RIGHT" => {
            check_arity(args, 1, 2)?;
            let text = arg_text(args, 0, lookup)?;
            let n = if args.len() == 2 { arg_number(args, 1, lookup)? } else { 1.0 };
            if n < 0.0 {
                return Err(VALUE.to_string());
            }
            let n = n as usize;
            let chars: Vec<char> = text.chars().collect();
            let out: String = if name == "LEFT" {
                chars.iter().take(n).collect()
            } else {
                chars[chars.len().saturating_sub(n)..].iter().collect()
            };
            Ok(Value::Text(out))
        }
        "MID" => {
            check_arity(args, 3, 3)?;
            let text = arg_text(args, 0, lookup)?;
            let start = arg_number(args, 1, lookup)?;
            let len = arg_number(args, 2, lookup)?;
            if start < 1.0 || len < 0.0 {
                return Err(VALUE.to_string());
            }
            Ok(Value::Text(text.chars().skip(start as usize - 1).take(len as usize).collect()))
        }
        "LEN" => {
            check_arity(args, 1, 1)?;
            Ok(Value::Number(arg_text(args, 0, lookup)?.chars().count() as f64))
        }
        "UPPER" => {
            check_arity(args, 1, 1)?;
            Ok(Value::Text(arg_text(args, 0, lookup)?.to_uppercase()))
        }
        "LOWER" => {
            check_arity(args, 1, 1)?;
            Ok(Value::Text(arg_text(args, 0, lookup)?.to_lowercase()))
        }
        "TRIM" => {
            check_arity(args, 1, 1)?;
            let text = arg_text(args, 0, lookup)?;
            Ok(Value::Text(text.split_whitespace().collect::<Vec<_>>().join(" ")))
        }

        _ => Err(NAME.to_string()),
    }
}

/// Check if a value matches a SUMIF/COUNTIF criterion (">=10", "<>x", "abc", 5).
pub(crate) fn matches_criteria(value: &Value, criteria: &Value) -> bool {
    let criteria_str = criteria.to_text();

    let (op, operand) = if let Some(rest) = criteria_str.strip_prefix(">=") {
        (Op::GtEq, rest)
    } else if let Some(rest) = criteria_str.strip_prefix("<=") {
        (Op::LtEq, rest)
    } else if let Some(rest) = criteria_str.strip_prefix("<>") {
        (Op::NotEq, rest)
    } else if let Some(rest) = criteria_str.strip_prefix('>') {
        (Op::Gt, rest)
    } else if let Some(rest) = criteria_str.strip_prefix('<') {
        (Op::Lt, rest)
    } else if let Some(rest) = criteria_str.strip_prefix('=') {
        (Op::Eq, rest)
    } else {
        // Plain criterion: equality against the criterion as given
        return match (value, criteria) {
            (Value::Number(v), Value::Number(c)) => v == c,
            (Value::Number(v), Value::Text(c)) => c.trim().parse::<f64>().map(|c| *v == c).unwrap_or(false),
            _ => !value.is_empty() && value.to_text().to_lowercase() == criteria_str.to_lowercase(),
        };
    };

    let operand = operand.trim();
    let target = match operand.parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => Value::Text(operand.to_string()),
    };
    // Numeric criteria only match numeric cells
    if matches!(target, Value::Number(_)) && !matches!(value, Value::Number(_)) {
        return op == Op::NotEq;
    }
    matches!(binary_op(op, value, &target), Ok(Value::Boolean(true)))
}
