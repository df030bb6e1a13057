// Lookup/reference functions: VLOOKUP, HLOOKUP, LOOKUP, INDEX, MATCH

use std::cmp::Ordering;

use super::eval::{
    arg_number, arg_value, check_arity, compare_values, evaluate, range_grid, CellLookup, Value, NA, REF, VALUE,
};
use super::parser::Expr;

/// How a key is matched against a lookup vector.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MatchMode {
    Exact,
    /// Largest value <= key, vector sorted ascending
    LessOrEqual,
    /// Smallest value >= key, vector sorted descending
    GreaterOrEqual,
}

pub(crate) fn try_evaluate<L: CellLookup>(name: &str, args: &[Expr], lookup: &L) -> Option<Value> {
    let result = match name {
        "VLOOKUP" | "HLOOKUP" => table_lookup(name == "VLOOKUP", args, lookup),
        "LOOKUP" => vector_lookup(args, lookup),
        "MATCH" => match_position(args, lookup),
        "INDEX" => index(args, lookup),
        _ => return None,
    };
    Some(result.unwrap_or_else(Value::Error))
}

// VLOOKUP(key, table, index, [approximate=TRUE]) / HLOOKUP(...)
fn table_lookup<L: CellLookup>(vertical: bool, args: &[Expr], lookup: &L) -> Result<Value, String> {
    check_arity(args, 3, 4)?;
    let key = arg_value(args, 0, lookup)?;
    let grid = range_grid(&args[1], lookup).ok_or_else(|| VALUE.to_string())?;
    let index = arg_number(args, 2, lookup)?;
    if index < 1.0 {
        return Err(VALUE.to_string());
    }
    let index = index as usize - 1;
    let mode = match args.get(3) {
        None | Some(Expr::Empty) => MatchMode::LessOrEqual,
        Some(expr) => {
            if evaluate(expr, lookup).to_bool()? {
                MatchMode::LessOrEqual
            } else {
                MatchMode::Exact
            }
        }
    };

    let rows = grid.len();
    let cols = grid.first().map_or(0, |r| r.len());
    let (keys, width): (Vec<Value>, usize) = if vertical {
        (grid.iter().map(|r| r[0].clone()).collect(), cols)
    } else {
        (grid.first().cloned().unwrap_or_default(), rows)
    };
    if index >= width {
        return Err(REF.to_string());
    }

    let pos = find_position(&key, &keys, mode).ok_or_else(|| NA.to_string())?;
    let value = if vertical { &grid[pos][index] } else { &grid[index][pos] };
    Ok(value.clone())
}

// LOOKUP(key, lookup_vector, [result_vector])
fn vector_lookup<L: CellLookup>(args: &[Expr], lookup: &L) -> Result<Value, String> {
    check_arity(args, 2, 3)?;
    let key = arg_value(args, 0, lookup)?;
    let keys = vector(&args[1], lookup)?;
    let results = match args.get(2) {
        Some(expr) => vector(expr, lookup)?,
        None => keys.clone(),
    };
    let pos = find_position(&key, &keys, MatchMode::LessOrEqual).ok_or_else(|| NA.to_string())?;
    results.get(pos).cloned().ok_or_else(|| NA.to_string())
}

// MATCH(key, vector, [type=1]) - 1-based position
fn match_position<L: CellLookup>(args: &[Expr], lookup: &L) -> Result<Value, String> {
    check_arity(args, 2, 3)?;
    let key = arg_value(args, 0, lookup)?;
    let items = vector(&args[1], lookup)?;
    let match_type = match args.get(2) {
        None | Some(Expr::Empty) => 1.0,
        Some(_) => arg_number(args, 2, lookup)?,
    };
    let mode = if match_type == 0.0 {
        MatchMode::Exact
    } else if match_type > 0.0 {
        MatchMode::LessOrEqual
    } else {
        MatchMode::GreaterOrEqual
    };
    let pos = find_position(&key, &items, mode).ok_or_else(|| NA.to_string())?;
    Ok(Value::Number((pos + 1) as f64))
}

// INDEX(range, row, [col]) - a single-row range takes its one index as the column
fn index<L: CellLookup>(args: &[Expr], lookup: &L) -> Result<Value, String> {
    check_arity(args, 2, 3)?;
    let grid = range_grid(&args[0], lookup).ok_or_else(|| VALUE.to_string())?;
    let row = arg_number(args, 1, lookup)?;
    let col = match args.get(2) {
        None | Some(Expr::Empty) => None,
        Some(_) => Some(arg_number(args, 2, lookup)?),
    };
    if row < 0.0 || col.is_some_and(|c| c < 0.0) {
        return Err(VALUE.to_string());
    }

    let (row, col) = match col {
        Some(c) => (row as usize, c as usize),
        None if grid.len() == 1 => (1, row as usize),
        None => (row as usize, 1),
    };
    if row == 0 || col == 0 {
        return Err(REF.to_string());
    }
    grid.get(row - 1)
        .and_then(|r| r.get(col - 1))
        .cloned()
        .ok_or_else(|| REF.to_string())
}

/// A one-dimensional argument (row or column range) flattened.
fn vector<L: CellLookup>(expr: &Expr, lookup: &L) -> Result<Vec<Value>, String> {
    let grid = range_grid(expr, lookup).ok_or_else(|| VALUE.to_string())?;
    if grid.len() == 1 {
        return Ok(grid.into_iter().flatten().collect());
    }
    // Multi-row: use the first column
    Ok(grid.into_iter().filter_map(|r| r.into_iter().next()).collect())
}

fn same_kind(a: &Value, b: &Value) -> bool {
    matches!(
        (a, b),
        (Value::Number(_), Value::Number(_))
            | (Value::Text(_), Value::Text(_))
            | (Value::Boolean(_), Value::Boolean(_))
    )
}

fn find_position(key: &Value, items: &[Value], mode: MatchMode) -> Option<usize> {
    match mode {
        MatchMode::Exact => items
            .iter()
            .position(|v| same_kind(key, v) && compare_values(v, key) == Ordering::Equal),
        MatchMode::LessOrEqual => {
            let mut best = None;
            for (i, v) in items.iter().enumerate() {
                if !same_kind(key, v) {
                    continue;
                }
                match compare_values(v, key) {
                    Ordering::Greater => break,
                    _ => best = Some(i),
                }
            }
            best
        }
        MatchMode::GreaterOrEqual => {
            let mut best = None;
            for (i, v) in items.iter().enumerate() {
                if !same_kind(key, v) {
                    continue;
                }
                match compare_values(v, key) {
                    Ordering::Less => break,
                    _ => best = Some(i),
                }
            }
            best
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::eval::{evaluate, CellLookup, Value, NA, REF};
    use super::super::parser::parse;

    /// Grid:  A        B     C
    ///   1   "Low"     10    100
    ///   2   "Medium"  20    200
    ///   3   "High"    30    300
    /// Column E holds ascending thresholds 0, 50, 100 with labels in F.
    struct Grid;

    impl CellLookup for Grid {
        fn get(&self, sheet: Option<&str>, row: usize, col: usize) -> Value {
            if sheet.is_some() {
                return Value::error(REF);
            }
            match (row, col) {
                (0, 0) => Value::Text("Low".into()),
                (1, 0) => Value::Text("Medium".into()),
                (2, 0) => Value::Text("High".into()),
                (r, 1) if r < 3 => Value::Number(10.0 * (r + 1) as f64),
                (r, 2) if r < 3 => Value::Number(100.0 * (r + 1) as f64),
                (r, 4) if r < 3 => Value::Number(50.0 * r as f64),
                (0, 5) => Value::Text("F".into()),
                (1, 5) => Value::Text("C".into()),
                (2, 5) => Value::Text("A".into()),
                _ => Value::Empty,
            }
        }
    }

    fn eval(formula: &str) -> Value {
        evaluate(&parse(formula).unwrap(), &Grid)
    }

    #[test]
    fn test_vlookup_exact() {
        assert_eq!(eval("=VLOOKUP(\"medium\",A1:C3,3,FALSE)"), Value::Number(200.0));
        assert_eq!(eval("=VLOOKUP(\"High\";A1:C3;2;0)"), Value::Number(30.0));
        assert_eq!(eval("=VLOOKUP(\"None\",A1:C3,2,0)"), Value::error(NA));
        assert_eq!(eval("=VLOOKUP(\"Low\",A1:C3,4,0)"), Value::error(REF));
    }

    #[test]
    fn test_vlookup_approximate_default() {
        assert_eq!(eval("=VLOOKUP(75,E1:F3,2)"), Value::Text("C".into()));
        assert_eq!(eval("=VLOOKUP(100,E1:F3,2,TRUE)"), Value::Text("A".into()));
        assert_eq!(eval("=VLOOKUP(-1,E1:F3,2)"), Value::error(NA));
    }

    #[test]
    fn test_hlookup() {
        // First row B1:C1 = 10, 100
        assert_eq!(eval("=HLOOKUP(100,B1:C3,3,FALSE)"), Value::Number(300.0));
        assert_eq!(eval("=HLOOKUP(50,B1:C3,2)"), Value::Number(20.0));
    }

    #[test]
    fn test_lookup_vector() {
        assert_eq!(eval("=LOOKUP(60,E1:E3,F1:F3)"), Value::Text("C".into()));
        assert_eq!(eval("=LOOKUP(0,E1:E3)"), Value::Number(0.0));
    }

    #[test]
    fn test_match_and_index() {
        assert_eq!(eval("=MATCH(\"High\",A1:A3,0)"), Value::Number(3.0));
        assert_eq!(eval("=MATCH(25,B1:B3)"), Value::Number(2.0));
        assert_eq!(eval("=INDEX(C1:C3,2)"), Value::Number(200.0));
        assert_eq!(eval("=INDEX(A1:C3,3,2)"), Value::Number(30.0));
        assert_eq!(eval("=INDEX(A1:C1,3)"), Value::Number(100.0));
        assert_eq!(eval("=INDEX(A1:C3,MATCH(\"Medium\",A1:A3,0),3)"), Value::Number(200.0));
        assert_eq!(eval("=INDEX(A1:C3,4,1)"), Value::error(REF));
    }
}
