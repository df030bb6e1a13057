// Reference extraction - which cells a parsed formula reads

use super::parser::Expr;
use crate::cell_id::RangeRef;

/// Every cell or range reference in the expression, in source order.
/// Single cells come back as 1x1 ranges.
pub fn references(expr: &Expr) -> Vec<RangeRef> {
    let mut out = Vec::new();
    collect(expr, &mut out);
    out
}

fn collect(expr: &Expr, out: &mut Vec<RangeRef>) {
    match expr {
        Expr::CellRef { sheet, row, col } => {
            out.push(RangeRef::new(sheet.clone(), *row, *col, *row, *col));
        }
        Expr::Range { sheet, start_row, start_col, end_row, end_col } => {
            out.push(RangeRef::new(sheet.clone(), *start_row, *start_col, *end_row, *end_col));
        }
        Expr::Function { args, .. } => {
            for arg in args {
                collect(arg, out);
            }
        }
        Expr::BinaryOp { left, right, .. } => {
            collect(left, out);
            collect(right, out);
        }
        Expr::Number(_) | Expr::Text(_) | Expr::Boolean(_) | Expr::Name(_) | Expr::Empty => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parser::parse;

    #[test]
    fn test_collects_nested_references() {
        let expr = parse("=IF(A1>0,SUM(Data!B1:B3),C2*2)").unwrap();
        let refs = references(&expr);
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0], RangeRef::new(None, 0, 0, 0, 0));
        assert_eq!(refs[1], RangeRef::new(Some("Data".into()), 0, 1, 2, 1));
        assert_eq!(refs[2], RangeRef::new(None, 1, 2, 1, 2));
    }

    #[test]
    fn test_no_references() {
        assert!(references(&parse("=1+2").unwrap()).is_empty());
    }
}
