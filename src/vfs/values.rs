//! `VALUES (...), (...)` literal rows (spec.md 4.2 "Table sources").
//!
//! Row cells arrive as constant-folded [`Node`] trees from the parser. This
//! backend only needs to turn those into text once at open time, so it
//! carries a small local constant evaluator rather than depending on the
//! full expression evaluator in `eval.rs` (kept out of `vfs` entirely, see
//! `vfs::mod`'s note on `accelerated_scan`).

use crate::error::{EngineError, Result};
use crate::expr::{Function, Node};
use crate::value::Value;
use crate::vfs::VfsTable;

pub struct ValuesTable {
    rows: Vec<Vec<String>>,
    field_count: usize,
}

impl ValuesTable {
    pub fn new(rows: Vec<Vec<Node>>) -> Self {
        let field_count = rows.first().map(|r| r.len()).unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(|n| literal_text(&n).unwrap_or_default()).collect())
            .collect();
        ValuesTable { rows, field_count }
    }
}

/// Folds a literal-only expression tree down to its text form. VALUES rows
/// are constants by grammar (spec.md 4.4), so this only needs to cover
/// numeric literals, string literals, unary minus, and basic arithmetic —
/// not the full function surface `eval.rs` handles for query predicates.
fn literal_text(node: &Node) -> Result<String> {
    Ok(literal_value(node)?.text())
}

fn literal_value(node: &Node) -> Result<Value> {
    match node {
        Node::Leaf(f) => Ok(Value::str(f.text.clone())),
        Node::Unary { func: Function::Neg, arg, .. } => {
            let v = literal_value(arg)?;
            let text = v.text();
            match (Value::parse_int(&text), Value::parse_float(&text)) {
                (Some(i), _) => Ok(Value::Int(-i)),
                (None, Some(f)) => Ok(Value::Float(-f)),
                _ => Err(EngineError::runtime("cannot negate non-numeric VALUES literal")),
            }
        }
        Node::Unary { func: Function::Parens, arg, .. } => literal_value(arg),
        Node::Call { func: Function::Parens, args, .. } if args.len() == 1 => literal_value(&args[0]),
        Node::Call { func, args, .. } if args.len() == 2 => {
            let a = literal_value(&args[0])?;
            let b = literal_value(&args[1])?;
            arithmetic(*func, a, b)
        }
        _ => Err(EngineError::runtime("VALUES row cell is not a constant expression")),
    }
}

fn arithmetic(func: Function, a: Value, b: Value) -> Result<Value> {
    let (at, bt) = (a.text(), b.text());
    let (af, bf) = (Value::parse_float(&at), Value::parse_float(&bt));
    let both_int = Value::parse_int(&at).is_some() && Value::parse_int(&bt).is_some();
    match (func, af, bf) {
        (Function::Concat, _, _) => Ok(Value::str(format!("{at}{bt}"))),
        (Function::Add, Some(x), Some(y)) => Ok(numeric_result(x + y, both_int)),
        (Function::Sub, Some(x), Some(y)) => Ok(numeric_result(x - y, both_int)),
        (Function::Mul, Some(x), Some(y)) => Ok(numeric_result(x * y, both_int)),
        (Function::Div, Some(x), Some(y)) => Ok(Value::Float(x / y)),
        _ => Err(EngineError::runtime("unsupported VALUES literal expression")),
    }
}

fn numeric_result(v: f64, keep_int: bool) -> Value {
    if keep_int && v.fract() == 0.0 {
        Value::Int(v as i64)
    } else {
        Value::Float(v)
    }
}

impl VfsTable for ValuesTable {
    fn record_count(&mut self) -> Result<usize> {
        Ok(self.rows.len())
    }

    fn field_count(&self) -> usize {
        self.field_count
    }

    fn field_name(&self, i: usize) -> Option<&str> {
        (i < self.field_count).then(|| COLUMN_NAMES[i.min(COLUMN_NAMES.len() - 1)])
    }

    fn get_cell(&mut self, row: usize, col: usize) -> Result<String> {
        Ok(self.rows.get(row).and_then(|r| r.get(col)).cloned().unwrap_or_default())
    }
}

/// `column1`, `column2`, ... default aliases for unaliased VALUES columns
/// (spec.md: anonymous row sources still need addressable names).
const COLUMN_NAMES: [&str; 16] = [
    "column1", "column2", "column3", "column4", "column5", "column6", "column7", "column8", "column9", "column10",
    "column11", "column12", "column13", "column14", "column15", "column16",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Field;

    #[test]
    fn literal_rows_materialize() {
        let rows = vec![vec![Node::constant(Value::Int(1)), Node::constant(Value::str("a"))]];
        let mut t = ValuesTable::new(rows);
        assert_eq!(t.field_count(), 2);
        assert_eq!(t.get_cell(0, 0).unwrap(), "1");
        assert_eq!(t.get_cell(0, 1).unwrap(), "a");
        assert_eq!(t.field_name(0), Some("column1"));
    }

    #[test]
    fn unary_minus_folds() {
        let rows = vec![vec![Node::unary(Function::Neg, Node::constant(Value::Int(5)))]];
        let mut t = ValuesTable::new(rows);
        assert_eq!(t.get_cell(0, 0).unwrap(), "-5");
        let _ = Field::constant(Value::Null);
    }
}
