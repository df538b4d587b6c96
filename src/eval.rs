//! Node evaluator (C7). `evaluate(node, ctx) -> text` walks the expression
//! tree the way `original_source/src/evaluate/evaluate.c` does, with
//! `predicates.c`'s `evaluateExpression` comparison rules (date-aware,
//! then numeric, then bytewise; `"NULL"` the literal string equated with
//! emptiness) reproduced in `eval_comparison`. Aggregate evaluation walks
//! a whole row list rather than a single row, matching spec.md 4.7's
//! "aggregate functions are evaluated over a group row list".

use crate::datetime::DateTime;
use crate::error::{EngineError, Result};
use crate::expr::{ColumnIndex, DatePart, Field, Function, Node};
use crate::rowlist::{RowListHandle, RowListPool, ROWID_NULL};
use crate::value::{compare_text, Value};
use crate::vfs::OpenTable;

/// Where `evaluate` should pull field values from: a single joined row (the
/// common case, one rowid per table), or an entire row list treated as one
/// aggregate bucket (spec.md 3 "group").
#[derive(Clone, Copy)]
pub enum RowSource<'p> {
    Row(&'p [i64]),
    Group { pool: &'p RowListPool, handle: RowListHandle },
}

impl<'p> RowSource<'p> {
    fn first_row(&self) -> Option<&'p [i64]> {
        match self {
            RowSource::Row(r) => Some(r),
            RowSource::Group { pool, handle } => {
                if pool.is_empty(*handle) {
                    None
                } else {
                    Some(pool.row(*handle, 0))
                }
            }
        }
    }
}

/// Per-query evaluation context: the open tables (mutable, `get_cell`
/// backends may lazily build caches), the row source, and the ambient
/// values ROW_NUMBER/TODAY/NOW/CLOCK depend on.
pub struct EvalContext<'t, 'p> {
    pub tables: &'t mut [OpenTable],
    pub rows: RowSource<'p>,
    pub row_number: i64,
    pub now: DateTime,
    pub now_seconds: i64,
}

impl<'t, 'p> EvalContext<'t, 'p> {
    pub fn for_row(tables: &'t mut [OpenTable], row: &'p [i64], now: DateTime, now_seconds: i64) -> Self {
        EvalContext { tables, rows: RowSource::Row(row), row_number: 0, now, now_seconds }
    }

    pub fn for_group(
        tables: &'t mut [OpenTable],
        pool: &'p RowListPool,
        handle: RowListHandle,
        now: DateTime,
        now_seconds: i64,
    ) -> Self {
        EvalContext { tables, rows: RowSource::Group { pool, handle }, row_number: 0, now, now_seconds }
    }

    fn cell(&mut self, table_id: usize, col: usize, row: &[i64]) -> Result<Value> {
        let rowid = row[table_id];
        if rowid == ROWID_NULL {
            return Ok(Value::Null);
        }
        let text = self.tables[table_id].table.get_cell(rowid as usize, col)?;
        Ok(Value::str(text))
    }
}

/// Evaluates `node` against a single joined row, returning its text value
/// (spec.md 4.7: "evaluate(node, ...) -> text").
pub fn evaluate(node: &Node, ctx: &mut EvalContext) -> Result<Value> {
    match node {
        Node::Leaf(f) => eval_field(f, ctx),
        Node::Unary { func, arg, filter, .. } => eval_call(*func, std::slice::from_ref(arg.as_ref()), filter.as_deref(), ctx),
        Node::Call { func, args, filter, .. } => eval_call(*func, args, filter.as_deref(), ctx),
    }
}

/// Evaluates a predicate node to a boolean, short-circuiting AND/OR as
/// spec.md 4.7 requires (`evaluateOperatorNode` in the original).
pub fn evaluate_bool(node: &Node, ctx: &mut EvalContext) -> Result<bool> {
    if let Node::Call { func: Function::And, args, .. } = node {
        for a in args {
            if !evaluate_bool(a, ctx)? {
                return Ok(false);
            }
        }
        return Ok(true);
    }
    if let Node::Call { func: Function::Or, args, .. } = node {
        for a in args {
            if evaluate_bool(a, ctx)? {
                return Ok(true);
            }
        }
        return Ok(false);
    }
    Ok(evaluate(node, ctx)?.as_bool())
}

fn eval_field(f: &Field, ctx: &mut EvalContext) -> Result<Value> {
    match f.index {
        ColumnIndex::Constant => Ok(constant_value(&f.text)),
        ColumnIndex::Column(c) => {
            let row = ctx.rows.first_row().map(<[i64]>::to_vec);
            match row {
                Some(row) => ctx.cell(f.table_id, c, &row),
                None => Ok(Value::Null),
            }
        }
        ColumnIndex::RowIndex => {
            let row = ctx.rows.first_row();
            match row {
                Some(row) => Ok(Value::Int(row[f.table_id])),
                None => Ok(Value::Null),
            }
        }
        ColumnIndex::RowNumber => Ok(Value::Int(ctx.row_number)),
        ColumnIndex::CountStar => match &ctx.rows {
            RowSource::Group { pool, handle } => Ok(Value::Int(pool.len(*handle) as i64)),
            RowSource::Row(_) => Ok(Value::Int(1)),
        },
        ColumnIndex::Star | ColumnIndex::Unknown => {
            Err(EngineError::runtime(format!("internal: unresolved field '{}'", f.text)))
        }
    }
}

/// A literal's text was stashed verbatim by the parser/constant-folder;
/// re-derive the best-fitting `Value` kind so arithmetic sees a number
/// rather than a string when that's what it is.
fn constant_value(text: &str) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    if let Some(i) = Value::parse_int(text) {
        return Value::Int(i);
    }
    if let Some(f) = Value::parse_float(text) {
        if text.chars().any(|c| c == '.') {
            return Value::Float(f);
        }
    }
    Value::str(text.to_string())
}

fn eval_call(func: Function, args: &[Node], filter: Option<&Node>, ctx: &mut EvalContext) -> Result<Value> {
    if func.is_aggregate() {
        return eval_aggregate(func, args, filter, ctx);
    }
    match func {
        Function::Unity => unreachable!("Unity is represented as Node::Leaf"),
        Function::Parens => eval_parens_or_case(args, ctx),
        Function::And => {
            for a in args {
                if !evaluate_bool(a, ctx)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        Function::Or => {
            for a in args {
                if evaluate_bool(a, ctx)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        Function::Not => Ok(Value::Bool(!evaluate(&args[0], ctx)?.as_bool())),
        Function::Neg => eval_neg(&args[0], ctx),
        Function::Add | Function::Sub | Function::Mul | Function::Div | Function::Mod | Function::Pow => {
            eval_arithmetic(func, &args[0], &args[1], ctx)
        }
        Function::Concat => {
            let a = evaluate(&args[0], ctx)?;
            let b = evaluate(&args[1], ctx)?;
            Ok(Value::str(format!("{}{}", a.text(), b.text())))
        }
        Function::Eq | Function::Ne | Function::Lt | Function::Le | Function::Gt | Function::Ge => {
            eval_comparison(func, &args[0], &args[1], ctx)
        }
        Function::Like => eval_like(&args[0], &args[1], ctx),
        Function::IsNull => Ok(Value::Bool(evaluate(&args[0], ctx)?.is_null())),
        Function::IsNotNull => Ok(Value::Bool(!evaluate(&args[0], ctx)?.is_null())),
        Function::Length => Ok(Value::Int(evaluate(&args[0], ctx)?.text().chars().count() as i64)),
        Function::Left => eval_substr(true, &args[0], &args[1], ctx),
        Function::Right => eval_substr(false, &args[0], &args[1], ctx),
        Function::Upper => Ok(Value::str(evaluate(&args[0], ctx)?.text().to_uppercase())),
        Function::Lower => Ok(Value::str(evaluate(&args[0], ctx)?.text().to_lowercase())),
        Function::Trim => Ok(Value::str(evaluate(&args[0], ctx)?.text().trim().to_string())),
        Function::Chr => {
            let n = evaluate(&args[0], ctx)?;
            let code = Value::parse_int(&n.text()).unwrap_or(0) as u32;
            Ok(Value::str(char::from_u32(code).map(|c| c.to_string()).unwrap_or_default()))
        }
        Function::Codepoint => {
            let s = evaluate(&args[0], ctx)?.text();
            Ok(Value::Int(s.chars().next().map(|c| c as i64).unwrap_or(0)))
        }
        Function::Hex => {
            let s = evaluate(&args[0], ctx)?.text();
            Ok(Value::str(s.as_bytes().iter().map(|b| format!("{b:02X}")).collect::<String>()))
        }
        Function::ToHex => {
            let n = evaluate(&args[0], ctx)?;
            let v = Value::parse_int(&n.text()).unwrap_or(0);
            Ok(Value::str(format!("{v:X}")))
        }
        Function::W1252 => eval_w1252(&args[0], ctx),
        Function::Extract(part) => eval_extract(part, &args[0], ctx),
        Function::DateAdd => eval_date_arith(true, &args[0], &args[1], ctx),
        Function::DateSub => eval_date_arith(false, &args[0], &args[1], ctx),
        Function::DateDiff => {
            let a = parse_date_operand(&args[0], ctx)?;
            let b = parse_date_operand(&args[1], ctx)?;
            match (a, b) {
                (Some(a), Some(b)) => Ok(Value::Int(a.day_diff(&b))),
                _ => Ok(Value::Null),
            }
        }
        Function::MakeDate => {
            let y = eval_int(&args[0], ctx)?;
            let m = eval_int(&args[1], ctx)?;
            let d = eval_int(&args[2], ctx)?;
            Ok(Value::str(DateTime::new(y, m, d).format_date()))
        }
        Function::MakeTime => {
            let h = eval_int(&args[0], ctx)?;
            let mi = eval_int(&args[1], ctx)?;
            let s = eval_int(&args[2], ctx)?;
            let mut dt = DateTime::new(0, 1, 1);
            dt.hour = h;
            dt.minute = mi;
            dt.second = s;
            Ok(Value::str(dt.format_time()))
        }
        Function::MakeDatetime => {
            let y = eval_int(&args[0], ctx)?;
            let mo = eval_int(&args[1], ctx)?;
            let d = eval_int(&args[2], ctx)?;
            let h = eval_int(&args[3], ctx)?;
            let mi = eval_int(&args[4], ctx)?;
            let s = eval_int(&args[5], ctx)?;
            let mut dt = DateTime::new(y, mo, d);
            dt.hour = h;
            dt.minute = mi;
            dt.second = s;
            Ok(Value::str(dt.format_datetime()))
        }
        Function::Today => Ok(Value::str(ctx.now.format_date())),
        Function::Now => Ok(Value::str(ctx.now.format_datetime())),
        Function::Clock => Ok(Value::str(ctx.now.format_time())),
        Function::CastInt => {
            let s = evaluate(&args[0], ctx)?.text();
            Ok(match Value::parse_int(&s) {
                Some(i) => Value::Int(i),
                None => Value::parse_float(&s).map(|f| Value::Int(f as i64)).unwrap_or(Value::Null),
            })
        }
        Function::CastDuration => {
            let s = evaluate(&args[0], ctx)?.text();
            Ok(Value::Int(Value::parse_int(&s).unwrap_or(0)))
        }
        Function::RowNumber => Ok(Value::Int(ctx.row_number)),
        Function::Count | Function::CountStar | Function::Sum | Function::Avg | Function::Min | Function::Max | Function::ListAgg => {
            unreachable!("handled by eval_aggregate")
        }
    }
}

/// `Parens` doubles as the CASE-expression encoding the parser produces
/// (spec.md 9's "keep `Node` closed" design note, carried into SPEC_FULL.md
/// 4.4): one child is plain parenthesization, three children is
/// `IF cond THEN val ELSE rest` where `rest` may itself be another
/// three-child Parens for the next WHEN branch.
fn eval_parens_or_case(args: &[Node], ctx: &mut EvalContext) -> Result<Value> {
    match args.len() {
        1 => evaluate(&args[0], ctx),
        3 => {
            if evaluate_bool(&args[0], ctx)? {
                evaluate(&args[1], ctx)
            } else {
                evaluate(&args[2], ctx)
            }
        }
        n => Err(EngineError::runtime(format!("internal: PARENS node with {n} children"))),
    }
}

fn eval_neg(arg: &Node, ctx: &mut EvalContext) -> Result<Value> {
    let v = evaluate(arg, ctx)?;
    if v.is_null() {
        return Ok(Value::Null);
    }
    let text = v.text();
    match (Value::parse_int(&text), Value::parse_float(&text)) {
        (Some(i), _) => Ok(Value::Int(-i)),
        (None, Some(f)) => Ok(Value::Float(-f)),
        _ => Err(EngineError::runtime(format!("cannot negate non-numeric value '{text}'"))),
    }
}

fn eval_int(node: &Node, ctx: &mut EvalContext) -> Result<i64> {
    let v = evaluate(node, ctx)?;
    Ok(Value::parse_int(&v.text()).unwrap_or(0))
}

/// Arithmetic with the date overloads spec.md 4.7 names: `date + days`,
/// `datetime + seconds`, and their inverses. Division by zero yields an
/// empty (NULL) value rather than an error (spec.md 7).
fn eval_arithmetic(func: Function, lhs: &Node, rhs: &Node, ctx: &mut EvalContext) -> Result<Value> {
    let a = evaluate(lhs, ctx)?;
    let b = evaluate(rhs, ctx)?;
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let (at, bt) = (a.text(), b.text());

    // date +/- integer days
    if matches!(func, Function::Add | Function::Sub) {
        if let (Some(date), Some(days)) = (crate::datetime::parse_datetime(&at), Value::parse_int(&bt)) {
            let delta = if func == Function::Add { days } else { -days };
            return Ok(Value::str(DateTime::from_julian(date.julian() + delta).format_date()));
        }
    }

    let (af, bf) = (Value::parse_float(&at), Value::parse_float(&bt));
    let both_int = Value::parse_int(&at).is_some() && Value::parse_int(&bt).is_some();
    match (func, af, bf) {
        (Function::Add, Some(x), Some(y)) => Ok(numeric_result(x + y, both_int)),
        (Function::Sub, Some(x), Some(y)) => Ok(numeric_result(x - y, both_int)),
        (Function::Mul, Some(x), Some(y)) => Ok(numeric_result(x * y, both_int)),
        (Function::Div, Some(x), Some(y)) => {
            if y == 0.0 {
                Ok(Value::Null)
            } else {
                Ok(Value::Float(x / y))
            }
        }
        (Function::Mod, Some(x), Some(y)) => {
            if y == 0.0 {
                Ok(Value::Null)
            } else {
                Ok(numeric_result(x % y, both_int))
            }
        }
        (Function::Pow, Some(x), Some(y)) => Ok(numeric_result(x.powf(y), both_int && y >= 0.0)),
        _ => Err(EngineError::runtime(format!("non-numeric operand in arithmetic: '{at}' / '{bt}'"))),
    }
}

fn eval_date_arith(add: bool, date_arg: &Node, amount_arg: &Node, ctx: &mut EvalContext) -> Result<Value> {
    let date = parse_date_operand(date_arg, ctx)?;
    let amount = eval_int(amount_arg, ctx)?;
    match date {
        Some(d) => {
            let delta = if add { amount } else { -amount };
            Ok(Value::str(DateTime::from_julian(d.julian() + delta).format_date()))
        }
        None => Ok(Value::Null),
    }
}

fn parse_date_operand(node: &Node, ctx: &mut EvalContext) -> Result<Option<DateTime>> {
    let v = evaluate(node, ctx)?;
    if v.is_null() {
        return Ok(None);
    }
    Ok(crate::datetime::parse_datetime(&v.text()))
}

fn numeric_result(v: f64, keep_int: bool) -> Value {
    if keep_int && v.fract() == 0.0 && v.abs() < 9.2e18 {
        Value::Int(v as i64)
    } else {
        Value::Float(v)
    }
}

/// Date-aware three-way comparison, matching `predicates.c`'s
/// `evaluateExpression`: date parse wins first, then integer, then
/// bytewise; the literal string `"NULL"` is equated with emptiness for
/// `=`/`!=` only, and any other operator against an empty operand is
/// simply false.
fn eval_comparison(func: Function, lhs: &Node, rhs: &Node, ctx: &mut EvalContext) -> Result<Value> {
    let a = evaluate(lhs, ctx)?;
    let b = evaluate(rhs, ctx)?;
    let (at, bt) = (a.text(), b.text());

    if bt == "NULL" || at == "NULL" {
        let other_empty = if bt == "NULL" { at.is_empty() } else { bt.is_empty() };
        return Ok(Value::Bool(match func {
            Function::Eq => other_empty,
            Function::Ne => !other_empty,
            _ => false,
        }));
    }
    if at.is_empty() || bt.is_empty() {
        return Ok(Value::Bool(false));
    }

    let ord = compare_text(&at, &bt);
    use std::cmp::Ordering::*;
    Ok(Value::Bool(match func {
        Function::Eq => ord == Equal,
        Function::Ne => ord != Equal,
        Function::Lt => ord == Less,
        Function::Le => ord != Greater,
        Function::Gt => ord == Greater,
        Function::Ge => ord != Less,
        _ => unreachable!(),
    }))
}

/// LIKE with only a trailing `%` wildcard (spec.md 4.5: "LIKE with a
/// trailing `%` is translated into a range"; `predicates.c`'s
/// `evaluateExpression` LIKE branch only ever checks a trailing `%`).
fn eval_like(lhs: &Node, rhs: &Node, ctx: &mut EvalContext) -> Result<Value> {
    let a = evaluate(lhs, ctx)?.text();
    let pat = evaluate(rhs, ctx)?.text();
    Ok(Value::Bool(like_match(&a, &pat)))
}

pub fn like_match(value: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('%') {
        Some(prefix) => value.starts_with(prefix),
        None => value == pattern,
    }
}

fn eval_substr(from_left: bool, s: &Node, n: &Node, ctx: &mut EvalContext) -> Result<Value> {
    let s = evaluate(s, ctx)?.text();
    let n = eval_int(n, ctx)?.max(0) as usize;
    let chars: Vec<char> = s.chars().collect();
    let n = n.min(chars.len());
    let slice = if from_left { &chars[..n] } else { &chars[chars.len() - n..] };
    Ok(Value::str(slice.iter().collect::<String>()))
}

/// Best-effort Windows-1252 decode of the already-UTF-8 cell text: invalid
/// leading bytes are rewound to their Latin-1 codepoint, matching spec.md
/// 7's "bad UTF-8 inside W1252 yields a best-effort rewind".
fn eval_w1252(arg: &Node, ctx: &mut EvalContext) -> Result<Value> {
    let s = evaluate(arg, ctx)?.text();
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        out.push(b as char);
    }
    Ok(Value::str(out))
}

fn eval_extract(part: DatePart, arg: &Node, ctx: &mut EvalContext) -> Result<Value> {
    let date = match parse_date_operand(arg, ctx)? {
        Some(d) => d,
        None => return Ok(Value::Null),
    };
    Ok(match part {
        DatePart::Year => Value::Int(date.year),
        DatePart::Month => Value::Int(date.month),
        DatePart::Day => Value::Int(date.day),
        DatePart::Week => Value::Int(date.iso_week()),
        DatePart::WeekYear => Value::Int(date.iso_week_year()),
        DatePart::Weekday => Value::Int(date.iso_weekday()),
        DatePart::YearDay => Value::Int(date.year_day()),
        DatePart::Millennium => Value::Int((date.year - 1) / 1000 + 1),
        DatePart::Century => Value::Int((date.year - 1) / 100 + 1),
        DatePart::Decade => Value::Int((date.year / 10) * 10),
        DatePart::Quarter => Value::Int((date.month - 1) / 3 + 1),
        DatePart::Julian => Value::Int(date.julian()),
        DatePart::MonthString => Value::str(format!("{:04}-{:02}", date.year, date.month)),
        DatePart::WeekString => Value::str(format!("{:04}-W{:02}", date.iso_week_year(), date.iso_week())),
        DatePart::YearDayString => Value::str(format!("{:04}-{:03}", date.year, date.year_day())),
        DatePart::Date => Value::str(date.format_date()),
        DatePart::DateTime => Value::str(date.format_datetime()),
        DatePart::IsLeapYear => Value::Bool(DateTime::is_leap_year(date.year)),
        DatePart::IsWeekend => Value::Bool(date.iso_weekday() >= 6),
    })
}

/// Aggregate evaluation over an entire (group-marked) row list (spec.md
/// 4.7). A `FILTER (WHERE ...)` sub-node gates which rows contribute.
fn eval_aggregate(func: Function, args: &[Node], filter: Option<&Node>, ctx: &mut EvalContext) -> Result<Value> {
    let (pool, handle) = match ctx.rows {
        RowSource::Group { pool, handle } => (pool, handle),
        RowSource::Row(_) => {
            return Err(EngineError::runtime("aggregate function used outside a grouped context"));
        }
    };
    let n = pool.len(handle);

    if func == Function::CountStar && filter.is_none() {
        return Ok(Value::Int(n as i64));
    }

    let mut values: Vec<Value> = Vec::with_capacity(n);
    for i in 0..n {
        let row: Vec<i64> = pool.row(handle, i).to_vec();
        let mut row_ctx = EvalContext::for_row(&mut *ctx.tables, &row, ctx.now, ctx.now_seconds);
        row_ctx.row_number = ctx.row_number;
        if let Some(f) = filter {
            if !evaluate_bool(f, &mut row_ctx)? {
                continue;
            }
        }
        let v = if func == Function::CountStar { Value::Int(1) } else { evaluate(&args[0], &mut row_ctx)? };
        if !v.is_null() {
            values.push(v);
        }
    }

    Ok(match func {
        Function::CountStar => Value::Int(values.len() as i64),
        Function::Count => Value::Int(values.len() as i64),
        Function::Sum => {
            if values.is_empty() {
                Value::Null
            } else {
                let both_int = values.iter().all(|v| Value::parse_int(&v.text()).is_some());
                let sum: f64 = values.iter().filter_map(|v| Value::parse_float(&v.text())).sum();
                numeric_result(sum, both_int)
            }
        }
        Function::Avg => {
            if values.is_empty() {
                Value::Null
            } else {
                let sum: f64 = values.iter().filter_map(|v| Value::parse_float(&v.text())).sum();
                Value::Float(sum / values.len() as f64)
            }
        }
        Function::Min => values.into_iter().min_by(|a, b| compare_text(&a.text(), &b.text())).unwrap_or(Value::Null),
        Function::Max => values.into_iter().max_by(|a, b| compare_text(&a.text(), &b.text())).unwrap_or(Value::Null),
        Function::ListAgg => Value::str(values.iter().map(|v| v.text()).collect::<Vec<_>>().join(",")),
        _ => unreachable!(),
    })
}

/// Bottom-up constant folding (spec.md 4.7): replaces any subtree whose
/// leaves are all `ColumnIndex::Constant` with a single folded constant
/// leaf. Applied to the SELECT list and predicates after resolution.
pub fn fold_constants(node: Node) -> Node {
    let folded = match node {
        Node::Leaf(_) => return node,
        Node::Unary { func, arg, alias, filter } => {
            let arg = Box::new(fold_constants(*arg));
            Node::Unary { func, arg, alias, filter }
        }
        Node::Call { func, args, alias, filter } => {
            let args = args.into_iter().map(fold_constants).collect();
            Node::Call { func, args, alias, filter }
        }
    };
    if !folded.is_constant() || folded.func().is_aggregate() {
        return folded;
    }
    // A Leaf's `alias()` is its `text`, which for a Constant field is also
    // its value — renaming it in place would clobber the computed value.
    // Keep the alias on a separate `Parens` wrapper instead.
    let alias = folded.alias().map(|s| s.to_string());
    let now = DateTime::new(1970, 1, 1);
    let mut tables: Vec<OpenTable> = Vec::new();
    let mut ctx = EvalContext::for_row(&mut tables, &[], now, 0);
    match evaluate(&folded, &mut ctx) {
        Ok(v) => {
            let leaf = Node::constant(v);
            match alias {
                Some(a) => Node::Unary { func: Function::Parens, arg: Box::new(leaf), alias: Some(a), filter: None },
                None => leaf,
            }
        }
        Err(_) => folded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::CsvTable;

    fn table(header: &str, rows: Vec<Vec<&str>>) -> OpenTable {
        let fields = header.split(',').map(|s| s.to_string()).collect();
        let rows = rows.into_iter().map(|r| r.into_iter().map(|s| s.to_string()).collect()).collect();
        OpenTable { alias: "t".to_string(), table: Box::new(CsvTable::from_memory(fields, rows)) }
    }

    fn now() -> DateTime {
        DateTime::new(2024, 6, 1)
    }

    #[test]
    fn column_lookup() {
        let mut tables = vec![table("id,name", vec![vec!["1", "Ann"]])];
        let field = Field { text: "name".into(), table_id: 0, index: ColumnIndex::Column(1) };
        let row = [0i64];
        let mut ctx = EvalContext::for_row(&mut tables, &row, now(), 0);
        let v = eval_field(&field, &mut ctx).unwrap();
        assert_eq!(v.text(), "Ann");
    }

    #[test]
    fn left_join_null_rowid_is_empty() {
        let mut tables = vec![table("id", vec![vec!["1"]]), table("id", vec![vec!["2"]])];
        let field = Field { text: "id".into(), table_id: 1, index: ColumnIndex::Column(0) };
        let row = [0i64, ROWID_NULL];
        let mut ctx = EvalContext::for_row(&mut tables, &row, now(), 0);
        let v = eval_field(&field, &mut ctx).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn like_trailing_percent_is_prefix() {
        assert!(like_match("Annabelle", "Ann%"));
        assert!(!like_match("Bob", "Ann%"));
        assert!(like_match("Ann", "Ann"));
    }

    #[test]
    fn arithmetic_add_numeric() {
        let mut tables: Vec<OpenTable> = Vec::new();
        let mut ctx = EvalContext::for_row(&mut tables, &[], now(), 0);
        let v = eval_arithmetic(Function::Add, &Node::constant(Value::Int(2)), &Node::constant(Value::Int(3)), &mut ctx).unwrap();
        assert_eq!(v.text(), "5");
    }

    #[test]
    fn date_plus_days() {
        let mut tables: Vec<OpenTable> = Vec::new();
        let mut ctx = EvalContext::for_row(&mut tables, &[], now(), 0);
        let v = eval_arithmetic(Function::Add, &Node::constant(Value::str("2024-01-01")), &Node::constant(Value::Int(5)), &mut ctx).unwrap();
        assert_eq!(v.text(), "2024-01-06");
    }

    #[test]
    fn division_by_zero_is_null() {
        let mut tables: Vec<OpenTable> = Vec::new();
        let mut ctx = EvalContext::for_row(&mut tables, &[], now(), 0);
        let v = eval_arithmetic(Function::Div, &Node::constant(Value::Int(1)), &Node::constant(Value::Int(0)), &mut ctx).unwrap();
        assert!(v.is_null());
    }

    #[test]
    fn comparison_null_string_equates_empty() {
        let mut tables: Vec<OpenTable> = Vec::new();
        let mut ctx = EvalContext::for_row(&mut tables, &[], now(), 0);
        let v = eval_comparison(Function::Eq, &Node::constant(Value::str("")), &Node::constant(Value::str("NULL")), &mut ctx).unwrap();
        assert!(v.as_bool());
    }

    #[test]
    fn extract_year_from_date() {
        let mut tables: Vec<OpenTable> = Vec::new();
        let mut ctx = EvalContext::for_row(&mut tables, &[], now(), 0);
        let v = eval_extract(DatePart::Year, &Node::constant(Value::str("2024-02-29")), &mut ctx).unwrap();
        assert_eq!(v.text(), "2024");
    }

    #[test]
    fn constant_folding_replaces_arithmetic() {
        let node = Node::binary(Function::Add, Node::constant(Value::Int(1)), Node::constant(Value::Int(2)));
        let folded = fold_constants(node);
        assert!(matches!(folded, Node::Leaf(ref f) if f.text == "3"));
    }
}
