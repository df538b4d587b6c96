//! Query planner (C8). Walks the FROM list in source order — spec.md 9
//! deliberately drops `original_source/src/query/optimise.c`'s table
//! reordering heuristics — choosing the cheapest access path per table from
//! what `find_index` reports, and pushing WHERE/ON conjuncts down to the
//! earliest step where every table they reference is already bound.
//!
//! The plan is a flat instruction list rather than a tree, the same shape
//! `exec.rs`'s `ResultStack`-driven dispatch loop expects (mirroring
//! `rustdb::exec::EvalEnv::go` over an `&[Instruction]`).

use crate::error::{EngineError, Result};
use crate::expr::{ColumnIndex, Function, Node};
use crate::query::{JoinType, Query};
use crate::vfs::{IndexKind, OpenTable};

/// One physical step. Every step that can narrow its input via an index
/// still carries the full residual `predicate` for that table/join, since
/// `VfsTable::accelerated_scan`'s contract (see `vfs/mod.rs`) is "narrow
/// conservatively, the caller always re-checks" — index steps here follow
/// the same rule rather than trusting the index bound alone.
#[derive(Clone, Debug)]
pub enum Step {
    DummyRow,
    /// A predicate folded to a constant falsehood before planning reached
    /// the FROM list (spec.md 4.5 step 1 "Dead query"): pushes an empty,
    /// width-0 row list and skips every other phase (joins, group, sort,
    /// limit) entirely, rather than running them over zero rows.
    DeadQuery,
    TableAccessFull { table: usize, predicate: Option<Node> },
    TableScan { table: usize },
    PrimaryKeyUnique { table: usize, col: usize, key: Node, predicate: Option<Node> },
    PrimaryKeyRange { table: usize, col: usize, op: Function, key: Node, predicate: Option<Node> },
    IndexUnique { table: usize, col: usize, key: Node, predicate: Option<Node> },
    IndexUniqueRange { table: usize, col: usize, op: Function, key: Node, predicate: Option<Node> },
    IndexSeek { table: usize, col: usize, key: Node, predicate: Option<Node> },
    IndexScan { table: usize, col: usize, op: Function, key: Node, predicate: Option<Node> },
    CrossJoin { table: usize, outer: bool, predicate: Option<Node> },
    ConstantJoin { table: usize, outer: bool, predicate: Option<Node> },
    LoopJoin { table: usize, outer: bool, predicate: Option<Node> },
    UniqueJoin { table: usize, col: usize, key: Node, outer: bool, predicate: Option<Node> },
    IndexJoin { table: usize, col: usize, key: Node, outer: bool, predicate: Option<Node> },
    Sort { keys: Vec<(Node, bool)> },
    Reverse,
    GroupSorted { keys: Vec<Node> },
    Group { keys: Vec<Node> },
    Offset { n: i64 },
    Slice { limit: i64 },
    Select { columns: Vec<Node> },
}

impl Step {
    /// EXPLAIN's "Operation" column (spec.md 4.5, names lifted verbatim
    /// from `original_source/src/query/explain.c`).
    pub fn operation_name(&self) -> &'static str {
        match self {
            Step::DummyRow => "DUMMY ROW",
            Step::DeadQuery => "DEAD QUERY",
            Step::TableAccessFull { .. } => "TABLE ACCESS FULL",
            Step::TableScan { .. } => "TABLE SCAN",
            Step::PrimaryKeyUnique { .. } => "PRIMARY KEY UNIQUE",
            Step::PrimaryKeyRange { .. } => "PRIMARY KEY RANGE",
            Step::IndexUnique { .. } => "INDEX UNIQUE",
            Step::IndexUniqueRange { .. } => "INDEX UNIQUE RANGE",
            Step::IndexSeek { .. } => "INDEX SEEK",
            Step::IndexScan { .. } => "INDEX SCAN",
            Step::CrossJoin { .. } => "CROSS JOIN",
            Step::ConstantJoin { .. } => "CONSTANT JOIN",
            Step::LoopJoin { .. } => "LOOP JOIN",
            Step::UniqueJoin { .. } => "UNIQUE JOIN",
            Step::IndexJoin { .. } => "INDEX JOIN",
            Step::Sort { .. } => "SORT",
            Step::Reverse => "REVERSE",
            Step::GroupSorted { .. } => "GROUP SORTED",
            Step::Group { .. } => "GROUP",
            Step::Offset { .. } => "OFFSET",
            Step::Slice { .. } => "SLICE",
            Step::Select { .. } => "SELECT",
        }
    }

    pub fn table(&self) -> Option<usize> {
        match self {
            Step::TableAccessFull { table, .. }
            | Step::TableScan { table }
            | Step::PrimaryKeyUnique { table, .. }
            | Step::PrimaryKeyRange { table, .. }
            | Step::IndexUnique { table, .. }
            | Step::IndexUniqueRange { table, .. }
            | Step::IndexSeek { table, .. }
            | Step::IndexScan { table, .. }
            | Step::CrossJoin { table, .. }
            | Step::ConstantJoin { table, .. }
            | Step::LoopJoin { table, .. }
            | Step::UniqueJoin { table, .. }
            | Step::IndexJoin { table, .. } => Some(*table),
            _ => None,
        }
    }

    pub fn predicate(&self) -> Option<&Node> {
        match self {
            Step::TableAccessFull { predicate, .. }
            | Step::PrimaryKeyUnique { predicate, .. }
            | Step::PrimaryKeyRange { predicate, .. }
            | Step::IndexUnique { predicate, .. }
            | Step::IndexUniqueRange { predicate, .. }
            | Step::IndexSeek { predicate, .. }
            | Step::IndexScan { predicate, .. }
            | Step::CrossJoin { predicate, .. }
            | Step::ConstantJoin { predicate, .. }
            | Step::LoopJoin { predicate, .. }
            | Step::UniqueJoin { predicate, .. }
            | Step::IndexJoin { predicate, .. } => predicate.as_ref(),
            _ => None,
        }
    }
}

/// A fully planned query: a flat instruction list the executor runs
/// top-to-bottom over a `ResultStack` of row lists.
pub struct Plan {
    pub steps: Vec<Step>,
}

/// Splits `node` into its top-level AND conjuncts (spec.md 4.5 "AND
/// flattening"), recursively, so a three-way `a AND b AND c` parsed as
/// nested binary `And` nodes yields three independent conjuncts.
fn flatten_and(node: Node) -> Vec<Node> {
    match node {
        Node::Call { func: Function::And, args, .. } => args.into_iter().flat_map(flatten_and).collect(),
        other => vec![other],
    }
}

/// Inverse of [`flatten_and`]: rebuilds a left-leaning AND chain, or `None`
/// for an empty conjunct list.
fn rebuild_and(mut conjuncts: Vec<Node>) -> Option<Node> {
    let mut iter = conjuncts.drain(..);
    let first = iter.next()?;
    Some(iter.fold(first, |acc, next| Node::binary(Function::And, acc, next)))
}

/// Recognises `field <op> expr` or `expr <op> field`, normalizing to
/// field-on-left (`predicates.c`'s `normalisePredicate`/`flipPredicate`:
/// only plain comparison operators against a non-constant field qualify).
fn normalize_comparison(node: &Node) -> Option<(crate::expr::Field, Function, Node)> {
    if let Node::Call { func, args, .. } = node {
        if func.is_comparison() && args.len() == 2 {
            if let Some(f) = args[0].as_field() {
                if !matches!(f.index, ColumnIndex::Constant) {
                    return Some((f.clone(), *func, args[1].clone()));
                }
            }
            if let Some(f) = args[1].as_field() {
                if !matches!(f.index, ColumnIndex::Constant) {
                    return Some((f.clone(), func.flip(), args[0].clone()));
                }
            }
        }
    }
    None
}

/// Whether `conjuncts` (collectively) reference `table_id` itself, and
/// whether any of them reference some other (already-bound) table —
/// spec.md 4.5 step 4's three-way join classification needs both answers
/// to tell "constant w.r.t. the new table" from "references the new table
/// only" from "references both".
fn conjuncts_reference(conjuncts: &[Node], table_id: usize) -> (bool, bool) {
    let mut refs_new = false;
    let mut refs_other = false;
    let mut tables = Vec::new();
    for c in conjuncts {
        tables.clear();
        c.referenced_tables(&mut tables);
        for &r in &tables {
            if r == table_id {
                refs_new = true;
            } else {
                refs_other = true;
            }
        }
    }
    (refs_new, refs_other)
}

/// True when `node` is a predicate already folded (by
/// [`crate::eval::fold_constants`], run during name resolution) down to a
/// constant falsehood — spec.md 4.5 step 1 / step 4's "NEVER" case.
fn is_never(node: &Option<Node>) -> bool {
    match node.as_ref().and_then(Node::as_field) {
        Some(f) if matches!(f.index, ColumnIndex::Constant) => !crate::value::constant_is_truthy(&f.text),
        _ => false,
    }
}

/// Plans `query` against its already-opened tables (spec.md 4.5). `tables`
/// needs `&mut` access because `find_index`/`record_count` are lazily
/// computed by some backends.
pub fn plan_query(query: &Query, tables: &mut [OpenTable]) -> Result<Plan> {
    let mut steps = Vec::new();

    if is_never(&query.predicate) || query.tables.iter().any(|t| is_never(&t.join_predicate)) {
        steps.push(Step::DeadQuery);
        steps.push(Step::Select { columns: query.columns.clone() });
        return Ok(Plan { steps });
    }

    if query.tables.is_empty() {
        steps.push(Step::DummyRow);
    } else {
        let mut remaining: Vec<Node> = Vec::new();
        if let Some(p) = &query.predicate {
            remaining.extend(flatten_and(p.clone()));
        }

        for (i, t) in query.tables.iter().enumerate() {
            let mut avail: Vec<Node> = Vec::new();
            if let Some(jp) = &t.join_predicate {
                avail.extend(flatten_and(jp.clone()));
            }
            let mut j = 0;
            while j < remaining.len() {
                let mut refs = Vec::new();
                remaining[j].referenced_tables(&mut refs);
                let becomes_available =
                    refs.is_empty() || (refs.iter().all(|&r| r <= i) && refs.iter().any(|&r| r == i));
                if becomes_available {
                    avail.push(remaining.remove(j));
                } else {
                    j += 1;
                }
            }

            let step = if i == 0 {
                plan_base_access(0, avail, &mut tables[0])?
            } else {
                plan_join(i, avail, t.join_type, &mut tables[i])?
            };
            steps.push(step);
        }

        if !remaining.is_empty() {
            if let Some(p) = rebuild_and(remaining) {
                // Defensive: every conjunct should have become available by
                // the time its last referenced table was bound. Fold any
                // leftover into the final table's residual predicate rather
                // than silently dropping it.
                if let Some(last) = steps.last_mut() {
                    attach_residual(last, p);
                }
            }
        }
    }

    if !query.group_by.is_empty() || query.flags.group {
        if !query.group_by.is_empty() {
            steps.push(Step::Sort { keys: query.group_by.iter().map(|k| (k.clone(), false)).collect() });
            steps.push(Step::Group { keys: query.group_by.clone() });
        } else {
            steps.push(Step::Group { keys: Vec::new() });
        }
    }

    if !query.order_by.is_empty() {
        steps.push(Step::Sort { keys: query.order_by.iter().map(|k| (k.expr.clone(), k.descending)).collect() });
    }

    if query.offset > 0 {
        steps.push(Step::Offset { n: query.offset });
    }
    if query.limit >= 0 {
        steps.push(Step::Slice { limit: query.limit });
    }

    steps.push(Step::Select { columns: query.columns.clone() });

    Ok(Plan { steps })
}

fn attach_residual(step: &mut Step, extra: Node) {
    fn merge(existing: &mut Option<Node>, extra: Node) {
        *existing = Some(match existing.take() {
            Some(p) => Node::binary(Function::And, p, extra),
            None => extra,
        });
    }
    match step {
        Step::TableAccessFull { predicate, .. }
        | Step::PrimaryKeyUnique { predicate, .. }
        | Step::PrimaryKeyRange { predicate, .. }
        | Step::IndexUnique { predicate, .. }
        | Step::IndexUniqueRange { predicate, .. }
        | Step::IndexSeek { predicate, .. }
        | Step::IndexScan { predicate, .. }
        | Step::CrossJoin { predicate, .. }
        | Step::ConstantJoin { predicate, .. }
        | Step::LoopJoin { predicate, .. }
        | Step::UniqueJoin { predicate, .. }
        | Step::IndexJoin { predicate, .. } => merge(predicate, extra),
        _ => {}
    }
}

/// Chooses the first table's access path: a primary-key/unique/regular
/// index lookup when an equality or range conjunct on an indexed column is
/// available, else a full scan (spec.md 4.5 step order: PK > UNIQUE >
/// INDEX > full scan).
fn plan_base_access(table_id: usize, avail: Vec<Node>, table: &mut OpenTable) -> Result<Step> {
    let residual = rebuild_and(avail.clone());

    let mut best: Option<(usize, Function, Node, IndexKind)> = None;
    for c in &avail {
        if let Some((field, op, other)) = normalize_comparison(c) {
            if field.table_id != table_id {
                continue;
            }
            if !matches!(op, Function::Eq | Function::Ge | Function::Gt | Function::Le | Function::Lt) {
                continue;
            }
            let col = match field.index {
                ColumnIndex::Column(c) => c,
                _ => continue,
            };
            if let Some(found) = table.table.find_index(col) {
                let better = match &best {
                    None => true,
                    Some((_, _, _, kind)) => rank_index(found.kind) > rank_index(*kind),
                };
                if better {
                    best = Some((col, op, other, found.kind));
                }
            }
        }
    }

    if let Some((col, op, key, kind)) = best {
        return Ok(match (kind, op) {
            (IndexKind::Primary, Function::Eq) => Step::PrimaryKeyUnique { table: table_id, col, key, predicate: residual },
            (IndexKind::Primary, _) => Step::PrimaryKeyRange { table: table_id, col, op, key, predicate: residual },
            (IndexKind::Unique, Function::Eq) => Step::IndexUnique { table: table_id, col, key, predicate: residual },
            (IndexKind::Unique, _) => Step::IndexUniqueRange { table: table_id, col, op, key, predicate: residual },
            (IndexKind::Regular, Function::Eq) => Step::IndexSeek { table: table_id, col, key, predicate: residual },
            (IndexKind::Regular, _) => Step::IndexScan { table: table_id, col, op, key, predicate: residual },
        });
    }

    if avail.is_empty() && table.table.rejects_unbounded_scan() {
        return Err(EngineError::Unbounded { table: table.alias.clone() });
    }
    Ok(Step::TableAccessFull { table: table_id, predicate: residual })
}

fn rank_index(kind: IndexKind) -> u8 {
    match kind {
        IndexKind::Primary => 3,
        IndexKind::Unique => 2,
        IndexKind::Regular => 1,
    }
}

/// Chooses a join strategy for table `table_id` against the tables already
/// bound to its left (spec.md 4.5 join step order: UNIQUE_JOIN > INDEX_JOIN
/// > CONSTANT_JOIN > LOOP_JOIN > CROSS_JOIN).
fn plan_join(table_id: usize, avail: Vec<Node>, join_type: JoinType, table: &mut OpenTable) -> Result<Step> {
    let outer = join_type == JoinType::Left;
    let residual = rebuild_and(avail.clone());

    for c in &avail {
        if let Some((field, Function::Eq, other)) = normalize_comparison(c) {
            if field.table_id != table_id {
                continue;
            }
            let mut other_refs = Vec::new();
            other.referenced_tables(&mut other_refs);
            if other_refs.iter().any(|&r| r == table_id) {
                continue; // correlated to itself, not a usable join key
            }
            let col = match field.index {
                ColumnIndex::Column(c) => c,
                _ => continue,
            };
            if let Some(found) = table.table.find_index(col) {
                return Ok(match found.kind {
                    IndexKind::Primary | IndexKind::Unique => {
                        Step::UniqueJoin { table: table_id, col, key: other, outer, predicate: residual }
                    }
                    IndexKind::Regular => Step::IndexJoin { table: table_id, col, key: other, outer, predicate: residual },
                });
            }
        }
    }

    if avail.is_empty() {
        // No ON clause at all: spec.md 4.5 step 4's ALWAYS case.
        return Ok(Step::CrossJoin { table: table_id, outer, predicate: None });
    }
    let (refs_new, refs_other) = conjuncts_reference(&avail, table_id);
    if !refs_new {
        // Constant with respect to the new table: every conjunct is
        // already decided by rows bound so far. Spec.md 4.5 step 4's
        // first bullet calls for a ROWID filter on the bound rows
        // followed by an unconditional CROSS_JOIN; the executor's shared
        // join handler applies `residual` as part of the join itself, so
        // the predicate still ends up enforced, just inside the CROSS_JOIN
        // step rather than a separate filter step ahead of it.
        return Ok(Step::CrossJoin { table: table_id, outer, predicate: residual });
    }
    if !refs_other {
        // References only the new table: evaluate once and multiply each
        // bound row by it (spec.md 4.5 step 4's second bullet).
        return Ok(Step::ConstantJoin { table: table_id, outer, predicate: residual });
    }
    // References both the new table and an already-bound one, with no
    // usable index (spec.md 4.5 step 4's final LOOP_JOIN fallback).
    Ok(Step::LoopJoin { table: table_id, outer, predicate: residual })
}

/// One row of EXPLAIN output (spec.md 6: `ID,Operation,Table,Predicate,Rows,Cost`).
pub struct ExplainRow {
    pub id: usize,
    pub operation: &'static str,
    pub table: String,
    pub predicate: String,
    pub rows: i64,
    pub cost: i64,
}

/// Renders the plan as EXPLAIN rows, grounded in `explain.c`'s cost
/// arithmetic for the shapes this planner emits. Exact per-opcode cost
/// constants for the full original optimiser are not replicated; see
/// DESIGN.md for the simplified model used here.
pub fn explain(plan: &Plan, tables: &mut [OpenTable]) -> Result<Vec<ExplainRow>> {
    let mut rows = Vec::with_capacity(plan.steps.len());
    let mut running_rows: i64 = 1;
    for (id, step) in plan.steps.iter().enumerate() {
        let table_name = step.table().map(|t| tables[t].alias.clone()).unwrap_or_default();
        let predicate = step.predicate().map(|p| describe_predicate(p)).unwrap_or_default();
        running_rows = estimate_rows(step, running_rows, tables)?;
        rows.push(ExplainRow {
            id,
            operation: step.operation_name(),
            table: table_name,
            predicate,
            rows: running_rows,
            cost: running_rows,
        });
    }
    Ok(rows)
}

/// Cost-model row estimate per step (spec.md 4.5's EXPLAIN "Rows"/"Cost"
/// columns). `explain.c`: a full scan divides its row estimate by 1000 for
/// an equality predicate or 2 for any other predicate; an index step
/// starts from 1 row (a direct lookup) and widens for ranges.
fn estimate_rows(step: &Step, upstream: i64, tables: &mut [OpenTable]) -> Result<i64> {
    let has_eq = |p: &Option<Node>| p.as_ref().is_some_and(|n| mentions_eq(n));
    Ok(match step {
        Step::DummyRow => 1,
        Step::DeadQuery => 0,
        Step::TableAccessFull { table, predicate } => {
            let full = tables[*table].table.record_count()? as i64;
            if has_eq(predicate) {
                (full / 1000).max(1)
            } else if predicate.is_some() {
                (full / 2).max(1)
            } else {
                full
            }
        }
        Step::TableScan { table } => tables[*table].table.record_count()? as i64,
        Step::PrimaryKeyUnique { .. } | Step::IndexUnique { .. } => 1,
        Step::PrimaryKeyRange { table, .. } | Step::IndexUniqueRange { table, .. } | Step::IndexScan { table, .. } => {
            (tables[*table].table.record_count()? as i64 / 10).max(1)
        }
        Step::IndexSeek { table, .. } => (tables[*table].table.record_count()? as i64 / 100).max(1),
        Step::CrossJoin { table, .. } => upstream * tables[*table].table.record_count()?.max(1) as i64,
        Step::ConstantJoin { predicate, .. } => {
            if has_eq(predicate) {
                (upstream / 2).max(1)
            } else {
                upstream
            }
        }
        Step::LoopJoin { table, .. } => upstream * (tables[*table].table.record_count()? as i64 / 2).max(1),
        Step::UniqueJoin { .. } => upstream,
        Step::IndexJoin { .. } => (upstream * 2).max(1),
        Step::Sort { .. } | Step::Reverse | Step::GroupSorted { .. } | Step::Group { .. } | Step::Select { .. } => upstream,
        Step::Offset { n } => (upstream - n).max(0),
        Step::Slice { limit } => upstream.min(*limit),
    })
}

fn mentions_eq(node: &Node) -> bool {
    match node {
        Node::Call { func: Function::And, args, .. } => args.iter().any(mentions_eq),
        Node::Call { func: Function::Eq, .. } => true,
        _ => false,
    }
}

/// Simplified rendering of a predicate's Predicate column: the distinct
/// field names it touches, semicolon-joined, wrapped `F(name)` when
/// reached through a non-identity function (`explain.c`'s predicate
/// stringifier does the equivalent, plus full operator pretty-printing
/// that this simplified version does not reproduce — see DESIGN.md).
fn describe_predicate(node: &Node) -> String {
    let mut parts = Vec::new();
    collect_predicate_parts(node, false, &mut parts);
    parts.join(";")
}

fn collect_predicate_parts(node: &Node, under_function: bool, out: &mut Vec<String>) {
    match node {
        Node::Leaf(f) => {
            if matches!(f.index, ColumnIndex::Constant) {
                return;
            }
            let name = if matches!(f.index, ColumnIndex::RowIndex) { "rowid".to_string() } else { f.text.clone() };
            let rendered = if under_function { format!("F({name})") } else { name };
            if !out.contains(&rendered) {
                out.push(rendered);
            }
        }
        Node::Unary { func, arg, .. } => {
            collect_predicate_parts(arg, under_function || !matches!(func, Function::Unity), out);
        }
        Node::Call { func, args, .. } => {
            let nested = under_function || !matches!(func, Function::Unity | Function::And | Function::Or);
            for a in args {
                collect_predicate_parts(a, nested, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Field;
    use crate::query::{OrderKey, QueryFlags, Table, TableSpec};
    use crate::value::Value;
    use crate::vfs::CsvTable;

    fn open(header: &str, rows: Vec<Vec<&str>>) -> OpenTable {
        let fields = header.split(',').map(|s| s.to_string()).collect();
        let rows = rows.into_iter().map(|r| r.into_iter().map(|s| s.to_string()).collect()).collect();
        OpenTable { alias: "t".to_string(), table: Box::new(CsvTable::from_memory(fields, rows)) }
    }

    fn eq(field: Field, value: Value) -> Node {
        Node::binary(Function::Eq, Node::leaf(field), Node::constant(value))
    }

    #[test]
    fn no_tables_plans_dummy_row_and_select() {
        let query = Query::new();
        let mut tables: Vec<OpenTable> = Vec::new();
        let plan = plan_query(&query, &mut tables).unwrap();
        assert!(matches!(plan.steps[0], Step::DummyRow));
        assert!(matches!(plan.steps.last().unwrap(), Step::Select { .. }));
    }

    #[test]
    fn single_table_without_predicate_is_full_scan() {
        let mut query = Query::new();
        query.tables.push(Table {
            alias: "t".into(),
            spec: TableSpec::Named("t".into()),
            column_aliases: vec![],
            join_predicate: None,
            join_type: JoinType::Inner,
        });
        let mut tables = vec![open("id,name", vec![vec!["1", "Ann"]])];
        let plan = plan_query(&query, &mut tables).unwrap();
        assert!(matches!(plan.steps[0], Step::TableAccessFull { predicate: None, .. }));
    }

    #[test]
    fn equality_predicate_becomes_residual_on_full_scan() {
        let mut query = Query::new();
        query.tables.push(Table {
            alias: "t".into(),
            spec: TableSpec::Named("t".into()),
            column_aliases: vec![],
            join_predicate: None,
            join_type: JoinType::Inner,
        });
        query.predicate = Some(eq(Field { text: "id".into(), table_id: 0, index: ColumnIndex::Column(0) }, Value::Int(1)));
        let mut tables = vec![open("id,name", vec![vec!["1", "Ann"]])];
        let plan = plan_query(&query, &mut tables).unwrap();
        assert!(matches!(plan.steps[0], Step::TableAccessFull { predicate: Some(_), .. }));
    }

    #[test]
    fn cross_join_when_no_join_predicate() {
        let mut query = Query::new();
        for _ in 0..2 {
            query.tables.push(Table {
                alias: "t".into(),
                spec: TableSpec::Named("t".into()),
                column_aliases: vec![],
                join_predicate: None,
                join_type: JoinType::Inner,
            });
        }
        let mut tables = vec![open("id", vec![vec!["1"]]), open("id", vec![vec!["1"]])];
        let plan = plan_query(&query, &mut tables).unwrap();
        assert!(matches!(plan.steps[1], Step::CrossJoin { .. }));
    }

    #[test]
    fn group_by_inserts_sort_then_group() {
        let mut query = Query::new();
        query.tables.push(Table {
            alias: "t".into(),
            spec: TableSpec::Named("t".into()),
            column_aliases: vec![],
            join_predicate: None,
            join_type: JoinType::Inner,
        });
        query.group_by.push(Node::leaf(Field { text: "id".into(), table_id: 0, index: ColumnIndex::Column(0) }));
        let mut tables = vec![open("id", vec![vec!["1"]])];
        let plan = plan_query(&query, &mut tables).unwrap();
        let kinds: Vec<&str> = plan.steps.iter().map(|s| s.operation_name()).collect();
        assert!(kinds.windows(2).any(|w| w == ["SORT", "GROUP"]));
    }

    #[test]
    fn offset_and_limit_produce_offset_then_slice() {
        let mut query = Query::new();
        query.offset = 5;
        query.limit = 10;
        query.order_by.push(OrderKey { expr: Node::constant(Value::Int(1)), descending: false });
        let mut tables: Vec<OpenTable> = Vec::new();
        let plan = plan_query(&query, &mut tables).unwrap();
        let kinds: Vec<&str> = plan.steps.iter().map(|s| s.operation_name()).collect();
        let offset_pos = kinds.iter().position(|k| *k == "OFFSET").unwrap();
        let slice_pos = kinds.iter().position(|k| *k == "SLICE").unwrap();
        assert!(offset_pos < slice_pos);
        let _ = QueryFlags::default();
    }

    #[test]
    fn constant_false_predicate_is_dead_query() {
        let mut query = Query::new();
        query.tables.push(Table {
            alias: "t".into(),
            spec: TableSpec::Named("t".into()),
            column_aliases: vec![],
            join_predicate: None,
            join_type: JoinType::Inner,
        });
        query.predicate = Some(Node::constant(Value::Bool(false)));
        let mut tables = vec![open("id", vec![vec!["1"]])];
        let plan = plan_query(&query, &mut tables).unwrap();
        let kinds: Vec<&str> = plan.steps.iter().map(|s| s.operation_name()).collect();
        assert_eq!(kinds, vec!["DEAD QUERY", "SELECT"]);
    }

    #[test]
    fn predicate_description_wraps_function_applied_field() {
        let field = Node::leaf(Field { text: "name".into(), table_id: 0, index: ColumnIndex::Column(1) });
        let node = Node::unary(Function::Upper, field);
        assert_eq!(describe_predicate(&node), "F(name)");
    }
}
