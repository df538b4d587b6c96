//! Name resolution: turns the parser's unqualified/qualified-by-text
//! [`Field`] references into resolved `(table_id, ColumnIndex::Column)`
//! pairs. Runs in the fixed order spec.md 4.4 describes: the SELECT list
//! resolves first (against FROM-list columns only — its own aliases don't
//! exist yet), then WHERE/ORDER BY/GROUP BY resolve against both the
//! FROM-list and the now-available SELECT aliases, with the alias-vs-column
//! precedence spec.md 4.4 assigns to each clause.

use crate::error::{EngineError, Result};
use crate::eval::fold_constants;
use crate::expr::{ColumnIndex, Field, Node};
use crate::query::Query;
use crate::vfs::OpenTable;

/// Which of "FROM column" and "SELECT alias" wins when a name matches both.
#[derive(Clone, Copy, PartialEq, Eq)]
enum AliasPolicy {
    /// SELECT list itself: no aliases exist yet to consult.
    None,
    /// WHERE / ORDER BY: an alias match wins over a same-named column.
    First,
    /// GROUP BY: a FROM column wins; the alias is only a fallback.
    Last,
}

/// Expands every `*` / `alias.*` leaf in `columns` into one leaf per real
/// column (spec.md 4.4 "star expansion", always run before resolution).
pub fn expand_stars(columns: &mut Vec<Node>, tables: &[OpenTable]) {
    let mut expanded = Vec::with_capacity(columns.len());
    for col in columns.drain(..) {
        match col.as_field() {
            Some(f) if f.index == ColumnIndex::Star => {
                if let Some((alias, _)) = f.text.split_once(".*") {
                    if let Some((table_id, t)) = tables.iter().enumerate().find(|(_, t)| t.alias == alias) {
                        for i in 0..t.table.field_count() {
                            expanded.push(column_leaf(table_id, i, t));
                        }
                        continue;
                    }
                }
                for (table_id, t) in tables.iter().enumerate() {
                    for i in 0..t.table.field_count() {
                        expanded.push(column_leaf(table_id, i, t));
                    }
                }
            }
            _ => expanded.push(col),
        }
    }
    *columns = expanded;
}

fn column_leaf(table_id: usize, col: usize, t: &OpenTable) -> Node {
    let name = t.table.field_name(col).unwrap_or("").to_string();
    Node::leaf(Field { text: name, table_id, index: ColumnIndex::Column(col) })
}

/// Resolves every clause of `query` against `tables`, in spec.md 4.4's
/// fixed pass order.
pub fn resolve_query(query: &mut Query, tables: &[OpenTable]) -> Result<()> {
    expand_stars(&mut query.columns, tables);

    let mut resolved_columns = Vec::with_capacity(query.columns.len());
    for col in query.columns.drain(..) {
        resolved_columns.push(fold_constants(resolve_node(&col, tables, &[], AliasPolicy::None)?));
    }
    query.columns = resolved_columns;

    if let Some(pred) = query.predicate.take() {
        query.predicate = Some(fold_constants(resolve_node(&pred, tables, &query.columns, AliasPolicy::First)?));
    }

    for t in &mut query.tables {
        if let Some(jp) = t.join_predicate.take() {
            t.join_predicate = Some(fold_constants(resolve_node(&jp, tables, &query.columns, AliasPolicy::First)?));
        }
    }

    let mut group_by = Vec::with_capacity(query.group_by.len());
    for g in query.group_by.drain(..) {
        group_by.push(fold_constants(resolve_node(&g, tables, &query.columns, AliasPolicy::Last)?));
    }
    query.group_by = group_by;

    let mut order_by = Vec::with_capacity(query.order_by.len());
    for mut k in query.order_by.drain(..) {
        k.expr = fold_constants(resolve_node(&k.expr, tables, &query.columns, AliasPolicy::First)?);
        order_by.push(k);
    }
    query.order_by = order_by;

    Ok(())
}

fn resolve_node(node: &Node, tables: &[OpenTable], select_list: &[Node], policy: AliasPolicy) -> Result<Node> {
    match node {
        Node::Leaf(f) => resolve_field(f, tables, select_list, policy),
        Node::Unary { func, arg, alias, filter } => {
            let arg = Box::new(resolve_node(arg, tables, select_list, policy)?);
            let filter = filter
                .as_ref()
                .map(|f| resolve_node(f, tables, select_list, policy).map(Box::new))
                .transpose()?;
            Ok(Node::Unary { func: *func, arg, alias: alias.clone(), filter })
        }
        Node::Call { func, args, alias, filter } => {
            let args = args
                .iter()
                .map(|a| resolve_node(a, tables, select_list, policy))
                .collect::<Result<Vec<_>>>()?;
            let filter = filter
                .as_ref()
                .map(|f| resolve_node(f, tables, select_list, policy).map(Box::new))
                .transpose()?;
            Ok(Node::Call { func: *func, args, alias: alias.clone(), filter })
        }
    }
}

fn resolve_field(f: &Field, tables: &[OpenTable], select_list: &[Node], policy: AliasPolicy) -> Result<Node> {
    match &f.index {
        ColumnIndex::Unknown => {}
        ColumnIndex::Star => {
            return Err(EngineError::resolution(format!("'{}' is not valid in this context", f.text)));
        }
        _ => return Ok(Node::Leaf(f.clone())),
    }

    if let Some((qualifier, col)) = f.text.split_once('.') {
        let table_id = tables
            .iter()
            .position(|t| t.alias.eq_ignore_ascii_case(qualifier))
            .ok_or_else(|| EngineError::resolution(format!("no such table alias '{qualifier}'")))?;
        let idx = find_field(&tables[table_id], col)
            .ok_or_else(|| EngineError::resolution(format!("no such column '{qualifier}.{col}'")))?;
        return Ok(Node::leaf(Field { text: col.to_string(), table_id, index: ColumnIndex::Column(idx) }));
    }

    let by_alias = || find_alias(select_list, &f.text);
    let by_column = || find_unqualified(tables, &f.text);

    let resolved = match policy {
        AliasPolicy::None => by_column()?,
        AliasPolicy::First => match by_alias() {
            Some(n) => Some(n),
            None => by_column()?,
        },
        AliasPolicy::Last => match by_column()? {
            Some(n) => Some(n),
            None => by_alias(),
        },
    };

    resolved.ok_or_else(|| EngineError::resolution(format!("no such column '{}'", f.text)))
}

fn find_field(t: &OpenTable, name: &str) -> Option<usize> {
    (0..t.table.field_count()).find(|&i| t.table.field_name(i).is_some_and(|n| n.eq_ignore_ascii_case(name)))
}

fn find_unqualified(tables: &[OpenTable], name: &str) -> Result<Option<Node>> {
    let mut found: Option<(usize, usize)> = None;
    for (table_id, t) in tables.iter().enumerate() {
        if let Some(idx) = find_field(t, name) {
            if found.is_some() {
                return Err(EngineError::resolution(format!("column '{name}' is ambiguous")));
            }
            found = Some((table_id, idx));
        }
    }
    Ok(found.map(|(table_id, idx)| Node::leaf(Field { text: name.to_string(), table_id, index: ColumnIndex::Column(idx) })))
}

fn find_alias(select_list: &[Node], name: &str) -> Option<Node> {
    select_list.iter().find(|n| n.alias().is_some_and(|a| a.eq_ignore_ascii_case(name))).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{CsvTable, VfsTable};

    fn open_table(alias: &str, header: &str) -> OpenTable {
        let fields: Vec<String> = header.split(',').map(|s| s.to_string()).collect();
        let table: Box<dyn VfsTable> = Box::new(CsvTable::from_memory(fields, vec![]));
        OpenTable { alias: alias.to_string(), table }
    }

    #[test]
    fn resolves_unqualified_column() {
        let tables = vec![open_table("t", "id,name")];
        let field = Field::unresolved("name");
        let resolved = resolve_field(&field, &tables, &[], AliasPolicy::None).unwrap();
        assert_eq!(resolved.as_field().unwrap().index, ColumnIndex::Column(1));
    }

    #[test]
    fn ambiguous_column_errors() {
        let tables = vec![open_table("a", "id,name"), open_table("b", "id,age")];
        let field = Field::unresolved("id");
        assert!(resolve_field(&field, &tables, &[], AliasPolicy::None).is_err());
    }

    #[test]
    fn qualified_column_resolves_by_alias() {
        let tables = vec![open_table("a", "id,name"), open_table("b", "id,age")];
        let field = Field::unresolved("b.id");
        let resolved = resolve_field(&field, &tables, &[], AliasPolicy::None).unwrap();
        let f = resolved.as_field().unwrap();
        assert_eq!(f.table_id, 1);
        assert_eq!(f.index, ColumnIndex::Column(0));
    }

    #[test]
    fn star_expands_to_all_columns() {
        let tables = vec![open_table("t", "id,name")];
        let mut cols = vec![Node::leaf(Field { text: "*".to_string(), table_id: usize::MAX, index: ColumnIndex::Star })];
        expand_stars(&mut cols, &tables);
        assert_eq!(cols.len(), 2);
    }
}
