//! Renders a parsed (but not yet resolved) [`Query`] back to SQL text.
//! The only consumer is `CREATE VIEW`: spec.md 6 persists a view as a
//! `.sql` file containing a SELECT, and `vfs::ViewTable` re-runs that text
//! through the engine on every open. Operating on the *unresolved* tree
//! (straight out of the parser, before `resolve::resolve_query` rewrites
//! `Field::text` away) means the rendered text uses the same column/table
//! names the user wrote, not synthetic internal ids.

use crate::expr::{ColumnIndex, DatePart, Function, Node};
use crate::query::{JoinType, Query, TableSpec};

pub fn render_query(q: &Query) -> String {
    let mut out = String::from("SELECT ");
    out.push_str(&render_column_list(&q.columns));

    if !q.tables.is_empty() {
        out.push_str(" FROM ");
        for (i, t) in q.tables.iter().enumerate() {
            if i == 0 {
                out.push_str(&render_table_spec(&t.spec));
            } else {
                out.push_str(if t.join_type == JoinType::Left { " LEFT JOIN " } else { " JOIN " });
                out.push_str(&render_table_spec(&t.spec));
                if let Some(jp) = &t.join_predicate {
                    out.push_str(" ON ");
                    out.push_str(&render_node(jp));
                }
            }
            if !t.alias.is_empty() && t.alias != default_table_text(&t.spec) {
                out.push_str(" AS ");
                out.push_str(&t.alias);
            }
        }
    }

    if let Some(p) = &q.predicate {
        out.push_str(" WHERE ");
        out.push_str(&render_node(p));
    }

    if !q.group_by.is_empty() {
        out.push_str(" GROUP BY ");
        out.push_str(&q.group_by.iter().map(render_node).collect::<Vec<_>>().join(", "));
    }

    if !q.order_by.is_empty() {
        out.push_str(" ORDER BY ");
        let parts: Vec<String> = q
            .order_by
            .iter()
            .map(|k| format!("{} {}", render_node(&k.expr), if k.descending { "DESC" } else { "ASC" }))
            .collect();
        out.push_str(&parts.join(", "));
    }

    if q.offset > 0 {
        out.push_str(&format!(" OFFSET {}", q.offset));
    }
    if q.limit >= 0 {
        out.push_str(&format!(" LIMIT {}", q.limit));
    }

    out
}

fn render_column_list(columns: &[Node]) -> String {
    columns
        .iter()
        .map(|c| match c.alias() {
            Some(a) if a != rendered_default_alias(c) => format!("{} AS {a}", render_node(c)),
            _ => render_node(c),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// What `alias()` would already read as without an explicit `AS`, so we
/// only emit `AS` when it adds information (matches the parser's own
/// "bare alias falls back to source text" rule in reverse).
fn rendered_default_alias(c: &Node) -> &str {
    c.alias().unwrap_or_default()
}

fn default_table_text(spec: &TableSpec) -> String {
    match spec {
        TableSpec::Named(n) => n.clone(),
        TableSpec::Calendar => "CALENDAR".to_string(),
        TableSpec::Sequence => "SEQUENCE".to_string(),
        _ => String::new(),
    }
}

fn render_table_spec(spec: &TableSpec) -> String {
    match spec {
        TableSpec::Named(n) => n.clone(),
        TableSpec::Stdin { ext } => {
            if ext == "csv" {
                "stdin".to_string()
            } else {
                format!("stdin.{ext}")
            }
        }
        TableSpec::Memory(p) => format!("memory:{p}"),
        TableSpec::Calendar => "CALENDAR".to_string(),
        TableSpec::Sequence => "SEQUENCE".to_string(),
        TableSpec::Subquery(s) => format!("({})", render_query(&s.query)),
        TableSpec::Values(rows) => {
            let rendered = rows
                .iter()
                .map(|r| format!("({})", r.iter().map(render_node).collect::<Vec<_>>().join(", ")))
                .collect::<Vec<_>>()
                .join(", ");
            format!("(VALUES {rendered})")
        }
    }
}

fn render_node(n: &Node) -> String {
    match n {
        Node::Leaf(f) => match &f.index {
            ColumnIndex::Constant => render_literal(&f.text),
            ColumnIndex::RowIndex => "rowid".to_string(),
            ColumnIndex::Star => f.text.clone(),
            _ => f.text.clone(),
        },
        Node::Unary { func, arg, .. } => render_call(*func, std::slice::from_ref(arg.as_ref())),
        Node::Call { func, args, .. } => render_call(*func, args),
    }
}

/// Constant leaves store their text as `Value::text()` already (see
/// `Field::constant`), which loses the original quoting — re-quote numeric-
/// looking text only when it isn't purely numeric, a reasonable inverse of
/// `value::Value::parse_int`/`parse_float`.
fn render_literal(text: &str) -> String {
    if text.is_empty() {
        return "''".to_string();
    }
    if text.parse::<i64>().is_ok() || text.parse::<f64>().is_ok() {
        text.to_string()
    } else {
        format!("'{}'", text.replace('\'', "''"))
    }
}

fn render_call(func: Function, args: &[Node]) -> String {
    use Function::*;
    let a = |i: usize| render_node(&args[i]);
    match func {
        Unity => args.first().map(render_node).unwrap_or_default(),
        Add => format!("({} + {})", a(0), a(1)),
        Sub => format!("({} - {})", a(0), a(1)),
        Mul => format!("({} * {})", a(0), a(1)),
        Div => format!("({} / {})", a(0), a(1)),
        Mod => format!("({} % {})", a(0), a(1)),
        Pow => format!("POWER({}, {})", a(0), a(1)),
        Neg => format!("(-{})", a(0)),
        Concat => format!("({} || {})", a(0), a(1)),
        Parens => args.first().map(|x| format!("({})", render_node(x))).unwrap_or_default(),
        Eq => format!("({} = {})", a(0), a(1)),
        Ne => format!("({} != {})", a(0), a(1)),
        Lt => format!("({} < {})", a(0), a(1)),
        Le => format!("({} <= {})", a(0), a(1)),
        Gt => format!("({} > {})", a(0), a(1)),
        Ge => format!("({} >= {})", a(0), a(1)),
        Like => format!("({} LIKE {})", a(0), a(1)),
        IsNull => format!("({} IS NULL)", a(0)),
        IsNotNull => format!("({} IS NOT NULL)", a(0)),
        And => format!("({} AND {})", a(0), a(1)),
        Or => format!("({} OR {})", a(0), a(1)),
        Not => format!("(NOT {})", a(0)),
        CountStar => "COUNT(*)".to_string(),
        RowNumber => "ROW_NUMBER()".to_string(),
        Today => "TODAY()".to_string(),
        Now => "NOW()".to_string(),
        Clock => "CLOCK()".to_string(),
        Extract(part) => format!("{}({})", extract_name(part), a(0)),
        other => {
            let name = basic_name(other);
            format!("{name}({})", args.iter().map(render_node).collect::<Vec<_>>().join(", "))
        }
    }
}

fn basic_name(func: Function) -> &'static str {
    use Function::*;
    match func {
        Length => "LENGTH",
        Left => "LEFT",
        Right => "RIGHT",
        Upper => "UPPER",
        Lower => "LOWER",
        Trim => "TRIM",
        Chr => "CHR",
        Codepoint => "CODEPOINT",
        Hex => "HEX",
        ToHex => "TO_HEX",
        W1252 => "W1252",
        Count => "COUNT",
        Sum => "SUM",
        Avg => "AVG",
        Min => "MIN",
        Max => "MAX",
        ListAgg => "LISTAGG",
        DateAdd => "DATE_ADD",
        DateSub => "DATE_SUB",
        DateDiff => "DATE_DIFF",
        MakeDate => "MAKE_DATE",
        MakeTime => "MAKE_TIME",
        MakeDatetime => "MAKE_DATETIME",
        CastInt => "CAST_INT",
        CastDuration => "CAST_DURATION",
        _ => "UNKNOWN",
    }
}

fn extract_name(part: DatePart) -> &'static str {
    match part {
        DatePart::Year => "EXTRACT_YEAR",
        DatePart::Month => "EXTRACT_MONTH",
        DatePart::Day => "EXTRACT_DAY",
        DatePart::Week => "EXTRACT_WEEK",
        DatePart::WeekYear => "EXTRACT_WEEKYEAR",
        DatePart::Weekday => "EXTRACT_WEEKDAY",
        DatePart::YearDay => "EXTRACT_YEARDAY",
        DatePart::Millennium => "EXTRACT_MILLENNIUM",
        DatePart::Century => "EXTRACT_CENTURY",
        DatePart::Decade => "EXTRACT_DECADE",
        DatePart::Quarter => "EXTRACT_QUARTER",
        DatePart::Julian => "EXTRACT_JULIAN",
        DatePart::MonthString => "EXTRACT_MONTHSTRING",
        DatePart::WeekString => "EXTRACT_WEEKSTRING",
        DatePart::YearDayString => "EXTRACT_YEARDAYSTRING",
        DatePart::Date => "EXTRACT_DATE",
        DatePart::DateTime => "EXTRACT_DATETIME",
        DatePart::IsLeapYear | DatePart::IsWeekend => "EXTRACT_DATE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Field;
    use crate::query::{JoinType as JT, Table};
    use crate::value::Value;

    #[test]
    fn renders_simple_select() {
        let mut q = Query::new();
        q.tables.push(Table {
            alias: "people".into(),
            spec: TableSpec::Named("people".into()),
            column_aliases: vec![],
            join_predicate: None,
            join_type: JT::Inner,
        });
        q.columns.push(Node::leaf(Field::unresolved("name")));
        q.predicate = Some(Node::binary(Function::Eq, Node::leaf(Field::unresolved("score")), Node::constant(Value::Int(10))));
        let sql = render_query(&q);
        assert_eq!(sql, "SELECT name FROM people WHERE (score = 10)");
    }
}
