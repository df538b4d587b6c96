//! Expression node types (C7) — spec.md 3 "Node" and "Function tag".
//!
//! `rustdb::expr::ExprIs` is a flat enum of pre-compile expression shapes
//! (`Const`, `Binary`, `FuncCall`, ...); we follow the same "one enum, one
//! variant per shape" idiom, but fold rustdb's separate `Function` byte-tag
//! concept (family + opcode bits, meaningful to rustdb's bytecode compiler)
//! into a single flat `Function` enum, since Rust's exhaustive `match` does
//! the dispatch job the original's bit-packed tag existed to speed up in C.
//! Per spec.md 9's design note, the "self-child" single-argument
//! optimisation becomes its own variant (`Node::Unary`) rather than an
//! overloaded child-count sentinel.

use std::rc::Rc;

use crate::value::Value;

/// Resolved or not-yet-resolved reference to a table column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnIndex {
    /// Ordinary column, 0-based.
    Column(usize),
    /// `*` — expand to all columns of a table (or all tables).
    Star,
    /// Synthetic rowid column.
    RowIndex,
    /// 1-based output row position, assigned at SELECT time.
    RowNumber,
    /// `COUNT(*)`.
    CountStar,
    /// The field carries a literal constant, no table lookup needed.
    Constant,
    /// Not yet resolved by name resolution.
    Unknown,
}

/// A field reference: the source text (for error messages and alias
/// fallback), and — once resolved — which table and column it names.
#[derive(Clone, Debug)]
pub struct Field {
    pub text: String,
    pub table_id: usize,
    pub index: ColumnIndex,
}

impl Field {
    pub fn unresolved(text: impl Into<String>) -> Self {
        Field { text: text.into(), table_id: usize::MAX, index: ColumnIndex::Unknown }
    }

    pub fn constant(value: Value) -> Self {
        Field { text: value.text(), table_id: usize::MAX, index: ColumnIndex::Constant }
    }

    pub fn row_index(table_id: usize) -> Self {
        Field { text: "rowid".to_string(), table_id, index: ColumnIndex::RowIndex }
    }

    pub fn row_number() -> Self {
        Field { text: "ROW_NUMBER".to_string(), table_id: usize::MAX, index: ColumnIndex::RowNumber }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self.index, ColumnIndex::Unknown)
    }
}

/// Date/time parts recognised by EXTRACT and mirrored by the CALENDAR
/// backend's column list (spec.md 4.2 supplement in SPEC_FULL.md).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Week,
    WeekYear,
    Weekday,
    YearDay,
    Millennium,
    Century,
    Decade,
    Quarter,
    Julian,
    MonthString,
    WeekString,
    YearDayString,
    Date,
    DateTime,
    IsLeapYear,
    IsWeekend,
}

/// Function tag (spec.md 3: "byte-encoded family + opcode"). Flattened to
/// one enum; `Unity` marks a leaf node carrying only a `Field`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Unity,
    // Arithmetic / basic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Neg,
    Concat,
    Parens,
    // Comparison (bit-encodable per spec.md 3, but EXPLAIN is the only
    // consumer of that encoding and it can just match on the variant).
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    IsNull,
    IsNotNull,
    And,
    Or,
    Not,
    // String family
    Length,
    Left,
    Right,
    Upper,
    Lower,
    Trim,
    Chr,
    Codepoint,
    Hex,
    ToHex,
    W1252,
    // Date part extraction
    Extract(DatePart),
    // Date arithmetic
    DateAdd,
    DateSub,
    DateDiff,
    MakeDate,
    MakeTime,
    MakeDatetime,
    Today,
    Now,
    Clock,
    CastInt,
    CastDuration,
    // Aggregates
    Count,
    CountStar,
    Sum,
    Avg,
    Min,
    Max,
    ListAgg,
    RowNumber,
}

impl Function {
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Function::Count
                | Function::CountStar
                | Function::Sum
                | Function::Avg
                | Function::Min
                | Function::Max
                | Function::ListAgg
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Function::Eq
                | Function::Ne
                | Function::Lt
                | Function::Le
                | Function::Gt
                | Function::Ge
        )
    }

    /// Swap direction, used when the planner normalizes a predicate to put
    /// the field on the left (spec.md 4.5 step 3).
    pub fn flip(self) -> Function {
        match self {
            Function::Lt => Function::Gt,
            Function::Le => Function::Ge,
            Function::Gt => Function::Lt,
            Function::Ge => Function::Le,
            other => other,
        }
    }

    pub fn negate(self) -> Option<Function> {
        Some(match self {
            Function::Eq => Function::Ne,
            Function::Ne => Function::Eq,
            Function::Lt => Function::Ge,
            Function::Ge => Function::Lt,
            Function::Le => Function::Gt,
            Function::Gt => Function::Le,
            _ => return None,
        })
    }
}

/// Expression tree node (spec.md 3 "Node").
#[derive(Clone, Debug)]
pub enum Node {
    /// Leaf: `Function::Unity` carrying only a field reference.
    Leaf(Field),
    /// The "self-child" optimisation: a single-argument function call
    /// where the field slot doubles as the sole child (spec.md 9).
    Unary { func: Function, arg: Box<Node>, alias: Option<String>, filter: Option<Box<Node>> },
    /// General n-ary call (n >= 1), including binary operators, `IN`
    /// expansions, `CASE`, and multi-argument builtins.
    Call { func: Function, args: Vec<Node>, alias: Option<String>, filter: Option<Box<Node>> },
}

impl Node {
    pub fn leaf(field: Field) -> Self {
        Node::Leaf(field)
    }

    pub fn constant(v: Value) -> Self {
        Node::Leaf(Field::constant(v))
    }

    pub fn unary(func: Function, arg: Node) -> Self {
        Node::Unary { func, arg: Box::new(arg), alias: None, filter: None }
    }

    pub fn binary(func: Function, lhs: Node, rhs: Node) -> Self {
        Node::Call { func, args: vec![lhs, rhs], alias: None, filter: None }
    }

    pub fn call(func: Function, args: Vec<Node>) -> Self {
        Node::Call { func, args, alias: None, filter: None }
    }

    pub fn func(&self) -> Function {
        match self {
            Node::Leaf(_) => Function::Unity,
            Node::Unary { func, .. } => *func,
            Node::Call { func, .. } => *func,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match self {
            Node::Leaf(f) => Some(f.text.as_str()),
            Node::Unary { alias, .. } => alias.as_deref(),
            Node::Call { alias, .. } => alias.as_deref(),
        }
    }

    pub fn set_alias(&mut self, name: String) {
        match self {
            Node::Leaf(f) => f.text = name,
            Node::Unary { alias, .. } => *alias = Some(name),
            Node::Call { alias, .. } => *alias = Some(name),
        }
    }

    pub fn filter(&self) -> Option<&Node> {
        match self {
            Node::Leaf(_) => None,
            Node::Unary { filter, .. } => filter.as_deref(),
            Node::Call { filter, .. } => filter.as_deref(),
        }
    }

    pub fn set_filter(&mut self, f: Node) {
        match self {
            Node::Leaf(_) => {}
            Node::Unary { filter, .. } => *filter = Some(Box::new(f)),
            Node::Call { filter, .. } => *filter = Some(Box::new(f)),
        }
    }

    /// The leaf field, for nodes that have one (leaf, or unary via its
    /// embedded child when that child is itself a leaf — used by the
    /// planner when checking "is this a bare column reference").
    pub fn as_field(&self) -> Option<&Field> {
        match self {
            Node::Leaf(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_field_mut(&mut self) -> Option<&mut Field> {
        match self {
            Node::Leaf(f) => Some(f),
            _ => None,
        }
    }

    /// Children, uniformly, regardless of representation.
    pub fn children(&self) -> Vec<&Node> {
        match self {
            Node::Leaf(_) => vec![],
            Node::Unary { arg, .. } => vec![arg.as_ref()],
            Node::Call { args, .. } => args.iter().collect(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Node> {
        match self {
            Node::Leaf(_) => vec![],
            Node::Unary { arg, .. } => vec![arg.as_mut()],
            Node::Call { args, .. } => args.iter_mut().collect(),
        }
    }

    /// True if every reachable leaf is `ColumnIndex::Constant`.
    pub fn is_constant(&self) -> bool {
        match self {
            Node::Leaf(f) => matches!(f.index, ColumnIndex::Constant),
            _ => self.children().iter().all(|c| c.is_constant()),
        }
    }

    /// True if this node or any descendant is an aggregate call (spec.md
    /// 4.5 step 6: a SELECT list containing one of these, even with no
    /// `GROUP BY`, plans as a single-bucket `GROUP` step).
    pub fn contains_aggregate(&self) -> bool {
        self.func().is_aggregate() || self.children().iter().any(|c| c.contains_aggregate())
    }

    /// Does this node reference the given table id anywhere?
    pub fn references_table(&self, table_id: usize) -> bool {
        match self {
            Node::Leaf(f) => f.table_id == table_id && !matches!(f.index, ColumnIndex::Constant),
            _ => self.children().iter().any(|c| c.references_table(table_id)),
        }
    }

    /// Set of table ids referenced anywhere in the tree.
    pub fn referenced_tables(&self, out: &mut Vec<usize>) {
        match self {
            Node::Leaf(f) if !matches!(f.index, ColumnIndex::Constant) => {
                if f.table_id != usize::MAX && !out.contains(&f.table_id) {
                    out.push(f.table_id);
                }
            }
            _ => {
                for c in self.children() {
                    c.referenced_tables(out);
                }
            }
        }
    }
}

/// `SqlError` per spec.md: function name, source position, and message.
/// Carried over from `rustdb::expr::SqlError`'s field layout, but produced
/// and propagated through `Result` (see [`crate::error`]) instead of panic
/// + `catch_unwind`.
#[derive(Clone, Debug)]
pub struct SqlError {
    pub rname: String,
    pub line: usize,
    pub column: usize,
    pub msg: String,
}

/// `ObjRef`-equivalent for csvdb: CSV tables have no schema qualifier, just
/// a name (a file stem) and the alias it's bound to in the query.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub name: String,
}

impl ObjRef {
    pub fn new(name: impl Into<String>) -> Self {
        ObjRef { name: name.into() }
    }
}

pub type RcStr = Rc<str>;
