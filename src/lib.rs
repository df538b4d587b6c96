//! Top-level engine (ambient: database/session, SPEC_FULL.md §2). Ties the
//! leaf-first pipeline together the way `rustdb::lib::Database` wraps
//! `table.rs`/`compile.rs`/`exec.rs` behind one entry point: parse → open
//! tables (materializing subqueries and CTEs along the way) → resolve →
//! plan → execute, or one of the DDL/DML statement forms.
//!
//! The only state that outlives one statement is [`Engine`]'s
//! [`vfs::TempRegistry`] (spec.md 6 "Persisted state": a session's TEMP
//! mapping lives for the process). Everything else threads a plain
//! `&mut TempRegistry` down through the recursive pipeline rather than
//! reborrowing it off `self` at each call site: view files, subqueries
//! and CTEs all recurse back into `run_select`, and re-borrowing `self`
//! for that recursion while also holding `&mut self.temp` across the same
//! call would alias. Passing the registry as an explicit parameter avoids
//! the conflict the same way a recursive-descent parser threads its
//! token stream through every call instead of stashing it on `self`.

pub mod datetime;
pub mod error;
pub mod eval;
pub mod exec;
pub mod expr;
pub mod format;
pub mod index;
pub mod parser;
pub mod plan;
pub mod query;
pub mod render;
pub mod resolve;
pub mod rowlist;
pub mod tokenizer;
pub mod value;
pub mod vfs;

use std::path::{Path, PathBuf};

use datetime::DateTime;
use error::{EngineError, Result};
use exec::{ExecResult, Executor};
use parser::{SelectStatement, Statement};
use plan::{explain, plan_query, ExplainRow};
use query::{Query, TableSpec};
use value::Value;
use vfs::{OpenTable, TempRegistry, VfsTable};

/// One parsed statement's outcome (spec.md 6 "Process conventions": a
/// batch may mix SELECTs with DDL/DML, each producing its own result).
pub enum StatementOutcome {
    Select(ExecResult),
    Explain(Vec<ExplainRow>),
    /// DDL/DML that doesn't produce rows: a short human-readable summary
    /// (rows affected, file written, etc.), per spec.md 6's
    /// stdout/stderr split — these go to the same place a SELECT's rows
    /// would, but the CLI formats them as plain text, not a result set.
    Ack(String),
}

pub struct Engine {
    base_dir: PathBuf,
    temp: TempRegistry,
}

impl Engine {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Engine { base_dir: base_dir.into(), temp: TempRegistry::new() }
    }

    /// Parses and runs every statement in `sql`, in source order (spec.md 6:
    /// "Multiple statements separated by `;`").
    pub fn run(&mut self, sql: &str) -> Result<Vec<StatementOutcome>> {
        let statements = parser::parse(sql)?;
        let mut out = Vec::with_capacity(statements.len());
        for stmt in statements {
            out.push(self.run_statement(stmt)?);
        }
        Ok(out)
    }

    /// Runs one already-parsed statement. `Engine::run` is the batch form
    /// most callers want; this is exposed separately for the CLI, which
    /// needs to force `EXPLAIN` on a per-statement basis via `-E` before
    /// dispatch.
    pub fn execute(&mut self, stmt: Statement) -> Result<StatementOutcome> {
        self.run_statement(stmt)
    }

    fn run_statement(&mut self, stmt: Statement) -> Result<StatementOutcome> {
        let base_dir: &Path = &self.base_dir;
        let temp = &mut self.temp;
        let result = match &stmt {
            Statement::Select(select) => {
                if select.query.flags.explain {
                    log::debug!("dispatch EXPLAIN");
                    run_explain(base_dir, temp, select)
                } else {
                    log::debug!("dispatch SELECT");
                    Ok(StatementOutcome::Select(run_select(base_dir, temp, select)?))
                }
            }
            Statement::CreateTableAs { name, query } => {
                log::info!("dispatch CREATE TABLE {name} AS ...");
                create_table_as(base_dir, temp, name, query)
            }
            Statement::CreateView { name, query } => {
                log::info!("dispatch CREATE VIEW {name} AS ...");
                create_view(base_dir, name, query)
            }
            Statement::CreateIndex { name, unique, table, columns } => {
                log::info!("dispatch CREATE{} INDEX on {table}({columns:?})", if *unique { " UNIQUE" } else { "" });
                create_index(base_dir, name.clone(), *unique, table, columns)
            }
            Statement::Insert { table, query } => {
                log::info!("dispatch INSERT INTO {table}");
                insert(base_dir, temp, table, query)
            }
        };
        if let Err(e) = &result {
            log::warn!("statement failed: {e}");
        }
        result
    }

    /// Runs one SELECT end to end and returns its typed result (spec.md 4.5
    /// through 4.7: open → resolve → plan → execute). Exposed directly
    /// (bypassing the `Statement`/`StatementOutcome` wrapping) for callers
    /// — tests, the CLI's `-E` short-circuit — that already hold a parsed
    /// `SelectStatement`.
    pub fn run_select(&mut self, select: &SelectStatement) -> Result<ExecResult> {
        run_select(&self.base_dir, &mut self.temp, select)
    }
}

fn run_explain(base_dir: &Path, temp: &mut TempRegistry, select: &SelectStatement) -> Result<StatementOutcome> {
    let mut query = select.query.clone();
    let mut tables = open_tables(base_dir, temp, &select.query, &select.ctes)?;
    resolve::resolve_query(&mut query, &tables)?;
    let plan = plan_query(&query, &mut tables)?;
    Ok(StatementOutcome::Explain(explain(&plan, &mut tables)?))
}

fn run_select(base_dir: &Path, temp: &mut TempRegistry, select: &SelectStatement) -> Result<ExecResult> {
    let mut query = select.query.clone();
    let mut tables = open_tables(base_dir, temp, &select.query, &select.ctes)?;
    resolve::resolve_query(&mut query, &tables)?;
    let plan = plan_query(&query, &mut tables)?;
    let (now, now_seconds) = wall_clock();
    let mut executor = Executor::new(&mut tables, now, now_seconds);
    let result = executor.run(&plan)?;
    for t in &mut tables {
        t.table.close();
    }
    Ok(result)
}

/// Same as [`run_select`] but stringifies the result, for subquery/view/CTE
/// materialization into a temp CSV (spec.md 4.2: "a `.sql` view ...
/// materializes into an in-memory CSV").
fn run_select_text(base_dir: &Path, temp: &mut TempRegistry, select: &SelectStatement) -> Result<(Vec<String>, Vec<Vec<String>>)> {
    let result = run_select(base_dir, temp, select)?;
    let rows = result.rows.iter().map(|r| r.iter().map(Value::text).collect()).collect();
    Ok((result.columns, rows))
}

/// Opens every FROM-list table for `query`, materializing subqueries and
/// CTE references into temp files first (spec.md 3 "Table... a
/// subquery-materialized table owns its temp file until the Query is
/// destroyed").
fn open_tables(
    base_dir: &Path,
    temp: &mut TempRegistry,
    query: &Query,
    ctes: &[(String, Box<SelectStatement>)],
) -> Result<Vec<OpenTable>> {
    let mut opened = Vec::with_capacity(query.tables.len());
    for (i, t) in query.tables.iter().enumerate() {
        let registry_name = format!("t{i}_{}", t.alias);
        let spec = materialize_spec(base_dir, temp, &t.spec, ctes, &registry_name)?;
        let table = open_spec(base_dir, temp, &spec)?;
        let table = wrap_column_aliases(table, &t.column_aliases);
        opened.push(OpenTable { alias: t.alias.clone(), table });
    }
    Ok(opened)
}

/// Resolves a `TableSpec::Subquery`, or a `TableSpec::Named` that actually
/// refers to a CTE in scope, down to `TableSpec::Memory` by running it and
/// registering the output as a temp table under `registry_name` (spec.md
/// 4.4: "CTEs may not reference earlier CTEs", so this never recurses into
/// `ctes` itself). The resulting `TableSpec::Memory` holds a registry
/// *name*, resolved back to a real path by `TempRegistry::lookup` inside
/// `vfs::open` — never a bare path, so it composes with the same branch a
/// `memory:<path>` FROM-list reference written directly in SQL would take.
fn materialize_spec(
    base_dir: &Path,
    temp: &mut TempRegistry,
    spec: &TableSpec,
    ctes: &[(String, Box<SelectStatement>)],
    registry_name: &str,
) -> Result<TableSpec> {
    match spec {
        TableSpec::Subquery(inner) => {
            let (header, rows) = run_select_text(base_dir, temp, inner)?;
            temp.register(registry_name, &header, &rows)?;
            Ok(TableSpec::Memory(registry_name.to_string()))
        }
        TableSpec::Named(name) => {
            if let Some((_, inner)) = ctes.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
                let (header, rows) = run_select_text(base_dir, temp, inner)?;
                temp.register(registry_name, &header, &rows)?;
                Ok(TableSpec::Memory(registry_name.to_string()))
            } else {
                Ok(spec.clone())
            }
        }
        other => Ok(other.clone()),
    }
}

fn open_spec(base_dir: &Path, temp: &mut TempRegistry, spec: &TableSpec) -> Result<Box<dyn vfs::VfsTable>> {
    let mut materializer = |sql: &str| -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let stmt = parser::parse(sql)?;
        let select = match stmt.into_iter().next() {
            Some(Statement::Select(s)) => s,
            _ => return Err(EngineError::backend_open(String::new(), "view file must contain a single SELECT")),
        };
        // A view's own temp registrations (subqueries nested inside its
        // SELECT) get a short-lived registry scoped to this one open —
        // the view file is re-run from scratch on every open anyway, so
        // nothing needs to survive past it.
        let mut nested = TempRegistry::new();
        run_select_text(base_dir, &mut nested, &select)
    };
    vfs::open(spec, base_dir, temp, &mut materializer)
}

fn create_table_as(base_dir: &Path, temp: &mut TempRegistry, name: &str, query: &SelectStatement) -> Result<StatementOutcome> {
    let (header, rows) = run_select_text(base_dir, temp, query)?;
    let path = named_csv_path(base_dir, name);
    write_csv_file(&path, &header, &rows)?;
    Ok(StatementOutcome::Ack(format!("created table {name} ({} rows)", rows.len())))
}

fn create_view(base_dir: &Path, name: &str, query: &SelectStatement) -> Result<StatementOutcome> {
    if !query.ctes.is_empty() {
        return Err(EngineError::constraint("CREATE VIEW query may not use WITH"));
    }
    let sql = render::render_query(&query.query);
    let path = named_sql_path(base_dir, name);
    std::fs::write(&path, sql).map_err(|e| EngineError::backend_open(path.display().to_string(), e.to_string()))?;
    Ok(StatementOutcome::Ack(format!("created view {name}")))
}

/// Builds a two-column (`key`, `rowid`) index file by a full scan of
/// `table`, sorted by `columns[0]` (spec.md 6 "Index file convention": only
/// the leading column of an index file is load-bearing; a multi-column
/// `CREATE INDEX (a, b)` still only ever searches on `a` — see DESIGN.md).
fn create_index(base_dir: &Path, name: Option<String>, unique: bool, table: &str, columns: &[String]) -> Result<StatementOutcome> {
    let col_name = columns.first().ok_or_else(|| EngineError::constraint("CREATE INDEX needs at least one column"))?;
    let mut src = open_named_csv(base_dir, table)?;
    let col = src.field_index(col_name).ok_or_else(|| EngineError::resolution(format!("no such column '{col_name}'")))?;
    let n = src.record_count()?;
    let mut pairs: Vec<(String, i64)> = Vec::with_capacity(n);
    for rowid in 0..n {
        pairs.push((src.get_cell(rowid, col)?, rowid as i64));
    }
    pairs.sort_by(|a, b| value::compare_text(&a.0, &b.0));

    if unique {
        for w in pairs.windows(2) {
            if value::compare_text(&w[0].0, &w[1].0) == std::cmp::Ordering::Equal {
                return Err(EngineError::constraint(format!(
                    "UNIQUE violation building index on {table}.{col_name}: duplicate key '{}'",
                    w[0].0
                )));
            }
        }
    }

    let file_name = match name {
        Some(n) if n.ends_with(".csv") => n,
        Some(n) => format!("{n}.csv"),
        None => format!("{table}__{col_name}.{}.csv", if unique { "unique" } else { "index" }),
    };
    let path = base_dir.join(file_name);
    let header = vec![col_name.clone(), "rowid".to_string()];
    let rows: Vec<Vec<String>> = pairs.into_iter().map(|(k, r)| vec![k, r.to_string()]).collect();
    write_csv_file(&path, &header, &rows)?;
    Ok(StatementOutcome::Ack(format!("created index on {table}({col_name})")))
}

fn insert(base_dir: &Path, temp: &mut TempRegistry, table: &str, query: &SelectStatement) -> Result<StatementOutcome> {
    let (_, rows) = run_select_text(base_dir, temp, query)?;
    let mut dest = open_named_csv(base_dir, table)?;
    let n = rows.len();
    dest.insert_from_query(&rows)?;
    Ok(StatementOutcome::Ack(format!("inserted {n} row(s) into {table}")))
}

fn open_named_csv(base_dir: &Path, name: &str) -> Result<vfs::CsvTable> {
    vfs::open_path(&named_csv_path(base_dir, name), b',')
}

fn named_csv_path(base_dir: &Path, name: &str) -> PathBuf {
    let file = if name.ends_with(".csv") { name.to_string() } else { format!("{name}.csv") };
    base_dir.join(file)
}

fn named_sql_path(base_dir: &Path, name: &str) -> PathBuf {
    let file = if name.ends_with(".sql") { name.to_string() } else { format!("{name}.sql") };
    base_dir.join(file)
}

fn write_csv_file(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(header).map_err(|e| EngineError::runtime(e.to_string()))?;
    for row in rows {
        wtr.write_record(row).map_err(|e| EngineError::runtime(e.to_string()))?;
    }
    let bytes = wtr.into_inner().map_err(|e| EngineError::runtime(e.to_string()))?;
    std::fs::write(path, bytes).map_err(|e| EngineError::backend_open(path.display().to_string(), e.to_string()))
}

/// Current wall-clock time as both a broken-down [`DateTime`] (for
/// `TODAY`/`CURRENT_DATE`) and Unix seconds (for `NOW`/`CLOCK`), per
/// spec.md 4.7's `TODAY/NOW/CLOCK` function family.
fn wall_clock() -> (DateTime, i64) {
    let seconds = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    (DateTime::from_seconds(seconds), seconds)
}

/// Wraps `inner` so `field_name`/`field_index` report the `AS alias(col1,
/// col2, ...)` renames the parser captured on the `Table` (spec.md 4.4:
/// "Each table may carry `AS alias(col1, col2, ...)` renaming"). A no-op
/// pass-through when there are no renames, which is the common case.
fn wrap_column_aliases(inner: Box<dyn vfs::VfsTable>, aliases: &[String]) -> Box<dyn vfs::VfsTable> {
    if aliases.is_empty() {
        inner
    } else {
        Box::new(vfs::RenamedTable::new(inner, aliases.to_vec()))
    }
}
