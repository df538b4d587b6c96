//! VFS table adapter (C3). Each backend implements [`VfsTable`]; the
//! top-level dispatch tries a default when a backend omits a call, the
//! same shape as `rustdb::stg::Storage` giving default bodies for its
//! optional `read_multiple`.
//!
//! `open()` is a free function rather than a trait method (it has to
//! pick *which* concrete type to build), matching spec.md 4.2's framing
//! that opening is a registry lookup, not an operation any one backend
//! owns.

mod calendar;
mod csv_mem;
mod csv_stream;
mod sequence;
mod temp;
mod values;
mod view;

pub use calendar::CalendarTable;
pub use csv_mem::{open_path, CsvTable};
pub use csv_stream::CsvStreamTable;
pub use sequence::SequenceTable;
pub use temp::TempRegistry;
pub use values::ValuesTable;
pub use view::ViewTable;

use crate::error::{EngineError, Result};
// `RenamedTable` is defined directly in this module (below), not
// re-exported from a backend submodule: unlike the other backends it
// isn't a table *source*, just a naming overlay any of them can wear.
use crate::expr::Node;
use crate::query::TableSpec;

/// What kind of on-disk (or synthetic) index a backend found for a
/// column, per spec.md 4.2's `findIndex` contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexKind {
    Regular,
    Unique,
    Primary,
}

/// A sorted key source an index search/seek/scan can walk: either a
/// materialized two-column index file (`csv_mem::IndexFile`) or an
/// arithmetic one (CALENDAR's `julian`/`date` indexes need no file at
/// all). `index.rs` (C4) is written against this trait only, so it
/// never has to know which backend produced it.
pub trait IndexSource {
    fn len(&self) -> usize;
    /// The key at position `i`, in the same textual form cells compare in.
    fn key(&self, i: usize) -> String;
    /// The primary-table rowid the key at position `i` points to.
    fn rowid(&self, i: usize) -> i64;
}

pub struct FoundIndex {
    pub kind: IndexKind,
    pub source: Box<dyn IndexSource>,
}

/// Uniform table interface (spec.md 4.2). Every cell is text; callers
/// above this layer (eval.rs) are responsible for numeric/date
/// interpretation.
pub trait VfsTable {
    /// Lazily computed on first call for backends that need a scan to
    /// find out (spec.md: "streaming CSV scans once to build a
    /// line-offset table").
    fn record_count(&mut self) -> Result<usize>;

    fn field_count(&self) -> usize;
    fn field_name(&self, i: usize) -> Option<&str>;
    fn field_index(&self, name: &str) -> Option<usize> {
        (0..self.field_count()).find(|&i| self.field_name(i) == Some(name))
    }

    /// Writes the cell's text; `ROW_INDEX` columns are handled by the
    /// caller (the field never maps to a real column index).
    fn get_cell(&mut self, row: usize, col: usize) -> Result<String>;

    /// Discover an on-disk or synthetic index over `col`. Default: none.
    fn find_index(&mut self, _col: usize) -> Option<FoundIndex> {
        None
    }

    /// Backend-optimized *candidate* narrowing (spec.md: "CALENDAR narrows
    /// to a Julian range from date predicates"). Returns `Some(rowids)`
    /// only when the backend can do strictly better than a full 0..count
    /// scan; the caller still re-evaluates the complete predicate against
    /// each returned rowid, so a backend may narrow conservatively (return
    /// a superset) without risking a wrong answer. `None` tells the
    /// executor to fall back to its own generic evaluate-per-row loop
    /// (kept in exec.rs, not here, so this trait doesn't need to depend
    /// on eval.rs — see DESIGN.md).
    fn accelerated_scan(&mut self, _predicate: &Node) -> Option<Vec<i64>> {
        None
    }

    /// Plan-time sanity check (spec.md 7 "Plan-time sanity"): true if a
    /// predicate-less scan of this table would be unreasonably large.
    fn rejects_unbounded_scan(&self) -> bool {
        false
    }

    fn insert_row(&mut self, _text: &str) -> Result<()> {
        Err(EngineError::constraint("backend does not support INSERT"))
    }

    fn insert_from_query(&mut self, rows: &[Vec<String>]) -> Result<()> {
        for r in rows {
            self.insert_row(&r.join(","))?;
        }
        Ok(())
    }

    fn close(&mut self) {}
}

/// Wraps a table so its field names read as the `AS alias(col1, col2,
/// ...)` renames the parser captured on a `Table` (spec.md 4.4). Every
/// other call forwards straight to `inner` — renaming is purely a naming
/// overlay, never a reshaping of the data underneath, the same "adapter
/// forwards by default" shape `VfsTable`'s own default methods use.
pub struct RenamedTable {
    inner: Box<dyn VfsTable>,
    names: Vec<String>,
}

impl RenamedTable {
    pub fn new(inner: Box<dyn VfsTable>, names: Vec<String>) -> Self {
        RenamedTable { inner, names }
    }
}

impl VfsTable for RenamedTable {
    fn record_count(&mut self) -> Result<usize> {
        self.inner.record_count()
    }

    fn field_count(&self) -> usize {
        self.inner.field_count()
    }

    fn field_name(&self, i: usize) -> Option<&str> {
        self.names.get(i).map(String::as_str).or_else(|| self.inner.field_name(i))
    }

    fn get_cell(&mut self, row: usize, col: usize) -> Result<String> {
        self.inner.get_cell(row, col)
    }

    fn find_index(&mut self, col: usize) -> Option<FoundIndex> {
        self.inner.find_index(col)
    }

    fn accelerated_scan(&mut self, predicate: &Node) -> Option<Vec<i64>> {
        self.inner.accelerated_scan(predicate)
    }

    fn rejects_unbounded_scan(&self) -> bool {
        self.inner.rejects_unbounded_scan()
    }

    fn insert_row(&mut self, text: &str) -> Result<()> {
        self.inner.insert_row(text)
    }

    fn insert_from_query(&mut self, rows: &[Vec<String>]) -> Result<()> {
        self.inner.insert_from_query(rows)
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

/// A FROM-list table bound to its backend.
pub struct OpenTable {
    pub alias: String,
    pub table: Box<dyn VfsTable>,
}

impl OpenTable {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.table.field_index(name)
    }
}

/// Threshold (bytes) below which `open` uses the in-memory CSV backend;
/// above it, streaming re-reads (spec.md 4.2). Kept as a constant rather
/// than configurable, since the CLI's scope doesn't expose it.
pub const MEMORY_MAP_THRESHOLD: u64 = 8 * 1024 * 1024;

/// A SQL-text-in, rows-out callback the engine supplies so `.sql` view
/// files can be materialized without `vfs` depending on `exec`/`eval`.
pub type ViewMaterializer<'a> = &'a mut dyn FnMut(&str) -> Result<(Vec<String>, Vec<Vec<String>>)>;

/// Opens a FROM-list table spec against `base_dir`, trying backends in
/// the fixed order spec.md 4.2 describes.
pub fn open(
    spec: &TableSpec,
    base_dir: &std::path::Path,
    temp: &mut TempRegistry,
    materialize: ViewMaterializer<'_>,
) -> Result<Box<dyn VfsTable>> {
    log::debug!("vfs open {spec:?}");
    match spec {
        TableSpec::Calendar => Ok(Box::new(CalendarTable::new())),
        TableSpec::Sequence => Ok(Box::new(SequenceTable::new())),
        TableSpec::Values(rows) => Ok(Box::new(ValuesTable::new(rows.clone()))),
        TableSpec::Memory(path) => {
            if let Some(file) = temp.lookup(path) {
                csv_mem::open_path(&file, b',').map(|t| Box::new(t) as Box<dyn VfsTable>)
            } else {
                Err(EngineError::backend_open(path.clone(), "no such memory table"))
            }
        }
        TableSpec::Stdin { ext } => {
            let delim = delimiter_for_ext(ext);
            csv_mem::open_stdin(delim).map(|t| Box::new(t) as Box<dyn VfsTable>)
        }
        TableSpec::Named(name) => open_named(name, base_dir, materialize),
        TableSpec::Subquery(_) => {
            // Materialization happens in the planner/executor, which
            // replaces this spec with `Memory(...)` before `open` runs.
            Err(EngineError::backend_open(String::new(), "subquery must be materialized before open"))
        }
    }
}

fn open_named(name: &str, base_dir: &std::path::Path, materialize: ViewMaterializer<'_>) -> Result<Box<dyn VfsTable>> {
    if let Some(stem) = name.strip_suffix(".sql") {
        return Ok(Box::new(ViewTable::open(base_dir.join(name), stem, materialize)?));
    }
    let candidates = [
        (name.to_string(), b','),
        (format!("{name}.csv"), b','),
        (format!("{name}.tsv"), b'\t'),
        (format!("{name}.wsv"), b' '),
        (format!("{name}.sql"), 0),
    ];
    for (filename, delim) in candidates {
        let path = base_dir.join(&filename);
        if path.is_file() {
            if delim == 0 {
                let stem = filename.trim_end_matches(".sql");
                return Ok(Box::new(ViewTable::open(path, stem, materialize)?));
            }
            return open_csv_backend(&path, delim);
        }
    }
    log::warn!("no backend could open table '{name}' under {}", base_dir.display());
    Err(EngineError::backend_open(name.to_string(), "file not found"))
}

/// Picks the in-memory or streaming CSV backend by file size (spec.md 4.2:
/// "a seekable file whose size is below a configurable memory-map threshold
/// uses the in-memory CSV backend for speed, above it uses the streaming
/// CSV backend").
fn open_csv_backend(path: &std::path::Path, delim: u8) -> Result<Box<dyn VfsTable>> {
    let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    if size > MEMORY_MAP_THRESHOLD {
        log::info!("opening {} ({size} bytes) with the streaming CSV backend", path.display());
        csv_stream::CsvStreamTable::open(path, delim).map(|t| Box::new(t) as Box<dyn VfsTable>)
    } else {
        log::debug!("opening {} ({size} bytes) with the in-memory CSV backend", path.display());
        csv_mem::open_path(path, delim).map(|t| Box::new(t) as Box<dyn VfsTable>)
    }
}

fn delimiter_for_ext(ext: &str) -> u8 {
    match ext {
        "tsv" => b'\t',
        "wsv" => b' ',
        _ => b',',
    }
}
