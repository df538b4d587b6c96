//! `.sql` file table source (spec.md 4.2: "a `name.sql` file containing a
//! single SELECT is a view — querying it re-runs that SELECT"). Backed by
//! a [`CsvTable`] snapshot of the view's output, the same "read once, keep
//! a row cache" shape `csv_mem::CsvTable` uses for ordinary files.
//!
//! Materialization is eager, at open time: the caller supplies a closure
//! that runs a SQL string end to end (the engine's own query pipeline),
//! so `vfs` never has to import `exec`/`eval` to resolve its own views —
//! the same dependency-direction rule `accelerated_scan`'s contract
//! documents in `vfs::mod`.

use std::path::PathBuf;

use crate::error::{EngineError, Result};
use crate::vfs::{CsvTable, FoundIndex, VfsTable};

pub struct ViewTable {
    inner: CsvTable,
}

impl ViewTable {
    pub fn open(
        path: PathBuf,
        name: &str,
        materialize: &mut dyn FnMut(&str) -> Result<(Vec<String>, Vec<Vec<String>>)>,
    ) -> Result<Self> {
        let sql = std::fs::read_to_string(&path)
            .map_err(|e| EngineError::backend_open(path.display().to_string(), e.to_string()))?;
        let (header, rows) = materialize(&sql)
            .map_err(|e| EngineError::backend_open(name.to_string(), format!("view query failed: {e}")))?;
        Ok(ViewTable { inner: CsvTable::from_memory(header, rows) })
    }
}

impl VfsTable for ViewTable {
    fn record_count(&mut self) -> Result<usize> {
        self.inner.record_count()
    }

    fn field_count(&self) -> usize {
        self.inner.field_count()
    }

    fn field_name(&self, i: usize) -> Option<&str> {
        self.inner.field_name(i)
    }

    fn get_cell(&mut self, row: usize, col: usize) -> Result<String> {
        self.inner.get_cell(row, col)
    }

    fn find_index(&mut self, _col: usize) -> Option<FoundIndex> {
        None
    }
}
