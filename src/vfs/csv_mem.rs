//! In-memory CSV/TSV/WSV backend (spec.md 4.2): the whole file lives in
//! RAM, used when its size is below [`super::MEMORY_MAP_THRESHOLD`].
//! Quoting/escaping for comma- and tab-delimited files is delegated to
//! the `csv` crate (the ecosystem's answer to spec.md's CSV dialect
//! rules); whitespace-separated files get a small hand-rolled splitter
//! since arbitrary run-of-whitespace delimiting isn't something a
//! single-byte-delimiter CSV reader can express.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::vfs::{FoundIndex, IndexKind, IndexSource, VfsTable};

pub struct CsvTable {
    fields: Vec<String>,
    rows: Vec<Vec<String>>,
    path: Option<PathBuf>,
    delim: u8,
}

impl CsvTable {
    fn from_text(text: &str, delim: u8, path: Option<PathBuf>) -> Result<Self> {
        let text = strip_bom(text);
        let mut lines = if delim == b' ' {
            split_wsv(text)
        } else {
            split_delimited(text, delim)?
        };
        if lines.is_empty() {
            return Err(EngineError::backend_open(
                path.map(|p| p.display().to_string()).unwrap_or_default(),
                "empty file, no header row",
            ));
        }
        let fields = lines.remove(0);
        Ok(CsvTable { fields, rows: lines, path, delim })
    }

    fn stem(&self) -> Option<String> {
        self.path.as_ref().and_then(|p| p.file_stem()).map(|s| s.to_string_lossy().to_string())
    }

    /// Wraps an already-materialized result set (a view's output, or any
    /// other in-process row set) without touching the filesystem.
    pub fn from_memory(fields: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        CsvTable { fields, rows, path: None, delim: b',' }
    }
}

pub fn open_path(path: &Path, delim: u8) -> Result<CsvTable> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| EngineError::backend_open(path.display().to_string(), e.to_string()))?;
    CsvTable::from_text(&text, delim, Some(path.to_path_buf()))
}

pub fn open_stdin(delim: u8) -> Result<CsvTable> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|e| EngineError::backend_open("stdin".to_string(), e.to_string()))?;
    CsvTable::from_text(&text, delim, None)
}

fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{feff}').unwrap_or(s)
}

fn split_delimited(text: &str, delim: u8) -> Result<Vec<Vec<String>>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut out = Vec::new();
    for rec in rdr.records() {
        let rec = rec.map_err(|e| EngineError::backend_open(String::new(), e.to_string()))?;
        out.push(rec.iter().map(|f| f.to_string()).collect());
    }
    Ok(out)
}

fn split_wsv(text: &str) -> Vec<Vec<String>> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split_whitespace().map(|f| f.to_string()).collect())
        .collect()
}

impl VfsTable for CsvTable {
    fn record_count(&mut self) -> Result<usize> {
        Ok(self.rows.len())
    }

    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn field_name(&self, i: usize) -> Option<&str> {
        self.fields.get(i).map(|s| s.as_str())
    }

    fn get_cell(&mut self, row: usize, col: usize) -> Result<String> {
        Ok(self.rows.get(row).and_then(|r| r.get(col)).cloned().unwrap_or_default())
    }

    fn find_index(&mut self, col: usize) -> Option<FoundIndex> {
        let stem = self.stem()?;
        let dir = self.path.as_ref()?.parent()?;
        let col_name = self.fields.get(col)?;
        for (suffix, kind) in [(".unique.csv", IndexKind::Unique), (".index.csv", IndexKind::Regular)] {
            let candidate = dir.join(format!("{stem}__{col_name}{suffix}"));
            if candidate.is_file() {
                if let Ok(idx) = open_path(&candidate, b',') {
                    return Some(FoundIndex { kind, source: Box::new(IndexFile::new(idx)) });
                }
            }
        }
        None
    }

    fn insert_row(&mut self, text: &str) -> Result<()> {
        let row: Vec<String> = if self.delim == b' ' {
            text.split_whitespace().map(|s| s.to_string()).collect()
        } else {
            split_delimited(text, self.delim)?.into_iter().next().unwrap_or_default()
        };
        self.rows.push(row.clone());
        if let Some(path) = &self.path {
            append_row(path, &row, self.delim)?;
        }
        Ok(())
    }

    fn close(&mut self) {}
}

fn append_row(path: &Path, row: &[String], delim: u8) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(delim).from_writer(Vec::new());
    wtr.write_record(row).map_err(|e| EngineError::runtime(e.to_string()))?;
    let mut line = wtr.into_inner().map_err(|e| EngineError::runtime(e.to_string()))?;
    if !line.ends_with(b"\n") {
        line.push(b'\n');
    }
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| EngineError::backend_open(path.display().to_string(), e.to_string()))?;
    f.write_all(&line).map_err(|e| EngineError::runtime(e.to_string()))
}

/// Two-column (`key`, `rowid`) index file, column 0 sorted ascending
/// (spec.md "Index file convention").
pub struct IndexFile {
    table: CsvTable,
    rowid_col: usize,
}

impl IndexFile {
    pub fn new(table: CsvTable) -> Self {
        let rowid_col = table.field_index("rowid").unwrap_or(1);
        IndexFile { table, rowid_col }
    }
}

impl IndexSource for IndexFile {
    fn len(&self) -> usize {
        self.table.rows.len()
    }

    fn key(&self, i: usize) -> String {
        self.table.rows[i].first().cloned().unwrap_or_default()
    }

    fn rowid(&self, i: usize) -> i64 {
        self.table.rows[i].get(self.rowid_col).and_then(|s| s.parse().ok()).unwrap_or(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let mut t = CsvTable::from_text("id,name\n1,Ann\n2,Bob\n", b',', None).unwrap();
        assert_eq!(t.field_count(), 2);
        assert_eq!(t.field_index("name"), Some(1));
        assert_eq!(t.record_count().unwrap(), 2);
        assert_eq!(t.get_cell(1, 1).unwrap(), "Bob");
    }

    #[test]
    fn quoted_fields_with_escaped_quote() {
        let mut t = CsvTable::from_text("a,b\n\"hi, there\",\"she said \"\"hi\"\"\"\n", b',', None).unwrap();
        assert_eq!(t.get_cell(0, 0).unwrap(), "hi, there");
        assert_eq!(t.get_cell(0, 1).unwrap(), "she said \"hi\"");
    }

    #[test]
    fn strips_bom() {
        let mut t = CsvTable::from_text("\u{feff}id,name\n1,Ann\n", b',', None).unwrap();
        assert_eq!(t.field_name(0), Some("id"));
        assert_eq!(t.get_cell(0, 0).unwrap(), "1");
    }

    #[test]
    fn wsv_splits_on_runs_of_whitespace() {
        let mut t = CsvTable::from_text("id   name\n1    Ann\n2  Bob\n", b' ', None).unwrap();
        assert_eq!(t.get_cell(1, 1).unwrap(), "Bob");
    }
}
