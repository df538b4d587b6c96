//! Streaming CSV/TSV backend (spec.md 4.2): used above
//! [`super::MEMORY_MAP_THRESHOLD`], where reading the whole file into RAM
//! the way `csv_mem::CsvTable` does would be wasteful. Keeps only the
//! header and a lazily-built table of line *byte offsets*; `get_cell`
//! seeks to the row's offset and re-parses that one line. This is the
//! "buffered re-reads instead of true `mmap`" simplification SPEC_FULL.md
//! calls out — see DESIGN.md.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::vfs::{FoundIndex, IndexKind, VfsTable};

pub struct CsvStreamTable {
    path: PathBuf,
    delim: u8,
    fields: Vec<String>,
    /// Byte offset of the start of each data row (header excluded).
    /// `RefCell` because `record_count`/`get_cell` need to populate this
    /// lazily through a `&mut self` that's also borrowed for reading —
    /// matches spec.md 4.2's "streaming CSV scans once to build a
    /// line-offset table" on first call, not at open time.
    offsets: RefCell<Option<Vec<u64>>>,
}

impl CsvStreamTable {
    pub fn open(path: &Path, delim: u8) -> Result<Self> {
        let file = File::open(path).map_err(|e| EngineError::backend_open(path.display().to_string(), e.to_string()))?;
        let mut reader = BufReader::new(file);
        let mut header_line = String::new();
        reader
            .read_line(&mut header_line)
            .map_err(|e| EngineError::backend_open(path.display().to_string(), e.to_string()))?;
        let header_line = strip_bom(header_line.trim_end_matches(['\n', '\r']));
        if header_line.is_empty() {
            return Err(EngineError::backend_open(path.display().to_string(), "empty file, no header row"));
        }
        let fields = split_line(header_line, delim);
        Ok(CsvStreamTable { path: path.to_path_buf(), delim, fields, offsets: RefCell::new(None) })
    }

    fn ensure_offsets(&self) -> Result<()> {
        if self.offsets.borrow().is_some() {
            return Ok(());
        }
        let file = File::open(&self.path).map_err(|e| EngineError::backend_open(self.path.display().to_string(), e.to_string()))?;
        let mut reader = BufReader::new(file);
        let mut first = String::new();
        reader.read_line(&mut first).map_err(|e| EngineError::runtime(e.to_string()))?;
        let mut offsets = Vec::new();
        loop {
            let pos = reader.stream_position().map_err(|e| EngineError::runtime(e.to_string()))?;
            let mut line = String::new();
            let n = reader.read_line(&mut line).map_err(|e| EngineError::runtime(e.to_string()))?;
            if n == 0 {
                break;
            }
            if !line.trim().is_empty() {
                offsets.push(pos);
            }
        }
        *self.offsets.borrow_mut() = Some(offsets);
        Ok(())
    }

    fn read_line_at(&self, offset: u64) -> Result<String> {
        let mut file = File::open(&self.path).map_err(|e| EngineError::backend_open(self.path.display().to_string(), e.to_string()))?;
        file.seek(SeekFrom::Start(offset)).map_err(|e| EngineError::runtime(e.to_string()))?;
        let mut reader = BufReader::new(file);
        let mut line = String::new();
        reader.read_line(&mut line).map_err(|e| EngineError::runtime(e.to_string()))?;
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    fn stem(&self) -> Option<String> {
        self.path.file_stem().map(|s| s.to_string_lossy().to_string())
    }
}

fn strip_bom(s: &str) -> &str {
    s.strip_prefix('\u{feff}').unwrap_or(s)
}

/// Splits one already-dequoted-at-the-line-level record. Streaming rows are
/// parsed one at a time through the `csv` crate's reader so the same
/// quoting/escaping rules as `csv_mem` apply, just without holding the
/// whole file.
fn split_line(line: &str, delim: u8) -> Vec<String> {
    let mut rdr = csv::ReaderBuilder::new().delimiter(delim).has_headers(false).flexible(true).from_reader(line.as_bytes());
    match rdr.records().next() {
        Some(Ok(rec)) => rec.iter().map(|f| f.to_string()).collect(),
        _ => Vec::new(),
    }
}

impl VfsTable for CsvStreamTable {
    fn record_count(&mut self) -> Result<usize> {
        self.ensure_offsets()?;
        Ok(self.offsets.borrow().as_ref().unwrap().len())
    }

    fn field_count(&self) -> usize {
        self.fields.len()
    }

    fn field_name(&self, i: usize) -> Option<&str> {
        self.fields.get(i).map(|s| s.as_str())
    }

    fn get_cell(&mut self, row: usize, col: usize) -> Result<String> {
        self.ensure_offsets()?;
        let offset = {
            let offsets = self.offsets.borrow();
            *offsets.as_ref().unwrap().get(row).ok_or_else(|| EngineError::runtime(format!("row {row} out of range")))?
        };
        let line = self.read_line_at(offset)?;
        let fields = split_line(&line, self.delim);
        Ok(fields.get(col).cloned().unwrap_or_default())
    }

    fn find_index(&mut self, col: usize) -> Option<FoundIndex> {
        let stem = self.stem()?;
        let dir = self.path.parent()?;
        let col_name = self.fields.get(col)?;
        for (suffix, kind) in [(".unique.csv", IndexKind::Unique), (".index.csv", IndexKind::Regular)] {
            let candidate = dir.join(format!("{stem}__{col_name}{suffix}"));
            if candidate.is_file() {
                if let Ok(idx) = super::csv_mem::open_path(&candidate, b',') {
                    return Some(FoundIndex { kind, source: Box::new(super::csv_mem::IndexFile::new(idx)) });
                }
            }
        }
        None
    }

    fn insert_row(&mut self, text: &str) -> Result<()> {
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::backend_open(self.path.display().to_string(), e.to_string()))?;
        let mut line = text.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        f.write_all(line.as_bytes()).map_err(|e| EngineError::runtime(e.to_string()))?;
        *self.offsets.borrow_mut() = None; // line table is stale, rebuild lazily
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_header_and_rows_lazily() {
        let f = write_file("id,name\n1,Ann\n2,Bob\n");
        let mut t = CsvStreamTable::open(f.path(), b',').unwrap();
        assert_eq!(t.field_count(), 2);
        assert!(t.offsets.borrow().is_none());
        assert_eq!(t.record_count().unwrap(), 2);
        assert_eq!(t.get_cell(1, 1).unwrap(), "Bob");
    }

    #[test]
    fn quoted_rows_parse_through_csv_reader() {
        let f = write_file("a,b\n\"hi, there\",x\n");
        let mut t = CsvStreamTable::open(f.path(), b',').unwrap();
        assert_eq!(t.get_cell(0, 0).unwrap(), "hi, there");
    }

    #[test]
    fn strips_bom_from_header() {
        let f = write_file("\u{feff}id,name\n1,Ann\n");
        let t = CsvStreamTable::open(f.path(), b',').unwrap();
        assert_eq!(t.field_name(0), Some("id"));
    }
}
