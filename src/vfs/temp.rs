//! Session-scoped TEMP table registry (spec.md 6 "Persisted state"):
//! `CREATE TABLE ... AS` and materialized subqueries get a name that only
//! resolves within the running process, backed by a real file under the
//! OS temp directory so the existing CSV backend can serve reads from it
//! without a second in-memory table representation.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};

pub struct TempRegistry {
    dir: PathBuf,
    entries: HashMap<String, PathBuf>,
    counter: usize,
}

impl TempRegistry {
    pub fn new() -> Self {
        TempRegistry { dir: std::env::temp_dir(), entries: HashMap::new(), counter: 0 }
    }

    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        self.entries.get(name).cloned()
    }

    /// Materializes `rows` (header first) as a named temp table, writing
    /// comma-separated rows to a fresh file and registering the mapping.
    pub fn register(&mut self, name: &str, header: &[String], rows: &[Vec<String>]) -> Result<PathBuf> {
        self.counter += 1;
        let path = self.dir.join(format!("csvdb-{}-{}-{}.csv", std::process::id(), self.counter, name));
        write_csv(&path, header, rows)?;
        self.entries.insert(name.to_string(), path.clone());
        Ok(path)
    }

    pub fn remove(&mut self, name: &str) {
        if let Some(path) = self.entries.remove(name) {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl Default for TempRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TempRegistry {
    fn drop(&mut self) {
        for path in self.entries.values() {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn write_csv(path: &Path, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(header).map_err(|e| EngineError::runtime(e.to_string()))?;
    for row in rows {
        wtr.write_record(row).map_err(|e| EngineError::runtime(e.to_string()))?;
    }
    let bytes = wtr.into_inner().map_err(|e| EngineError::runtime(e.to_string()))?;
    let mut f = std::fs::File::create(path)
        .map_err(|e| EngineError::backend_open(path.display().to_string(), e.to_string()))?;
    f.write_all(&bytes).map_err(|e| EngineError::runtime(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_then_lookup_round_trips() {
        let mut reg = TempRegistry::new();
        let path = reg
            .register("t1", &["a".to_string(), "b".to_string()], &[vec!["1".to_string(), "2".to_string()]])
            .unwrap();
        assert_eq!(reg.lookup("t1"), Some(path.clone()));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("a,b"));
        reg.remove("t1");
        assert_eq!(reg.lookup("t1"), None);
    }
}
