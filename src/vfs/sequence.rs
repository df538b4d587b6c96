//! Synthetic SEQUENCE table (spec.md 4.2): one column `n`, rowid == value,
//! bounded so an unpredicated scan is rejected the same way CALENDAR's is.

use crate::error::Result;
use crate::vfs::VfsTable;

/// Matches CALENDAR's rowid budget (spec.md doesn't give SEQUENCE its own
/// separate bound) so both synthetic backends reject a bare unbounded scan
/// for the same reason: cost, not correctness.
const RANGE: i64 = 10_000_000;

pub struct SequenceTable;

impl SequenceTable {
    pub fn new() -> Self {
        SequenceTable
    }
}

impl Default for SequenceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl VfsTable for SequenceTable {
    fn record_count(&mut self) -> Result<usize> {
        Ok(RANGE as usize)
    }

    fn field_count(&self) -> usize {
        1
    }

    fn field_name(&self, i: usize) -> Option<&str> {
        (i == 0).then_some("n")
    }

    fn get_cell(&mut self, row: usize, _col: usize) -> Result<String> {
        Ok(row.to_string())
    }

    fn rejects_unbounded_scan(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rowid_equals_value() {
        let mut s = SequenceTable::new();
        assert_eq!(s.get_cell(42, 0).unwrap(), "42");
    }

    #[test]
    fn rejects_unbounded() {
        assert!(SequenceTable::new().rejects_unbounded_scan());
    }
}
