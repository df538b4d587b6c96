//! Index search/seek/scan (C4), grounded in `original_source/src/db/indices.c`
//! and `db.c`'s binary-search helpers. Operates purely over [`IndexSource`]
//! so it is indifferent to whether the sorted key sequence is a
//! materialized two-column CSV file or CALENDAR's arithmetic `julian`/
//! `date` indexes.

use std::cmp::Ordering;
use std::ops::Range;

use crate::expr::Function;
use crate::value::compare_text;
use crate::vfs::IndexSource;

/// First position `i` with `key(i) >= target` (a standard lower bound;
/// `indices.c`'s `indexSearch`).
pub fn lower_bound(src: &dyn IndexSource, target: &str) -> usize {
    let mut lo = 0usize;
    let mut hi = src.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if compare_text(&src.key(mid), target) == Ordering::Less {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo
}

/// First position `i` with `key(i) > target`.
pub fn upper_bound(src: &dyn IndexSource, target: &str) -> usize {
    let mut lo = 0usize;
    let mut hi = src.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if compare_text(&src.key(mid), target) == Ordering::Greater {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

/// The positional range(s) an index seek must walk to satisfy a single
/// comparison against `target`. `Ne` can't be expressed as one contiguous
/// range over a sorted key sequence, so it walks both the below-target and
/// above-target halves (`indices.c`'s two-pass `!=` handling).
pub enum SeekRange {
    Span(Range<usize>),
    Split(Range<usize>, Range<usize>),
}

/// Derives the position range(s) satisfying `key <op> target` over a
/// sorted `src` (spec.md 4.5's "INDEX_RANGE" planning step; spec.md 4.6's
/// "INDEX_RANGE"/"INDEX_SCAN" execution steps).
pub fn seek(src: &dyn IndexSource, op: Function, target: &str) -> SeekRange {
    let lo = lower_bound(src, target);
    let hi = upper_bound(src, target);
    match op {
        Function::Eq => SeekRange::Span(lo..hi),
        Function::Ge => SeekRange::Span(lo..src.len()),
        Function::Gt => SeekRange::Span(hi..src.len()),
        Function::Le => SeekRange::Span(0..hi),
        Function::Lt => SeekRange::Span(0..lo),
        Function::Ne => SeekRange::Split(0..lo, hi..src.len()),
        _ => SeekRange::Span(0..src.len()),
    }
}

/// Exact lookup on a unique (or primary) index: the single matching
/// rowid, or `None` if no key equals `target`.
pub fn unique_seek(src: &dyn IndexSource, target: &str) -> Option<i64> {
    let lo = lower_bound(src, target);
    if lo < src.len() && compare_text(&src.key(lo), target) == Ordering::Equal {
        Some(src.rowid(lo))
    } else {
        None
    }
}

/// Collects rowids for every key position in `range`, in key order
/// (spec.md 4.6's INDEX_SCAN: walks the index, not the primary table).
pub fn scan(src: &dyn IndexSource, range: &SeekRange) -> Vec<i64> {
    match range {
        SeekRange::Span(r) => r.clone().map(|i| src.rowid(i)).collect(),
        SeekRange::Split(a, b) => a.clone().chain(b.clone()).map(|i| src.rowid(i)).collect(),
    }
}

/// Every rowid in the index, in key order — the degenerate case used when
/// a plan step wants a sorted full walk of the table via its index rather
/// than an unordered scan.
pub fn scan_all(src: &dyn IndexSource) -> Vec<i64> {
    (0..src.len()).map(|i| src.rowid(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture(Vec<(&'static str, i64)>);
    impl IndexSource for Fixture {
        fn len(&self) -> usize {
            self.0.len()
        }
        fn key(&self, i: usize) -> String {
            self.0[i].0.to_string()
        }
        fn rowid(&self, i: usize) -> i64 {
            self.0[i].1
        }
    }

    fn fixture() -> Fixture {
        Fixture(vec![("10", 0), ("10", 1), ("20", 2), ("30", 3), ("30", 4), ("40", 5)])
    }

    #[test]
    fn eq_spans_duplicate_keys() {
        let f = fixture();
        match seek(&f, Function::Eq, "10") {
            SeekRange::Span(r) => assert_eq!(r, 0..2),
            _ => panic!("expected span"),
        }
    }

    #[test]
    fn ne_splits_around_target() {
        let f = fixture();
        let rows = match seek(&f, Function::Ne, "20") {
            SeekRange::Split(a, b) => scan(&f, &SeekRange::Split(a, b)),
            _ => panic!("expected split"),
        };
        assert_eq!(rows, vec![0, 1, 3, 4, 5]);
    }

    #[test]
    fn range_ge() {
        let f = fixture();
        match seek(&f, Function::Ge, "20") {
            SeekRange::Span(r) => assert_eq!(scan(&f, &SeekRange::Span(r)), vec![2, 3, 4, 5]),
            _ => panic!("expected span"),
        }
    }

    #[test]
    fn unique_lookup_finds_single_row() {
        let f = Fixture(vec![("a", 0), ("b", 1), ("c", 2)]);
        assert_eq!(unique_seek(&f, "b"), Some(1));
        assert_eq!(unique_seek(&f, "z"), None);
    }
}
