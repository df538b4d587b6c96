//! Synthetic CALENDAR table (spec.md 4.2): 10^7 rowids, each one Julian
//! day, with 28 columns derived by arithmetic from `datetime.rs`. Field
//! list and the `getJulianRange`/`getSingleJulianRange` predicate-narrowing
//! idea are carried over from `original_source/src/db/calendar.c`.

use crate::datetime::DateTime;
use crate::error::Result;
use crate::expr::{ColumnIndex, Function, Node};
use crate::vfs::{FoundIndex, IndexKind, IndexSource, VfsTable};

/// Number of rowids CALENDAR exposes (spec.md 4.2: "10^7 rowids").
const RANGE: i64 = 10_000_000;

const FIELDS: [&str; 28] = [
    "julian",
    "date",
    "year",
    "month",
    "day",
    "weekyear",
    "week",
    "weekday",
    "yearday",
    "millenium",
    "century",
    "decade",
    "quarter",
    "firstOfYear",
    "lastOfYear",
    "firstOfQuarter",
    "lastOfQuarter",
    "firstOfMonth",
    "lastOfMonth",
    "firstOfWeek",
    "lastOfWeek",
    "isLeapYear",
    "weekdayInMonth",
    "isWeekend",
    "monthString",
    "ordinalDate",
    "weekString",
    "weekDate",
];

/// Julian day of rowid 0: the proleptic Gregorian year 1, January 1st.
fn base_julian() -> i64 {
    DateTime::new(1, 1, 1).julian()
}

pub struct CalendarTable;

impl CalendarTable {
    pub fn new() -> Self {
        CalendarTable
    }

    fn date_at(rowid: i64) -> DateTime {
        DateTime::from_julian(base_julian() + rowid)
    }
}

impl Default for CalendarTable {
    fn default() -> Self {
        Self::new()
    }
}

fn quarter_of(month: i64) -> i64 {
    (month - 1) / 3 + 1
}

fn month_bounds(year: i64, month: i64) -> (DateTime, DateTime) {
    let first = DateTime::new(year, month, 1);
    let next = if month == 12 { DateTime::new(year + 1, 1, 1) } else { DateTime::new(year, month + 1, 1) };
    let last = DateTime::from_julian(next.julian() - 1);
    (first, last)
}

fn week_bounds(dt: &DateTime) -> (DateTime, DateTime) {
    let weekday = dt.iso_weekday();
    let monday = DateTime::from_julian(dt.julian() - (weekday - 1));
    let sunday = DateTime::from_julian(monday.julian() + 6);
    (monday, sunday)
}

fn cell_for(rowid: i64, col: usize) -> String {
    let dt = CalendarTable::date_at(rowid);
    match FIELDS[col] {
        "julian" => (base_julian() + rowid).to_string(),
        "date" => dt.format_date(),
        "year" => dt.year.to_string(),
        "month" => dt.month.to_string(),
        "day" => dt.day.to_string(),
        "weekyear" => dt.iso_week_year().to_string(),
        "week" => dt.iso_week().to_string(),
        "weekday" => dt.iso_weekday().to_string(),
        "yearday" => dt.year_day().to_string(),
        "millenium" => ((dt.year - 1) / 1000 + 1).to_string(),
        "century" => ((dt.year - 1) / 100 + 1).to_string(),
        "decade" => ((dt.year / 10) * 10).to_string(),
        "quarter" => quarter_of(dt.month).to_string(),
        "firstOfYear" => DateTime::new(dt.year, 1, 1).format_date(),
        "lastOfYear" => DateTime::new(dt.year, 12, 31).format_date(),
        "firstOfQuarter" => {
            let q = quarter_of(dt.month);
            DateTime::new(dt.year, (q - 1) * 3 + 1, 1).format_date()
        }
        "lastOfQuarter" => {
            let q = quarter_of(dt.month);
            let (_, last) = month_bounds(dt.year, q * 3);
            last.format_date()
        }
        "firstOfMonth" => month_bounds(dt.year, dt.month).0.format_date(),
        "lastOfMonth" => month_bounds(dt.year, dt.month).1.format_date(),
        "firstOfWeek" => week_bounds(&dt).0.format_date(),
        "lastOfWeek" => week_bounds(&dt).1.format_date(),
        "isLeapYear" => (DateTime::is_leap_year(dt.year) as i64).to_string(),
        "weekdayInMonth" => (((dt.day - 1) / 7) + 1).to_string(),
        "isWeekend" => ((dt.iso_weekday() >= 6) as i64).to_string(),
        "monthString" => format!("{:04}-{:02}", dt.year, dt.month),
        "ordinalDate" => format!("{:04}-{:03}", dt.year, dt.year_day()),
        "weekString" => format!("{:04}-W{:02}", dt.iso_week_year(), dt.iso_week()),
        "weekDate" => format!("{:04}-W{:02}-{}", dt.iso_week_year(), dt.iso_week(), dt.iso_weekday()),
        _ => unreachable!(),
    }
}

impl VfsTable for CalendarTable {
    fn record_count(&mut self) -> Result<usize> {
        Ok(RANGE as usize)
    }

    fn field_count(&self) -> usize {
        FIELDS.len()
    }

    fn field_name(&self, i: usize) -> Option<&str> {
        FIELDS.get(i).copied()
    }

    fn get_cell(&mut self, row: usize, col: usize) -> Result<String> {
        Ok(cell_for(row as i64, col))
    }

    fn find_index(&mut self, col: usize) -> Option<FoundIndex> {
        match FIELDS.get(col).copied() {
            Some("julian") => Some(FoundIndex { kind: IndexKind::Primary, source: Box::new(JulianIndex) }),
            Some("date") => Some(FoundIndex { kind: IndexKind::Unique, source: Box::new(DateIndex) }),
            _ => None,
        }
    }

    fn accelerated_scan(&mut self, predicate: &Node) -> Option<Vec<i64>> {
        let (lo, hi) = narrow(predicate, (0, RANGE));
        if lo >= hi {
            return Some(vec![]);
        }
        Some((lo..hi).collect())
    }

    fn rejects_unbounded_scan(&self) -> bool {
        true
    }
}

/// Walks AND-joined equality/range predicates on `year`/`julian`/`date` to
/// compute a `[lo, hi)` rowid window, defaulting unconstrained endpoints to
/// `full` (spec.md 4.2's `getJulianRange`).
fn narrow(node: &Node, full: (i64, i64)) -> (i64, i64) {
    match node {
        Node::Call { func: Function::And, args, .. } if args.len() == 2 => {
            let a = narrow(&args[0], full);
            let b = narrow(&args[1], full);
            (a.0.max(b.0), a.1.min(b.1))
        }
        Node::Call { func, args, .. } if args.len() == 2 => {
            if let (Some(field), Some(lit)) = (args[0].as_field(), literal_text(&args[1])) {
                return narrow_comparison(field, *func, &lit, full);
            }
            if let (Some(lit), Some(field)) = (literal_text(&args[0]), args[1].as_field()) {
                return narrow_comparison(field, func.flip(), &lit, full);
            }
            full
        }
        _ => full,
    }
}

fn literal_text(n: &Node) -> Option<String> {
    let f = n.as_field()?;
    matches!(f.index, ColumnIndex::Constant).then(|| f.text.clone())
}

fn narrow_comparison(field: &crate::expr::Field, func: Function, value: &str, full: (i64, i64)) -> (i64, i64) {
    let col = match field.index {
        ColumnIndex::Column(c) => c,
        _ => return full,
    };
    let name = FIELDS.get(col).copied().unwrap_or("");
    let point = match name {
        "julian" => value.parse::<i64>().ok().map(|j| j - base_julian()),
        "date" => crate::datetime::parse_datetime(value).map(|d| d.julian() - base_julian()),
        "year" => value.parse::<i64>().ok().map(|y| (DateTime::new(y, 1, 1).julian() - base_julian(), DateTime::new(y, 12, 31).julian() - base_julian() + 1)).map(|(lo, _)| lo),
        _ => None,
    };
    let point = match point {
        Some(p) => p,
        None => return full,
    };
    match func {
        Function::Eq if name == "year" => {
            let year: i64 = value.parse().unwrap_or(0);
            (
                (DateTime::new(year, 1, 1).julian() - base_julian()).max(full.0),
                (DateTime::new(year + 1, 1, 1).julian() - base_julian()).min(full.1),
            )
        }
        Function::Eq => (point.max(full.0), (point + 1).min(full.1)),
        Function::Ge => (point.max(full.0), full.1),
        Function::Gt => ((point + 1).max(full.0), full.1),
        Function::Le => (full.0, (point + 1).min(full.1)),
        Function::Lt => (full.0, point.min(full.1)),
        _ => full,
    }
}

struct JulianIndex;
impl IndexSource for JulianIndex {
    fn len(&self) -> usize {
        RANGE as usize
    }
    fn key(&self, i: usize) -> String {
        (base_julian() + i as i64).to_string()
    }
    fn rowid(&self, i: usize) -> i64 {
        i as i64
    }
}

struct DateIndex;
impl IndexSource for DateIndex {
    fn len(&self) -> usize {
        RANGE as usize
    }
    fn key(&self, i: usize) -> String {
        CalendarTable::date_at(i as i64).format_date()
    }
    fn rowid(&self, i: usize) -> i64 {
        i as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rowid_zero_is_year_one() {
        let mut c = CalendarTable::new();
        assert_eq!(c.get_cell(0, 1).unwrap(), "0001-01-01");
    }

    #[test]
    fn field_list_has_28_columns() {
        assert_eq!(CalendarTable::new().field_count(), 28);
    }

    #[test]
    fn narrows_year_predicate() {
        let mut c = CalendarTable::new();
        let year_field = Node::leaf(crate::expr::Field { text: "year".into(), table_id: 0, index: ColumnIndex::Column(2) });
        let lit = Node::constant(crate::value::Value::Int(2024));
        let pred = Node::binary(Function::Eq, year_field, lit);
        let rows = c.accelerated_scan(&pred).unwrap();
        assert!(!rows.is_empty());
        let first = CalendarTable::date_at(*rows.first().unwrap());
        let last = CalendarTable::date_at(*rows.last().unwrap());
        assert_eq!(first.format_date(), "2024-01-01");
        assert_eq!(last.format_date(), "2024-12-31");
    }
}
