//! End-to-end scenarios driving the public `Engine` API over real temporary
//! CSV files, the way a user invoking the `csvdb` binary would. Complements
//! the unit tests scattered through `src/` (which exercise each pipeline
//! stage in isolation) with whole-pipeline checks: parse, resolve, plan,
//! execute, one call to `Engine::run` at a time.

use std::io::Write;

use csvdb::format::{write_result, OutputFormat};
use csvdb::{Engine, StatementOutcome};

fn people_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let mut f = std::fs::File::create(dir.path().join("people.csv")).unwrap();
    writeln!(f, "id,name,score").unwrap();
    writeln!(f, "1,Ann,10").unwrap();
    writeln!(f, "2,Bob,20").unwrap();
    writeln!(f, "3,Cy,10").unwrap();
    dir
}

fn run_select(dir: &tempfile::TempDir, sql: &str) -> csvdb::exec::ExecResult {
    let mut engine = Engine::new(dir.path());
    let mut outcomes = engine.run(sql).unwrap();
    match outcomes.pop().unwrap() {
        StatementOutcome::Select(result) => result,
        _ => panic!("expected a SELECT result for: {sql}"),
    }
}

fn csv_text(result: &csvdb::exec::ExecResult) -> String {
    let mut buf = Vec::new();
    write_result(&mut buf, result, OutputFormat::Csv, true, "result").unwrap();
    String::from_utf8(buf).unwrap()
}

#[test]
fn equality_predicate_with_order_by() {
    let dir = people_dir();
    let result = run_select(&dir, "SELECT name FROM people WHERE score = 10 ORDER BY name");
    assert_eq!(csv_text(&result), "name\nAnn\nCy\n");
}

#[test]
fn count_and_sum_aggregate_over_whole_table() {
    let dir = people_dir();
    let result = run_select(&dir, "SELECT COUNT(*), SUM(score) FROM people");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0][0].text(), "3");
    assert_eq!(result.rows[0][1].text(), "40");
}

#[test]
fn order_by_desc_with_fetch_first() {
    let dir = people_dir();
    let result = run_select(&dir, "SELECT name, score FROM people ORDER BY score DESC FETCH FIRST 2 ROWS ONLY");
    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.rows[0][0].text(), "Bob");
    assert_eq!(result.rows[0][1].text(), "20");
    assert_eq!(result.rows[1][0].text(), "Ann");
    assert_eq!(result.rows[1][1].text(), "10");
}

#[test]
fn calendar_narrows_to_a_leap_february() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_select(&dir, "SELECT date FROM CALENDAR WHERE year = 2024 AND month = 2");
    assert_eq!(result.rows.len(), 29);
    assert_eq!(result.rows.first().unwrap()[0].text(), "2024-02-01");
    assert_eq!(result.rows.last().unwrap()[0].text(), "2024-02-29");
}

#[test]
fn left_join_against_a_filtered_subquery_leaves_nulls() {
    let dir = people_dir();
    let sql = "SELECT a.name, b.score FROM people a \
               LEFT JOIN (SELECT * FROM people WHERE score > 15) b ON a.id = b.id \
               ORDER BY a.id";
    let result = run_select(&dir, sql);
    assert_eq!(result.rows.len(), 3);
    assert_eq!(result.rows[0][0].text(), "Ann");
    assert!(result.rows[0][1].is_null());
    assert_eq!(result.rows[1][0].text(), "Bob");
    assert_eq!(result.rows[1][1].text(), "20");
    assert_eq!(result.rows[2][0].text(), "Cy");
    assert!(result.rows[2][1].is_null());
}

#[test]
fn explain_on_indexed_equality_reports_primary_key_unique() {
    let dir = people_dir();

    // An unnamed index falls back to the `{table}__{col}.unique.csv`
    // convention `find_index` looks for, so the planner picks it up on
    // the very next query with no extra wiring.
    let mut engine = Engine::new(dir.path());
    engine.run("CREATE UNIQUE INDEX ON people (id)").unwrap();

    let mut outcomes = engine.run("EXPLAIN SELECT * FROM people WHERE id = 2").unwrap();
    let rows = match outcomes.pop().unwrap() {
        StatementOutcome::Explain(rows) => rows,
        _ => panic!("expected EXPLAIN output"),
    };
    assert_eq!(rows.first().unwrap().operation, "INDEX UNIQUE");
}

#[test]
fn explain_without_an_index_falls_back_to_full_scan() {
    let dir = people_dir();
    let mut engine = Engine::new(dir.path());
    let mut outcomes = engine.run("EXPLAIN SELECT * FROM people WHERE id = 2").unwrap();
    let rows = match outcomes.pop().unwrap() {
        StatementOutcome::Explain(rows) => rows,
        _ => panic!("expected EXPLAIN output"),
    };
    assert_eq!(rows.first().unwrap().operation, "TABLE ACCESS FULL");
}

#[test]
fn create_table_as_then_select_matches_the_source_query() {
    let dir = people_dir();
    let mut engine = Engine::new(dir.path());
    engine.run("CREATE TABLE high_scorers AS SELECT * FROM people WHERE score >= 20").unwrap();
    let result = run_select(&dir, "SELECT name FROM high_scorers");
    assert_eq!(csv_text(&result), "name\nBob\n");
}

#[test]
fn empty_table_select_and_aggregate_boundary_cases() {
    let dir = tempfile::tempdir().unwrap();
    let mut f = std::fs::File::create(dir.path().join("empty.csv")).unwrap();
    writeln!(f, "id,score").unwrap();
    drop(f);

    let plain = run_select(&dir, "SELECT id FROM empty");
    assert_eq!(plain.rows.len(), 0);

    let agg = run_select(&dir, "SELECT COUNT(*), SUM(score), MIN(score), MAX(score) FROM empty");
    assert_eq!(agg.rows.len(), 1);
    assert_eq!(agg.rows[0][0].text(), "0");
    assert!(agg.rows[0][1].is_null());
    assert!(agg.rows[0][2].is_null());
    assert!(agg.rows[0][3].is_null());
}

#[test]
fn view_persists_and_replays_its_select_on_every_query() {
    let dir = people_dir();
    let mut engine = Engine::new(dir.path());
    engine.run("CREATE VIEW low_scorers AS SELECT name, score FROM people WHERE score < 15").unwrap();
    let result = run_select(&dir, "SELECT name FROM low_scorers ORDER BY name");
    assert_eq!(csv_text(&result), "name\nAnn\nCy\n");
}
