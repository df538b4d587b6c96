//! Result serialization (spec.md 6, explicitly out of the core query
//! pipeline's scope but part of the shipped binary — see SPEC_FULL.md
//! ambient-stack section). Modeled on `original_source/src/query/output.c`'s
//! "accumulate rows, then emit once in the chosen format" shape, using
//! the `csv` crate for CSV/TSV and `serde_json` for the JSON variants
//! rather than hand-rolled escaping.

use std::io::Write;

use crate::error::{EngineError, Result};
use crate::exec::ExecResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Tsv,
    Json,
    JsonArray,
    Html,
    Xml,
    Table,
    Sql,
    SqlValues,
    Record,
}

impl std::str::FromStr for OutputFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "csv" => OutputFormat::Csv,
            "tsv" => OutputFormat::Tsv,
            "json" => OutputFormat::Json,
            "json_array" => OutputFormat::JsonArray,
            "html" => OutputFormat::Html,
            "xml" => OutputFormat::Xml,
            "table" => OutputFormat::Table,
            "sql" => OutputFormat::Sql,
            "sql_values" => OutputFormat::SqlValues,
            "record" => OutputFormat::Record,
            other => return Err(EngineError::runtime(format!("unknown output format '{other}'"))),
        })
    }
}

/// Writes `result` to `out` in `format`, honoring `headers` the way
/// `-H`/`--no-headers` does (spec.md 6). `table_name` is only used by the
/// `sql`/`sql_values` formats, which need something to name the INSERT
/// target.
pub fn write_result(out: &mut dyn Write, result: &ExecResult, format: OutputFormat, headers: bool, table_name: &str) -> Result<()> {
    match format {
        OutputFormat::Csv => write_delimited(out, result, b',', headers),
        OutputFormat::Tsv => write_delimited(out, result, b'\t', headers),
        OutputFormat::Json => write_json(out, result),
        OutputFormat::JsonArray => write_json_array(out, result),
        OutputFormat::Html => write_html(out, result, headers),
        OutputFormat::Xml => write_xml(out, result),
        OutputFormat::Table => write_table(out, result, headers),
        OutputFormat::Sql => write_sql_inserts(out, result, table_name),
        OutputFormat::SqlValues => write_sql_values(out, result, table_name),
        OutputFormat::Record => write_record(out, result),
    }
}

fn write_delimited(out: &mut dyn Write, result: &ExecResult, delim: u8, headers: bool) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(delim).from_writer(out);
    if headers {
        wtr.write_record(&result.columns).map_err(|e| EngineError::runtime(e.to_string()))?;
    }
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(|v| v.text()).collect();
        wtr.write_record(&cells).map_err(|e| EngineError::runtime(e.to_string()))?;
    }
    wtr.flush().map_err(|e| EngineError::runtime(e.to_string()))
}

/// One JSON object per line (the `json` format), as distinct from
/// `json_array` which wraps the whole result set in one `[...]`.
fn write_json(out: &mut dyn Write, result: &ExecResult) -> Result<()> {
    for row in &result.rows {
        let obj = row_to_json_object(result, row);
        writeln!(out, "{}", serde_json::to_string(&obj).map_err(|e| EngineError::runtime(e.to_string()))?)
            .map_err(|e| EngineError::runtime(e.to_string()))?;
    }
    Ok(())
}

fn write_json_array(out: &mut dyn Write, result: &ExecResult) -> Result<()> {
    let objs: Vec<serde_json::Value> = result.rows.iter().map(|r| row_to_json_object(result, r)).collect();
    let text = serde_json::to_string_pretty(&objs).map_err(|e| EngineError::runtime(e.to_string()))?;
    writeln!(out, "{text}").map_err(|e| EngineError::runtime(e.to_string()))
}

fn row_to_json_object(result: &ExecResult, row: &[crate::value::Value]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, v) in result.columns.iter().zip(row) {
        map.insert(name.clone(), json_scalar(v));
    }
    serde_json::Value::Object(map)
}

fn json_scalar(v: &crate::value::Value) -> serde_json::Value {
    use crate::value::Value;
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(serde_json::Value::Number).unwrap_or(serde_json::Value::Null),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Str(s) => serde_json::Value::String(s.to_string()),
    }
}

fn write_html(out: &mut dyn Write, result: &ExecResult, headers: bool) -> Result<()> {
    writeln!(out, "<table>").map_err(io_err)?;
    if headers {
        writeln!(out, "<tr>{}</tr>", result.columns.iter().map(|c| format!("<th>{}</th>", escape_html(c))).collect::<String>())
            .map_err(io_err)?;
    }
    for row in &result.rows {
        let cells: String = row.iter().map(|v| format!("<td>{}</td>", escape_html(&v.text()))).collect();
        writeln!(out, "<tr>{cells}</tr>").map_err(io_err)?;
    }
    writeln!(out, "</table>").map_err(io_err)
}

fn write_xml(out: &mut dyn Write, result: &ExecResult) -> Result<()> {
    writeln!(out, "<rows>").map_err(io_err)?;
    for row in &result.rows {
        writeln!(out, "  <row>").map_err(io_err)?;
        for (name, v) in result.columns.iter().zip(row) {
            writeln!(out, "    <{name}>{}</{name}>", escape_html(&v.text())).map_err(io_err)?;
        }
        writeln!(out, "  </row>").map_err(io_err)?;
    }
    writeln!(out, "</rows>").map_err(io_err)
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Markdown-ish fixed-width `table` format (spec.md 6 `-F table`).
fn write_table(out: &mut dyn Write, result: &ExecResult, headers: bool) -> Result<()> {
    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();
    for row in &result.rows {
        for (i, v) in row.iter().enumerate() {
            widths[i] = widths[i].max(v.text().len());
        }
    }
    if headers {
        write_table_row(out, &result.columns, &widths)?;
        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write_table_row(out, &sep, &widths)?;
    }
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(|v| v.text()).collect();
        write_table_row(out, &cells, &widths)?;
    }
    Ok(())
}

fn write_table_row(out: &mut dyn Write, cells: &[String], widths: &[usize]) -> Result<()> {
    let padded: Vec<String> = cells.iter().zip(widths).map(|(c, w)| format!("{:<width$}", c, width = w)).collect();
    writeln!(out, "{}", padded.join(" | ")).map_err(io_err)
}

/// One `INSERT INTO <table> (cols) VALUES (...)` statement per row.
fn write_sql_inserts(out: &mut dyn Write, result: &ExecResult, table_name: &str) -> Result<()> {
    let cols = result.columns.join(", ");
    for row in &result.rows {
        let values: Vec<String> = row.iter().map(sql_literal).collect();
        writeln!(out, "INSERT INTO {table_name} ({cols}) VALUES ({});", values.join(", ")).map_err(io_err)?;
    }
    Ok(())
}

/// A single `INSERT INTO <table> (cols) VALUES (...), (...), ...;` with one
/// row tuple per result row.
fn write_sql_values(out: &mut dyn Write, result: &ExecResult, table_name: &str) -> Result<()> {
    if result.rows.is_empty() {
        return Ok(());
    }
    let cols = result.columns.join(", ");
    write!(out, "INSERT INTO {table_name} ({cols}) VALUES ").map_err(io_err)?;
    for (i, row) in result.rows.iter().enumerate() {
        if i > 0 {
            write!(out, ", ").map_err(io_err)?;
        }
        let values: Vec<String> = row.iter().map(sql_literal).collect();
        write!(out, "({})", values.join(", ")).map_err(io_err)?;
    }
    writeln!(out, ";").map_err(io_err)
}

fn sql_literal(v: &crate::value::Value) -> String {
    use crate::value::Value;
    match v {
        Value::Null => "NULL".to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        Value::Str(s) if s.is_empty() => "NULL".to_string(),
        Value::Str(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

/// `name: value` pairs, one row per block, blank line separated — the
/// format sqlite3's CLI calls `--line` and this crate calls `record`.
fn write_record(out: &mut dyn Write, result: &ExecResult) -> Result<()> {
    let width = result.columns.iter().map(|c| c.len()).max().unwrap_or(0);
    for (i, row) in result.rows.iter().enumerate() {
        if i > 0 {
            writeln!(out).map_err(io_err)?;
        }
        for (name, v) in result.columns.iter().zip(row) {
            writeln!(out, "{:width$} = {}", name, v.text(), width = width).map_err(io_err)?;
        }
    }
    Ok(())
}

fn io_err(e: std::io::Error) -> EngineError {
    EngineError::runtime(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn sample() -> ExecResult {
        ExecResult {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![vec![Value::Int(1), Value::str("Ann")], vec![Value::Int(2), Value::str("Bob")]],
        }
    }

    #[test]
    fn csv_round_trips_header_and_rows() {
        let mut buf = Vec::new();
        write_result(&mut buf, &sample(), OutputFormat::Csv, true, "t").unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "id,name\n1,Ann\n2,Bob\n");
    }

    #[test]
    fn json_emits_one_object_per_line() {
        let mut buf = Vec::new();
        write_result(&mut buf, &sample(), OutputFormat::Json, true, "t").unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("\"name\":\"Ann\""));
    }

    #[test]
    fn sql_values_single_statement() {
        let mut buf = Vec::new();
        write_result(&mut buf, &sample(), OutputFormat::SqlValues, true, "people").unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.matches("INSERT INTO").count(), 1);
        assert!(text.contains("(1, 'Ann'), (2, 'Bob')"));
    }

    #[test]
    fn format_from_str_rejects_unknown() {
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
