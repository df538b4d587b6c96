//! CLI front end (ambient stack, SPEC_FULL.md §6). Flag list grounded in
//! `original_source/src/main.c`; parsed with `clap`'s derive macro the way
//! the rest of the ecosystem front-ends its CLIs rather than hand-rolling
//! an argv walker.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use csvdb::format::{write_result, OutputFormat};
use csvdb::{Engine, StatementOutcome};

#[derive(Parser)]
#[command(name = "csvdb", about = "SQL query engine over CSV/TSV/WSV files")]
struct Cli {
    /// SQL text to run; mutually exclusive with `-f`.
    sql: Option<String>,

    /// Read SQL from a file instead of the command line.
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Print the query plan (EXPLAIN) instead of running it.
    #[arg(short = 'E', long = "explain")]
    explain: bool,

    /// Emit a header row (on by default; redundant alongside `--no-headers`
    /// but accepted for symmetry with the flag it overrides).
    #[arg(short = 'H', long = "headers")]
    headers: bool,

    #[arg(long = "no-headers")]
    no_headers: bool,

    #[arg(short = 'F', long = "format", value_name = "FORMAT", default_value = "csv")]
    format: String,

    /// Write results here instead of stdout.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Write `stats.csv` with per-statement phase durations.
    #[arg(long = "stats")]
    stats: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("csvdb: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> csvdb::error::Result<()> {
    let sql = read_sql(&cli)?;
    let headers = cli.headers || !cli.no_headers;
    let format: OutputFormat = cli.format.parse()?;

    let base_dir = std::env::var("CSVDB_DATA_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."));
    let mut engine = Engine::new(base_dir);

    let mut stats: Vec<(String, std::time::Duration)> = Vec::new();
    let started = Instant::now();

    let statements = csvdb::parser::parse(&sql)?;
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(fs::File::create(path).map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))?),
        None => Box::new(io::stdout()),
    };

    for (i, stmt) in statements.into_iter().enumerate() {
        let label = format!("statement{}", i + 1);
        let t0 = Instant::now();
        let outcome = run_one(&mut engine, stmt, cli.explain)?;
        stats.push((label, t0.elapsed()));
        match outcome {
            StatementOutcome::Select(result) => write_result(&mut out, &result, format, headers, "result")?,
            StatementOutcome::Explain(rows) => write_explain(&mut out, &rows, headers)?,
            StatementOutcome::Ack(msg) => writeln!(out, "{msg}").map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))?,
        }
    }

    stats.push(("total".to_string(), started.elapsed()));
    if cli.stats {
        write_stats(&stats)?;
    }
    Ok(())
}

/// `-E` on the CLI forces EXPLAIN on a SELECT that didn't spell out the
/// keyword in its own SQL text.
fn run_one(engine: &mut Engine, mut stmt: csvdb::parser::Statement, force_explain: bool) -> csvdb::error::Result<StatementOutcome> {
    if force_explain {
        if let csvdb::parser::Statement::Select(select) = &mut stmt {
            select.query.flags.explain = true;
        }
    }
    engine.execute(stmt)
}

fn read_sql(cli: &Cli) -> csvdb::error::Result<String> {
    match (&cli.sql, &cli.file) {
        (Some(_), Some(_)) => Err(csvdb::error::EngineError::constraint("pass SQL as an argument or with -f, not both")),
        (Some(sql), None) => Ok(sql.clone()),
        (None, Some(path)) => {
            fs::read_to_string(path).map_err(|e| csvdb::error::EngineError::backend_open(path.display().to_string(), e.to_string()))
        }
        (None, None) => {
            use io::Read;
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))?;
            Ok(buf)
        }
    }
}

fn write_explain(out: &mut dyn Write, rows: &[csvdb::plan::ExplainRow], headers: bool) -> csvdb::error::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
    if headers {
        wtr.write_record(["ID", "Operation", "Table", "Predicate", "Rows", "Cost"])
            .map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))?;
    }
    for r in rows {
        wtr.write_record([r.id.to_string(), r.operation.to_string(), r.table.clone(), r.predicate.clone(), r.rows.to_string(), r.cost.to_string()])
            .map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))?;
    }
    let bytes = wtr.into_inner().map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))?;
    out.write_all(&bytes).map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))
}

fn write_stats(stats: &[(String, std::time::Duration)]) -> csvdb::error::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(Vec::new());
    wtr.write_record(["phase", "seconds"]).map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))?;
    for (label, dur) in stats {
        wtr.write_record([label.clone(), format!("{:.6}", dur.as_secs_f64())])
            .map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))?;
    }
    let bytes = wtr.into_inner().map_err(|e| csvdb::error::EngineError::runtime(e.to_string()))?;
    fs::write("stats.csv", bytes).map_err(|e| csvdb::error::EngineError::backend_open("stats.csv".to_string(), e.to_string()))
}
