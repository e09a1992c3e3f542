// gsql - SQL over spreadsheet ranges from the command line

mod exit_codes;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use gridsql_config::Settings;
use gridsql_core::{CellValue, GridRef, MemoryGrid};
use gridsql_engine::{
    ConnectionRegistry, DataSource, ErrorKind, ExecuteOutcome, Session, SqlValue, TableDeclaration,
};
use tracing_subscriber::EnvFilter;

use exit_codes::{engine_exit_code, EXIT_ERROR, EXIT_INPUT, EXIT_SUCCESS, EXIT_USAGE};

/// Name of the single connection each invocation opens.
const CONNECTION: &str = "main";

#[derive(Parser)]
#[command(name = "gsql")]
#[command(about = "Query spreadsheet ranges with SQL")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load delimited files as grid tables and run a query over them
    #[command(after_help = "\
Examples:
  gsql query 'SELECT * FROM sales' --csv sales.csv --headers
  gsql query 'SELECT region, sum(amount) FROM s GROUP BY 1' --csv s=q3.csv --headers --headings
  gsql query 'SELECT * FROM t WHERE qty > ?' --csv t=stock.csv --param 10 --format json
  gsql query 'SELECT * FROM t WHERE id = :id' --csv t=stock.csv --param 7 --name :id")]
    Query {
        /// SQL text to run
        sql: String,

        /// Delimited file to expose as a table, as NAME=PATH or PATH (table named after the file). Repeatable.
        #[arg(long, value_name = "[NAME=]PATH")]
        csv: Vec<String>,

        /// Field delimiter; guessed from the file when omitted
        #[arg(long)]
        delimiter: Option<char>,

        /// First row of each file names its columns
        #[arg(long)]
        headers: bool,

        /// Print a row of column names before the results (csv output)
        #[arg(long)]
        headings: bool,

        /// Snapshot each table when it is declared instead of reading it live
        #[arg(long)]
        freeze: bool,

        /// Output format
        #[arg(long, short = 'f', value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,

        /// Parameter value, in order. Repeatable.
        #[arg(long = "param", value_name = "VALUE")]
        params: Vec<String>,

        /// Parameter name matching each --param. Repeatable.
        #[arg(long = "name", value_name = "NAME")]
        names: Vec<String>,

        /// Open this database file (read-only) instead of an in-memory one
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Run one statement against a database file
    #[command(after_help = "\
Examples:
  gsql exec --db ledger.sqlite 'CREATE TABLE entries (amount REAL)'
  gsql exec --db ledger.sqlite 'INSERT INTO entries VALUES (?)' --param 12.5")]
    Exec {
        /// Statement to run
        sql: String,

        /// Database file
        #[arg(long, env = "GSQL_DB")]
        db: PathBuf,

        /// Parameter value, in order. Repeatable.
        #[arg(long = "param", value_name = "VALUE")]
        params: Vec<String>,

        /// Parameter name matching each --param. Repeatable.
        #[arg(long = "name", value_name = "NAME")]
        names: Vec<String>,
    },

    /// Create an empty database file
    CreateDb {
        /// Path of the new file; the configured default extension is added when it has none
        path: PathBuf,

        /// Replace an existing file
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("GSQL_COMMIT"),
        ")",
        "\nengine:  gridsql-engine ",
        env!("CARGO_PKG_VERSION"),
        "\ntarget:  ",
        env!("GSQL_TARGET"),
    )
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let settings = Settings::load();

    let result = match cli.command {
        Commands::Query { sql, csv, delimiter, headers, headings, freeze, format, params, names, db } => {
            let request = QueryRequest { sql, csv, delimiter, headers, headings, freeze, format, params, names, db };
            cmd_query(settings, request)
        }
        Commands::Exec { sql, db, params, names } => cmd_exec(settings, &sql, &db, &params, &names),
        Commands::CreateDb { path, overwrite } => cmd_create_db(settings, &path, overwrite),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Diagnostics go to stderr, filtered by `GSQL_LOG` (default `warn`).
fn init_logging() {
    let filter = EnvFilter::try_from_env("GSQL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .try_init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INPUT, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<gridsql_engine::Error> for CliError {
    fn from(err: gridsql_engine::Error) -> Self {
        let code = engine_exit_code(&err);
        let hint = match err.kind() {
            ErrorKind::PermissionDenied => {
                Some("grid tables are read-only; copy rows into a regular table to change them".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

// ============================================================================
// query
// ============================================================================

struct QueryRequest {
    sql: String,
    csv: Vec<String>,
    delimiter: Option<char>,
    headers: bool,
    headings: bool,
    freeze: bool,
    format: OutputFormat,
    params: Vec<String>,
    names: Vec<String>,
    db: Option<PathBuf>,
}

fn cmd_query(settings: Settings, request: QueryRequest) -> Result<(), CliError> {
    let delimiter = request.delimiter.map(delimiter_byte).transpose()?;
    let values = parse_params(&request.params);
    let names = param_names(&request.names, values.len())?;

    let grid = Arc::new(MemoryGrid::new());
    let mut registry = ConnectionRegistry::new(grid.clone(), settings);
    let source = match &request.db {
        Some(path) => DataSource::File { path: absolute(path)?, read_only: true },
        None => DataSource::Memory,
    };
    let session = registry.open(CONNECTION, &source, false)?;

    for spec in &request.csv {
        let (table, path) = table_source(spec)?;
        load_table(session, &grid, &table, &path, delimiter, request.headers, request.freeze)?;
    }

    // JSON always carries the column names alongside the rows
    let with_headings = request.headings || request.format == OutputFormat::Json;
    let rows = session.query(&request.sql, &values, names.as_deref(), with_headings)?;
    let null_text = registry.settings().output.null_text.clone();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match request.format {
        OutputFormat::Csv => {
            let rendered = rows.iter().map(|row| row.iter().map(|v| render_text(v, &null_text)).collect::<Vec<_>>());
            gridsql_io::csv::write_rows(&mut out, rendered, b',').map_err(|e| CliError::io(e.to_string()))?;
        }
        OutputFormat::Json => {
            let json = rows_to_json(rows);
            writeln!(out, "{}", json).map_err(|e| CliError::io(e.to_string()))?;
        }
    }
    Ok(())
}

/// Import one file as a sheet and declare it as table `table`.
fn load_table(
    session: &mut Session,
    grid: &MemoryGrid,
    table: &str,
    path: &Path,
    delimiter: Option<u8>,
    headers: bool,
    freeze: bool,
) -> Result<(), CliError> {
    let import = match delimiter {
        Some(d) => gridsql_io::csv::import_with_delimiter(grid, table, path, d),
        None => gridsql_io::csv::import(grid, table, path),
    }
    .map_err(|e| CliError::input(e.to_string()))?;

    let range = import
        .range
        .ok_or_else(|| CliError::input(format!("{}: no rows to load", path.display())))?;
    let declaration = TableDeclaration::new(GridRef::new(import.sheet, range), headers, freeze);
    session.create_table(table, &declaration, false)?;
    log::debug!("declared {table} over {} ({})", path.display(), range);
    Ok(())
}

/// Split `NAME=PATH`; a bare path names its table after the file stem.
fn table_source(spec: &str) -> Result<(String, PathBuf), CliError> {
    if let Some((name, path)) = spec.split_once('=') {
        if !name.is_empty() && !path.is_empty() {
            return Ok((name.to_string(), PathBuf::from(path)));
        }
    }
    let path = PathBuf::from(spec);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| CliError::args(format!("cannot name a table after '{spec}'")))?;
    Ok((stem.to_string(), path))
}

// ============================================================================
// exec / create-db
// ============================================================================

fn cmd_exec(settings: Settings, sql: &str, db: &Path, params: &[String], names: &[String]) -> Result<(), CliError> {
    let values = parse_params(params);
    let names = param_names(names, values.len())?;

    let grid = Arc::new(MemoryGrid::new());
    let mut registry = ConnectionRegistry::new(grid, settings);
    let source = DataSource::File { path: absolute(db)?, read_only: false };
    let outcome = registry
        .open(CONNECTION, &source, false)
        .map_err(|e| CliError::from(e).with_hint("create the file first with `gsql create-db`"))?
        .execute(sql, &values, names.as_deref())?;

    let stamp = timestamp(registry.settings());
    match outcome {
        ExecuteOutcome::Changed(n) => println!("{stamp} {n} row(s) changed"),
        ExecuteOutcome::Completed => println!("{stamp} ok"),
    }
    Ok(())
}

fn cmd_create_db(settings: Settings, path: &Path, overwrite: bool) -> Result<(), CliError> {
    let path = absolute(path)?;
    let created = if path.extension().is_none() {
        path.with_extension(&settings.file.default_extension)
    } else {
        path.clone()
    };
    let existed = created.exists();

    let grid = Arc::new(MemoryGrid::new());
    let mut registry = ConnectionRegistry::new(grid, settings);
    registry.create(&path, CONNECTION, overwrite, false).map_err(|e| {
        let err = CliError::from(e);
        if existed && !overwrite {
            err.with_hint("pass --overwrite to replace it")
        } else {
            err
        }
    })?;
    registry.close(CONNECTION)?;

    println!("{} created {}", timestamp(registry.settings()), created.display());
    Ok(())
}

// ============================================================================
// helpers
// ============================================================================

fn absolute(path: &Path) -> Result<PathBuf, CliError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| CliError::io(e.to_string()))?;
    Ok(cwd.join(path))
}

fn timestamp(settings: &Settings) -> String {
    chrono::Local::now().format(&settings.output.date_format).to_string()
}

fn delimiter_byte(c: char) -> Result<u8, CliError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| CliError::args(format!("delimiter must be a single ASCII character, got '{c}'")))
}

/// Command-line parameters are typed the way a cell would type them.
fn parse_params(params: &[String]) -> Vec<SqlValue> {
    params.iter().map(|p| parse_param(p)).collect()
}

fn parse_param(text: &str) -> SqlValue {
    if let Ok(i) = text.trim().parse::<i64>() {
        return SqlValue::Integer(i);
    }
    match CellValue::from_input(text) {
        CellValue::Number(n) => SqlValue::Real(n),
        CellValue::Boolean(b) => SqlValue::Integer(b as i64),
        CellValue::Blank | CellValue::Missing => SqlValue::Null,
        _ => SqlValue::Text(text.to_string()),
    }
}

fn param_names(names: &[String], values: usize) -> Result<Option<Vec<String>>, CliError> {
    if names.is_empty() {
        return Ok(None);
    }
    if names.len() != values {
        return Err(CliError::args(format!("{} --name given for {} --param", names.len(), values)));
    }
    Ok(Some(names.to_vec()))
}

fn render_text(value: &SqlValue, null_text: &str) -> String {
    match value {
        SqlValue::Null => null_text.to_string(),
        SqlValue::Integer(i) => i.to_string(),
        SqlValue::Real(r) => CellValue::Number(*r).raw_display(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(b) => format!("x'{}'", hex(b)),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn render_json(value: SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(i) => i.into(),
        SqlValue::Real(r) => serde_json::Number::from_f64(r).map_or(serde_json::Value::Null, Into::into),
        SqlValue::Text(s) => s.into(),
        SqlValue::Blob(b) => hex(&b).into(),
    }
}

/// `{"columns": [...], "rows": [[...], ...]}` from a result whose first row is the headings.
fn rows_to_json(rows: Vec<Vec<SqlValue>>) -> serde_json::Value {
    let mut rows = rows.into_iter();
    let columns: Vec<serde_json::Value> = rows.next().unwrap_or_default().into_iter().map(render_json).collect();
    let rows: Vec<serde_json::Value> = rows
        .map(|row| serde_json::Value::Array(row.into_iter().map(render_json).collect()))
        .collect();
    serde_json::json!({ "columns": columns, "rows": rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_source() {
        let (name, path) = table_source("sales=data/q3.csv").unwrap();
        assert_eq!(name, "sales");
        assert_eq!(path, PathBuf::from("data/q3.csv"));

        let (name, path) = table_source("data/stock.tsv").unwrap();
        assert_eq!(name, "stock");
        assert_eq!(path, PathBuf::from("data/stock.tsv"));

        // a leading '=' is part of the path
        let (name, _) = table_source("=odd.csv").unwrap();
        assert_eq!(name, "=odd");
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("42"), SqlValue::Integer(42));
        assert_eq!(parse_param("2.5"), SqlValue::Real(2.5));
        assert_eq!(parse_param("TRUE"), SqlValue::Integer(1));
        assert_eq!(parse_param(""), SqlValue::Null);
        assert_eq!(parse_param("Oslo"), SqlValue::Text("Oslo".into()));
    }

    #[test]
    fn test_param_names_must_match() {
        assert_eq!(param_names(&[], 2).unwrap(), None);
        assert!(param_names(&["a".into()], 2).is_err());
        assert_eq!(param_names(&[":a".into()], 1).unwrap(), Some(vec![":a".to_string()]));
    }

    #[test]
    fn test_render_text() {
        assert_eq!(render_text(&SqlValue::Null, "NULL"), "NULL");
        assert_eq!(render_text(&SqlValue::Real(3.0), ""), "3");
        assert_eq!(render_text(&SqlValue::Real(0.25), ""), "0.25");
        assert_eq!(render_text(&SqlValue::Blob(vec![0xab, 0x01]), ""), "x'ab01'");
    }

    #[test]
    fn test_rows_to_json() {
        let json = rows_to_json(vec![
            vec![SqlValue::Text("a".into()), SqlValue::Text("b".into())],
            vec![SqlValue::Integer(1), SqlValue::Null],
        ]);
        assert_eq!(json, serde_json::json!({ "columns": ["a", "b"], "rows": [[1, null]] }));
    }

    #[test]
    fn test_delimiter_byte() {
        assert_eq!(delimiter_byte(';').unwrap(), b';');
        assert!(delimiter_byte('é').is_err());
    }
}
