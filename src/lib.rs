pub mod db;
pub mod desk;
pub mod errors;
pub mod import;
pub mod metrics;
pub mod models;
pub mod query;
pub mod session;

use crate::desk::DeskCore;
use crate::models::{AppendNotePayload, EnrichedRecord, SearchCorpus, SearchResponse, StoredRow};
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "replenishment-desk")]
#[command(about = "Replenishment analytics for inventory exports")]
#[command(version)]
struct Cli {
    /// Directory holding the inventory database and logs
    #[arg(long, env = "REPLENISH_DATA_DIR", default_value = ".replenishment-desk")]
    data_dir: PathBuf,

    /// Print JSON instead of a table
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Enrich a CSV/JSON export and store the results
    Load { file: PathBuf },
    /// Show every stored row
    List,
    /// Search stored rows by product name, or a file preview with --file
    Search {
        query: String,
        /// Enrich this file without storing it and search the result
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Append a note to a stored row
    Note { id: i64, text: String },
    /// Show settings, or merge a JSON object into them
    Settings {
        #[arg(long)]
        set: Option<String>,
    },
    /// Interactive session
    Shell,
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("failed to create data dir {}", cli.data_dir.display()))?;
    init_tracing(&cli.data_dir).map_err(anyhow::Error::msg)?;

    let mut desk = DeskCore::new(&cli.data_dir).context("failed to open inventory store")?;
    let json = cli.json;

    match cli.command {
        Command::Load { file } => {
            let loaded = desk.load_file(&file, now()).map_err(to_client_error)?;
            show_stored(&loaded.stored, json)?;
        }
        Command::List => {
            let rows = desk.list_stored().map_err(to_client_error)?;
            show_stored(&rows, json)?;
        }
        Command::Search { query, file } => {
            let corpus = match file {
                Some(path) => {
                    desk.preview_file(&path, now()).map_err(to_client_error)?;
                    SearchCorpus::Loaded
                }
                None => {
                    desk.list_stored().map_err(to_client_error)?;
                    SearchCorpus::Stored
                }
            };
            print_search(&desk.search(&query, corpus), json)?;
        }
        Command::Note { id, text } => {
            let row = desk
                .add_note(AppendNotePayload { id, note: text })
                .map_err(to_client_error)?;
            show_stored(std::slice::from_ref(&row), json)?;
        }
        Command::Settings { set } => {
            let settings = match set {
                Some(raw) => {
                    let update: serde_json::Value =
                        serde_json::from_str(&raw).context("settings update must be a JSON object")?;
                    desk.update_settings(update).map_err(to_client_error)?
                }
                None => desk.settings().map_err(to_client_error)?,
            };
            print_json(&settings)?;
        }
        Command::Shell => {
            let stdin = std::io::stdin();
            run_shell(&mut desk, stdin.lock(), json)?;
        }
    }

    Ok(())
}

const SHELL_HELP: &str = "commands:
  load <file>            enrich and store a CSV/JSON export
  list                   show stored rows
  search <query>         search the last loaded batch
  search-stored <query>  search the last stored listing
  note <id> <text>       append a note to stored row <id>
  note #<seq> <text>     append a note to row <seq> of the last load
  quit";

fn run_shell<R: BufRead>(desk: &mut DeskCore, input: R, json: bool) -> anyhow::Result<()> {
    println!("{}", SHELL_HELP);
    prompt()?;
    for line in input.lines() {
        let line = line.context("failed to read command")?;
        let (command, rest) = split_command(&line);
        let outcome = match command {
            "" => Ok(()),
            "quit" | "exit" => break,
            "help" => {
                println!("{}", SHELL_HELP);
                Ok(())
            }
            "load" => desk
                .load_file(Path::new(rest), now())
                .map_err(to_client_error)
                .and_then(|loaded| show_loaded(&loaded.batch, json)),
            "list" => desk
                .list_stored()
                .map_err(to_client_error)
                .and_then(|rows| show_stored(&rows, json)),
            "search" => print_search(&desk.search(rest, SearchCorpus::Loaded), json),
            "search-stored" => print_search(&desk.search(rest, SearchCorpus::Stored), json),
            "note" => shell_note(desk, rest).and_then(|row| show_stored(std::slice::from_ref(&row), json)),
            other => Err(anyhow::anyhow!("unknown command '{}', try 'help'", other)),
        };
        if let Err(error) = outcome {
            eprintln!("error: {}", error);
        }
        prompt()?;
    }
    Ok(())
}

fn shell_note(desk: &mut DeskCore, rest: &str) -> anyhow::Result<StoredRow> {
    let (target, text) = split_command(rest);
    let id = match target.strip_prefix('#') {
        Some(sequence) => {
            let sequence: u32 = sequence.parse().context("row number must be a positive integer")?;
            desk.stored_id_for(sequence)
                .ok_or_else(|| anyhow::anyhow!("row #{} is not part of the last load", sequence))?
        }
        None => target.parse().context("id must be an integer")?,
    };
    desk.add_note(AppendNotePayload {
        id,
        note: text.to_string(),
    })
    .map_err(to_client_error)
}

fn split_command(line: &str) -> (&str, &str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    }
}

fn prompt() -> anyhow::Result<()> {
    print!("> ");
    std::io::stdout().flush().context("failed to flush stdout")
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}

fn show_loaded(rows: &[EnrichedRecord], json: bool) -> anyhow::Result<()> {
    if json {
        print_json(rows)
    } else {
        print_loaded(rows);
        Ok(())
    }
}

fn show_stored(rows: &[StoredRow], json: bool) -> anyhow::Result<()> {
    if json {
        print_json(rows)
    } else {
        print_stored(rows);
        Ok(())
    }
}

fn print_search(response: &SearchResponse, json: bool) -> anyhow::Result<()> {
    match response {
        SearchResponse::Loaded(rows) => show_loaded(rows, json),
        SearchResponse::Stored(rows) => show_stored(rows, json),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_loaded(rows: &[EnrichedRecord]) {
    println!(
        "{:>4}  {:<24} {:>8} {:>8} {:>8} {:>9} {:>9} {:<8} {:>8} {:>8}",
        "#", "product", "stock", "sold", "intake", "turnover", "stockout", "strategy", "holding", "reorder"
    );
    for row in rows {
        println!(
            "{:>4}  {:<24} {:>8} {:>8} {:>8} {:>9} {:>9} {:<8} {:>8} {:>8}",
            row.sequence_id,
            row.product_name,
            row.stock,
            row.units_sold,
            row.intake_total,
            row.monthly_turnover.to_string(),
            row.stockout_days.to_string(),
            row.purchase_strategy.map(|strategy| strategy.as_str()).unwrap_or(""),
            row.holding_cost.to_string(),
            row.reorder_quantity.to_string(),
        );
    }
}

fn print_stored(rows: &[StoredRow]) {
    println!(
        "{:>6}  {:<24} {:>8} {:>8} {:>8} {:>9} {:>9} {:<8} {:>8} {:>8}  notes",
        "id", "product", "stock", "sold", "intake", "turnover", "stockout", "strategy", "holding", "reorder"
    );
    for row in rows {
        println!(
            "{:>6}  {:<24} {:>8} {:>8} {:>8} {:>9} {:>9} {:<8} {:>8} {:>8}  {}",
            row.id,
            row.product_name,
            row.stock,
            row.units_sold,
            row.intake_total,
            row.monthly_turnover.to_string(),
            row.stockout_days.to_string(),
            row.purchase_strategy.map(|strategy| strategy.as_str()).unwrap_or(""),
            row.holding_cost.to_string(),
            row.reorder_quantity.to_string(),
            row.notes.replace('\n', " | "),
        );
    }
}

fn init_tracing(data_dir: &Path) -> Result<(), String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "desk.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())
}

fn to_client_error(error: impl std::fmt::Display) -> anyhow::Error {
    anyhow::anyhow!("{}", error)
}
