//! rx-replay - replay a JSON-lines action log through the librx runtime

mod components;
mod error;
mod model;

use clap::Parser;
use librx::logging::LoggingConfig;
use librx::{Action, AppBuilder, Config};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use components::{Journal, Record, Recover, Watch};
use error::{ReplayError, Result};
use model::{JsonAction, JsonModel};

#[derive(Parser, Debug)]
#[command(name = "rx-replay")]
#[command(version, about = "Replay a JSON-lines action log through the librx runtime")]
#[command(long_about = r#"Replay a JSON-lines action log through the librx runtime and report what rendered.

Each non-blank line of LOG is one action. Lines starting with '#' are comments.

ACTIONS:
    {"type": "set",    "path": "a.b", "value": 1}
    {"type": "merge",  "value": {"a": {"c": 2}}}
    {"type": "delete", "path": "a.b"}
    {"type": "push",   "path": "list", "value": "x"}
    {"type": "reset"}

EXAMPLES:
    # Replay a log, watching two paths
    rx-replay --watch plot.color --watch filters actions.jsonl

    # Start from an initial document
    rx-replay --state '{"filters": []}' actions.jsonl
    rx-replay --state @initial.json actions.jsonl

    # Read actions from stdin, print render records as JSON lines
    cat actions.jsonl | rx-replay --format jsonl --watch filters -

    # Write every third action out of band
    rx-replay --save-every 3 --watch filters actions.jsonl

OUTPUT FORMATS:
    text  - One line per render, save and error, then the final state (default)
    json  - A single document: {state, sequence, renders, saves, errors}
    jsonl - One record per line

EXIT CODES:
    0 - Success
    1 - One or more actions failed while replaying
    2 - Configuration or input error (bad config, malformed line, unknown action)
"#)]
struct Cli {
    /// Action log to replay, or '-' for stdin
    #[arg(value_name = "LOG")]
    log: String,

    /// Initial state as inline JSON or @file
    #[arg(long, value_name = "JSON")]
    state: Option<String>,

    /// Coalesce store writes within this many milliseconds
    #[arg(long, value_name = "MS")]
    debounce_ms: Option<u64>,

    /// Path to watch for changes (repeatable)
    #[arg(short, long, value_name = "PATH")]
    watch: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    #[arg(value_parser = ["text", "json", "jsonl"])]
    format: String,

    /// Save every Nth action instead of dispatching it
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    save_every: Option<u64>,

    /// Config file (defaults to $RX_CONFIG or the user config directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    let mut logging = LoggingConfig::from_section(&config.logging);
    logging.verbose = cli.verbose;
    logging.init();

    tracing::debug!("rx-replay started with args: {:?}", cli);

    let initial = parse_state(cli.state.as_deref())?;
    let actions = parse_log(&read_source(&cli.log)?)?;

    let journal = Journal::default();
    let recover = Recover::default();
    let recovered = recover.counter();
    let current_line = Arc::new(AtomicUsize::new(0));

    let mut builder = AppBuilder::new(JsonModel::new(initial)).with_config(&config);
    if let Some(ms) = cli.debounce_ms {
        builder = builder.debounce(Duration::from_millis(ms));
    }
    for (index, path) in cli.watch.iter().enumerate() {
        builder = builder.component(format!("watch.{}", index), Watch::new(path.clone(), journal.clone()));
    }
    let (sink, cursor) = (journal.clone(), Arc::clone(&current_line));
    let app = builder
        .component("recover", recover)
        .print_error(move |err| {
            let line = cursor.load(Ordering::SeqCst);
            sink.push(Record::Error {
                line: (line > 0).then_some(line),
                message: err.to_string(),
            });
        })
        .build()
        .await?;

    for (index, (line, action)) in actions.into_iter().enumerate() {
        current_line.store(line, Ordering::SeqCst);
        let nth = index as u64 + 1;

        if cli.save_every.is_some_and(|every| nth % every == 0) {
            match app.save(action).await {
                Ok(sequence) => journal.push(Record::Save {
                    line,
                    sequence,
                    recovered: recovered.load(Ordering::SeqCst),
                }),
                Err(err) => journal.push(Record::Error {
                    line: Some(line),
                    message: err.to_string(),
                }),
            }
        } else {
            app.dispatch(Some(action)).await;
        }
    }

    let state: Value = (*app.get_state()).clone();
    let sequence = app.latest_sequence_id();
    app.destroy();

    print_report(&cli.format, &journal.records(), &state, sequence)?;

    match journal.errors() {
        0 => Ok(()),
        failed => Err(ReplayError::Failed(failed)),
    }
}

/// Initial document from inline JSON or `@file`
fn parse_state(arg: Option<&str>) -> Result<Value> {
    let Some(arg) = arg else {
        return Ok(json!({}));
    };
    let text = match arg.strip_prefix('@') {
        Some(path) => read_source(path)?,
        None => arg.to_string(),
    };
    let value: Value = serde_json::from_str(&text).map_err(|e| ReplayError::State(e.to_string()))?;
    if !value.is_object() {
        return Err(ReplayError::State("initial state must be a JSON object".to_string()));
    }
    Ok(value)
}

fn read_source(path: &str) -> Result<String> {
    let read_err = |source| ReplayError::Read {
        path: path.to_string(),
        source,
    };
    if path == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer).map_err(read_err)?;
        return Ok(buffer);
    }
    let expanded = shellexpand::tilde(path).to_string();
    std::fs::read_to_string(expanded).map_err(read_err)
}

/// Parse every action up front so malformed input fails before anything runs
fn parse_log(content: &str) -> Result<Vec<(usize, Action<JsonAction>)>> {
    content
        .lines()
        .enumerate()
        .map(|(index, text)| (index + 1, text.trim()))
        .filter(|(_, text)| !text.is_empty() && !text.starts_with('#'))
        .map(|(line, text)| {
            let value: Value = serde_json::from_str(text).map_err(|source| ReplayError::Json { line, source })?;
            let action = Action::from_json(value).map_err(|source| ReplayError::Action { line, source })?;
            Ok((line, action))
        })
        .collect()
}

fn print_report(format: &str, records: &[Record], state: &Value, sequence: Option<u64>) -> Result<()> {
    match format {
        "json" => {
            let renders: Vec<&Record> = records.iter().filter(|r| matches!(r, Record::Render { .. })).collect();
            let saves: Vec<&Record> = records.iter().filter(|r| matches!(r, Record::Save { .. })).collect();
            let errors: Vec<&Record> = records.iter().filter(|r| matches!(r, Record::Error { .. })).collect();
            let report = json!({
                "state": state,
                "sequence": sequence,
                "renders": renders,
                "saves": saves,
                "errors": errors,
            });
            println!("{}", serde_json::to_string_pretty(&report).map_err(librx::RxError::from)?);
        }
        "jsonl" => {
            for record in records {
                println!("{}", serde_json::to_string(record).map_err(librx::RxError::from)?);
            }
        }
        _ => {
            for record in records {
                println!("{}", describe(record));
            }
            println!("state {}", state);
        }
    }
    Ok(())
}

fn describe(record: &Record) -> String {
    let seq = |sequence: &Option<u64>| sequence.map_or_else(|| "-".to_string(), |s| s.to_string());
    match record {
        Record::Render { watch, sequence, value } => {
            format!("render {} seq={} value={}", watch, seq(sequence), value)
        }
        Record::Save {
            line,
            sequence,
            recovered,
        } => format!("save line={} seq={} recovered={}", line, seq(sequence), recovered),
        Record::Error { line: Some(line), message } => format!("error line={}: {}", line, message),
        Record::Error { line: None, message } => format!("error: {}", message),
    }
}
