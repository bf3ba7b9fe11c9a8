//! Replay CLI
//!
//! Runs a recorded scenario against live servers and prints one line per
//! step. Logging goes to stderr and honours `RUST_LOG`.
//!
//! Accepted input files:
//! - a scenario object `{ "steps": [...], "options": {...} }`
//! - a bare array of steps
//! - an OpenAPI document exported from a recording
//!
//! The exit code is 1 when any step ends in error.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use request_replay::config;
use request_replay::executor::RequestExecutor;
use request_replay::models::{ProgressEvent, Step, StepResult, StepStatus};
use request_replay::openapi;
use request_replay::replay::{
    common_base_url, ProgressSink, ReplayOptions, ReplaySession, StoreProgressSink,
};
use request_replay::storage::{JsonFileStore, CAPTURED_VARIABLES_KEY};
use request_replay::variables::VariableStore;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Replay recorded HTTP request sequences
#[derive(Parser)]
#[command(name = "replayr", version)]
#[command(about = "Replay recorded HTTP request sequences with variable capture")]
struct Cli {
    /// JSON settings file; replay settings are read from its "replay" key
    #[arg(long, global = true, env = "REPLAYR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario, step array or OpenAPI document
    Run(RunArgs),

    /// Print the steps a file would run, as JSON
    Import {
        file: PathBuf,

        /// Also print the most common origin among the step URLs
        #[arg(long)]
        base_url: bool,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    file: PathBuf,

    /// Stop after the first failing step
    #[arg(long)]
    stop_on_error: bool,

    /// Fail steps that capture anything
    #[arg(long)]
    error_on_capture: bool,

    /// Rebase every step URL onto this origin
    #[arg(long)]
    base_url: Option<String>,

    /// Print progress events and persist progress and variables
    #[arg(long)]
    track: bool,

    /// Start from the variables saved by the previous tracked run
    #[arg(long)]
    resume: bool,

    /// Storage file for tracked runs (defaults to the user config directory)
    #[arg(long, env = "REPLAYR_STORAGE")]
    storage: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long)]
    json: bool,
}

/// On-disk scenario shape.
#[derive(Deserialize)]
struct ScenarioFile {
    steps: Vec<Step>,
    #[serde(default)]
    options: ReplayOptions,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    let outcome = match load_settings(cli.config.as_deref()) {
        Ok(()) => match cli.command {
            Commands::Run(args) => run(args).await,
            Commands::Import { file, base_url } => import(&file, base_url),
        },
        Err(e) => Err(e),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };

    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let settings: JsonValue = serde_json::from_str(&text)
        .with_context(|| format!("Settings file {} is not valid JSON", path.display()))?;

    config::load_config(Some(settings)).context("Invalid replay settings")?;
    Ok(())
}

/// Reads steps and file-level options from any accepted input shape.
fn load_scenario(path: &Path) -> Result<(Vec<Step>, ReplayOptions)> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let doc: JsonValue = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;

    if openapi::is_openapi_document(&doc) {
        let steps = openapi::extract_steps(&doc)?;
        return Ok((steps, ReplayOptions::default()));
    }

    if doc.is_array() {
        let steps = serde_json::from_value(doc).context("Invalid step list")?;
        return Ok((steps, ReplayOptions::default()));
    }

    if doc.get("steps").is_some() {
        let scenario: ScenarioFile = serde_json::from_value(doc).context("Invalid scenario")?;
        return Ok((scenario.steps, scenario.options));
    }

    bail!(
        "{} is neither a scenario, a step list nor an OpenAPI document",
        path.display()
    )
}

fn import(path: &Path, show_base_url: bool) -> Result<bool> {
    let (steps, _) = load_scenario(path)?;

    println!("{}", serde_json::to_string_pretty(&steps)?);
    if show_base_url {
        match common_base_url(&steps) {
            Some(origin) => eprintln!("Most common origin: {}", origin),
            None => eprintln!("No usable origin found"),
        }
    }

    Ok(true)
}

async fn run(args: RunArgs) -> Result<bool> {
    let (steps, mut options) = load_scenario(&args.file)?;
    options.stop_on_error |= args.stop_on_error;
    options.error_on_capture |= args.error_on_capture;
    if args.base_url.is_some() {
        options.base_url = args.base_url.clone();
    }

    let executor = RequestExecutor::from_global_config().context("Failed to build HTTP client")?;

    let results = if args.track || args.resume {
        let mut store = match &args.storage {
            Some(path) => JsonFileStore::open(path.clone()),
            None => JsonFileStore::open_default(),
        }
        .context("Failed to open storage")?;

        let variables = if args.resume {
            VariableStore::load_from(&store).context("Failed to load saved variables")?
        } else {
            VariableStore::new()
        };

        let mut session = ReplaySession::with_variables(executor, variables);
        let results = if args.track {
            let mut sink = PrintingSink {
                inner: StoreProgressSink::new(&mut store),
                json: args.json,
            };
            session.replay_with_tracking(&steps, &options, &mut sink).await
        } else {
            session.replay(&steps, &options).await
        };

        session
            .variables()
            .save_to(&mut store)
            .with_context(|| format!("Failed to save {}", CAPTURED_VARIABLES_KEY))?;
        results
    } else {
        ReplaySession::new(executor).replay(&steps, &options).await
    };

    print_results(&results, args.json)?;
    Ok(!results.iter().any(StepResult::is_error))
}

/// Echoes progress to stderr while persisting it.
struct PrintingSink<S> {
    inner: S,
    json: bool,
}

impl<S: ProgressSink> ProgressSink for PrintingSink<S> {
    fn on_progress(&mut self, event: ProgressEvent) {
        if !self.json {
            let index = if event.step_index < 0 {
                "-".to_string()
            } else {
                (event.step_index + 1).to_string()
            };
            eprintln!("[{}] {}", index, event.status);
        }
        self.inner.on_progress(event);
    }
}

fn print_results(results: &[StepResult], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(results)?);
        return Ok(());
    }

    for (index, result) in results.iter().enumerate() {
        let status = result
            .response
            .as_ref()
            .map(|r| r.status.to_string())
            .unwrap_or_else(|| "---".to_string());
        println!(
            "{:>3}. [{}] {} {}",
            index + 1,
            result.status,
            status,
            result.step
        );

        if let Some(error) = &result.error {
            println!("       {}", error);
        }
        for (name, value) in &result.captured_variables {
            println!("       {} = {}", name, value);
        }
    }

    let errors = results
        .iter()
        .filter(|r| r.status == StepStatus::Error)
        .count();
    println!();
    println!("{} step(s), {} error(s)", results.len(), errors);
    Ok(())
}
