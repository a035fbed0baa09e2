mod debug_report;

use curbside::{Dataset, Options, ReconcileConfig, ReconcileError, ReconcileInput, ReconcileResult, reconcile_with};
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CURBSIDE_LOG";

fn main() {
    let config = match parse_args() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    };

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();

    match run(&config) {
        Ok(result) => debug_report::print_run(&result, config.color),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

struct CliConfig {
    /// Dataset path; `None` reads stdin.
    input: Option<PathBuf>,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    color: bool,
}

fn run(cli: &CliConfig) -> Result<ReconcileResult, ReconcileError> {
    let config = match &cli.config {
        Some(path) => ReconcileConfig::from_path(path)?,
        None => ReconcileConfig::default(),
    };
    let dataset: Dataset = serde_json::from_str(&read_input(cli.input.as_ref())?)?;
    tracing::info!(segments = dataset.segments.len(), sources = dataset.sources.len(), "dataset loaded");

    let input = ReconcileInput::from_dataset(&dataset, &config);
    let result = reconcile_with(&input, &config, &Options::default())?;

    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&result)?;
        std::fs::write(path, json).map_err(|source| io_error(path, source))?;
        tracing::info!(path = %path.display(), "result written");
    }
    Ok(result)
}

fn read_input(path: Option<&PathBuf>) -> Result<String, ReconcileError> {
    match path {
        Some(path) => std::fs::read_to_string(path).map_err(|source| io_error(path, source)),
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|source| ReconcileError::Io { path: "<stdin>".into(), source })?;
            Ok(buffer)
        }
    }
}

fn io_error(path: &std::path::Path, source: io::Error) -> ReconcileError {
    ReconcileError::Io { path: path.display().to_string(), source }
}

fn parse_args() -> Result<CliConfig, String> {
    let mut input: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut color = io::stdout().is_terminal();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-V" | "--version" => {
                println!("curbside {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--color" => color = true,
            "--no-color" => color = false,
            "--config" | "-c" => {
                let value = args.next().ok_or_else(|| "error: --config expects a path".to_string())?;
                config = Some(PathBuf::from(value));
            }
            "--output" | "-o" => {
                let value = args.next().ok_or_else(|| "error: --output expects a path".to_string())?;
                output = Some(PathBuf::from(value));
            }
            // Explicit stdin.
            "-" => {}
            _ if arg.starts_with("--config=") => config = Some(PathBuf::from(arg.trim_start_matches("--config="))),
            _ if arg.starts_with("--output=") => output = Some(PathBuf::from(arg.trim_start_matches("--output="))),
            _ if arg.starts_with('-') => {
                return Err(format!("error: unknown option '{arg}'"));
            }
            _ => {
                if input.is_some() {
                    return Err("error: input provided multiple times".to_string());
                }
                input = Some(PathBuf::from(arg));
            }
        }
    }

    if input.is_none() && io::stdin().is_terminal() {
        return Err(format!("error: no input provided\n\n{}", help_text()));
    }

    Ok(CliConfig { input, config, output, color })
}

fn print_help() {
    println!("{}", help_text());
}

fn help_text() -> String {
    format!(
        "curbside {version}

Reconcile street centerlines and curb regulation feeds into blockfaces.

Usage:
  curbside [OPTIONS] <input.json>
  curbside [OPTIONS] < input.json

Input:
  {{ \"segments\": [...], \"sources\": {{ \"meter\": [...], \"sweeping\": [...], \"general\": [...] }} }}

Options:
  -c, --config <path>        JSON configuration (offset distance, fallback
                             threshold, field mapping, whitelist).
  -o, --output <path>        Write blockfaces and anomalies as JSON.
  --color                    Force ANSI color output.
  --no-color                 Disable ANSI color output.
  -h, --help                 Show this help message.
  -V, --version              Print version information.

Environment:
  {log_env}               Log filter, e.g. `curbside=debug`. Default: warn.

Exit codes:
  0  Success.
  1  Reconciliation, configuration or I/O error.
  2  Invalid arguments or missing input.
",
        version = env!("CARGO_PKG_VERSION"),
        log_env = LOG_ENV,
    )
}
