//! Pulse CLI - Command-line interface for Folio Pulse
//!
//! Commands:
//! - replay: Replay a recorded event log into metrics payloads
//! - validate: Check a recorded event log for problems
//! - config: Print the default configuration
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use folio_pulse::logging::init_logging;
use folio_pulse::replay::{EventLog, Replayer};
use folio_pulse::{TelemetryConfig, TelemetryError, PRODUCER_NAME, PULSE_VERSION};

/// Pulse - behavioral telemetry engine
#[derive(Parser)]
#[command(name = "pulse")]
#[command(version = PULSE_VERSION)]
#[command(about = "Replay and inspect recorded telemetry sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded event log into metrics payloads
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Which payload to print
        #[arg(short, long, default_value = "backend")]
        output: OutputKind,

        /// Configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Fixed session id instead of a random one
        #[arg(long)]
        session_id: Option<String>,

        /// Refuse logs that fail validation
        #[arg(long)]
        strict: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Check a recorded event log for problems
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the default configuration
    Config,

    /// Diagnose configuration and environment
    Doctor {
        /// Configuration file to check
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Detect from the first character
    Auto,
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputKind {
    /// Backend wire payload
    Backend,
    /// Diagnostic snapshot
    Raw,
    /// Both, as {"raw": ..., "backend": ...}
    Both,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PulseCliError> {
    match cli.command {
        Commands::Replay {
            input,
            input_format,
            output,
            config,
            session_id,
            strict,
            pretty,
        } => cmd_replay(
            &input,
            input_format,
            output,
            config.as_deref(),
            session_id,
            strict,
            pretty,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Config => cmd_config(),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_replay(
    input: &Path,
    input_format: InputFormat,
    output: OutputKind,
    config_path: Option<&Path>,
    session_id: Option<String>,
    strict: bool,
    pretty: bool,
) -> Result<(), PulseCliError> {
    let config = load_config(config_path)?;
    init_logging(&config.logging);

    let log = read_log(input, input_format)?;
    if log.is_empty() {
        return Err(PulseCliError::NoEvents);
    }
    if strict {
        log.ensure_valid()?;
    }

    let mut replayer = Replayer::new(config);
    if let Some(id) = session_id {
        replayer = replayer.with_session_id(id);
    }
    let outcome = replayer.replay(&log);

    let value = match output {
        OutputKind::Backend => serde_json::to_value(&outcome.backend)?,
        OutputKind::Raw => serde_json::to_value(&outcome.raw)?,
        OutputKind::Both => serde_json::to_value(&outcome)?,
    };

    if pretty {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", serde_json::to_string(&value)?);
    }
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), PulseCliError> {
    let log = read_log(input, input_format)?;
    let issues = log.validate();

    let mut invalid: Vec<usize> = issues.iter().map(|i| i.index).collect();
    invalid.dedup();

    let report = ValidationReport {
        total_events: log.len(),
        valid_events: log.len() - invalid.len(),
        invalid_events: invalid.len(),
        issues,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Valid events:   {}", report.valid_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.issues.is_empty() {
            println!("\nIssues:");
            for issue in &report.issues {
                println!(
                    "  - Event {} ({} at t={}): {}",
                    issue.index, issue.kind, issue.t, issue.message
                );
            }
        }
    }

    if report.invalid_events > 0 {
        Err(PulseCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_config() -> Result<(), PulseCliError> {
    println!("{}", TelemetryConfig::default().to_json()?);
    Ok(())
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), PulseCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "pulse_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Pulse version {}", PULSE_VERSION),
    });

    match config_path {
        Some(path) if !path.exists() => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Error,
            message: format!("Configuration file {} does not exist", path.display()),
        }),
        Some(path) => match TelemetryConfig::load(path) {
            Ok(config) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Configuration valid ({} columns, top {} cells, idle {} ms)",
                    config.heatmap.cols, config.heatmap.top_n, config.scroll.idle_ms
                ),
            }),
            Err(e) => checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: format!("Invalid configuration: {}", e),
            }),
        },
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using built-in defaults".to_string(),
        }),
    }

    let log_filter = std::env::var("RUST_LOG").ok();
    checks.push(DoctorCheck {
        name: "log_filter".to_string(),
        status: CheckStatus::Ok,
        message: match log_filter {
            Some(filter) => format!("RUST_LOG={} overrides the configured level", filter),
            None => "RUST_LOG not set, configured level applies".to_string(),
        },
    });

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Warning,
            message: "stdin is a TTY ('--input -' will wait for typed events)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready for '--input -')".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: PULSE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Pulse Doctor Report");
        println!("===================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PulseCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn load_config(path: Option<&Path>) -> Result<TelemetryConfig, PulseCliError> {
    match path {
        Some(path) => Ok(TelemetryConfig::load(path)?),
        None => Ok(TelemetryConfig::default()),
    }
}

fn read_log(input: &Path, format: InputFormat) -> Result<EventLog, PulseCliError> {
    let input_data = if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(input)?
    };

    let log = match format {
        InputFormat::Auto => EventLog::parse(&input_data)?,
        InputFormat::Ndjson => EventLog::parse_ndjson(&input_data)?,
        InputFormat::Json => EventLog::parse_array(&input_data)?,
    };
    Ok(log)
}

// Error types

#[derive(Debug)]
enum PulseCliError {
    Io(io::Error),
    Telemetry(TelemetryError),
    Json(serde_json::Error),
    NoEvents,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for PulseCliError {
    fn from(e: io::Error) -> Self {
        PulseCliError::Io(e)
    }
}

impl From<TelemetryError> for PulseCliError {
    fn from(e: TelemetryError) -> Self {
        match e {
            TelemetryError::IoError(e) => PulseCliError::Io(e),
            other => PulseCliError::Telemetry(other),
        }
    }
}

impl From<serde_json::Error> for PulseCliError {
    fn from(e: serde_json::Error) -> Self {
        PulseCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PulseCliError> for CliError {
    fn from(e: PulseCliError) -> Self {
        match e {
            PulseCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PulseCliError::Telemetry(e) => {
                let (code, hint) = match &e {
                    TelemetryError::ConfigError(_) => {
                        ("CONFIG_ERROR", "Run 'pulse config' for a valid starting point")
                    }
                    TelemetryError::ValidationError(_) => {
                        ("VALIDATION_ERROR", "Run 'pulse validate' for details")
                    }
                    TelemetryError::InvalidDimensions(_) => {
                        ("DIMENSION_ERROR", "Check surface sizes in the log")
                    }
                    _ => ("PARSE_ERROR", "Ensure each event has a known 'type' and a 't' field"),
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PulseCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PulseCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            PulseCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            PulseCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    valid_events: usize,
    invalid_events: usize,
    issues: Vec<folio_pulse::replay::ValidationIssue>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
