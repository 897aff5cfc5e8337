//! Observer CLI - Command-line interface for the activity observer
//!
//! Commands:
//! - replay: Drive an observer through a recorded page session
//! - validate: Validate a page.signal.v1 recording
//! - doctor: Diagnose configuration and environment
//! - schema: Describe the recording and event formats

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use activity_observer::config::ObserverConfig;
use activity_observer::replay::{replay, ReplayOptions};
use activity_observer::signal::{PageRecording, RecordingAdapter, SIGNAL_SCHEMA_VERSION};
use activity_observer::transport::{MemoryTransport, ReqwestTransport, Transport};
use activity_observer::types::ActivityAction;
use activity_observer::{ObserverError, OBSERVER_VERSION, PRODUCER_NAME};

/// Observer - Page activity instrumentation
#[derive(Parser)]
#[command(name = "observer")]
#[command(version = OBSERVER_VERSION)]
#[command(about = "Replay and inspect page activity recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded page session through an observer
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Base URL of the collection endpoint (defaults to the page origin)
        #[arg(long)]
        endpoint_base: Option<String>,

        /// Print events as NDJSON instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Observer configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the collection endpoint path
        #[arg(long)]
        endpoint_path: Option<String>,

        /// Override the search debounce in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Playback speed (2 plays twice as fast)
        #[arg(long, default_value = "1.0")]
        speed: f64,
    },

    /// Validate a recording
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "json")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check an observer configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,

        /// Output as JSON schema
        #[arg(long)]
        json_schema: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Single JSON document
    Json,
    /// Header line, then one signal per line
    Ndjson,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (page.signal.v1)
    Input,
    /// Output: activity events sent to the collection endpoint
    Output,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), ObserverCliError> {
    match cli.command {
        Commands::Replay {
            input,
            input_format,
            endpoint_base,
            dry_run,
            config,
            endpoint_path,
            debounce_ms,
            speed,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(path) = endpoint_path {
                config = config.with_endpoint_path(path);
            }
            if let Some(ms) = debounce_ms {
                config.search_debounce_ms = ms;
            }
            config.validate()?;

            cmd_replay(
                &input,
                input_format,
                endpoint_base.as_deref(),
                dry_run,
                config,
                speed,
            )
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),

        Commands::Schema {
            schema_type,
            json_schema,
        } => cmd_schema(schema_type, json_schema),
    }
}

fn cmd_replay(
    input: &Path,
    input_format: InputFormat,
    endpoint_base: Option<&str>,
    dry_run: bool,
    config: ObserverConfig,
    speed: f64,
) -> Result<(), ObserverCliError> {
    let recording = read_recording(input, input_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let options = ReplayOptions::with_speed(speed);

    let summary = if dry_run {
        let memory = Arc::new(MemoryTransport::new());
        let summary = runtime.block_on(replay(recording, memory.clone(), config, options))?;

        let stdout = io::stdout();
        let mut out = stdout.lock();
        for delivery in memory.deliveries() {
            writeln!(out, "{}", delivery.body)?;
        }
        out.flush()?;
        summary
    } else {
        let transport: Arc<dyn Transport> = match endpoint_base {
            Some(base) => Arc::new(ReqwestTransport::new(base)?),
            None => Arc::new(ReqwestTransport::for_page(&recording.page.href)?),
        };
        runtime.block_on(replay(recording, transport, config, options))?
    };

    eprintln!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), ObserverCliError> {
    let recording = read_recording(input, input_format)?;

    let header_error = recording.validate().err().map(|e| e.to_string());
    let results = RecordingAdapter::validate_signals(&recording);

    let report = ValidationReport {
        schema_version: recording.schema_version.clone(),
        header_error,
        total_signals: recording.signals.len(),
        valid_signals: recording.signals.len() - results.len(),
        invalid_signals: results.len(),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                signal_type: r.kind.to_string(),
                at_ms: r.at_ms,
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Page:            {}", recording.page.href);
        if let Some(err) = &report.header_error {
            println!("Header:          {}", err);
        }
        println!("Total signals:   {}", report.total_signals);
        println!("Valid signals:   {}", report.valid_signals);
        println!("Invalid signals: {}", report.invalid_signals);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!(
                    "  - Signal {} ({} at {}ms): {}",
                    err.index, err.signal_type, err.at_ms, err.error
                );
            }
        }
    }

    if report.header_error.is_some() || report.invalid_signals > 0 {
        Err(ObserverCliError::ValidationFailed(
            report.invalid_signals + usize::from(report.header_error.is_some()),
        ))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), ObserverCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "observer_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Observer version {}", OBSERVER_VERSION),
    });

    checks.push(DoctorCheck {
        name: "schema_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Recording schema: {}", SIGNAL_SCHEMA_VERSION),
    });

    let config_check = match config {
        None => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "No config file given, using defaults".to_string(),
        },
        Some(path) if !path.exists() => DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist".to_string(),
        },
        Some(path) => match load_config(Some(path)) {
            Ok(config) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "Config valid (endpoint {}, excluded prefix {:?}, {} tracked request paths)",
                    config.endpoint_path,
                    config.excluded_path_prefix,
                    config.tracked_request_paths.len()
                ),
            },
            Err(e) => DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: CliError::from(e).message,
            },
        },
    };
    checks.push(config_check);

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass recordings with --input)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: OBSERVER_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Observer Doctor Report");
        println!("======================");
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
        Err(ObserverCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType, json_schema: bool) -> Result<(), ObserverCliError> {
    match schema_type {
        SchemaType::Input => {
            if json_schema {
                println!("{}", get_input_json_schema());
            } else {
                println!("Input Schema: {}", SIGNAL_SCHEMA_VERSION);
                println!();
                println!("A recording holds one page load:");
                println!();
                println!("- page: {{ href, title, referrer, screen, viewport, cookie, input_fields }}");
                println!("- signals: Array of {{ at_ms, signal }}, at_ms non-decreasing");
                println!();
                println!("Signal types:");
                println!("  scroll         {{ scroll_top, scroll_height, client_height }}");
                println!("  click          {{ tag_name, input_type, text_content, value, href, id, class_name, role }}");
                println!("  submit         {{ id, class_name, action, field_count }}");
                println!("  input          {{ field, value }} (field must be a page input key)");
                println!("  before_unload  {{}}");
                println!("  fetch          {{ url, method, latency_ms, status | error }}");
                println!();
                println!("NDJSON form: first line {{ schema_version, page }}, then one signal per line.");
            }
        }
        SchemaType::Output => {
            if json_schema {
                println!("{}", get_output_json_schema());
            } else {
                println!("Output: activity events");
                println!();
                println!("Every event carries action, timestamp (ISO-8601) and url, plus:");
                println!();
                for action in ActivityAction::known() {
                    println!("  {:<15} {}", action.as_str(), event_fields(&action));
                }
                println!();
                println!("session_end is sent as a beacon without the CSRF header.");
            }
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &Path) -> Result<String, ObserverCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn read_recording(input: &Path, input_format: InputFormat) -> Result<PageRecording, ObserverCliError> {
    let data = read_input(input)?;
    let recording = match input_format {
        InputFormat::Json => RecordingAdapter::parse_json(&data)?,
        InputFormat::Ndjson => RecordingAdapter::parse_ndjson(&data)?,
    };
    Ok(recording)
}

fn load_config(path: Option<&Path>) -> Result<ObserverConfig, ObserverCliError> {
    match path {
        Some(path) => Ok(ObserverConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(ObserverConfig::default()),
    }
}

fn event_fields(action: &ActivityAction) -> &'static str {
    match action {
        ActivityAction::PageView => "page_title, page_url, referrer, screen_resolution, viewport",
        ActivityAction::ButtonClick => "element, scroll_depth",
        ActivityAction::FormSubmitted => "form_id, form_action, field_count",
        ActivityAction::SearchInput => "query, partial",
        ActivityAction::SessionEnd => "time_on_page, max_scroll_depth",
        ActivityAction::AjaxRequest => "url, method, response_time, status",
        ActivityAction::AjaxError => "url, error",
        ActivityAction::Other(_) => "",
    }
}

fn get_input_json_schema() -> String {
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": SIGNAL_SCHEMA_VERSION,
        "description": "Recorded page session",
        "type": "object",
        "required": ["schema_version", "page"],
        "properties": {
            "schema_version": { "type": "string", "const": SIGNAL_SCHEMA_VERSION },
            "recorded_at": { "type": "string", "format": "date-time" },
            "page": {
                "type": "object",
                "required": ["href"],
                "properties": {
                    "href": { "type": "string", "format": "uri" },
                    "title": { "type": "string" },
                    "referrer": { "type": "string" },
                    "screen": { "$ref": "#/$defs/dimensions" },
                    "viewport": { "$ref": "#/$defs/dimensions" },
                    "cookie": { "type": "string" },
                    "input_fields": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["key"],
                            "properties": {
                                "key": { "type": "string" },
                                "input_type": { "type": "string" },
                                "name": { "type": "string" },
                                "id": { "type": "string" }
                            }
                        }
                    }
                }
            },
            "signals": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["at_ms", "signal"],
                    "properties": {
                        "at_ms": { "type": "integer", "minimum": 0 },
                        "signal": {
                            "type": "object",
                            "required": ["type"],
                            "properties": {
                                "type": {
                                    "type": "string",
                                    "enum": ["scroll", "click", "submit", "input", "before_unload", "fetch"]
                                }
                            }
                        }
                    }
                }
            }
        },
        "$defs": {
            "dimensions": {
                "type": "object",
                "properties": {
                    "width": { "type": "integer", "minimum": 0 },
                    "height": { "type": "integer", "minimum": 0 }
                }
            }
        }
    })
    .to_string()
}

fn get_output_json_schema() -> String {
    let known = ActivityAction::known();
    let actions: Vec<&str> = known.iter().map(|a| a.as_str()).collect();
    serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": "activity event",
        "description": "Body POSTed to the collection endpoint",
        "type": "object",
        "required": ["action", "timestamp", "url"],
        "properties": {
            "action": { "type": "string", "enum": actions },
            "timestamp": { "type": "string", "format": "date-time" },
            "url": { "type": "string" },
            "page_title": { "type": "string" },
            "page_url": { "type": "string" },
            "referrer": { "type": "string" },
            "screen_resolution": { "type": "string" },
            "viewport": { "type": "string" },
            "element": { "type": "string" },
            "scroll_depth": { "type": "integer", "minimum": 0, "maximum": 100 },
            "form_id": { "type": "string" },
            "form_action": { "type": "string" },
            "field_count": { "type": "integer", "minimum": 0 },
            "query": { "type": "string" },
            "partial": { "type": "boolean" },
            "time_on_page": { "type": "integer", "minimum": 0 },
            "max_scroll_depth": { "type": "integer", "minimum": 0, "maximum": 100 },
            "method": { "type": "string" },
            "response_time": { "type": "integer", "minimum": 0 },
            "status": { "type": "integer" },
            "error": { "type": "string" }
        }
    })
    .to_string()
}

// Error types

#[derive(Debug)]
enum ObserverCliError {
    Io(io::Error),
    Observer(ObserverError),
    Json(serde_json::Error),
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for ObserverCliError {
    fn from(e: io::Error) -> Self {
        ObserverCliError::Io(e)
    }
}

impl From<ObserverError> for ObserverCliError {
    fn from(e: ObserverError) -> Self {
        ObserverCliError::Observer(e)
    }
}

impl From<serde_json::Error> for ObserverCliError {
    fn from(e: serde_json::Error) -> Self {
        ObserverCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<ObserverCliError> for CliError {
    fn from(e: ObserverCliError) -> Self {
        match e {
            ObserverCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            ObserverCliError::Observer(e) => {
                let (code, hint) = match &e {
                    ObserverError::ParseError(_) | ObserverError::JsonError(_) => (
                        "PARSE_ERROR",
                        "Ensure input matches the page.signal.v1 schema",
                    ),
                    ObserverError::InvalidSignal(_) => {
                        ("VALIDATION_ERROR", "Run 'observer validate' for details")
                    }
                    ObserverError::InvalidConfig(_) => {
                        ("CONFIG_ERROR", "Run 'observer doctor --config <file>'")
                    }
                    ObserverError::InvalidUrl(_) => {
                        ("URL_ERROR", "Check --endpoint-base and the recorded page href")
                    }
                    ObserverError::Runtime(_) => ("RUNTIME_ERROR", "Retry the command"),
                    ObserverError::Transport(_)
                    | ObserverError::HttpStatus(_)
                    | ObserverError::Fetch(_) => {
                        ("TRANSPORT_ERROR", "Check that the endpoint is reachable")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            ObserverCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            ObserverCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} problems found in recording", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            ObserverCliError::DoctorFailed => CliError {
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
    schema_version: String,
    header_error: Option<String>,
    total_signals: usize,
    valid_signals: usize,
    invalid_signals: usize,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(serde::Serialize)]
struct ValidationErrorDetail {
    index: usize,
    signal_type: String,
    at_ms: u64,
    error: String,
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
