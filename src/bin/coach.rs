//! Coach CLI - Command-line interface for Coach Flux
//!
//! Commands:
//! - redact: Strip identifiable substrings from text
//! - classify: Run the classifiers over a window of messages
//! - parse-plan: Parse a saved generation reply into a plan
//! - synthesize: Ingest messages and generate a plan against a live backend
//! - doctor: Diagnose configuration, rule tables and backend settings

use clap::{Parser, Subcommand, ValueEnum};
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use coach_flux::classifier::{table_for, ClassifierSet};
use coach_flux::config::CoachConfig;
use coach_flux::pipeline::CoachProcessor;
use coach_flux::redact::redact_with_report;
use coach_flux::synthesis::backend::{BackendSettings, ENV_API_KEY, ENV_BASE_URL, ENV_MODEL};
use coach_flux::synthesis::{build_plan, parse_reply, BackendError, OpenAiCompatibleBackend};
use coach_flux::types::ClassifierId;
use coach_flux::{CoachError, COACH_FLUX_VERSION, PRODUCER_NAME};

/// Coach - Behavioral-signal pipeline for conversational coaching
#[derive(Parser)]
#[command(name = "coach")]
#[command(author = "Synheart AI Inc")]
#[command(version = COACH_FLUX_VERSION)]
#[command(about = "Redact, classify and plan from user messages", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Strip identifiable substrings from text
    Redact {
        /// Input file path (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Print per-kind replacement counts as JSON
        #[arg(long)]
        report: bool,
    },

    /// Run the classifiers over a window of messages
    Classify {
        /// Input file with one message per line (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Only run this classifier
        #[arg(short, long, value_enum)]
        classifier: Option<ClassifierArg>,
    },

    /// Parse a saved generation reply into a plan
    ParsePlan {
        /// Reply file (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Session id recorded on the plan
        #[arg(long, default_value = "local")]
        session_id: String,
    },

    /// Ingest messages and generate a plan against a live backend
    Synthesize {
        /// Input file with one message per line (use - for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Session id
        #[arg(long, default_value = "local")]
        session_id: String,

        /// OpenAI-compatible base URL
        #[arg(long, env = ENV_BASE_URL)]
        base_url: Option<String>,

        /// Model name
        #[arg(long, env = ENV_MODEL)]
        model: Option<String>,

        /// API key
        #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
        api_key: Option<String>,

        /// Print the prompt instead of calling the backend
        #[arg(long)]
        dry_run: bool,
    },

    /// Diagnose configuration, rule tables and backend settings
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassifierArg {
    BehaviorRegulation,
    SelfJudgment,
    CognitivePattern,
}

impl From<ClassifierArg> for ClassifierId {
    fn from(arg: ClassifierArg) -> Self {
        match arg {
            ClassifierArg::BehaviorRegulation => ClassifierId::BehaviorRegulation,
            ClassifierArg::SelfJudgment => ClassifierId::SelfJudgment,
            ClassifierArg::CognitivePattern => ClassifierId::CognitivePattern,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coach_flux=info")),
        )
        .with_writer(io::stderr)
        .init();

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

fn run(cli: Cli) -> Result<(), CoachCliError> {
    let pretty = cli.pretty;
    match cli.command {
        Commands::Redact { input, report } => cmd_redact(&input, report, pretty),
        Commands::Classify { input, classifier } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_classify(&input, classifier.map(Into::into), &config, pretty)
        }
        Commands::ParsePlan { input, session_id } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_parse_plan(&input, &session_id, &config, pretty)
        }
        Commands::Synthesize {
            input,
            session_id,
            base_url,
            model,
            api_key,
            dry_run,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let defaults = BackendSettings::default();
            let settings = BackendSettings {
                base_url: base_url.unwrap_or(defaults.base_url),
                model: model.unwrap_or(defaults.model),
                api_key,
            };
            cmd_synthesize(&input, &session_id, settings, config, dry_run, pretty)
        }
        Commands::Doctor { json } => cmd_doctor(cli.config.as_deref(), json),
    }
}

fn cmd_redact(input: &Path, report: bool, pretty: bool) -> Result<(), CoachCliError> {
    let text = read_input(input)?;
    let redaction = redact_with_report(&text);
    if report {
        print_json(&redaction, pretty)?;
    } else {
        print!("{}", redaction.text);
    }
    Ok(())
}

fn cmd_classify(
    input: &Path,
    only: Option<ClassifierId>,
    config: &CoachConfig,
    pretty: bool,
) -> Result<(), CoachCliError> {
    let messages = read_messages(input)?;
    let redacted: Vec<String> = messages
        .iter()
        .map(|m| redact_with_report(m).text)
        .collect();
    let classifiers = ClassifierSet::new(&config.scoring)?;

    let analyses = match only {
        Some(id) => vec![classifiers.classify(id, &redacted)],
        None => classifiers.classify_all(&redacted),
    };
    print_json(&analyses, pretty)
}

fn cmd_parse_plan(
    input: &Path,
    session_id: &str,
    config: &CoachConfig,
    pretty: bool,
) -> Result<(), CoachCliError> {
    let reply = read_input(input)?;
    let parsed = parse_reply(&reply, &config.synthesis.default_summary);
    let plan = build_plan(session_id, &parsed, &config.synthesis, chrono::Utc::now());

    let output = serde_json::json!({
        "plan": plan,
        "skipped_blocks": parsed.skipped_blocks,
        "missing_summary": parsed.missing_summary,
    });
    print_json(&output, pretty)
}

fn cmd_synthesize(
    input: &Path,
    session_id: &str,
    settings: BackendSettings,
    config: CoachConfig,
    dry_run: bool,
    pretty: bool,
) -> Result<(), CoachCliError> {
    let messages = read_messages(input)?;

    if dry_run {
        let processor = CoachProcessor::new(config)?;
        let outcome = processor.ingest(session_id, &messages, None)?;
        let synthesizer_config = processor.config().synthesis.clone();
        let events = processor.recent_events(session_id, Some(synthesizer_config.event_window));
        let summary = coach_flux::synthesis::aggregate(&events);
        let redacted: Vec<String> = messages.iter().map(|m| redact_with_report(m).text).collect();
        let prompt = coach_flux::synthesis::build_prompt(&summary, &redacted, &synthesizer_config);
        let output = serde_json::json!({
            "ingest": outcome,
            "prompt": prompt,
        });
        return print_json(&output, pretty);
    }

    let backend = OpenAiCompatibleBackend::new(settings)?;
    let processor = CoachProcessor::builder(config)
        .backend(Arc::new(backend))
        .build()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let outcome = processor.ingest(session_id, &messages, None)?;
    if !outcome.ready_for_plan {
        tracing::warn!(
            %session_id,
            stored = outcome.stored.len(),
            "signal is below the usual plan threshold, synthesizing anyway"
        );
    }
    let plan = runtime.block_on(processor.request_plan(session_id, &messages))?;

    let output = serde_json::json!({
        "ingest": outcome,
        "plan": plan,
    });
    print_json(&output, pretty)
}

fn cmd_doctor(config_path: Option<&Path>, json: bool) -> Result<(), CoachCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Coach Flux version {}", COACH_FLUX_VERSION),
    });

    // Configuration
    let config = match config_path {
        Some(path) => match CoachConfig::from_file(path) {
            Ok(config) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Ok,
                    message: format!("Configuration file {} is valid", path.display()),
                });
                config
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Invalid configuration: {}", e),
                });
                CoachConfig::default()
            }
        },
        None => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message: "No configuration file, using defaults".to_string(),
            });
            CoachConfig::default()
        }
    };

    // Rule tables
    match ClassifierSet::new(&config.scoring) {
        Ok(_) => {
            let patterns: usize = ClassifierId::ALL
                .iter()
                .map(|id| table_for(*id).pattern_count())
                .sum();
            checks.push(DoctorCheck {
                name: "rule_tables".to_string(),
                status: CheckStatus::Ok,
                message: format!(
                    "{} classifiers compiled ({} patterns)",
                    ClassifierId::ALL.len(),
                    patterns
                ),
            });
        }
        Err(e) => checks.push(DoctorCheck {
            name: "rule_tables".to_string(),
            status: CheckStatus::Error,
            message: format!("Rule tables failed to compile: {}", e),
        }),
    }

    // Backend settings
    let settings = BackendSettings::from_env();
    checks.push(match settings.api_key {
        Some(_) => DoctorCheck {
            name: "backend".to_string(),
            status: CheckStatus::Ok,
            message: format!("{} at {}", settings.model, settings.base_url),
        },
        None => DoctorCheck {
            name: "backend".to_string(),
            status: CheckStatus::Warning,
            message: format!("{} is not set; synthesize will fail", ENV_API_KEY),
        },
    });

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (ready for piped messages)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: COACH_FLUX_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{report}");
    }

    match report.failed_checks() {
        failed if failed.is_empty() => Ok(()),
        failed => Err(CoachCliError::DoctorFailed(failed.join(", "))),
    }
}

fn load_config(path: Option<&Path>) -> Result<CoachConfig, CoachCliError> {
    match path {
        Some(path) => Ok(CoachConfig::from_file(path)?),
        None => Ok(CoachConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<String, CoachCliError> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn read_messages(path: &Path) -> Result<Vec<String>, CoachCliError> {
    let messages: Vec<String> = read_input(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    if messages.is_empty() {
        return Err(CoachCliError::NoMessages);
    }
    Ok(messages)
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<(), CoachCliError> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", out);
    Ok(())
}

enum CoachCliError {
    Io(io::Error),
    Core(CoachError),
    Json(serde_json::Error),
    Backend(BackendError),
    NoMessages,
    DoctorFailed(String),
}

impl From<io::Error> for CoachCliError {
    fn from(e: io::Error) -> Self {
        CoachCliError::Io(e)
    }
}

impl From<CoachError> for CoachCliError {
    fn from(e: CoachError) -> Self {
        CoachCliError::Core(e)
    }
}

impl From<serde_json::Error> for CoachCliError {
    fn from(e: serde_json::Error) -> Self {
        CoachCliError::Json(e)
    }
}

impl From<BackendError> for CoachCliError {
    fn from(e: BackendError) -> Self {
        CoachCliError::Backend(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<CoachCliError> for CliError {
    fn from(e: CoachCliError) -> Self {
        match e {
            CoachCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            CoachCliError::Core(e) => {
                let hint = match &e {
                    CoachError::Validation(_) => Some("Check the input messages".to_string()),
                    CoachError::AdmissionDenied { .. } => Some("Please wait and retry".to_string()),
                    CoachError::UpstreamGeneration(_) => {
                        Some("Try again later or check the backend with 'coach doctor'".to_string())
                    }
                    CoachError::Config(_) | CoachError::Json(_) => {
                        Some("Run 'coach doctor --config <file>' for details".to_string())
                    }
                    _ => None,
                };
                CliError {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    hint,
                }
            }
            CoachCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            CoachCliError::Backend(e) => CliError {
                code: "BACKEND_ERROR".to_string(),
                message: e.to_string(),
                hint: Some(format!("Set {} or pass --api-key", ENV_API_KEY)),
            },
            CoachCliError::NoMessages => CliError {
                code: "NO_MESSAGES".to_string(),
                message: "No messages found in input".to_string(),
                hint: Some("Provide one message per line".to_string()),
            },
            CoachCliError::DoctorFailed(names) => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: format!("doctor checks in error: {names}"),
                hint: Some("Run `coach doctor --json` to see each check's message".to_string()),
            },
        }
    }
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
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}

impl DoctorReport {
    /// Names of the checks that ended in [`CheckStatus::Error`]
    fn failed_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| matches!(c.status, CheckStatus::Error))
            .map(|c| c.name.as_str())
            .collect()
    }
}

impl fmt::Display for DoctorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} {} health", self.producer, self.version)?;
        let width = self.checks.iter().map(|c| c.name.len()).max().unwrap_or(0);
        for check in &self.checks {
            let mark = match check.status {
                CheckStatus::Ok => "ok",
                CheckStatus::Warning => "warn",
                CheckStatus::Error => "FAIL",
            };
            writeln!(f, "  {mark:<4}  {:<width$}  {}", check.name, check.message)?;
        }
        Ok(())
    }
}
