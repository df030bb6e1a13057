// calcgrade CLI - headless grading of spreadsheet submissions

mod exit_codes;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use calcgrade_correction::{grade_detailed, role, CellRole, GradingConfig, RuleRegistry};
use calcgrade_engine::Workbook;

use exit_codes::{correction_exit_code, EXIT_CONFIG, EXIT_FAILED, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "cgrade")]
#[command(about = "Grade spreadsheet submissions against an exercise solution")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a submission; exits 0 when it passes, 1 when it fails
    #[command(after_help = "\
Examples:
  cgrade grade task.json solution.json alice.json
  cgrade grade task.json solution.json alice.json --config grading.toml --json
  cgrade grade task.json solution.json alice.json --seed 42 -vv")]
    Grade {
        /// Exercise document handed out to learners
        instruction: PathBuf,

        /// Reference solution
        solution: PathBuf,

        /// Learner's submission
        submission: PathBuf,

        /// Grading configuration (TOML). Defaults apply when omitted.
        #[arg(long, short = 'c', env = "CALCGRADE_CONFIG")]
        config: Option<PathBuf>,

        /// Seed for helper randomization (overrides the config)
        #[arg(long)]
        seed: Option<u64>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the role of every coloured cell in a document
    Roles {
        /// Document to classify
        file: PathBuf,

        /// Grading configuration providing the palette
        #[arg(long, short = 'c', env = "CALCGRADE_CONFIG")]
        config: Option<PathBuf>,

        /// Output as JSON array
        #[arg(long)]
        json: bool,
    },

    /// Validate a grading configuration and print the rule chain
    CheckConfig {
        /// Configuration file (TOML)
        config: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Grade { instruction, solution, submission, config, seed, json } => {
            cmd_grade(&instruction, &solution, &submission, config.as_deref(), seed, json)
        }
        Commands::Roles { file, config, json } => cmd_roles(&file, config.as_deref(), json),
        Commands::CheckConfig { config } => cmd_check_config(&config),
    };

    match result {
        Ok(code) => ExitCode::from(code),
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

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<calcgrade_correction::CorrectionError> for CliError {
    fn from(err: calcgrade_correction::CorrectionError) -> Self {
        Self { code: correction_exit_code(&err), message: err.to_string(), hint: None }
    }
}

// ============================================================================
// Loading
// ============================================================================

fn load_document(path: &Path) -> Result<Workbook, CliError> {
    if !path.exists() {
        return Err(CliError::usage(format!("file not found: {}", path.display())));
    }
    calcgrade_io::load_workbook(path).map_err(|e| CliError::io(format!("{}: {}", path.display(), e)))
}

fn load_config(path: Option<&Path>) -> Result<GradingConfig, CliError> {
    let Some(path) = path else {
        return Ok(GradingConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("{}: {}", path.display(), e)))?;
    GradingConfig::from_toml(&text).map_err(|e| {
        CliError::config(format!("{}: {}", path.display(), e))
            .with_hint("run `cgrade check-config <file>` for details")
    })
}

fn write_stdout(text: &str) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{}", text).map_err(|e| CliError::io(e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value).map_err(|e| CliError::io(e.to_string()))
}

// ============================================================================
// grade
// ============================================================================

fn cmd_grade(
    instruction: &Path,
    solution: &Path,
    submission: &Path,
    config: Option<&Path>,
    seed: Option<u64>,
    json: bool,
) -> Result<u8, CliError> {
    let mut config = load_config(config)?;
    if seed.is_some() {
        config.randomization.seed = seed;
    }
    let chain = RuleRegistry::standard().build(&config)?;

    let instruction = load_document(instruction)?;
    let solution = load_document(solution)?;
    let submission_doc = load_document(submission)?;

    log::info!("grading {} with rules [{}]", submission.display(), chain.rule_names().join(", "));
    let report = grade_detailed(instruction, solution, submission_doc, &chain, &config);

    if json {
        write_stdout(&to_json(&report)?)?;
    } else {
        write_stdout(&report.verdict.to_string())?;
        if let Some(rule) = &report.failed_rule {
            eprintln!("rule:  {}", rule);
        }
        if let Some(kind) = &report.error_kind {
            eprintln!("kind:  {}", kind);
        }
    }

    Ok(if report.verdict.passed { EXIT_SUCCESS } else { EXIT_FAILED })
}

// ============================================================================
// roles
// ============================================================================

#[derive(Serialize)]
struct RoleEntry {
    cell: String,
    role: String,
}

fn cmd_roles(file: &Path, config: Option<&Path>, json: bool) -> Result<u8, CliError> {
    let config = load_config(config)?;
    let workbook = load_document(file)?;

    let entries: Vec<RoleEntry> = role::classify(&workbook, &config.palette)
        .into_iter()
        .filter(|(_, role)| *role != CellRole::None)
        .map(|(addr, role)| RoleEntry { cell: workbook.describe(addr), role: role.to_string() })
        .collect();

    if json {
        write_stdout(&to_json(&entries)?)?;
    } else {
        for entry in &entries {
            write_stdout(&format!("{}\t{}", entry.cell, entry.role))?;
        }
    }
    Ok(EXIT_SUCCESS)
}

// ============================================================================
// check-config
// ============================================================================

fn cmd_check_config(path: &Path) -> Result<u8, CliError> {
    let config = load_config(Some(path))?;
    let chain = RuleRegistry::standard().build(&config)?;
    write_stdout(&format!(
        "ok: {} rules ({}), tolerance {}",
        chain.len(),
        chain.rule_names().join(" -> "),
        config.tolerance.relative
    ))?;
    Ok(EXIT_SUCCESS)
}
