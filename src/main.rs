use clap::{Args, Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::error;
use triage_core::analyzer::{default_fail_on, should_fail_ci, Analyzer};
use triage_core::config::{ApplicationSource, Config, ExecutionConfig, LogsConfig};
use triage_core::models::FailureType;
use triage_core::output::{render, OutputFormat};
use triage_core::{Result, TriageError};

const EXIT_GATE_PASSED: i32 = 0;
const EXIT_GATE_FAILED: i32 = 1;
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_INTERNAL_ERROR: i32 = 3;

#[derive(Parser)]
#[command(name = "triage", version, about = "Classify test-automation failures from raw logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze automation logs and emit a classified result document
    Analyze(AnalyzeArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Automation log file (repeatable)
    #[arg(long = "log-file")]
    log_files: Vec<PathBuf>,

    /// Directory of automation logs (batch mode)
    #[arg(long = "log-dir")]
    log_dir: Option<PathBuf>,

    /// Application (service) log file (repeatable)
    #[arg(long = "app-log")]
    app_logs: Vec<PathBuf>,

    /// Framework adapter name, or auto-detect when omitted
    #[arg(long)]
    framework: Option<String>,

    /// Read everything from a configuration document instead of flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Workspace root for source snippet resolution
    #[arg(long = "source-root")]
    source_root: Option<PathBuf>,

    /// Write the document here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "json")]
    format: String,

    /// Comma-separated failure types that fail the gate
    #[arg(long = "fail-on")]
    fail_on: Option<String>,

    /// Analyze tests concurrently
    #[arg(long)]
    parallel: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Analyze(args) => run_analyze(args).await,
    };
    std::process::exit(code);
}

async fn run_analyze(args: AnalyzeArgs) -> i32 {
    match analyze(args).await {
        Ok(gate_failed) => {
            if gate_failed {
                EXIT_GATE_FAILED
            } else {
                EXIT_GATE_PASSED
            }
        }
        Err(e @ (TriageError::Configuration(_) | TriageError::ConfigFile(_) | TriageError::RulePack { .. })) => {
            error!("{e}");
            EXIT_CONFIG_ERROR
        }
        Err(e) => {
            error!("{e}");
            EXIT_INTERNAL_ERROR
        }
    }
}

async fn analyze(args: AnalyzeArgs) -> Result<bool> {
    let format: OutputFormat = args
        .format
        .parse()
        .map_err(TriageError::Configuration)?;
    let fail_on = parse_fail_on(args.fail_on.as_deref())?;

    let config = build_config(&args)?;
    let collection = config.log_sources()?;

    let analyzer = Analyzer::from_config(config)?;
    let results = analyzer.analyze_batch(&collection, args.parallel).await?;
    let summary = analyzer.summarize(&results);
    let groups = analyzer.group(&results);

    let document = render(format, &results, &summary, &groups)?;
    match &args.output {
        Some(path) => std::fs::write(path, document)?,
        None => println!("{document}"),
    }

    // A short stderr digest of tests whose analysis itself errored.
    let digest = Analyzer::error_digest(&results);
    if !digest.is_empty() {
        eprintln!("{} test(s) could not be analyzed:", digest.len());
        for line in digest {
            eprintln!("  {line}");
        }
    }

    Ok(should_fail_ci(&results, &fail_on))
}

fn build_config(args: &AnalyzeArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let mut automation = args.log_files.clone();
            if let Some(dir) = &args.log_dir {
                automation.push(dir.clone());
            }
            if automation.is_empty() {
                return Err(TriageError::Configuration(
                    "provide --log-file, --log-dir or --config".to_string(),
                ));
            }
            Config {
                execution: ExecutionConfig {
                    logs: LogsConfig {
                        automation,
                        application: args
                            .app_logs
                            .iter()
                            .cloned()
                            .map(ApplicationSource::Path)
                            .collect(),
                    },
                    ..Default::default()
                },
                ..Default::default()
            }
        }
    };

    // Flags override the document where both are given.
    if let Some(framework) = &args.framework {
        config.execution.framework = framework.clone();
    }
    if let Some(root) = &args.source_root {
        config.execution.source_root = root.clone();
    }
    config.validate()?;
    Ok(config)
}

fn parse_fail_on(raw: Option<&str>) -> Result<HashSet<FailureType>> {
    match raw {
        None => Ok(default_fail_on()),
        Some(list) => list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.parse::<FailureType>()
                    .map_err(TriageError::Configuration)
            })
            .collect(),
    }
}
