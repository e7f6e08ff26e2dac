use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use logkeeper_core::aws::AwsHttp;
use logkeeper_core::{
    load_keeper_config, AuditOrchestrator, AuditResult, CancellationFlag, CloudWatchLogsClient,
    Collaborators, ConfigError, CostEstimate, CostModel, CredentialSource, FileReportWriter,
    KeeperConfig, RunError, RunMode, RunPhase, RunSummary, ServiceError, StsClient,
};
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;
use tracing_subscriber::EnvFilter;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Service(#[from] ServiceError),
    #[error("{0}")]
    Run(#[from] RunError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("run cancelled: {0} log groups were not processed")]
    Cancelled(usize),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audit and enforce log group retention", long_about = None)]
pub struct Cli {
    /// Path to logkeeper.toml; built-in defaults apply when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Region override (aws.region)
    #[arg(long)]
    pub region: Option<String>,
    /// Shared credentials profile; implies credential_source = profile
    #[arg(long)]
    pub profile: Option<String>,
    /// Endpoint override for both services
    #[arg(long)]
    pub endpoint_url: Option<String>,
    /// Directory the report is written to (report.output_dir)
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Debug-level logging on stderr
    #[arg(long, short)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report log groups that keep data forever, without changing them
    Audit(AuditArgs),
    /// Apply the target retention to every log group without one
    Enforce(EnforceArgs),
    /// Offline savings estimate, no cloud calls
    Estimate(EstimateArgs),
    /// Print shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug, Default)]
pub struct AuditArgs {
    /// Only consider log groups whose name starts with this prefix
    #[arg(long)]
    pub name_prefix: Option<String>,
    /// Retention used for the savings projection
    #[arg(long)]
    pub target_days: Option<u32>,
}

#[derive(Args, Debug, Default)]
pub struct EnforceArgs {
    /// Retention to apply, in days
    #[arg(long)]
    pub target_days: Option<u32>,
    /// Maximum enforcement calls in flight
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Only consider log groups whose name starts with this prefix
    #[arg(long)]
    pub name_prefix: Option<String>,
}

#[derive(Args, Debug)]
pub struct EstimateArgs {
    /// Number of log groups that would be capped
    #[arg(long)]
    pub groups: u64,
    /// Retention the groups would be capped at
    #[arg(long)]
    pub target_days: Option<u32>,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Logs go to stderr so stdout only carries the summary.
pub fn init_tracing(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

pub async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Completions(args) => {
            let mut command = Cli::command();
            clap_complete::generate(
                args.shell,
                &mut command,
                "logkeeperctl",
                &mut std::io::stdout(),
            );
        }
        Commands::Estimate(args) => {
            let config = resolve_config(&cli)?;
            let estimate = CostModel::from_config(&config.cost).estimate(
                i64::try_from(args.groups).unwrap_or(i64::MAX),
                i64::from(config.audit.target_retention_days),
            );
            render(&estimate, cli.format)?;
        }
        Commands::Audit(_) | Commands::Enforce(_) => {
            let config = resolve_config(&cli)?;
            let collaborators = aws_collaborators(&config)?;
            let cancellation = CancellationFlag::new();
            let interrupt = watch_interrupt(cancellation.clone());
            let outcome = execute(&config, collaborators, cancellation).await;
            interrupt.abort();
            let summary = outcome?;
            render(&RunOutput::from(&summary), cli.format)?;
            if summary.result.cancelled {
                return Err(AppError::Cancelled(summary.result.not_attempted.len()));
            }
        }
    }
    Ok(())
}

/// Loads the file (if any), applies flag overrides and validates the result.
pub fn resolve_config(cli: &Cli) -> Result<KeeperConfig> {
    let mut config = match &cli.config {
        Some(path) => load_keeper_config(path)?,
        None => KeeperConfig::default(),
    };
    apply_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut KeeperConfig, cli: &Cli) {
    if let Some(region) = &cli.region {
        config.aws.region = region.clone();
    }
    if let Some(profile) = &cli.profile {
        config.aws.profile = profile.clone();
        config.aws.credential_source = CredentialSource::Profile;
    }
    if let Some(endpoint) = &cli.endpoint_url {
        config.aws.endpoint_url = Some(endpoint.clone());
    }
    if let Some(dir) = &cli.output_dir {
        config.report.output_dir = dir.clone();
    }

    let (prefix, target_days) = match &cli.command {
        Commands::Audit(args) => {
            config.audit.mode = RunMode::AuditOnly;
            (args.name_prefix.as_ref(), args.target_days)
        }
        Commands::Enforce(args) => {
            config.audit.mode = RunMode::AuditAndEnforce;
            if let Some(concurrency) = args.concurrency {
                config.audit.concurrency = concurrency;
            }
            (args.name_prefix.as_ref(), args.target_days)
        }
        Commands::Estimate(args) => (None, args.target_days),
        Commands::Completions(_) => (None, None),
    };
    if let Some(prefix) = prefix {
        config.audit.name_prefix = Some(prefix.clone());
    }
    if let Some(days) = target_days {
        config.audit.target_retention_days = days;
    }
}

fn aws_collaborators(config: &KeeperConfig) -> Result<Collaborators> {
    let http = AwsHttp::from_config(&config.aws)?;
    let output_dir = config.resolve_output_dir(std::env::current_dir()?);
    Ok(Collaborators {
        logs: Arc::new(CloudWatchLogsClient::new(http.clone())),
        identity: Arc::new(StsClient::new(http)),
        writer: Arc::new(FileReportWriter::new(output_dir)),
    })
}

fn watch_interrupt(cancellation: CancellationFlag) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, no new calls will be issued");
            cancellation.cancel();
        }
    })
}

/// One orchestrated run with the given collaborators.
pub async fn execute(
    config: &KeeperConfig,
    collaborators: Collaborators,
    cancellation: CancellationFlag,
) -> Result<RunSummary> {
    let orchestrator =
        AuditOrchestrator::from_config(config, collaborators).with_cancellation(cancellation);
    Ok(orchestrator.run().await?)
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => println!("{}", value.display()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    report_path: &'a Path,
    phases: &'a [RunPhase],
    result: &'a AuditResult,
}

impl<'a> From<&'a RunSummary> for RunOutput<'a> {
    fn from(summary: &'a RunSummary) -> Self {
        Self {
            report_path: &summary.report_path,
            phases: &summary.phases,
            result: &summary.result,
        }
    }
}

impl DisplayFallback for RunOutput<'_> {
    fn display(&self) -> String {
        let result = self.result;
        let headline = match result.mode {
            RunMode::AuditOnly => format!(
                "{} log groups scanned, {} without retention; projected savings {} per month at {} days",
                result.total,
                result.without_retention,
                result.estimate.formatted(),
                result.target_days
            ),
            RunMode::AuditAndEnforce => format!(
                "{} of {} log groups without retention set to {} days ({} skipped, {} failed); estimated savings {} per month",
                result.enforced,
                result.without_retention,
                result.target_days,
                result.skipped.len(),
                result.failed.len(),
                result.estimate.formatted()
            ),
        };
        format!("{headline}; report: {}", self.report_path.display())
    }
}

impl DisplayFallback for CostEstimate {
    fn display(&self) -> String {
        format!(
            "{} log groups at a {} day retention: {} per month",
            self.affected_groups,
            self.target_days,
            self.formatted()
        )
    }
}
