use std::{ffi::OsString, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::{Args, Parser};
use url::Url;

use crate::{
    display::terminal_width,
    github::{DEFAULT_API_URL, GitHub, GitHubConfig},
    report::{AuditKind, AuditRequest, FailurePolicy, Output, Target, run},
    types::{AuditOptions, Repo},
};

const BUILD_INFO_HUMAN: &str = env!("BUILD_INFO_HUMAN");

#[derive(Args, Debug, Clone, Default)]
#[group(required = true, multiple = false)]
struct TargetArgs {
    /// Repository to audit
    #[arg(short = 'r', long = "repo", value_name = "OWNER/REPO")]
    pub repo: Option<String>,

    /// Audit every repository of this organization
    #[arg(short = 'o', long = "org", visible_alias = "organization", value_name = "ORG")]
    pub org: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
struct ConnectionArgs {
    /// Personal access token (defaults to GITHUB_TOKEN, GH_TOKEN, then `gh auth token`)
    #[arg(short = 'p', long, value_name = "TOKEN", help_heading = "Connection")]
    pub token: Option<String>,

    /// API base URL, e.g. https://ghe.example.com/api/v3 for GitHub Enterprise
    #[arg(long = "api-url", value_name = "URL", default_value = DEFAULT_API_URL, help_heading = "Connection")]
    pub api_url: String,

    /// Retry transient request failures this many times with exponential backoff
    #[arg(long = "max-retries", value_name = "NUM", default_value_t = 0, help_heading = "Connection")]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", help_heading = "Connection")]
    pub timeout: Option<u64>,

    /// Review or status requests to keep in flight at once
    #[arg(long, value_name = "NUM", default_value_t = 1, help_heading = "Connection")]
    pub concurrency: usize,
}

#[derive(Args, Debug, Clone, Default)]
struct RunArgs {
    /// What to do when one repository of an organization fails
    #[arg(long = "on-repo-error", value_enum, default_value_t = FailurePolicy::Skip)]
    pub on_repo_error: FailurePolicy,

    /// Print results to the console instead of writing a CSV file
    #[arg(long)]
    pub console: bool,

    /// Log progress to stderr
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(
    name = "review-audit",
    about = "Find merged pull requests that never received an approving review"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
struct ReviewAuditArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Only consider pull requests merged on or after this date (YYYY-MM-DD or RFC 3339)
    #[arg(short = 's', long = "start-date", value_name = "DATE")]
    pub start_date: Option<String>,

    /// CSV file to write
    #[arg(short = 'f', long, value_name = "PATH", default_value = "output.csv")]
    pub file: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Parser, Debug)]
#[command(
    name = "status-audit",
    about = "Find commits whose combined status check is not successful"
)]
#[command(long_version = BUILD_INFO_HUMAN)]
struct StatusAuditArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Only consider commits committed on or after this date (YYYY-MM-DD or RFC 3339)
    #[arg(short = 's', long = "start-date", value_name = "DATE")]
    pub start_date: String,

    /// CSV file to write
    #[arg(
        short = 'f',
        long,
        value_name = "PATH",
        required_unless_present = "console"
    )]
    pub file: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,

    #[command(flatten)]
    pub connection: ConnectionArgs,
}

/// Everything a binary needs to perform one audit.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub request: AuditRequest,
    pub github: GitHubConfig,
    pub verbose: bool,
}

/// Accepts `YYYY-MM-DD` (midnight UTC), `YYYY-MM-DDTHH:MM:SS` (UTC) or a
/// full RFC 3339 timestamp.
pub fn parse_start_date(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(time) = DateTime::parse_from_rfc3339(input) {
        return Ok(time.with_timezone(&Utc));
    }
    if let Ok(time) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(time.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc());
        }
    }

    anyhow::bail!(
        "Invalid start date '{}'. Supported formats: 2024-01-31, 2024-01-31T12:00:00, 2024-01-31T12:00:00Z",
        input
    )
}

impl TargetArgs {
    fn into_target(self) -> Result<Target> {
        match (self.repo, self.org) {
            (Some(repo), None) => Repo::parse(&repo)
                .map(Target::Repository)
                .map_err(|e| anyhow::anyhow!("Invalid repository format '{}': {}", repo, e)),
            (None, Some(org)) => {
                let org = org.trim();
                if org.is_empty() || org.contains('/') {
                    anyhow::bail!("Invalid organization name '{}'", org);
                }
                Ok(Target::Organization(org.to_string()))
            }
            _ => anyhow::bail!("Exactly one of --repo or --org must be given"),
        }
    }
}

impl ConnectionArgs {
    fn into_config(self) -> Result<(GitHubConfig, AuditOptions)> {
        if self.concurrency == 0 {
            anyhow::bail!("--concurrency must be at least 1");
        }
        let api_url = Url::parse(&self.api_url)
            .with_context(|| format!("Invalid API URL: '{}'", self.api_url))?;
        let token = self
            .token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        Ok((
            GitHubConfig {
                api_url,
                token,
                max_retries: self.max_retries,
                timeout: self.timeout.map(Duration::from_secs),
            },
            AuditOptions {
                concurrency: self.concurrency,
            },
        ))
    }
}

fn build_invocation(
    target: TargetArgs,
    kind: AuditKind,
    output: Output,
    run: RunArgs,
    connection: ConnectionArgs,
) -> Result<Invocation> {
    let target = target.into_target()?;
    let (github, options) = connection.into_config()?;

    Ok(Invocation {
        request: AuditRequest {
            target,
            kind,
            output,
            failure_policy: run.on_repo_error,
            options,
            console_width: None,
        },
        github,
        verbose: run.verbose,
    })
}

fn collect_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    args.into_iter().map(Into::into).collect()
}

/// Parses `review-audit` command-line arguments.
///
/// Clap's own errors (including `--help` and `--version`) are returned
/// unchanged inside the `anyhow::Error` so callers can downcast them.
pub fn parse_review_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = ReviewAuditArgs::try_parse_from(collect_args(args))?;
    let start_date = cli
        .start_date
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_start_date)
        .transpose()?;
    let output = if cli.run.console {
        Output::Console
    } else {
        Output::Csv(cli.file)
    };

    build_invocation(
        cli.target,
        AuditKind::Reviews { start_date },
        output,
        cli.run,
        cli.connection,
    )
}

/// Parses `status-audit` command-line arguments.
pub fn parse_status_args<I, T>(args: I) -> Result<Invocation>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = StatusAuditArgs::try_parse_from(collect_args(args))?;
    let start_date = parse_start_date(&cli.start_date)?;
    let output = match (cli.run.console, cli.file) {
        (true, _) => Output::Console,
        (false, Some(file)) => Output::Csv(file),
        (false, None) => anyhow::bail!("--file is required unless --console is given"),
    };

    build_invocation(
        cli.target,
        AuditKind::Statuses { start_date },
        output,
        cli.run,
        cli.connection,
    )
}

/// Shared body of both binaries: parse arguments with `parse`, install
/// logging, then run the audit against GitHub and print to stdout.
pub async fn main_with(parse: fn(std::env::ArgsOs) -> Result<Invocation>) -> Result<()> {
    let mut invocation = match parse(std::env::args_os()) {
        Ok(invocation) => invocation,
        Err(err) => {
            if let Some(clap_err) = err.downcast_ref::<clap::Error>() {
                handle_clap_error(clap_err);
            }
            return Err(err);
        }
    };
    init_tracing(invocation.verbose);
    invocation.request.console_width = terminal_width();

    let github = GitHub::new(invocation.github)?;
    let mut stdout = std::io::stdout();
    run(&github, &invocation.request, &mut stdout).await?;

    Ok(())
}

/// Prints clap's help/version output and exits, or reports a usage error
/// with exit status 2.
pub fn handle_clap_error(clap_err: &clap::Error) -> ! {
    use clap::error::ErrorKind;
    match clap_err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
            print!("{clap_err}");
            std::process::exit(0);
        }
        _ => {
            eprint!("{clap_err}");
            std::process::exit(2);
        }
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
