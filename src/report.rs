//! Drives an audit over one repository or a whole organization and renders
//! what it finds.

use std::{
    fs::File,
    future::Future,
    io::{BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::{
    display::{display_review_findings, display_status_findings},
    error::RemoteApiError,
    export::{write_review_csv, write_status_csv},
    lister::list_repositories,
    reviews::audit_reviews,
    statuses::audit_statuses,
    types::{AuditOptions, FlaggedCommit, Forge, PullRequest, Repo},
};

/// Which audit to run.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditKind {
    Reviews { start_date: Option<DateTime<Utc>> },
    Statuses { start_date: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Repository(Repo),
    Organization(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Console,
    Csv(PathBuf),
}

/// What an organization-wide run does when one repository's audit fails.
///
/// A single-repository run always fails outright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FailurePolicy {
    /// Log the failure; the repository contributes nothing.
    #[default]
    Skip,
    /// Fail the whole run; nothing is written.
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditRequest {
    pub target: Target,
    pub kind: AuditKind,
    pub output: Output,
    pub failure_policy: FailurePolicy,
    pub options: AuditOptions,
    /// Console width used to shorten titles; `None` never shortens.
    pub console_width: Option<usize>,
}

/// Flagged records of one audit, across every repository visited.
#[derive(Debug, Clone, PartialEq)]
pub enum Findings {
    Reviews(Vec<PullRequest>),
    Statuses(Vec<FlaggedCommit>),
}

impl Findings {
    pub fn len(&self) -> usize {
        match self {
            Findings::Reviews(prs) => prs.len(),
            Findings::Statuses(commits) => commits.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn nothing_found_message(&self) -> &'static str {
        match self {
            Findings::Reviews(_) => "No merged pull requests found without approved reviews.",
            Findings::Statuses(_) => "No commits found with unsuccessful status checks.",
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub audited: Vec<Repo>,
    /// Repositories whose audit failed and were skipped.
    pub skipped: Vec<Repo>,
    pub flagged: usize,
    /// CSV file written, if any.
    pub written: Option<PathBuf>,
}

/// Audits each repository in turn and concatenates what `audit` flags.
///
/// With `isolate_failures` a failed repository is logged and skipped;
/// otherwise the first failure ends the run.
async fn audit_each<T, A, Fut>(
    repos: Vec<Repo>,
    isolate_failures: bool,
    audit: A,
) -> Result<(Vec<T>, RunSummary)>
where
    A: Fn(Repo) -> Fut,
    Fut: Future<Output = Result<Vec<T>, RemoteApiError>>,
{
    let mut flagged = Vec::new();
    let mut summary = RunSummary::default();

    for repo in repos {
        match audit(repo.clone()).await {
            Ok(found) => {
                info!(repo = %repo, flagged = found.len(), "Audited repository");
                flagged.extend(found);
                summary.audited.push(repo);
            }
            Err(err) if isolate_failures => {
                error!(repo = %repo, error = %err, "Audit failed, skipping repository");
                summary.skipped.push(repo);
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context(format!("Audit of {repo} failed")));
            }
        }
    }

    summary.flagged = flagged.len();
    Ok((flagged, summary))
}

/// Runs the audit over every targeted repository and returns the
/// concatenated findings without rendering them.
pub async fn collect_findings<F>(forge: &F, request: &AuditRequest) -> Result<(Findings, RunSummary)>
where
    F: Forge + ?Sized,
{
    let repos = match &request.target {
        Target::Repository(repo) => vec![repo.clone()],
        Target::Organization(org) => list_repositories(forge, org)
            .await
            .with_context(|| format!("Failed to list repositories of organization '{org}'"))?,
    };

    let isolate_failures = matches!(request.target, Target::Organization(_))
        && request.failure_policy == FailurePolicy::Skip;
    let options = &request.options;

    match request.kind {
        AuditKind::Reviews { start_date } => {
            let (prs, summary) = audit_each(repos, isolate_failures, move |repo| async move {
                audit_reviews(forge, &repo, start_date, options).await
            })
            .await?;
            Ok((Findings::Reviews(prs), summary))
        }
        AuditKind::Statuses { start_date } => {
            let (commits, summary) = audit_each(repos, isolate_failures, move |repo| async move {
                audit_statuses(forge, &repo, start_date, options).await
            })
            .await?;
            Ok((Findings::Statuses(commits), summary))
        }
    }
}

/// Runs the audit and renders the findings.
///
/// Console output and status messages go to `writer`. Nothing is written
/// when the run fails, and no CSV file is created when nothing was flagged.
pub async fn run<F, W>(forge: &F, request: &AuditRequest, writer: &mut W) -> Result<RunSummary>
where
    F: Forge + ?Sized,
    W: Write,
{
    let (findings, mut summary) = collect_findings(forge, request).await?;

    if findings.is_empty() {
        writeln!(writer, "{}", findings.nothing_found_message())?;
        report_skipped(&summary, writer)?;
        return Ok(summary);
    }

    match &request.output {
        Output::Console => match &findings {
            Findings::Reviews(prs) => display_review_findings(prs, request.console_width, writer)?,
            Findings::Statuses(commits) => {
                display_status_findings(commits, request.console_width, writer)?
            }
        },
        Output::Csv(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create '{}'", path.display()))?;
            let file = BufWriter::new(file);
            match &findings {
                Findings::Reviews(prs) => write_review_csv(file, prs)?,
                Findings::Statuses(commits) => write_status_csv(file, commits)?,
            }
            writeln!(
                writer,
                "{} results saved to {}",
                findings.len(),
                path.display()
            )?;
            summary.written = Some(path.clone());
        }
    }

    report_skipped(&summary, writer)?;
    Ok(summary)
}

fn report_skipped<W: Write>(summary: &RunSummary, writer: &mut W) -> Result<()> {
    if !summary.skipped.is_empty() {
        let names: Vec<String> = summary.skipped.iter().map(Repo::to_string).collect();
        writeln!(
            writer,
            "Skipped {} repositories after errors: {}",
            names.len(),
            names.join(", ")
        )?;
    }
    Ok(())
}
