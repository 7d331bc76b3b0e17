//! Commits whose combined status is not `success`.

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use crate::{
    error::RemoteApiError,
    types::{AuditOptions, Commit, FlaggedCommit, Forge, Repo},
};

/// Returns the commits of `repo` committed at or after `start_date` whose
/// combined status state is anything but `success`.
///
/// Every page of history is scanned; older commits are skipped but do not
/// end pagination. `Ok(vec![])` means every qualifying commit passed, while
/// any failed request yields `Err`.
pub async fn audit_statuses<F>(
    forge: &F,
    repo: &Repo,
    start_date: DateTime<Utc>,
    options: &AuditOptions,
) -> Result<Vec<FlaggedCommit>, RemoteApiError>
where
    F: Forge + ?Sized,
{
    let mut flagged = Vec::new();
    let mut page = 1;

    loop {
        info!(repo = %repo, page, "Fetching commits");
        let commits = forge.commits(repo, page).await?;
        if commits.is_empty() {
            break;
        }

        let qualifying = commits
            .into_iter()
            .filter(|commit| commit.committer_date >= start_date);

        let checked: Vec<Option<FlaggedCommit>> = stream::iter(qualifying)
            .map(|commit| unsuccessful(forge, commit))
            .buffered(options.concurrency())
            .try_collect()
            .await?;
        flagged.extend(checked.into_iter().flatten());

        page += 1;
    }

    info!(repo = %repo, flagged = flagged.len(), "Finished status audit");
    Ok(flagged)
}

async fn unsuccessful<F>(forge: &F, commit: Commit) -> Result<Option<FlaggedCommit>, RemoteApiError>
where
    F: Forge + ?Sized,
{
    debug!(repo = %commit.repo, sha = %commit.sha, "Fetching combined status");
    let status = forge.combined_status(&commit.repo, &commit.sha).await?;

    if status.is_success() {
        return Ok(None);
    }

    Ok(Some(FlaggedCommit {
        commit,
        state: status.state,
    }))
}
