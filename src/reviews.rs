//! Merged pull requests that never received an approving review.

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, info};

use crate::{
    error::RemoteApiError,
    paging::collect_pages,
    types::{AuditOptions, Forge, PullRequest, Repo, has_approval},
};

/// Returns the merged pull requests of `repo` that have no `APPROVED`
/// review, each with its full review list attached.
///
/// Pull requests merged before `start_date` are ignored. Results keep the
/// order the service listed the pull requests in. The first failed request
/// fails the whole audit.
pub async fn audit_reviews<F>(
    forge: &F,
    repo: &Repo,
    start_date: Option<DateTime<Utc>>,
    options: &AuditOptions,
) -> Result<Vec<PullRequest>, RemoteApiError>
where
    F: Forge + ?Sized,
{
    info!(repo = %repo, "Fetching closed pull requests");
    let closed = collect_pages(|page| {
        debug!(repo = %repo, page, "Fetching pull request page");
        forge.closed_pull_requests(repo, page)
    })
    .await?;

    let total = closed.len();
    let candidates: Vec<PullRequest> = closed
        .into_iter()
        .filter(|pr| pr.merged_since(start_date))
        .collect();
    info!(
        repo = %repo,
        closed = total,
        merged = candidates.len(),
        "Checking reviews of merged pull requests"
    );

    let checked: Vec<Option<PullRequest>> = stream::iter(candidates)
        .map(|pr| unapproved(forge, repo, pr))
        .buffered(options.concurrency())
        .try_collect()
        .await?;

    Ok(checked.into_iter().flatten().collect())
}

async fn unapproved<F>(
    forge: &F,
    repo: &Repo,
    mut pr: PullRequest,
) -> Result<Option<PullRequest>, RemoteApiError>
where
    F: Forge + ?Sized,
{
    let number = pr.number;
    let reviews = collect_pages(|page| forge.reviews(repo, number, page)).await?;

    if has_approval(&reviews) {
        debug!(repo = %repo, number, "Pull request approved");
        return Ok(None);
    }

    debug!(
        repo = %repo,
        number,
        reviews = reviews.len(),
        "Pull request merged without approval"
    );
    pr.reviews = reviews;
    Ok(Some(pr))
}
