use tracing::{debug, info};

use crate::{
    error::RemoteApiError,
    paging::collect_pages,
    types::{Forge, Repo},
};

/// Lists every repository of `organization`, in the order the service
/// returns them.
///
/// Nothing is cached: every call walks the listing from page 1.
pub async fn list_repositories<F>(forge: &F, organization: &str) -> Result<Vec<Repo>, RemoteApiError>
where
    F: Forge + ?Sized,
{
    info!(organization, "Fetching repositories");
    let repos = collect_pages(|page| {
        debug!(organization, page, "Fetching repository page");
        forge.org_repositories(organization, page)
    })
    .await?;
    info!(organization, count = repos.len(), "Fetched repositories");
    Ok(repos)
}
