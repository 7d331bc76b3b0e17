use std::{
    future::Future,
    process::Command,
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::header::{ACCEPT, USER_AGENT};
use octocrab::{Octocrab, models, params, service::middleware::retry::RetryConfig};
use reqwest_retry::{RetryDecision, RetryPolicy, policies::ExponentialBackoff};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::RemoteApiError,
    paging::PER_PAGE,
    types::{CombinedStatus, Commit, Forge, PullRequest, Repo, Review},
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const ACCEPT_V3: &str = "application/vnd.github.v3+json";
const AGENT: &str = concat!("gh-audit/", env!("CARGO_PKG_VERSION"));
// Login reported for reviews and pull requests by deleted accounts.
const GHOST_LOGIN: &str = "ghost";

pub fn get_github_token() -> Result<String> {
    // Prefer environment variables over gh CLI to avoid subprocess overhead.
    for var in ["GITHUB_TOKEN", "GH_TOKEN"] {
        if let Ok(token) = std::env::var(var) {
            if !token.trim().is_empty() {
                return Ok(token.trim().to_string());
            }
        }
    }

    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .context("No token given and the gh CLI could not be run")?;

    if !output.status.success() {
        anyhow::bail!(
            "No GitHub token found. Pass --token, set GITHUB_TOKEN or run 'gh auth login' first"
        );
    }

    let token = String::from_utf8(output.stdout)?.trim().to_string();

    if token.is_empty() {
        anyhow::bail!("Empty token returned from gh CLI");
    }

    Ok(token)
}

/// Connection settings for [`GitHub`].
#[derive(Debug, Clone, PartialEq)]
pub struct GitHubConfig {
    pub api_url: Url,
    /// Explicit token; `None` falls back to [`get_github_token`].
    pub token: Option<String>,
    /// Retries for transient failures. `0` means a failed request is final.
    pub max_retries: u32,
    /// Per-request timeout. `None` waits as long as the server takes.
    pub timeout: Option<Duration>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse(DEFAULT_API_URL).expect("default API URL is valid"),
            token: None,
            max_retries: 0,
            timeout: None,
        }
    }
}

/// Query of the paginated endpoints fetched through [`Octocrab::get`].
#[derive(Debug, Serialize)]
struct PageParams {
    per_page: u8,
    page: u32,
}

impl PageParams {
    fn new(page: u32) -> Self {
        Self {
            per_page: PER_PAGE,
            page,
        }
    }
}

/// GitHub REST v3 implementation of [`Forge`], built on octocrab.
pub struct GitHub {
    octocrab: Octocrab,
    api_url: Url,
    retry_policy: Option<ExponentialBackoff>,
    timeout: Option<Duration>,
}

impl GitHub {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        if config.api_url.cannot_be_a_base() {
            anyhow::bail!("API URL '{}' cannot be used as a base URL", config.api_url);
        }

        let token = match config.token {
            Some(token) => token,
            None => get_github_token().context("Failed to obtain GitHub authentication token")?,
        };

        // Retries happen in `send` so every failure kind shares one policy.
        let octocrab = Octocrab::builder()
            .base_uri(config.api_url.as_str())
            .context("Failed to set base URI")?
            .personal_token(token)
            .add_header(ACCEPT, ACCEPT_V3.to_string())
            .add_header(USER_AGENT, AGENT.to_string())
            .add_retry_config(RetryConfig::None)
            .build()
            .context("Failed to create GitHub client")?;

        let retry_policy = (config.max_retries > 0).then(|| {
            ExponentialBackoff::builder()
                .retry_bounds(Duration::from_millis(500), Duration::from_secs(30))
                .build_with_max_retries(config.max_retries)
        });

        Ok(Self {
            octocrab,
            api_url: config.api_url,
            retry_policy,
            timeout: config.timeout,
        })
    }

    /// Absolute URL of `route`, for error messages and logs.
    fn url_of(&self, route: &str) -> String {
        format!("{}{route}", self.api_url.as_str().trim_end_matches('/'))
    }

    /// Runs `request` under the configured timeout, retrying transient
    /// failures with exponential backoff.
    async fn send<T, R, Fut>(&self, route: &str, request: R) -> Result<T, RemoteApiError>
    where
        R: Fn() -> Fut,
        Fut: Future<Output = octocrab::Result<T>>,
    {
        let url = self.url_of(route);
        let started = SystemTime::now();
        let mut past_retries = 0;

        loop {
            debug!(url = %url, attempt = past_retries + 1, "GET");
            let result = match self.timeout {
                Some(limit) => match tokio::time::timeout(limit, request()).await {
                    Ok(result) => result.map_err(|err| remote_error(&url, err)),
                    Err(_) => Err(RemoteApiError::Timeout {
                        url: url.clone(),
                        after: limit,
                    }),
                },
                None => request().await.map_err(|err| remote_error(&url, err)),
            };

            let err = match result {
                Err(err) if err.is_transient() => err,
                other => return other,
            };
            let Some(policy) = &self.retry_policy else {
                return Err(err);
            };
            let RetryDecision::Retry { execute_after } = policy.should_retry(started, past_retries)
            else {
                return Err(err);
            };

            let wait = execute_after
                .duration_since(SystemTime::now())
                .unwrap_or_default();
            warn!(url = %url, error = %err, ?wait, "Request failed, retrying");
            tokio::time::sleep(wait).await;
            past_retries += 1;
        }
    }

    async fn get_json<T>(&self, route: &str, page: Option<u32>) -> Result<T, RemoteApiError>
    where
        T: DeserializeOwned + Send,
    {
        let params = page.map(PageParams::new);
        let display = match &params {
            Some(p) => format!("{route}?per_page={}&page={}", p.per_page, p.page),
            None => route.to_string(),
        };
        self.send(&display, || self.octocrab.get(route, params.as_ref()))
            .await
    }
}

fn remote_error(url: &str, err: octocrab::Error) -> RemoteApiError {
    match err {
        octocrab::Error::GitHub { source, .. } => RemoteApiError::Status {
            url: url.to_string(),
            status: source.status_code.as_u16(),
            body: source.message.clone(),
        },
        other => RemoteApiError::Request {
            url: url.to_string(),
            source: Box::new(other),
        },
    }
}

#[async_trait]
impl Forge for GitHub {
    async fn org_repositories(&self, org: &str, page: u32) -> Result<Vec<Repo>, RemoteApiError> {
        let route = format!("/orgs/{org}/repos?per_page={PER_PAGE}&page={page}");
        let listing = self
            .send(&route, move || async move {
                self.octocrab
                    .orgs(org)
                    .list_repos()
                    .per_page(PER_PAGE)
                    .page(page)
                    .send()
                    .await
            })
            .await?;

        listing
            .items
            .into_iter()
            .map(|repository| repo_from(repository, &self.url_of(&route)))
            .collect()
    }

    async fn closed_pull_requests(
        &self,
        repo: &Repo,
        page: u32,
    ) -> Result<Vec<PullRequest>, RemoteApiError> {
        let route = format!("/repos/{repo}/pulls?state=closed&per_page={PER_PAGE}&page={page}");
        let listing = self
            .send(&route, move || async move {
                self.octocrab
                    .pulls(repo.owner(), repo.name())
                    .list()
                    .state(params::State::Closed)
                    .per_page(PER_PAGE)
                    .page(page)
                    .send()
                    .await
            })
            .await?;

        listing
            .items
            .into_iter()
            .map(|pr| pull_request_from(repo, pr, &self.url_of(&route)))
            .collect()
    }

    async fn reviews(
        &self,
        repo: &Repo,
        number: u64,
        page: u32,
    ) -> Result<Vec<Review>, RemoteApiError> {
        let route = format!("/repos/{repo}/pulls/{number}/reviews?per_page={PER_PAGE}&page={page}");
        let listing = self
            .send(&route, move || async move {
                self.octocrab
                    .pulls(repo.owner(), repo.name())
                    .list_reviews(number)
                    .per_page(PER_PAGE)
                    .page(page)
                    .send()
                    .await
            })
            .await?;

        Ok(listing.items.into_iter().map(review_from).collect())
    }

    async fn commits(&self, repo: &Repo, page: u32) -> Result<Vec<Commit>, RemoteApiError> {
        let route = format!("/repos/{repo}/commits");
        let items: Vec<CommitItem> = self.get_json(&route, Some(page)).await?;
        let url = self.url_of(&route);
        items
            .into_iter()
            .map(|item| item.into_domain(repo, &url))
            .collect()
    }

    async fn combined_status(
        &self,
        repo: &Repo,
        sha: &str,
    ) -> Result<CombinedStatus, RemoteApiError> {
        let route = format!("/repos/{repo}/commits/{sha}/status");
        let item: CombinedStatusItem = self.get_json(&route, None).await?;
        Ok(CombinedStatus { state: item.state })
    }
}

fn login_of(author: Option<&models::Author>) -> String {
    author.map_or_else(|| GHOST_LOGIN.to_string(), |a| a.login.clone())
}

fn repo_from(repository: models::Repository, url: &str) -> Result<Repo, RemoteApiError> {
    let full_name = match (repository.full_name, repository.owner) {
        (Some(full_name), _) => full_name,
        (None, Some(owner)) => format!("{}/{}", owner.login, repository.name),
        (None, None) => repository.name,
    };
    Repo::parse(&full_name).map_err(|err| RemoteApiError::Unexpected {
        url: url.to_string(),
        reason: err.to_string(),
    })
}

fn pull_request_from(
    repo: &Repo,
    pr: models::pulls::PullRequest,
    url: &str,
) -> Result<PullRequest, RemoteApiError> {
    let Some(created_at) = pr.created_at else {
        return Err(RemoteApiError::Unexpected {
            url: url.to_string(),
            reason: format!("pull request #{} has no creation date", pr.number),
        });
    };

    Ok(PullRequest {
        repo: repo.clone(),
        number: pr.number,
        title: pr.title.unwrap_or_default(),
        author_login: login_of(pr.user.as_deref()),
        url: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
        created_at,
        merged_at: pr.merged_at,
        reviews: Vec::new(),
    })
}

fn review_from(review: models::pulls::Review) -> Review {
    Review {
        reviewer_login: login_of(review.user.as_ref()),
        state: review.state.as_ref().map(state_name).unwrap_or_default(),
    }
}

/// The state as the API spells it, e.g. `APPROVED`.
fn state_name(state: &models::pulls::ReviewState) -> String {
    use models::pulls::ReviewState;

    match state {
        ReviewState::Approved => "APPROVED".to_string(),
        ReviewState::Pending => "PENDING".to_string(),
        ReviewState::ChangesRequested => "CHANGES_REQUESTED".to_string(),
        ReviewState::Commented => "COMMENTED".to_string(),
        ReviewState::Dismissed => "DISMISSED".to_string(),
        other => format!("{other:?}").to_uppercase(),
    }
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    html_url: String,
    commit: GitCommit,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    message: String,
    author: Option<GitActor>,
    committer: Option<GitActor>,
}

#[derive(Debug, Deserialize)]
struct GitActor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

impl CommitItem {
    fn into_domain(self, repo: &Repo, url: &str) -> Result<Commit, RemoteApiError> {
        let Some(committer_date) = self.commit.committer.and_then(|c| c.date) else {
            return Err(RemoteApiError::Unexpected {
                url: url.to_string(),
                reason: format!("commit {} has no committer date", self.sha),
            });
        };

        Ok(Commit {
            repo: repo.clone(),
            sha: self.sha,
            message: self.commit.message,
            author_name: self
                .commit
                .author
                .and_then(|a| a.name)
                .unwrap_or_default(),
            committer_date,
            url: self.html_url,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CombinedStatusItem {
    state: String,
}
