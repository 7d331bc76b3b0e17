use std::{fmt, str::FromStr, sync::LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::RemoteApiError;

/// Review state that counts as an approval. Compared case-sensitively.
pub const APPROVED: &str = "APPROVED";

/// Combined status state that counts as passing. Compared case-sensitively.
pub const SUCCESS: &str = "success";

static NAME_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid name pattern"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoError {
    #[error("repository must be in format 'owner/repo', got: '{0}'")]
    Format(String),
    #[error("invalid characters in repository segment '{0}'")]
    InvalidSegment(String),
}

/// Owner/name pair identifying a repository on the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Repo {
    owner: String,
    name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();
        for segment in [&owner, &name] {
            if !NAME_SEGMENT.is_match(segment) {
                return Err(RepoError::InvalidSegment(segment.clone()));
            }
        }
        Ok(Self { owner, name })
    }

    /// Parses `owner/repo`. Surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Result<Self, RepoError> {
        match s.trim().split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                if name.contains('/') {
                    return Err(RepoError::Format(s.to_string()));
                }
                Self::new(owner, name)
            }
            _ => Err(RepoError::Format(s.to_string())),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for Repo {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Repo::parse(s)
    }
}

/// A single review left on a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub reviewer_login: String,
    pub state: String,
}

impl Review {
    pub fn is_approval(&self) -> bool {
        self.state == APPROVED
    }
}

/// True when at least one review is an approval.
pub fn has_approval(reviews: &[Review]) -> bool {
    reviews.iter().any(Review::is_approval)
}

/// A closed pull request as returned by the hosting service.
///
/// `reviews` is empty until the pull request has been flagged by the review
/// audit, at which point it holds every review in the order received.
#[derive(Debug, Clone, PartialEq)]
pub struct PullRequest {
    pub repo: Repo,
    pub number: u64,
    pub title: String,
    pub author_login: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub reviews: Vec<Review>,
}

impl PullRequest {
    /// Merged, and not before `start_date` when one is given.
    pub fn merged_since(&self, start_date: Option<DateTime<Utc>>) -> bool {
        match (self.merged_at, start_date) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(merged_at), Some(start)) => merged_at >= start,
        }
    }

    /// Distinct reviewer logins in the order they first reviewed.
    pub fn reviewer_logins(&self) -> Vec<&str> {
        let mut logins: Vec<&str> = Vec::with_capacity(self.reviews.len());
        for review in &self.reviews {
            if !logins.contains(&review.reviewer_login.as_str()) {
                logins.push(&review.reviewer_login);
            }
        }
        logins
    }
}

/// A commit from a repository's default branch history.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit {
    pub repo: Repo,
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub committer_date: DateTime<Utc>,
    pub url: String,
}

impl Commit {
    pub fn short_sha(&self) -> &str {
        self.sha.get(..7).unwrap_or(&self.sha)
    }

    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

/// Aggregate state the hosting service computes from all status checks of a
/// commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedStatus {
    pub state: String,
}

impl CombinedStatus {
    pub fn is_success(&self) -> bool {
        self.state == SUCCESS
    }
}

/// A commit whose combined status was anything other than success.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedCommit {
    pub commit: Commit,
    pub state: String,
}

/// Tuning shared by both audits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditOptions {
    /// Upper bound on review or status requests in flight at once. `1`
    /// issues them strictly one after another.
    pub concurrency: usize,
}

impl AuditOptions {
    pub fn concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Read access to a source-control hosting service.
///
/// Listing methods take a 1-based page number and return an empty vector
/// once the listing is exhausted.
#[async_trait]
pub trait Forge: Sync {
    async fn org_repositories(&self, org: &str, page: u32) -> Result<Vec<Repo>, RemoteApiError>;

    async fn closed_pull_requests(
        &self,
        repo: &Repo,
        page: u32,
    ) -> Result<Vec<PullRequest>, RemoteApiError>;

    async fn reviews(
        &self,
        repo: &Repo,
        number: u64,
        page: u32,
    ) -> Result<Vec<Review>, RemoteApiError>;

    async fn commits(&self, repo: &Repo, page: u32) -> Result<Vec<Commit>, RemoteApiError>;

    async fn combined_status(
        &self,
        repo: &Repo,
        sha: &str,
    ) -> Result<CombinedStatus, RemoteApiError>;
}
