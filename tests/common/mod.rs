#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gh_audit::{CombinedStatus, Commit, Forge, PullRequest, RemoteApiError, Repo, Review};

/// In-memory hosting service serving fixed pages and recording every
/// request it receives.
pub struct MockForge {
    page_size: usize,
    orgs: HashMap<String, Vec<Repo>>,
    pulls: HashMap<Repo, Vec<PullRequest>>,
    reviews: HashMap<(Repo, u64), Vec<Review>>,
    commits: HashMap<Repo, Vec<Commit>>,
    statuses: HashMap<String, String>,
    failing_repos: HashSet<Repo>,
    failing_orgs: HashSet<String>,
    requests: Mutex<Vec<String>>,
}

impl MockForge {
    pub fn new() -> Self {
        Self {
            page_size: 100,
            orgs: HashMap::new(),
            pulls: HashMap::new(),
            reviews: HashMap::new(),
            commits: HashMap::new(),
            statuses: HashMap::new(),
            failing_repos: HashSet::new(),
            failing_orgs: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_org(mut self, org: &str, repos: Vec<Repo>) -> Self {
        self.orgs.insert(org.to_string(), repos);
        self
    }

    pub fn with_pull(mut self, pr: PullRequest, reviews: Vec<Review>) -> Self {
        self.reviews.insert((pr.repo.clone(), pr.number), reviews);
        self.pulls.entry(pr.repo.clone()).or_default().push(pr);
        self
    }

    pub fn with_commit(mut self, commit: Commit, state: &str) -> Self {
        self.statuses.insert(commit.sha.clone(), state.to_string());
        self.commits.entry(commit.repo.clone()).or_default().push(commit);
        self
    }

    /// A commit the status endpoint knows nothing about.
    pub fn with_unreported_commit(mut self, commit: Commit) -> Self {
        self.commits.entry(commit.repo.clone()).or_default().push(commit);
        self
    }

    pub fn failing_repo(mut self, repo: Repo) -> Self {
        self.failing_repos.insert(repo);
        self
    }

    pub fn failing_org(mut self, org: &str) -> Self {
        self.failing_orgs.insert(org.to_string());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose path starts with `prefix`.
    pub fn requests_matching(&self, prefix: &str) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.starts_with(prefix))
            .collect()
    }

    fn record(&self, path: String) -> String {
        self.requests.lock().unwrap().push(path.clone());
        path
    }

    fn page<T: Clone>(&self, items: Option<&Vec<T>>, page: u32) -> Vec<T> {
        let start = (page as usize - 1) * self.page_size;
        items
            .map(|items| items.iter().skip(start).take(self.page_size).cloned().collect())
            .unwrap_or_default()
    }

    fn check_repo(&self, repo: &Repo, path: &str) -> Result<(), RemoteApiError> {
        if self.failing_repos.contains(repo) {
            return Err(server_error(path));
        }
        Ok(())
    }
}

pub fn server_error(path: &str) -> RemoteApiError {
    RemoteApiError::Status {
        url: format!("https://api.github.test/{path}"),
        status: 500,
        body: r#"{"message":"Server Error"}"#.to_string(),
    }
}

#[async_trait]
impl Forge for MockForge {
    async fn org_repositories(&self, org: &str, page: u32) -> Result<Vec<Repo>, RemoteApiError> {
        let path = self.record(format!("orgs/{org}/repos?page={page}"));
        if self.failing_orgs.contains(org) {
            return Err(server_error(&path));
        }
        Ok(self.page(self.orgs.get(org), page))
    }

    async fn closed_pull_requests(
        &self,
        repo: &Repo,
        page: u32,
    ) -> Result<Vec<PullRequest>, RemoteApiError> {
        let path = self.record(format!("repos/{repo}/pulls?page={page}"));
        self.check_repo(repo, &path)?;
        Ok(self.page(self.pulls.get(repo), page))
    }

    async fn reviews(
        &self,
        repo: &Repo,
        number: u64,
        page: u32,
    ) -> Result<Vec<Review>, RemoteApiError> {
        let path = self.record(format!("repos/{repo}/pulls/{number}/reviews?page={page}"));
        self.check_repo(repo, &path)?;
        Ok(self.page(self.reviews.get(&(repo.clone(), number)), page))
    }

    async fn commits(&self, repo: &Repo, page: u32) -> Result<Vec<Commit>, RemoteApiError> {
        let path = self.record(format!("repos/{repo}/commits?page={page}"));
        self.check_repo(repo, &path)?;
        Ok(self.page(self.commits.get(repo), page))
    }

    async fn combined_status(
        &self,
        repo: &Repo,
        sha: &str,
    ) -> Result<CombinedStatus, RemoteApiError> {
        let path = self.record(format!("repos/{repo}/commits/{sha}/status"));
        self.check_repo(repo, &path)?;
        match self.statuses.get(sha) {
            Some(state) => Ok(CombinedStatus {
                state: state.clone(),
            }),
            None => Err(RemoteApiError::Status {
                url: path,
                status: 404,
                body: r#"{"message":"Not Found"}"#.to_string(),
            }),
        }
    }
}

pub fn repo(full_name: &str) -> Repo {
    Repo::parse(full_name).unwrap()
}

pub fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}

pub fn pull(repo_name: &str, number: u64, merged_at: Option<DateTime<Utc>>) -> PullRequest {
    PullRequest {
        repo: repo(repo_name),
        number,
        title: format!("Change #{number}"),
        author_login: "alice".to_string(),
        url: format!("https://github.com/{repo_name}/pull/{number}"),
        created_at: day(2024, 1, 1),
        merged_at,
        reviews: vec![],
    }
}

pub fn review(login: &str, state: &str) -> Review {
    Review {
        reviewer_login: login.to_string(),
        state: state.to_string(),
    }
}

pub fn commit(repo_name: &str, sha: &str, committed: DateTime<Utc>) -> Commit {
    Commit {
        repo: repo(repo_name),
        sha: sha.to_string(),
        message: format!("Commit {sha}"),
        author_name: "Alice".to_string(),
        committer_date: committed,
        url: format!("https://github.com/{repo_name}/commit/{sha}"),
    }
}
