//! gh-audit: compliance audits over GitHub repositories.
//!
//! Finds merged pull requests that never received an approving review and
//! commits whose combined status check did not succeed, for a single
//! repository or every repository of an organization. Findings are printed
//! to the console or exported as CSV.

pub mod cli;
pub mod display;
pub mod error;
pub mod export;
pub mod github;
pub mod lister;
pub mod paging;
pub mod report;
pub mod reviews;
pub mod statuses;
pub mod types;

pub use cli::{Invocation, parse_review_args, parse_start_date, parse_status_args};
pub use error::RemoteApiError;
pub use github::{GitHub, GitHubConfig};
pub use lister::list_repositories;
pub use report::{
    AuditKind, AuditRequest, FailurePolicy, Findings, Output, RunSummary, Target, collect_findings,
    run,
};
pub use reviews::audit_reviews;
pub use statuses::audit_statuses;
pub use types::{
    AuditOptions, CombinedStatus, Commit, FlaggedCommit, Forge, PullRequest, Repo, RepoError,
    Review,
};
