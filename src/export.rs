use std::io;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::types::{FlaggedCommit, PullRequest};

pub const REVIEW_HEADERS: [&str; 8] = [
    "Repository",
    "PR Number",
    "Title",
    "Sent Date",
    "Merge Date",
    "Link",
    "From",
    "Reviewers",
];

pub const STATUS_HEADERS: [&str; 6] = ["Repo", "Commit SHA", "Message", "Date", "Author", "Link"];

/// Placeholder written to the Reviewers column when nobody reviewed.
pub const NO_REVIEWERS: &str = "None";

/// RFC 3339 in UTC with a `Z` suffix, e.g. `2024-01-15T10:00:00Z`.
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn reviewers_cell(pr: &PullRequest) -> String {
    let logins = pr.reviewer_logins();
    if logins.is_empty() {
        NO_REVIEWERS.to_string()
    } else {
        logins.join(", ")
    }
}

/// Writes one row per pull request under [`REVIEW_HEADERS`].
pub fn write_review_csv<W: io::Write>(writer: W, prs: &[PullRequest]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(REVIEW_HEADERS)?;
    for pr in prs {
        csv.write_record([
            pr.repo.to_string(),
            pr.number.to_string(),
            pr.title.clone(),
            format_timestamp(pr.created_at),
            pr.merged_at.map(format_timestamp).unwrap_or_default(),
            pr.url.clone(),
            pr.author_login.clone(),
            reviewers_cell(pr),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes one row per commit under [`STATUS_HEADERS`].
pub fn write_status_csv<W: io::Write>(writer: W, commits: &[FlaggedCommit]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(STATUS_HEADERS)?;
    for flagged in commits {
        let commit = &flagged.commit;
        csv.write_record([
            commit.repo.to_string(),
            commit.sha.clone(),
            commit.message.clone(),
            format_timestamp(commit.committer_date),
            commit.author_name.clone(),
            commit.url.clone(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}
