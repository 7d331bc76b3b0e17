use std::io::{self, IsTerminal, Write};

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_humanize::HumanTime;

use crate::{
    export::{format_timestamp, reviewers_cell},
    types::{FlaggedCommit, PullRequest, Repo},
};

const TITLE_TRUNCATION_SUFFIX: &str = "...";
const MIN_TITLE_WIDTH_FOR_TRUNCATION: usize = 10;

/// Width of the terminal stdout is attached to, or `None` when stdout is
/// redirected.
pub fn terminal_width() -> Option<usize> {
    if !io::stdout().is_terminal() {
        return None;
    }
    terminal_size::terminal_size().map(|(w, _)| w.0 as usize)
}

fn format_relative_time(time: DateTime<Utc>) -> String {
    HumanTime::from(time).to_string()
}

/// Shortens `title` so that `prefix_len + title` fits in `width` columns.
fn fit_title(title: &str, prefix_len: usize, width: Option<usize>) -> String {
    let Some(width) = width else {
        return title.to_string();
    };
    let available = width.saturating_sub(prefix_len);
    let length = title.chars().count();
    if length <= available || available < MIN_TITLE_WIDTH_FOR_TRUNCATION {
        return title.to_string();
    }
    let keep = available - TITLE_TRUNCATION_SUFFIX.len();
    let mut short: String = title.chars().take(keep).collect();
    short.push_str(TITLE_TRUNCATION_SUFFIX);
    short
}

/// Splits consecutive items into runs that share a repository.
fn group_by_repo<'a, T>(
    items: &'a [T],
    repo_of: impl Fn(&T) -> &Repo,
) -> Vec<(&'a Repo, &'a [T])> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=items.len() {
        if i == items.len() || repo_of(&items[i]) != repo_of(&items[start]) {
            groups.push((repo_of(&items[start]), &items[start..i]));
            start = i;
        }
    }
    groups
}

pub fn display_review_findings<W: Write>(
    prs: &[PullRequest],
    width: Option<usize>,
    writer: &mut W,
) -> Result<()> {
    for (repo, prs) in group_by_repo(prs, |pr| &pr.repo) {
        writeln!(writer)?;
        writeln!(writer, "Repository: {repo}")?;
        writeln!(writer, "Merged pull requests without approved reviews:")?;
        for pr in prs {
            let prefix = format!("#{} - ", pr.number);
            writeln!(
                writer,
                "{prefix}{}",
                fit_title(&pr.title, prefix.len(), width)
            )?;
            write!(writer, "    by {}", pr.author_login)?;
            if let Some(merged_at) = pr.merged_at {
                write!(writer, ", merged {}", format_relative_time(merged_at))?;
            }
            writeln!(writer, ", reviewers: {}", reviewers_cell(pr))?;
            writeln!(writer, "    {}", pr.url)?;
        }
    }
    Ok(())
}

pub fn display_status_findings<W: Write>(
    commits: &[FlaggedCommit],
    width: Option<usize>,
    writer: &mut W,
) -> Result<()> {
    for (repo, commits) in group_by_repo(commits, |c| &c.commit.repo) {
        writeln!(writer)?;
        writeln!(writer, "Repository: {repo}")?;
        writeln!(writer, "Commits without a successful status check:")?;
        for flagged in commits {
            let commit = &flagged.commit;
            let prefix = format!("{} [{}] ", commit.short_sha(), flagged.state);
            writeln!(
                writer,
                "{prefix}{}",
                fit_title(commit.summary(), prefix.len(), width)
            )?;
            writeln!(
                writer,
                "    by {}, committed {}",
                commit.author_name,
                format_timestamp(commit.committer_date)
            )?;
            writeln!(writer, "    {}", commit.url)?;
        }
    }
    Ok(())
}
