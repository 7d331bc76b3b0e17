mod common;

use common::{MockForge, commit, day, pull, repo, review};
use gh_audit::{Forge, RunSummary, parse_review_args, parse_status_args, run};

/// Parses raw arguments the way a binary does and runs the audit against
/// `forge`, returning the summary and everything printed.
async fn run_from_args<F>(
    parse: fn(Vec<String>) -> anyhow::Result<gh_audit::Invocation>,
    raw_args: &[&str],
    forge: &F,
) -> anyhow::Result<(RunSummary, String)>
where
    F: Forge,
{
    let invocation = parse(raw_args.iter().map(|s| s.to_string()).collect())?;
    let mut out = Vec::new();
    let summary = run(forge, &invocation.request, &mut out).await?;
    Ok((summary, String::from_utf8(out)?))
}

fn review_args(args: Vec<String>) -> anyhow::Result<gh_audit::Invocation> {
    parse_review_args(args)
}

fn status_args(args: Vec<String>) -> anyhow::Result<gh_audit::Invocation> {
    parse_status_args(args)
}

fn widgets() -> MockForge {
    MockForge::new()
        .with_pull(
            pull("acme/widgets", 41, Some(day(2024, 2, 20))),
            vec![review("bob", "COMMENTED")],
        )
        .with_pull(
            pull("acme/widgets", 42, Some(day(2024, 3, 5))),
            vec![review("bob", "COMMENTED"), review("dave", "CHANGES_REQUESTED")],
        )
        .with_pull(
            pull("acme/widgets", 43, Some(day(2024, 3, 6))),
            vec![review("carol", "APPROVED")],
        )
        .with_pull(pull("acme/widgets", 44, None), vec![])
}

#[tokio::test]
async fn test_review_audit_console_with_start_date() {
    let forge = widgets();

    let (summary, out) = run_from_args(
        review_args,
        &[
            "review-audit",
            "-r",
            "acme/widgets",
            "-s",
            "2024-03-01",
            "--console",
            "-p",
            "tok",
        ],
        &forge,
    )
    .await
    .unwrap();

    assert_eq!(summary.flagged, 1);
    assert!(out.contains("#42 - Change #42"));
    assert!(out.contains("reviewers: bob, dave"));
    assert!(!out.contains("#41"));
    assert!(!out.contains("#43"));
}

#[tokio::test]
async fn test_review_audit_without_start_date_writes_csv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reviews.csv");
    let forge = widgets();

    let (summary, out) = run_from_args(
        review_args,
        &[
            "review-audit",
            "-r",
            "acme/widgets",
            "-f",
            path.to_str().unwrap(),
            "-p",
            "tok",
        ],
        &forge,
    )
    .await
    .unwrap();

    assert_eq!(summary.flagged, 2);
    assert!(out.contains("2 results saved to"));
    let contents = std::fs::read_to_string(&path).unwrap();
    let mut lines = contents.lines();
    assert_eq!(
        lines.next(),
        Some("Repository,PR Number,Title,Sent Date,Merge Date,Link,From,Reviewers")
    );
    assert_eq!(
        lines.next(),
        Some(
            "acme/widgets,41,Change #41,2024-01-01T00:00:00Z,2024-02-20T00:00:00Z,\
             https://github.com/acme/widgets/pull/41,alice,bob"
        )
    );
    assert_eq!(
        lines.next(),
        Some(
            "acme/widgets,42,Change #42,2024-01-01T00:00:00Z,2024-03-05T00:00:00Z,\
             https://github.com/acme/widgets/pull/42,alice,\"bob, dave\""
        )
    );
    assert_eq!(lines.next(), None);
}

#[tokio::test]
async fn test_status_audit_org_skips_failing_repository() {
    let forge = MockForge::new()
        .with_org("acme", vec![repo("acme/broken"), repo("acme/widgets")])
        .failing_repo(repo("acme/broken"))
        .with_commit(commit("acme/widgets", "abc1234def", day(2024, 3, 2)), "pending");

    let (summary, out) = run_from_args(
        status_args,
        &[
            "status-audit",
            "-o",
            "acme",
            "-s",
            "2024-01-01",
            "--console",
            "-p",
            "tok",
        ],
        &forge,
    )
    .await
    .unwrap();

    assert_eq!(summary.skipped, vec![repo("acme/broken")]);
    assert!(out.contains("abc1234 [pending] Commit abc1234def"));
    assert!(out.contains("Skipped 1 repositories after errors: acme/broken"));
}

#[tokio::test]
async fn test_status_audit_org_aborts_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("statuses.csv");
    let forge = MockForge::new()
        .with_org("acme", vec![repo("acme/widgets"), repo("acme/broken")])
        .failing_repo(repo("acme/broken"))
        .with_commit(commit("acme/widgets", "abc1234def", day(2024, 3, 2)), "pending");

    let result = run_from_args(
        status_args,
        &[
            "status-audit",
            "-o",
            "acme",
            "-s",
            "2024-01-01",
            "-f",
            path.to_str().unwrap(),
            "--on-repo-error",
            "abort",
            "-p",
            "tok",
        ],
        &forge,
    )
    .await;

    assert!(result.is_err());
    assert!(!path.exists(), "no partial output after an aborted run");
}

#[tokio::test]
async fn test_status_audit_all_green() {
    let forge = MockForge::new()
        .with_commit(commit("acme/widgets", "abc1234def", day(2024, 3, 2)), "success");

    let (summary, out) = run_from_args(
        status_args,
        &[
            "status-audit",
            "-r",
            "acme/widgets",
            "-s",
            "2024-01-01",
            "--console",
            "-p",
            "tok",
        ],
        &forge,
    )
    .await
    .unwrap();

    assert_eq!(summary.flagged, 0);
    assert_eq!(out, "No commits found with unsuccessful status checks.\n");
}

#[tokio::test]
async fn test_usage_errors_never_reach_the_service() {
    let forge = widgets();

    let result = run_from_args(review_args, &["review-audit", "-r", "acme"], &forge).await;

    assert!(result.is_err());
    assert!(forge.requests().is_empty());
}
