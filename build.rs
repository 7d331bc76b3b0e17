//! Build script for gh-audit: embeds a human-readable version string.
//!
//! The string is `{CARGO_PKG_VERSION} ({describe}) {rustc --version}` where
//! `describe` is `git describe --tags --always --dirty` when it names a tag,
//! otherwise a `v{version}-{commit time}-{short sha}` pseudo-version. Parts
//! that cannot be determined are left out.

use std::process::Command;

use chrono::{DateTime, Utc};

fn main() {
    for path in ["src", "build.rs", "Cargo.toml"] {
        println!("cargo:rerun-if-changed={path}");
    }

    let parts = [
        Some(env!("CARGO_PKG_VERSION").to_string()),
        describe().map(|d| format!("({d})")),
        run("rustc", &["--version"]),
    ];
    let info = parts.into_iter().flatten().collect::<Vec<_>>().join(" ");

    println!("cargo:rustc-env=BUILD_INFO_HUMAN={info}");
}

fn run(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn describe() -> Option<String> {
    let desc = run("git", &["describe", "--tags", "--always", "--dirty"])?;
    if desc.contains('v') || desc.contains("-g") {
        return Some(desc);
    }

    // Untagged history: fall back to a pseudo-version.
    let sha = run("git", &["rev-parse", "--short=12", "HEAD"])?;
    let committed = run("git", &["log", "-1", "--format=%ct"])
        .and_then(|s| s.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now);
    let dirty = if desc.ends_with("-dirty") { "+dirty" } else { "" };

    Some(format!(
        "v{}-{}-{sha}{dirty}",
        env!("CARGO_PKG_VERSION"),
        committed.format("%Y%m%d%H%M%S")
    ))
}
