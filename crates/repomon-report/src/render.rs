//! Deterministic markdown rendering: the activity digest handed to the
//! model, and the fixed bodies written without invoking one.

use chrono::{DateTime, Utc};
use repomon_common::types::{ActivityKind, DateRange, RepoId, ReportSubject, Snapshot};

/// Fixed header every generated report starts with: subject, generation
/// timestamp, source range.
pub fn report_header(
    subject: &ReportSubject,
    range: DateRange,
    generated_at: DateTime<Utc>,
    provider: &str,
) -> String {
    format!(
        "# {subject} ({} to {})\n\n_Generated {} via {provider}._\n\n",
        range.since,
        range.until,
        generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

/// Markdown digest of a snapshot, used both as prompt input and as the
/// structured half of a progress report.
pub fn activity_digest(snapshot: &Snapshot) -> String {
    let mut out = format!(
        "# Progress for {} ({} to {})\n",
        snapshot.repo, snapshot.range.since, snapshot.range.until
    );

    let issues: Vec<_> = snapshot
        .records
        .iter()
        .filter(|r| r.kind == ActivityKind::Issue)
        .collect();
    let pulls: Vec<_> = snapshot
        .records
        .iter()
        .filter(|r| r.kind == ActivityKind::PullRequest)
        .collect();

    if !issues.is_empty() {
        out.push_str("\n## Issues\n");
        for record in issues {
            out.push_str(&format!(
                "- [{}] {} (#{})\n",
                record.state.as_str().to_uppercase(),
                record.title,
                record.id
            ));
        }
    }
    if !pulls.is_empty() {
        out.push_str("\n## Pull Requests\n");
        for record in pulls {
            out.push_str(&format!(
                "- [{}] {} (#{})\n",
                record.state.as_str().to_uppercase(),
                record.title,
                record.id
            ));
        }
    }
    out
}

/// Fixed body written when an interval has no tracked activity.
pub fn no_activity_body(repo: &RepoId, range: DateRange) -> String {
    format!(
        "# Progress for {repo} ({} to {})\n\nNo tracked activity in this interval.\n",
        range.since, range.until
    )
}

/// Section embedded in a consolidated report for an entity whose run
/// failed.
pub fn failure_notice(repo: &RepoId, range: DateRange, reason: &str) -> String {
    format!(
        "## {repo}\n\nThis repository could not be processed for {} to {}: {reason}\n",
        range.since, range.until
    )
}

/// Fixed consolidated body used when no entity produced generated content.
pub fn consolidated_placeholder(range: DateRange, sections: &[String]) -> String {
    let mut out = format!(
        "# Consolidated report ({} to {})\n\n",
        range.since, range.until
    );
    if sections.is_empty() {
        out.push_str("No tracked activity in this interval.\n");
    } else {
        out.push_str(&sections.join("\n"));
    }
    out
}
