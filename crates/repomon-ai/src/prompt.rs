use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, warn};

/// Which report template to render a prompt from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    /// Condensed highlights of a single repository interval.
    Summary,
    /// Full per-repository progress report.
    DailyReport,
    /// Cross-repository digest for one interval.
    Consolidated,
}

impl ReportKind {
    /// Template file stem looked up on disk.
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Summary => "summary_prompt.txt",
            Self::DailyReport => "daily_report_prompt.txt",
            Self::Consolidated => "consolidated_prompt.txt",
        }
    }
}

const BUILTIN_SUMMARY: &str = "\
You are a release-notes assistant. Summarize the following repository \
activity into a short list of highlights. Group related items, keep each \
highlight to one sentence, and omit items with no user-visible effect.

Repository: {{repo}}
Interval: {{since}} to {{until}}

Activity:
{{activity}}
";

const BUILTIN_DAILY_REPORT: &str = "\
You are a project reporter. Write a markdown progress report for the \
repository below covering the given interval. Use exactly these sections \
in this order: '## Summary' (one-paragraph overview), '## Highlights' \
(the most significant completed items), '## Item Analysis' (each closed \
issue and merged pull request with its number and one line of analysis), \
'## Recommendations' (follow-ups the activity suggests). Be factual; do \
not invent activity that is not listed.

Repository: {{repo}}
Interval: {{since}} to {{until}}

Activity:
{{activity}}
";

const BUILTIN_CONSOLIDATED: &str = "\
You are a project reporter. Combine the per-repository reports below into \
one consolidated markdown digest for the interval. Start with an overview \
paragraph naming the most active repositories, then one '## {repository}' \
section per input report. Preserve issue and pull request numbers. If a \
repository section says it had no activity or could not be processed, \
carry that statement through unchanged.

Interval: {{since}} to {{until}}

Reports:
{{reports}}
";

/// Resolves prompt templates through a fallback chain, most specific
/// first: a provider-specific file, then a generic file, then a built-in
/// default. Resolution is total; any provider string yields a template.
#[derive(Debug, Clone)]
pub struct PromptResolver {
    prompts_dir: Option<PathBuf>,
    provider: String,
}

impl PromptResolver {
    pub fn new(prompts_dir: Option<PathBuf>, provider: impl Into<String>) -> Self {
        Self {
            prompts_dir,
            provider: provider.into(),
        }
    }

    /// Resolve the template for `kind`.
    ///
    /// Lookup order: `<dir>/<provider>/<file>`, then `<dir>/<file>`, then
    /// the compiled-in default. Unreadable files fall through to the next
    /// candidate.
    pub fn resolve(&self, kind: ReportKind) -> String {
        if let Some(dir) = &self.prompts_dir {
            let candidates = [dir.join(&self.provider).join(kind.file_name()), dir.join(kind.file_name())];
            for path in candidates {
                match std::fs::read_to_string(&path) {
                    Ok(text) => {
                        debug!(path = %path.display(), "loaded prompt template");
                        return text;
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "unreadable prompt template, falling through");
                        continue;
                    }
                }
            }
        }
        builtin(kind).to_string()
    }
}

fn builtin(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::Summary => BUILTIN_SUMMARY,
        ReportKind::DailyReport => BUILTIN_DAILY_REPORT,
        ReportKind::Consolidated => BUILTIN_CONSOLIDATED,
    }
}

/// Replace `{{name}}` placeholders with the given values in one pass over
/// the template. Placeholders with no matching value are left verbatim, so
/// template text can never make substitution fail. Substituted values are
/// not rescanned; placeholder-shaped text inside a value (say, an issue
/// title quoting `{{repo}}`) comes through untouched.
pub fn substitute(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated opener: emit the tail as-is.
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                out.push_str("{{");
                out.push_str(name);
                out.push_str("}}");
            }
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}
