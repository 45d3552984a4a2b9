use std::fs::OpenOptions;
use std::path::Path;
use std::sync::{LazyLock, Mutex};

use anyhow::{Context, Result};
use regex::Regex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static MISSING_COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"table `?([A-Za-z0-9_.]+)`? has no column named `?([A-Za-z0-9_]+)`?").unwrap()
});
static NO_SUCH_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"no such column: `?([A-Za-z0-9_.]+)`?").unwrap());
static MISSING_TABLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"no such table: `?([A-Za-z0-9_.]+)`?").unwrap());

/// Console output plus a plain-text copy appended to `log_file`.
pub fn init(log_file: &Path) -> Result<()> {
    if let Some(dir) = log_file.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory {:?}", dir))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {:?}", log_file))?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

/// Schema problem found in the log, for the repair tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogIssue {
    MissingColumn { table: String, column: String },
    /// UPDATE/SELECT failures name the column but not the table.
    UnknownColumn { column: String },
    MissingTable { table: String },
}

/// Deduplicated schema issues, in order of first appearance.
pub fn scan_for_issues(log: &str) -> Vec<LogIssue> {
    let mut issues = Vec::new();
    for line in log.lines() {
        for caps in MISSING_COLUMN_RE.captures_iter(line) {
            let issue = LogIssue::MissingColumn {
                table: caps[1].to_string(),
                column: caps[2].to_string(),
            };
            if !issues.contains(&issue) {
                issues.push(issue);
            }
        }
        for caps in NO_SUCH_COLUMN_RE.captures_iter(line) {
            let issue = LogIssue::UnknownColumn {
                column: caps[1].to_string(),
            };
            if !issues.contains(&issue) {
                issues.push(issue);
            }
        }
        for caps in MISSING_TABLE_RE.captures_iter(line) {
            let issue = LogIssue::MissingTable {
                table: caps[1].to_string(),
            };
            if !issues.contains(&issue) {
                issues.push(issue);
            }
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_both_patterns_once() {
        let log = "\
2024-01-05T10:00:00Z ERROR persistence error: table inmates has no column named eye_color
2024-01-05T10:00:01Z ERROR persistence error: no such table: inmate_detail_urls
2024-01-05T10:00:02Z ERROR persistence error: table `inmates` has no column named `eye_color`
2024-01-05T10:00:03Z INFO detail pass complete";
        let issues = scan_for_issues(log);
        assert_eq!(
            issues,
            vec![
                LogIssue::MissingColumn {
                    table: "inmates".into(),
                    column: "eye_color".into()
                },
                LogIssue::MissingTable {
                    table: "inmate_detail_urls".into()
                },
            ]
        );
    }

    #[test]
    fn finds_column_without_table() {
        let log = "2024-01-05T10:00:00Z ERROR detail: fatal error, aborting error=persistence error: no such column: facility";
        assert_eq!(
            scan_for_issues(log),
            vec![LogIssue::UnknownColumn {
                column: "facility".into()
            }]
        );
    }

    #[test]
    fn second_init_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("logs").join("scraper.log");
        init(&log).unwrap();
        assert!(log.exists());
        assert!(init(&log).is_err());
    }

    #[test]
    fn clean_log() {
        assert!(scan_for_issues("INFO all good\nWARN slow response").is_empty());
    }
}
