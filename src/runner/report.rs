//! Run reporting: console summary and persisted JSON log

use super::{TestRecord, TestSummary};
use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tabular::{Row, Table};
use tracing::{info, warn};

/// Detailed log of one run, consumable by an external status aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: TestSummary,
    pub results: Vec<TestRecord>,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, summary: TestSummary, results: Vec<TestRecord>) -> Self {
        Self { started_at, finished_at: Utc::now(), summary, results }
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// Persisting the log is a side effect of summarising; failure only warns.
    pub(crate) fn write_logged(&self, path: &Path) {
        match self.write_json(path) {
            Ok(()) => info!("Wrote run report to {}", path.display()),
            Err(e) => warn!("Failed to write run report to {}: {}", path.display(), e),
        }
    }
}

pub fn print_summary(summary: &TestSummary) {
    println!("\n{}", "═".repeat(60));
    println!("{}", "TEST SUMMARY".bold());
    println!("{}", "═".repeat(60));
    println!("Total:    {}", summary.total);
    println!("Passed:   {}", summary.passed.to_string().green());
    println!("Failed:   {}", summary.failed.to_string().red());
    println!("Skipped:  {}", summary.skipped.to_string().yellow());
    println!("Duration: {}ms", summary.total_duration_ms);

    if summary.failures.is_empty() {
        println!("\n{}", "All tests passed".green().bold());
        return;
    }

    println!("\n{}", "Failures".red().bold());
    let mut table = Table::new("{:<}  {:<}  {:<}");
    table.add_row(Row::new().with_cell("Suite").with_cell("Test").with_cell("Error"));
    table.add_row(Row::new().with_cell("-----").with_cell("----").with_cell("-----"));
    for failure in &summary.failures {
        table.add_row(
            Row::new()
                .with_cell(&failure.suite)
                .with_cell(&failure.name)
                .with_cell(first_line(&failure.error)),
        );
    }
    print!("{}", table);
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::TestResult;

    #[test]
    fn test_write_json_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("run.json");
        let records = vec![TestRecord {
            suite: "foundation".into(),
            result: TestResult::Skipped { name: "qdrant".into(), reason: "no api key".into() },
        }];
        let report =
            RunReport::new(Utc::now(), TestSummary::from_records(&records), records.clone());

        report.write_json(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"status\": \"skipped\""));
        let parsed: RunReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.results, records);
        assert_eq!(parsed.summary.skipped, 1);
    }

    #[test]
    fn test_first_line_of_multiline_error() {
        assert_eq!(first_line("HTTP 500\nstack"), "HTTP 500");
        assert_eq!(first_line(""), "");
    }
}
