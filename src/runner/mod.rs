//! Test registry and runner
//!
//! Tests run strictly in declaration order, one at a time. Every declared test
//! produces exactly one [`TestResult`]; a failing or panicking body is recorded
//! as a failure and never aborts the run.

pub mod assertions;
pub mod report;
pub mod stats;

use crate::error::{ProbeError, Result};
use colored::*;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub use assertions::{expect_contains, expect_eq, expect_status, expect_true};
pub use report::RunReport;
pub use stats::{LatencyResult, ProbabilisticResult, TestOutcome, ThroughputResult};

/// Prefix attached to errors that are not assertion failures.
pub const UNEXPECTED_ERROR_PREFIX: &str = "Unexpected error: ";
/// Prefix attached to panics caught inside a test body.
pub const PANIC_PREFIX: &str = "Panic: ";

const DEFAULT_SUITE: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TestResult {
    Success { name: String, duration_ms: u64 },
    Failure { name: String, error: String, duration_ms: u64 },
    Skipped { name: String, reason: String },
}

impl TestResult {
    pub fn name(&self) -> &str {
        match self {
            TestResult::Success { name, .. }
            | TestResult::Failure { name, .. }
            | TestResult::Skipped { name, .. } => name,
        }
    }

    /// Skipped tests carry no duration.
    pub fn duration_ms(&self) -> u64 {
        match self {
            TestResult::Success { duration_ms, .. } | TestResult::Failure { duration_ms, .. } => {
                *duration_ms
            }
            TestResult::Skipped { .. } => 0,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TestResult::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TestResult::Failure { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TestResult::Skipped { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TestResult::Failure { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// A result together with the suite it was declared in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub suite: String,
    #[serde(flatten)]
    pub result: TestResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub suite: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_duration_ms: u64,
    pub failures: Vec<FailureDetail>,
}

impl TestSummary {
    pub fn from_records(records: &[TestRecord]) -> Self {
        let mut summary = TestSummary { total: records.len(), ..Default::default() };

        for record in records {
            summary.total_duration_ms += record.result.duration_ms();
            match &record.result {
                TestResult::Success { .. } => summary.passed += 1,
                TestResult::Skipped { .. } => summary.skipped += 1,
                TestResult::Failure { name, error, .. } => {
                    summary.failed += 1;
                    summary.failures.push(FailureDetail {
                        suite: record.suite.clone(),
                        name: name.clone(),
                        error: error.clone(),
                    });
                }
            }
        }

        summary
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Process exit code for CI: non-zero when anything failed.
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }
}

pub struct TestRunner {
    records: Vec<TestRecord>,
    current_suite: String,
    report_path: Option<PathBuf>,
    started_at: chrono::DateTime<chrono::Utc>,
}

impl TestRunner {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            current_suite: DEFAULT_SUITE.to_string(),
            report_path: None,
            started_at: chrono::Utc::now(),
        }
    }

    /// Persist a JSON report to `path` every time [`TestRunner::summary`] runs.
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Group the following tests under `name` until the guard is dropped.
    /// Grouping only affects reporting.
    pub fn suite(&mut self, name: &str) -> SuiteGuard<'_> {
        println!("\n{}", format!("▶ {}", name).cyan().bold());
        info!(suite = name, "Starting suite");
        let previous = std::mem::replace(&mut self.current_suite, name.to_string());
        SuiteGuard { runner: self, previous: Some(previous), started: Instant::now() }
    }

    pub fn current_suite(&self) -> &str {
        &self.current_suite
    }

    /// Run `body` as a single test and record its outcome.
    pub async fn test<F, Fut>(&mut self, name: &str, body: F) -> &TestResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        debug!(suite = %self.current_suite, test = name, "Running test");
        let start = Instant::now();
        let outcome = run_guarded(body).await;
        let duration_ms = elapsed_ms(start.elapsed());

        let result = match outcome {
            Ok(()) => TestResult::Success { name: name.to_string(), duration_ms },
            Err(error) => TestResult::Failure { name: name.to_string(), error, duration_ms },
        };
        self.record(result)
    }

    /// Skip with `reason` when one is given, otherwise run `body` as [`TestRunner::test`] does.
    pub async fn skip_if<F, Fut>(&mut self, name: &str, reason: Option<&str>, body: F) -> &TestResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        match reason {
            Some(reason) => self.skip(name, reason),
            None => self.test(name, body).await,
        }
    }

    /// Record a skipped test without running anything.
    pub fn skip(&mut self, name: &str, reason: &str) -> &TestResult {
        self.record(TestResult::Skipped { name: name.to_string(), reason: reason.to_string() })
    }

    /// Record an already-computed result. Recorded results are never revised.
    pub fn record(&mut self, result: TestResult) -> &TestResult {
        print_result_line(&result);
        self.records.push(TestRecord { suite: self.current_suite.clone(), result });
        &self.records[self.records.len() - 1].result
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    pub fn results(&self) -> impl Iterator<Item = &TestResult> {
        self.records.iter().map(|r| &r.result)
    }

    /// Recompute the aggregate from the recorded results. Writes the JSON
    /// report when a report path is configured.
    pub fn summary(&self) -> TestSummary {
        let summary = TestSummary::from_records(&self.records);
        if let Some(path) = &self.report_path {
            let report = RunReport::new(self.started_at, summary.clone(), self.records.clone());
            report.write_logged(path);
        }
        summary
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores the enclosing suite name when dropped.
pub struct SuiteGuard<'a> {
    runner: &'a mut TestRunner,
    previous: Option<String>,
    started: Instant,
}

impl Deref for SuiteGuard<'_> {
    type Target = TestRunner;

    fn deref(&self) -> &TestRunner {
        self.runner
    }
}

impl DerefMut for SuiteGuard<'_> {
    fn deref_mut(&mut self) -> &mut TestRunner {
        self.runner
    }
}

impl Drop for SuiteGuard<'_> {
    fn drop(&mut self) {
        info!(
            suite = %self.runner.current_suite,
            elapsed_ms = elapsed_ms(self.started.elapsed()),
            "Finished suite"
        );
        if let Some(previous) = self.previous.take() {
            self.runner.current_suite = previous;
        }
    }
}

/// Await `body`, converting errors and panics into failure messages.
pub(crate) async fn run_guarded<F, Fut, T>(body: F) -> std::result::Result<T, String>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(async move { body().await }).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(failure_message(&err)),
        Err(panic) => Err(format!("{}{}", PANIC_PREFIX, panic_message(panic.as_ref()))),
    }
}

/// Assertion failures keep their message; anything else is prefixed so the
/// two can be told apart in reports.
pub fn failure_message(err: &ProbeError) -> String {
    if err.is_assertion() {
        err.to_string()
    } else {
        format!("{}{}", UNEXPECTED_ERROR_PREFIX, err)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

pub(crate) fn elapsed_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

fn print_result_line(result: &TestResult) {
    match result {
        TestResult::Success { name, duration_ms } => {
            println!("  {} {} ({}ms)", "✓".green(), name, duration_ms);
        }
        TestResult::Failure { name, error, duration_ms } => {
            println!("  {} {} ({}ms)", "✗".red(), name.red(), duration_ms);
            println!("      {}", error.red());
        }
        TestResult::Skipped { name, reason } => {
            println!("  {} {} (skipped: {})", "⊘".yellow(), name.yellow(), reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_failure_and_skip_are_recorded_in_order() {
        let mut runner = TestRunner::new();

        runner.test("passes", || async { Ok(()) }).await;
        runner
            .test("fails", || async { Err(ProbeError::assertion("expected 1 but was 2")) })
            .await;
        runner.skip("skipped", "service not deployed");

        let names: Vec<&str> = runner.results().map(|r| r.name()).collect();
        assert_eq!(names, vec!["passes", "fails", "skipped"]);

        let results: Vec<&TestResult> = runner.results().collect();
        assert!(results[0].is_success());
        assert_eq!(results[1].error(), Some("expected 1 but was 2"));
        assert!(results[2].is_skipped());
    }

    #[tokio::test]
    async fn test_skip_if_does_not_run_body() {
        let mut runner = TestRunner::new();
        let mut ran = false;

        runner
            .skip_if("guarded", Some("QDRANT_API_KEY not set"), || async {
                ran = true;
                Ok(())
            })
            .await;
        assert!(!ran);
        assert!(runner.skip_if("open", None, || async { Ok(()) }).await.is_success());

        let summary = runner.summary();
        assert_eq!((summary.skipped, summary.passed), (1, 1));
    }

    #[tokio::test]
    async fn test_unexpected_errors_are_prefixed() {
        let mut runner = TestRunner::new();
        let result = runner
            .test("transport", || async { Err(ProbeError::http(502, "bad gateway")) })
            .await
            .clone();

        assert_eq!(result.error(), Some("Unexpected error: HTTP 502: bad gateway"));
    }

    #[tokio::test]
    async fn test_panic_does_not_abort_the_run() {
        let mut runner = TestRunner::new();

        runner
            .test("panics", || async {
                let values: Vec<u32> = Vec::new();
                if values.is_empty() {
                    panic!("boom");
                }
                Ok(())
            })
            .await;
        runner.test("still runs", || async { Ok(()) }).await;

        let summary = runner.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failures[0].error, "Panic: boom");
    }

    #[tokio::test]
    async fn test_suite_guard_scopes_suite_names() {
        let mut runner = TestRunner::new();
        {
            let mut suite = runner.suite("auth");
            suite.test("login", || async { Ok(()) }).await;
            {
                let mut nested = suite.suite("oidc");
                nested.test("token", || async { Ok(()) }).await;
            }
            suite.test("logout", || async { Ok(()) }).await;
        }
        runner.test("after", || async { Ok(()) }).await;

        let suites: Vec<&str> = runner.records().iter().map(|r| r.suite.as_str()).collect();
        assert_eq!(suites, vec!["auth", "oidc", "auth", "default"]);
    }

    #[test]
    fn test_summary_excludes_skipped_from_duration() {
        let records = vec![
            TestRecord {
                suite: "s".into(),
                result: TestResult::Success { name: "a".into(), duration_ms: 10 },
            },
            TestRecord {
                suite: "s".into(),
                result: TestResult::Failure {
                    name: "b".into(),
                    error: "nope".into(),
                    duration_ms: 5,
                },
            },
            TestRecord {
                suite: "s".into(),
                result: TestResult::Skipped { name: "c".into(), reason: "later".into() },
            },
        ];

        let summary = TestSummary::from_records(&records);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total_duration_ms, 15);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(
            summary.failures,
            vec![FailureDetail { suite: "s".into(), name: "b".into(), error: "nope".into() }]
        );
    }

    #[tokio::test]
    async fn test_summary_writes_report_when_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut runner = TestRunner::new().with_report_path(&path);

        runner.test("ok", || async { Ok(()) }).await;
        let summary = runner.summary();

        let written: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.summary, summary);
        assert_eq!(written.results.len(), 1);
        assert_eq!(written.results[0].result.name(), "ok");
    }
}
