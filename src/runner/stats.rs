//! Statistical tests: probabilistic pass rates, latency percentiles and
//! sequential throughput.
//!
//! Trials run one after another on the calling task. Outcomes are
//! probabilistic but their order is fixed, which keeps "is this operation
//! reliable and fast enough under serialized load" separate from concurrent
//! load testing. `throughput_test` measures the issue rate of a single
//! sequential caller, not what the system sustains under parallel clients.

use super::{elapsed_ms, run_guarded, TestResult, TestRunner};
use crate::error::{ProbeError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Latency substituted for a trial that failed.
pub const FAILED_TRIAL_LATENCY_MS: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub trial_index: usize,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilisticResult {
    pub name: String,
    pub trials: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub acceptable_failure_rate: f64,
    pub actual_failure_rate: f64,
    pub passed: bool,
    pub total_duration_ms: u64,
    pub outcomes: Vec<TestOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyResult {
    pub name: String,
    pub trials: usize,
    pub failed_trials: usize,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: u64,
    pub median_ms: u64,
    pub p95_ms: u64,
    pub std_dev_ms: f64,
    pub max_median_ms: u64,
    pub max_p95_ms: u64,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputResult {
    pub name: String,
    pub elapsed_seconds: f64,
    pub total_ops: u64,
    pub errors: u64,
    pub ops_per_second: f64,
    pub error_rate: f64,
    pub min_ops_per_second: f64,
    pub passed: bool,
}

/// Order statistics over a set of latency samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: u64,
    pub median_ms: u64,
    pub p95_ms: u64,
    pub std_dev_ms: f64,
}

impl LatencyStats {
    /// `median = sorted[n/2]` and `p95 = sorted[floor(n * 0.95)]`, no
    /// interpolation. The mean is truncated to whole milliseconds and the
    /// standard deviation is taken against that truncated mean, so historical
    /// reports stay comparable.
    pub fn from_samples(samples: &[u64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();

        let sum: u128 = sorted.iter().map(|&v| v as u128).sum();
        let mean_ms = (sum / n as u128) as u64;
        let variance = sorted
            .iter()
            .map(|&v| {
                let deviation = v as f64 - mean_ms as f64;
                deviation * deviation
            })
            .sum::<f64>()
            / n as f64;

        let p95_index = ((n as f64 * 0.95) as usize).min(n - 1);

        Some(Self {
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            mean_ms,
            median_ms: sorted[n / 2],
            p95_ms: sorted[p95_index],
            std_dev_ms: variance.sqrt(),
        })
    }
}

/// `errors / (ops + errors)`, defined as 0 when nothing ran.
pub fn error_rate(ops: u64, errors: u64) -> f64 {
    let attempts = ops + errors;
    if attempts == 0 {
        0.0
    } else {
        errors as f64 / attempts as f64
    }
}

/// Await `fut` and return how long it took alongside its output.
pub async fn timed<Fut, T>(fut: Fut) -> Result<Duration>
where
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    fut.await?;
    Ok(start.elapsed())
}

impl TestRunner {
    /// Run `body` `trials` times; the test passes when the observed failure
    /// rate does not exceed `acceptable_failure_rate` (boundary inclusive).
    pub async fn probabilistic_test<F, Fut, T>(
        &mut self,
        name: &str,
        trials: usize,
        acceptable_failure_rate: f64,
        mut body: F,
    ) -> Result<ProbabilisticResult>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if trials == 0 {
            return Err(self.reject(name, "trials must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&acceptable_failure_rate) {
            return Err(self.reject(name, "acceptable failure rate must be within [0, 1]"));
        }

        info!("Probabilistic test '{}': {} trials", name, trials);
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(trials);

        for trial_index in 0..trials {
            let trial_start = Instant::now();
            let outcome = run_guarded(|| body(trial_index)).await;
            let duration_ms = elapsed_ms(trial_start.elapsed());

            if let Err(e) = &outcome {
                debug!("Trial {} of '{}' failed: {}", trial_index, name, e);
            }
            outcomes.push(TestOutcome {
                trial_index,
                success: outcome.is_ok(),
                duration_ms,
                error: outcome.err(),
            });
        }

        let success_count = outcomes.iter().filter(|o| o.success).count();
        let failure_count = trials - success_count;
        let actual_failure_rate = failure_count as f64 / trials as f64;
        let passed = actual_failure_rate <= acceptable_failure_rate;
        let total_duration_ms = elapsed_ms(start.elapsed());

        let result = ProbabilisticResult {
            name: name.to_string(),
            trials,
            success_count,
            failure_count,
            acceptable_failure_rate,
            actual_failure_rate,
            passed,
            total_duration_ms,
            outcomes,
        };

        let detail = format!(
            "{}/{} trials failed ({:.1}% > {:.1}% acceptable)",
            failure_count,
            trials,
            actual_failure_rate * 100.0,
            acceptable_failure_rate * 100.0
        );
        self.record_statistical(name, passed, detail, total_duration_ms);
        Ok(result)
    }

    /// Run `body` `trials` times; each trial reports an observed latency.
    /// A failed trial counts as [`FAILED_TRIAL_LATENCY_MS`].
    pub async fn latency_test<F, Fut>(
        &mut self,
        name: &str,
        trials: usize,
        max_median_latency: Duration,
        max_p95_latency: Duration,
        mut body: F,
    ) -> Result<LatencyResult>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<Duration>>,
    {
        if trials == 0 {
            return Err(self.reject(name, "trials must be greater than zero"));
        }

        info!("Latency test '{}': {} trials", name, trials);
        let start = Instant::now();
        let mut samples = Vec::with_capacity(trials);
        let mut failed_trials = 0;

        for trial_index in 0..trials {
            match run_guarded(|| body(trial_index)).await {
                Ok(latency) => samples.push(elapsed_ms(latency)),
                Err(e) => {
                    debug!("Trial {} of '{}' failed: {}", trial_index, name, e);
                    failed_trials += 1;
                    samples.push(FAILED_TRIAL_LATENCY_MS);
                }
            }
        }

        let stats = LatencyStats::from_samples(&samples)
            .ok_or_else(|| ProbeError::Configuration("no latency samples".to_string()))?;
        let max_median_ms = elapsed_ms(max_median_latency);
        let max_p95_ms = elapsed_ms(max_p95_latency);
        let passed = stats.median_ms <= max_median_ms && stats.p95_ms <= max_p95_ms;

        let result = LatencyResult {
            name: name.to_string(),
            trials,
            failed_trials,
            min_ms: stats.min_ms,
            max_ms: stats.max_ms,
            mean_ms: stats.mean_ms,
            median_ms: stats.median_ms,
            p95_ms: stats.p95_ms,
            std_dev_ms: stats.std_dev_ms,
            max_median_ms,
            max_p95_ms,
            passed,
        };

        let detail = format!(
            "median {}ms (max {}ms), p95 {}ms (max {}ms)",
            result.median_ms, max_median_ms, result.p95_ms, max_p95_ms
        );
        self.record_statistical(name, passed, detail, elapsed_ms(start.elapsed()));
        Ok(result)
    }

    /// Invoke `body` back to back until `duration` has elapsed and compare the
    /// completed-operation rate against `min_ops_per_second`.
    pub async fn throughput_test<F, Fut, T>(
        &mut self,
        name: &str,
        duration: Duration,
        min_ops_per_second: f64,
        mut body: F,
    ) -> Result<ThroughputResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        info!("Throughput test '{}': {:?}", name, duration);
        let start = Instant::now();
        let deadline = start + duration;
        let mut total_ops: u64 = 0;
        let mut errors: u64 = 0;

        while Instant::now() < deadline {
            match run_guarded(&mut body).await {
                Ok(_) => total_ops += 1,
                Err(e) => {
                    errors += 1;
                    if errors == 1 {
                        warn!("First error in throughput test '{}': {}", name, e);
                    }
                }
            }
        }

        let elapsed = start.elapsed();
        let elapsed_seconds = elapsed.as_secs_f64();
        let ops_per_second =
            if elapsed_seconds > 0.0 { total_ops as f64 / elapsed_seconds } else { 0.0 };
        let passed = ops_per_second >= min_ops_per_second;

        let result = ThroughputResult {
            name: name.to_string(),
            elapsed_seconds,
            total_ops,
            errors,
            ops_per_second,
            error_rate: error_rate(total_ops, errors),
            min_ops_per_second,
            passed,
        };

        let detail = format!(
            "{:.2} ops/s (min {:.2}), {} errors ({:.1}%)",
            ops_per_second,
            min_ops_per_second,
            errors,
            result.error_rate * 100.0
        );
        self.record_statistical(name, passed, detail, elapsed_ms(elapsed));
        Ok(result)
    }

    fn record_statistical(&mut self, name: &str, passed: bool, detail: String, duration_ms: u64) {
        let result = if passed {
            info!("'{}' passed: {}", name, detail);
            TestResult::Success { name: name.to_string(), duration_ms }
        } else {
            TestResult::Failure { name: name.to_string(), error: detail, duration_ms }
        };
        self.record(result);
    }

    fn reject(&mut self, name: &str, reason: &str) -> ProbeError {
        self.record(TestResult::Failure {
            name: name.to_string(),
            error: format!("Invalid configuration: {}", reason),
            duration_ms: 0,
        });
        ProbeError::Configuration(reason.to_string())
    }
}
