//! Statistical checks: reliability, latency and throughput of the SSO portal

use crate::context::ProbeContext;
use crate::http::ensure_success;
use crate::runner::stats::timed;
use crate::runner::{expect_true, TestRunner};
use std::time::Duration;
use tracing::debug;

pub async fn run(runner: &mut TestRunner, ctx: &ProbeContext) {
    let mut suite = runner.suite("Statistical");
    let health = ctx.endpoints.sso("/api/health");
    let health = health.as_str();

    let reliability = suite
        .probabilistic_test("SSO health endpoint is reliable", 20, 0.05, |_| async move {
            ensure_success(ctx.client.get(health).send().await?).await
        })
        .await;
    if let Ok(result) = reliability {
        debug!("{}: {}/{} trials succeeded", result.name, result.success_count, result.trials);
    }

    let latency = suite
        .latency_test(
            "SSO health endpoint latency",
            20,
            Duration::from_millis(500),
            Duration::from_millis(2000),
            |_| async move { timed(async { ensure_success(ctx.client.get(health).send().await?).await }).await },
        )
        .await;
    if let Ok(result) = latency {
        debug!("{}: mean {}ms, stddev {:.1}ms", result.name, result.mean_ms, result.std_dev_ms);
    }

    let throughput = suite
        .throughput_test("SSO health sequential request rate", Duration::from_secs(5), 5.0, || async move {
            ensure_success(ctx.client.get(health).send().await?).await
        })
        .await;
    if let Ok(result) = throughput {
        debug!("{}: {} ops, {} errors", result.name, result.total_ops, result.errors);
    }

    if !ctx.identity().is_enabled() {
        suite.skip(
            "Ephemeral login round trip is reliable",
            "directory access not configured (LDAP_ADMIN_PASSWORD)",
        );
        return;
    }

    let logins = suite
        .probabilistic_test("Ephemeral login round trip is reliable", 5, 0.2, |trial| async move {
            let outcome = async {
                ctx.session.login_with_ephemeral_user(&["users"]).await?;
                expect_true(ctx.session.verify_auth().await, &format!("trial {} session rejected", trial))
            }
            .await;
            for warning in ctx.session.cleanup_ephemeral_user().await {
                debug!("Trial {} cleanup: {}", trial, warning);
            }
            outcome
        })
        .await;
    if let Ok(result) = logins {
        debug!("{}: failure rate {:.2}", result.name, result.actual_failure_rate);
    }
}
