//! Built-in smoke suites
//!
//! Each suite exercises one helper against the live stack. Tests whose
//! prerequisites are not configured are recorded as skipped.

pub mod auth;
pub mod foundation;
pub mod oidc;
pub mod stats;
pub mod tokens;

use crate::context::ProbeContext;
use crate::runner::TestRunner;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SuiteSelection {
    All,
    Foundation,
    Auth,
    Oidc,
    Tokens,
    Stats,
}

impl SuiteSelection {
    fn includes(self, other: SuiteSelection) -> bool {
        self == SuiteSelection::All || self == other
    }
}

/// Run the selected suites in declaration order and tear the context down.
pub async fn run_selected(runner: &mut TestRunner, ctx: &ProbeContext, selection: SuiteSelection) {
    if selection.includes(SuiteSelection::Foundation) {
        foundation::run(runner, ctx).await;
    }
    if selection.includes(SuiteSelection::Auth) {
        auth::run(runner, ctx).await;
    }
    if selection.includes(SuiteSelection::Oidc) {
        oidc::run(runner, ctx).await;
    }
    if selection.includes(SuiteSelection::Tokens) {
        tokens::run(runner, ctx).await;
    }
    if selection.includes(SuiteSelection::Stats) {
        stats::run(runner, ctx).await;
    }

    for warning in ctx.teardown().await {
        tracing::warn!("Teardown: {}", warning);
    }
}
