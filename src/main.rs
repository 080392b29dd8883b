//! Stack probe command line

use clap::{Parser, Subcommand};
use colored::*;
use stack_probe::runner::report::print_summary;
use stack_probe::suites::{run_selected, SuiteSelection};
use stack_probe::{ProbeContext, ServiceEndpoints, TestRunner};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stack-probe", version, about = "Probe SSO, OIDC and service authentication on a running stack")]
struct Cli {
    /// Debug logging for the probe itself
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the built-in suites
    Run {
        #[arg(short, long, value_enum, default_value = "all")]
        suite: SuiteSelection,

        /// Write a JSON report here
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the resolved endpoint registry
    Endpoints,
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "info,stack_probe=debug" } else { "warn,stack_probe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let endpoints = ServiceEndpoints::from_env();

    match cli.command {
        Command::Endpoints => {
            println!("{}", serde_json::to_string_pretty(&endpoints)?);
            println!("{:#?}", endpoints.credentials);
            Ok(())
        }
        Command::Run { suite, output } => {
            println!("{}", "STACK PROBE".cyan().bold());
            info!(topology = ?endpoints.topology, suite = ?suite, "Starting run");

            let ctx = ProbeContext::new(endpoints)?;
            let mut runner = match output {
                Some(path) => TestRunner::new().with_report_path(path),
                None => TestRunner::new(),
            };

            run_selected(&mut runner, &ctx, suite).await;

            let summary = runner.summary();
            print_summary(&summary);
            std::process::exit(summary.exit_code());
        }
    }
}
