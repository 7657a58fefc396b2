mod cases;
mod replay;
mod report;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use clap::Parser;
use rayon::prelude::*;
use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use planspec_core::harness::{run_case, CaseReport};
use planspec_core::{Diagnostic, Path};

use cases::{Case, CaseError};
use replay::RecordedPlanner;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "PLANSPEC_LOG";

/// Unit test infrastructure plans against declared expectations.
#[derive(Debug, Parser)]
#[command(name = "planspec", version, about)]
struct Args {
    /// Path to the folder containing test cases
    #[arg(long, default_value = "spec")]
    spec: PathBuf,

    /// Print the full plan before the results
    #[arg(long)]
    display_plan: bool,

    /// Number of cases run at once (defaults to one per core)
    #[arg(long)]
    parallel: Option<usize>,
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Case(#[from] CaseError),
    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match run(&args) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Runs every case and prints the reports as they complete. Returns the
/// number of failed cases.
fn run(args: &Args) -> Result<usize, RunError> {
    let found = cases::discover(&args.spec)?;

    let mut pool = rayon::ThreadPoolBuilder::new();
    if let Some(n) = args.parallel {
        pool = pool.num_threads(n);
    }
    let pool = pool.build()?;

    let started = Instant::now();
    let failed = AtomicUsize::new(0);
    pool.install(|| {
        found.par_iter().for_each(|case| {
            let report = run_one(case);
            if report.has_errors() {
                failed.fetch_add(1, Ordering::Relaxed);
            }
            let rendered = report::render_case(&report, args.display_plan);
            let mut stdout = std::io::stdout().lock();
            if let Err(e) = stdout.write_all(rendered.as_bytes()) {
                tracing::warn!(error = %e, "failed to write report");
            }
        });
    });

    let failed = failed.into_inner();
    println!("{}", report::summary(found.len(), failed, started.elapsed()));
    Ok(failed)
}

fn run_one(case: &Case) -> CaseReport {
    let name = case.name();
    let (spec, recording) = match case.load() {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::warn!(case = %name, error = %e, "failed to load case");
            return CaseReport {
                name,
                diagnostics: Diagnostic::technical(Path::root(), "failed to load test case", e.to_string()).into(),
                plan: None,
                duration: Duration::ZERO,
            };
        }
    };
    let providers = recording.provider_set();
    run_case(&name, &spec, &providers, &RecordedPlanner::new(recording))
}
