//! Binary entry point: load a scenario document, run it, print the
//! summary, and optionally export the per-interval time series as CSV.

use std::process;

use spice_ev::cli::{self, CliOptions};
use spice_ev::config::ScenarioDocument;
use spice_ev::report;

fn init_tracing() {
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn main() {
    init_tracing();

    let CliOptions { scenario, output } = match cli::parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("error: {e}");
            cli::print_usage();
            process::exit(2);
        }
    };

    let document = match ScenarioDocument::from_path(&scenario) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    let validation_errors = document.validate();
    if !validation_errors.is_empty() {
        for e in &validation_errors {
            eprintln!("error: {e}");
        }
        process::exit(2);
    }

    let mut scenario = match document.build() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };

    tracing::info!(strategy = scenario.strategy.name(), n_intervals = scenario.n_intervals, "starting simulation");
    let summary = scenario.run();

    if let Some(path) = &output {
        if let Err(e) = report::export_csv(&scenario.records, path) {
            eprintln!("error: failed to write CSV to {}: {e}", path.display());
            process::exit(1);
        }
        eprintln!("wrote {} interval(s) to {}", scenario.records.len(), path.display());
    }

    println!("{summary:#?}");

    if !summary.is_ok() {
        eprintln!("simulation completed with {} fault(s)", summary.faults.len());
        process::exit(1);
    }
}
