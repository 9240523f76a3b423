//! Command-line argument parsing for the `spice_ev` binary.
//!
//! Kept free of `std::process::exit` outside of `--help`, split between
//! a testable `parse_args_from` and the environment-reading `parse_args`
//! wrapper, so the rest of the binary can decide its own exit codes.

use std::env;
use std::path::PathBuf;

pub struct CliOptions {
    /// Path to the scenario document (`.json` or `.toml`).
    pub scenario: PathBuf,
    /// Where to write the per-interval CSV time series, if requested.
    pub output: Option<PathBuf>,
}

pub fn parse_args() -> Result<CliOptions, String> {
    parse_args_from(env::args().skip(1).collect())
}

fn parse_args_from(args: Vec<String>) -> Result<CliOptions, String> {
    if args.len() == 1 && (args[0] == "--help" || args[0] == "-h") {
        print_usage();
        std::process::exit(0);
    }

    let mut scenario = None;
    let mut output = None;
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--scenario" => {
                i += 1;
                let path = args
                    .get(i)
                    .ok_or_else(|| "missing value for --scenario (expected a file path)".to_string())?;
                if scenario.replace(PathBuf::from(path)).is_some() {
                    return Err("--scenario provided more than once".to_string());
                }
            }
            "--output" => {
                i += 1;
                let path = args
                    .get(i)
                    .ok_or_else(|| "missing value for --output (expected a file path)".to_string())?;
                if output.replace(PathBuf::from(path)).is_some() {
                    return Err("--output provided more than once".to_string());
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }

    let scenario = scenario.ok_or_else(|| "missing required argument --scenario".to_string())?;
    Ok(CliOptions { scenario, output })
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  spice_ev --scenario <path> [--output <path>]");
    eprintln!();
    eprintln!("  --scenario <path>   Scenario document to simulate (.json or .toml)");
    eprintln!("  --output <path>     Write the per-interval time series as CSV");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_scenario() {
        let err = parse_args_from(vec![]).unwrap_err();
        assert!(err.contains("--scenario"));
    }

    #[test]
    fn parses_scenario_and_output() {
        let opts = parse_args_from(vec![
            "--scenario".to_string(),
            "scenario.json".to_string(),
            "--output".to_string(),
            "out.csv".to_string(),
        ])
        .unwrap();
        assert_eq!(opts.scenario, PathBuf::from("scenario.json"));
        assert_eq!(opts.output, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn rejects_duplicate_scenario_flag() {
        let err = parse_args_from(vec![
            "--scenario".to_string(),
            "a.json".to_string(),
            "--scenario".to_string(),
            "b.json".to_string(),
        ])
        .unwrap_err();
        assert!(err.contains("more than once"));
    }

    #[test]
    fn rejects_unknown_argument() {
        let err = parse_args_from(vec!["--bogus".to_string()]).unwrap_err();
        assert!(err.contains("unknown argument"));
    }
}
