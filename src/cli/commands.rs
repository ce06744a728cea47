//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: execute a YAML test plan on the simulated station
//! - check: validate a test plan without running it

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Benchrun - a test-station execution engine
#[derive(Parser, Debug)]
#[command(name = "benchrun")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a test plan. Ctrl-C aborts; a second Ctrl-C forces the abort.
    Run {
        /// Path to the YAML test plan
        plan: PathBuf,

        /// DUT id to preset on the record
        #[arg(long)]
        dut_id: Option<String>,

        /// Collect per-phase profiles and write the combined profile here
        #[arg(long)]
        profile_out: Option<PathBuf>,

        /// Stop the test on the first failed phase
        #[arg(long)]
        stop_on_first_failure: bool,

        /// Seconds a graceful abort waits for the running phase
        #[arg(long)]
        cancel_timeout_s: Option<f64>,

        /// Print the final test record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a test plan without running it
    Check {
        /// Path to the YAML test plan
        plan: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "benchrun",
            "run",
            "plan.yml",
            "--dut-id",
            "SN-1",
            "--stop-on-first-failure",
            "--cancel-timeout-s",
            "0.5",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                plan,
                dut_id,
                profile_out,
                stop_on_first_failure,
                cancel_timeout_s,
                json,
            } => {
                assert_eq!(plan, PathBuf::from("plan.yml"));
                assert_eq!(dut_id.as_deref(), Some("SN-1"));
                assert!(profile_out.is_none());
                assert!(stop_on_first_failure);
                assert_eq!(cancel_timeout_s, Some(0.5));
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_check_with_global_config() {
        let cli = Cli::try_parse_from(["benchrun", "check", "plan.yml", "-c", "bench.yml", "-v"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("bench.yml")));
        assert!(matches!(cli.command, Commands::Check { .. }));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["benchrun"]).is_err());
    }
}
