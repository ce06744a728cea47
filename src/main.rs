use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use benchrun::config::Config;
use benchrun::coordination::AbortState;
use benchrun::domain::{PhaseDescriptor, PhaseGroup, PhaseNode, PhaseOutcome, Stage, TestRecord};
use benchrun::id::generate_run_id;
use benchrun::profile::combine_profile_stats;
use benchrun::sim::TestPlan;
use benchrun::{AbortHandle, TestExecutor, TestStatus};

mod cli;

use cli::Cli;
use cli::commands::Commands;

/// Start trigger added when `--dut-id` is given for a plan without one
const PRESET_DUT_PHASE: &str = "preset_dut_id";

fn setup_logging(level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("benchrun")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("benchrun.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

struct RunArgs<'a> {
    plan: &'a Path,
    dut_id: Option<&'a str>,
    profile_out: Option<&'a Path>,
    stop_on_first_failure: bool,
    cancel_timeout_s: Option<f64>,
    json: bool,
}

async fn run_application(cli: &Cli, config: Config) -> Result<ExitCode> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Run {
            plan,
            dut_id,
            profile_out,
            stop_on_first_failure,
            cancel_timeout_s,
            json,
        } => {
            let args = RunArgs {
                plan,
                dut_id: dut_id.as_deref(),
                profile_out: profile_out.as_deref(),
                stop_on_first_failure: *stop_on_first_failure,
                cancel_timeout_s: *cancel_timeout_s,
                json: *json,
            };
            handle_run_command(args, config).await
        }
        Commands::Check { plan } => handle_check_command(plan),
    }
}

fn handle_check_command(path: &Path) -> Result<ExitCode> {
    let plan = TestPlan::load(path).context("Failed to load test plan")?;
    println!(
        "{} {} ({} phases, plugs: {})",
        "Plan OK:".green(),
        plan.name,
        plan.group.phase_count(),
        plan.plug_types().join(", ")
    );
    if let Some(start) = &plan.start {
        println!("  start: {}", start.name);
    }
    print_group(&plan.group, 1);
    Ok(ExitCode::SUCCESS)
}

fn print_group(group: &PhaseGroup, depth: usize) {
    let indent = "  ".repeat(depth);
    if let Some(name) = &group.name {
        println!("{}{}", indent, name.bold());
    }
    for stage in [Stage::Setup, Stage::Main, Stage::Teardown] {
        let nodes = group.stage(stage);
        if nodes.is_empty() {
            continue;
        }
        println!("{}{}:", indent, stage.as_str().dimmed());
        for node in nodes {
            match node {
                PhaseNode::Phase(phase) => println!("{}  - {}", indent, phase.name),
                PhaseNode::Group(nested) => print_group(nested, depth + 2),
            }
        }
    }
}

async fn handle_run_command(args: RunArgs<'_>, mut config: Config) -> Result<ExitCode> {
    let mut plan = TestPlan::load(args.plan).context("Failed to load test plan")?;
    if args.stop_on_first_failure {
        config.executor.stop_on_first_failure = true;
    }
    if let Some(secs) = args.cancel_timeout_s {
        config.executor.cancel_timeout_s = secs;
    }
    if let Some(dut_id) = args.dut_id {
        let start = plan
            .start
            .get_or_insert_with(|| PhaseDescriptor::new(PRESET_DUT_PHASE));
        let name = start.name.clone();
        plan.scripts.entry(name).or_default().dut_id = Some(dut_id.to_string());
    }
    let profile_out = args
        .profile_out
        .map(Path::to_path_buf)
        .or_else(|| config.station.profile_output.clone());

    let station = plan.station();
    let mut executor = TestExecutor::new(
        plan.descriptor(),
        generate_run_id(),
        plan.start.clone(),
        plan.options(),
        config.executor.clone(),
        station.collaborators(),
    )
    .with_station_id(config.station.station_id.clone())
    .with_profiling(profile_out.is_some());

    println!("{} {} [{}]", "Running:".cyan(), plan.name, executor.run_id());
    executor.start()?;
    let interrupts = tokio::spawn(watch_interrupts(executor.abort_handle()));

    if let Err(e) = executor.wait().await {
        error!("Test execution failed: {}", e);
        eprintln!("{} {}", "Execution error:".red(), e);
    }

    let status = {
        let state = executor.finalize()?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(state.record())?);
        } else {
            print_summary(state.record(), state.status());
        }
        state.status()
    };

    if let Some(path) = &profile_out {
        if combine_profile_stats(executor.phase_profile_stats(), path)? {
            println!("{} {}", "Profile:".cyan(), path.display());
        } else {
            warn!("Profiling was on but no phase produced a profile");
        }
    }

    executor.close().await?;
    interrupts.abort();

    Ok(if status == TestStatus::Pass {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// First Ctrl-C aborts gracefully, the second forces the abort
async fn watch_interrupts(handle: AbortHandle) {
    while tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("{}", "Interrupted; aborting test (Ctrl-C again to force)".yellow());
        // Spawned so a second Ctrl-C can force while the graceful stop waits
        handle.spawn_abort();
        if handle.state() == AbortState::Forced {
            break;
        }
    }
}

fn colored_status(status: TestStatus) -> ColoredString {
    match status {
        TestStatus::Pass => status.as_str().green().bold(),
        TestStatus::Fail | TestStatus::Error => status.as_str().red().bold(),
        TestStatus::Timeout | TestStatus::Aborted => status.as_str().yellow().bold(),
        _ => status.as_str().normal(),
    }
}

fn format_millis(ms: Option<u64>) -> String {
    ms.and_then(|ms| chrono::DateTime::from_timestamp_millis(ms as i64))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_summary(record: &TestRecord, status: TestStatus) {
    println!("{} {}", "Outcome:".bold(), colored_status(status));
    println!("  DUT:     {}", record.dut_id().unwrap_or("-"));
    println!("  Station: {}", record.station_id);
    println!("  Started: {}", format_millis(record.start_time_millis));
    println!("  Ended:   {}", format_millis(record.end_time_millis));

    for phase in &record.phases {
        let outcome = match phase.outcome {
            PhaseOutcome::Pass => "PASS".green(),
            PhaseOutcome::Fail => "FAIL".red(),
            PhaseOutcome::Skip => "SKIP".dimmed(),
            PhaseOutcome::Error => "ERROR".red().bold(),
        };
        let elapsed = phase.end_time_millis.saturating_sub(phase.start_time_millis);
        println!("  {:<6} {} ({} ms)", outcome, phase.name, elapsed);
    }
    for details in &record.outcome_details {
        println!("  {} {}: {}", "detail".yellow(), details.code, details.description);
    }
    for diagnosis in &record.diagnoses {
        println!(
            "  {} {} {:?}: {}",
            "diagnosis".cyan(),
            diagnosis.diagnoser,
            diagnosis.result,
            diagnosis.description
        );
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    let level = if cli.is_verbose() {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    setup_logging(level).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, config).await.context("Application failed")
}
