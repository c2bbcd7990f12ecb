//! wfexecutor CLI Entry Point
//!
//! Provides the command-line interface for running Galaxy workflows.
//!
//! # Usage
//!
//! ```bash
//! # Run a workflow, resuming if a checkpoint exists
//! wfexecutor run -C ~/.parsec/creds.yml -W clustering.ga -i inputs.yml \
//!     -P params.json -H E-MTAB-101 -o results/
//!
//! # Tolerate failures of some steps and keep the histories
//! wfexecutor run ... -a allowed_errors.yml --keep-session
//!
//! # Write a parameters template for a workflow
//! wfexecutor generate-params -C ~/.parsec/creds.yml -W clustering.ga -o . -N clustering
//! ```
//!
//! Exit codes: 0 on success, 1 on failure, 3 when the run succeeded but
//! some remote resources could not be deleted.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use chrono::Local;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use log::{error, info};

use wfexecutor::config::{load_instance, read_operator_file, PollingConfig, DEFAULT_CREDENTIALS_PATH};
use wfexecutor::execution::{CleanupStatus, CompletionState, ExecutionState, RunOptions, RunPlan, RunReport, Runner};
use wfexecutor::galaxy::{GalaxyApi, GalaxyClient};
use wfexecutor::workflow::{generate_parameter_template, load_workflow_definition, write_parameter_template};
use wfexecutor::{ExecutorError, APP_NAME, VERSION};

/// Exit code for a successful run whose cleanup did not finish.
const EXIT_CLEANUP_PENDING: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "wfexecutor", version, about = "Run Galaxy workflows end to end")]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload inputs, run a workflow and download its results
    Run(RunArgs),
    /// Write a parameters file template for a workflow
    GenerateParams(GenerateParamsArgs),
}

#[derive(Args, Debug)]
struct InstanceArgs {
    /// Credentials file with Galaxy instances
    #[arg(short = 'C', long = "conf")]
    conf: Option<PathBuf>,

    /// Galaxy instance to use from the credentials file
    #[arg(short = 'G', long = "galaxy-instance")]
    instance: Option<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    instance: InstanceArgs,

    /// Workflow export (.ga)
    #[arg(short = 'W', long)]
    workflow: PathBuf,

    /// Inputs file (YAML or JSON)
    #[arg(short = 'i', long)]
    inputs: PathBuf,

    /// Parameters file (YAML or JSON)
    #[arg(short = 'P', long)]
    parameters: Option<PathBuf>,

    /// Steps allowed to fail (YAML or JSON)
    #[arg(short = 'a', long = "allowed-errors")]
    allowed_errors: Option<PathBuf>,

    /// Name for the histories of this run
    #[arg(short = 'H', long)]
    history: String,

    /// Directory receiving the results
    #[arg(short = 'o', long = "output-dir")]
    output_dir: PathBuf,

    /// Checkpoint file [default: <output-dir>/<history>_exec_state.json]
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Do not delete the histories when done
    #[arg(long)]
    keep_session: bool,

    /// Do not delete the imported workflow when done
    #[arg(long)]
    keep_workflow: bool,

    /// Name downloaded files after the datasets in Galaxy
    #[arg(long)]
    use_output_names: bool,

    /// Write a tool versions report to this file
    #[arg(long)]
    versions_file: Option<PathBuf>,

    /// Do not wait to see whether failed jobs are resubmitted
    #[arg(long)]
    no_resubmission_wait: bool,

    /// Seconds to wait after invoking before the first status check
    #[arg(long, default_value_t = 100)]
    settle_secs: u64,

    /// Seconds between status checks
    #[arg(long, default_value_t = 10)]
    poll_secs: u64,

    /// Seconds to wait before re-checking a failed dataset
    #[arg(long, default_value_t = 20)]
    grace_secs: u64,
}

#[derive(Args, Debug)]
struct GenerateParamsArgs {
    #[command(flatten)]
    instance: InstanceArgs,

    /// Workflow export (.ga)
    #[arg(short = 'W', long)]
    workflow: PathBuf,

    /// Directory receiving the parameters file
    #[arg(short = 'o', long = "output-dir")]
    output_dir: PathBuf,

    /// Name of the parameters file, without extension
    #[arg(short = 'N', long = "name-parameter")]
    name: String,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "{} [{}] {}", timestamp, record.level(), record.args())
                }
                _ => writeln!(buf, "{} {}", timestamp, record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Galaxy Workflow Executor");
    println!();
}

fn connect(args: &InstanceArgs) -> Result<GalaxyClient, Box<dyn std::error::Error>> {
    let conf = args.conf.as_deref().unwrap_or(DEFAULT_CREDENTIALS_PATH.as_path());
    let instance = load_instance(conf, args.instance.as_deref())?;
    Ok(GalaxyClient::new(&instance.url, &instance.key)?)
}

fn read_optional<T>(path: Option<&Path>) -> Result<T, ExecutorError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match path {
        Some(path) => read_operator_file(path),
        None => Ok(T::default()),
    }
}

fn run_workflow(args: RunArgs) -> Result<RunReport, Box<dyn std::error::Error>> {
    let plan = RunPlan {
        definition: load_workflow_definition(&args.workflow)?,
        inputs: read_operator_file(&args.inputs)?,
        parameters: read_optional(args.parameters.as_deref())?,
        allowed_errors: read_optional(args.allowed_errors.as_deref())?,
    };

    let client = connect(&args.instance)?;

    let polling = PollingConfig {
        settle_delay: Duration::from_secs(args.settle_secs),
        poll_interval: Duration::from_secs(args.poll_secs),
        resubmission_grace: Duration::from_secs(args.grace_secs),
        wait_for_resubmission: !args.no_resubmission_wait,
    };

    let state_file = args
        .state_file
        .clone()
        .unwrap_or_else(|| args.output_dir.join(format!("{}_exec_state.json", args.history)));

    let mut options = RunOptions::new(args.history, args.output_dir);
    options.keep_session = args.keep_session;
    options.keep_workflow = args.keep_workflow;
    options.prefer_remote_names = args.use_output_names;
    options.versions_file = args.versions_file;

    let mut state = ExecutionState::load(state_file);
    let report = Runner::new(&client, polling, options).run(plan, &mut state)?;
    Ok(report)
}

fn generate_params(args: GenerateParamsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let definition = load_workflow_definition(&args.workflow)?;
    let client = connect(&args.instance)?;

    let handle = client.import_workflow(definition.raw())?;
    let remote = client.show_workflow(&handle.id);
    if let Err(e) = client.delete_workflow(&handle.id) {
        error!("Could not delete temporary workflow {}: {}", handle.id, e);
    }

    let template = generate_parameter_template(&definition, &remote?);
    write_parameter_template(&template, &args.output_dir, &args.name)?;
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("{}", report.timeline.summary());

    let status = match report.outcome {
        CompletionState::CompletedWithToleratedErrors => format!(
            "Workflow completed with {} tolerated failure(s)",
            report.tolerated_failures.len()
        )
        .yellow(),
        _ => "Workflow completed successfully".green(),
    };
    println!("{}", status.bold());
    info!("{} file(s) downloaded", report.downloaded.len());

    if let CleanupStatus::Pending(pending) = &report.cleanup {
        println!(
            "{}",
            format!(
                "Cleanup incomplete: {} history(ies) and {} workflow(s) left on the server",
                pending.sessions.len(),
                pending.workflows.len()
            )
            .yellow()
        );
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.debug);
    print_banner();

    match cli.command {
        Command::Run(args) => match run_workflow(args) {
            Ok(report) => {
                print_report(&report);
                match report.cleanup {
                    CleanupStatus::Complete => ExitCode::SUCCESS,
                    CleanupStatus::Pending(_) => ExitCode::from(EXIT_CLEANUP_PENDING),
                }
            }
            Err(e) => {
                error!("{}", e);
                eprintln!();
                eprintln!("{} {}", "Error:".red().bold(), e);
                ExitCode::FAILURE
            }
        },
        Command::GenerateParams(args) => match generate_params(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("{}", e);
                eprintln!("{} {}", "Error:".red().bold(), e);
                ExitCode::FAILURE
            }
        },
    }
}
