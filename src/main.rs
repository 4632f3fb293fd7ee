mod command;
mod end;
mod error;
mod host;
mod inputs;
mod install;
mod launch;
mod settings;
mod start;
mod watch;

use chrono::{SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use end::{invoke_end, ExecutionResult, ProcessRunner};
use error::ActionError;
use inputs::{extract_end_inputs, validate_end_inputs, EnvInputs};
use install::HttpFetcher;
use settings::{load_settings, resolve_settings_path, Settings};
use std::env;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "pipeline-enforcer-action",
    version,
    about = "Start and end pipeline-enforcer around a CI job"
)]
struct Cli {
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install pipeline-enforcer and start it in the background.
    Start,
    /// Finish the pipeline-enforcer run and report its verdict.
    End,
}

#[derive(Debug)]
struct Context {
    settings: Settings,
    workdir: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    host::init_logging();

    let result = build_context(&cli).and_then(|ctx| match cli.command {
        Commands::Start => handle_start(&ctx),
        Commands::End => handle_end(&ctx),
    });

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(err.exit_code());
    }
}

fn build_context(cli: &Cli) -> Result<Context, ActionError> {
    let settings_path = resolve_settings_path(cli.settings.as_ref());
    if let Some(path) = &settings_path {
        debug!("Loading settings from {}", path.display());
    }
    let settings = load_settings(settings_path.as_deref())?;
    let workdir = match &cli.workdir {
        Some(path) => path.clone(),
        None => env::current_dir()?,
    };
    Ok(Context { settings, workdir })
}

fn handle_start(ctx: &Context) -> Result<(), ActionError> {
    let fetcher = HttpFetcher::new()?;
    start::run_start(&EnvInputs, &ctx.settings, &ctx.workdir, &fetcher)
}

fn handle_end(ctx: &Context) -> Result<(), ActionError> {
    let config = extract_end_inputs(&EnvInputs);
    host::mask_secrets(&config.secrets());
    validate_end_inputs(&config)?;
    info!("Ending pipeline-enforcer run");
    let result = invoke_end(&config, &ctx.settings, &ctx.workdir, &ProcessRunner);
    report_end(&result);
    result?;
    debug!("pipeline-enforcer ended successfully");
    Ok(())
}

fn report_end(result: &Result<ExecutionResult, ActionError>) {
    let (label, exit_code, details) = match result {
        Ok(outcome) => ("success", outcome.exit_code, String::new()),
        Err(err) => (err.result_label(), err.exit_code(), err.to_string()),
    };
    if let Err(err) = host::set_output("result", label) {
        warn!("Failed to write step output: {err}");
    }
    if let Err(err) = host::set_output("exit-code", &exit_code.to_string()) {
        warn!("Failed to write step output: {err}");
    }
    let summary = host::Summary::new()
        .heading("pipeline-enforcer")
        .row("Result", label)
        .row("Exit code", &exit_code.to_string())
        .row(
            "Finished at",
            &Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .code_block(&details);
    if let Err(err) = summary.write() {
        warn!("Failed to write job summary: {err}");
    }
}
