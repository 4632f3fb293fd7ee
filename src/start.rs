use crate::command::start_command;
use crate::error::ActionError;
use crate::host;
use crate::inputs::{extract_start_inputs, validate_start_inputs, InputSource};
use crate::install::{install, Fetcher};
use crate::launch::launch_detached;
use crate::settings::Settings;
use crate::watch::{await_no_error, await_ready, SentinelFile, WatchTiming};
use std::path::Path;
use tracing::{debug, info};

pub fn run_start(
    inputs: &dyn InputSource,
    settings: &Settings,
    workdir: &Path,
    fetcher: &dyn Fetcher,
) -> Result<(), ActionError> {
    let config = extract_start_inputs(inputs);
    host::mask_secrets(&config.secrets());
    debug!("validating inputs");
    validate_start_inputs(&config, settings.inputs.log_file_policy, workdir)?;
    debug!("inputs validated successfully");

    debug!("Downloading pipeline-enforcer binary");
    install(fetcher, &settings.install, workdir)?;
    info!("pipeline-enforcer binary downloaded successfully");

    debug!("Starting pipeline-enforcer in the background");
    let command = start_command(&config, &settings.binary.path, workdir);
    launch_detached(
        &command,
        &config.secret_env(),
        &settings.launch.shell,
        workdir,
    )?;
    info!("pipeline-enforcer started successfully");

    let sentinels = &settings.sentinels;
    debug!("Waiting for pipeline-enforcer to initialize.");
    await_ready(
        &SentinelFile::new(&sentinels.init_file),
        WatchTiming {
            poll_interval: sentinels.poll_interval(),
            timeout: sentinels.ready_timeout(),
        },
    )?;
    info!("pipeline-enforcer initialized successfully");

    await_no_error(
        &SentinelFile::new(&sentinels.error_file),
        WatchTiming {
            poll_interval: sentinels.poll_interval(),
            timeout: sentinels.error_window(),
        },
    )?;
    debug!("no pipeline-enforcer error reported");
    Ok(())
}
