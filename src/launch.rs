use crate::command::CommandLine;
use crate::error::ActionError;
use crate::inputs::Secret;
use std::collections::BTreeMap;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Starts `command` through `shell` so that it keeps running after this process exits.
///
/// The shell gets its own process group and returns as soon as the backgrounded
/// command is forked. No handle to the background process is retained.
pub fn launch_detached(
    command: &CommandLine,
    secret_env: &BTreeMap<String, Secret>,
    shell: &str,
    workdir: &Path,
) -> Result<(), ActionError> {
    let shell_path = which::which(shell)
        .map_err(|err| ActionError::Launch(format!("shell {shell} not found: {err}")))?;
    let script = command.to_shell();
    debug!("Running in background: {}", command.display());

    let mut cmd = Command::new(&shell_path);
    cmd.arg("-c").arg(&script).current_dir(workdir);
    for (key, value) in secret_env {
        cmd.env(key, value.expose());
    }
    cmd.stdin(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);

    let status = cmd
        .status()
        .map_err(|err| ActionError::Launch(format!("failed to spawn {shell}: {err}")))?;
    if !status.success() {
        return Err(ActionError::Launch(format!(
            "{shell} exited with status {status}"
        )));
    }
    Ok(())
}
