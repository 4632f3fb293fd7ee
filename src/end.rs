use crate::command::{end_command, CommandLine};
use crate::error::{ActionError, FailureKind};
use crate::host;
use crate::inputs::{resolve_against, EndConfiguration, Secret};
use crate::settings::Settings;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn combined_output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(FailureKind),
}

/// Synchronous subprocess invocation; a non-zero exit is data, not an `Err`.
pub trait ToolRunner {
    fn run(
        &self,
        command: &CommandLine,
        env: &BTreeMap<String, Secret>,
        cwd: &Path,
    ) -> Result<ExecutionResult, io::Error>;
}

pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(
        &self,
        command: &CommandLine,
        env: &BTreeMap<String, Secret>,
        cwd: &Path,
    ) -> Result<ExecutionResult, io::Error> {
        let program = resolve_against(cwd, Path::new(&command.program));
        let mut cmd = Command::new(program);
        cmd.args(&command.args).current_dir(cwd).stdin(Stdio::null());
        for (key, value) in env {
            cmd.env(key, value.expose());
        }
        let output = cmd.output()?;
        Ok(ExecutionResult {
            exit_code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

pub fn classify(result: &ExecutionResult, policy_violation_exit_code: i32) -> Outcome {
    match result.exit_code {
        0 => Outcome::Success,
        code if code == policy_violation_exit_code => Outcome::Failed(FailureKind::PolicyViolation),
        _ => Outcome::Failed(FailureKind::GenericFailure),
    }
}

pub fn failure_for(result: &ExecutionResult, kind: FailureKind) -> ActionError {
    let output = result.combined_output();
    let message = match kind {
        FailureKind::PolicyViolation => {
            let mut message = format!(
                "pipeline-enforcer found policy violations (exit code {})",
                result.exit_code
            );
            if !output.trim().is_empty() {
                message.push('\n');
                message.push_str(output.trim_end());
            }
            message
        }
        FailureKind::GenericFailure if output.trim().is_empty() => format!(
            "pipeline-enforcer ci end failed with exit code {}",
            result.exit_code
        ),
        FailureKind::GenericFailure => output,
    };
    ActionError::CommandFailure {
        kind,
        exit_code: result.exit_code,
        message,
    }
}

fn echo_output(result: &ExecutionResult) {
    for stream in [&result.stdout, &result.stderr] {
        if !stream.trim().is_empty() {
            info!("{}", stream.trim_end());
        }
    }
}

/// Runs `ci end`, then always surfaces the configured log file.
pub fn invoke_end(
    config: &EndConfiguration,
    settings: &Settings,
    workdir: &Path,
    runner: &dyn ToolRunner,
) -> Result<ExecutionResult, ActionError> {
    let result = run_end(config, settings, workdir, runner);
    if let Some(log_file) = &config.log_file {
        emit_log_file(&resolve_against(workdir, log_file));
    }
    result
}

fn run_end(
    config: &EndConfiguration,
    settings: &Settings,
    workdir: &Path,
    runner: &dyn ToolRunner,
) -> Result<ExecutionResult, ActionError> {
    let binary = settings.binary_path(workdir);
    if !binary.exists() {
        return Err(ActionError::BinaryNotFound(binary.display().to_string()));
    }

    // Gives the tool time to flush the tail of its trace buffer before `ci end`.
    let delay = settings.end.delay();
    if !delay.is_zero() {
        debug!("Waiting {} ms before ending pipeline-enforcer", delay.as_millis());
        thread::sleep(delay);
    }

    let command = end_command(config, &settings.binary.path, workdir);
    debug!("Running: {}", command.display());
    let result = runner
        .run(&command, &config.secret_env(), workdir)
        .map_err(|err| {
            ActionError::Launch(format!("failed to run {}: {err}", command.display()))
        })?;
    echo_output(&result);
    match classify(&result, settings.end.policy_violation_exit_code) {
        Outcome::Success => Ok(result),
        Outcome::Failed(kind) => Err(failure_for(&result, kind)),
    }
}

pub fn emit_log_file(path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::read_to_string(path) {
        Ok(content) => {
            host::start_group(&format!("pipeline-enforcer log ({})", path.display()));
            info!("{}", content.trim_end());
            host::end_group();
        }
        Err(err) => warn!("Failed to read log file {}: {err}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::read_settings_from_str;
    use std::cell::RefCell;
    use tempfile::tempdir;

    #[derive(Default)]
    struct MockRunner {
        calls: RefCell<Vec<(CommandLine, BTreeMap<String, Secret>)>>,
        result: Option<ExecutionResult>,
    }

    impl MockRunner {
        fn exiting(exit_code: i32, stdout: &str, stderr: &str) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                result: Some(ExecutionResult {
                    exit_code,
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                }),
            }
        }
    }

    impl ToolRunner for MockRunner {
        fn run(
            &self,
            command: &CommandLine,
            env: &BTreeMap<String, Secret>,
            _cwd: &Path,
        ) -> Result<ExecutionResult, io::Error> {
            self.calls
                .borrow_mut()
                .push((command.clone(), env.clone()));
            self.result
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no binary"))
        }
    }

    fn settings() -> Settings {
        read_settings_from_str("version: 1\nend:\n  delay_ms: 0\n").unwrap()
    }

    fn end_config(log_file: Option<&Path>) -> EndConfiguration {
        EndConfiguration {
            verbose: false,
            log_file: log_file.map(Path::to_path_buf),
            aqua_key: Secret::new("key"),
            aqua_secret: Secret::new("secret"),
        }
    }

    fn install_fake_binary(dir: &Path) {
        fs::write(dir.join("pipeline-enforcer"), "#!/bin/sh\n").unwrap();
    }

    fn result(exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            exit_code,
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
        }
    }

    #[test]
    fn classification_by_exit_code() {
        assert_eq!(classify(&result(0), 13), Outcome::Success);
        assert_eq!(
            classify(&result(13), 13),
            Outcome::Failed(FailureKind::PolicyViolation)
        );
        assert_eq!(
            classify(&result(7), 13),
            Outcome::Failed(FailureKind::GenericFailure)
        );
        assert_eq!(
            classify(&result(13), 42),
            Outcome::Failed(FailureKind::GenericFailure)
        );
    }

    #[test]
    fn policy_violation_message_is_distinct() {
        let err = failure_for(&result(13), FailureKind::PolicyViolation);
        assert_eq!(err.exit_code(), 13);
        assert!(err
            .to_string()
            .starts_with("pipeline-enforcer found policy violations (exit code 13)"));

        let err = failure_for(&result(7), FailureKind::GenericFailure);
        assert_eq!(err.exit_code(), 7);
        assert_eq!(err.to_string(), "out\nerr\n");
    }

    #[test]
    fn generic_failure_without_output_names_exit_code() {
        let silent = ExecutionResult {
            exit_code: 2,
            stdout: String::new(),
            stderr: String::new(),
        };
        let err = failure_for(&silent, FailureKind::GenericFailure);
        assert!(err.to_string().contains("exit code 2"));
    }

    #[test]
    fn missing_binary_skips_invocation() {
        let dir = tempdir().unwrap();
        let runner = MockRunner::exiting(0, "", "");
        let err = invoke_end(&end_config(None), &settings(), dir.path(), &runner)
            .expect_err("missing binary");
        assert!(matches!(err, ActionError::BinaryNotFound(_)));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn end_passes_secrets_through_environment_only() {
        let dir = tempdir().unwrap();
        install_fake_binary(dir.path());
        let runner = MockRunner::exiting(0, "ok\n", "");
        let outcome = invoke_end(&end_config(None), &settings(), dir.path(), &runner).unwrap();
        assert_eq!(outcome.exit_code, 0);

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        let (command, env) = &calls[0];
        assert_eq!(command.program, "./pipeline-enforcer");
        assert_eq!(command.args, vec!["ci", "end"]);
        assert_eq!(env["AQUA_KEY"].expose(), "key");
        assert_eq!(env["AQUA_SECRET"].expose(), "secret");
        assert!(!env.contains_key("ACCESS_TOKEN"));
    }

    #[test]
    fn end_maps_exit_codes_to_failures() {
        let dir = tempdir().unwrap();
        install_fake_binary(dir.path());

        let runner = MockRunner::exiting(13, "violation\n", "");
        let err = invoke_end(&end_config(None), &settings(), dir.path(), &runner)
            .expect_err("policy");
        assert!(matches!(
            err,
            ActionError::CommandFailure {
                kind: FailureKind::PolicyViolation,
                exit_code: 13,
                ..
            }
        ));

        let runner = MockRunner::exiting(7, "", "crash\n");
        let err = invoke_end(&end_config(None), &settings(), dir.path(), &runner)
            .expect_err("generic");
        assert!(matches!(
            err,
            ActionError::CommandFailure {
                kind: FailureKind::GenericFailure,
                exit_code: 7,
                ..
            }
        ));
    }

    #[test]
    fn spawn_failure_is_a_launch_error() {
        let dir = tempdir().unwrap();
        install_fake_binary(dir.path());
        let runner = MockRunner::default();
        let err = invoke_end(&end_config(None), &settings(), dir.path(), &runner)
            .expect_err("spawn failure");
        assert!(matches!(err, ActionError::Launch(_)));
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_captures_exit_code_and_streams() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let tool = dir.path().join("pipeline-enforcer");
        fs::write(
            &tool,
            "#!/bin/sh\necho \"$1 $2 $AQUA_KEY\"\necho problem >&2\nexit 13\n",
        )
        .unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        let command = CommandLine {
            program: "./pipeline-enforcer".to_string(),
            args: vec!["ci".to_string(), "end".to_string()],
            background: false,
        };
        let mut env = BTreeMap::new();
        env.insert("AQUA_KEY".to_string(), Secret::new("key"));

        let result = ProcessRunner.run(&command, &env, dir.path()).unwrap();

        assert_eq!(result.exit_code, 13);
        assert_eq!(result.stdout, "ci end key\n");
        assert_eq!(result.stderr, "problem\n");
    }
}
