use crate::error::ActionError;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SETTINGS_YAML: &str = include_str!("../config/default.yaml");
pub const SETTINGS_ENV: &str = "PIPELINE_ENFORCER_ACTION_SETTINGS";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub version: u32,
    pub binary: Binary,
    pub install: Install,
    pub launch: Launch,
    pub sentinels: Sentinels,
    pub end: End,
    pub inputs: Inputs,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Binary {
    pub path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Install {
    pub script_url: String,
    pub checksum_url: String,
    pub script_path: String,
    pub shell: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Launch {
    pub shell: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Sentinels {
    pub init_file: PathBuf,
    pub error_file: PathBuf,
    pub poll_interval_ms: u64,
    pub ready_timeout_ms: u64,
    pub error_window_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct End {
    pub delay_ms: u64,
    pub policy_violation_exit_code: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Inputs {
    pub log_file_policy: LogFilePolicy,
}

#[derive(Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LogFilePolicy {
    /// Parent directory must exist and the file itself must not.
    #[default]
    Fresh,
    ParentExists,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            binary: Binary::default(),
            install: Install::default(),
            launch: Launch::default(),
            sentinels: Sentinels::default(),
            end: End::default(),
            inputs: Inputs::default(),
        }
    }
}

impl Default for Binary {
    fn default() -> Self {
        Self {
            path: "./pipeline-enforcer".to_string(),
        }
    }
}

impl Default for Install {
    fn default() -> Self {
        Self {
            script_url: "https://download.codesec.aquasec.com/pipeline-enforcer/install.sh"
                .to_string(),
            checksum_url: "https://github.com/argonsecurity/integrity-releases/releases/latest/download/install.sh.checksum"
                .to_string(),
            script_path: "install.sh".to_string(),
            shell: "sh".to_string(),
        }
    }
}

impl Default for Launch {
    fn default() -> Self {
        Self {
            shell: "bash".to_string(),
        }
    }
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            init_file: PathBuf::from("/tmp/pipeline-enforcer.start"),
            error_file: PathBuf::from("/tmp/pipeline-enforcer.error"),
            poll_interval_ms: 1000,
            ready_timeout_ms: 30_000,
            error_window_ms: 30_000,
        }
    }
}

impl Default for End {
    fn default() -> Self {
        Self {
            delay_ms: 3000,
            policy_violation_exit_code: 13,
        }
    }
}

impl Default for Inputs {
    fn default() -> Self {
        Self {
            log_file_policy: LogFilePolicy::Fresh,
        }
    }
}

impl Sentinels {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn error_window(&self) -> Duration {
        Duration::from_millis(self.error_window_ms)
    }
}

impl End {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Settings {
    pub fn binary_path(&self, workdir: &Path) -> PathBuf {
        workdir.join(&self.binary.path)
    }
}

pub fn resolve_settings_path(override_path: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.clone());
    }
    if let Ok(path) = env::var(SETTINGS_ENV) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let candidate = dirs::config_dir()?
        .join("pipeline-enforcer-action")
        .join("settings.yaml");
    if candidate.exists() {
        Some(candidate)
    } else {
        None
    }
}

pub fn load_settings(path: Option<&Path>) -> Result<Settings, ActionError> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|err| {
                ActionError::Settings(format!("failed to read {}: {err}", path.display()))
            })?;
            read_settings_from_str(&content)
        }
        None => read_settings_from_str(DEFAULT_SETTINGS_YAML),
    }
}

pub fn read_settings_from_str(content: &str) -> Result<Settings, ActionError> {
    let settings: Settings = serde_yaml::from_str(content)?;
    if settings.version != 1 {
        return Err(ActionError::Settings(format!(
            "unsupported settings version {}",
            settings.version
        )));
    }
    validate_settings(&settings)?;
    Ok(settings)
}

fn validate_settings(settings: &Settings) -> Result<(), ActionError> {
    let required = [
        ("binary.path", settings.binary.path.as_str()),
        ("install.script_url", settings.install.script_url.as_str()),
        ("install.checksum_url", settings.install.checksum_url.as_str()),
        ("install.script_path", settings.install.script_path.as_str()),
        ("install.shell", settings.install.shell.as_str()),
        ("launch.shell", settings.launch.shell.as_str()),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(ActionError::Settings(format!("{field} must be non-empty")));
        }
    }
    let sentinels = &settings.sentinels;
    if sentinels.poll_interval_ms == 0 {
        return Err(ActionError::Settings(
            "sentinels.poll_interval_ms must be greater than 0".to_string(),
        ));
    }
    if sentinels.ready_timeout_ms < sentinels.poll_interval_ms {
        return Err(ActionError::Settings(
            "sentinels.ready_timeout_ms must be at least sentinels.poll_interval_ms".to_string(),
        ));
    }
    if sentinels.error_window_ms < sentinels.poll_interval_ms {
        return Err(ActionError::Settings(
            "sentinels.error_window_ms must be at least sentinels.poll_interval_ms".to_string(),
        ));
    }
    if !(1..=255).contains(&settings.end.policy_violation_exit_code) {
        return Err(ActionError::Settings(format!(
            "end.policy_violation_exit_code must be between 1 and 255, got {}",
            settings.end.policy_violation_exit_code
        )));
    }
    Ok(())
}
