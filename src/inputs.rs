use crate::error::ActionError;
use crate::settings::LogFilePolicy;
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Flat, string-typed key/value configuration source (CI form fields).
pub trait InputSource {
    fn get(&self, name: &str) -> Option<String>;

    fn input(&self, name: &str) -> String {
        self.get(name)
            .map(|value| value.trim().to_string())
            .unwrap_or_default()
    }

    fn flag(&self, name: &str) -> bool {
        self.input(name) == "true"
    }
}

/// Reads inputs the way the Actions runner exports them: `aqua-key` -> `INPUT_AQUA-KEY`.
pub struct EnvInputs;

pub fn input_env_name(name: &str) -> String {
    format!("INPUT_{}", name.replace(' ', "_").to_uppercase())
}

impl InputSource for EnvInputs {
    fn get(&self, name: &str) -> Option<String> {
        env::var(input_env_name(name)).ok()
    }
}

impl InputSource for BTreeMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        BTreeMap::get(self, name).cloned()
    }
}

#[derive(Clone, PartialEq, Eq, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartConfiguration {
    pub repo_path: String,
    pub verbose: bool,
    pub quiet: bool,
    pub log_file: Option<PathBuf>,
    pub access_token: Secret,
    pub aqua_key: Secret,
    pub aqua_secret: Secret,
    pub matrix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndConfiguration {
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
    pub aqua_key: Secret,
    pub aqua_secret: Secret,
}

impl StartConfiguration {
    pub fn secrets(&self) -> Vec<&Secret> {
        vec![&self.aqua_key, &self.aqua_secret, &self.access_token]
    }

    /// Environment handed to the launched binary on top of the inherited one.
    pub fn secret_env(&self) -> BTreeMap<String, Secret> {
        let mut envs = BTreeMap::new();
        envs.insert("AQUA_KEY".to_string(), self.aqua_key.clone());
        envs.insert("AQUA_SECRET".to_string(), self.aqua_secret.clone());
        envs.insert("ACCESS_TOKEN".to_string(), self.access_token.clone());
        envs
    }
}

impl EndConfiguration {
    pub fn secrets(&self) -> Vec<&Secret> {
        vec![&self.aqua_key, &self.aqua_secret]
    }

    pub fn secret_env(&self) -> BTreeMap<String, Secret> {
        let mut envs = BTreeMap::new();
        envs.insert("AQUA_KEY".to_string(), self.aqua_key.clone());
        envs.insert("AQUA_SECRET".to_string(), self.aqua_secret.clone());
        envs
    }
}

fn optional_path(value: String) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

pub fn extract_start_inputs(source: &dyn InputSource) -> StartConfiguration {
    let repo_path = source.input("repo-path");
    let matrix = source.input("matrix");
    StartConfiguration {
        repo_path: if repo_path.is_empty() {
            ".".to_string()
        } else {
            repo_path
        },
        verbose: source.flag("verbose"),
        quiet: source.flag("quiet"),
        log_file: optional_path(source.input("log-file")),
        access_token: Secret::new(source.input("access-token")),
        aqua_key: Secret::new(source.input("aqua-key")),
        aqua_secret: Secret::new(source.input("aqua-secret")),
        matrix: if matrix == "null" { String::new() } else { matrix },
    }
}

pub fn extract_end_inputs(source: &dyn InputSource) -> EndConfiguration {
    EndConfiguration {
        verbose: source.flag("verbose"),
        log_file: optional_path(source.input("log-file")),
        aqua_key: Secret::new(source.input("aqua-key")),
        aqua_secret: Secret::new(source.input("aqua-secret")),
    }
}

fn require(name: &str, value: &Secret) -> Result<(), ActionError> {
    if value.is_empty() {
        return Err(ActionError::Validation(format!(
            "Required input {name} is empty"
        )));
    }
    Ok(())
}

pub fn validate_start_inputs(
    config: &StartConfiguration,
    policy: LogFilePolicy,
    workdir: &Path,
) -> Result<(), ActionError> {
    require("aqua-key", &config.aqua_key)?;
    require("aqua-secret", &config.aqua_secret)?;
    require("access-token", &config.access_token)?;
    if !is_matrix_valid(&config.matrix) {
        return Err(ActionError::Validation(format!(
            "Matrix {} is not a valid JSON",
            config.matrix
        )));
    }
    if let Some(log_file) = &config.log_file {
        check_log_file(log_file, policy, workdir)?;
    }
    Ok(())
}

pub fn validate_end_inputs(config: &EndConfiguration) -> Result<(), ActionError> {
    require("aqua-key", &config.aqua_key)?;
    require("aqua-secret", &config.aqua_secret)?;
    Ok(())
}

pub fn is_matrix_valid(matrix: &str) -> bool {
    matrix.is_empty() || serde_json::from_str::<serde_json::Value>(matrix).is_ok()
}

pub fn resolve_against(workdir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workdir.join(path)
    }
}

fn log_file_parent(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn is_log_file_path_valid(log_file: &Path, workdir: &Path) -> bool {
    log_file_parent(&resolve_against(workdir, log_file)).is_dir()
}

pub fn check_log_file(
    log_file: &Path,
    policy: LogFilePolicy,
    workdir: &Path,
) -> Result<(), ActionError> {
    if !is_log_file_path_valid(log_file, workdir) {
        return Err(ActionError::Validation(format!(
            "Log file directory for {} does not exist",
            log_file.display()
        )));
    }
    if policy == LogFilePolicy::Fresh && resolve_against(workdir, log_file).exists() {
        return Err(ActionError::Validation(format!(
            "Log file {} already exists",
            log_file.display()
        )));
    }
    Ok(())
}
