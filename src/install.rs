use crate::error::ActionError;
use crate::settings::Install;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, warn};

const USER_AGENT: &str = "pipeline-enforcer-action";

/// Capability to fetch the bytes behind a URL.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ActionError>;
}

pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ActionError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ActionError> {
        if let Some(path) = url.strip_prefix("file://") {
            return fs::read(path)
                .map_err(|err| ActionError::Download(format!("{url}: {err}")));
        }
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| ActionError::Download(format!("{url}: {err}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ActionError::Download(format!(
                "{url} (HTTP {status} {})",
                body.trim()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|err| ActionError::Download(format!("{url}: {err}")))?;
        Ok(bytes.to_vec())
    }
}

/// First whitespace-delimited token of a checksum manifest, lower-cased.
pub fn parse_checksum(content: &str) -> Result<String, ActionError> {
    let Some(token) = content.split_whitespace().next() else {
        return Err(ActionError::ChecksumManifest("manifest is empty".to_string()));
    };
    if token.len() != 64 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ActionError::ChecksumManifest(format!(
            "expected a sha256 hex digest, got {token:?}"
        )));
    }
    Ok(token.to_ascii_lowercase())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn verify_checksum(bytes: &[u8], manifest: &str) -> Result<(), ActionError> {
    let expected = parse_checksum(manifest)?;
    let actual = sha256_hex(bytes);
    debug!("Expected checksum: {expected}");
    debug!("Actual checksum: {actual}");
    if expected != actual {
        return Err(ActionError::Integrity { expected, actual });
    }
    Ok(())
}

fn run_installer(settings: &Install, script_path: &Path, workdir: &Path) -> Result<(), ActionError> {
    let output = Command::new(&settings.shell)
        .arg(script_path)
        .current_dir(workdir)
        .env("BINDIR", ".")
        .stdin(Stdio::null())
        .output()
        .map_err(|err| {
            ActionError::Install(format!("failed to run {}: {err}", settings.shell))
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        debug!("{}", stdout.trim_end());
    }
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ActionError::Install(format!(
            "installer exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    Ok(())
}

fn remove_installer(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        warn!("Failed to delete installation script: {err}");
    }
}

/// Downloads the installer, verifies it against the published checksum and runs it.
///
/// Every step short-circuits; the installer is never executed unless its digest matches.
pub fn install(
    fetcher: &dyn Fetcher,
    settings: &Install,
    workdir: &Path,
) -> Result<PathBuf, ActionError> {
    let script_path = workdir.join(&settings.script_path);
    let script = fetcher.fetch(&settings.script_url)?;
    if let Some(parent) = script_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&script_path, &script)
        .map_err(|err| ActionError::Download(format!("{}: {err}", script_path.display())))?;

    let verified = fetcher
        .fetch(&settings.checksum_url)
        .and_then(|manifest| verify_checksum(&script, &String::from_utf8_lossy(&manifest)));
    if let Err(err) = verified {
        remove_installer(&script_path);
        return Err(err);
    }

    let installed = run_installer(settings, &script_path, workdir);
    remove_installer(&script_path);
    installed?;
    Ok(script_path)
}
