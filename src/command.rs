use crate::inputs::{is_log_file_path_valid, EndConfiguration, StartConfiguration};
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
    /// Rendered with a trailing `&` so the shell returns immediately.
    pub background: bool,
}

pub fn shell_single_quote(value: &str) -> String {
    // foo'bar -> 'foo'\''bar'
    let mut out = String::new();
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

impl CommandLine {
    pub fn to_shell(&self) -> String {
        let mut words = vec![shell_single_quote(&self.program)];
        words.extend(self.args.iter().map(|arg| shell_single_quote(arg)));
        if self.background {
            words.push("&".to_string());
        }
        words.join(" ")
    }

    pub fn display(&self) -> String {
        let mut rendered = self.program.clone();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

fn push_log_file(args: &mut Vec<String>, log_file: Option<&Path>, workdir: &Path) {
    let Some(log_file) = log_file else {
        return;
    };
    if is_log_file_path_valid(log_file, workdir) {
        args.push("--log-file".to_string());
        args.push(log_file.to_string_lossy().to_string());
    } else {
        warn!(
            "Log file path {} is invalid. Ignoring log file flag",
            log_file.display()
        );
    }
}

pub fn start_command(config: &StartConfiguration, binary: &str, workdir: &Path) -> CommandLine {
    let mut args = vec![
        "ci".to_string(),
        "start".to_string(),
        "-r".to_string(),
        config.repo_path.clone(),
    ];
    if !config.matrix.is_empty() {
        args.push("--github-matrix".to_string());
        args.push(config.matrix.clone());
    }
    if config.verbose && !config.quiet {
        args.push("-v".to_string());
    }
    if config.quiet {
        args.push("-q".to_string());
    }
    push_log_file(&mut args, config.log_file.as_deref(), workdir);
    CommandLine {
        program: binary.to_string(),
        args,
        background: true,
    }
}

pub fn end_command(config: &EndConfiguration, binary: &str, workdir: &Path) -> CommandLine {
    let mut args = vec!["ci".to_string(), "end".to_string()];
    if config.verbose {
        args.push("-v".to_string());
    }
    push_log_file(&mut args, config.log_file.as_deref(), workdir);
    CommandLine {
        program: binary.to_string(),
        args,
        background: false,
    }
}
