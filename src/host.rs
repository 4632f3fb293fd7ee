//! Host CI logging channel.
//!
//! Everything the runner should interpret goes to stdout as a workflow command
//! (`::warning::...`, `::add-mask::...`). Step outputs and the job summary are
//! appended to the files the runner names in `GITHUB_OUTPUT` and
//! `GITHUB_STEP_SUMMARY`.

use crate::inputs::Secret;
use std::env;
use std::fmt::{self, Write as _};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "PIPELINE_ENFORCER_ACTION_LOG";
/// Our own debug lines; dependencies only from warn up.
pub const DEFAULT_LOG_FILTER: &str = "pipeline_enforcer_action=debug,warn";

pub fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Renders tracing events as workflow commands.
pub struct WorkflowCommands;

impl<S, N> FormatEvent<S, N> for WorkflowCommands
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut message = String::new();
        ctx.format_fields(Writer::new(&mut message), event)?;
        let line = match *event.metadata().level() {
            Level::ERROR => format!("::error::{}", escape_data(&message)),
            Level::WARN => format!("::warning::{}", escape_data(&message)),
            Level::INFO => message,
            _ => format!("::debug::{}", escape_data(&message)),
        };
        writeln!(writer, "{line}")
    }
}

pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stdout)
        .event_format(WorkflowCommands)
        .try_init();
}

fn emit(line: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let _ = writeln!(handle, "{line}");
}

/// Registers secret values with the runner so they are redacted from every later log line.
pub fn mask_secrets(secrets: &[&Secret]) {
    for secret in secrets {
        if !secret.is_empty() {
            emit(&format!("::add-mask::{}", escape_data(secret.expose())));
        }
    }
}

pub fn start_group(title: &str) {
    emit(&format!("::group::{}", escape_data(title)));
}

pub fn end_group() {
    emit("::endgroup::");
}

fn env_file(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}

fn append(path: &PathBuf, content: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(content.as_bytes())
}

/// Appends `name=value` to `GITHUB_OUTPUT`. No-op outside the runner.
pub fn set_output(name: &str, value: &str) -> io::Result<()> {
    let Some(path) = env_file("GITHUB_OUTPUT") else {
        return Ok(());
    };
    append(&path, &format!("{name}={}\n", value.replace('\n', " ")))
}

#[derive(Debug, Default)]
pub struct Summary {
    buffer: String,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn heading(mut self, text: &str) -> Self {
        let _ = writeln!(self.buffer, "### {text}\n");
        self
    }

    pub fn row(mut self, key: &str, value: &str) -> Self {
        if !self.buffer.contains("| --- |") {
            self.buffer.push_str("| | |\n| --- | --- |\n");
        }
        let _ = writeln!(self.buffer, "| {key} | {value} |");
        self
    }

    pub fn code_block(mut self, body: &str) -> Self {
        if body.trim().is_empty() {
            return self;
        }
        let _ = write!(self.buffer, "\n```\n{}\n```\n", body.trim_end());
        self
    }

    pub fn as_markdown(&self) -> &str {
        &self.buffer
    }

    /// Appends to `GITHUB_STEP_SUMMARY`. No-op outside the runner.
    pub fn write(&self) -> io::Result<()> {
        let Some(path) = env_file("GITHUB_STEP_SUMMARY") else {
            return Ok(());
        };
        append(&path, &format!("{}\n", self.as_markdown()))
    }
}
