//! Core logging bootstrap.
//!
//! # Responsibility
//! - Start one size-rotated file logger per process.
//! - Capture panics as metadata-only log events.
//!
//! # Invariants
//! - Initialization never panics.
//! - Repeating initialization with identical settings is a no-op.
//! - Switching level or directory after startup is rejected.
//! - Log lines carry ids and instants only; reminder labels are never logged.

use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "streeek_core";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_LOG_FILES: usize = 3;
const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    level: &'static str,
    log_dir: PathBuf,
}

impl LogSettings {
    fn parse(level: &str, log_dir: &str) -> Result<Self, String> {
        Ok(Self {
            level: normalize_level(level)?,
            log_dir: normalize_log_dir(log_dir)?,
        })
    }

    /// Explains why `requested` cannot replace these settings, if it cannot.
    fn conflict_with(&self, requested: &LogSettings) -> Option<String> {
        if self.log_dir != requested.log_dir {
            return Some(format!(
                "logging already initialized at `{}`; refusing to switch to `{}`",
                self.log_dir.display(),
                requested.log_dir.display()
            ));
        }
        if self.level != requested.level {
            return Some(format!(
                "logging already initialized with level `{}`; refusing to switch to `{}`",
                self.level, requested.level
            ));
        }
        None
    }
}

struct ActiveLogger {
    settings: LogSettings,
    _handle: LoggerHandle,
}

/// Initializes core logging with level and directory.
///
/// # Errors
/// - Unsupported `level`, or empty/relative `log_dir`.
/// - The directory cannot be created or the backend fails to start.
/// - Logging is already active with a different level or directory.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let requested = LogSettings::parse(level, log_dir)?;

    let active = ACTIVE_LOGGER.get_or_try_init(|| start_logger(requested.clone()))?;
    match active.settings.conflict_with(&requested) {
        Some(conflict) => Err(conflict),
        None => Ok(()),
    }
}

/// Returns `(level, log_dir)` of the active logger, if any.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    ACTIVE_LOGGER
        .get()
        .map(|active| (active.settings.level, active.settings.log_dir.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn start_logger(settings: LogSettings) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(&settings.log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            settings.log_dir.display()
        )
    })?;

    let handle = Logger::try_with_str(settings.level)
        .map_err(|err| format!("invalid log level `{}`: {err}", settings.level))?
        .log_to_file(
            FileSpec::default()
                .directory(settings.log_dir.as_path())
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    install_panic_hook_once();

    info!(
        "event=core_init module=logging status=ok platform={} build_mode={} version={} level={} log_dir={}",
        std::env::consts::OS,
        if cfg!(debug_assertions) { "debug" } else { "release" },
        env!("CARGO_PKG_VERSION"),
        settings.level,
        settings.log_dir.display()
    );

    Ok(ActiveLogger {
        settings,
        _handle: handle,
    })
}

fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=logging status=error location={} payload={}",
            location,
            sanitize_message(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Flattens newlines and caps length; panic payloads may echo user input.
fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
