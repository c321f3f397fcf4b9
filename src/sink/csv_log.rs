//! CSV file sink.
//!
//! Appends one row per sample to a CSV file. Reopening an existing file
//! continues after its last row; the header is written once per file.
//!
//! ## Parameters
//!
//! - `path` (required): file to append to; parent directories are created
//! - `high_usage_percent` (default 90): threshold for the `high_usage` column

use super::{Sink, SinkParams};
use crate::error::SinkError;
use crate::sample::Sample;
use async_trait::async_trait;
use chrono::SecondsFormat;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Column header, without line terminator.
pub const HEADER: &str = "timestamp,cpu_percent,ram_used_mb,ram_total_mb,ram_percent,disk_used_mb,disk_total_mb,disk_percent,high_usage";

const DEFAULT_HIGH_USAGE_PERCENT: f64 = 90.0;

/// What an existing file needs before new rows can be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Existing {
    /// Data rows already present.
    pub rows: u64,
    /// The file is empty (or blank) and needs a header.
    pub needs_header: bool,
    /// The last row is not newline-terminated.
    pub needs_newline: bool,
}

/// Inspects existing file content.
///
/// # Errors
///
/// Returns a description of the problem if the first line is not [`HEADER`].
pub fn inspect(content: &str) -> Result<Existing, String> {
    if content.trim().is_empty() {
        return Ok(Existing { rows: 0, needs_header: true, needs_newline: false });
    }

    let mut lines = content.lines();
    let header = lines.next().unwrap_or_default().trim_end_matches('\r');
    if header != HEADER {
        return Err(format!("existing file has an unexpected header: {header}"));
    }

    Ok(Existing {
        rows: lines.filter(|line| !line.trim().is_empty()).count() as u64,
        needs_header: false,
        needs_newline: !content.ends_with('\n'),
    })
}

/// Formats one sample as a CSV row, without line terminator.
#[must_use]
pub fn format_row(sample: &Sample, high_usage_percent: f64) -> String {
    let high_usage = sample.cpu_percent() >= high_usage_percent
        || sample.ram_percent() >= high_usage_percent
        || sample.disk_percent() >= high_usage_percent;

    format!(
        "{},{:.1},{},{},{:.1},{},{},{:.1},{}",
        sample.timestamp().to_rfc3339_opts(SecondsFormat::Secs, false),
        sample.cpu_percent(),
        sample.ram_used_mb(),
        sample.ram_total_mb(),
        sample.ram_percent(),
        sample.disk_used_mb(),
        sample.disk_total_mb(),
        sample.disk_percent(),
        high_usage,
    )
}

struct OpenLog {
    path: PathBuf,
    file: File,
    high_usage_percent: f64,
    rows_before: u64,
    rows_written: u64,
}

/// Sink appending samples to a CSV file.
pub struct CsvLogSink {
    state: Mutex<Option<OpenLog>>,
}

impl CsvLogSink {
    /// Registered name.
    pub const NAME: &'static str = "csv_log";

    /// Creates an uninitialized sink.
    #[must_use]
    pub fn new() -> Self {
        Self { state: Mutex::new(None) }
    }

    async fn open(path: &Path, high_usage_percent: f64) -> Result<OpenLog, SinkError> {
        let init_err = |e: std::io::Error| SinkError::init(Self::NAME, format!("{}: {e}", path.display()));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(init_err)?;
        }

        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(init_err(e)),
        };
        let existing = inspect(&content)
            .map_err(|message| SinkError::config(Self::NAME, format!("{}: {message}", path.display())))?;

        let mut file =
            OpenOptions::new().create(true).append(true).open(path).await.map_err(init_err)?;

        if existing.needs_header {
            // Blank files may hold stray whitespace
            file.set_len(0).await.map_err(init_err)?;
            file.write_all(format!("{HEADER}\n").as_bytes()).await.map_err(init_err)?;
        } else if existing.needs_newline {
            file.write_all(b"\n").await.map_err(init_err)?;
        }
        file.flush().await.map_err(init_err)?;

        debug!(sink = Self::NAME, path = %path.display(), rows = existing.rows, "opened log");
        Ok(OpenLog {
            path: path.to_path_buf(),
            file,
            high_usage_percent,
            rows_before: existing.rows,
            rows_written: 0,
        })
    }
}

impl Default for CsvLogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CsvLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvLogSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl Sink for CsvLogSink {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn initialize(&self, params: &SinkParams) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Ok(());
        }

        let path = PathBuf::from(params.required_str("path")?);
        let high_usage_percent = params.f64_or("high_usage_percent", DEFAULT_HIGH_USAGE_PERCENT)?;

        let log = Self::open(&path, high_usage_percent).await?;
        if log.rows_before > 0 {
            info!(sink = Self::NAME, path = %path.display(), rows = log.rows_before, "appending to existing log");
        }
        *state = Some(log);
        Ok(())
    }

    async fn on_sample(&self, sample: &Sample) -> Result<(), SinkError> {
        let mut state = self.state.lock().await;
        let log = state.as_mut().ok_or_else(|| SinkError::write(Self::NAME, "not initialized"))?;

        let line = format!("{}\n", format_row(sample, log.high_usage_percent));
        let written = match log.file.write_all(line.as_bytes()).await {
            Ok(()) => log.file.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| SinkError::write(Self::NAME, format!("{}: {e}", log.path.display())))?;
        log.rows_written += 1;
        Ok(())
    }

    async fn shutdown(&self) -> Result<Option<String>, SinkError> {
        let Some(mut log) = self.state.lock().await.take() else {
            return Ok(None);
        };

        let synced = match log.file.flush().await {
            Ok(()) => log.file.sync_all().await,
            Err(e) => Err(e),
        };
        synced.map_err(|e| SinkError::shutdown(Self::NAME, format!("{}: {e}", log.path.display())))?;

        Ok(Some(format!(
            "{} rows written this run, {} total in {}",
            log.rows_written,
            log.rows_before + log.rows_written,
            log.path.display()
        )))
    }
}
