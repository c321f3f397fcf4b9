//! macOS reader.
//!
//! Shells out to native utilities, each under a bounded timeout:
//!
//! - `top -l 1 -n 0` for CPU (one-shot, so the first sample is meaningful)
//! - `sysctl -n hw.memsize` and `vm_stat` for memory
//! - `df -k` for disk

use super::{volume, ResourceReader};
use crate::error::ReaderError;
use crate::sample::{Sample, Usage};
use crate::subprocess::run_with_timeout_stdout;
use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

const ID: &str = "darwin";

/// Parses the `CPU usage:` line of `top -l 1` output into user + sys percent.
#[must_use]
pub fn parse_top_cpu(content: &str) -> Option<f64> {
    static CPU_LINE: OnceLock<Regex> = OnceLock::new();
    let re = CPU_LINE.get_or_init(|| {
        Regex::new(r"CPU usage:\s*([\d.]+)% user,\s*([\d.]+)% sys,\s*([\d.]+)% idle")
            .expect("CPU usage pattern is valid")
    });

    let caps = re.captures(content)?;
    let user: f64 = caps.get(1)?.as_str().parse().ok()?;
    let sys: f64 = caps.get(2)?.as_str().parse().ok()?;
    Some((user + sys).clamp(0.0, 100.0))
}

/// Parses `vm_stat` output into used memory, given total bytes from `sysctl`.
///
/// Reclaimable pages (free, speculative, inactive, purgeable) count as available.
#[must_use]
pub fn parse_vm_stat(content: &str, total_bytes: u64) -> Option<Usage> {
    static PAGE_SIZE: OnceLock<Regex> = OnceLock::new();
    let re = PAGE_SIZE
        .get_or_init(|| Regex::new(r"page size of (\d+) bytes").expect("page size pattern is valid"));

    let page_size: u64 = re
        .captures(content)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(4096);

    let mut seen = false;
    let mut reclaimable_pages = 0u64;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let pages: u64 = match value.trim().trim_end_matches('.').parse() {
            Ok(v) => v,
            Err(_) => continue,
        };

        match key.trim() {
            "Pages free" | "Pages speculative" | "Pages inactive" | "Pages purgeable" => {
                seen = true;
                reclaimable_pages += pages;
            }
            _ => {}
        }
    }

    if !seen || total_bytes == 0 {
        return None;
    }

    let available = reclaimable_pages.saturating_mul(page_size);
    Some(Usage::from_bytes(total_bytes.saturating_sub(available), total_bytes))
}

/// A volume row of `df -k` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DfRow {
    /// Device path (e.g. `/dev/disk3s1`).
    pub device: String,
    /// Mount point.
    pub mount_point: String,
    /// Used/total space.
    pub usage: Usage,
}

/// The writable APFS volume holding user data on macOS 10.15+.
const DATA_VOLUME: &str = "/System/Volumes/Data";

impl DfRow {
    /// Returns true if the row is a local, non-system volume.
    ///
    /// The sealed system snapshot is mounted at `/`; real usage lives on the
    /// Data volume, which is the one `/System` mount that counts.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        if !self.device.starts_with("/dev/") {
            return false;
        }
        if self.mount_point == DATA_VOLUME {
            return true;
        }
        !self.mount_point.starts_with("/System")
            && !self.mount_point.starts_with("/private/var/vm")
            && !self.mount_point.starts_with("/Volumes/")
            && !self.mount_point.contains("/Preboot")
            && !self.mount_point.contains("/Recovery")
            && !self.mount_point.contains("/Update")
    }
}

/// Fixed volumes in selection order: the Data volume first when present,
/// then the rest in `df` order.
#[must_use]
pub fn fixed_volumes(rows: Vec<DfRow>) -> Vec<DfRow> {
    let mut fixed: Vec<DfRow> = rows.into_iter().filter(DfRow::is_fixed).collect();
    fixed.sort_by_key(|row| row.mount_point != DATA_VOLUME);
    fixed
}

/// Parses `df -k` output.
///
/// ```text
/// Filesystem    1024-blocks      Used Available Capacity  iused ifree %iused  Mounted on
/// /dev/disk3s1   976490576 123456789 876543210    13%   ...                  /
/// ```
#[must_use]
pub fn parse_df(content: &str) -> Vec<DfRow> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            let total_kb: u64 = parts[1].parse().ok()?;
            let used_kb: u64 = parts[2].parse().ok()?;

            // Mount point is everything after the last percentage column
            let mount_start = parts.iter().rposition(|p| p.ends_with('%'))? + 1;
            let mount_point = if mount_start < parts.len() {
                parts[mount_start..].join(" ")
            } else {
                return None;
            };

            Some(DfRow {
                device: parts[0].to_string(),
                mount_point,
                usage: Usage::from_kib(used_kb, total_kb),
            })
        })
        .collect()
}

/// Reader backed by macOS command-line utilities.
#[derive(Debug)]
pub struct DarwinReader {
    total_memory: u64,
    timeout: Duration,
}

impl DarwinReader {
    /// Creates a new macOS reader.
    #[must_use]
    pub fn new() -> Self {
        Self { total_memory: 0, timeout: Duration::from_secs(5) }
    }

    async fn read_cpu(&self) -> f64 {
        // top can be slow; it gets the full timeout
        match run_with_timeout_stdout("top", &["-l", "1", "-n", "0", "-s", "0"], self.timeout).await {
            Some(content) => parse_top_cpu(&content).unwrap_or(0.0),
            None => {
                debug!(reader = ID, "top timed out or failed");
                0.0
            }
        }
    }

    async fn read_memory(&self) -> Usage {
        match run_with_timeout_stdout("vm_stat", &[], Duration::from_secs(2)).await {
            Some(content) => parse_vm_stat(&content, self.total_memory).unwrap_or(Usage::UNKNOWN),
            None => {
                debug!(reader = ID, "vm_stat timed out or failed");
                Usage::UNKNOWN
            }
        }
    }

    async fn read_disk(&self) -> Usage {
        let fixed: Vec<Option<Usage>> = run_with_timeout_stdout("df", &["-k"], self.timeout)
            .await
            .map(|content| fixed_volumes(parse_df(&content)).into_iter().map(|row| Some(row.usage)).collect())
            .unwrap_or_default();

        if fixed.iter().flatten().any(|usage| usage.total_mb > 0) {
            return volume::choose(fixed, || None);
        }

        let cwd = run_with_timeout_stdout("df", &["-k", "."], self.timeout)
            .await
            .and_then(|content| parse_df(&content).into_iter().next().map(|row| row.usage));

        volume::choose(fixed, || cwd)
    }
}

impl Default for DarwinReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceReader for DarwinReader {
    fn id(&self) -> &'static str {
        ID
    }

    async fn initialize(&mut self) -> Result<(), ReaderError> {
        let total = run_with_timeout_stdout("sysctl", &["-n", "hw.memsize"], Duration::from_secs(1))
            .await
            .ok_or_else(|| ReaderError::Init {
                reader: ID,
                message: "sysctl is not available".to_string(),
            })?;

        self.total_memory = total.trim().parse().map_err(|_| ReaderError::Init {
            reader: ID,
            message: format!("unexpected hw.memsize output: {}", total.trim()),
        })?;
        Ok(())
    }

    async fn sample(&mut self) -> Result<Sample, ReaderError> {
        let (cpu, ram, disk) = tokio::join!(self.read_cpu(), self.read_memory(), self.read_disk());
        Ok(Sample::now(cpu, ram, disk))
    }

    fn display_name(&self) -> &'static str {
        "macOS utilities"
    }
}
