//! Linux reader.
//!
//! Parses `/proc/stat` and `/proc/meminfo`, and sizes the root fixed volume
//! with `statvfs`.
//!
//! ## Metrics
//!
//! - CPU: delta of the aggregate `cpu` line between two samples
//! - Memory: `MemTotal - MemAvailable`
//! - Disk: first fixed mount in `/proc/mounts`

use super::{cpu_delta_percent, volume, ResourceReader};
use crate::error::ReaderError;
use crate::sample::{Sample, Usage};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

const ID: &str = "proc";

/// Cumulative CPU time from the aggregate `/proc/stat` line, in jiffies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTimes {
    /// Total CPU time.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.user
            + self.nice
            + self.system
            + self.idle
            + self.iowait
            + self.irq
            + self.softirq
            + self.steal
    }

    /// Idle time (idle + iowait).
    #[must_use]
    pub fn idle_time(&self) -> u64 {
        self.idle + self.iowait
    }

    /// Busy time (total - idle).
    #[must_use]
    pub fn busy_time(&self) -> u64 {
        self.total().saturating_sub(self.idle_time())
    }

    /// Utilization between `prev` and `self`, in percent.
    ///
    /// Jiffies summed over all cores already scale with the core count, so
    /// `busy / total` equals `busy / (elapsed * cores)`.
    #[must_use]
    pub fn usage_since(&self, prev: &Self) -> f64 {
        cpu_delta_percent(prev.busy_time(), prev.total(), self.busy_time(), self.total())
    }
}

/// Parses the aggregate `cpu ` line of `/proc/stat`.
///
/// Returns None if the line is missing or has fewer than four counters.
#[must_use]
pub fn parse_stat(content: &str) -> Option<CpuTimes> {
    let line = content.lines().find(|line| line.starts_with("cpu "))?;
    let fields: Vec<u64> =
        line.split_whitespace().skip(1).map(|s| s.parse().unwrap_or(0)).collect();
    if fields.len() < 4 {
        return None;
    }

    let field = |i: usize| fields.get(i).copied().unwrap_or(0);
    Some(CpuTimes {
        user: field(0),
        nice: field(1),
        system: field(2),
        idle: field(3),
        iowait: field(4),
        irq: field(5),
        softirq: field(6),
        steal: field(7),
    })
}

/// Parses `/proc/meminfo` into a used/total pair.
///
/// Uses `MemAvailable` when the kernel provides it, otherwise
/// `MemFree + Buffers + Cached`. Returns None without `MemTotal`.
#[must_use]
pub fn parse_meminfo(content: &str) -> Option<Usage> {
    let mut total = None;
    let mut available = None;
    let mut free = 0u64;
    let mut buffers = 0u64;
    let mut cached = 0u64;

    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        // Values are in kB
        let value: u64 = rest.split_whitespace().next().and_then(|v| v.parse().ok()).unwrap_or(0);

        match key.trim() {
            "MemTotal" => total = Some(value),
            "MemAvailable" => available = Some(value),
            "MemFree" => free = value,
            "Buffers" => buffers = value,
            "Cached" => cached = value,
            _ => {}
        }
    }

    let total = total?;
    let available = available.unwrap_or(free + buffers + cached);
    Some(Usage::from_kib(total.saturating_sub(available), total))
}

/// Reader backed by Linux `/proc` pseudo-files.
#[derive(Debug)]
pub struct ProcReader {
    root: PathBuf,
    prev_cpu: Option<CpuTimes>,
    volumes: Vec<PathBuf>,
}

impl ProcReader {
    /// Creates a reader over the real `/proc`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Creates a reader over an alternate procfs root (used by tests).
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), prev_cpu: None, volumes: Vec::new() }
    }

    async fn read(&self, name: &str) -> std::io::Result<String> {
        tokio::fs::read_to_string(self.root.join(name)).await
    }

    async fn read_cpu(&self) -> Option<CpuTimes> {
        match self.read("stat").await {
            Ok(content) => parse_stat(&content),
            Err(e) => {
                debug!(reader = ID, "failed to read stat: {e}");
                None
            }
        }
    }

    async fn read_memory(&self) -> Usage {
        match self.read("meminfo").await {
            Ok(content) => parse_meminfo(&content).unwrap_or(Usage::UNKNOWN),
            Err(e) => {
                debug!(reader = ID, "failed to read meminfo: {e}");
                Usage::UNKNOWN
            }
        }
    }

    fn require(path: &Path) -> Result<(), ReaderError> {
        if path.exists() {
            Ok(())
        } else {
            Err(ReaderError::Init { reader: ID, message: format!("{} is not available", path.display()) })
        }
    }
}

impl Default for ProcReader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceReader for ProcReader {
    fn id(&self) -> &'static str {
        ID
    }

    async fn initialize(&mut self) -> Result<(), ReaderError> {
        Self::require(&self.root.join("stat"))?;
        Self::require(&self.root.join("meminfo"))?;

        self.prev_cpu = None;
        self.volumes = match self.read("mounts").await {
            Ok(content) => volume::fixed_mount_points(&content),
            Err(_) => Vec::new(),
        };
        debug!(reader = ID, volumes = ?self.volumes, "fixed volume candidates");
        Ok(())
    }

    async fn sample(&mut self) -> Result<Sample, ReaderError> {
        let cpu = match (self.prev_cpu, self.read_cpu().await) {
            (Some(prev), Some(curr)) => {
                self.prev_cpu = Some(curr);
                curr.usage_since(&prev)
            }
            (None, Some(curr)) => {
                // First reading is the baseline
                self.prev_cpu = Some(curr);
                0.0
            }
            (_, None) => 0.0,
        };

        let ram = self.read_memory().await;
        let disk = volume::select_usage(&self.volumes).await;

        Ok(Sample::now(cpu, ram, disk))
    }

    fn display_name(&self) -> &'static str {
        "Linux /proc"
    }
}
