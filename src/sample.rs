//! Core sample types.
//!
//! - [`Usage`]: a used/total pair in megabytes with a derived percentage
//! - [`Sample`]: one point-in-time reading of CPU, memory and disk
//! - [`Zone`]: the time zone samples are stamped in
//!
//! A `Sample` is created once per tick, never mutated, and handed to every
//! sink by shared reference.

use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Returns `used / total * 100`, or 0 when `total` is 0.
#[must_use]
pub fn percent_of(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64) * 100.0
}

/// A used/total pair in megabytes.
///
/// `used <= total` is expected but not enforced: fallback readers may
/// legitimately report either a violation or a zero total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Used megabytes.
    pub used_mb: u64,
    /// Total megabytes.
    pub total_mb: u64,
}

impl Usage {
    /// The `(0, 0)` reading reported when a sub-metric could not be queried.
    pub const UNKNOWN: Self = Self { used_mb: 0, total_mb: 0 };

    /// Creates a usage pair from megabyte values.
    #[must_use]
    pub const fn new(used_mb: u64, total_mb: u64) -> Self {
        Self { used_mb, total_mb }
    }

    /// Creates a usage pair from byte values, truncating to whole megabytes.
    #[must_use]
    pub const fn from_bytes(used: u64, total: u64) -> Self {
        Self { used_mb: used / BYTES_PER_MB, total_mb: total / BYTES_PER_MB }
    }

    /// Creates a usage pair from kibibyte values.
    #[must_use]
    pub const fn from_kib(used: u64, total: u64) -> Self {
        Self { used_mb: used / 1024, total_mb: total / 1024 }
    }

    /// Returns the usage percentage (0 when the total is 0).
    #[must_use]
    pub fn percent(&self) -> f64 {
        percent_of(self.used_mb, self.total_mb)
    }

    /// Returns true if this is the `(0, 0)` degraded reading.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

/// One point-in-time resource utilization reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    timestamp: DateTime<FixedOffset>,
    cpu_percent: f64,
    ram: Usage,
    disk: Usage,
}

impl Sample {
    /// Creates a sample. CPU usage is clamped to `[0, 100]`.
    #[must_use]
    pub fn new(timestamp: DateTime<FixedOffset>, cpu_percent: f64, ram: Usage, disk: Usage) -> Self {
        let cpu_percent = if cpu_percent.is_finite() { cpu_percent.clamp(0.0, 100.0) } else { 0.0 };
        Self { timestamp, cpu_percent, ram, disk }
    }

    /// Creates a sample stamped with the current UTC time.
    ///
    /// The scheduler re-stamps it into the configured [`Zone`].
    #[must_use]
    pub fn now(cpu_percent: f64, ram: Usage, disk: Usage) -> Self {
        Self::new(Utc::now().fixed_offset(), cpu_percent, ram, disk)
    }

    /// Returns the same instant expressed in `zone`.
    #[must_use]
    pub fn in_zone(self, zone: Zone) -> Self {
        Self { timestamp: zone.convert(self.timestamp), ..self }
    }

    /// When the sample was taken.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// CPU utilization in `[0, 100]`.
    #[must_use]
    pub fn cpu_percent(&self) -> f64 {
        self.cpu_percent
    }

    /// Memory usage.
    #[must_use]
    pub fn ram(&self) -> Usage {
        self.ram
    }

    /// Disk usage of the designated volume.
    #[must_use]
    pub fn disk(&self) -> Usage {
        self.disk
    }

    /// Used memory in megabytes.
    #[must_use]
    pub fn ram_used_mb(&self) -> u64 {
        self.ram.used_mb
    }

    /// Total memory in megabytes.
    #[must_use]
    pub fn ram_total_mb(&self) -> u64 {
        self.ram.total_mb
    }

    /// Used disk space in megabytes.
    #[must_use]
    pub fn disk_used_mb(&self) -> u64 {
        self.disk.used_mb
    }

    /// Total disk space in megabytes.
    #[must_use]
    pub fn disk_total_mb(&self) -> u64 {
        self.disk.total_mb
    }

    /// Memory usage percentage (0 when total is 0).
    #[must_use]
    pub fn ram_percent(&self) -> f64 {
        self.ram.percent()
    }

    /// Disk usage percentage (0 when total is 0).
    #[must_use]
    pub fn disk_percent(&self) -> f64 {
        self.disk.percent()
    }
}

/// Time zone used to stamp samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Zone {
    /// The host's local zone.
    #[default]
    Local,
    /// Coordinated Universal Time.
    Utc,
    /// A fixed offset from UTC, e.g. `+08:00`.
    Fixed(FixedOffset),
}

impl Zone {
    /// Expresses `instant` in this zone.
    #[must_use]
    pub fn convert(self, instant: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
        match self {
            Self::Local => instant.with_timezone(&Local).fixed_offset(),
            Self::Utc => instant.with_timezone(&Utc).fixed_offset(),
            Self::Fixed(offset) => instant.with_timezone(&offset),
        }
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "local" | "" => return Ok(Self::Local),
            "utc" | "z" => return Ok(Self::Utc),
            _ => {}
        }

        let (sign, rest) = match trimmed.as_bytes().first() {
            Some(b'+') => (1, &trimmed[1..]),
            Some(b'-') => (-1, &trimmed[1..]),
            _ => return Err(format!("expected 'local', 'utc' or an offset like '+08:00', got '{s}'")),
        };

        let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
        let hours = offset_field(hours).ok_or_else(|| format!("invalid offset hours in '{s}'"))?;
        let minutes = offset_field(minutes).ok_or_else(|| format!("invalid offset minutes in '{s}'"))?;
        if hours > 23 || minutes > 59 {
            return Err(format!("offset out of range: '{s}'"));
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::Fixed)
            .ok_or_else(|| format!("offset out of range: '{s}'"))
    }
}

/// Parses one unsigned offset component. `u32::from_str` alone would accept a sign.
fn offset_field(text: &str) -> Option<i32> {
    if text.is_empty() || text.len() > 2 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

impl TryFrom<String> for Zone {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Zone> for String {
    fn from(zone: Zone) -> Self {
        zone.to_string()
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Utc => f.write_str("utc"),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
