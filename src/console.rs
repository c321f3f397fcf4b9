//! Console line format.

use crate::sample::Sample;

/// Timestamp layout of the console line.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats one sample as a console line.
///
/// ```text
/// [2024-03-01 12:00:00] CPU: 12.5% | RAM: 2048MB/8192MB (25.0%) | Disk: 100MB/1000MB (10.0%)
/// ```
#[must_use]
pub fn format_line(sample: &Sample) -> String {
    format!(
        "[{}] CPU: {:.1}% | RAM: {}MB/{}MB ({:.1}%) | Disk: {}MB/{}MB ({:.1}%)",
        sample.timestamp().format(TIMESTAMP_FORMAT),
        sample.cpu_percent(),
        sample.ram_used_mb(),
        sample.ram_total_mb(),
        sample.ram_percent(),
        sample.disk_used_mb(),
        sample.disk_total_mb(),
        sample.disk_percent(),
    )
}
