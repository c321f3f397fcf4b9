//! Universal reader.
//!
//! Uses `sysinfo`, which wraps each OS's native counters behind one API.
//! Lower fidelity than the native readers but available everywhere, which
//! makes it the default.

use super::{volume, ResourceReader};
use crate::error::ReaderError;
use crate::sample::{Sample, Usage};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use sysinfo::{Disks, System};

const ID: &str = "universal";

/// A disk as reported by the OS, reduced to what volume selection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskEntry {
    /// Device name as reported by the OS.
    pub device: String,
    /// Mount point.
    pub mount_point: PathBuf,
    /// Filesystem type.
    pub fs_type: String,
    /// Whether the device is removable.
    pub removable: bool,
    /// Total bytes.
    pub total: u64,
    /// Available bytes.
    pub available: u64,
}

impl DiskEntry {
    /// Used/total space.
    #[must_use]
    pub fn usage(&self) -> Usage {
        Usage::from_bytes(self.total.saturating_sub(self.available), self.total)
    }

    /// Returns true if this disk counts as a fixed volume.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        !self.removable
            && !volume::is_loop_device(&self.device)
            && !volume::is_special_mount(&self.mount_point)
            && volume::is_fixed_fs(&self.fs_type)
    }
}

/// Picks the disk usage to report from a disk list and the working directory.
#[must_use]
pub fn disk_usage(disks: &[DiskEntry], cwd: Option<&Path>) -> Usage {
    let fixed = disks.iter().filter(|d| d.is_fixed()).map(|d| Some(d.usage()));

    volume::choose(fixed, || {
        let cwd = cwd?;
        disks
            .iter()
            .filter(|d| cwd.starts_with(&d.mount_point))
            .max_by_key(|d| d.mount_point.components().count())
            .map(DiskEntry::usage)
    })
}

/// State kept between samples; moved onto the blocking pool for each read.
struct Probe {
    system: System,
    has_baseline: bool,
}

impl Probe {
    fn new() -> Self {
        Self { system: System::new(), has_baseline: false }
    }

    fn read(&mut self) -> Sample {
        self.system.refresh_cpu_usage();
        let cpu = if self.has_baseline {
            let cpus = self.system.cpus();
            if cpus.is_empty() {
                0.0
            } else {
                let total: f32 = cpus.iter().map(sysinfo::Cpu::cpu_usage).sum();
                f64::from(total / cpus.len() as f32)
            }
        } else {
            // First refresh only establishes the baseline
            self.has_baseline = true;
            0.0
        };

        self.system.refresh_memory();
        let ram = Usage::from_bytes(self.system.used_memory(), self.system.total_memory());

        let disks: Vec<DiskEntry> = Disks::new_with_refreshed_list()
            .list()
            .iter()
            .map(|disk| DiskEntry {
                device: disk.name().to_string_lossy().into_owned(),
                mount_point: disk.mount_point().to_path_buf(),
                fs_type: disk.file_system().to_string_lossy().into_owned(),
                removable: disk.is_removable(),
                total: disk.total_space(),
                available: disk.available_space(),
            })
            .collect();
        let cwd = std::env::current_dir().ok();
        let disk = disk_usage(&disks, cwd.as_deref());

        Sample::now(cpu, ram, disk)
    }
}

/// Reader backed by `sysinfo`.
pub struct UniversalReader {
    probe: Option<Probe>,
}

impl UniversalReader {
    /// Creates a new universal reader.
    #[must_use]
    pub fn new() -> Self {
        Self { probe: None }
    }
}

impl Default for UniversalReader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UniversalReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniversalReader").field("initialized", &self.probe.is_some()).finish()
    }
}

#[async_trait]
impl ResourceReader for UniversalReader {
    fn id(&self) -> &'static str {
        ID
    }

    async fn initialize(&mut self) -> Result<(), ReaderError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ReaderError::Init {
                reader: ID,
                message: format!("sysinfo does not support {}", std::env::consts::OS),
            });
        }
        self.probe = Some(Probe::new());
        Ok(())
    }

    async fn sample(&mut self) -> Result<Sample, ReaderError> {
        // A probe lost to a panicked read is rebuilt; CPU restarts from a new baseline
        let mut probe = self.probe.take().unwrap_or_else(Probe::new);

        let (probe, sample) = tokio::task::spawn_blocking(move || {
            let sample = probe.read();
            (probe, sample)
        })
        .await
        .map_err(|e| ReaderError::Collection { reader: ID, message: e.to_string() })?;

        self.probe = Some(probe);
        Ok(sample)
    }

    fn display_name(&self) -> &'static str {
        "sysinfo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disk(mount: &str, fs: &str, removable: bool, total_mb: u64, avail_mb: u64) -> DiskEntry {
        DiskEntry {
            device: "/dev/sda1".to_string(),
            mount_point: PathBuf::from(mount),
            fs_type: fs.to_string(),
            removable,
            total: total_mb * 1024 * 1024,
            available: avail_mb * 1024 * 1024,
        }
    }

    #[test]
    fn test_disk_entry_usage() {
        assert_eq!(disk("/", "ext4", false, 1000, 250).usage(), Usage::new(750, 1000));
    }

    #[test]
    fn test_disk_usage_first_fixed() {
        let disks = vec![
            disk("/media/usb", "vfat", true, 100, 50),
            disk("/mnt/share", "nfs", false, 5000, 1000),
            disk("/", "ext4", false, 1000, 400),
            disk("/home", "ext4", false, 2000, 1000),
        ];

        assert_eq!(disk_usage(&disks, None), Usage::new(600, 1000));
    }

    #[test]
    fn test_disk_usage_skips_boot_and_loop_volumes() {
        let mut snap = disk("/var/lib/snapd/snap/core/1", "ext4", false, 64, 0);
        snap.device = "/dev/loop3".to_string();
        let disks = vec![disk("/boot/efi", "vfat", false, 512, 500), snap, disk("/", "ext4", false, 1000, 400)];

        assert_eq!(disk_usage(&disks, None), Usage::new(600, 1000));
    }

    #[test]
    fn test_disk_filter_agrees_with_proc_mounts() {
        let mounts = "/dev/nvme0n1p1 /boot/efi vfat rw 0 0\n/dev/nvme0n1p2 / ext4 rw 0 0\n";
        let from_proc = volume::fixed_mount_points(mounts);

        let disks = [disk("/boot/efi", "vfat", false, 512, 500), disk("/", "ext4", false, 1000, 400)];
        let from_sysinfo: Vec<PathBuf> =
            disks.iter().filter(|d| d.is_fixed()).map(|d| d.mount_point.clone()).collect();

        assert_eq!(from_proc, from_sysinfo);
    }

    #[test]
    fn test_disk_usage_falls_back_to_cwd_volume() {
        let disks = vec![disk("/", "overlay", false, 1000, 100), disk("/work", "overlay", false, 300, 100)];

        let usage = disk_usage(&disks, Some(Path::new("/work/project")));
        assert_eq!(usage, Usage::new(200, 300));
    }

    #[test]
    fn test_disk_usage_unknown_without_disks() {
        assert_eq!(disk_usage(&[], Some(Path::new("/"))), Usage::UNKNOWN);
        assert_eq!(disk_usage(&[], None), Usage::UNKNOWN);
    }

    #[tokio::test]
    async fn test_first_sample_reports_zero_cpu() {
        let mut reader = UniversalReader::new();
        reader.initialize().await.expect("sysinfo supports test hosts");

        let first = reader.sample().await.unwrap();
        assert_eq!(first.cpu_percent(), 0.0);
        assert!(first.ram_total_mb() > 0);
    }

    #[tokio::test]
    async fn test_second_sample_is_clamped() {
        let mut reader = UniversalReader::new();
        reader.initialize().await.unwrap();
        reader.sample().await.unwrap();

        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        let second = reader.sample().await.unwrap();
        assert!((0.0..=100.0).contains(&second.cpu_percent()));
    }

    #[tokio::test]
    async fn test_sample_without_initialize_still_works() {
        let mut reader = UniversalReader::new();
        let sample = reader.sample().await.unwrap();
        assert_eq!(sample.cpu_percent(), 0.0);
    }
}
