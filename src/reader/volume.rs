//! Disk volume selection.
//!
//! Policy: the first ready fixed volume; failing that, the volume holding the
//! current working directory; failing that, `(0, 0)`. Never an error.

use crate::sample::Usage;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for a single filesystem size query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Filesystem types that are never treated as fixed local volumes.
///
/// Network and virtual filesystems can hang a size query or report sizes
/// unrelated to local storage.
const NON_FIXED_FS: &[&str] = &[
    "nfs", "nfs4", "cifs", "smbfs", "autofs", "fuse.sshfs", "fuse.rclone", "fuse.gvfsd-fuse", "9p",
    "squashfs", "tmpfs", "devtmpfs", "overlay", "iso9660",
];

/// Mount point prefixes that hold pseudo or runtime filesystems.
const SPECIAL_MOUNTS: &[&str] = &["/sys", "/proc", "/dev", "/run", "/snap", "/boot/efi"];

/// Returns true if a filesystem type can back a fixed local volume.
#[must_use]
pub fn is_fixed_fs(fs_type: &str) -> bool {
    !NON_FIXED_FS.contains(&fs_type)
}

/// Returns true if `mount_point` holds a pseudo, runtime or boot filesystem.
#[must_use]
pub fn is_special_mount(mount_point: &Path) -> bool {
    SPECIAL_MOUNTS.iter().any(|prefix| mount_point.starts_with(prefix))
}

/// Returns true if `device` is a loop device (snaps, mounted images).
#[must_use]
pub fn is_loop_device(device: &str) -> bool {
    device.starts_with("/dev/loop")
}

/// Extracts fixed-volume mount points from `/proc/mounts` content, in order.
#[must_use]
pub fn fixed_mount_points(mounts: &str) -> Vec<PathBuf> {
    let mut points = Vec::new();

    for line in mounts.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }

        let (device, mount_point, fs_type) = (fields[0], fields[1], fields[2]);

        // Virtual filesystems have no backing device path
        if !device.starts_with('/') || is_loop_device(device) {
            continue;
        }

        // /proc/mounts escapes spaces as \040
        let mount_point = PathBuf::from(mount_point.replace("\\040", " "));
        if is_special_mount(&mount_point) || !is_fixed_fs(fs_type) {
            continue;
        }

        points.push(mount_point);
    }

    points
}

/// Applies the selection policy to already-queried candidates.
///
/// A candidate is ready when its query succeeded and reported a non-zero
/// total. `cwd` is only evaluated if no candidate is ready.
pub fn choose<I, F>(candidates: I, cwd: F) -> Usage
where
    I: IntoIterator<Item = Option<Usage>>,
    F: FnOnce() -> Option<Usage>,
{
    candidates
        .into_iter()
        .flatten()
        .find(|usage| usage.total_mb > 0)
        .or_else(|| cwd().filter(|usage| usage.total_mb > 0))
        .unwrap_or(Usage::UNKNOWN)
}

/// Queries used/total space of the filesystem containing `path`.
#[cfg(unix)]
#[must_use]
#[allow(unsafe_code)]
pub fn statvfs(path: &Path) -> Option<Usage> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();

    // SAFETY: c_path is NUL-terminated and stat points to writable storage
    // large enough for a statvfs struct.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: statvfs returned 0, so the struct is fully initialized.
    let stat = unsafe { stat.assume_init() };

    let frsize = u64::from(stat.f_frsize);
    let total = u64::from(stat.f_blocks).saturating_mul(frsize);
    let free = u64::from(stat.f_bfree).saturating_mul(frsize);

    Some(Usage::from_bytes(total.saturating_sub(free), total))
}

#[cfg(not(unix))]
#[must_use]
pub fn statvfs(_path: &Path) -> Option<Usage> {
    None
}

/// Runs [`statvfs`] off the async executor with a bounded timeout.
pub async fn query(path: PathBuf) -> Option<Usage> {
    let task = tokio::task::spawn_blocking(move || statvfs(&path));
    match tokio::time::timeout(QUERY_TIMEOUT, task).await {
        Ok(Ok(usage)) => usage,
        Ok(Err(_)) | Err(_) => None,
    }
}

/// Selects a volume among `candidates` and returns its usage.
///
/// Candidates are queried in order until one is ready. The working directory
/// is queried only when none is.
pub async fn select_usage(candidates: &[PathBuf]) -> Usage {
    select_with(candidates, std::env::current_dir, query).await
}

async fn select_with<C, Q, F>(candidates: &[PathBuf], cwd: C, query: Q) -> Usage
where
    C: FnOnce() -> std::io::Result<PathBuf>,
    Q: Fn(PathBuf) -> F,
    F: Future<Output = Option<Usage>>,
{
    let mut queried = Vec::with_capacity(candidates.len());
    for path in candidates {
        let usage = query(path.clone()).await;
        let ready = usage.is_some_and(|u| u.total_mb > 0);
        queried.push(usage);
        if ready {
            return choose(queried, || None);
        }
    }

    let cwd = match cwd() {
        Ok(dir) => query(dir).await,
        Err(_) => None,
    };

    choose(queried, || cwd)
}
