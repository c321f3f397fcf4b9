//! Reader selection.
//!
//! [`select`] is a pure function of the platform identity and the configured
//! mode, so platform detection can be tested (and overridden) in isolation.

use super::{BoxedReader, DarwinReader, ProcReader, ReaderMode, UniversalReader};
use std::fmt;
use tracing::warn;

/// Operating system family the process runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Linux (has `/proc`).
    Linux,
    /// macOS.
    MacOs,
    /// Windows.
    Windows,
    /// Anything else.
    Other,
}

impl Platform {
    /// Detects the platform of the running binary.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Maps an OS identifier (as in `std::env::consts::OS`) to a platform.
    #[must_use]
    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" | "android" => Self::Linux,
            "macos" => Self::MacOs,
            "windows" => Self::Windows,
            _ => Self::Other,
        }
    }

    /// Returns true if a native reader exists for this platform.
    #[must_use]
    pub fn has_native_reader(self) -> bool {
        matches!(self, Self::Linux | Self::MacOs)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linux => "linux",
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Other => "other",
        })
    }
}

/// Chooses the reader variant for `platform` under `mode`.
///
/// Never fails: platforms without a native reader (Windows included, where
/// `sysinfo` already reads native counters) get the universal reader.
#[must_use]
pub fn select(platform: Platform, mode: ReaderMode) -> BoxedReader {
    if mode == ReaderMode::Universal || !platform.has_native_reader() {
        if mode == ReaderMode::Native {
            warn!(%platform, "no native reader for this platform; using universal");
        }
        return Box::new(UniversalReader::new());
    }

    match platform {
        Platform::MacOs => Box::new(DarwinReader::new()),
        _ => Box::new(ProcReader::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_os() {
        assert_eq!(Platform::from_os("linux"), Platform::Linux);
        assert_eq!(Platform::from_os("macos"), Platform::MacOs);
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("freebsd"), Platform::Other);
        assert_eq!(Platform::from_os(""), Platform::Other);
    }

    #[test]
    fn test_platform_detect_matches_target() {
        let platform = Platform::detect();

        #[cfg(target_os = "linux")]
        assert_eq!(platform, Platform::Linux);
        #[cfg(target_os = "macos")]
        assert_eq!(platform, Platform::MacOs);
        #[cfg(target_os = "windows")]
        assert_eq!(platform, Platform::Windows);

        let _ = platform;
    }

    #[test]
    fn test_select_universal_mode_ignores_platform() {
        for platform in [Platform::Linux, Platform::MacOs, Platform::Windows, Platform::Other] {
            assert_eq!(select(platform, ReaderMode::Universal).id(), "universal");
        }
    }

    #[test]
    fn test_select_native_per_platform() {
        assert_eq!(select(Platform::Linux, ReaderMode::Native).id(), "proc");
        assert_eq!(select(Platform::MacOs, ReaderMode::Native).id(), "darwin");
        assert_eq!(select(Platform::Windows, ReaderMode::Native).id(), "universal");
        assert_eq!(select(Platform::Other, ReaderMode::Auto).id(), "universal");
    }

    #[test]
    fn test_select_is_deterministic() {
        let first = select(Platform::Linux, ReaderMode::Auto).id();
        let second = select(Platform::Linux, ReaderMode::Auto).id();
        assert_eq!(first, second);
    }

    #[test]
    fn test_has_native_reader() {
        assert!(Platform::Linux.has_native_reader());
        assert!(Platform::MacOs.has_native_reader());
        assert!(!Platform::Windows.has_native_reader());
        assert!(!Platform::Other.has_native_reader());
    }
}
