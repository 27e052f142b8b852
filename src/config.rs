//! Where tracefs lives.
//!
//! The mount point is an explicit configuration value. Nothing in the crate
//! reaches for a global root; callers build a [`TracefsConfig`] (from the
//! default, the environment, or by probing the usual mount points) and get the
//! root [`Instance`] from it.

use std::fs;
use std::path::{Path, PathBuf};

use nix::sys::statfs::{statfs, TRACEFS_MAGIC};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::instance::Instance;

pub const DEFAULT_TRACEFS_ROOT: &str = "/sys/kernel/tracing";
pub const DEBUGFS_TRACEFS_ROOT: &str = "/sys/kernel/debug/tracing";

/// Environment variable overriding the tracefs mount point.
pub const TRACEFS_ROOT_ENV: &str = "TRACEFS_ROOT";

const MOUNTS: &str = "/proc/self/mounts";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TracefsConfig {
    /// Mount point of tracefs.
    pub root: PathBuf,
}

impl Default for TracefsConfig {
    fn default() -> Self {
        TracefsConfig {
            root: PathBuf::from(DEFAULT_TRACEFS_ROOT),
        }
    }
}

impl TracefsConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TracefsConfig { root: root.into() }
    }

    /// Use `TRACEFS_ROOT` when it is set, the default mount point otherwise.
    pub fn from_env() -> Self {
        match std::env::var_os(TRACEFS_ROOT_ENV) {
            Some(root) if !root.is_empty() => TracefsConfig::new(root),
            _ => TracefsConfig::default(),
        }
    }

    /// Locate a mounted tracefs. The standard mount point is tried first,
    /// then the legacy one under debugfs, then the mount table.
    pub fn discover() -> Result<Self> {
        for candidate in [DEFAULT_TRACEFS_ROOT, DEBUGFS_TRACEFS_ROOT] {
            let path = Path::new(candidate);
            if is_tracefs(path) {
                tracing::debug!("Found tracefs at {}", candidate);
                return Ok(TracefsConfig::new(path));
            }
        }

        let mounts = fs::read_to_string(MOUNTS).map_err(|e| Error::io(Path::new(MOUNTS), e))?;
        match tracefs_from_mounts(&mounts) {
            Some(root) => {
                tracing::debug!("Found tracefs in mount table at {}", root.display());
                Ok(TracefsConfig::new(root))
            }
            None => Err(Error::MountNotFound),
        }
    }

    /// The root instance of the configured mount.
    pub fn root_instance(&self) -> Instance {
        Instance::root(&self.root)
    }
}

/// Whether `path` is the root of a tracefs mount.
pub fn is_tracefs(path: &Path) -> bool {
    match statfs(path) {
        Ok(stat) => stat.filesystem_type() == TRACEFS_MAGIC,
        Err(_) => false,
    }
}

// Lines of /proc/self/mounts look like
// tracefs /sys/kernel/tracing tracefs rw,nosuid,nodev,noexec,relatime 0 0
fn tracefs_from_mounts(mounts: &str) -> Option<PathBuf> {
    mounts.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let _source = fields.next()?;
        let target = fields.next()?;
        let fstype = fields.next()?;
        if fstype == "tracefs" {
            Some(PathBuf::from(unescape_mount_path(target)))
        } else {
            None
        }
    })
}

// The kernel escapes space, tab, newline and backslash in mount paths as
// three digit octal sequences.
fn unescape_mount_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 4 <= bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).unwrap_or("");
            if let Ok(val) = u8::from_str_radix(digits, 8) {
                out.push(val);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}
