//! Free space on the disk holding a recording.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use sysinfo::Disks;

/// Available bytes on the disk whose mount point is the longest prefix of `path`.
///
/// `None` when no mounted disk contains the path (or the platform reports none).
pub fn available_space(path: &Path) -> Option<u64> {
    let path = resolve(path);
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

/// Canonical form of `path`, falling back to its parent for files that do not
/// exist yet.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(path) = path.canonicalize() {
        return path;
    }
    if let Some(parent) = path.parent().and_then(|p| p.canonicalize().ok()) {
        return parent;
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Throttled [`available_space`] for polling from a control tick.
#[derive(Debug)]
pub struct DiskSpaceProbe {
    path: PathBuf,
    interval: Duration,
    last_poll: Option<Instant>,
    available: Option<u64>,
}

impl DiskSpaceProbe {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_poll: None,
            available: None,
        }
    }

    /// Refresh if the interval has passed since the last refresh.
    pub fn poll(&mut self) -> Option<u64> {
        let due = self
            .last_poll
            .map_or(true, |last| last.elapsed() >= self.interval);
        if due {
            self.refresh();
        }
        self.available
    }

    pub fn refresh(&mut self) -> Option<u64> {
        self.available = available_space(&self.path);
        self.last_poll = Some(Instant::now());
        self.available
    }

    /// Last value read, without probing.
    pub fn available(&self) -> Option<u64> {
        self.available
    }
}
