//! Process-lifetime cache of `stat` results and content hashes.
//!
//! Multiple builds share one `FilesystemView`. Reads are lock-free via
//! `DashMap`'s sharded locking (the same primitive the teacher uses for its
//! process-wide `SessionRegistry`); individual entries are replaced
//! atomically so concurrent readers never observe a half-written entry.

use crate::path::TargetPath;
use dashmap::DashMap;
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatEntry {
    pub exists: bool,
    pub mtime: Option<SystemTime>,
    pub size: u64,
}

impl StatEntry {
    fn missing() -> Self {
        Self {
            exists: false,
            mtime: None,
            size: 0,
        }
    }
}

pub struct FilesystemView {
    project_root: PathBuf,
    stats: DashMap<TargetPath, StatEntry>,
    hashes: DashMap<TargetPath, String>,
}

impl FilesystemView {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root,
            stats: DashMap::new(),
            hashes: DashMap::new(),
        }
    }

    fn absolute(&self, target: &TargetPath) -> PathBuf {
        target.to_absolute(&self.project_root)
    }

    /// Return the cached stat entry, populating it from the OS on first
    /// observation.
    pub fn stat(&self, target: &TargetPath) -> StatEntry {
        if let Some(entry) = self.stats.get(target) {
            return entry.clone();
        }
        let entry = self.stat_uncached(target);
        self.stats.insert(target.clone(), entry.clone());
        entry
    }

    fn stat_uncached(&self, target: &TargetPath) -> StatEntry {
        match std::fs::symlink_metadata(self.absolute(target))
            .or_else(|_| std::fs::metadata(self.absolute(target)))
        {
            Ok(meta) => StatEntry {
                exists: true,
                mtime: meta.modified().ok(),
                size: meta.len(),
            },
            Err(_) => StatEntry::missing(),
        }
    }

    /// Return a stable content hash, computed lazily and cached. `None` if
    /// the file does not exist.
    pub fn hash(&self, target: &TargetPath) -> Option<String> {
        if let Some(h) = self.hashes.get(target) {
            return Some(h.clone());
        }
        let bytes = std::fs::read(self.absolute(target)).ok()?;
        let digest = blake3::hash(&bytes).to_hex().to_string();
        self.hashes.insert(target.clone(), digest.clone());
        Some(digest)
    }

    /// Drop cached entries for one path — called after a successful rebuild
    /// makes the output's new mtime/content visible on disk.
    pub fn invalidate(&self, target: &TargetPath) {
        self.stats.remove(target);
        self.hashes.remove(target);
    }

    /// Host-initiated full invalidation (e.g. on a filesystem-change signal).
    pub fn invalidate_all(&self) {
        self.stats.clear();
        self.hashes.clear();
    }

    pub fn project_root(&self) -> &std::path::Path {
        &self.project_root
    }
}
