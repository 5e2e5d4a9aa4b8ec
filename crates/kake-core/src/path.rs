//! Path resolution: canonicalizing project-relative paths and classifying
//! them as source vs. generated.

use std::fmt;
use std::path::{Path, PathBuf};

/// A project-root-relative, forward-slash path. Opaque identifier for a
/// build target; two `TargetPath`s are equal iff their normalized strings
/// are equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetPath(String);

impl TargetPath {
    /// Normalize an arbitrary path-like string into project-relative,
    /// forward-slash form. Leading `./` is stripped; backslashes (as seen
    /// on some inputs) are normalized to `/`. A leading `/` is preserved —
    /// it marks an absolute, host-system path that is opaque to the graph
    /// (used for referencing system binaries from input lists).
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref();
        let replaced = raw.replace('\\', "/");
        let trimmed = replaced
            .strip_prefix("./")
            .unwrap_or(replaced.as_str())
            .trim_end_matches('/');
        Self(trimmed.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }

    /// Split into forward-slash segments (empty for the root path).
    pub fn segments(&self) -> Vec<&str> {
        self.0.split('/').filter(|s| !s.is_empty()).collect()
    }

    /// True if this path lives under the given generated-files prefix.
    pub fn is_generated(&self, genfiles_prefix: &str) -> bool {
        let prefix = genfiles_prefix.trim_end_matches('/');
        self.0 == prefix || self.0.starts_with(&format!("{prefix}/"))
    }

    /// Resolve to an absolute filesystem path under `project_root`.
    /// Absolute `TargetPath`s (leading `/`) are returned unchanged, since
    /// they already refer to a host-system location outside the project.
    pub fn to_absolute(&self, project_root: &Path) -> PathBuf {
        if self.is_absolute() {
            PathBuf::from(&self.0)
        } else {
            project_root.join(&self.0)
        }
    }

    /// Substitute `{name}` segments using the given bindings, leaving any
    /// unbound segment untouched.
    pub fn substitute(&self, bindings: &std::collections::BTreeMap<String, String>) -> TargetPath {
        let segs: Vec<String> = self
            .segments()
            .into_iter()
            .map(|seg| {
                if let Some(name) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    bindings.get(name).cloned().unwrap_or_else(|| seg.to_string())
                } else {
                    seg.to_string()
                }
            })
            .collect();
        TargetPath(segs.join("/"))
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TargetPath {
    fn from(s: &str) -> Self {
        TargetPath::new(s)
    }
}

impl From<String> for TargetPath {
    fn from(s: String) -> Self {
        TargetPath::new(s)
    }
}
