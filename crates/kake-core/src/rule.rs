//! The rule capability surface (§4.7): the contract concrete rule plugins
//! implement. Kept as a trait with default (no-op) methods so a rule only
//! overrides the hooks it needs — variants like `CachedFile` or
//! `CreateSymlink` (in the `kake-rules` crate) are distinct implementors,
//! not a subclass hierarchy.

use crate::context::{BuildContext, ContextView};
use crate::error::Result;
use crate::executor::ProcessRunner;
use crate::fsview::FilesystemView;
use crate::path::TargetPath;
use std::collections::{BTreeMap, BTreeSet};

/// Read-only view of a resolved node, passed into capability hooks that
/// need to know which target/bindings they're being asked about.
pub struct NodeView<'a> {
    pub target: &'a TargetPath,
    pub bindings: &'a BTreeMap<String, String>,
    pub label: &'a str,
}

/// Everything a capability's `build()` needs to produce its output.
pub struct BuildInvocation<'a> {
    pub output: TargetPath,
    pub inputs: &'a [TargetPath],
    pub changed_inputs: &'a [TargetPath],
    pub context: &'a ContextView,
    pub project_root: &'a std::path::Path,
    pub runner: &'a ProcessRunner,
    /// Shared stat/hash cache, for rules that want to short-circuit on
    /// unchanged input content rather than just a changed mtime.
    pub fsview: &'a FilesystemView,
}

impl<'a> BuildInvocation<'a> {
    pub fn input_path(&self, target: &TargetPath) -> std::path::PathBuf {
        target.to_absolute(self.project_root)
    }

    pub fn output_path(&self) -> std::path::PathBuf {
        self.output.to_absolute(self.project_root)
    }
}

#[async_trait::async_trait]
pub trait Capability: Send + Sync {
    /// Bumped by the rule author whenever `build` semantics change in a way
    /// that alters output bytes.
    fn version(&self) -> i64;

    /// Produce `output` from `inputs`. Must be deterministic given the same
    /// inputs, context view, and version.
    async fn build(&self, invocation: &BuildInvocation<'_>) -> Result<()>;

    /// Extra inputs discovered by inspecting `current_inputs`. Called until
    /// it returns an empty/stable set; computed inputs may only be added,
    /// never removed, between iterations.
    fn computed_inputs(
        &self,
        _node: &NodeView,
        _current_inputs: &[TargetPath],
        _context: &BuildContext,
    ) -> Vec<TargetPath> {
        Vec::new()
    }

    /// Subset of context keys this rule reads; participates in staleness.
    fn used_context_keys(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Secondary outputs produced atomically with the primary.
    fn split_outputs(&self, _node: &NodeView) -> BTreeSet<TargetPath> {
        BTreeSet::new()
    }

    /// Symlink fast path: if `Some(p)`, the executor symlinks the output to
    /// `p` instead of calling `build`.
    fn maybe_symlink_to(&self, _node: &NodeView) -> Option<TargetPath> {
        None
    }

    /// Paths that force a rebuild but are not passed to `build`.
    fn non_input_deps(&self, _node: &NodeView) -> Vec<TargetPath> {
        Vec::new()
    }
}
