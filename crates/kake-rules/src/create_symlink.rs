//! Symlink rule — points a generated target at an existing file without
//! copying bytes. Drives the executor's symlink fast path (`maybe_symlink_to`).

use kake_core::{BuildInvocation, Capability, KakeError, NodeView, Result, TargetPath};

/// Always resolves to the same symlink destination once its source pattern
/// is substituted with the node's bindings — e.g. registering this against
/// `genfiles/static/{name}` with `source_pattern = "assets/{name}"` links
/// every generated static asset back to its source copy.
pub struct CreateSymlink {
    source_pattern: TargetPath,
}

impl CreateSymlink {
    pub fn new(source_pattern: impl Into<String>) -> Self {
        Self {
            source_pattern: TargetPath::new(source_pattern.into()),
        }
    }
}

#[async_trait::async_trait]
impl Capability for CreateSymlink {
    fn version(&self) -> i64 {
        1
    }

    /// The executor never calls `build` for a rule that always offers a
    /// symlink fast path — this only fires if that invariant is violated.
    async fn build(&self, invocation: &BuildInvocation<'_>) -> Result<()> {
        Err(KakeError::bad_request(format!(
            "create_symlink rule invoked build() directly for {}; maybe_symlink_to should have handled it",
            invocation.output
        )))
    }

    fn maybe_symlink_to(&self, node: &NodeView) -> Option<TargetPath> {
        Some(self.source_pattern.substitute(node.bindings))
    }
}
