//! Cached-file rule — copies a single static input to its generated output.
//! The cheap default for targets that need a real file in `genfiles/`
//! rather than a symlink (e.g. because a downstream tool refuses to follow
//! one), while still getting the engine's staleness caching for free.
//!
//! Unlike a plain copy, this rule hashes the resolved input's content and
//! skips rewriting the output when that hash matches the last build's —
//! e.g. a whitespace-only edit that round-trips through a formatter without
//! changing bytes shouldn't bump the output's mtime and cascade into
//! rebuilding everything downstream.

use kake_core::{BuildInvocation, Capability, KakeError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CachedFile;

fn hash_sidecar_path(output_abs: &Path) -> PathBuf {
    let mut name = output_abs.as_os_str().to_owned();
    name.push(".__srchash__");
    PathBuf::from(name)
}

async fn read_previous_hash(output_abs: &Path) -> Option<String> {
    tokio::fs::read_to_string(hash_sidecar_path(output_abs))
        .await
        .ok()
        .map(|s| s.trim().to_string())
}

async fn write_previous_hash(output_abs: &Path, hash: &str) -> std::io::Result<()> {
    tokio::fs::write(hash_sidecar_path(output_abs), hash).await
}

#[async_trait::async_trait]
impl Capability for CachedFile {
    fn version(&self) -> i64 {
        1
    }

    async fn build(&self, invocation: &BuildInvocation<'_>) -> Result<()> {
        let Some(input) = invocation.inputs.first() else {
            return Err(KakeError::bad_request(format!(
                "cached_file rule for {} has no inputs to copy from",
                invocation.output
            )));
        };
        let src = invocation.input_path(input);
        let dst = invocation.output_path();
        let current_hash = invocation.fsview.hash(input);

        if dst.exists() {
            if let (Some(current), Some(previous)) =
                (&current_hash, read_previous_hash(&dst).await)
            {
                if *current == previous {
                    debug!(target = %invocation.output, "input content unchanged, skipping copy");
                    return Ok(());
                }
            }
        }

        if let Some(parent) = dst.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(from = %src.display(), to = %dst.display(), "caching file");
        tokio::fs::copy(&src, &dst).await?;
        if let Some(hash) = current_hash {
            write_previous_hash(&dst, &hash).await?;
        }
        Ok(())
    }
}
