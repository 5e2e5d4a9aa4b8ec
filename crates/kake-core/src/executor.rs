//! The build executor (§4.6): topological scheduling, single-flight
//! coalescing, subprocess dispatch, and the symlink fast path.

use crate::config::EngineConfig;
use crate::error::{KakeError, Result};
use crate::fsview::FilesystemView;
use crate::path::TargetPath;
use crate::resolver::{GeneratedNode, Plan, PlanNode};
use crate::rule::{BuildInvocation, NodeView};
use crate::staleness::{self, Sidecar};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{join_all, BoxFuture, FutureExt, Shared, TryFutureExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Runs subprocesses on behalf of a capability's `build()`, enforcing
/// `cwd = project_root` and turning a non-zero exit into a `BuildFailed`.
pub struct ProcessRunner {
    project_root: std::path::PathBuf,
}

impl ProcessRunner {
    pub fn new(project_root: std::path::PathBuf) -> Self {
        Self { project_root }
    }

    pub async fn call(
        &self,
        label: &str,
        output: &TargetPath,
        argv: &[String],
    ) -> Result<std::process::Output> {
        let Some(program) = argv.first() else {
            return Err(KakeError::bad_request("call() requires a non-empty argv"));
        };
        let result = tokio::process::Command::new(program)
            .args(&argv[1..])
            .current_dir(&self.project_root)
            .output()
            .await
            .map_err(|e| KakeError::Io(e.to_string()))?;

        if !result.status.success() {
            return Err(KakeError::build_failed(
                label,
                output.clone(),
                Some(argv.to_vec()),
                String::from_utf8_lossy(&result.stderr),
            ));
        }
        Ok(result)
    }
}

type SharedBuildResult = Shared<BoxFuture<'static, std::result::Result<(), Arc<KakeError>>>>;

/// Process-wide build orchestration shared across every `Engine::build`
/// call: the single-flight table, the worker semaphore, and bookkeeping for
/// split outputs.
pub struct Executor {
    config: Arc<EngineConfig>,
    fsview: Arc<FilesystemView>,
    runner: Arc<ProcessRunner>,
    inflight: DashMap<TargetPath, SharedBuildResult>,
    semaphore: Arc<Semaphore>,
    /// secondary output -> primary target, populated after a successful
    /// split-output build so a direct request for a sibling redirects.
    split_owners: DashMap<TargetPath, TargetPath>,
}

impl Executor {
    pub fn new(config: Arc<EngineConfig>, fsview: Arc<FilesystemView>) -> Arc<Self> {
        let runner = Arc::new(ProcessRunner::new(config.project_root.clone()));
        let semaphore = Arc::new(Semaphore::new(config.worker_count.max(1)));
        Arc::new(Self {
            config,
            fsview,
            runner,
            inflight: DashMap::new(),
            semaphore,
            split_owners: DashMap::new(),
        })
    }

    /// If `target` is a previously-observed secondary output of a
    /// split-outputs build, return the primary target it belongs to.
    pub fn redirect_for_split_output(&self, target: &TargetPath) -> Option<TargetPath> {
        self.split_owners.get(target).map(|v| v.clone())
    }

    #[instrument(skip_all, fields(root = %plan.root))]
    pub async fn execute(self: &Arc<Self>, plan: Arc<Plan>, cancel: CancellationToken) -> Result<()> {
        Self::build_node(self.clone(), plan.clone(), plan.root.clone(), cancel).await
    }

    fn build_node(
        executor: Arc<Executor>,
        plan: Arc<Plan>,
        target: TargetPath,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        async move {
            if cancel.is_cancelled() {
                return Err(KakeError::Cancelled(target));
            }
            let node = match plan.nodes.get(&target) {
                Some(PlanNode::Generated(node)) => node.clone(),
                _ => return Ok(()),
            };

            let child_futures: Vec<_> = node
                .inputs
                .iter()
                .cloned()
                .map(|input| Self::build_node(executor.clone(), plan.clone(), input, cancel.clone()))
                .collect();
            for result in join_all(child_futures).await {
                result?;
            }

            executor.build_self(&node, cancel).await
        }
        .boxed()
    }

    /// Single-flight coalesce + staleness check + build for one node, once
    /// its children are known-fresh.
    async fn build_self(self: &Arc<Self>, node: &GeneratedNode, cancel: CancellationToken) -> Result<()> {
        let target = node.target.clone();
        let shared: SharedBuildResult = match self.inflight.entry(target.clone()) {
            Entry::Occupied(e) => e.get().clone(),
            Entry::Vacant(e) => {
                let executor = self.clone();
                let node = node.clone();
                let fut = async move { executor.build_uncoalesced(&node, cancel).await }
                    .map_err(Arc::new)
                    .boxed()
                    .shared();
                e.insert(fut.clone());
                fut
            }
        };

        let result = shared.await;
        self.inflight.remove(&target);
        result.map_err(|e| (*e).clone())
    }

    #[instrument(skip(self, node), fields(target = %node.target, label = %node.rule.label))]
    async fn build_uncoalesced(&self, node: &GeneratedNode, cancel: CancellationToken) -> Result<()> {
        let node_view = NodeView {
            target: &node.target,
            bindings: &node.bindings,
            label: &node.rule.label,
        };
        let non_input_deps = node.rule.capability.non_input_deps(&node_view);
        for dep in &non_input_deps {
            // non-input deps still participate in the DAG's freshness even
            // though they were never resolved as plan nodes.
            let _ = self.fsview.stat(dep);
        }

        if !staleness::is_stale(node, &non_input_deps, &self.fsview, &self.config.project_root) {
            debug!("up to date, skipping build");
            return Ok(());
        }

        if let Some(symlink_target) = node.rule.capability.maybe_symlink_to(&node_view) {
            return self.run_symlink_fast_path(node, &symlink_target).await;
        }

        self.run_build(node, &node_view, cancel).await
    }

    async fn run_symlink_fast_path(&self, node: &GeneratedNode, symlink_target: &TargetPath) -> Result<()> {
        let target_abs = symlink_target.to_absolute(&self.config.project_root);
        if !target_abs.exists() {
            return Err(KakeError::build_failed(
                &node.rule.label,
                node.target.clone(),
                None,
                format!("maybe_symlink_to target does not exist: {symlink_target}"),
            ));
        }
        let output_abs = node.target.to_absolute(&self.config.project_root);
        if output_abs.exists() || output_abs.symlink_metadata().is_ok() {
            std::fs::remove_file(&output_abs)?;
        }
        let relative = relative_symlink(&output_abs, &target_abs);
        #[cfg(unix)]
        std::os::unix::fs::symlink(&relative, &output_abs)?;
        #[cfg(not(unix))]
        std::fs::copy(&target_abs, &output_abs).map(|_| ())?;

        staleness::write_sidecar(
            &output_abs,
            &Sidecar {
                version_tag: node.version_tag,
                context_digest: node.context_view.digest(),
            },
        )?;
        self.fsview.invalidate(&node.target);
        info!("symlinked (fast path)");
        Ok(())
    }

    async fn run_build(&self, node: &GeneratedNode, node_view: &NodeView<'_>, cancel: CancellationToken) -> Result<()> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("semaphore is never closed");

        let out_stat = self.fsview.stat(&node.target);
        let changed_inputs: Vec<TargetPath> = if !out_stat.exists {
            node.inputs.clone()
        } else {
            node.inputs
                .iter()
                .filter(|i| {
                    let in_stat = self.fsview.stat(i);
                    match (in_stat.mtime, out_stat.mtime) {
                        (Some(im), Some(om)) => im > om,
                        _ => true,
                    }
                })
                .cloned()
                .collect()
        };

        let invocation = BuildInvocation {
            output: node.target.clone(),
            inputs: &node.inputs,
            changed_inputs: &changed_inputs,
            context: &node.context_view,
            project_root: &self.config.project_root,
            runner: &self.runner,
            fsview: &self.fsview,
        };

        let build_fut = node.rule.capability.build(&invocation);
        let outcome = match self.config.default_timeout_secs {
            Some(secs) => {
                let duration = Duration::from_secs(secs);
                tokio::select! {
                    res = tokio::time::timeout(duration, build_fut) => {
                        match res {
                            Ok(inner) => inner,
                            Err(_) => return Err(KakeError::Timeout(duration, node.target.clone())),
                        }
                    }
                    _ = cancel.cancelled() => return Err(KakeError::Cancelled(node.target.clone())),
                }
            }
            None => {
                tokio::select! {
                    res = build_fut => res,
                    _ = cancel.cancelled() => return Err(KakeError::Cancelled(node.target.clone())),
                }
            }
        };
        outcome?;

        let output_abs = node.target.to_absolute(&self.config.project_root);
        if !output_abs.exists() {
            return Err(KakeError::MissingOutput {
                output: node.target.clone(),
            });
        }

        let sidecar = Sidecar {
            version_tag: node.version_tag,
            context_digest: node.context_view.digest(),
        };
        staleness::write_sidecar(&output_abs, &sidecar)?;
        self.fsview.invalidate(&node.target);

        let split_outputs = node.rule.capability.split_outputs(node_view);
        for secondary in &split_outputs {
            let secondary_abs = secondary.to_absolute(&self.config.project_root);
            if !secondary_abs.exists() {
                return Err(KakeError::MissingOutput {
                    output: secondary.clone(),
                });
            }
            staleness::write_sidecar(&secondary_abs, &sidecar)?;
            self.fsview.invalidate(secondary);
            self.split_owners.insert(secondary.clone(), node.target.clone());
        }

        info!(changed = changed_inputs.len(), "built");
        Ok(())
    }
}

/// Compute a relative path from `from`'s parent directory to `to`, so
/// symlinks stay relative within the project root.
fn relative_symlink(from: &std::path::Path, to: &std::path::Path) -> std::path::PathBuf {
    let from_dir = from.parent().unwrap_or_else(|| std::path::Path::new(""));
    match pathdiff(to, from_dir) {
        Some(p) => p,
        None => to.to_path_buf(),
    }
}

fn pathdiff(target: &std::path::Path, base: &std::path::Path) -> Option<std::path::PathBuf> {
    use std::path::Component;
    let target_components: Vec<Component> = target.components().collect();
    let base_components: Vec<Component> = base.components().collect();

    let common = target_components
        .iter()
        .zip(base_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = std::path::PathBuf::new();
    for _ in common..base_components.len() {
        result.push("..");
    }
    for component in &target_components[common..] {
        result.push(component.as_os_str());
    }
    if result.as_os_str().is_empty() {
        None
    } else {
        Some(result)
    }
}
