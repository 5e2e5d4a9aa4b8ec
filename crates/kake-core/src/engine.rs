//! The public facade: a long-lived engine instance a host constructs once,
//! registers rules against at startup, and then calls `build`/`build_many`
//! on repeatedly as file requests arrive.

use crate::config::EngineConfig;
use crate::context::BuildContext;
use crate::error::Result;
use crate::executor::Executor;
use crate::fsview::FilesystemView;
use crate::path::TargetPath;
use crate::registry::RuleRegistry;
use crate::resolver::{self, Plan};
use crate::rule::Capability;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

struct Runtime {
    fsview: Arc<FilesystemView>,
    executor: Arc<Executor>,
}

impl Runtime {
    fn new(config: &Arc<EngineConfig>) -> Self {
        let fsview = Arc::new(FilesystemView::new(config.project_root.clone()));
        let executor = Executor::new(config.clone(), fsview.clone());
        Self { fsview, executor }
    }
}

pub struct Engine {
    config: RwLock<Arc<EngineConfig>>,
    registry: RwLock<RuleRegistry>,
    runtime: RwLock<Runtime>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let runtime = Runtime::new(&config);
        Self {
            config: RwLock::new(config),
            registry: RwLock::new(RuleRegistry::new()),
            runtime: RwLock::new(runtime),
        }
    }

    /// Register a compile rule. Mirrors `RuleRegistry::register` — see its
    /// docs for collision rules.
    pub fn register_compile(
        &self,
        label: impl Into<String>,
        output_pattern: impl Into<String>,
        input_patterns: &[&str],
        capability: Arc<dyn Capability>,
    ) -> Result<()> {
        self.registry
            .write()
            .expect("registry lock poisoned")
            .register(label, output_pattern, input_patterns, capability)
    }

    pub fn rule_count(&self) -> usize {
        self.registry.read().expect("registry lock poisoned").len()
    }

    pub async fn build(&self, target: &TargetPath, context: &BuildContext) -> Result<()> {
        let redirect = self
            .runtime
            .read()
            .expect("runtime lock poisoned")
            .executor
            .redirect_for_split_output(target);
        let effective = redirect.as_ref().unwrap_or(target);
        self.build_many(std::slice::from_ref(effective), context).await
    }

    pub async fn build_many(&self, targets: &[TargetPath], context: &BuildContext) -> Result<()> {
        let config = self.config.read().expect("config lock poisoned").clone();
        let (fsview, executor) = {
            let runtime = self.runtime.read().expect("runtime lock poisoned");
            (runtime.fsview.clone(), runtime.executor.clone())
        };

        let plans: Vec<Arc<Plan>> = {
            let registry = self.registry.read().expect("registry lock poisoned");
            targets
                .iter()
                .map(|target| {
                    resolver::resolve(
                        &registry,
                        &fsview,
                        &config.project_root,
                        &config.genfiles_prefix,
                        target,
                        context,
                        config.computed_inputs_max_iterations,
                    )
                    .map(Arc::new)
                })
                .collect::<Result<Vec<_>>>()?
        };

        let cancel = CancellationToken::new();
        let results = join_all(plans.into_iter().map(|plan| {
            let executor = executor.clone();
            let cancel = cancel.clone();
            async move { executor.execute(plan, cancel).await }
        }))
        .await;
        for result in results {
            result?;
        }
        Ok(())
    }

    /// Drop every cached stat/hash entry, forcing the next build to re-stat
    /// everything from disk.
    pub fn invalidate_filesystem_view(&self) {
        self.runtime
            .read()
            .expect("runtime lock poisoned")
            .fsview
            .invalidate_all();
    }

    /// Content hash of a built target, for callers that need a cache
    /// validator (e.g. an HTTP front end's `ETag`). `None` if the file
    /// doesn't exist.
    pub fn content_hash(&self, target: &TargetPath) -> Option<String> {
        self.runtime.read().expect("runtime lock poisoned").fsview.hash(target)
    }

    /// Absolute filesystem path a target resolves to under the current
    /// project root.
    pub fn resolve_path(&self, target: &TargetPath) -> PathBuf {
        target.to_absolute(&self.config.read().expect("config lock poisoned").project_root)
    }

    /// Re-root the engine at a new project directory. Rebuilds the
    /// filesystem view and executor — any in-flight builds from before the
    /// swap finish against the old runtime, future calls see the new one.
    pub fn set_project_root(&self, path: impl Into<PathBuf>) {
        let mut config_guard = self.config.write().expect("config lock poisoned");
        let mut next = (**config_guard).clone();
        next.project_root = path.into();
        let next = Arc::new(next);
        let runtime = Runtime::new(&next);
        *config_guard = next;
        *self.runtime.write().expect("runtime lock poisoned") = runtime;
    }

    pub fn set_genfiles_prefix(&self, prefix: impl Into<String>) {
        let mut config_guard = self.config.write().expect("config lock poisoned");
        let mut next = (**config_guard).clone();
        next.genfiles_prefix = prefix.into();
        *config_guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::BuildInvocation;

    struct WriteStatic(&'static str);
    #[async_trait::async_trait]
    impl Capability for WriteStatic {
        fn version(&self) -> i64 {
            1
        }
        async fn build(&self, invocation: &BuildInvocation<'_>) -> Result<()> {
            let path = invocation.output_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, self.0)?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn builds_a_registered_target() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(EngineConfig::new(dir.path()));
        engine
            .register_compile("write", "genfiles/out.txt", &[], Arc::new(WriteStatic("hi")))
            .unwrap();

        engine
            .build(&TargetPath::new("genfiles/out.txt"), &BuildContext::new())
            .await
            .unwrap();

        let contents = std::fs::read_to_string(dir.path().join("genfiles/out.txt")).unwrap_or_default();
        assert_eq!(contents, "hi");
    }

    struct WriteTwo;
    #[async_trait::async_trait]
    impl Capability for WriteTwo {
        fn version(&self) -> i64 {
            1
        }
        fn split_outputs(&self, _node: &crate::rule::NodeView<'_>) -> std::collections::BTreeSet<TargetPath> {
            std::iter::once(TargetPath::new("genfiles/secondary.txt")).collect()
        }
        async fn build(&self, invocation: &BuildInvocation<'_>) -> Result<()> {
            let primary = invocation.output_path();
            if let Some(parent) = primary.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&primary, "primary")?;
            std::fs::write(primary.with_file_name("secondary.txt"), "secondary")?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn direct_request_for_a_split_secondary_redirects_to_the_primary_build() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(EngineConfig::new(dir.path()));
        engine
            .register_compile("pair", "genfiles/primary.txt", &[], Arc::new(WriteTwo))
            .unwrap();

        engine
            .build(&TargetPath::new("genfiles/primary.txt"), &BuildContext::new())
            .await
            .unwrap();

        // The secondary was never registered as its own rule output, but the
        // executor remembers it belongs to the primary's last build.
        engine
            .build(&TargetPath::new("genfiles/secondary.txt"), &BuildContext::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_target_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new(EngineConfig::new(dir.path()));
        let err = engine
            .build(&TargetPath::new("genfiles/missing.txt"), &BuildContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::KakeError::UnknownTarget(_)));
    }
}
