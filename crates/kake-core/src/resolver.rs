//! Dependency resolver: expands a requested target into a complete,
//! acyclic build plan (§4.4).

use crate::context::{BuildContext, ContextView};
use crate::error::{KakeError, Result};
use crate::fsview::FilesystemView;
use crate::path::TargetPath;
use crate::registry::{CompileRule, RuleRegistry};
use crate::rule::NodeView;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

#[derive(Clone, Debug)]
pub struct GeneratedNode {
    pub target: TargetPath,
    pub rule: Arc<CompileRule>,
    pub bindings: BTreeMap<String, String>,
    pub inputs: Vec<TargetPath>,
    pub context_view: ContextView,
    pub version_tag: i64,
}

#[derive(Debug)]
pub enum PlanNode {
    Source(TargetPath),
    Generated(GeneratedNode),
}

/// The DAG rooted at one requested target, plus a build order (children
/// before parents) an executor can walk directly.
#[derive(Debug)]
pub struct Plan {
    pub root: TargetPath,
    pub nodes: HashMap<TargetPath, PlanNode>,
    pub order: Vec<TargetPath>,
}

impl Plan {
    pub fn generated(&self, target: &TargetPath) -> Option<&GeneratedNode> {
        match self.nodes.get(target)? {
            PlanNode::Generated(n) => Some(n),
            PlanNode::Source(_) => None,
        }
    }
}

pub fn resolve(
    registry: &RuleRegistry,
    fsview: &FilesystemView,
    project_root: &Path,
    genfiles_prefix: &str,
    target: &TargetPath,
    context: &BuildContext,
    max_computed_input_iterations: usize,
) -> Result<Plan> {
    let mut nodes = HashMap::new();
    let mut order = Vec::new();
    let mut stack = Vec::new();
    resolve_one(
        registry,
        fsview,
        project_root,
        genfiles_prefix,
        target,
        context,
        max_computed_input_iterations,
        &mut stack,
        &mut nodes,
        &mut order,
    )?;
    Ok(Plan {
        root: target.clone(),
        nodes,
        order,
    })
}

#[allow(clippy::too_many_arguments)]
#[instrument(skip_all, fields(target = %target))]
fn resolve_one(
    registry: &RuleRegistry,
    fsview: &FilesystemView,
    project_root: &Path,
    genfiles_prefix: &str,
    target: &TargetPath,
    context: &BuildContext,
    max_computed_input_iterations: usize,
    stack: &mut Vec<TargetPath>,
    nodes: &mut HashMap<TargetPath, PlanNode>,
    order: &mut Vec<TargetPath>,
) -> Result<()> {
    if nodes.contains_key(target) {
        return Ok(());
    }
    if stack.contains(target) {
        let mut path: Vec<String> = stack.iter().map(ToString::to_string).collect();
        path.push(target.to_string());
        return Err(KakeError::CycleDetected {
            target: target.clone(),
            path: path.join(" -> "),
        });
    }

    if !target.is_generated(genfiles_prefix) {
        let stat = fsview.stat(target);
        if !stat.exists {
            return Err(KakeError::bad_request(format!(
                "source input does not exist: {target}"
            )));
        }
        nodes.insert(target.clone(), PlanNode::Source(target.clone()));
        order.push(target.clone());
        tracing::debug!("resolved as source leaf");
        return Ok(());
    }

    stack.push(target.clone());

    let (rule, bindings) = registry
        .find(target)
        .ok_or_else(|| KakeError::UnknownTarget(target.clone()))?;

    let mut inputs: Vec<TargetPath> = rule
        .static_input_patterns
        .iter()
        .flat_map(|spec| spec.expand(&bindings, project_root))
        .collect();

    let node_view = NodeView {
        target,
        bindings: &bindings,
        label: &rule.label,
    };
    let mut iterations = 0usize;
    loop {
        let extra = rule.capability.computed_inputs(&node_view, &inputs, context);
        let fresh: Vec<TargetPath> = extra.into_iter().filter(|e| !inputs.contains(e)).collect();
        if fresh.is_empty() {
            break;
        }
        inputs.extend(fresh);
        iterations += 1;
        if iterations > max_computed_input_iterations {
            return Err(KakeError::ComputedInputsDivergence {
                target: target.clone(),
                iterations,
            });
        }
    }

    for input in &inputs {
        resolve_one(
            registry,
            fsview,
            project_root,
            genfiles_prefix,
            input,
            context,
            max_computed_input_iterations,
            stack,
            nodes,
            order,
        )?;
    }

    stack.pop();

    let used_keys = rule.capability.used_context_keys();
    let context_view = context.restrict(&used_keys);
    let version_tag = rule.capability.version();
    let rule_label = rule.label.clone();
    let input_count = inputs.len();

    nodes.insert(
        target.clone(),
        PlanNode::Generated(GeneratedNode {
            target: target.clone(),
            rule,
            bindings,
            inputs,
            context_view,
            version_tag,
        }),
    );
    order.push(target.clone());
    tracing::debug!(rule = %rule_label, inputs = input_count, "resolved generated node");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as KakeResult;
    use crate::rule::{BuildInvocation, Capability};

    struct Concat;
    #[async_trait::async_trait]
    impl Capability for Concat {
        fn version(&self) -> i64 {
            1
        }
        async fn build(&self, _invocation: &BuildInvocation<'_>) -> KakeResult<()> {
            Ok(())
        }
    }

    #[test]
    fn resolves_source_leaf_and_generated_node() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        let fsview = FilesystemView::new(dir.path().to_path_buf());

        let mut registry = RuleRegistry::new();
        registry
            .register("concat", "genfiles/out.txt", &["a.txt"], Arc::new(Concat))
            .unwrap();

        let plan = resolve(
            &registry,
            &fsview,
            dir.path(),
            "genfiles",
            &TargetPath::new("genfiles/out.txt"),
            &BuildContext::new(),
            32,
        )
        .unwrap();

        assert_eq!(plan.order.last().unwrap().as_str(), "genfiles/out.txt");
        assert!(plan.order.iter().any(|t| t.as_str() == "a.txt"));
        let gen = plan.generated(&TargetPath::new("genfiles/out.txt")).unwrap();
        assert_eq!(gen.inputs, vec![TargetPath::new("a.txt")]);
    }

    #[test]
    fn missing_source_input_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let fsview = FilesystemView::new(dir.path().to_path_buf());
        let mut registry = RuleRegistry::new();
        registry
            .register("concat", "genfiles/out.txt", &["missing.txt"], Arc::new(Concat))
            .unwrap();

        let err = resolve(
            &registry,
            &fsview,
            dir.path(),
            "genfiles",
            &TargetPath::new("genfiles/out.txt"),
            &BuildContext::new(),
            32,
        )
        .unwrap_err();
        assert!(matches!(err, KakeError::BadRequest(_)));
    }

    #[test]
    fn unregistered_target_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let fsview = FilesystemView::new(dir.path().to_path_buf());
        let registry = RuleRegistry::new();
        let err = resolve(
            &registry,
            &fsview,
            dir.path(),
            "genfiles",
            &TargetPath::new("genfiles/out.txt"),
            &BuildContext::new(),
            32,
        )
        .unwrap_err();
        assert!(matches!(err, KakeError::UnknownTarget(_)));
    }

    #[test]
    fn direct_cycle_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let fsview = FilesystemView::new(dir.path().to_path_buf());
        let mut registry = RuleRegistry::new();
        registry
            .register("a", "genfiles/a.out", &["genfiles/b.out"], Arc::new(Concat))
            .unwrap();
        registry
            .register("b", "genfiles/b.out", &["genfiles/a.out"], Arc::new(Concat))
            .unwrap();

        let err = resolve(
            &registry,
            &fsview,
            dir.path(),
            "genfiles",
            &TargetPath::new("genfiles/a.out"),
            &BuildContext::new(),
            32,
        )
        .unwrap_err();
        assert!(matches!(err, KakeError::CycleDetected { .. }));
    }
}
