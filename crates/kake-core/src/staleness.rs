//! Staleness analysis (§4.5): decides whether a resolved node needs
//! rebuilding, and the `.__meta__` sidecar that records the rule version
//! and context digest used at the last successful build.

use crate::fsview::FilesystemView;
use crate::path::TargetPath;
use crate::resolver::GeneratedNode;
use std::path::{Path, PathBuf};
use tracing::{instrument, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sidecar {
    pub version_tag: i64,
    pub context_digest: String,
}

pub fn sidecar_path(output_abs: &Path) -> PathBuf {
    let mut name = output_abs.as_os_str().to_owned();
    name.push(".__meta__");
    PathBuf::from(name)
}

pub fn read_sidecar(output_abs: &Path) -> Option<Sidecar> {
    let text = std::fs::read_to_string(sidecar_path(output_abs)).ok()?;
    let mut version_tag = None;
    let mut context_digest = None;
    for line in text.lines() {
        let (key, value) = line.split_once('=')?;
        match key {
            "version" => version_tag = value.parse::<i64>().ok(),
            "digest" => context_digest = Some(value.to_string()),
            _ => {}
        }
    }
    Some(Sidecar {
        version_tag: version_tag?,
        context_digest: context_digest?,
    })
}

pub fn write_sidecar(output_abs: &Path, sidecar: &Sidecar) -> std::io::Result<()> {
    let body = format!("version={}\ndigest={}\n", sidecar.version_tag, sidecar.context_digest);
    std::fs::write(sidecar_path(output_abs), body)
}

/// Evaluate staleness for a node whose inputs have already been built (and
/// whose freshness therefore already reflects any rebuild of its own).
#[instrument(skip_all, fields(target = %node.target))]
pub fn is_stale(
    node: &GeneratedNode,
    non_input_deps: &[TargetPath],
    fsview: &FilesystemView,
    project_root: &Path,
) -> bool {
    let output_abs = node.target.to_absolute(project_root);
    let out_stat = fsview.stat(&node.target);
    if !out_stat.exists {
        trace!("stale: output missing");
        return true;
    }
    let out_mtime = match out_stat.mtime {
        Some(m) => m,
        None => {
            trace!("stale: output has no mtime");
            return true;
        }
    };

    for input in node.inputs.iter().chain(non_input_deps.iter()) {
        let in_stat = fsview.stat(input);
        match in_stat.mtime {
            Some(in_mtime) if in_mtime <= out_mtime => {}
            _ => {
                trace!(input = %input, "stale: input newer than (or missing mtime vs.) output");
                return true;
            }
        }
    }

    match read_sidecar(&output_abs) {
        Some(sidecar) => {
            let stale = sidecar.version_tag != node.version_tag
                || sidecar.context_digest != node.context_view.digest();
            trace!(stale, "sidecar comparison");
            stale
        }
        None => {
            trace!("stale: no sidecar recorded");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::TargetPath;
    use crate::registry::RuleRegistry;
    use crate::rule::{BuildInvocation, Capability};
    use std::sync::Arc;
    use std::thread::sleep;
    use std::time::Duration;

    struct Fixed(i64);
    #[async_trait::async_trait]
    impl Capability for Fixed {
        fn version(&self) -> i64 {
            self.0
        }
        async fn build(&self, _invocation: &BuildInvocation<'_>) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn make_node(rule_version: i64, dir: &Path) -> GeneratedNode {
        let mut registry = RuleRegistry::new();
        registry
            .register("r", "genfiles/out.txt", &["a.txt"], Arc::new(Fixed(rule_version)) as Arc<dyn Capability>)
            .unwrap();
        let (rule, bindings) = registry.find(&TargetPath::new("genfiles/out.txt")).unwrap();
        let _ = dir;
        GeneratedNode {
            target: TargetPath::new("genfiles/out.txt"),
            rule: rule.clone(),
            bindings,
            inputs: vec![TargetPath::new("a.txt")],
            context_view: crate::context::BuildContext::new().restrict(&Default::default()),
            version_tag: rule.capability.version(),
        }
    }

    fn touch(path: &Path, contents: &str) {
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn missing_output_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), "x");
        let fsview = FilesystemView::new(dir.path().to_path_buf());
        let node = make_node(1, dir.path());
        assert!(is_stale(&node, &[], &fsview, dir.path()));
    }

    #[test]
    fn fresh_output_with_matching_sidecar_is_not_stale() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), "x");
        sleep(Duration::from_millis(10));
        touch(&dir.path().join("out.txt"), "X");
        let node = make_node(1, dir.path());
        write_sidecar(&dir.path().join("out.txt"), &Sidecar {
            version_tag: node.version_tag,
            context_digest: node.context_view.digest(),
        })
        .unwrap();

        let fsview = FilesystemView::new(dir.path().to_path_buf());
        let mut node2 = make_node(1, dir.path());
        node2.target = TargetPath::new("out.txt");
        assert!(!is_stale(&node2, &[], &fsview, dir.path()));
    }

    #[test]
    fn newer_input_than_output_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("out.txt"), "X");
        write_sidecar(&dir.path().join("out.txt"), &Sidecar { version_tag: 1, context_digest: String::new() }).unwrap();
        sleep(Duration::from_millis(10));
        touch(&dir.path().join("a.txt"), "newer");

        let fsview = FilesystemView::new(dir.path().to_path_buf());
        let mut node = make_node(1, dir.path());
        node.target = TargetPath::new("out.txt");
        assert!(is_stale(&node, &[], &fsview, dir.path()));
    }

    #[test]
    fn version_bump_forces_staleness() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), "x");
        sleep(Duration::from_millis(10));
        touch(&dir.path().join("out.txt"), "X");
        write_sidecar(&dir.path().join("out.txt"), &Sidecar { version_tag: 1, context_digest: String::new() }).unwrap();

        let fsview = FilesystemView::new(dir.path().to_path_buf());
        let mut node = make_node(2, dir.path());
        node.target = TargetPath::new("out.txt");
        assert!(is_stale(&node, &[], &fsview, dir.path()));
    }

    #[test]
    fn missing_sidecar_forces_staleness() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("a.txt"), "x");
        sleep(Duration::from_millis(10));
        touch(&dir.path().join("out.txt"), "X");

        let fsview = FilesystemView::new(dir.path().to_path_buf());
        let mut node = make_node(1, dir.path());
        node.target = TargetPath::new("out.txt");
        assert!(is_stale(&node, &[], &fsview, dir.path()));
    }
}
