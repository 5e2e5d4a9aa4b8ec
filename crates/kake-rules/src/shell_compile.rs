//! Shell-compile rule — runs an external compiler/toolchain command to
//! produce a generated output, via the executor's subprocess runner.

use kake_core::{BuildInvocation, Capability, Result};

/// `argv` is a template: the literal tokens `{output}`, `{input}` (the
/// first input), and `{inputs}` (every input, each as its own argv entry)
/// are substituted with project-root-relative-resolved paths before the
/// command runs.
pub struct ShellCompile {
    label: String,
    argv: Vec<String>,
    version: i64,
}

impl ShellCompile {
    pub fn new(label: impl Into<String>, argv: Vec<String>, version: i64) -> Self {
        Self {
            label: label.into(),
            argv,
            version,
        }
    }

    fn render(&self, invocation: &BuildInvocation<'_>) -> Vec<String> {
        let mut rendered = Vec::with_capacity(self.argv.len());
        for token in &self.argv {
            match token.as_str() {
                "{output}" => rendered.push(invocation.output_path().display().to_string()),
                "{input}" => {
                    if let Some(first) = invocation.inputs.first() {
                        rendered.push(invocation.input_path(first).display().to_string());
                    }
                }
                "{inputs}" => {
                    for input in invocation.inputs {
                        rendered.push(invocation.input_path(input).display().to_string());
                    }
                }
                other => rendered.push(other.to_string()),
            }
        }
        rendered
    }
}

#[async_trait::async_trait]
impl Capability for ShellCompile {
    fn version(&self) -> i64 {
        self.version
    }

    async fn build(&self, invocation: &BuildInvocation<'_>) -> Result<()> {
        if let Some(parent) = invocation.output_path().parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let argv = self.render(invocation);
        invocation
            .runner
            .call(&self.label, &invocation.output, &argv)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kake_core::{ContextView, FilesystemView, ProcessRunner, TargetPath};

    #[tokio::test]
    async fn renders_output_and_input_tokens() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.c"), "int main(){}").unwrap();
        let inputs = vec![TargetPath::new("a.c")];
        let runner = ProcessRunner::new(dir.path().to_path_buf());
        let context = ContextView::empty();
        let fsview = FilesystemView::new(dir.path().to_path_buf());
        let invocation = BuildInvocation {
            output: TargetPath::new("genfiles/a.out"),
            inputs: &inputs,
            changed_inputs: &inputs,
            context: &context,
            project_root: dir.path(),
            runner: &runner,
            fsview: &fsview,
        };

        let rule = ShellCompile::new("cc", vec!["cc".into(), "-o".into(), "{output}".into(), "{input}".into()], 1);
        let argv = rule.render(&invocation);
        assert_eq!(argv[0], "cc");
        assert_eq!(argv[1], "-o");
        assert!(argv[2].ends_with("genfiles/a.out"));
        assert!(argv[3].ends_with("a.c"));
    }
}
