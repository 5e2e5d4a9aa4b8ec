//! The pattern language used for rule output patterns and input specifiers:
//! `{name}` binds one path segment, `**` matches any number of segments
//! greedily, and `{{glob:pattern}}` (input specifiers only) expands to a
//! sorted list of shell-glob matches under the source tree.

use crate::path::TargetPath;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Seg {
    Literal(String),
    Var(String),
    DoubleStar,
}

fn parse_segments(raw: &str) -> Vec<Seg> {
    raw.split('/')
        .filter(|s| !s.is_empty())
        .map(|seg| {
            if seg == "**" {
                Seg::DoubleStar
            } else if let Some(name) = seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Seg::Var(name.to_string())
            } else {
                Seg::Literal(seg.to_string())
            }
        })
        .collect()
}

/// A rule's output pattern: a literal generated path, or one containing
/// `{name}`/`**` variable segments.
#[derive(Clone, Debug)]
pub struct OutputPattern {
    raw: String,
    segs: Vec<Seg>,
}

impl OutputPattern {
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segs = parse_segments(&raw);
        Self { raw, segs }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_literal(&self) -> bool {
        self.segs.iter().all(|s| matches!(s, Seg::Literal(_)))
    }

    /// Number of non-literal segments — the registry's tie-breaker prefers
    /// the pattern with fewer of these.
    pub fn wildcard_count(&self) -> usize {
        self.segs
            .iter()
            .filter(|s| !matches!(s, Seg::Literal(_)))
            .count()
    }

    /// Attempt to match a concrete target against this pattern, returning
    /// the variable bindings on success. Supports at most one `**` segment.
    pub fn match_target(&self, target: &TargetPath) -> Option<BTreeMap<String, String>> {
        let target_segs = target.segments();
        let star_pos = self.segs.iter().position(|s| matches!(s, Seg::DoubleStar));

        match star_pos {
            None => {
                if target_segs.len() != self.segs.len() {
                    return None;
                }
                let mut bindings = BTreeMap::new();
                for (pat_seg, tgt_seg) in self.segs.iter().zip(target_segs.iter()) {
                    match pat_seg {
                        Seg::Literal(l) => {
                            if l != tgt_seg {
                                return None;
                            }
                        }
                        Seg::Var(name) => {
                            bindings.insert(name.clone(), tgt_seg.to_string());
                        }
                        Seg::DoubleStar => unreachable!(),
                    }
                }
                Some(bindings)
            }
            Some(pos) => {
                let prefix = &self.segs[..pos];
                let suffix = &self.segs[pos + 1..];
                if target_segs.len() < prefix.len() + suffix.len() {
                    return None;
                }
                let mut bindings = BTreeMap::new();
                for (pat_seg, tgt_seg) in prefix.iter().zip(target_segs.iter()) {
                    match pat_seg {
                        Seg::Literal(l) => {
                            if l != tgt_seg {
                                return None;
                            }
                        }
                        Seg::Var(name) => {
                            bindings.insert(name.clone(), tgt_seg.to_string());
                        }
                        Seg::DoubleStar => unreachable!(),
                    }
                }
                let suffix_start = target_segs.len() - suffix.len();
                for (pat_seg, tgt_seg) in suffix.iter().zip(target_segs[suffix_start..].iter()) {
                    match pat_seg {
                        Seg::Literal(l) => {
                            if l != tgt_seg {
                                return None;
                            }
                        }
                        Seg::Var(name) => {
                            bindings.insert(name.clone(), tgt_seg.to_string());
                        }
                        Seg::DoubleStar => unreachable!(),
                    }
                }
                Some(bindings)
            }
        }
    }
}

/// One entry in a rule's `static_input_patterns` list.
#[derive(Clone, Debug)]
pub enum InputSpec {
    /// A concrete, source-tree-relative path with no variables.
    Literal(String),
    /// A path containing `{name}` segments, substituted from the match
    /// bindings into exactly one input.
    Pattern(String),
    /// `{{glob:pattern}}` — expands (after variable substitution) to every
    /// matching file under the project root, sorted.
    Glob(String),
}

impl InputSpec {
    pub fn parse(raw: &str) -> Self {
        if let Some(inner) = raw.strip_prefix("{{glob:").and_then(|s| s.strip_suffix("}}")) {
            InputSpec::Glob(inner.to_string())
        } else if raw.contains('{') {
            InputSpec::Pattern(raw.to_string())
        } else {
            InputSpec::Literal(raw.to_string())
        }
    }

    /// Expand this specifier into zero or more concrete target paths.
    pub fn expand(
        &self,
        bindings: &BTreeMap<String, String>,
        project_root: &Path,
    ) -> Vec<TargetPath> {
        match self {
            InputSpec::Literal(s) => vec![TargetPath::new(s)],
            InputSpec::Pattern(s) => vec![TargetPath::new(s).substitute(bindings)],
            InputSpec::Glob(s) => {
                let substituted = TargetPath::new(s).substitute(bindings);
                expand_glob(substituted.as_str(), project_root)
            }
        }
    }
}

fn expand_glob(pattern: &str, project_root: &Path) -> Vec<TargetPath> {
    let Ok(matcher) = globset::GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
    else {
        return Vec::new();
    };

    let mut matches: Vec<TargetPath> = walkdir::WalkDir::new(project_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let rel = e.path().strip_prefix(project_root).ok()?;
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            matcher.is_match(&rel_str).then(|| TargetPath::new(rel_str))
        })
        .collect();
    matches.sort();
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_pattern_matches_exact_path_only() {
        let p = OutputPattern::parse("genfiles/out.txt");
        assert!(p.is_literal());
        assert!(p.match_target(&TargetPath::new("genfiles/out.txt")).is_some());
        assert!(p.match_target(&TargetPath::new("genfiles/other.txt")).is_none());
    }

    #[test]
    fn variable_segment_binds_name() {
        let p = OutputPattern::parse("genfiles/i18n/{lang}/strings.json");
        let bindings = p
            .match_target(&TargetPath::new("genfiles/i18n/fr/strings.json"))
            .unwrap();
        assert_eq!(bindings.get("lang").map(String::as_str), Some("fr"));
    }

    #[test]
    fn double_star_matches_any_segment_count() {
        let p = OutputPattern::parse("genfiles/**/bundle.js");
        assert!(p
            .match_target(&TargetPath::new("genfiles/a/b/c/bundle.js"))
            .is_some());
        assert!(p.match_target(&TargetPath::new("genfiles/bundle.js")).is_some());
        assert!(p.match_target(&TargetPath::new("src/a/bundle.js")).is_none());
    }

    #[test]
    fn wildcard_count_orders_specificity() {
        let exact = OutputPattern::parse("genfiles/out.txt");
        let one_var = OutputPattern::parse("genfiles/{name}.txt");
        let double_star = OutputPattern::parse("genfiles/**/out.txt");
        assert_eq!(exact.wildcard_count(), 0);
        assert_eq!(one_var.wildcard_count(), 1);
        assert_eq!(double_star.wildcard_count(), 1);
    }

    #[test]
    fn input_spec_parses_all_three_forms() {
        assert!(matches!(InputSpec::parse("a.txt"), InputSpec::Literal(_)));
        assert!(matches!(InputSpec::parse("{lang}/a.txt"), InputSpec::Pattern(_)));
        assert!(matches!(
            InputSpec::parse("{{glob:parts/*.txt}}"),
            InputSpec::Glob(_)
        ));
    }

    #[test]
    fn glob_expands_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("parts")).unwrap();
        std::fs::write(dir.path().join("parts/b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("parts/a.txt"), "a").unwrap();

        let spec = InputSpec::parse("{{glob:parts/*.txt}}");
        let expanded = spec.expand(&BTreeMap::new(), dir.path());
        let names: Vec<&str> = expanded.iter().map(TargetPath::as_str).collect();
        assert_eq!(names, vec!["parts/a.txt", "parts/b.txt"]);
    }
}
