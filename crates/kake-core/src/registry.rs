//! The rule registry: an append-only store of compile rules, resolved by
//! exact-literal-then-fewest-wildcards matching (§4.3).

use crate::error::{KakeError, Result};
use crate::path::TargetPath;
use crate::pattern::{InputSpec, OutputPattern};
use crate::rule::Capability;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;

pub struct CompileRule {
    pub label: String,
    pub output_pattern: OutputPattern,
    pub static_input_patterns: Vec<InputSpec>,
    pub capability: Arc<dyn Capability>,
}

impl std::fmt::Debug for CompileRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileRule")
            .field("label", &self.label)
            .field("output_pattern", &self.output_pattern)
            .field("static_input_patterns", &self.static_input_patterns)
            .finish_non_exhaustive()
    }
}

/// Append-only; safe for concurrent reads once registration (host-startup)
/// has finished. Registration itself takes `&mut self` — it is not meant to
/// run concurrently with builds.
pub struct RuleRegistry {
    literals: HashMap<String, Arc<CompileRule>>,
    patterns: Vec<Arc<CompileRule>>,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self {
            literals: HashMap::new(),
            patterns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.literals.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn labels(&self) -> Vec<&str> {
        self.literals
            .values()
            .chain(self.patterns.iter())
            .map(|r| r.label.as_str())
            .collect()
    }

    pub fn register(
        &mut self,
        label: impl Into<String>,
        output_pattern: impl Into<String>,
        input_patterns: &[&str],
        capability: Arc<dyn Capability>,
    ) -> Result<()> {
        let label = label.into();
        let pattern = OutputPattern::parse(output_pattern.into());
        let static_input_patterns = input_patterns.iter().map(|s| InputSpec::parse(s)).collect();

        if pattern.is_literal() {
            let key = pattern.as_str().to_string();
            if let Some(existing) = self.literals.get(&key) {
                return Err(KakeError::AmbiguousRule {
                    output: key,
                    label: existing.label.clone(),
                });
            }
            if let Some(colliding) = self
                .patterns
                .iter()
                .find(|r| r.output_pattern.match_target(&TargetPath::new(&key)).is_some())
            {
                return Err(KakeError::AmbiguousRule {
                    output: key,
                    label: colliding.label.clone(),
                });
            }
            self.literals.insert(
                key,
                Arc::new(CompileRule {
                    label,
                    output_pattern: pattern,
                    static_input_patterns,
                    capability,
                }),
            );
        } else {
            if let Some(colliding) = self
                .literals
                .keys()
                .find(|lit| pattern.match_target(&TargetPath::new((*lit).clone())).is_some())
            {
                return Err(KakeError::AmbiguousRule {
                    output: colliding.clone(),
                    label: label.clone(),
                });
            }
            self.patterns.push(Arc::new(CompileRule {
                label,
                output_pattern: pattern,
                static_input_patterns,
                capability,
            }));
        }
        Ok(())
    }

    /// Resolve a target to its rule and variable bindings. Exact literal
    /// output wins over any pattern; among patterns, fewest wildcard
    /// segments wins; ties break by earliest registration order (warned).
    pub fn find(&self, target: &TargetPath) -> Option<(Arc<CompileRule>, BTreeMap<String, String>)> {
        if let Some(rule) = self.literals.get(target.as_str()) {
            return Some((rule.clone(), BTreeMap::new()));
        }

        let mut candidates: Vec<(usize, usize, BTreeMap<String, String>)> = Vec::new();
        for (idx, rule) in self.patterns.iter().enumerate() {
            if let Some(bindings) = rule.output_pattern.match_target(target) {
                candidates.push((idx, rule.output_pattern.wildcard_count(), bindings));
            }
        }

        candidates.sort_by_key(|(idx, wildcards, _)| (*wildcards, *idx));
        let best = candidates.first()?;
        if candidates.len() > 1 && candidates[1].1 == best.1 {
            warn!(
                target = %target,
                "multiple rules match with equal specificity; picking earliest-registered"
            );
        }
        let (idx, _, bindings) = candidates.into_iter().next().unwrap();
        Some((self.patterns[idx].clone(), bindings))
    }
}
