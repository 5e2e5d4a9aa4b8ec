//! Build context: the key-value map a caller supplies to `build()`, and the
//! restricted view a rule's `used_context_keys()` carries into staleness.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Caller-supplied context for one build request. Cheap to construct and
/// clone; mirrors the way the teacher wraps a loose string map (`SessionKey`)
/// rather than threading a bare `HashMap<String, String>` through the API.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildContext(HashMap<String, String>);

impl BuildContext {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Restrict to the subset of keys a rule declared it reads, producing
    /// the deterministic view used in the staleness digest.
    pub fn restrict(&self, keys: &BTreeSet<String>) -> ContextView {
        let view: BTreeMap<String, String> = keys
            .iter()
            .filter_map(|k| self.0.get(k).map(|v| (k.clone(), v.clone())))
            .collect();
        ContextView(view)
    }
}

impl From<HashMap<String, String>> for BuildContext {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

/// The subset of a `BuildContext` a single node's rule actually reads.
/// Ordered (`BTreeMap`) so its digest is stable across runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextView(BTreeMap<String, String>);

impl ContextView {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Stable digest used in the sidecar; any change to a used key's value
    /// changes this, forcing staleness regardless of mtimes.
    pub fn digest(&self) -> String {
        let mut buf = String::new();
        for (k, v) in &self.0 {
            buf.push_str(k);
            buf.push('=');
            buf.push_str(v);
            buf.push('\n');
        }
        blake3::hash(buf.as_bytes()).to_hex().to_string()
    }
}
