use std::collections::BTreeMap;

use crate::value::Value;

/// The single mutable binding map shared by every chunk and inline
/// expression during one render pass, in source order.
///
/// Created fresh at the start of a render and discarded at the end;
/// nothing survives a render except through the cache. There is no
/// ambient state: every component that needs bindings receives the
/// context explicitly by reference.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    bindings: BTreeMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Clone the current bindings, taken before a chunk runs so its
    /// effect on the context can be diffed or undone.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.bindings.clone()
    }

    /// Bindings added or changed since the snapshot. Removals are not
    /// tracked; a cached chunk that deletes bindings is out of scope.
    pub fn delta_since(&self, snapshot: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
        self.bindings
            .iter()
            .filter(|(k, v)| snapshot.get(*k) != Some(v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Replay a stored delta into the live context, so chunks after a
    /// cache hit still see the cached chunk's bindings.
    pub fn apply_delta(&mut self, delta: &BTreeMap<String, Value>) {
        for (k, v) in delta {
            self.bindings.insert(k.clone(), v.clone());
        }
    }

    /// Restore the context to a snapshot (rollback after a failed chunk).
    pub fn restore(&mut self, snapshot: BTreeMap<String, Value>) {
        self.bindings = snapshot;
    }
}
