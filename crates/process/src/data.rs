use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

/// A named bag of measurement data shared between processes and the
/// decision callables of switch/sweep composites.
///
/// This is the execution core's view of the external data container: an
/// opaque key → JSON-value store. The scheduler never interprets its
/// contents; processes read and write it, and switchers/sweepers receive it
/// read-only. Cloning is cheap — clones share the same store.
#[derive(Clone, Debug, Default)]
pub struct DataGroup {
    name: String,
    values: Arc<RwLock<Map<String, Value>>>,
}

impl DataGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Arc::new(RwLock::new(Map::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().unwrap().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.write().unwrap().insert(key.into(), value);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().unwrap().remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().unwrap().is_empty()
    }

    /// Full contents as a JSON object, for logging/diagnostics.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.values.read().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn clones_share_storage() {
        let group = DataGroup::new("run-42");
        let alias = group.clone();
        group.set("voltage", json!(1.25));
        assert_eq!(alias.get("voltage"), Some(json!(1.25)));
        assert_eq!(alias.name(), "run-42");
    }

    #[test]
    fn snapshot_is_plain_object() {
        let group = DataGroup::new("snap");
        group.set("points", json!([1, 2, 3]));
        let snap = group.snapshot();
        assert_eq!(snap["points"], json!([1, 2, 3]));
    }
}
