//! Local copy of a watched location, kept current by applying stream events.

use crate::types::{Event, EventKind};
use serde_json::{Map, Value};

/// A JSON tree mirroring the remote value at a watched location.
///
/// `null` written at a path deletes it, and objects left empty by a deletion
/// disappear, matching how the database stores data.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mirror {
    root: Value,
}

impl Mirror {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &Value {
        &self.root
    }

    pub fn apply(&mut self, event: &Event) {
        match event.kind {
            EventKind::Put => self.put(&event.path, event.data.clone()),
            EventKind::Patch => self.patch(&event.path, &event.data),
        }
    }

    /// Replace the value at `path`.
    pub fn put(&mut self, path: &str, data: Value) {
        let segments = segments(path);
        if data.is_null() {
            remove_at(&mut self.root, &segments);
        } else {
            set_at(&mut self.root, &segments, data);
        }
    }

    /// Write each child of `data` under `path`, leaving other children alone.
    pub fn patch(&mut self, path: &str, data: &Value) {
        let Some(children) = data.as_object() else {
            self.put(path, data.clone());
            return;
        };
        let base = path.trim_end_matches('/');
        for (key, value) in children {
            self.put(&format!("{}/{}", base, key), value.clone());
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn set_at(node: &mut Value, segments: &[&str], data: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = data;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.to_string()).or_insert(Value::Null);
        set_at(child, rest, data);
    }
}

/// Returns true when `node` became empty and should be pruned by its parent.
fn remove_at(node: &mut Value, segments: &[&str]) -> bool {
    let Some((head, rest)) = segments.split_first() else {
        *node = Value::Null;
        return true;
    };
    let Value::Object(map) = node else {
        return false;
    };
    let prune = match map.get_mut(*head) {
        Some(child) => remove_at(child, rest),
        None => false,
    };
    if prune {
        map.remove(*head);
    }
    if map.is_empty() {
        *node = Value::Null;
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_root_replaces_everything() {
        let mut mirror = Mirror::new();
        mirror.put("/", json!({"a": 1}));
        mirror.put("/", json!({"b": 2}));
        assert_eq!(mirror.value(), &json!({"b": 2}));
    }

    #[test]
    fn test_put_nested_creates_parents() {
        let mut mirror = Mirror::new();
        mirror.put("/users/alice/age", json!(30));
        assert_eq!(mirror.value(), &json!({"users": {"alice": {"age": 30}}}));
    }

    #[test]
    fn test_put_null_deletes_and_prunes() {
        let mut mirror = Mirror::new();
        mirror.put("/", json!({"users": {"alice": {"age": 30}}, "count": 1}));
        mirror.put("/users/alice/age", Value::Null);
        assert_eq!(mirror.value(), &json!({"count": 1}));
    }

    #[test]
    fn test_patch_merges_children() {
        let mut mirror = Mirror::new();
        mirror.put("/", json!({"a": 1, "b": {"c": 2, "d": 3}}));
        mirror.patch("/b", &json!({"c": 20, "e": 5}));
        assert_eq!(mirror.value(), &json!({"a": 1, "b": {"c": 20, "d": 3, "e": 5}}));
    }

    #[test]
    fn test_patch_null_child_removes_it() {
        let mut mirror = Mirror::new();
        mirror.put("/", json!({"a": 1, "b": 2}));
        mirror.patch("/", &json!({"a": null}));
        assert_eq!(mirror.value(), &json!({"b": 2}));
    }

    #[test]
    fn test_apply_event() {
        let mut mirror = Mirror::new();
        let event = Event::put(crate::types::Change {
            path: "/".into(),
            data: json!({"foo": "bar"}),
        });
        mirror.apply(&event);
        assert_eq!(mirror.value(), &json!({"foo": "bar"}));
    }
}
