//! Query parameters attached to every request issued from a handle.

use crate::error::Result;
use crate::protocol::constants::{params, FORMAT_EXPORT};
use serde::Serialize;
use std::collections::BTreeMap;

/// Query options of one handle.
///
/// Children receive a copy; nothing here is shared between handles.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams {
    values: BTreeMap<String, String>,
}

impl QueryParams {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// Set `key` when `enabled`, drop it otherwise.
    pub fn toggle(&mut self, key: &str, value: &str, enabled: bool) {
        if enabled {
            self.set(key, value);
        } else {
            self.remove(key);
        }
    }

    pub fn set_shallow(&mut self, shallow: bool) {
        self.toggle(params::SHALLOW, "true", shallow);
    }

    pub fn set_include_priority(&mut self, include: bool) {
        self.toggle(params::FORMAT, FORMAT_EXPORT, include);
    }

    /// Set a parameter whose value the server parses as JSON.
    pub fn set_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        self.set(key, encoded);
        Ok(())
    }

    /// URL-encoded query string with keys in sorted order.
    pub fn encode(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.values.iter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shallow_toggle() {
        let mut query = QueryParams::new();
        query.set_shallow(true);
        assert_eq!(query.encode(), "shallow=true");
        query.set_shallow(false);
        assert_eq!(query.encode(), "");
        assert!(query.is_empty());
    }

    #[test]
    fn test_include_priority_toggle() {
        let mut query = QueryParams::new();
        query.set_include_priority(true);
        assert_eq!(query.encode(), "format=export");
        query.set_include_priority(false);
        assert!(query.is_empty());
    }

    #[test]
    fn test_sorted_and_escaped() {
        let mut query = QueryParams::new();
        query.set_shallow(true);
        query.set(params::AUTH, "a b&c");
        query.set_json(params::ORDER_BY, "$key").unwrap();
        assert_eq!(
            query.encode(),
            "auth=a+b%26c&orderBy=%22%24key%22&shallow=true"
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let mut parent = QueryParams::new();
        parent.set_shallow(true);
        let mut child = parent.clone();
        child.set_shallow(false);
        child.set_include_priority(true);
        assert_eq!(parent.get(params::SHALLOW), Some("true"));
        assert_eq!(parent.get(params::FORMAT), None);
    }
}
