//! Per-call metadata: a small string-to-string map.
//!
//! Keys are case-insensitive and stored lowercased.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constants::{AUTHORIZATION_KEY, BEARER_SCHEME};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata carrying `authorization: Bearer <token>`.
    pub fn with_bearer(token: &str) -> Self {
        let mut md = Self::new();
        md.insert(AUTHORIZATION_KEY, format!("{BEARER_SCHEME} {token}"));
        md
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    /// Iterates over the keys only (values may hold credentials).
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive() {
        let mut md = Metadata::new();
        md.insert("Authorization", "Bearer x");
        assert_eq!(md.get("authorization"), Some("Bearer x"));
        assert_eq!(md.get("AUTHORIZATION"), Some("Bearer x"));
    }

    #[test]
    fn with_bearer_format() {
        let md = Metadata::with_bearer("test-token");
        assert_eq!(md.get(AUTHORIZATION_KEY), Some("Bearer test-token"));
    }

    #[test]
    fn serializes_as_plain_map() {
        let md = Metadata::with_bearer("t");
        let json = serde_json::to_string(&md).unwrap();
        assert_eq!(json, r#"{"authorization":"Bearer t"}"#);
    }
}
