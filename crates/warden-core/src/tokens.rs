//! Token bag
//!
//! Ordered key/value store that checks write their findings into. Tokens
//! end up in the audit response and in the dependency-expression context of
//! later policies.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lookup of a token that does not exist
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct TokenNotFound {
    /// Requested name
    pub name: String,
    /// Close matches among existing keys
    pub alternatives: Vec<String>,
    /// Existing parent key holding a structure, for dotted names
    pub parent: Option<String>,
}

impl fmt::Display for TokenNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token `{}` not found", self.name)?;
        if !self.alternatives.is_empty() {
            write!(f, "; did you mean: {}?", self.alternatives.join(", "))?;
        } else if let Some(parent) = &self.parent {
            write!(f, "; `{parent}` exists and holds nested data")?;
        }
        Ok(())
    }
}

/// Ordered token map produced by a check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenBag {
    data: IndexMap<String, Value>,
}

impl TokenBag {
    /// Create empty bag
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a token, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(name.into(), value.into());
    }

    /// Set many tokens
    pub fn extend<K, V>(&mut self, entries: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        for (k, v) in entries {
            self.set(k, v);
        }
    }

    /// Check if a token exists
    #[inline]
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    /// Remove a token
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.data.shift_remove(name)
    }

    /// Get a token
    ///
    /// # Errors
    /// `TokenNotFound` with close-match suggestions when the key is absent.
    pub fn get(&self, name: &str) -> Result<&Value, TokenNotFound> {
        self.data.get(name).ok_or_else(|| self.not_found(name))
    }

    /// Number of tokens
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate tokens in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Borrow the underlying map
    #[inline]
    #[must_use]
    pub fn all(&self) -> &IndexMap<String, Value> {
        &self.data
    }

    /// Convert into a JSON object
    #[must_use]
    pub fn to_json(&self) -> Value {
        Value::Object(self.data.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn not_found(&self, name: &str) -> TokenNotFound {
        let mut err = TokenNotFound {
            name: name.to_string(),
            alternatives: Vec::new(),
            parent: None,
        };
        if name.is_empty() {
            return err;
        }

        let len = name.chars().count();
        err.alternatives = self
            .data
            .keys()
            .filter(|key| strsim::levenshtein(name, key) * 3 <= len || key.contains(name))
            .cloned()
            .collect();

        if err.alternatives.is_empty() && name.contains('.') {
            let mut prefix = name;
            while let Some((parent, _)) = prefix.rsplit_once('.') {
                if let Some(value) = self.data.get(parent) {
                    if value.is_object() || value.is_array() {
                        err.parent = Some(parent.to_string());
                    }
                    break;
                }
                prefix = parent;
            }
        }
        err
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for TokenBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        bag.extend(iter);
        bag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn preserves_insertion_order() {
        let mut bag = TokenBag::new();
        bag.set("zeta", 1);
        bag.set("alpha", 2);
        let keys: Vec<_> = bag.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn missing_token_suggests_close_matches() {
        let bag: TokenBag = [("results", json!([])), ("reading", json!(1))]
            .into_iter()
            .collect();
        let err = bag.get("result").unwrap_err();
        assert_eq!(err.alternatives, vec!["results"]);
        assert!(err.to_string().contains("did you mean: results?"));
    }

    #[test]
    fn substring_keys_are_alternatives() {
        let bag: TokenBag = [("module_versions", json!({}))].into_iter().collect();
        let err = bag.get("versions").unwrap_err();
        assert_eq!(err.alternatives, vec!["module_versions"]);
    }

    #[test]
    fn dotted_name_points_at_structured_parent() {
        let bag: TokenBag = [("status", json!({"php": "8.2"}))].into_iter().collect();
        let err = bag.get("status.bootstrap.database").unwrap_err();
        assert!(err.alternatives.is_empty());
        assert_eq!(err.parent.as_deref(), Some("status"));
    }

    #[test]
    fn scalar_parent_is_not_suggested() {
        let bag: TokenBag = [("status", json!("ok"))].into_iter().collect();
        let err = bag.get("status.bootstrap").unwrap_err();
        assert_eq!(err.parent, None);
    }

    #[test]
    fn empty_name_has_no_suggestions() {
        let bag: TokenBag = [("a", json!(1))].into_iter().collect();
        let err = bag.get("").unwrap_err();
        assert!(err.alternatives.is_empty());
    }

    #[test]
    fn serializes_as_plain_object() {
        let bag: TokenBag = [("exception", json!("boom"))].into_iter().collect();
        assert_eq!(serde_json::to_value(&bag).unwrap(), json!({"exception": "boom"}));
    }
}
