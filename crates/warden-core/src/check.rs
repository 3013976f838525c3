//! Check contract and registry
//!
//! A check is the executable half of a policy: given a target and resolved
//! parameters it inspects the remote environment, records tokens and returns
//! an [`Outcome`]. Checks are looked up by class name through an explicit
//! [`CheckRegistry`] handed to whoever needs it.

use crate::error::CheckError;
use crate::expression::{resolve_dependency, ExpressionEvaluator};
use crate::outcome::Outcome;
use crate::params::Parameters;
use crate::target::Target;
use crate::tokens::TokenBag;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use warden_remote::Drush;

/// Declared check parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name
    pub name: String,
    /// Human description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Default value, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParameterSpec {
    /// Create a parameter with no default
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            default: None,
        }
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// With default value
    #[inline]
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Static description of a check implementation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckMetadata {
    /// Class name policies refer to
    pub name: String,
    /// Human description
    pub description: String,
    /// Declared parameters
    pub parameters: Vec<ParameterSpec>,
    /// Whether the check can remediate failures
    pub remediable: bool,
    /// Whether the check is deprecated
    pub deprecated: bool,
}

impl CheckMetadata {
    /// Create metadata for class `name`
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            remediable: false,
            deprecated: false,
        }
    }

    /// With a declared parameter
    #[inline]
    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Mark remediable
    #[inline]
    #[must_use]
    pub fn remediable(mut self) -> Self {
        self.remediable = true;
        self
    }

    /// Mark deprecated
    #[inline]
    #[must_use]
    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    /// Find a declared parameter
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Executable check
#[async_trait::async_trait]
pub trait Check: Send + Sync {
    /// Static metadata
    fn metadata(&self) -> &CheckMetadata;

    /// Audit the target
    ///
    /// Returned errors become an `Error` outcome; they never abort the
    /// assessment.
    async fn audit(&self, ctx: &mut CheckContext<'_>) -> Result<Outcome, CheckError>;
}

/// Everything a check can see while auditing one target
pub struct CheckContext<'a> {
    target: &'a Target,
    parameters: &'a Parameters,
    assessment: &'a Value,
    evaluator: &'a dyn ExpressionEvaluator,
    tokens: TokenBag,
}

impl fmt::Debug for CheckContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckContext")
            .field("target", &self.target.uri())
            .field("parameters", &self.parameters)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl<'a> CheckContext<'a> {
    /// Create context for one policy evaluation
    #[must_use]
    pub fn new(
        target: &'a Target,
        parameters: &'a Parameters,
        assessment: &'a Value,
        evaluator: &'a dyn ExpressionEvaluator,
    ) -> Self {
        Self {
            target,
            parameters,
            assessment,
            evaluator,
            tokens: TokenBag::new(),
        }
    }

    /// Target under assessment
    #[inline]
    #[must_use]
    pub fn target(&self) -> &Target {
        self.target
    }

    /// Drush binding of the target
    #[inline]
    #[must_use]
    pub fn drush(&self) -> &Drush {
        self.target.drush()
    }

    /// Resolved parameter; null counts as absent
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name).filter(|v| !v.is_null())
    }

    /// Resolved parameter deserialized into `T`
    ///
    /// # Errors
    /// `CheckError::InvalidParameter` if the value has the wrong shape.
    pub fn parameter_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, CheckError> {
        self.parameter(name)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| CheckError::InvalidParameter {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// All resolved parameters
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        self.parameters
    }

    /// Record a token
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.tokens.set(name, value);
    }

    /// Tokens recorded so far
    #[inline]
    #[must_use]
    pub fn tokens(&self) -> &TokenBag {
        &self.tokens
    }

    /// Take the recorded tokens
    #[must_use]
    pub fn into_tokens(self) -> TokenBag {
        self.tokens
    }

    /// Context visible to expressions evaluated by the check
    ///
    /// The assessment context (`policies.*`) plus `parameters`, `tokens` and
    /// `target.uri`.
    #[must_use]
    pub fn expression_context(&self) -> Value {
        let mut map = match self.assessment {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        map.insert(
            "parameters".to_string(),
            Value::Object(
                self.parameters
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        );
        map.insert("tokens".to_string(), self.tokens.to_json());
        map.insert(
            "target".to_string(),
            serde_json::json!({ "uri": self.target.uri() }),
        );
        Value::Object(map)
    }

    /// Evaluate a dependency expression against [`Self::expression_context`]
    ///
    /// # Errors
    /// `CheckError::Configuration` if the expression is malformed.
    pub fn evaluate(&self, expression: &str) -> Result<bool, CheckError> {
        Ok(resolve_dependency(
            expression,
            &self.expression_context(),
            self.evaluator,
        )?)
    }
}

/// Registry of check implementations keyed by class name
#[derive(Clone, Default)]
pub struct CheckRegistry {
    checks: IndexMap<String, Arc<dyn Check>>,
}

impl fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckRegistry")
            .field("checks", &self.names())
            .finish()
    }
}

impl CheckRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with built-in checks
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::checks::register_builtins(&mut registry);
        registry
    }

    /// Register a check under its metadata name, replacing any previous one
    pub fn register(&mut self, check: Arc<dyn Check>) {
        let name = check.metadata().name.clone();
        tracing::debug!(check = %name, "registering check");
        self.checks.insert(name, check);
    }

    /// Look up a check
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Check>> {
        self.checks.get(name).cloned()
    }

    /// Look up check metadata
    #[inline]
    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<&CheckMetadata> {
        self.checks.get(name).map(|c| c.metadata())
    }

    /// Check if a class is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    /// Registered class names, in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.checks.keys().map(String::as_str).collect()
    }

    /// Number of registered checks
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop(CheckMetadata);

    #[async_trait::async_trait]
    impl Check for Noop {
        fn metadata(&self) -> &CheckMetadata {
            &self.0
        }

        async fn audit(&self, _ctx: &mut CheckContext<'_>) -> Result<Outcome, CheckError> {
            Ok(Outcome::Success)
        }
    }

    #[test]
    fn builtins_are_registered() {
        let registry = CheckRegistry::with_builtins();
        assert!(registry.contains("Drupal:ModuleKnownVersions"));
        assert!(registry.contains("Drupal:ConfigCheck"));
        assert!(registry.contains("Drupal:ModuleEnabled"));
        assert!(registry
            .metadata("Drupal:ModuleKnownVersions")
            .is_some_and(|m| m.deprecated));
    }

    #[test]
    fn registering_same_name_replaces() {
        let mut registry = CheckRegistry::new();
        registry.register(Arc::new(Noop(CheckMetadata::new("X", "first"))));
        registry.register(Arc::new(Noop(
            CheckMetadata::new("X", "second").remediable(),
        )));
        assert_eq!(registry.len(), 1);
        let meta = registry.metadata("X").unwrap();
        assert_eq!(meta.description, "second");
        assert!(meta.remediable);
    }

    #[test]
    fn metadata_finds_declared_parameter() {
        let meta = CheckMetadata::new("X", "")
            .with_parameter(ParameterSpec::new("module").with_description("Module name"));
        assert_eq!(meta.parameter("module").unwrap().description, "Module name");
        assert!(meta.parameter("missing").is_none());
    }
}
