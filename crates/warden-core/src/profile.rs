//! Profiles
//!
//! A profile is a named, ordered selection of policies with optional
//! per-policy overrides, loaded from YAML:
//!
//! ```yaml
//! name: site_audit
//! title: Site audit
//! policies:
//!   Drupal:ViewsEnabled:
//!     severity: high
//!   Drupal:SystemSiteName:
//!     parameters:
//!       value: Example
//! excluded_policies: []
//! ```

use crate::check::CheckRegistry;
use crate::error::ConfigurationError;
use crate::params::Parameters;
use crate::policy::{Policy, PolicyLibrary};
use crate::severity::Severity;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Per-policy overrides inside a profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePolicy {
    /// Parameter values replacing the policy defaults
    pub parameters: Parameters,
    /// Severity replacing the policy severity
    pub severity: Option<Severity>,
}

/// Named policy collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub title: String,
    pub description: String,
    pub policies: IndexMap<String, ProfilePolicy>,
    pub excluded_policies: Vec<String>,
}

/// Command-line adjustments to a profile's policy list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSelection {
    /// Policies added after the profile's own
    pub include: Vec<String>,
    /// Policies removed from the result
    pub exclude: Vec<String>,
}

impl Profile {
    /// Parse from YAML
    ///
    /// # Errors
    /// `ConfigurationError::Yaml` on malformed input.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Read and parse a YAML file
    ///
    /// # Errors
    /// I/O or YAML errors.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&source)
    }

    /// With title override
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Ordered policy names after applying `selection`
    #[must_use]
    pub fn policy_names(&self, selection: &ProfileSelection) -> Vec<String> {
        let mut names: Vec<String> = self.policies.keys().cloned().collect();
        for name in &selection.include {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.retain(|name| {
            !self.excluded_policies.contains(name) && !selection.exclude.contains(name)
        });
        names
    }

    /// Build runtime policies for this profile
    ///
    /// Profile overrides are applied to the library definition before it is
    /// validated against the registry.
    ///
    /// # Errors
    /// - `ConfigurationError::UnknownPolicy` for a name missing from `library`
    /// - `ConfigurationError::UnknownCheck` for a policy with an unregistered class
    pub fn build_policies(
        &self,
        selection: &ProfileSelection,
        library: &PolicyLibrary,
        registry: &CheckRegistry,
    ) -> Result<Vec<Arc<Policy>>, ConfigurationError> {
        let mut policies = Vec::new();
        for name in self.policy_names(selection) {
            let mut def = library
                .get(&name)
                .cloned()
                .ok_or_else(|| ConfigurationError::UnknownPolicy(name.clone()))?;

            if let Some(overrides) = self.policies.get(&name) {
                def.parameters.extend(overrides.parameters.clone());
                if overrides.severity.is_some() {
                    def.severity = overrides.severity;
                }
            }

            tracing::debug!(policy = %name, "loading policy from definition");
            let (policy, _warnings) = Policy::from_definition(def, registry)?;
            policies.push(Arc::new(policy));
        }
        Ok(policies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PolicyDefinition;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const PROFILE: &str = r#"
name: site_audit
title: Site audit
policies:
  Views:
    severity: critical
  SiteName:
    parameters:
      value: Example
  Legacy: {}
excluded_policies:
  - Legacy
"#;

    fn library() -> PolicyLibrary {
        let mut library = PolicyLibrary::new();
        library.insert(
            PolicyDefinition::new("Views", "Drupal:ModuleEnabled").with_parameter("module", "views"),
        );
        library.insert(
            PolicyDefinition::new("SiteName", "Drupal:ConfigCheck")
                .with_parameter("collection", "system.site")
                .with_parameter("key", "name")
                .with_parameter("value", "Default"),
        );
        library.insert(PolicyDefinition::new("Legacy", "Drupal:ModuleKnownVersions"));
        library.insert(PolicyDefinition::new("Extra", "Drupal:ModuleEnabled"));
        library
    }

    #[test]
    fn selection_includes_and_excludes() {
        let profile = Profile::from_yaml_str(PROFILE).unwrap();
        let selection = ProfileSelection {
            include: vec!["Extra".to_string(), "Views".to_string()],
            exclude: vec!["SiteName".to_string()],
        };
        assert_eq!(profile.policy_names(&selection), vec!["Views", "Extra"]);
    }

    #[test]
    fn overrides_apply_to_definitions() {
        let profile = Profile::from_yaml_str(PROFILE).unwrap();
        let policies = profile
            .build_policies(&ProfileSelection::default(), &library(), &CheckRegistry::with_builtins())
            .unwrap();

        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].severity(), Severity::Critical);
        assert_eq!(policies[1].parameters()["value"], json!("Example"));
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let profile = Profile::from_yaml_str(PROFILE).unwrap();
        let selection = ProfileSelection {
            include: vec!["Nope".to_string()],
            exclude: Vec::new(),
        };
        let err = profile
            .build_policies(&selection, &library(), &CheckRegistry::with_builtins())
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownPolicy(name) if name == "Nope"));
    }
}
