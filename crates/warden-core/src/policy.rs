//! Policies
//!
//! A [`PolicyDefinition`] is the declarative YAML form. [`Policy`] is the
//! validated, immutable runtime form: parameters reconciled with the check's
//! declared parameters, severity settled and chart metadata rendered. It is
//! built once and shared read-only across assessments.

use crate::check::CheckRegistry;
use crate::error::ConfigurationError;
use crate::params::{
    merge_parameter_defaults, render_charts, ChartBlock, ParameterWarning, Parameters,
    CHART_PARAMETER,
};
use crate::severity::Severity;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Kind of policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    /// Pass/fail audit
    #[default]
    Audit,
    /// Data gathering; never carries severity
    Data,
}

/// Declarative policy as written in YAML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDefinition {
    pub name: String,
    pub title: String,
    pub class: String,
    pub description: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub tags: Vec<String>,
    pub severity: Option<Severity>,
    pub success: String,
    pub failure: String,
    pub warning: String,
    pub remediation: String,
    pub parameters: Parameters,
    pub depends: Vec<String>,
    pub chart: IndexMap<String, ChartBlock>,
}

impl PolicyDefinition {
    /// Create definition for `name` backed by check `class`
    #[must_use]
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            name,
            class: class.into(),
            ..Self::default()
        }
    }

    /// Parse a single definition from YAML
    ///
    /// # Errors
    /// `ConfigurationError::Yaml` on malformed input.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// With parameter default
    #[inline]
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// With severity
    #[inline]
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// With dependency expression
    #[inline]
    #[must_use]
    pub fn with_depends(mut self, expression: impl Into<String>) -> Self {
        self.depends.push(expression.into());
        self
    }

    /// With policy type
    #[inline]
    #[must_use]
    pub fn with_type(mut self, policy_type: PolicyType) -> Self {
        self.policy_type = policy_type;
        self
    }
}

/// Validated, immutable policy
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    name: String,
    title: String,
    class: String,
    description: String,
    policy_type: PolicyType,
    tags: Vec<String>,
    severity: Severity,
    success: String,
    failure: String,
    warning: String,
    remediation: String,
    depends: Vec<String>,
    chart: IndexMap<String, ChartBlock>,
    remediable: bool,
    parameters: Parameters,
}

impl Policy {
    /// Validate a definition against the check registry
    ///
    /// Returns the policy plus one warning per parameter the policy documents
    /// but its check does not declare.
    ///
    /// # Errors
    /// `ConfigurationError::UnknownCheck` if `class` is not registered.
    pub fn from_definition(
        def: PolicyDefinition,
        registry: &CheckRegistry,
    ) -> Result<(Self, Vec<ParameterWarning>), ConfigurationError> {
        let metadata = registry
            .metadata(&def.class)
            .ok_or_else(|| ConfigurationError::UnknownCheck(def.class.clone()))?;

        let (mut parameters, warnings) =
            merge_parameter_defaults(&def.parameters, &metadata.parameters);
        for warning in &warnings {
            tracing::warn!(
                policy = %def.name,
                class = %def.class,
                "policy documents parameter \"{}\" not declared by its check",
                warning.parameter
            );
        }
        if !def.chart.is_empty() {
            parameters.insert(
                CHART_PARAMETER.to_string(),
                Value::Object(render_charts(&def.chart).into_iter().collect()),
            );
        }

        let severity = match def.policy_type {
            PolicyType::Data => Severity::None,
            PolicyType::Audit => def.severity.unwrap_or_default(),
        };

        let policy = Self {
            name: def.name,
            title: def.title,
            class: def.class,
            description: def.description,
            policy_type: def.policy_type,
            tags: def.tags,
            severity,
            success: def.success,
            failure: def.failure,
            warning: def.warning,
            remediation: def.remediation,
            depends: def.depends,
            chart: def.chart,
            remediable: metadata.remediable,
            parameters,
        };
        Ok((policy, warnings))
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Check class
    #[inline]
    #[must_use]
    pub fn class(&self) -> &str {
        &self.class
    }

    #[inline]
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    #[must_use]
    pub fn policy_type(&self) -> PolicyType {
        self.policy_type
    }

    #[inline]
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Effective severity; always `None` for data policies
    #[inline]
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Message templates: `(success, failure, warning, remediation)`
    #[must_use]
    pub fn messages(&self) -> (&str, &str, &str, &str) {
        (&self.success, &self.failure, &self.warning, &self.remediation)
    }

    /// Dependency expressions gating execution
    #[inline]
    #[must_use]
    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    #[inline]
    #[must_use]
    pub fn remediable(&self) -> bool {
        self.remediable
    }

    /// Resolved parameters
    #[inline]
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Serialisable summary with empty fields omitted
    #[must_use]
    pub fn export(&self) -> PolicyExport {
        PolicyExport {
            title: self.title.clone(),
            name: self.name.clone(),
            class: self.class.clone(),
            description: self.description.clone(),
            policy_type: self.policy_type,
            tags: self.tags.clone(),
            success: self.success.clone(),
            failure: self.failure.clone(),
            warning: self.warning.clone(),
            remediation: self.remediation.clone(),
            severity: self.severity,
            depends: self.depends.clone(),
            chart: self.chart.clone(),
        }
    }
}

/// Exported policy summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyExport {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    pub name: String,
    pub class: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub success: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub failure: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub warning: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub remediation: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub chart: IndexMap<String, ChartBlock>,
}

/// Policy definitions available to profiles, keyed by name
#[derive(Debug, Clone, Default)]
pub struct PolicyLibrary {
    definitions: IndexMap<String, PolicyDefinition>,
}

impl PolicyLibrary {
    /// Create empty library
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition, replacing any with the same name
    pub fn insert(&mut self, def: PolicyDefinition) {
        self.definitions.insert(def.name.clone(), def);
    }

    /// Look up a definition
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PolicyDefinition> {
        self.definitions.get(name)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Load every `*.yml` / `*.yaml` file in `dir`
    ///
    /// # Errors
    /// I/O or YAML errors, naming the offending file.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let dir = dir.as_ref();
        let io_err = |source| ConfigurationError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yml" | "yaml")
            ) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut library = Self::new();
        for path in paths {
            let source = std::fs::read_to_string(&path).map_err(|source| ConfigurationError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let def = PolicyDefinition::from_yaml_str(&source)?;
            tracing::debug!(policy = %def.name, path = %path.display(), "loaded policy definition");
            library.insert(def);
        }
        Ok(library)
    }
}
