//! Remote runtime scripts
//!
//! Logic that is awkward to express as a drush subcommand is shipped to the
//! target as a small PHP function. Each [`RemoteScript`] is a named template
//! with typed arguments; arguments are rendered as PHP literal assignments in
//! front of the template body, and the whole function is wrapped so that its
//! JSON-encoded return value is printed between the sentinel markers.
//!
//! The wrapper is base64-encoded before it touches a shell, so no quoting
//! hazards arise from the script text itself.

use crate::sentinel::{END_MARKER, START_MARKER};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use indexmap::IndexMap;
use std::fmt::Write as _;

/// Typed argument substituted into a script template
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    /// PHP `NULL`
    Null,
    /// PHP bool
    Bool(bool),
    /// PHP int
    Int(i64),
    /// PHP float
    Float(f64),
    /// PHP single-quoted string
    String(String),
    /// PHP list
    List(Vec<ScriptValue>),
    /// PHP associative array
    Map(IndexMap<String, ScriptValue>),
}

impl ScriptValue {
    /// Render as a PHP literal expression
    #[must_use]
    pub fn to_php_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Bool(true) => "true".to_string(),
            Self::Bool(false) => "false".to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) if f.is_finite() => format!("{f:?}"),
            Self::Float(_) => "NULL".to_string(),
            Self::String(s) => php_string(s),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_php_literal).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Map(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{} => {}", php_string(k), v.to_php_literal()))
                    .collect();
                format!("[{}]", inner.join(", "))
            }
        }
    }
}

fn php_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ScriptValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<&serde_json::Value> for ScriptValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from).collect()),
            Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Named scripts that can be executed inside the remote runtime
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteScript {
    /// Machine names of enabled modules
    EnabledModules,
    /// Map of installed module name to version string
    ModuleVersions,
    /// Value from the state API
    StateValue {
        /// State key
        key: String,
    },
    /// Config object, or one key of it
    ConfigValue {
        /// Config object name
        name: String,
        /// Optional key within the object
        key: Option<String>,
    },
    /// Number of user accounts with a given status
    UserCount {
        /// 1 = active, 0 = blocked
        status: i64,
    },
    /// PHP runtime facts
    PhpEnvironment,
    /// Runtime requirement severities keyed by requirement name
    RequirementSeverities,
}

impl RemoteScript {
    /// Template name, used in logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::EnabledModules => "enabled_modules",
            Self::ModuleVersions => "module_versions",
            Self::StateValue { .. } => "state_value",
            Self::ConfigValue { .. } => "config_value",
            Self::UserCount { .. } => "user_count",
            Self::PhpEnvironment => "php_environment",
            Self::RequirementSeverities => "requirement_severities",
        }
    }

    /// Typed arguments bound as local variables before the body runs
    #[must_use]
    pub fn arguments(&self) -> Vec<(&'static str, ScriptValue)> {
        match self {
            Self::StateValue { key } => vec![("key", key.as_str().into())],
            Self::ConfigValue { name, key } => vec![
                ("name", name.as_str().into()),
                ("key", key.clone().into()),
            ],
            Self::UserCount { status } => vec![("status", (*status).into())],
            Self::EnabledModules
            | Self::ModuleVersions
            | Self::PhpEnvironment
            | Self::RequirementSeverities => Vec::new(),
        }
    }

    /// PHP function body
    #[must_use]
    pub fn body(&self) -> &'static str {
        match self {
            Self::EnabledModules => {
                "return array_keys(\\Drupal::moduleHandler()->getModuleList());"
            }
            Self::ModuleVersions => concat!(
                "$out = [];",
                "foreach (\\Drupal::service('extension.list.module')->getAllInstalledInfo() as $n => $info) {",
                "$out[$n] = $info['version'] ?? NULL;",
                "}",
                "return $out;"
            ),
            Self::StateValue { .. } => "return \\Drupal::state()->get($key);",
            Self::ConfigValue { .. } => concat!(
                "$config = \\Drupal::config($name);",
                "return $key === NULL ? $config->getRawData() : $config->get($key);"
            ),
            Self::UserCount { .. } => concat!(
                "return (int) \\Drupal::entityQuery('user')->accessCheck(FALSE)",
                "->condition('status', $status)->count()->execute();"
            ),
            Self::PhpEnvironment => concat!(
                "return ['version' => PHP_VERSION, 'os' => PHP_OS, ",
                "'memory_limit' => ini_get('memory_limit'), 'sapi' => PHP_SAPI];"
            ),
            Self::RequirementSeverities => concat!(
                "require_once DRUPAL_ROOT . '/core/includes/install.inc';",
                "$reqs = \\Drupal::moduleHandler()->invokeAll('requirements', ['runtime']);",
                "return array_map(function ($r) { return $r['severity'] ?? NULL; }, $reqs);"
            ),
        }
    }

    /// Full PHP wrapper printing the sentinel-framed JSON result
    #[must_use]
    pub fn render(&self) -> String {
        let mut init = String::new();
        for (name, value) in self.arguments() {
            let _ = write!(init, "${name} = {};", value.to_php_literal());
        }
        format!(
            "function __d__(){{{init}{body}}}; echo \"{START_MARKER}\".json_encode(__d__(), JSON_PARTIAL_OUTPUT_ON_ERROR).\"{END_MARKER}\";",
            body = self.body(),
        )
    }

    /// Base64-encoded wrapper, safe to place in a shell command
    #[must_use]
    pub fn encode(&self) -> String {
        STANDARD.encode(self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_escape_quotes_and_backslashes() {
        let value = ScriptValue::from("it's a \\ path");
        assert_eq!(value.to_php_literal(), r"'it\'s a \\ path'");
    }

    #[test]
    fn nested_values_render_as_arrays() {
        let value = ScriptValue::from(&json!({"a": [1, true, null], "b": "x"}));
        assert_eq!(value.to_php_literal(), "['a' => [1, true, NULL], 'b' => 'x']");
    }

    #[test]
    fn floats_render_with_decimal_point() {
        assert_eq!(ScriptValue::Float(1.0).to_php_literal(), "1.0");
        assert_eq!(ScriptValue::Float(f64::NAN).to_php_literal(), "NULL");
    }

    #[test]
    fn arguments_are_bound_before_body() {
        let script = RemoteScript::StateValue {
            key: "system.cron_last".to_string(),
        };
        let rendered = script.render();
        assert!(rendered.starts_with("function __d__(){$key = 'system.cron_last';return"));
        assert!(rendered.contains("echo \"__DSTART\".json_encode(__d__()"));
        assert!(rendered.ends_with(".\"__DEND\";"));
    }

    #[test]
    fn optional_arguments_become_null() {
        let script = RemoteScript::ConfigValue {
            name: "system.site".to_string(),
            key: None,
        };
        assert!(script.render().contains("$key = NULL;"));
    }

    #[test]
    fn encoding_round_trips_through_base64() {
        let script = RemoteScript::EnabledModules;
        let decoded = STANDARD.decode(script.encode()).unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), script.render());
    }
}
