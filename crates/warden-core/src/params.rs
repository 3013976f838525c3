//! Parameter reconciliation and chart metadata

use crate::check::ParameterSpec;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write as _;

/// Resolved parameter map
pub type Parameters = IndexMap<String, Value>;

/// One chart block from a policy definition
pub type ChartBlock = IndexMap<String, Value>;

/// Name of the synthetic parameter carrying rendered charts
pub const CHART_PARAMETER: &str = "_chart";

/// Policy documents a parameter its check does not declare
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterWarning {
    /// Undeclared parameter
    pub parameter: String,
}

/// Reconcile policy parameter defaults with the check's declared parameters
///
/// Policy values win. Every check parameter missing from the policy is
/// filled with its declared default (or null). Every policy parameter the
/// check does not declare yields a warning.
#[must_use]
pub fn merge_parameter_defaults(
    policy_params: &Parameters,
    check_params: &[ParameterSpec],
) -> (Parameters, Vec<ParameterWarning>) {
    let warnings = policy_params
        .keys()
        .filter(|name| !check_params.iter().any(|p| &p.name == *name))
        .map(|name| ParameterWarning {
            parameter: name.clone(),
        })
        .collect();

    let mut merged = policy_params.clone();
    for spec in check_params {
        if !merged.contains_key(&spec.name) {
            merged.insert(
                spec.name.clone(),
                spec.default.clone().unwrap_or(Value::Null),
            );
        }
    }
    (merged, warnings)
}

/// Fill a chart block with display defaults
#[must_use]
pub fn complete_chart(block: &ChartBlock) -> ChartBlock {
    let defaults = [
        ("type", Value::from("bar")),
        ("hide-table", Value::Bool(false)),
        ("stacked", Value::Bool(false)),
        ("series", Value::Array(Vec::new())),
        ("series-labels", Value::Array(Vec::new())),
        ("labels", Value::Array(Vec::new())),
        ("title", Value::from("")),
    ];
    let mut chart = block.clone();
    for (key, value) in defaults {
        chart.entry(key.to_string()).or_insert(value);
    }
    chart
}

/// Render a completed chart block as `[[[key="value" ...]]]`
#[must_use]
pub fn render_chart(block: &ChartBlock) -> String {
    let mut out = String::from("[[[");
    for (i, (attr, value)) in complete_chart(block).iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{attr}=\"{}\"", chart_value(value));
    }
    out.push_str("]]]");
    out
}

fn chart_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(chart_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Render every chart of a policy, keyed by chart id
#[must_use]
pub fn render_charts(charts: &IndexMap<String, ChartBlock>) -> IndexMap<String, Value> {
    charts
        .iter()
        .map(|(id, block)| (id.clone(), Value::String(render_chart(block))))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn params(value: Value) -> Parameters {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn policy_values_win_and_missing_defaults_fill_in() {
        let check = [
            ParameterSpec::new("a").with_default(0),
            ParameterSpec::new("b").with_default(2),
        ];
        let (merged, warnings) = merge_parameter_defaults(&params(json!({"a": 1})), &check);
        assert_eq!(merged, params(json!({"a": 1, "b": 2})));
        assert!(warnings.is_empty());
    }

    #[test]
    fn undeclared_policy_parameter_warns() {
        let check = [ParameterSpec::new("a").with_default(0)];
        let (merged, warnings) = merge_parameter_defaults(&params(json!({"c": 5})), &check);
        assert_eq!(merged, params(json!({"a": 0, "c": 5})));
        assert_eq!(
            warnings,
            vec![ParameterWarning {
                parameter: "c".to_string()
            }]
        );
    }

    #[test]
    fn parameters_without_default_become_null() {
        let check = [ParameterSpec::new("module")];
        let (merged, _) = merge_parameter_defaults(&Parameters::new(), &check);
        assert_eq!(merged["module"], Value::Null);
    }

    #[test]
    fn chart_renders_with_defaults_after_declared_keys() {
        let block: ChartBlock =
            serde_json::from_value(json!({"series": ["a", "b"], "title": "Usage"})).unwrap();
        assert_eq!(
            render_chart(&block),
            "[[[series=\"a,b\" title=\"Usage\" type=\"bar\" hide-table=\"false\" \
             stacked=\"false\" series-labels=\"\" labels=\"\"]]]"
        );
    }
}
