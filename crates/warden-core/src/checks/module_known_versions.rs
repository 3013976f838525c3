use crate::check::{Check, CheckContext, CheckMetadata, ParameterSpec};
use crate::error::CheckError;
use crate::expression::match_constraint;
use crate::outcome::Outcome;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use warden_remote::{DrushCommand, DrushOptions};

/// One row of the known-versions rule table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownVersionRule {
    /// Only `active` rules are applied
    pub status: String,
    /// Module machine name
    pub module: String,
    /// Anchored version pattern; blank matches every version
    #[serde(default)]
    pub version_constraint: String,
    /// Dependency expression gating the rule; blank always applies
    #[serde(default, alias = "dependency_rules_twig")]
    pub dependency_rules: String,
}

/// Parse a tab-separated rule table
///
/// Row 0 names the columns and row 1 is a description row, skipped. Blank
/// lines are ignored and short rows are padded with empty fields.
///
/// # Errors
/// `CheckError::Failed` when a row lacks the `status` or `module` column.
pub fn parse_rules_tsv(source: &str) -> Result<Vec<KnownVersionRule>, CheckError> {
    let mut lines = source.lines();
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };
    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();

    let mut rules = Vec::new();
    for line in lines.skip(1).filter(|l| !l.trim().is_empty()) {
        let mut fields = line.split('\t').map(str::trim);
        let row: Map<String, Value> = columns
            .iter()
            .map(|column| {
                let field = fields.next().unwrap_or_default();
                ((*column).to_string(), Value::String(field.to_string()))
            })
            .collect();
        let rule: KnownVersionRule = serde_json::from_value(Value::Object(row))
            .map_err(|e| CheckError::Failed(format!("malformed rule row `{line}`: {e}")))?;
        rules.push(rule);
    }
    Ok(rules)
}

async fn read_rules(location: &str) -> Result<Vec<KnownVersionRule>, CheckError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Err(CheckError::InvalidParameter {
            name: "rules_url".to_string(),
            reason: "only local rule files are supported".to_string(),
        });
    }
    let path = location.strip_prefix("file://").unwrap_or(location);
    let source = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CheckError::Failed(format!("could not read rules from {location}: {e}")))?;
    parse_rules_tsv(&source)
}

#[derive(Debug, Deserialize)]
struct PmListEntry {
    #[serde(default)]
    version: Option<String>,
}

/// Flags enabled modules whose version matches a known-problem rule
#[derive(Debug)]
pub struct ModuleKnownVersions {
    metadata: CheckMetadata,
}

impl ModuleKnownVersions {
    /// Class name
    pub const NAME: &'static str = "Drupal:ModuleKnownVersions";

    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: CheckMetadata::new(
                Self::NAME,
                "Check enabled module versions against a table of known versions.",
            )
            .with_parameter(
                ParameterSpec::new("rules")
                    .with_description("Rule rows: status, module, version_constraint, dependency_rules.")
                    .with_default(Value::Array(Vec::new())),
            )
            .with_parameter(ParameterSpec::new("rules_url").with_description(
                "Local tab-separated rule table, used when `rules` is empty. \
                 Row 0 names the columns, row 1 is skipped.",
            ))
            .deprecated(),
        }
    }
}

impl Default for ModuleKnownVersions {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Check for ModuleKnownVersions {
    fn metadata(&self) -> &CheckMetadata {
        &self.metadata
    }

    async fn audit(&self, ctx: &mut CheckContext<'_>) -> Result<Outcome, CheckError> {
        let mut rules = ctx
            .parameter_as::<Vec<KnownVersionRule>>("rules")?
            .unwrap_or_default();
        if rules.is_empty() {
            if let Some(location) = ctx.parameter_as::<String>("rules_url")? {
                rules = read_rules(&location).await?;
            }
        }
        let rules: Vec<KnownVersionRule> = rules
            .into_iter()
            .filter(|rule| rule.status == "active")
            .collect();

        if rules.is_empty() {
            tracing::info!(target_uri = ctx.target().uri(), "no active known-version rules supplied");
            return Ok(Outcome::Error);
        }

        let modules: IndexMap<String, PmListEntry> = ctx
            .drush()
            .call(
                DrushCommand::PmList,
                &[],
                DrushOptions::new().set("status", "enabled").json(),
            )
            .run_json()
            .await?;

        let mut results = Vec::new();
        for (module, info) in &modules {
            for rule in rules.iter().filter(|r| &r.module == module) {
                if !ctx.evaluate(&rule.dependency_rules)? {
                    continue;
                }
                let current = info.version.as_deref().unwrap_or_default().to_lowercase();
                if match_constraint(&current, &rule.version_constraint)? {
                    results.push(rule.clone());
                }
            }
        }

        let matched = results.len();
        ctx.set(
            "results",
            serde_json::to_value(&results).map_err(|e| CheckError::Failed(e.to_string()))?,
        );

        if matched == 0 {
            Ok(Outcome::Success)
        } else {
            Ok(Outcome::Failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TABLE: &str = "status\tmodule\tversion_constraint\tdependency_rules_twig\n\
        Publish state\tMachine name\tPattern\tExpression\n\
        active\tviews\t8\\.x-3\\.0\t\n\
        retired\ttoken\n\
        \n";

    #[test]
    fn tsv_skips_description_row_and_pads_short_rows() {
        let rules = parse_rules_tsv(TABLE).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].module, "views");
        assert_eq!(rules[0].version_constraint, "8\\.x-3\\.0");
        assert_eq!(rules[1].status, "retired");
        assert_eq!(rules[1].dependency_rules, "");
    }

    #[test]
    fn tsv_without_module_column_is_rejected() {
        let err = parse_rules_tsv("status\tversion\n-\t-\nactive\t1.0\n").unwrap_err();
        assert!(matches!(err, CheckError::Failed(_)));
    }

    #[test]
    fn empty_table_has_no_rules() {
        assert!(parse_rules_tsv("").unwrap().is_empty());
    }
}
