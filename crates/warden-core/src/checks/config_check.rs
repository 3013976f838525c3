use crate::check::{Check, CheckContext, CheckMetadata, ParameterSpec};
use crate::error::CheckError;
use crate::outcome::Outcome;
use serde_json::Value;
use warden_remote::{DrushCommand, DrushOptions};

/// Compares a configuration value against an expected value
#[derive(Debug)]
pub struct ConfigCheck {
    metadata: CheckMetadata,
}

impl ConfigCheck {
    /// Class name
    pub const NAME: &'static str = "Drupal:ConfigCheck";

    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: CheckMetadata::new(Self::NAME, "Check a configuration value.")
                .with_parameter(
                    ParameterSpec::new("collection").with_description("Config object name."),
                )
                .with_parameter(ParameterSpec::new("key").with_description("Key within the object."))
                .with_parameter(ParameterSpec::new("value").with_description("Expected value.")),
        }
    }
}

impl Default for ConfigCheck {
    fn default() -> Self {
        Self::new()
    }
}

/// `config:get` keys its JSON output as `<collection>:<key>`
fn unwrap_reading(output: Value, collection: &str, key: &str) -> Value {
    match output {
        Value::Object(mut map) => {
            let qualified = format!("{collection}:{key}");
            match map.remove(&qualified) {
                Some(value) => value,
                None => Value::Object(map),
            }
        }
        other => other,
    }
}

#[async_trait::async_trait]
impl Check for ConfigCheck {
    fn metadata(&self) -> &CheckMetadata {
        &self.metadata
    }

    async fn audit(&self, ctx: &mut CheckContext<'_>) -> Result<Outcome, CheckError> {
        let collection: String =
            ctx.parameter_as("collection")?
                .ok_or_else(|| CheckError::InvalidParameter {
                    name: "collection".to_string(),
                    reason: "a config object name is required".to_string(),
                })?;
        let key: String = ctx.parameter_as("key")?.unwrap_or_default();
        let expected = ctx.parameter("value").cloned().unwrap_or(Value::Null);

        let mut args = vec![collection.as_str()];
        if !key.is_empty() {
            args.push(key.as_str());
        }
        let output: Value = ctx
            .drush()
            .call(DrushCommand::ConfigGet, &args, DrushOptions::new().json())
            .run_json()
            .await?;

        let reading = unwrap_reading(output, &collection, &key);
        let matches = reading == expected;
        ctx.set("reading", reading);

        Ok(if matches {
            Outcome::Success
        } else {
            Outcome::Failure
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn qualified_key_is_unwrapped() {
        let out = unwrap_reading(json!({"system.site:name": "Example"}), "system.site", "name");
        assert_eq!(out, json!("Example"));
    }

    #[test]
    fn whole_object_is_kept_without_key() {
        let out = unwrap_reading(json!({"name": "Example"}), "system.site", "");
        assert_eq!(out, json!({"name": "Example"}));
    }
}
