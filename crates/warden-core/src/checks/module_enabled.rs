use crate::check::{Check, CheckContext, CheckMetadata, ParameterSpec};
use crate::error::CheckError;
use crate::outcome::Outcome;
use warden_remote::RemoteScript;

/// Passes when a module is enabled on the target
#[derive(Debug)]
pub struct ModuleEnabled {
    metadata: CheckMetadata,
}

impl ModuleEnabled {
    /// Class name
    pub const NAME: &'static str = "Drupal:ModuleEnabled";

    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: CheckMetadata::new(Self::NAME, "Check a module is enabled.").with_parameter(
                ParameterSpec::new("module").with_description("Module machine name."),
            ),
        }
    }
}

impl Default for ModuleEnabled {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Check for ModuleEnabled {
    fn metadata(&self) -> &CheckMetadata {
        &self.metadata
    }

    async fn audit(&self, ctx: &mut CheckContext<'_>) -> Result<Outcome, CheckError> {
        let Some(module) = ctx.parameter_as::<String>("module")? else {
            return Ok(Outcome::NotApplicable);
        };

        let enabled: Vec<String> = ctx.drush().runtime(&RemoteScript::EnabledModules).await?;
        let is_enabled = enabled.iter().any(|m| m == &module);
        ctx.set("module", module);
        ctx.set("enabled", is_enabled);

        Ok(if is_enabled {
            Outcome::Success
        } else {
            Outcome::Failure
        })
    }
}
