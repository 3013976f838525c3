//! Drush remote execution protocol
//!
//! Binds a [`Transport`] to the site administration tool:
//! - Resolves the drush binary once per binding and caches the invocation prefix
//! - Dispatches a closed set of logical operations to literal subcommands
//! - Ships [`RemoteScript`]s through `php-script` and decodes the
//!   sentinel-framed result

use crate::error::{DecodeError, RemoteError, ResolutionError};
use crate::script::RemoteScript;
use crate::sentinel::{decode_json, decode_sentinel_payload, decode_text};
use crate::shell::{quote, quote_value};
use crate::transport::Transport;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Candidate launcher locations, probed in order
pub const LAUNCHERS: [&str; 4] = [
    "../vendor/drush/drush/drush",
    "drush-launcher",
    "drush.launcher",
    "drush",
];

/// `E_ALL & ~E_NOTICE & ~E_DEPRECATED`
const PHP_ERROR_REPORTING: u32 = 24567;

/// Root option value, expanded on the target
const DRUSH_ROOT: &str = "$DRUSH_ROOT";

/// Supported logical drush operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrushCommand {
    /// `config:get`
    ConfigGet,
    /// `pm:list`
    PmList,
    /// `pm:security`
    PmSecurity,
    /// `state:get`
    StateGet,
    /// `status`
    Status,
    /// `user:information`
    UserInformation,
    /// `sqlq`
    Sqlq,
    /// `updatedb:status`
    UpdatedbStatus,
    /// `vget`
    VariableGet,
    /// `p:diagnostics`
    PurgeDiagnostics,
    /// `core:requirements`
    CoreRequirements,
}

impl DrushCommand {
    /// Every supported operation
    pub const ALL: [Self; 11] = [
        Self::ConfigGet,
        Self::PmList,
        Self::PmSecurity,
        Self::StateGet,
        Self::Status,
        Self::UserInformation,
        Self::Sqlq,
        Self::UpdatedbStatus,
        Self::VariableGet,
        Self::PurgeDiagnostics,
        Self::CoreRequirements,
    ];

    /// Logical name used by callers
    #[must_use]
    pub fn logical_name(self) -> &'static str {
        match self {
            Self::ConfigGet => "configGet",
            Self::PmList => "pmList",
            Self::PmSecurity => "pmSecurity",
            Self::StateGet => "stateGet",
            Self::Status => "status",
            Self::UserInformation => "userInformation",
            Self::Sqlq => "sqlq",
            Self::UpdatedbStatus => "updatedbStatus",
            Self::VariableGet => "variableGet",
            Self::PurgeDiagnostics => "purgeDiagnostics",
            Self::CoreRequirements => "coreRequirements",
        }
    }

    /// Literal drush subcommand token
    #[must_use]
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::ConfigGet => "config:get",
            Self::PmList => "pm:list",
            Self::PmSecurity => "pm:security",
            Self::StateGet => "state:get",
            Self::Status => "status",
            Self::UserInformation => "user:information",
            Self::Sqlq => "sqlq",
            Self::UpdatedbStatus => "updatedb:status",
            Self::VariableGet => "vget",
            Self::PurgeDiagnostics => "p:diagnostics",
            Self::CoreRequirements => "core:requirements",
        }
    }
}

impl FromStr for DrushCommand {
    type Err = RemoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.logical_name() == s)
            .ok_or_else(|| RemoteError::UnsupportedCommand(s.to_string()))
    }
}

impl fmt::Display for DrushCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.logical_name())
    }
}

/// Value of one command-line option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Bare flag (`--yes`)
    Flag,
    /// Boolean; `true` renders as a flag, `false` is omitted
    Bool(bool),
    /// `--key=value`
    Text(String),
}

/// Ordered option set for a drush call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrushOptions {
    entries: IndexMap<String, OptionValue>,
}

impl DrushOptions {
    /// Create empty option set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a key/value option
    #[inline]
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), OptionValue::Text(value.into()));
        self
    }

    /// With a bare flag
    #[inline]
    #[must_use]
    pub fn flag(mut self, key: impl Into<String>) -> Self {
        self.entries.insert(key.into(), OptionValue::Flag);
        self
    }

    /// With a boolean option
    #[inline]
    #[must_use]
    pub fn bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.entries.insert(key.into(), OptionValue::Bool(value));
        self
    }

    /// Shorthand for `--format=json`
    #[inline]
    #[must_use]
    pub fn json(self) -> Self {
        self.set("format", "json")
    }

    /// Check if an option is present
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    fn insert_if_absent(&mut self, key: &str, value: OptionValue) {
        if !self.entries.contains_key(key) {
            self.entries.insert(key.to_string(), value);
        }
    }

    /// Render into command-line tokens
    ///
    /// Single-letter keys use `-k value`, longer keys `--key=value`. Values
    /// referencing environment variables are left unescaped.
    #[must_use]
    pub fn render(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.entries.len());
        for (key, value) in &self.entries {
            let is_short = key.chars().count() == 1;
            let opt = if is_short {
                format!("-{key}")
            } else {
                format!("--{key}")
            };
            match value {
                OptionValue::Flag | OptionValue::Bool(true) => out.push(opt),
                OptionValue::Bool(false) => {}
                OptionValue::Text(text) => {
                    let delimiter = if is_short { " " } else { "=" };
                    out.push(format!("{opt}{delimiter}{}", quote_value(text)));
                }
            }
        }
        out
    }
}

/// A drush binding for one target
#[derive(Clone)]
pub struct Drush {
    transport: Arc<dyn Transport>,
    bin: String,
    uri: Option<String>,
}

impl fmt::Debug for Drush {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drush")
            .field("transport", &self.transport.describe())
            .field("bin", &self.bin)
            .field("uri", &self.uri)
            .finish()
    }
}

impl Drush {
    /// Resolve the drush binary on the target and bind to it
    ///
    /// # Errors
    /// - `ResolutionError::NotFound` if no launcher exists
    /// - `ResolutionError::Transport` if probing fails
    pub async fn bind(transport: Arc<dyn Transport>) -> Result<Self, ResolutionError> {
        let probe = LAUNCHERS
            .iter()
            .map(|l| format!("which {l}"))
            .collect::<Vec<_>>()
            .join(" || ");

        let path = match transport.send(&probe).await {
            Ok(out) => out.lines().next().unwrap_or_default().trim().to_string(),
            // `which` exits non-zero when nothing matched
            Err(crate::error::TransportError::CommandFailed { .. }) => String::new(),
            Err(e) => return Err(ResolutionError::Transport(e)),
        };

        if path.is_empty() {
            return Err(ResolutionError::NotFound {
                candidates: LAUNCHERS.iter().map(ToString::to_string).collect(),
            });
        }

        let head = transport.send(&format!("head -1 {}", quote(&path))).await?;
        let bin = if head.to_lowercase().contains("env php") {
            format!("/usr/bin/env php -d error_reporting={PHP_ERROR_REPORTING} {path}")
        } else {
            path
        };

        tracing::debug!(transport = %transport.describe(), bin, "resolved drush binary");
        Ok(Self::from_resolved(transport, bin))
    }

    /// Bind with an already resolved invocation prefix
    #[inline]
    #[must_use]
    pub fn from_resolved(transport: Arc<dyn Transport>, bin: impl Into<String>) -> Self {
        Self {
            transport,
            bin: bin.into(),
            uri: None,
        }
    }

    /// With site URI
    #[inline]
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Resolved invocation prefix
    #[inline]
    #[must_use]
    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Bound site URI
    #[inline]
    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.uri.as_deref()
    }

    /// Underlying transport
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Prepare a call to a supported operation
    #[must_use]
    pub fn call(&self, command: DrushCommand, args: &[&str], options: DrushOptions) -> DrushCall {
        let mut options = options;
        if !options.contains("root") && !options.contains("r") {
            options.insert_if_absent("root", OptionValue::Text(DRUSH_ROOT.to_string()));
        }
        if let Some(uri) = &self.uri {
            options
                .entries
                .insert("uri".to_string(), OptionValue::Text(uri.clone()));
        }

        let mut parts = vec![self.bin.clone(), command.subcommand().to_string()];
        parts.extend(args.iter().map(|a| quote(a)));
        parts.extend(options.render());

        DrushCall {
            transport: Arc::clone(&self.transport),
            command: parts.join(" "),
        }
    }

    /// Prepare a call by logical operation name
    ///
    /// # Errors
    /// `RemoteError::UnsupportedCommand` for names outside the command table.
    pub fn dispatch(
        &self,
        logical_name: &str,
        args: &[&str],
        options: DrushOptions,
    ) -> Result<DrushCall, RemoteError> {
        let command = logical_name.parse::<DrushCommand>()?;
        Ok(self.call(command, args, options))
    }

    /// Shell command that runs `script` inside the site runtime
    #[must_use]
    pub fn runtime_command(&self, script: &RemoteScript) -> String {
        let mut command = format!(
            "echo {} | base64 --decode | {} --root={DRUSH_ROOT}",
            script.encode(),
            self.bin
        );
        if let Some(uri) = &self.uri {
            command.push_str(&format!(" --uri={}", quote(uri)));
        }
        command.push_str(" php-script -");
        command
    }

    /// Run `script` inside the site runtime and decode its JSON result
    ///
    /// # Errors
    /// Transport failures, or a `DecodeError` carrying the raw output when the
    /// sentinel-framed payload is missing or malformed.
    pub async fn runtime<T: DeserializeOwned>(&self, script: &RemoteScript) -> Result<T, RemoteError> {
        tracing::debug!(script = script.name(), "running remote script");
        self.transport
            .execute(&self.runtime_command(script), decode_sentinel_payload::<T>)
            .await
    }
}

/// A prepared drush command, ready to be sent through the transport
#[derive(Clone)]
pub struct DrushCall {
    transport: Arc<dyn Transport>,
    command: String,
}

impl fmt::Debug for DrushCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrushCall")
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

impl DrushCall {
    /// Command line that will be sent
    #[inline]
    #[must_use]
    pub fn command_line(&self) -> &str {
        &self.command
    }

    /// Run with a caller-supplied decoder
    ///
    /// # Errors
    /// Transport or decode failures.
    pub async fn run<T, F>(self, decode: F) -> Result<T, RemoteError>
    where
        F: FnOnce(&str) -> Result<T, DecodeError> + Send,
    {
        self.transport.execute(&self.command, decode).await
    }

    /// Run and parse the output as JSON
    ///
    /// # Errors
    /// Transport or decode failures.
    pub async fn run_json<T: DeserializeOwned>(self) -> Result<T, RemoteError> {
        self.run(decode_json::<T>).await
    }

    /// Run and return trimmed text output
    ///
    /// # Errors
    /// Transport failures.
    pub async fn run_text(self) -> Result<String, RemoteError> {
        self.run(decode_text).await
    }
}
