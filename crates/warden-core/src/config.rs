//! Run configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! max_concurrency = 8
//! exit_on_severity = "high"
//! command_timeout_secs = 120
//!
//! [transport]
//! kind = "ssh"
//! host = "web1.example.com"
//! user = "deploy"
//! ```

use crate::assessment::MAX_REPORTING_PERIOD_HOURS;
use crate::error::ConfigurationError;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use warden_remote::{ContainerTransport, LocalTransport, ProcessRunner, SshTransport, Transport};

/// How targets are reached
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    /// Local shell
    #[default]
    Local,
    /// SSH session
    Ssh {
        /// Remote host
        host: String,
        /// Login user
        #[serde(default)]
        user: Option<String>,
        /// Port
        #[serde(default)]
        port: Option<u16>,
        /// Identity file
        #[serde(default)]
        identity: Option<String>,
        /// Extra `-o` options
        #[serde(default)]
        options: Vec<String>,
    },
    /// Container exec
    Container {
        /// Runtime binary
        #[serde(default = "default_runtime")]
        runtime: String,
        /// Container name or id
        container: String,
    },
}

fn default_runtime() -> String {
    "docker".to_string()
}

impl TransportConfig {
    /// Build a transport driven by `runner`
    #[must_use]
    pub fn build(&self, runner: ProcessRunner) -> Arc<dyn Transport> {
        match self {
            Self::Local => Arc::new(LocalTransport::new(runner)),
            Self::Ssh {
                host,
                user,
                port,
                identity,
                options,
            } => {
                let mut ssh = SshTransport::new(host.clone(), runner);
                if let Some(user) = user {
                    ssh = ssh.with_user(user.clone());
                }
                if let Some(port) = port {
                    ssh = ssh.with_port(*port);
                }
                if let Some(identity) = identity {
                    ssh = ssh.with_identity(identity.clone());
                }
                for option in options {
                    ssh = ssh.with_option(option.clone());
                }
                Arc::new(ssh)
            }
            Self::Container { runtime, container } => {
                Arc::new(ContainerTransport::new(container.clone(), runner).with_runtime(runtime.clone()))
            }
        }
    }
}

/// Configuration of one profile run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Maximum targets assessed at once
    pub max_concurrency: usize,
    /// Severity threshold for a non-zero exit code
    pub exit_on_severity: Option<Severity>,
    /// Per-command timeout
    pub command_timeout_secs: u64,
    /// Transport to reach targets
    pub transport: TransportConfig,
    /// Length of the reporting period ending now
    pub reporting_period_hours: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            exit_on_severity: None,
            command_timeout_secs: 300,
            transport: TransportConfig::Local,
            reporting_period_hours: 24,
        }
    }
}

impl RunConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML
    ///
    /// # Errors
    /// Parse errors or failed validation.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigurationError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    ///
    /// # Errors
    /// I/O, parse or validation errors.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Validate semantic constraints
    ///
    /// # Errors
    /// `ConfigurationError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_concurrency == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigurationError::InvalidConfig(
                "command_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if !(1..=MAX_REPORTING_PERIOD_HOURS).contains(&self.reporting_period_hours) {
            return Err(ConfigurationError::InvalidConfig(format!(
                "reporting_period_hours must be between 1 and {MAX_REPORTING_PERIOD_HOURS}"
            )));
        }
        Ok(())
    }

    /// With max concurrency
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// With exit severity threshold
    #[inline]
    #[must_use]
    pub fn with_exit_on_severity(mut self, severity: Option<Severity>) -> Self {
        self.exit_on_severity = severity;
        self
    }

    /// With command timeout
    #[inline]
    #[must_use]
    pub fn with_command_timeout_secs(mut self, secs: u64) -> Self {
        self.command_timeout_secs = secs;
        self
    }

    /// With transport
    #[inline]
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// With reporting period length
    #[inline]
    #[must_use]
    pub fn with_reporting_period_hours(mut self, hours: u32) -> Self {
        self.reporting_period_hours = hours;
        self
    }

    /// Command timeout as a duration
    #[inline]
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assessment::ReportingPeriod;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.command_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn parses_ssh_transport() {
        let config = RunConfig::from_toml_str(
            r#"
            max_concurrency = 8
            exit_on_severity = "high"

            [transport]
            kind = "ssh"
            host = "web1.example.com"
            user = "deploy"
            port = 2222
            "#,
        )
        .unwrap();
        assert_eq!(config.exit_on_severity, Some(Severity::High));
        assert_eq!(
            config.transport,
            TransportConfig::Ssh {
                host: "web1.example.com".to_string(),
                user: Some("deploy".to_string()),
                port: Some(2222),
                identity: None,
                options: Vec::new(),
            }
        );
        assert_eq!(config.transport.build(ProcessRunner::new()).describe(), "ssh:deploy@web1.example.com");
    }

    #[test]
    fn container_runtime_defaults_to_docker() {
        let config = RunConfig::from_toml_str(
            r#"
            [transport]
            kind = "container"
            container = "site_php"
            "#,
        )
        .unwrap();
        assert_eq!(config.transport.build(ProcessRunner::new()).describe(), "docker:site_php");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = RunConfig::from_toml_str("max_concurrency = 0").unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidConfig(_)));
    }

    #[test]
    fn reporting_period_is_range_checked() {
        for source in ["reporting_period_hours = 0", "reporting_period_hours = 4294967295"] {
            let err = RunConfig::from_toml_str(source).unwrap_err();
            assert!(matches!(err, ConfigurationError::InvalidConfig(_)));
        }
        let config = RunConfig::from_toml_str("reporting_period_hours = 168").unwrap();
        assert!(ReportingPeriod::ending_now(config.reporting_period_hours).is_ok());
    }

    #[test]
    fn unknown_severity_is_rejected() {
        let err = RunConfig::from_toml_str("exit_on_severity = \"urgent\"").unwrap_err();
        assert!(matches!(err, ConfigurationError::Toml(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "command_timeout_secs = 30").unwrap();
        let config = RunConfig::from_file(file.path()).unwrap();
        assert_eq!(config.command_timeout_secs, 30);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = RunConfig::from_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigurationError::Io { .. }));
    }
}
