use super::process::ProcessRunner;
use super::Transport;
use crate::error::TransportError;
use std::path::PathBuf;

/// Runs commands on a remote host through the `ssh` client
///
/// The command is handed to ssh as a single argument and interpreted by the
/// remote login shell, so no extra quoting layer is applied here.
#[derive(Debug, Clone)]
pub struct SshTransport {
    host: String,
    user: Option<String>,
    port: Option<u16>,
    identity: Option<PathBuf>,
    options: Vec<String>,
    runner: ProcessRunner,
}

impl SshTransport {
    /// Create transport for `host`
    #[must_use]
    pub fn new(host: impl Into<String>, runner: ProcessRunner) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity: None,
            options: vec!["BatchMode=yes".to_string()],
            runner,
        }
    }

    /// With login user
    #[inline]
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// With port
    #[inline]
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// With identity file
    #[inline]
    #[must_use]
    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// With an extra `-o` option
    #[inline]
    #[must_use]
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// Argument vector passed to `ssh`
    #[must_use]
    pub fn ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.identity {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().into_owned());
        }
        for option in &self.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args.push("--".to_string());
        args.push(self.destination());
        args.push(command.to_string());
        args
    }
}

#[async_trait::async_trait]
impl Transport for SshTransport {
    async fn send(&self, command: &str) -> Result<String, TransportError> {
        self.runner.run("ssh", &self.ssh_args(command)).await
    }

    fn describe(&self) -> String {
        format!("ssh:{}", self.destination())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_full_argument_vector() {
        let transport = SshTransport::new("web1.example.com", ProcessRunner::new())
            .with_user("deploy")
            .with_port(2222)
            .with_identity("/keys/id_ed25519")
            .with_option("StrictHostKeyChecking=no");

        assert_eq!(
            transport.ssh_args("drush status"),
            vec![
                "-p",
                "2222",
                "-i",
                "/keys/id_ed25519",
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=no",
                "--",
                "deploy@web1.example.com",
                "drush status",
            ]
        );
    }

    #[test]
    fn dash_prefixed_host_stays_a_destination() {
        let transport = SshTransport::new("-oProxyCommand=touch x", ProcessRunner::new());
        let args = transport.ssh_args("drush status");
        let dest = args.iter().position(|a| a == "-oProxyCommand=touch x").unwrap();
        assert_eq!(args[dest - 1], "--");
        assert_eq!(args.last().unwrap(), "drush status");
    }

    #[test]
    fn describe_names_destination() {
        let transport = SshTransport::new("web1", ProcessRunner::new());
        assert_eq!(transport.describe(), "ssh:web1");
    }
}
