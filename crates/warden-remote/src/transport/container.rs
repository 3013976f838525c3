use super::process::ProcessRunner;
use super::Transport;
use crate::error::TransportError;

/// Runs commands inside a container through `<runtime> exec`
#[derive(Debug, Clone)]
pub struct ContainerTransport {
    runtime: String,
    container: String,
    runner: ProcessRunner,
}

impl ContainerTransport {
    /// Create transport for `container` using the `docker` runtime
    #[must_use]
    pub fn new(container: impl Into<String>, runner: ProcessRunner) -> Self {
        Self {
            runtime: "docker".to_string(),
            container: container.into(),
            runner,
        }
    }

    /// With container runtime binary (`docker`, `podman`, ...)
    #[inline]
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Argument vector passed to the runtime
    #[must_use]
    pub fn exec_args(&self, command: &str) -> Vec<String> {
        vec![
            "exec".to_string(),
            self.container.clone(),
            "sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ]
    }
}

#[async_trait::async_trait]
impl Transport for ContainerTransport {
    async fn send(&self, command: &str) -> Result<String, TransportError> {
        self.runner.run(&self.runtime, &self.exec_args(command)).await
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.runtime, self.container)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_command_in_container_shell() {
        let transport =
            ContainerTransport::new("site_php", ProcessRunner::new()).with_runtime("podman");
        assert_eq!(
            transport.exec_args("drush status"),
            vec!["exec", "site_php", "sh", "-c", "drush status"]
        );
        assert_eq!(transport.describe(), "podman:site_php");
    }
}
