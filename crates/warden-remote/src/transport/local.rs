use super::process::ProcessRunner;
use super::Transport;
use crate::error::TransportError;

/// Runs commands through the local `sh`
#[derive(Debug, Clone, Default)]
pub struct LocalTransport {
    runner: ProcessRunner,
}

impl LocalTransport {
    /// Create local transport
    #[inline]
    #[must_use]
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }
}

#[async_trait::async_trait]
impl Transport for LocalTransport {
    async fn send(&self, command: &str) -> Result<String, TransportError> {
        self.runner
            .run("sh", &["-c".to_string(), command.to_string()])
            .await
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_shell_pipelines() {
        let transport = LocalTransport::default();
        let out = transport.send("printf 'a\\nb\\n' | wc -l").await.unwrap();
        assert_eq!(out.trim(), "2");
    }

    #[tokio::test]
    async fn expands_environment_references() {
        let transport = LocalTransport::default();
        let out = transport.send("X=site; echo $X").await.unwrap();
        assert_eq!(out.trim(), "site");
    }
}
