//! Transports
//!
//! A transport executes an opaque, fully assembled shell command against one
//! target environment and hands back its standard output. Everything above
//! this layer depends only on the [`Transport`] trait, so targets can be
//! reached through a local shell, an SSH session or a container exec
//! interchangeably.
//!
//! Transports never retry; callers decide retry policy.

mod container;
mod local;
mod process;
mod ssh;

pub use container::ContainerTransport;
pub use local::LocalTransport;
pub use process::ProcessRunner;
pub use ssh::SshTransport;

use crate::error::{DecodeError, RemoteError, TransportError};

/// Capability to run a command in a target environment
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Run `command` and return its standard output
    async fn send(&self, command: &str) -> Result<String, TransportError>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

impl dyn Transport {
    /// Run `command` and decode its output with a caller-supplied decoder
    ///
    /// # Errors
    /// - `RemoteError::Transport` if the channel fails
    /// - `RemoteError::Decode` if `decode` rejects the output
    pub async fn execute<T, F>(&self, command: &str, decode: F) -> Result<T, RemoteError>
    where
        F: FnOnce(&str) -> Result<T, DecodeError> + Send,
    {
        tracing::debug!(transport = %self.describe(), command, "sending remote command");
        let output = self.send(command).await?;
        decode(&output).map_err(RemoteError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn execute_applies_decoder() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .withf(|cmd| cmd == "echo 42")
            .returning(|_| Ok("42\n".to_string()));
        mock.expect_describe().return_const("mock".to_string());

        let transport: Arc<dyn Transport> = Arc::new(mock);
        let value = transport
            .execute("echo 42", |out| Ok(out.trim().parse::<u32>().unwrap_or_default()))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn execute_surfaces_decode_errors() {
        let mut mock = MockTransport::new();
        mock.expect_send().returning(|_| Ok("noise".to_string()));
        mock.expect_describe().return_const("mock".to_string());

        let transport: Arc<dyn Transport> = Arc::new(mock);
        let result: Result<(), _> = transport
            .execute("anything", |out| {
                Err(DecodeError::MissingStartMarker {
                    raw: out.to_string(),
                })
            })
            .await;

        match result {
            Err(RemoteError::Decode(err)) => assert_eq!(err.raw(), "noise"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_surfaces_transport_errors() {
        let mut mock = MockTransport::new();
        mock.expect_send()
            .returning(|_| Err(TransportError::Timeout { timeout_secs: 1 }));
        mock.expect_describe().return_const("mock".to_string());

        let transport: Arc<dyn Transport> = Arc::new(mock);
        let result = transport.execute("sleep 5", |out| Ok(out.to_string())).await;
        assert!(matches!(
            result,
            Err(RemoteError::Transport(TransportError::Timeout { .. }))
        ));
    }
}
