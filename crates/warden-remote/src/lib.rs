//! Warden Remote - execution against target environments
//!
//! The lowest layer of the assessment engine:
//! - Pluggable transports (local shell, SSH, container exec)
//! - Drush binary resolution and a closed table of supported operations
//! - Runtime scripts shipped base64-encoded and decoded from sentinel framing
//! - Cooperative cancellation shared across in-flight commands
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_remote::{Drush, DrushCommand, DrushOptions, LocalTransport, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport: Arc<dyn Transport> = Arc::new(LocalTransport::default());
//! let drush = Drush::bind(transport).await?.with_uri("https://example.com");
//!
//! let status: serde_json::Value = drush
//!     .call(DrushCommand::Status, &[], DrushOptions::new().json())
//!     .run_json()
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod cancel;
pub mod drush;
pub mod error;
pub mod script;
pub mod sentinel;
pub mod shell;
pub mod transport;

pub use cancel::CancelSignal;
pub use drush::{Drush, DrushCall, DrushCommand, DrushOptions, OptionValue, LAUNCHERS};
pub use error::{DecodeError, RemoteError, ResolutionError, TransportError};
pub use script::{RemoteScript, ScriptValue};
pub use sentinel::{decode_json, decode_sentinel_payload, decode_text, END_MARKER, START_MARKER};
pub use transport::{ContainerTransport, LocalTransport, ProcessRunner, SshTransport, Transport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
