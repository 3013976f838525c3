//! Targets and target binding
//!
//! A [`Target`] pairs a site identity with the drush binding used to reach
//! it. Each target owns its transport exclusively for the lifetime of one
//! assessment.

use crate::config::TransportConfig;
use crate::error::WardenError;
use indexmap::IndexSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use warden_remote::{
    CancelSignal, Drush, ProcessRunner, ResolutionError, Transport, TransportError,
};

/// Identity used when no URI was requested
pub const DEFAULT_URI: &str = "default";

/// Request to assess one site of a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRequest {
    /// Target alias (e.g. `@site.prod`)
    pub alias: String,
    /// Site URI, or `None` for the target's default site
    pub uri: Option<String>,
}

impl TargetRequest {
    /// Create request
    #[must_use]
    pub fn new(alias: impl Into<String>, uri: Option<String>) -> Self {
        Self {
            alias: alias.into(),
            uri,
        }
    }

    /// Identity results are keyed by
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        self.uri.as_deref().unwrap_or(DEFAULT_URI)
    }
}

/// Expand explicit URIs and domain-source URIs into target requests
///
/// Domain URIs come first. A lone `default` explicit entry is dropped when
/// domain URIs exist. Repeated URIs keep their first position only. An empty
/// list yields one request for the default site.
#[must_use]
pub fn plan_targets(alias: &str, explicit: &[String], domains: &[String]) -> Vec<TargetRequest> {
    let mut uris: Vec<String> = Vec::new();
    if domains.is_empty() {
        uris.extend_from_slice(explicit);
    } else {
        uris.extend_from_slice(domains);
        if explicit != [DEFAULT_URI] {
            uris.extend_from_slice(explicit);
        }
    }

    if uris.is_empty() {
        return vec![TargetRequest::new(alias, None)];
    }
    let unique: IndexSet<String> = uris.into_iter().collect();
    unique
        .into_iter()
        .map(|uri| TargetRequest::new(alias, Some(uri)))
        .collect()
}

/// A bound target
#[derive(Clone)]
pub struct Target {
    alias: String,
    uri: String,
    drush: Drush,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("alias", &self.alias)
            .field("uri", &self.uri)
            .field("drush", &self.drush)
            .finish()
    }
}

impl Target {
    /// Create target
    #[must_use]
    pub fn new(alias: impl Into<String>, uri: impl Into<String>, drush: Drush) -> Self {
        Self {
            alias: alias.into(),
            uri: uri.into(),
            drush,
        }
    }

    /// Target alias
    #[inline]
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Site URI (identity)
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Drush binding
    #[inline]
    #[must_use]
    pub fn drush(&self) -> &Drush {
        &self.drush
    }
}

/// Binds target requests to live targets
#[async_trait::async_trait]
pub trait TargetFactory: Send + Sync {
    /// Create transport and drush binding for `request`
    ///
    /// # Errors
    /// `WardenError::TargetBinding` if the target cannot be reached or has no
    /// usable drush.
    async fn create(
        &self,
        request: &TargetRequest,
        cancel: &CancelSignal,
    ) -> Result<Target, WardenError>;
}

/// Factory that builds transports from configuration and resolves drush
#[derive(Debug, Clone)]
pub struct DrushTargetFactory {
    transport: TransportConfig,
    timeout: Duration,
}

impl DrushTargetFactory {
    /// Create factory
    #[must_use]
    pub fn new(transport: TransportConfig, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

#[async_trait::async_trait]
impl TargetFactory for DrushTargetFactory {
    async fn create(
        &self,
        request: &TargetRequest,
        cancel: &CancelSignal,
    ) -> Result<Target, WardenError> {
        let runner = ProcessRunner::new()
            .with_timeout(self.timeout)
            .with_cancel(cancel.clone());
        let transport = self.transport.build(runner);
        tracing::debug!(target_uri = request.id(), transport = %transport.describe(), "binding target");

        let mut drush = match Drush::bind(transport).await {
            Ok(drush) => drush,
            Err(ResolutionError::Transport(TransportError::Cancelled)) => {
                return Err(WardenError::Cancelled)
            }
            Err(e) => return Err(WardenError::binding(request.id(), &e)),
        };
        if let Some(uri) = &request.uri {
            drush = drush.with_uri(uri.clone());
        }
        Ok(Target::new(request.alias.clone(), request.id(), drush))
    }
}

/// Build a target over an existing transport and binary prefix, skipping
/// resolution
#[must_use]
pub fn target_with_transport(
    request: &TargetRequest,
    transport: Arc<dyn Transport>,
    bin: &str,
) -> Target {
    let mut drush = Drush::from_resolved(transport, bin);
    if let Some(uri) = &request.uri {
        drush = drush.with_uri(uri.clone());
    }
    Target::new(request.alias.clone(), request.id(), drush)
}
