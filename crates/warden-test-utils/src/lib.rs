//! Testing utilities for the Warden workspace
//!
//! Shared fixtures: a scripted transport that records every command, scripted
//! checks with invocation counters, policy builders and a target factory
//! with per-target failure injection.

#![allow(missing_docs)]

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use warden_core::target::target_with_transport;
use warden_core::{
    Check, CheckContext, CheckError, CheckMetadata, CheckRegistry, Outcome, ParameterSpec, Policy,
    PolicyDefinition, Target, TargetFactory, TargetRequest, WardenError,
};
use warden_remote::{CancelSignal, Transport, TransportError};

/// Scripted reply for a command
#[derive(Debug, Clone)]
pub enum Reply {
    /// Successful output
    Output(String),
    /// Non-zero exit
    Failed { code: i32, stderr: String },
    /// Timed out
    Timeout,
    /// Wait until the signal fires, then report cancellation
    BlockUntilCancelled(CancelSignal),
}

#[derive(Debug)]
struct Rule {
    needle: String,
    reply: Reply,
}

/// Transport answering commands from a script, recording what was sent
///
/// Rules match by substring, first match wins. Unmatched commands fail with
/// exit code 127.
#[derive(Debug, Default)]
pub struct MockTransport {
    rules: Mutex<Vec<Rule>>,
    commands: Mutex<Vec<String>>,
    latency: Option<Duration>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport that resolves drush to a plain `drush` binary
    #[must_use]
    pub fn with_drush() -> Self {
        Self::new()
            .on("which ", Reply::Output("/usr/local/bin/drush\n".to_string()))
            .on("head -1", Reply::Output("#!/bin/sh\n".to_string()))
    }

    /// Add a rule
    #[must_use]
    pub fn on(self, needle: impl Into<String>, reply: Reply) -> Self {
        self.rules.lock().push(Rule {
            needle: needle.into(),
            reply,
        });
        self
    }

    /// Add a rule answering with `output`
    #[must_use]
    pub fn respond(self, needle: impl Into<String>, output: impl Into<String>) -> Self {
        self.on(needle, Reply::Output(output.into()))
    }

    /// Add a rule answering with a sentinel-framed JSON payload behind noise
    #[must_use]
    pub fn respond_framed(self, needle: impl Into<String>, payload: &Value) -> Self {
        let output = format!("Deprecated: noise\n__DSTART{payload}__DEND\n");
        self.on(needle, Reply::Output(output))
    }

    /// Delay every reply
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Commands sent so far
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Number of commands containing `needle`
    #[must_use]
    pub fn count(&self, needle: &str) -> usize {
        self.commands.lock().iter().filter(|c| c.contains(needle)).count()
    }

    fn reply_for(&self, command: &str) -> Option<Reply> {
        self.rules
            .lock()
            .iter()
            .find(|rule| command.contains(&rule.needle))
            .map(|rule| rule.reply.clone())
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, command: &str) -> Result<String, TransportError> {
        self.commands.lock().push(command.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match self.reply_for(command) {
            Some(Reply::Output(out)) => Ok(out),
            Some(Reply::Failed { code, stderr }) => Err(TransportError::CommandFailed {
                code: Some(code),
                stderr,
            }),
            Some(Reply::Timeout) => Err(TransportError::Timeout { timeout_secs: 1 }),
            Some(Reply::BlockUntilCancelled(signal)) => {
                signal.cancelled().await;
                Err(TransportError::Cancelled)
            }
            None => Err(TransportError::CommandFailed {
                code: Some(127),
                stderr: format!("unscripted command: {command}"),
            }),
        }
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

/// Check returning a fixed outcome and tokens, counting invocations
#[derive(Debug)]
pub struct StaticCheck {
    metadata: CheckMetadata,
    outcome: Outcome,
    tokens: Vec<(String, Value)>,
    calls: Arc<AtomicUsize>,
}

impl StaticCheck {
    #[must_use]
    pub fn new(name: &str, outcome: Outcome) -> Self {
        Self {
            metadata: CheckMetadata::new(name, "static test check"),
            outcome,
            tokens: Vec::new(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// With a token recorded on every run
    #[must_use]
    pub fn with_token(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.tokens.push((name.to_string(), value.into()));
        self
    }

    /// With a declared parameter
    #[must_use]
    pub fn with_parameter(mut self, spec: ParameterSpec) -> Self {
        self.metadata = self.metadata.with_parameter(spec);
        self
    }

    /// Shared invocation counter
    #[must_use]
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait::async_trait]
impl Check for StaticCheck {
    fn metadata(&self) -> &CheckMetadata {
        &self.metadata
    }

    async fn audit(&self, ctx: &mut CheckContext<'_>) -> Result<Outcome, CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for (name, value) in &self.tokens {
            ctx.set(name.clone(), value.clone());
        }
        Ok(self.outcome)
    }
}

/// Check that always errors
#[derive(Debug)]
pub struct FailingCheck {
    metadata: CheckMetadata,
    message: String,
}

impl FailingCheck {
    #[must_use]
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            metadata: CheckMetadata::new(name, "failing test check"),
            message: message.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Check for FailingCheck {
    fn metadata(&self) -> &CheckMetadata {
        &self.metadata
    }

    async fn audit(&self, _ctx: &mut CheckContext<'_>) -> Result<Outcome, CheckError> {
        Err(CheckError::Failed(self.message.clone()))
    }
}

/// Check that runs one drush status call, so it observes transport failures
#[derive(Debug)]
pub struct RemoteStatusCheck {
    metadata: CheckMetadata,
}

impl RemoteStatusCheck {
    pub const NAME: &'static str = "Test:RemoteStatus";

    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: CheckMetadata::new(Self::NAME, "drush status round trip"),
        }
    }
}

impl Default for RemoteStatusCheck {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Check for RemoteStatusCheck {
    fn metadata(&self) -> &CheckMetadata {
        &self.metadata
    }

    async fn audit(&self, ctx: &mut CheckContext<'_>) -> Result<Outcome, CheckError> {
        let status: Value = ctx
            .drush()
            .call(
                warden_remote::DrushCommand::Status,
                &[],
                warden_remote::DrushOptions::new().json(),
            )
            .run_json()
            .await?;
        ctx.set("status", status);
        Ok(Outcome::Success)
    }
}

/// Registry holding exactly `checks`
#[must_use]
pub fn registry_with(checks: Vec<Arc<dyn Check>>) -> CheckRegistry {
    let mut registry = CheckRegistry::new();
    for check in checks {
        registry.register(check);
    }
    registry
}

/// Build a shared policy from a definition
///
/// # Panics
/// If the definition's class is not registered.
#[must_use]
pub fn build_policy(def: PolicyDefinition, registry: &CheckRegistry) -> Arc<Policy> {
    let (policy, _) = Policy::from_definition(def, registry).expect("policy class registered");
    Arc::new(policy)
}

/// Policy named `name` backed by check `class`
#[must_use]
pub fn policy(name: &str, class: &str, registry: &CheckRegistry) -> Arc<Policy> {
    build_policy(PolicyDefinition::new(name, class), registry)
}

/// Builds a fresh target per request, failing or panicking on demand
#[derive(Default)]
pub struct StaticTargetFactory {
    unreachable: HashSet<String>,
    panicking: HashSet<String>,
    transport: Option<Arc<dyn Transport>>,
    created: AtomicUsize,
}

impl StaticTargetFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail binding for target `id`
    #[must_use]
    pub fn unreachable(mut self, id: &str) -> Self {
        self.unreachable.insert(id.to_string());
        self
    }

    /// Panic while binding target `id`
    #[must_use]
    pub fn panicking(mut self, id: &str) -> Self {
        self.panicking.insert(id.to_string());
        self
    }

    /// Share one transport between every created target
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Number of targets bound
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TargetFactory for StaticTargetFactory {
    async fn create(
        &self,
        request: &TargetRequest,
        _cancel: &CancelSignal,
    ) -> Result<Target, WardenError> {
        let id = request.id();
        if self.panicking.contains(id) {
            panic!("target factory exploded for {id}");
        }
        if self.unreachable.contains(id) {
            return Err(WardenError::TargetBinding {
                target: id.to_string(),
                reason: "no drush binary found".to_string(),
            });
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let transport = self
            .transport
            .clone()
            .unwrap_or_else(|| Arc::new(MockTransport::new()));
        Ok(target_with_transport(request, transport, "drush"))
    }
}

/// Target bound to `transport` with a resolved `drush` prefix
#[must_use]
pub fn target(uri: &str, transport: Arc<dyn Transport>) -> Target {
    target_with_transport(
        &TargetRequest::new("@test", Some(uri.to_string())),
        transport,
        "drush",
    )
}
