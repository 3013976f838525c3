//! Assessments
//!
//! An [`Assessment`] is one target's run through an ordered policy list. It
//! moves through a validated lifecycle:
//!
//! ```text
//! Pending -> Running -> Completed
//!    |          |
//!    +----------+-----> Failed
//! ```
//!
//! Each policy is evaluated at most once. Results are append-only
//! [`AuditResponse`]s and feed the context later dependency expressions are
//! evaluated against.

use crate::check::{CheckContext, CheckRegistry};
use crate::error::{CheckError, ConfigurationError, StateError, WardenError};
use crate::expression::{resolve_dependency, ExpressionEvaluator};
use crate::outcome::Outcome;
use crate::policy::Policy;
use crate::severity::Severity;
use crate::target::Target;
use crate::tokens::TokenBag;
use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::Instrument;
use warden_remote::CancelSignal;

/// Token holding the error message of a check that failed to complete
pub const EXCEPTION_TOKEN: &str = "exception";

/// Longest reporting period accepted, ten years
pub const MAX_REPORTING_PERIOD_HOURS: u32 = 24 * 365 * 10;

/// Assessment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentState {
    /// Created, not started
    Pending,
    /// Policies are being evaluated
    Running,
    /// Every policy was attempted
    Completed,
    /// Target binding failed or the run was cancelled
    Failed,
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: AssessmentState) -> Vec<AssessmentState> {
    use AssessmentState::{Completed, Failed, Pending, Running};
    match from {
        Pending => vec![Running, Failed],
        Running => vec![Completed, Failed],
        Completed | Failed => vec![],
    }
}

/// Validate a lifecycle transition
///
/// # Errors
/// `StateError::IllegalTransition` when `to` is not reachable from `from`.
pub fn validate_transition(from: AssessmentState, to: AssessmentState) -> Result<(), StateError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateError::IllegalTransition { from, to })
    }
}

/// Time window an assessment reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportingPeriod {
    /// Inclusive start
    pub start: DateTime<Utc>,
    /// Exclusive end
    pub end: DateTime<Utc>,
}

impl ReportingPeriod {
    /// Create period
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Period of `hours` ending now
    ///
    /// # Errors
    /// `ConfigurationError::InvalidConfig` when `hours` exceeds
    /// [`MAX_REPORTING_PERIOD_HOURS`].
    pub fn ending_now(hours: u32) -> Result<Self, ConfigurationError> {
        let end = Utc::now();
        if hours > MAX_REPORTING_PERIOD_HOURS {
            return Err(out_of_range_period(hours));
        }
        let start = end
            .checked_sub_signed(Duration::hours(i64::from(hours)))
            .ok_or_else(|| out_of_range_period(hours))?;
        Ok(Self { start, end })
    }
}

/// Outcome of one policy against one target
#[derive(Debug, Clone, Serialize)]
pub struct AuditResponse {
    #[serde(rename = "policy", serialize_with = "policy_name")]
    policy: Arc<Policy>,
    outcome: Outcome,
    tokens: TokenBag,
}

fn policy_name<S: Serializer>(policy: &Arc<Policy>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(policy.name())
}

impl AuditResponse {
    /// Create response
    #[must_use]
    pub fn new(policy: Arc<Policy>, outcome: Outcome, tokens: TokenBag) -> Self {
        Self {
            policy,
            outcome,
            tokens,
        }
    }

    #[inline]
    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    #[inline]
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    #[inline]
    #[must_use]
    pub fn tokens(&self) -> &TokenBag {
        &self.tokens
    }

    /// Severity code this response contributes
    ///
    /// The policy severity for failures, `Error` for errors, 0 otherwise.
    #[must_use]
    pub fn severity_code(&self) -> u8 {
        if self.outcome.is_failure() {
            self.policy.severity().code()
        } else if self.outcome.has_error() {
            Severity::Error.code()
        } else {
            0
        }
    }
}

/// One target's assessment
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    uri: String,
    period: ReportingPeriod,
    state: AssessmentState,
    responses: Vec<AuditResponse>,
    severity: u8,
    #[serde(skip)]
    context: Map<String, Value>,
}

impl Assessment {
    /// Create a pending assessment
    #[must_use]
    pub fn new(uri: impl Into<String>, period: ReportingPeriod) -> Self {
        Self {
            uri: uri.into(),
            period,
            state: AssessmentState::Pending,
            responses: Vec::new(),
            severity: 0,
            context: Map::new(),
        }
    }

    /// Target identity
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    #[inline]
    #[must_use]
    pub fn period(&self) -> ReportingPeriod {
        self.period
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> AssessmentState {
        self.state
    }

    /// Responses in policy order
    #[inline]
    #[must_use]
    pub fn responses(&self) -> &[AuditResponse] {
        &self.responses
    }

    /// Response for a policy, if it was recorded
    #[must_use]
    pub fn response(&self, policy: &str) -> Option<&AuditResponse> {
        self.responses.iter().find(|r| r.policy.name() == policy)
    }

    /// Max of response severity codes, or 0
    #[inline]
    #[must_use]
    pub fn severity_code(&self) -> u8 {
        self.severity
    }

    /// Accumulated dependency-expression context
    #[must_use]
    pub fn context(&self) -> Value {
        Value::Object(self.context.clone())
    }

    fn transition(&mut self, to: AssessmentState) -> Result<(), StateError> {
        validate_transition(self.state, to)?;
        tracing::trace!(target_uri = %self.uri, from = ?self.state, ?to, "assessment transition");
        self.state = to;
        Ok(())
    }

    /// Mark as failed before any policy ran (e.g. target binding failed)
    ///
    /// # Errors
    /// `StateError::IllegalTransition` if already completed or failed.
    pub fn mark_failed(&mut self) -> Result<(), StateError> {
        self.transition(AssessmentState::Failed)
    }

    fn record(&mut self, response: AuditResponse) {
        let name = response.policy.name().to_string();
        let entry = json!({
            "outcome": response.outcome.as_str(),
            "successful": response.outcome.is_successful(),
            "tokens": response.tokens.to_json(),
        });
        if let Value::Object(policies) = self
            .context
            .entry("policies")
            .or_insert_with(|| Value::Object(Map::new()))
        {
            policies.insert(name, entry);
        }
        self.severity = self.severity.max(response.severity_code());
        self.responses.push(response);
    }

    /// Evaluate `policies` against `target`, in order
    ///
    /// Gate-failing policies are skipped without a response. A check error
    /// becomes an `Error` outcome carrying the message under the
    /// `exception` token. An assessment can be run at most once.
    ///
    /// # Errors
    /// - `WardenError::State` if the assessment is not pending
    /// - `WardenError::Cancelled` if the run was cancelled; the assessment is
    ///   left `Failed`
    pub async fn assess_target(
        &mut self,
        target: &Target,
        policies: &[Arc<Policy>],
        registry: &CheckRegistry,
        evaluator: &dyn ExpressionEvaluator,
        cancel: &CancelSignal,
    ) -> Result<(), WardenError> {
        self.transition(AssessmentState::Running)?;
        let span = tracing::info_span!("assessment", target = %self.uri);

        let result = self
            .run_policies(target, policies, registry, evaluator, cancel)
            .instrument(span)
            .await;

        match result {
            Ok(()) => self.transition(AssessmentState::Completed)?,
            Err(_) => self.transition(AssessmentState::Failed)?,
        }
        result
    }

    async fn run_policies(
        &mut self,
        target: &Target,
        policies: &[Arc<Policy>],
        registry: &CheckRegistry,
        evaluator: &dyn ExpressionEvaluator,
        cancel: &CancelSignal,
    ) -> Result<(), WardenError> {
        for policy in policies {
            if cancel.is_cancelled() {
                tracing::info!("assessment cancelled before {}", policy.name());
                return Err(WardenError::Cancelled);
            }

            if !self.dependencies_met(policy, evaluator) {
                continue;
            }

            let Some(check) = registry.get(policy.class()) else {
                tracing::error!(policy = %policy.name(), class = %policy.class(), "check class not registered");
                let mut tokens = TokenBag::new();
                tokens.set(EXCEPTION_TOKEN, format!("unknown check class: {}", policy.class()));
                self.record(AuditResponse::new(Arc::clone(policy), Outcome::Error, tokens));
                continue;
            };

            tracing::debug!(policy = %policy.name(), "auditing policy");
            let context = self.context();
            let mut ctx = CheckContext::new(target, policy.parameters(), &context, evaluator);
            let (outcome, tokens) = match check.audit(&mut ctx).await {
                Ok(outcome) => (outcome, ctx.into_tokens()),
                Err(e) if cancel.is_cancelled() || is_cancellation(&e) => {
                    tracing::info!(policy = %policy.name(), "check interrupted by cancellation: {e}");
                    return Err(WardenError::Cancelled);
                }
                Err(e) => {
                    tracing::error!(
                        target_uri = %target.uri(),
                        policy = %policy.name(),
                        "{} failed: {e}",
                        policy.name()
                    );
                    let mut tokens = ctx.into_tokens();
                    tokens.set(EXCEPTION_TOKEN, e.to_string());
                    (Outcome::Error, tokens)
                }
            };
            tracing::debug!(policy = %policy.name(), %outcome, "policy evaluated");
            self.record(AuditResponse::new(Arc::clone(policy), outcome, tokens));
        }
        Ok(())
    }

    fn dependencies_met(&self, policy: &Policy, evaluator: &dyn ExpressionEvaluator) -> bool {
        let context = self.context();
        for expression in policy.depends() {
            match resolve_dependency(expression, &context, evaluator) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(
                        policy = %policy.name(),
                        "skipping policy: dependency `{expression}` not met"
                    );
                    return false;
                }
                Err(e) => {
                    tracing::warn!(
                        policy = %policy.name(),
                        "skipping policy: dependency could not be evaluated: {e}"
                    );
                    return false;
                }
            }
        }
        true
    }
}

fn out_of_range_period(hours: u32) -> ConfigurationError {
    ConfigurationError::InvalidConfig(format!(
        "reporting period of {hours} hours exceeds {MAX_REPORTING_PERIOD_HOURS}"
    ))
}

fn is_cancellation(err: &CheckError) -> bool {
    matches!(err, CheckError::Remote(e) if e.is_cancelled())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_transitions() {
        use AssessmentState::{Completed, Failed, Pending, Running};
        assert!(validate_transition(Pending, Running).is_ok());
        assert!(validate_transition(Running, Completed).is_ok());
        assert!(validate_transition(Running, Failed).is_ok());
        assert!(validate_transition(Pending, Failed).is_ok());
        assert!(validate_transition(Pending, Completed).is_err());
        assert!(validate_transition(Completed, Running).is_err());
        assert!(validate_transition(Failed, Running).is_err());
    }

    #[test]
    fn new_assessment_is_pending_and_clean() {
        let a = Assessment::new("https://a.example", ReportingPeriod::ending_now(24).unwrap());
        assert_eq!(a.state(), AssessmentState::Pending);
        assert_eq!(a.severity_code(), 0);
        assert!(a.responses().is_empty());
        assert_eq!(a.period().end - a.period().start, Duration::hours(24));
    }

    #[test]
    fn oversized_reporting_period_is_an_error() {
        assert!(ReportingPeriod::ending_now(MAX_REPORTING_PERIOD_HOURS).is_ok());
        for hours in [MAX_REPORTING_PERIOD_HOURS + 1, u32::MAX] {
            assert!(matches!(
                ReportingPeriod::ending_now(hours),
                Err(ConfigurationError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn failed_assessment_cannot_fail_again() {
        let mut a = Assessment::new("x", ReportingPeriod::ending_now(1).unwrap());
        a.mark_failed().unwrap();
        assert!(matches!(
            a.mark_failed(),
            Err(StateError::IllegalTransition { .. })
        ));
    }
}
