//! Concurrent multi-target orchestrator
//!
//! Runs one assessment per target in parallel:
//! - One tokio task per target, gated by a semaphore (`max_concurrency`)
//! - Each task supervised so a panic becomes a failure for that target only
//! - Results collected by target identity through a single mpsc receiver
//! - Cooperative cancellation through a shared [`CancelSignal`]

use crate::assessment::{Assessment, ReportingPeriod};
use crate::check::CheckRegistry;
use crate::config::RunConfig;
use crate::error::WardenError;
use crate::expression::{ExpressionEvaluator, TokenExpression};
use crate::manager::AssessmentManager;
use crate::policy::Policy;
use crate::target::{TargetFactory, TargetRequest};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::Instrument;
use ulid::Ulid;
use warden_remote::CancelSignal;

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Run statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Units of work that began assessing
    pub started: usize,
    /// Assessments completed and aggregated
    pub completed: usize,
    /// Units that failed (binding, panic, internal)
    pub failed: usize,
    /// Units cancelled before or during assessment
    pub cancelled: usize,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// Run identifier
    pub run_id: RunId,
    /// Completed assessments
    pub assessments: AssessmentManager,
    /// Counters
    pub stats: RunStats,
    /// `(target, error message)` for every excluded target
    pub failures: Vec<(String, String)>,
    /// Severity-weighted exit code
    pub exit_code: i32,
}

type UnitResult = (String, Result<Assessment, WardenError>);

/// Runs assessments for many targets concurrently
pub struct Orchestrator {
    config: RunConfig,
    registry: Arc<CheckRegistry>,
    factory: Arc<dyn TargetFactory>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    cancel: CancelSignal,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create orchestrator with the built-in expression evaluator
    #[must_use]
    pub fn new(config: RunConfig, registry: Arc<CheckRegistry>, factory: Arc<dyn TargetFactory>) -> Self {
        Self {
            config,
            registry,
            factory,
            evaluator: Arc::new(TokenExpression),
            cancel: CancelSignal::new(),
        }
    }

    /// With a custom dependency expression evaluator
    #[inline]
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// With an externally owned cancellation signal
    #[inline]
    #[must_use]
    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Signal shared by every unit of work; cancel it to stop the run
    #[inline]
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Run configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Assess every target against `policies`
    ///
    /// `on_complete` is called once per completed assessment, in completion
    /// order. Failed and cancelled targets are logged and excluded from the
    /// aggregate. A target repeated in `targets` is assessed once.
    pub async fn run<F>(
        &self,
        policies: Vec<Arc<Policy>>,
        targets: Vec<TargetRequest>,
        period: ReportingPeriod,
        mut on_complete: F,
    ) -> RunOutcome
    where
        F: FnMut(&Assessment),
    {
        let run_id = RunId::new();
        let span = tracing::info_span!("run", %run_id);
        self.run_inner(run_id, policies, targets, period, &mut on_complete)
            .instrument(span)
            .await
    }

    async fn run_inner<F>(
        &self,
        run_id: RunId,
        policies: Vec<Arc<Policy>>,
        mut targets: Vec<TargetRequest>,
        period: ReportingPeriod,
        on_complete: &mut F,
    ) -> RunOutcome
    where
        F: FnMut(&Assessment),
    {
        let mut seen = HashSet::new();
        targets.retain(|request| {
            let first = seen.insert(request.id().to_string());
            if !first {
                tracing::warn!(target_uri = %request.id(), "dropping repeated target");
            }
            first
        });

        let policies: Arc<[Arc<Policy>]> = policies.into();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let started = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel::<UnitResult>(targets.len().max(1));

        tracing::info!(
            targets = targets.len(),
            policies = policies.len(),
            max_concurrency = self.config.max_concurrency,
            "starting run"
        );

        for request in targets {
            let unit = Unit {
                request,
                policies: Arc::clone(&policies),
                period,
                registry: Arc::clone(&self.registry),
                factory: Arc::clone(&self.factory),
                evaluator: Arc::clone(&self.evaluator),
                cancel: self.cancel.clone(),
                semaphore: Arc::clone(&semaphore),
                started: Arc::clone(&started),
            };
            tokio::spawn(supervise(unit, tx.clone()).in_current_span());
        }
        drop(tx);

        let mut manager = AssessmentManager::new();
        let mut stats = RunStats::default();
        let mut failures = Vec::new();

        while let Some((id, result)) = rx.recv().await {
            match result {
                Ok(assessment) => {
                    tracing::info!(target_uri = %id, severity = assessment.severity_code(), "assessment completed");
                    on_complete(&assessment);
                    manager.add_assessment(assessment);
                    stats.completed += 1;
                }
                Err(e) if e.is_cancelled() => {
                    tracing::warn!(target_uri = %id, "assessment cancelled");
                    stats.cancelled += 1;
                    failures.push((id, e.to_string()));
                }
                Err(e) => {
                    tracing::error!(target_uri = %id, "Assessment of {id} failed: {e}");
                    stats.failed += 1;
                    failures.push((id, e.to_string()));
                }
            }
        }
        stats.started = started.load(Ordering::SeqCst);

        let exit_code = manager.exit_code(self.config.exit_on_severity);
        tracing::info!(
            completed = stats.completed,
            failed = stats.failed,
            cancelled = stats.cancelled,
            exit_code,
            "run finished"
        );

        RunOutcome {
            run_id,
            assessments: manager,
            stats,
            failures,
            exit_code,
        }
    }
}

/// One target's unit of work and the shared state it needs
struct Unit {
    request: TargetRequest,
    policies: Arc<[Arc<Policy>]>,
    period: ReportingPeriod,
    registry: Arc<CheckRegistry>,
    factory: Arc<dyn TargetFactory>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    cancel: CancelSignal,
    semaphore: Arc<Semaphore>,
    started: Arc<AtomicUsize>,
}

/// Run `unit` in its own task and report its result, converting a panic
/// into a failure for that target
async fn supervise(unit: Unit, tx: mpsc::Sender<UnitResult>) {
    let id = unit.request.id().to_string();
    let worker = tokio::spawn(execute(unit).in_current_span());

    let result = match worker.await {
        Ok(result) => result,
        Err(join) if join.is_panic() => Err(WardenError::Internal(format!(
            "assessment of {id} panicked"
        ))),
        Err(join) => Err(WardenError::Internal(join.to_string())),
    };

    if tx.send((id, result)).await.is_err() {
        tracing::debug!("result collector gone");
    }
}

async fn execute(unit: Unit) -> Result<Assessment, WardenError> {
    let _permit = Arc::clone(&unit.semaphore)
        .acquire_owned()
        .await
        .map_err(|_| WardenError::Internal("worker pool closed".to_string()))?;

    if unit.cancel.is_cancelled() {
        return Err(WardenError::Cancelled);
    }
    unit.started.fetch_add(1, Ordering::SeqCst);

    let id = unit.request.id();
    tracing::info!(target_uri = id, "Evaluating {id}.");

    let mut assessment = Assessment::new(id, unit.period);
    let target = match unit.factory.create(&unit.request, &unit.cancel).await {
        Ok(target) => target,
        Err(e) => {
            assessment.mark_failed()?;
            return Err(e);
        }
    };

    assessment
        .assess_target(
            &target,
            &unit.policies,
            &unit.registry,
            unit.evaluator.as_ref(),
            &unit.cancel,
        )
        .await?;
    Ok(assessment)
}
