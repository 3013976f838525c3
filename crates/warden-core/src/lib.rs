//! Warden Core - remote policy assessment engine
//!
//! The engine that:
//! - Classifies every policy result through a closed outcome taxonomy
//! - Reconciles declarative policies with the checks that implement them
//! - Runs one assessment per target, gating policies on dependency expressions
//! - Orchestrates many targets concurrently and folds their results into a
//!   severity-weighted exit code
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_core::prelude::*;
//!
//! # async fn example(policies: Vec<Arc<Policy>>) -> Result<(), WardenError> {
//! let config = RunConfig::new().with_exit_on_severity(Some(Severity::High));
//! let factory = Arc::new(DrushTargetFactory::new(config.transport.clone(), config.command_timeout()));
//! let orchestrator = Orchestrator::new(config, Arc::new(CheckRegistry::with_builtins()), factory);
//!
//! let targets = plan_targets("@site.prod", &[], &[]);
//! let outcome = orchestrator
//!     .run(policies, targets, ReportingPeriod::ending_now(24)?, |_| {})
//!     .await;
//! std::process::exit(outcome.exit_code);
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod assessment;
pub mod check;
pub mod checks;
pub mod config;
pub mod error;
pub mod expression;
pub mod manager;
pub mod orchestrator;
pub mod outcome;
pub mod params;
pub mod policy;
pub mod profile;
pub mod severity;
pub mod target;
pub mod tokens;

// Re-exports for convenience
pub use assessment::{
    Assessment, AssessmentState, AuditResponse, ReportingPeriod, EXCEPTION_TOKEN,
    MAX_REPORTING_PERIOD_HOURS,
};
pub use check::{Check, CheckContext, CheckMetadata, CheckRegistry, ParameterSpec};
pub use config::{RunConfig, TransportConfig};
pub use error::{CheckError, ConfigurationError, StateError, WardenError};
pub use expression::{match_constraint, resolve_dependency, ExpressionEvaluator, TokenExpression};
pub use manager::{exit_code_for, AssessmentManager, EXIT_INVALID_TARGET};
pub use orchestrator::{Orchestrator, RunId, RunOutcome, RunStats};
pub use outcome::Outcome;
pub use params::{merge_parameter_defaults, ParameterWarning, Parameters};
pub use policy::{Policy, PolicyDefinition, PolicyExport, PolicyLibrary, PolicyType};
pub use profile::{Profile, ProfilePolicy, ProfileSelection};
pub use severity::Severity;
pub use target::{plan_targets, DrushTargetFactory, Target, TargetFactory, TargetRequest};
pub use tokens::{TokenBag, TokenNotFound};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Warden Core
    pub use crate::{
        plan_targets, Check, CheckContext, CheckError, CheckMetadata, CheckRegistry,
        DrushTargetFactory, Orchestrator, Outcome, Policy, PolicyDefinition, ReportingPeriod,
        RunConfig, Severity, TargetRequest, WardenError,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
