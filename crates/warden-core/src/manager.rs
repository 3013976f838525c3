//! Run-wide aggregation of completed assessments

use crate::assessment::{Assessment, AssessmentState};
use crate::severity::Severity;
use indexmap::IndexMap;
use serde::Serialize;

/// Exit code when targets or policies cannot be constructed
pub const EXIT_INVALID_TARGET: i32 = 114;

/// Exit code for a set of severity codes and an optional threshold
///
/// Without a threshold the exit code is always 0. Otherwise it is the maximum
/// severity code when that reaches the threshold's code, else 0.
#[must_use]
pub fn exit_code_for(severities: impl IntoIterator<Item = u8>, threshold: Option<Severity>) -> i32 {
    let Some(threshold) = threshold else {
        return 0;
    };
    let max = severities.into_iter().max().unwrap_or(0);
    if max >= threshold.code() {
        i32::from(max)
    } else {
        0
    }
}

/// Completed assessments keyed by target URI
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct AssessmentManager {
    assessments: IndexMap<String, Assessment>,
}

impl AssessmentManager {
    /// Create empty manager
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a completed assessment
    ///
    /// Returns `false` (and drops it) if the assessment is not completed.
    pub fn add_assessment(&mut self, assessment: Assessment) -> bool {
        if assessment.state() != AssessmentState::Completed {
            tracing::warn!(target_uri = assessment.uri(), state = ?assessment.state(), "refusing incomplete assessment");
            return false;
        }
        self.assessments.insert(assessment.uri().to_string(), assessment);
        true
    }

    /// Look up by target URI
    #[inline]
    #[must_use]
    pub fn get(&self, uri: &str) -> Option<&Assessment> {
        self.assessments.get(uri)
    }

    /// Iterate assessments
    pub fn iter(&self) -> impl Iterator<Item = &Assessment> {
        self.assessments.values()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.assessments.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty()
    }

    /// Max severity code across assessments, or 0
    #[must_use]
    pub fn max_severity(&self) -> u8 {
        self.iter().map(Assessment::severity_code).max().unwrap_or(0)
    }

    /// Exit code for the run
    #[must_use]
    pub fn exit_code(&self, threshold: Option<Severity>) -> i32 {
        exit_code_for(self.iter().map(Assessment::severity_code), threshold)
    }
}

impl<'a> IntoIterator for &'a AssessmentManager {
    type Item = &'a Assessment;
    type IntoIter = indexmap::map::Values<'a, String, Assessment>;

    fn into_iter(self) -> Self::IntoIter {
        self.assessments.values()
    }
}
