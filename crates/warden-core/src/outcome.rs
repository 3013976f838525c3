//! Audit outcome taxonomy
//!
//! Every check reports through [`Outcome`]. All classification predicates are
//! pure functions of the tag; the integer codes are the stable wire form.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Result of evaluating one policy against one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Policy passed
    Success,
    /// Policy failed
    Failure,
    /// Non-assertive information
    Notice,
    /// Passed with a warning
    Warning,
    /// Failed with a warning
    WarningFail,
    /// Check did not complete
    Error,
    /// Policy does not apply to the target
    NotApplicable,
    /// Result should be omitted from the assessment
    Irrelevant,
}

impl Outcome {
    /// Every outcome, in wire-code declaration order
    pub const ALL: [Self; 8] = [
        Self::Success,
        Self::Failure,
        Self::Notice,
        Self::Warning,
        Self::WarningFail,
        Self::Error,
        Self::NotApplicable,
        Self::Irrelevant,
    ];

    /// Stable integer code
    #[inline]
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 1,
            Self::Failure => 0,
            Self::Notice => 2,
            Self::Warning => 4,
            Self::WarningFail => 8,
            Self::Error => 16,
            Self::NotApplicable => -1,
            Self::Irrelevant => -2,
        }
    }

    /// Position in the severity ordering, lowest first
    #[inline]
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Irrelevant => 0,
            Self::NotApplicable => 1,
            Self::Success => 2,
            Self::Notice => 3,
            Self::Warning => 4,
            Self::Failure => 5,
            Self::WarningFail => 6,
            Self::Error => 7,
        }
    }

    /// Success, Notice or Warning
    #[inline]
    #[must_use]
    pub fn is_successful(self) -> bool {
        matches!(self, Self::Success | Self::Notice | Self::Warning)
    }

    /// Failed, with or without a warning; errors excluded
    #[inline]
    #[must_use]
    pub fn is_failure(self) -> bool {
        !self.is_successful() && !self.is_irrelevant() && !self.is_not_applicable() && !self.has_error()
    }

    /// Notice
    #[inline]
    #[must_use]
    pub fn is_notice(self) -> bool {
        self == Self::Notice
    }

    /// Warning, successful or not
    #[inline]
    #[must_use]
    pub fn has_warning(self) -> bool {
        matches!(self, Self::Warning | Self::WarningFail)
    }

    /// Error
    #[inline]
    #[must_use]
    pub fn has_error(self) -> bool {
        self == Self::Error
    }

    /// Not applicable
    #[inline]
    #[must_use]
    pub fn is_not_applicable(self) -> bool {
        self == Self::NotApplicable
    }

    /// Irrelevant
    #[inline]
    #[must_use]
    pub fn is_irrelevant(self) -> bool {
        self == Self::Irrelevant
    }

    /// Lowercase tag name, as exposed to dependency expressions
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::WarningFail => "warning_fail",
            Self::Error => "error",
            Self::NotApplicable => "not_applicable",
            Self::Irrelevant => "irrelevant",
        }
    }

    /// Fixed human description
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "The policy successfully passed the audit.",
            Self::Failure => "The policy failed to pass the audit.",
            Self::Notice => "The audit returned non-assertive information",
            Self::NotApplicable => "The audit was not applicable to the target",
            Self::Warning => "The audit returned success with a warning",
            Self::WarningFail => "The audit returned failure with a warning",
            Self::Error => "The audit did not complete and returned an error",
            Self::Irrelevant => {
                "The audit that is irrelevant to the assessment and should be omitted"
            }
        }
    }
}

impl TryFrom<i32> for Outcome {
    type Error = ConfigurationError;

    fn try_from(code: i32) -> Result<Self, ConfigurationError> {
        Self::ALL
            .into_iter()
            .find(|o| o.code() == code)
            .ok_or(ConfigurationError::InvalidOutcomeCode(code))
    }
}

impl From<Outcome> for i32 {
    fn from(outcome: Outcome) -> Self {
        outcome.code()
    }
}

impl PartialOrd for Outcome {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Outcome {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_outcome() -> impl Strategy<Value = Outcome> {
        prop::sample::select(Outcome::ALL.to_vec())
    }

    #[test]
    fn wire_codes_round_trip() {
        for outcome in Outcome::ALL {
            assert_eq!(Outcome::try_from(outcome.code()).unwrap(), outcome);
        }
    }

    #[test]
    fn unknown_code_is_configuration_error() {
        let err = Outcome::try_from(3).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidOutcomeCode(3)));
    }

    #[test]
    fn severity_ordering() {
        let mut all = Outcome::ALL.to_vec();
        all.sort();
        assert_eq!(
            all,
            vec![
                Outcome::Irrelevant,
                Outcome::NotApplicable,
                Outcome::Success,
                Outcome::Notice,
                Outcome::Warning,
                Outcome::Failure,
                Outcome::WarningFail,
                Outcome::Error,
            ]
        );
    }

    #[test]
    fn failure_classification() {
        assert!(Outcome::Failure.is_failure());
        assert!(Outcome::WarningFail.is_failure());
        assert!(!Outcome::Warning.is_failure());
        assert!(!Outcome::Error.is_failure());
        assert!(Outcome::Warning.is_successful());
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&Outcome::WarningFail).unwrap();
        assert_eq!(json, "\"warning_fail\"");
        assert_eq!(Outcome::NotApplicable.to_string(), "not_applicable");
    }

    proptest! {
        #[test]
        fn non_error_outcomes_are_partitioned(outcome in any_outcome()) {
            let classes = [
                outcome.is_successful(),
                outcome.is_failure(),
                outcome.is_not_applicable(),
                outcome.is_irrelevant(),
            ];
            let held = classes.iter().filter(|c| **c).count();
            if outcome.has_error() {
                prop_assert_eq!(held, 0);
            } else {
                prop_assert_eq!(held, 1);
            }
        }

        #[test]
        fn warning_implies_applicable(outcome in any_outcome()) {
            prop_assert!(!outcome.has_warning() || !outcome.is_not_applicable());
        }
    }
}
