//! Policy severity levels

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How much a failing policy matters
///
/// Variants are declared in ascending order, so the derived ordering matches
/// the integer codes.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; never contributes to the exit code
    None,
    /// Low
    Low,
    /// Normal (policy default)
    #[default]
    Normal,
    /// High
    High,
    /// Critical
    Critical,
    /// Reserved for checks that errored
    Error,
}

impl Severity {
    /// Integer code used for exit-code aggregation
    #[inline]
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::Normal => 2,
            Self::High => 4,
            Self::Critical => 8,
            Self::Error => 16,
        }
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
            Self::Error => "error",
        }
    }
}

impl FromStr for Severity {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            "error" => Ok(Self::Error),
            _ => Err(ConfigurationError::InvalidSeverity(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_ordering() {
        let ordered = [
            Severity::None,
            Severity::Low,
            Severity::Normal,
            Severity::High,
            Severity::Critical,
            Severity::Error,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].code() < pair[1].code());
        }
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Critical".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!(" low ".parse::<Severity>().unwrap(), Severity::Low);
        assert!(matches!(
            "urgent".parse::<Severity>(),
            Err(ConfigurationError::InvalidSeverity(_))
        ));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let sev: Severity = serde_yaml::from_str("high").unwrap();
        assert_eq!(sev, Severity::High);
        assert_eq!(serde_json::to_string(&Severity::None).unwrap(), "\"none\"");
    }
}
