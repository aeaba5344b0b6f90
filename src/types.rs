//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// Which ICE candidates a session may use to connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateFilter {
    /// Any gathered candidate
    Any,
    /// Only TURN relay candidates
    Relay,
    /// Anything but host candidates (server-reflexive or relay)
    NotHost,
}

impl CandidateFilter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Relay => "relay",
            Self::NotHost => "not-host",
        }
    }
}

/// Terminal state of one test case run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    /// Ran to completion without error reports
    Passed,
    /// Ran to completion but reported at least one error
    Failed,
    /// Could not start; the session was never established
    Fatal,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Fatal => "FATAL",
        };
        f.write_str(label)
    }
}
