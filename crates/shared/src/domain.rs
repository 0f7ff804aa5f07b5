use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque server-assigned project identifier. Never parsed client-side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportKind {
    Installed,
    Unused,
    Security,
    GitDiff,
}

/// Vulnerability counts by severity, zero-defaulted. Severities the server
/// reports but we do not track (e.g. `info`) are ignored on deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VulnerabilitySummary {
    pub low: u64,
    pub moderate: u64,
    pub high: u64,
    pub critical: u64,
}

impl VulnerabilitySummary {
    pub fn total(&self) -> u64 {
        self.low + self.moderate + self.high + self.critical
    }
}
