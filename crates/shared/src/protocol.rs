use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ProjectId, ReportKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: ProjectId,
    pub name: String,
}

/// Raw per-project reports, keyed by kind. Every field may be absent; the
/// server replaces the whole set after each audit, there is no merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unused: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,
    #[serde(
        rename = "gitDiff",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub git_diff: Option<String>,
}

impl ReportSet {
    pub fn is_empty(&self) -> bool {
        self.installed.is_none()
            && self.unused.is_none()
            && self.security.is_none()
            && self.git_diff.is_none()
    }

    pub fn get(&self, kind: ReportKind) -> Option<&str> {
        match kind {
            ReportKind::Installed => self.installed.as_deref(),
            ReportKind::Unused => self.unused.as_deref(),
            ReportKind::Security => self.security.as_deref(),
            ReportKind::GitDiff => self.git_diff.as_deref(),
        }
    }
}

/// Result of a single audit invocation. The log payload is opaque and
/// display-only; the refreshed reports are fetched separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub logs: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<ProjectSummary>,
}

/// An archive chosen for upload. The server extracts it and registers the
/// contained package.json project; the core treats the bytes as opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectArchive {
    pub filename: String,
    pub bytes: Vec<u8>,
}
