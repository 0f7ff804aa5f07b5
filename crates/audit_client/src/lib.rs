//! Workflow controller for the npm audit dashboard.
//!
//! Owns the client-visible state (selected project, raw reports, last audit
//! log, busy flags, last error) and sequences the asynchronous operations
//! against the audit server: selection triggers a report load, a successful
//! uninstall chains a full re-audit, an upload refreshes the project list
//! and selects the new project. Derived metrics are recomputed on read from
//! the raw reports via the `reports` crate.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use shared::{
    domain::{ProjectId, VulnerabilitySummary},
    protocol::{AuditRun, ProjectArchive, ProjectSummary, ReportSet, UploadOutcome},
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

pub mod http_service;
pub use http_service::HttpAuditService;

const AUDIT_FAILED_MESSAGE: &str = "audit failed";
const UPLOAD_FAILED_MESSAGE: &str = "project upload failed";
const PROJECT_LIST_FAILED_MESSAGE: &str = "could not load the project list";
const SELECT_PROJECT_MESSAGE: &str = "select a project before running an audit";
const ENTER_PACKAGE_NAME_MESSAGE: &str = "enter a package name to uninstall";
const CHOOSE_ARCHIVE_MESSAGE: &str = "choose a project archive to upload";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("no project selected")]
    NoProjectSelected,
    #[error("package name must not be empty")]
    EmptyPackageName,
    #[error("no project archive chosen for upload")]
    MissingArchive,
    #[error("{operation} failed")]
    Transport {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl WorkflowError {
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Transport { .. })
    }
}

/// The external audit service the controller sequences calls against.
/// Transport, extraction, and tool invocation all live behind this seam.
#[async_trait]
pub trait AuditService: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>>;
    async fn fetch_reports(&self, project: &ProjectId) -> Result<ReportSet>;
    async fn run_audit(&self, project: &ProjectId) -> Result<AuditRun>;
    async fn uninstall_package(&self, project: &ProjectId, package: &str) -> Result<String>;
    async fn upload_project(&self, archive: ProjectArchive) -> Result<UploadOutcome>;
}

pub struct MissingAuditService;

#[async_trait]
impl AuditService for MissingAuditService {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        Err(anyhow!("audit service is unavailable"))
    }

    async fn fetch_reports(&self, project: &ProjectId) -> Result<ReportSet> {
        Err(anyhow!("audit service is unavailable for project {project}"))
    }

    async fn run_audit(&self, project: &ProjectId) -> Result<AuditRun> {
        Err(anyhow!("audit service is unavailable for project {project}"))
    }

    async fn uninstall_package(&self, project: &ProjectId, _package: &str) -> Result<String> {
        Err(anyhow!("audit service is unavailable for project {project}"))
    }

    async fn upload_project(&self, _archive: ProjectArchive) -> Result<UploadOutcome> {
        Err(anyhow!("audit service is unavailable"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusyFlags {
    pub listing: bool,
    pub auditing: bool,
    pub uninstalling: bool,
    pub uploading: bool,
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    ProjectsRefreshed(Vec<ProjectSummary>),
    SelectionChanged(Option<ProjectId>),
    ReportsReplaced,
    AuditFinished,
    UninstallFinished { package: String },
    UploadCompleted { project: ProjectSummary },
    Error(String),
}

/// Point-in-time copy of the controller state for rendering.
#[derive(Debug, Clone, Default)]
pub struct ControllerSnapshot {
    pub projects: Vec<ProjectSummary>,
    pub selected_project: Option<ProjectId>,
    pub reports: ReportSet,
    pub last_logs: Option<Value>,
    pub pending_package_input: String,
    pub busy: BusyFlags,
    pub last_error: Option<String>,
    pub last_uninstall_message: Option<String>,
}

/// Metrics derived from the current raw reports. Recomputed on every read;
/// the normalizers are cheap and pure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardSummary {
    pub dependency_count: usize,
    pub unused_packages: Vec<String>,
    pub vulnerabilities: VulnerabilitySummary,
    pub has_git_diff: bool,
}

#[derive(Default)]
struct ControllerState {
    projects: Vec<ProjectSummary>,
    selected_project: Option<ProjectId>,
    // Bumped on every selection change; report responses carrying an older
    // epoch are discarded on arrival.
    selection_epoch: u64,
    reports: ReportSet,
    last_logs: Option<Value>,
    pending_package_input: String,
    pending_upload: Option<ProjectArchive>,
    busy: BusyFlags,
    last_error: Option<String>,
    last_uninstall_message: Option<String>,
}

pub struct AuditController {
    service: Arc<dyn AuditService>,
    inner: Mutex<ControllerState>,
    // Serializes audit-triggering operations; an in-flight audit's report
    // overwrite must not race an uninstall's own chained audit.
    audit_gate: Mutex<()>,
    events: broadcast::Sender<ControllerEvent>,
}

impl AuditController {
    pub fn new(service: Arc<dyn AuditService>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            service,
            inner: Mutex::new(ControllerState::default()),
            audit_gate: Mutex::new(()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ControllerEvent) {
        let _ = self.events.send(event);
    }

    /// Replaces the known project list. Called at start-up and again after a
    /// successful upload.
    pub async fn refresh_projects(&self) -> Result<Vec<ProjectSummary>, WorkflowError> {
        {
            let mut guard = self.inner.lock().await;
            guard.busy.listing = true;
        }
        let result = self.service.list_projects().await;
        let mut guard = self.inner.lock().await;
        guard.busy.listing = false;
        match result {
            Ok(projects) => {
                guard.projects = projects.clone();
                drop(guard);
                self.emit(ControllerEvent::ProjectsRefreshed(projects.clone()));
                Ok(projects)
            }
            Err(source) => {
                warn!("project list refresh failed: {source:#}");
                guard.last_error = Some(PROJECT_LIST_FAILED_MESSAGE.to_string());
                drop(guard);
                self.emit(ControllerEvent::Error(PROJECT_LIST_FAILED_MESSAGE.to_string()));
                Err(WorkflowError::Transport {
                    operation: "list projects",
                    source,
                })
            }
        }
    }

    /// Selects a project (or deselects with `None`) and loads its reports.
    ///
    /// The previous report set and audit log are cleared up front; stale
    /// data must never be shown for a different project. The dependent
    /// report load is awaited here so callers observe a settled state.
    pub async fn select_project(&self, project: Option<ProjectId>) {
        let epoch = {
            let mut guard = self.inner.lock().await;
            guard.selected_project = project.clone();
            guard.selection_epoch += 1;
            guard.reports = ReportSet::default();
            guard.last_logs = None;
            guard.selection_epoch
        };
        self.emit(ControllerEvent::SelectionChanged(project.clone()));

        if let Some(project) = project {
            self.load_reports(&project, epoch).await;
        }
    }

    async fn load_reports(&self, project: &ProjectId, epoch: u64) {
        let fetched = match self.service.fetch_reports(project).await {
            Ok(fetched) => fetched,
            Err(err) => {
                // An unaudited project legitimately has no reports yet, so
                // a failed fetch is not surfaced as an error.
                debug!(project = %project, "report fetch failed, keeping empty set: {err:#}");
                return;
            }
        };

        let mut guard = self.inner.lock().await;
        if guard.selection_epoch != epoch {
            debug!(project = %project, "discarding stale report response");
            return;
        }
        guard.reports = fetched;
        drop(guard);
        self.emit(ControllerEvent::ReportsReplaced);
    }

    /// Runs an audit for the selected project and refreshes its reports.
    ///
    /// The report refetch is awaited before the audit counts as finished;
    /// its failure is tolerated silently and never clobbers the fresh logs.
    pub async fn run_audit(&self) -> Result<(), WorkflowError> {
        let _gate = self.audit_gate.lock().await;
        self.run_audit_locked().await
    }

    /// Audit body, caller holds `audit_gate`.
    async fn run_audit_locked(&self) -> Result<(), WorkflowError> {
        let (project, epoch, previous_logs) = {
            let mut guard = self.inner.lock().await;
            let Some(project) = guard.selected_project.clone() else {
                guard.last_error = Some(SELECT_PROJECT_MESSAGE.to_string());
                return Err(WorkflowError::NoProjectSelected);
            };
            guard.busy.auditing = true;
            guard.last_error = None;
            let previous_logs = guard.last_logs.take();
            (project, guard.selection_epoch, previous_logs)
        };

        info!(project = %project, "audit: starting");
        let run = match self.service.run_audit(&project).await {
            Ok(run) => run,
            Err(source) => {
                warn!(project = %project, "audit: run failed: {source:#}");
                let mut guard = self.inner.lock().await;
                guard.busy.auditing = false;
                if guard.selection_epoch == epoch {
                    guard.last_error = Some(AUDIT_FAILED_MESSAGE.to_string());
                    // No partial overwrite: the pre-audit log stays visible.
                    guard.last_logs = previous_logs;
                    drop(guard);
                    self.emit(ControllerEvent::Error(AUDIT_FAILED_MESSAGE.to_string()));
                } else {
                    // Selection moved on mid-flight; restoring the old
                    // project's logs or error would show stale data.
                    debug!(project = %project, "audit: selection moved on, failure state discarded");
                }
                return Err(WorkflowError::Transport {
                    operation: "run audit",
                    source,
                });
            }
        };

        {
            let mut guard = self.inner.lock().await;
            if guard.selection_epoch == epoch {
                guard.last_logs = Some(run.logs);
            }
        }

        match self.service.fetch_reports(&project).await {
            Ok(fetched) => {
                let mut guard = self.inner.lock().await;
                if guard.selection_epoch == epoch {
                    guard.reports = fetched;
                    guard.busy.auditing = false;
                    drop(guard);
                    self.emit(ControllerEvent::ReportsReplaced);
                } else {
                    debug!(project = %project, "audit: selection moved on, reports discarded");
                    guard.busy.auditing = false;
                }
            }
            Err(err) => {
                warn!(project = %project, "audit: report refresh failed: {err:#}");
                self.inner.lock().await.busy.auditing = false;
            }
        }

        info!(project = %project, "audit: finished");
        self.emit(ControllerEvent::AuditFinished);
        Ok(())
    }

    /// Uninstalls a package from the selected project, then chains exactly
    /// one full audit so the metrics reflect the removal. The chained audit
    /// (including its report refresh) completes before this returns.
    pub async fn uninstall(&self, package_name: &str) -> Result<(), WorkflowError> {
        let package = package_name.trim().to_string();
        if package.is_empty() {
            let mut guard = self.inner.lock().await;
            guard.last_uninstall_message = Some(ENTER_PACKAGE_NAME_MESSAGE.to_string());
            return Err(WorkflowError::EmptyPackageName);
        }

        let _gate = self.audit_gate.lock().await;
        let project = {
            let mut guard = self.inner.lock().await;
            let Some(project) = guard.selected_project.clone() else {
                guard.last_error = Some(SELECT_PROJECT_MESSAGE.to_string());
                return Err(WorkflowError::NoProjectSelected);
            };
            guard.busy.uninstalling = true;
            guard.last_error = None;
            project
        };

        match self.service.uninstall_package(&project, &package).await {
            Ok(confirmation) => {
                info!(project = %project, package = %package, "uninstall: confirmed");
                {
                    let mut guard = self.inner.lock().await;
                    guard.last_uninstall_message = Some(confirmation);
                    guard.pending_package_input.clear();
                    guard.busy.uninstalling = false;
                }
                self.emit(ControllerEvent::UninstallFinished {
                    package: package.clone(),
                });
                self.run_audit_locked().await
            }
            Err(source) => {
                warn!(project = %project, package = %package, "uninstall failed: {source:#}");
                let message = format!("uninstall of {package} failed");
                let mut guard = self.inner.lock().await;
                guard.busy.uninstalling = false;
                guard.last_error = Some(message.clone());
                drop(guard);
                self.emit(ControllerEvent::Error(message));
                Err(WorkflowError::Transport {
                    operation: "uninstall package",
                    source,
                })
            }
        }
    }

    /// Uploads the pending archive, refreshes the project list, and selects
    /// the newly created project. On any failure the project list and the
    /// current selection are left untouched.
    pub async fn upload_project(&self) -> Result<ProjectSummary, WorkflowError> {
        let archive = {
            let mut guard = self.inner.lock().await;
            match guard.pending_upload.clone() {
                Some(archive) => {
                    guard.busy.uploading = true;
                    guard.last_error = None;
                    archive
                }
                None => {
                    guard.last_error = Some(CHOOSE_ARCHIVE_MESSAGE.to_string());
                    return Err(WorkflowError::MissingArchive);
                }
            }
        };

        info!(filename = %archive.filename, "upload: starting");
        let project = match self.service.upload_project(archive).await {
            Ok(UploadOutcome {
                success: true,
                project: Some(project),
            }) => project,
            Ok(_) => {
                return self
                    .fail_upload(anyhow!("server rejected the project archive"))
                    .await
            }
            Err(source) => return self.fail_upload(source).await,
        };

        // The known-project set changed; refresh it before selecting so the
        // selection always refers to a listed project.
        let projects = match self.service.list_projects().await {
            Ok(projects) => projects,
            Err(source) => return self.fail_upload(source).await,
        };
        {
            let mut guard = self.inner.lock().await;
            guard.projects = projects.clone();
        }
        self.emit(ControllerEvent::ProjectsRefreshed(projects));

        // Dependent report load included; a fresh project has no reports
        // yet, so this settles on an empty set.
        self.select_project(Some(project.id.clone())).await;

        {
            let mut guard = self.inner.lock().await;
            guard.pending_upload = None;
            guard.busy.uploading = false;
        }
        info!(project = %project.id, name = %project.name, "upload: completed");
        self.emit(ControllerEvent::UploadCompleted {
            project: project.clone(),
        });
        Ok(project)
    }

    async fn fail_upload(&self, source: anyhow::Error) -> Result<ProjectSummary, WorkflowError> {
        warn!("upload failed: {source:#}");
        {
            let mut guard = self.inner.lock().await;
            guard.busy.uploading = false;
            guard.last_error = Some(UPLOAD_FAILED_MESSAGE.to_string());
        }
        self.emit(ControllerEvent::Error(UPLOAD_FAILED_MESSAGE.to_string()));
        Err(WorkflowError::Transport {
            operation: "upload project",
            source,
        })
    }

    pub async fn set_package_input(&self, value: impl Into<String>) {
        self.inner.lock().await.pending_package_input = value.into();
    }

    pub async fn set_upload_archive(&self, archive: Option<ProjectArchive>) {
        self.inner.lock().await.pending_upload = archive;
    }

    pub async fn clear_uninstall_message(&self) {
        self.inner.lock().await.last_uninstall_message = None;
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let guard = self.inner.lock().await;
        ControllerSnapshot {
            projects: guard.projects.clone(),
            selected_project: guard.selected_project.clone(),
            reports: guard.reports.clone(),
            last_logs: guard.last_logs.clone(),
            pending_package_input: guard.pending_package_input.clone(),
            busy: guard.busy,
            last_error: guard.last_error.clone(),
            last_uninstall_message: guard.last_uninstall_message.clone(),
        }
    }

    /// Derives the dashboard metrics from the current raw reports.
    pub async fn dashboard_summary(&self) -> DashboardSummary {
        let current = { self.inner.lock().await.reports.clone() };
        summarize(&current)
    }
}

/// Normalizes a raw report set into dashboard metrics.
pub fn summarize(set: &ReportSet) -> DashboardSummary {
    DashboardSummary {
        dependency_count: reports::dependency_count(set.installed.as_deref()),
        unused_packages: reports::unused_packages(set.unused.as_deref()),
        vulnerabilities: reports::vulnerability_summary(set.security.as_deref()),
        has_git_diff: set.git_diff.is_some(),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
