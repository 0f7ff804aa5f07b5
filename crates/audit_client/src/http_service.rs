use anyhow::Result;
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use shared::{
    domain::ProjectId,
    protocol::{AuditRun, ProjectArchive, ProjectSummary, ReportSet, UploadOutcome},
};
use tracing::debug;

use crate::AuditService;

/// `AuditService` backed by the audit server's REST API.
pub struct HttpAuditService {
    http: Client,
    server_url: String,
}

impl HttpAuditService {
    pub fn new(server_url: impl Into<String>) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            server_url,
        }
    }
}

#[async_trait]
impl AuditService for HttpAuditService {
    async fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let projects: Vec<ProjectSummary> = self
            .http
            .get(format!("{}/api/projects", self.server_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(count = projects.len(), "listed projects");
        Ok(projects)
    }

    async fn fetch_reports(&self, project: &ProjectId) -> Result<ReportSet> {
        let reports: ReportSet = self
            .http
            .get(format!(
                "{}/api/projects/{}/reports",
                self.server_url, project
            ))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reports)
    }

    async fn run_audit(&self, project: &ProjectId) -> Result<AuditRun> {
        let run: AuditRun = self
            .http
            .post(format!("{}/api/projects/{}/audit", self.server_url, project))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(run)
    }

    async fn uninstall_package(&self, project: &ProjectId, package: &str) -> Result<String> {
        // The confirmation body is plain text, not JSON.
        let confirmation = self
            .http
            .post(format!(
                "{}/api/projects/{}/uninstall/{}",
                self.server_url, project, package
            ))
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(confirmation)
    }

    async fn upload_project(&self, archive: ProjectArchive) -> Result<UploadOutcome> {
        let part = Part::bytes(archive.bytes).file_name(archive.filename);
        let form = Form::new().part("projectFile", part);
        let outcome: UploadOutcome = self
            .http
            .post(format!("{}/api/projects/upload", self.server_url))
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
#[path = "tests/http_service_tests.rs"]
mod tests;
