use super::*;
use axum::{
    extract::{Multipart, Path},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use shared::domain::ReportKind;
use tokio::net::TcpListener;

async fn list_projects_route() -> Json<Vec<ProjectSummary>> {
    Json(vec![ProjectSummary {
        id: ProjectId::new("demo-app"),
        name: "demo-app".to_string(),
    }])
}

async fn reports_route(Path(id): Path<String>) -> Json<ReportSet> {
    Json(ReportSet {
        installed: Some(format!(
            "{id}@1.0.0\n\u{251c}\u{2500}\u{2500} express@4.18.2\n\u{2514}\u{2500}\u{2500} lodash@4.17.21\n"
        )),
        unused: Some("{\"dependencies\": [\"lodash\"]}".to_string()),
        security: Some("{\"metadata\":{\"vulnerabilities\":{\"moderate\":1}}}".to_string()),
        git_diff: None,
    })
}

async fn audit_route(Path(id): Path<String>) -> Json<serde_json::Value> {
    Json(json!({ "logs": { "project": id, "steps": ["npm ls", "depcheck", "npm audit"] } }))
}

async fn uninstall_route(Path((id, package)): Path<(String, String)>) -> String {
    format!("{package} removed from {id}")
}

async fn upload_route(mut multipart: Multipart) -> Json<UploadOutcome> {
    let mut filename = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("projectFile") {
            filename = field.file_name().map(|name| name.to_string());
            let _ = field.bytes().await;
        }
    }
    Json(UploadOutcome {
        success: filename.is_some(),
        project: filename.map(|name| ProjectSummary {
            id: ProjectId::new("uploaded-1"),
            name,
        }),
    })
}

async fn spawn_audit_server() -> anyhow::Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/api/projects", get(list_projects_route))
        .route("/api/projects/upload", post(upload_route))
        .route("/api/projects/:id/reports", get(reports_route))
        .route("/api/projects/:id/audit", post(audit_route))
        .route("/api/projects/:id/uninstall/:package", post(uninstall_route));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

#[tokio::test]
async fn lists_projects_from_rest_route() {
    let server_url = spawn_audit_server().await.expect("spawn server");
    let service = HttpAuditService::new(server_url);

    let projects = service.list_projects().await.expect("list projects");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0].id, ProjectId::new("demo-app"));
}

#[tokio::test]
async fn fetches_reports_keyed_by_kind() {
    let server_url = spawn_audit_server().await.expect("spawn server");
    let service = HttpAuditService::new(format!("{server_url}/"));

    let reports = service
        .fetch_reports(&ProjectId::new("demo-app"))
        .await
        .expect("fetch reports");
    assert!(reports
        .get(ReportKind::Installed)
        .is_some_and(|raw| raw.starts_with("demo-app@1.0.0")));
    assert!(reports.get(ReportKind::GitDiff).is_none());
    assert!(!reports.is_empty());
}

#[tokio::test]
async fn run_audit_returns_opaque_logs() {
    let server_url = spawn_audit_server().await.expect("spawn server");
    let service = HttpAuditService::new(server_url);

    let run = service
        .run_audit(&ProjectId::new("demo-app"))
        .await
        .expect("run audit");
    assert_eq!(run.logs["project"], "demo-app");
}

#[tokio::test]
async fn uninstall_returns_plain_text_confirmation() {
    let server_url = spawn_audit_server().await.expect("spawn server");
    let service = HttpAuditService::new(server_url);

    let confirmation = service
        .uninstall_package(&ProjectId::new("demo-app"), "lodash")
        .await
        .expect("uninstall");
    assert_eq!(confirmation, "lodash removed from demo-app");
}

#[tokio::test]
async fn upload_posts_multipart_archive() {
    let server_url = spawn_audit_server().await.expect("spawn server");
    let service = HttpAuditService::new(server_url);

    let outcome = service
        .upload_project(ProjectArchive {
            filename: "my-app.zip".to_string(),
            bytes: b"PK\x03\x04fake-zip".to_vec(),
        })
        .await
        .expect("upload");
    assert!(outcome.success);
    let project = outcome.project.expect("project");
    assert_eq!(project.id, ProjectId::new("uploaded-1"));
    assert_eq!(project.name, "my-app.zip");
}
