use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use audit_client::{AuditController, DashboardSummary, HttpAuditService};
use clap::{Parser, Subcommand};
use shared::{
    domain::{ProjectId, ReportKind},
    protocol::ProjectArchive,
};

mod config;

#[derive(Parser, Debug)]
#[command(name = "audit-cli", about = "npm dependency audit client")]
struct Cli {
    /// Audit server base URL; overrides AUDIT_SERVER_URL and audit-cli.toml.
    #[arg(long)]
    server_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the projects known to the server.
    Projects,
    /// Print a project's raw reports.
    Reports { project: String },
    /// Run an audit, then print the log payload and refreshed metrics.
    Audit { project: String },
    /// Uninstall a package; the re-audit is chained automatically.
    Uninstall { project: String, package: String },
    /// Upload a project archive; the new project becomes selected.
    Upload { archive: PathBuf },
    /// Print the normalized metrics for a project's current reports.
    Summary { project: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();
    let settings = config::load_settings(cli.server_url.clone());
    tracing::debug!(server_url = %settings.server_url, "resolved settings");

    let service = Arc::new(HttpAuditService::new(settings.server_url));
    let controller = AuditController::new(service);

    match cli.command {
        Command::Projects => {
            for project in controller.refresh_projects().await? {
                println!("{}\t{}", project.id, project.name);
            }
        }
        Command::Reports { project } => {
            controller
                .select_project(Some(ProjectId::new(project)))
                .await;
            let snapshot = controller.snapshot().await;
            for kind in [
                ReportKind::Installed,
                ReportKind::Unused,
                ReportKind::Security,
                ReportKind::GitDiff,
            ] {
                println!("== {kind:?} ==");
                println!("{}", snapshot.reports.get(kind).unwrap_or("(no report)"));
            }
        }
        Command::Audit { project } => {
            controller
                .select_project(Some(ProjectId::new(project)))
                .await;
            controller.run_audit().await?;
            let snapshot = controller.snapshot().await;
            if let Some(logs) = snapshot.last_logs {
                println!("{}", serde_json::to_string_pretty(&logs)?);
            }
            print_summary(&controller.dashboard_summary().await);
        }
        Command::Uninstall { project, package } => {
            controller
                .select_project(Some(ProjectId::new(project)))
                .await;
            controller.uninstall(&package).await?;
            let snapshot = controller.snapshot().await;
            if let Some(message) = snapshot.last_uninstall_message {
                println!("{message}");
            }
            print_summary(&controller.dashboard_summary().await);
        }
        Command::Upload { archive } => {
            let bytes = std::fs::read(&archive)
                .with_context(|| format!("failed to read archive {}", archive.display()))?;
            let filename = archive
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project.zip".to_string());
            controller
                .set_upload_archive(Some(ProjectArchive { filename, bytes }))
                .await;
            let project = controller.upload_project().await?;
            println!("uploaded project {} ({})", project.name, project.id);
        }
        Command::Summary { project } => {
            controller
                .select_project(Some(ProjectId::new(project)))
                .await;
            print_summary(&controller.dashboard_summary().await);
        }
    }

    Ok(())
}

fn print_summary(summary: &DashboardSummary) {
    println!("installed dependencies: {}", summary.dependency_count);
    println!(
        "unused packages ({}): {}",
        summary.unused_packages.len(),
        summary.unused_packages.join(", ")
    );
    let vulns = summary.vulnerabilities;
    println!(
        "vulnerabilities ({}): critical={} high={} moderate={} low={}",
        vulns.total(),
        vulns.critical,
        vulns.high,
        vulns.moderate,
        vulns.low
    );
    if summary.has_git_diff {
        println!("git diff available (see the reports view)");
    }
}
