use super::ExportBackend;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::filename::{ensure_extension, export_file_name, filename_from_url};
use crate::models::{ExportFile, ExportRequest, ExportStart, ExportStatus};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often and how long the one-shot helper asks for status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }
}

impl PollPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.poll_interval,
            max_attempts: settings.poll_max_attempts,
        }
    }
}

fn download_name(request: &ExportRequest, file: &ExportFile, url: Option<&str>) -> String {
    let today = Utc::now().date_naive();
    if file.content_disposition.is_some() {
        return export_file_name(
            &request.data_type,
            request.format,
            today,
            file.content_disposition.as_deref(),
        );
    }
    match url.and_then(filename_from_url) {
        Some(name) => ensure_extension(&name, request.format),
        None => export_file_name(&request.data_type, request.format, today, None),
    }
}

async fn save(dest_dir: &Path, name: &str, file: &ExportFile) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dest_dir).await?;
    let path = dest_dir.join(name);
    tokio::fs::write(&path, &file.bytes).await?;
    info!(path = %path.display(), bytes = file.bytes.len(), "export saved");
    Ok(path)
}

/// Submit an export, wait for it, and write the file into `dest_dir`.
///
/// Polls at most `policy.max_attempts` times. A failed status check still
/// counts as an attempt.
pub async fn export_and_download<B: ExportBackend>(
    backend: &B,
    request: &ExportRequest,
    policy: PollPolicy,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let task_id = match backend.start_export(request).await? {
        ExportStart::File(file) => {
            let name = download_name(request, &file, None);
            return save(dest_dir, &name, &file).await;
        }
        ExportStart::Task { task_id, .. } => task_id,
    };
    info!(task_id = %task_id, data_type = %request.data_type, "export queued, polling");

    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;

        let report = match backend.check_status(&request.data_type, &task_id).await {
            Ok(report) => report,
            Err(e) => {
                warn!(attempt, error = %e, "status check failed");
                continue;
            }
        };

        match report.status.unwrap_or(ExportStatus::Processing) {
            ExportStatus::Processing => {
                debug!(attempt, progress = ?report.progress, "export still processing");
            }
            ExportStatus::Completed => {
                let url = report.file_url.ok_or_else(|| {
                    Error::ExportFailed("Export finished without a file to download".to_string())
                })?;
                let file = backend.fetch_file(&url).await?;
                let name = download_name(request, &file, Some(&url));
                return save(dest_dir, &name, &file).await;
            }
            ExportStatus::Failed => {
                return Err(Error::ExportFailed(
                    report.error.unwrap_or_else(|| "Export failed".to_string()),
                ));
            }
            ExportStatus::Cancelled => return Err(Error::ExportCancelled),
        }
    }

    Err(Error::ExportTimeout {
        attempts: policy.max_attempts,
    })
}
