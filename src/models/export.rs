use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Excel,
    Csv,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Excel => "excel",
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Excel => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "excel" | "xlsx" | "xls" => Ok(ExportFormat::Excel),
            "csv" => Ok(ExportFormat::Csv),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("Unknown export format: {}", other)),
        }
    }
}

/// What the user asked to export. Kept on failed notifications so the job can be re-dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub data_type: String,
    pub format: ExportFormat,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl ExportRequest {
    pub fn new(data_type: impl Into<String>, format: ExportFormat) -> Self {
        Self {
            data_type: data_type.into(),
            format,
            filters: BTreeMap::new(),
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ExportStatus {
    /// Server status strings vary between revisions; anything unrecognised is still running.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "completed" | "complete" | "success" | "succeeded" | "done" => ExportStatus::Completed,
            "failed" | "failure" | "error" => ExportStatus::Failed,
            "cancelled" | "canceled" => ExportStatus::Cancelled,
            _ => ExportStatus::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExportStatus::Processing)
    }
}

/// One answer from the export status endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExportStatusReport {
    pub status: Option<ExportStatus>,
    pub progress: Option<u8>,
    pub file_url: Option<String>,
    pub remaining_time: Option<u64>,
    pub row_count: Option<u64>,
    pub error: Option<String>,
}

impl ExportStatusReport {
    pub fn processing(progress: u8) -> Self {
        Self {
            status: Some(ExportStatus::Processing),
            progress: Some(progress),
            ..Default::default()
        }
    }

    pub fn completed(file_url: impl Into<String>) -> Self {
        Self {
            status: Some(ExportStatus::Completed),
            progress: Some(100),
            file_url: Some(file_url.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(ExportStatus::Failed),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Lenient parse: numbers may arrive as strings, fields may be missing.
    pub fn from_value(value: &Value) -> Self {
        let status = value
            .get("status")
            .and_then(|s| s.as_str())
            .map(ExportStatus::parse);
        let progress = number_field(value, "progress").map(|p| p.clamp(0.0, 100.0).round() as u8);
        let file_url = value
            .get("file_url")
            .or_else(|| value.get("download_url"))
            .and_then(|u| u.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let remaining_time = number_field(value, "remaining_time")
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64);
        let row_count = number_field(value, "row_count")
            .filter(|n| *n >= 0.0)
            .map(|n| n as u64);
        let error = value
            .get("error")
            .or_else(|| value.get("message"))
            .and_then(|e| e.as_str())
            .map(String::from)
            .filter(|s| !s.is_empty());
        Self {
            status,
            progress,
            file_url,
            remaining_time,
            row_count,
            error,
        }
    }
}

fn number_field(value: &Value, key: &str) -> Option<f64> {
    let v = value.get(key)?;
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

/// A file body returned directly by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportFile {
    pub content_disposition: Option<String>,
    pub bytes: Vec<u8>,
}

/// Outcome of submitting an export: either the file itself or a job to follow.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportStart {
    Task {
        task_id: String,
        message: Option<String>,
    },
    File(ExportFile),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationAction {
    Download { url: String },
    Retry { request: ExportRequest },
}

pub type NotificationId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportNotification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub progress: u8,
    pub status: ExportStatus,
    pub task_id: Option<String>,
    /// Seconds, as estimated by the server.
    pub remaining_time: Option<u64>,
    pub file_url: Option<String>,
    pub filters: BTreeMap<String, String>,
    pub row_count: Option<u64>,
    pub request: Option<ExportRequest>,
    pub action: Option<NotificationAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExportNotification {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_cancel(&self) -> bool {
        !self.is_terminal() && self.task_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Completed,
    Failed,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Completed => "completed",
            HistoryStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadHistoryItem {
    pub id: u64,
    pub filename: String,
    pub file_url: Option<String>,
    pub file_size: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub format: ExportFormat,
    pub status: HistoryStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_report_parses_loose_shapes() {
        let report = ExportStatusReport::from_value(&json!({
            "status": "processing",
            "progress": "40",
            "remaining_time": 12,
            "row_count": 5000
        }));
        assert_eq!(report.status, Some(ExportStatus::Processing));
        assert_eq!(report.progress, Some(40));
        assert_eq!(report.remaining_time, Some(12));
        assert_eq!(report.row_count, Some(5000));
        assert_eq!(report.file_url, None);
    }

    #[test]
    fn test_status_report_clamps_progress_and_drops_blank_url() {
        let report = ExportStatusReport::from_value(&json!({
            "status": "completed",
            "progress": 140,
            "file_url": "  "
        }));
        assert_eq!(report.status, Some(ExportStatus::Completed));
        assert_eq!(report.progress, Some(100));
        assert_eq!(report.file_url, None);
    }

    #[test]
    fn test_unknown_status_keeps_polling() {
        assert_eq!(ExportStatus::parse("queued"), ExportStatus::Processing);
        assert_eq!(ExportStatus::parse("Canceled"), ExportStatus::Cancelled);
        assert!(!ExportStatus::Processing.is_terminal());
        assert!(ExportStatus::Failed.is_terminal());
    }

    #[test]
    fn test_export_format_aliases() {
        assert_eq!("xlsx".parse::<ExportFormat>().unwrap(), ExportFormat::Excel);
        assert_eq!(ExportFormat::Excel.extension(), "xlsx");
        assert!("docx".parse::<ExportFormat>().is_err());
    }
}
