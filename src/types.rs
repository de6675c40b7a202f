use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Lifecycle of an uploaded spreadsheet as driven by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Processing,
    Preview,
    Saved,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Processing => "processing",
            UploadStatus::Preview => "preview",
            UploadStatus::Saved => "saved",
            UploadStatus::Completed => "completed",
            UploadStatus::Failed => "failed",
        }
    }

    /// Unknown server strings are treated as not yet processed.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "processing" => UploadStatus::Processing,
            "preview" => UploadStatus::Preview,
            "saved" => UploadStatus::Saved,
            "completed" => UploadStatus::Completed,
            "failed" | "error" => UploadStatus::Failed,
            _ => UploadStatus::Pending,
        }
    }

    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        match (self, next) {
            (Pending, Processing) => true,
            (Processing, Preview) => true,
            (Preview, Processing) | (Preview, Saved) => true,
            (Saved, Completed) => true,
            (Failed, Processing) => true,
            (Completed, _) | (Failed, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: i64,
    pub invoice_number: String,
    pub file_name: String,
    pub size: Option<u64>,
    pub upload_date: Option<String>,
    pub status: UploadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl UploadedFile {
    /// Build from an invoice record; `None` when the record has no usable id.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id").and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        })?;
        let text = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let file_name = text("file_name")
            .or_else(|| {
                text("file").map(|f| f.rsplit('/').next().unwrap_or_default().to_string())
            })
            .unwrap_or_default();
        Some(Self {
            id,
            invoice_number: text("invoice_number").unwrap_or_default(),
            file_name,
            size: value
                .get("file_size")
                .or_else(|| value.get("size"))
                .and_then(|v| v.as_u64()),
            upload_date: text("upload_date").or_else(|| text("created_at")),
            status: text("status")
                .map(|s| UploadStatus::parse(&s))
                .unwrap_or(UploadStatus::Pending),
            file_type: text("file_type"),
        })
    }
}

/// Row and column counts reported alongside a preview.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryData {
    pub row_count: u64,
    pub column_count: u64,
    pub columns: Vec<String>,
}

impl SummaryData {
    fn from_value(value: Option<&Value>, preview: &[Map<String, Value>]) -> Self {
        let columns_from_preview = || {
            preview
                .first()
                .map(|row| row.keys().cloned().collect::<Vec<_>>())
                .unwrap_or_default()
        };
        let Some(value) = value else {
            let columns = columns_from_preview();
            return Self {
                row_count: preview.len() as u64,
                column_count: columns.len() as u64,
                columns,
            };
        };
        let columns: Vec<String> = value
            .get("columns")
            .and_then(|c| c.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|c| c.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_else(columns_from_preview);
        Self {
            row_count: value
                .get("row_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(preview.len() as u64),
            column_count: value
                .get("column_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(columns.len() as u64),
            columns,
        }
    }
}

/// Keep only object rows out of whatever array-ish payload the server sent.
pub fn rows_from_value(value: Option<&Value>) -> Vec<Map<String, Value>> {
    let Some(value) = value else {
        return Vec::new();
    };
    let array = value
        .as_array()
        .or_else(|| value.get("results").and_then(|r| r.as_array()))
        .or_else(|| value.get("data").and_then(|r| r.as_array()));
    array
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r.as_object().cloned())
                .collect()
        })
        .unwrap_or_default()
}

/// Server-side inspection of an uploaded file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InspectResult {
    pub detected_file_type: Option<String>,
    pub file_name: Option<String>,
    pub preview_data: Vec<Map<String, Value>>,
    pub detection_confidence: Option<f64>,
    pub summary: SummaryData,
}

impl InspectResult {
    pub fn from_value(value: &Value) -> Self {
        let preview_data = rows_from_value(value.get("preview_data"));
        let summary = SummaryData::from_value(value.get("summary_data"), &preview_data);
        Self {
            detected_file_type: value
                .get("detected_file_type")
                .or_else(|| value.get("file_type"))
                .and_then(|v| v.as_str())
                .map(String::from)
                .filter(|s| !s.trim().is_empty()),
            file_name: value
                .get("file_name")
                .and_then(|v| v.as_str())
                .map(String::from),
            preview_data,
            detection_confidence: value.get("detection_confidence").and_then(|v| v.as_f64()),
            summary,
        }
    }

    pub fn headers(&self) -> Vec<String> {
        if !self.summary.columns.is_empty() {
            return self.summary.columns.clone();
        }
        self.preview_data
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Cleaning rules sent with a process request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessOptions {
    #[serde(rename = "processingMode")]
    pub processing_mode: String,
    pub treatment: String,
    #[serde(rename = "fileType")]
    pub file_type: String,
    pub remove_duplicates: bool,
    pub handle_missing: bool,
    pub filters: Map<String, Value>,
}

impl ProcessOptions {
    pub fn for_file_type(file_type: &str) -> Self {
        Self {
            processing_mode: "automatic".to_string(),
            treatment: "standard".to_string(),
            file_type: file_type.to_string(),
            remove_duplicates: true,
            handle_missing: true,
            filters: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessResult {
    pub preview_data: Vec<Map<String, Value>>,
    pub summary: SummaryData,
    pub message: Option<String>,
}

impl ProcessResult {
    pub fn from_value(value: &Value) -> Self {
        let preview_data = {
            let rows = rows_from_value(value.get("preview_data"));
            if rows.is_empty() {
                rows_from_value(value.get("data"))
            } else {
                rows
            }
        };
        let summary = SummaryData::from_value(value.get("summary_data"), &preview_data);
        Self {
            preview_data,
            summary,
            message: value
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveRequest {
    pub file_type: String,
    pub map_fields: bool,
    pub field_mapping: Map<String, Value>,
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveResult {
    pub saved_rows: u64,
    pub message: Option<String>,
}

impl SaveResult {
    pub fn from_value(value: &Value) -> Self {
        let saved_rows = ["saved_count", "rows_saved", "count"]
            .iter()
            .find_map(|k| value.get(*k).and_then(|v| v.as_u64()))
            .unwrap_or(0);
        Self {
            saved_rows,
            message: value
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from),
        }
    }
}
