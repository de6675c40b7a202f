//! HTTP client for the back-office `/data` API.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::export::ExportBackend;
use crate::models::{ExportFile, ExportRequest, ExportStart, ExportStatusReport, FileType};
use crate::types::{
    rows_from_value, InspectResult, ProcessOptions, ProcessResult, SaveRequest, SaveResult,
    UploadedFile,
};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

const DUPLICATE_MARKER: &str = "UNIQUE constraint failed";

/// True when the server rejected rows because they already exist.
pub fn is_duplicate_error(err: &Error) -> bool {
    err.api_body().is_some_and(|b| b.contains(DUPLICATE_MARKER))
}

/// Run `op`; if it fails with a duplicate-key rejection, wait `delay` and run it exactly once more.
///
/// The backend is expected to upsert on the second call. Nothing verifies that, so a second
/// duplicate rejection surfaces as `Error::DuplicateRecord` instead of being retried again.
pub async fn retry_duplicate_once<T, F, Fut>(delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Err(e) if is_duplicate_error(&e) => {
            warn!(delay_ms = delay.as_millis() as u64, "duplicate rows rejected, retrying once");
            tokio::time::sleep(delay).await;
            match op().await {
                Err(e) if is_duplicate_error(&e) => Err(Error::DuplicateRecord(
                    e.api_body().unwrap_or_default().to_string(),
                )),
                other => other,
            }
        }
        other => other,
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    duplicate_retry_delay: Duration,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(concat!("billing-ingest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.api_url.trim_end_matches('/').to_string(),
            token: settings.api_token.clone(),
            duplicate_retry_delay: settings.duplicate_retry_delay,
        })
    }

    /// `/data/{path}` under the configured base URL.
    pub fn data_url(&self, path: &str) -> String {
        format!("{}/data/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Absolute URL for a file link that may be relative to the API host.
    pub fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => rb.header("Authorization", format!("Token {}", token)),
            None => rb,
        }
    }

    async fn send(&self, rb: RequestBuilder) -> Result<Response> {
        let response = self.authorize(rb).send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "api response");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json(&self, rb: RequestBuilder) -> Result<Value> {
        let response = self.send(rb).await?;
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn send_file(&self, rb: RequestBuilder) -> Result<ExportFile> {
        let response = self.send(rb).await?;
        let content_disposition = header_string(&response, CONTENT_DISPOSITION);
        let bytes = response.bytes().await?;
        Ok(ExportFile {
            content_disposition,
            bytes: bytes.to_vec(),
        })
    }

    pub async fn upload_invoice(
        &self,
        path: &Path,
        invoice_number: &str,
        file_type: Option<FileType>,
    ) -> Result<UploadedFile> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(format!("File not found: {}", path.display()))
            } else {
                Error::Io(e)
            }
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.xlsx")
            .to_string();
        let size = bytes.len();
        let mut form = Form::new()
            .text("invoice_number", invoice_number.to_string())
            .text("file_name", file_name.clone())
            .part("file", Part::bytes(bytes).file_name(file_name.clone()));
        if let Some(t) = file_type {
            form = form.text("file_type", t.as_str().to_string());
        }
        debug!(file = %file_name, size, "uploading");
        let value = self
            .send_json(self.client.post(self.data_url("invoices/upload/")).multipart(form))
            .await?;
        UploadedFile::from_value(&value)
            .ok_or_else(|| Error::Api {
                status: 200,
                body: format!("Upload response has no invoice id: {}", value),
            })
    }

    pub async fn list_invoices(&self) -> Result<Vec<UploadedFile>> {
        let value = self
            .send_json(self.client.get(self.data_url("invoices/")))
            .await?;
        Ok(rows_from_value(Some(&value))
            .iter()
            .filter_map(|row| UploadedFile::from_value(&Value::Object(row.clone())))
            .collect())
    }

    pub async fn inspect(&self, invoice_id: i64) -> Result<InspectResult> {
        let value = self
            .send_json(
                self.client
                    .get(self.data_url(&format!("invoices/{}/inspect/", invoice_id))),
            )
            .await?;
        Ok(InspectResult::from_value(&value))
    }

    pub async fn process(&self, invoice_id: i64, options: &ProcessOptions) -> Result<ProcessResult> {
        let value = self
            .send_json(
                self.client
                    .post(self.data_url(&format!("invoices/{}/process/", invoice_id)))
                    .json(options),
            )
            .await?;
        Ok(ProcessResult::from_value(&value))
    }

    /// Persist processed rows; a duplicate-key rejection is retried once.
    pub async fn save(&self, invoice_id: i64, request: &SaveRequest) -> Result<SaveResult> {
        let url = self.data_url(&format!("invoices/{}/save/", invoice_id));
        let url = url.as_str();
        retry_duplicate_once(self.duplicate_retry_delay, move || async move {
            let value = self
                .send_json(self.client.post(url).json(request))
                .await?;
            Ok(SaveResult::from_value(&value))
        })
        .await
    }

    pub async fn download_invoice(&self, invoice_id: i64) -> Result<ExportFile> {
        self.send_file(
            self.client
                .get(self.data_url(&format!("invoices/{}/download/", invoice_id))),
        )
        .await
    }

    pub async fn delete_invoice(&self, invoice_id: i64) -> Result<()> {
        self.send(
            self.client
                .delete(self.data_url(&format!("invoices/{}/", invoice_id))),
        )
        .await?;
        Ok(())
    }

    /// Rows persisted for one file type, optionally restricted to one upload.
    pub async fn list_records(
        &self,
        file_type: FileType,
        invoice_id: Option<i64>,
    ) -> Result<Vec<Map<String, Value>>> {
        let Some(endpoint) = file_type.records_endpoint() else {
            return Ok(Vec::new());
        };
        let mut rb = self.client.get(self.data_url(&format!("{}/", endpoint)));
        if let Some(id) = invoice_id {
            rb = rb.query(&[("invoice", id.to_string())]);
        }
        let value = self.send_json(rb).await?;
        Ok(rows_from_value(Some(&value)))
    }

    fn export_url(&self, data_type: &str) -> String {
        self.data_url(&format!("export/{}/", data_type.trim_matches('/')))
    }
}

fn header_string(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

impl ExportBackend for ApiClient {
    async fn start_export(&self, request: &ExportRequest) -> Result<ExportStart> {
        let rb = self
            .client
            .get(self.export_url(&request.data_type))
            .query(&[("format", request.format.as_str())])
            .query(&request.filters);
        let response = self.send(rb).await?;
        let is_json = header_string(&response, CONTENT_TYPE)
            .is_some_and(|ct| ct.contains("application/json"));
        if !is_json {
            let content_disposition = header_string(&response, CONTENT_DISPOSITION);
            let bytes = response.bytes().await?;
            return Ok(ExportStart::File(ExportFile {
                content_disposition,
                bytes: bytes.to_vec(),
            }));
        }
        let value: Value = response.json().await?;
        let task_id = value
            .get("task_id")
            .and_then(|t| t.as_str().map(String::from).or_else(|| t.as_i64().map(|n| n.to_string())));
        match task_id {
            Some(task_id) => Ok(ExportStart::Task {
                task_id,
                message: value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(String::from),
            }),
            None => Err(Error::ExportFailed(
                value
                    .get("error")
                    .or_else(|| value.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or("Server did not return a file or a task id")
                    .to_string(),
            )),
        }
    }

    async fn check_status(&self, data_type: &str, task_id: &str) -> Result<ExportStatusReport> {
        let url = self.data_url(&format!("export/{}/status/", data_type.trim_matches('/')));
        let value = self
            .send_json(self.client.get(url).query(&[("task_id", task_id)]))
            .await?;
        Ok(ExportStatusReport::from_value(&value))
    }

    async fn cancel_export(&self, data_type: &str, task_id: &str) -> Result<()> {
        self.send(
            self.client
                .get(self.export_url(data_type))
                .query(&[("cancel", "true"), ("task_id", task_id)]),
        )
        .await?;
        Ok(())
    }

    async fn fetch_file(&self, url: &str) -> Result<ExportFile> {
        self.send_file(self.client.get(self.absolute_url(url))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn duplicate() -> Error {
        Error::Api {
            status: 400,
            body: "IntegrityError: UNIQUE constraint failed: ca_periodique.id".to_string(),
        }
    }

    #[test]
    fn test_urls() {
        let client = ApiClient::new(&Settings {
            api_url: "https://bo.example.dz".to_string(),
            ..Settings::default()
        })
        .unwrap();
        assert_eq!(
            client.data_url("/invoices/3/inspect/"),
            "https://bo.example.dz/data/invoices/3/inspect/"
        );
        assert_eq!(
            client.absolute_url("/media/exports/a.xlsx"),
            "https://bo.example.dz/media/exports/a.xlsx"
        );
        assert_eq!(client.absolute_url("https://cdn/x.pdf"), "https://cdn/x.pdf");
        assert_eq!(
            client.export_url("ca_periodique"),
            "https://bo.example.dz/data/export/ca_periodique/"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_is_retried_once() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = retry_duplicate_once(Duration::from_secs(1), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(duplicate())
            } else {
                Ok(7u32)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_duplicate_is_reported() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_duplicate_once(Duration::from_secs(1), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(duplicate())
        })
        .await;
        assert!(matches!(result, Err(Error::DuplicateRecord(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = retry_duplicate_once(Duration::from_secs(1), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Api {
                status: 500,
                body: "boom".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(Error::Api { status: 500, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
