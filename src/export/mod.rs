//! Server-side export jobs: tracking notifications, download history, one-shot download.

mod download;
mod history;
mod store;

pub use download::{export_and_download, PollPolicy};
pub use history::{DownloadHistory, HISTORY_LIMIT};
pub use store::{
    NotificationListener, NotificationStore, SilentListener, SoundCue, StartOutcome,
};

use crate::error::Result;
use crate::models::{ExportFile, ExportRequest, ExportStart, ExportStatusReport};
use std::future::Future;

/// The export endpoints, as seen by the store and the download helper.
pub trait ExportBackend: Send + Sync + 'static {
    fn start_export(
        &self,
        request: &ExportRequest,
    ) -> impl Future<Output = Result<ExportStart>> + Send;

    fn check_status(
        &self,
        data_type: &str,
        task_id: &str,
    ) -> impl Future<Output = Result<ExportStatusReport>> + Send;

    fn cancel_export(&self, data_type: &str, task_id: &str) -> impl Future<Output = Result<()>> + Send;

    fn fetch_file(&self, url: &str) -> impl Future<Output = Result<ExportFile>> + Send;
}
