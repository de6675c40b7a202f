#![allow(dead_code)]

use billing_ingest::error::{Error, Result};
use billing_ingest::export::{ExportBackend, NotificationListener, SoundCue};
use billing_ingest::models::{
    ExportFile, ExportFormat, ExportNotification, ExportRequest, ExportStart, ExportStatusReport,
    NotificationId,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub enum Step {
    Report(ExportStatusReport),
    Fail(u16),
}

/// In-process export endpoints answering from a script.
#[derive(Default)]
pub struct ScriptedBackend {
    immediate: Option<ExportFile>,
    steps: Mutex<VecDeque<Step>>,
    latency: Duration,
    file: ExportFile,
    pub start_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub cancel_calls: AtomicUsize,
    pub fetched: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// Queues a job; status checks answer from `steps`, then "processing" forever.
    pub fn with_steps(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            file: ExportFile {
                content_disposition: None,
                bytes: b"col_a,col_b\n1,2\n".to_vec(),
            },
            ..Default::default()
        }
    }

    pub fn with_reports(reports: Vec<ExportStatusReport>) -> Self {
        Self::with_steps(reports.into_iter().map(Step::Report).collect())
    }

    /// Answers the export request with the file itself.
    pub fn immediate(file: ExportFile) -> Self {
        Self {
            immediate: Some(file),
            ..Default::default()
        }
    }

    /// Each status check takes this long to answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_file(mut self, file: ExportFile) -> Self {
        self.file = file;
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

impl ExportBackend for ScriptedBackend {
    async fn start_export(&self, _request: &ExportRequest) -> Result<ExportStart> {
        let n = self.start_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.immediate {
            Some(file) => Ok(ExportStart::File(file.clone())),
            None => Ok(ExportStart::Task {
                task_id: format!("task-{}", n),
                message: None,
            }),
        }
    }

    async fn check_status(&self, _data_type: &str, _task_id: &str) -> Result<ExportStatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Report(report)) => Ok(report),
            Some(Step::Fail(status)) => Err(Error::Api {
                status,
                body: "upstream error".to_string(),
            }),
            None => Ok(ExportStatusReport::processing(0)),
        }
    }

    async fn cancel_export(&self, _data_type: &str, _task_id: &str) -> Result<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch_file(&self, url: &str) -> Result<ExportFile> {
        self.fetched.lock().push(url.to_string());
        Ok(self.file.clone())
    }
}

#[derive(Default)]
pub struct RecordingListener {
    pub sounds: Mutex<Vec<SoundCue>>,
    pub changes: Mutex<Vec<ExportNotification>>,
    pub removed: Mutex<Vec<NotificationId>>,
}

impl NotificationListener for RecordingListener {
    fn on_change(&self, notification: &ExportNotification) {
        self.changes.lock().push(notification.clone());
    }

    fn on_removed(&self, id: NotificationId) {
        self.removed.lock().push(id);
    }

    fn play_sound(&self, cue: SoundCue) {
        self.sounds.lock().push(cue);
    }
}

pub fn request() -> ExportRequest {
    ExportRequest::new("ca_periodique", ExportFormat::Excel).with_filter("dot", "Alger")
}
