//! Notification store for asynchronous export jobs.
//!
//! Each tracked notification owns one poll task. The task handle and its
//! cancellation signal live only inside the store; removing or clearing a
//! notification signals the task, and a signalled task never touches the
//! store again, even if a status response was already in flight.

use super::{DownloadHistory, ExportBackend};
use crate::error::{Error, Result};
use crate::filename::{export_file_name, filename_from_url};
use crate::models::{
    DownloadHistoryItem, ExportFile, ExportFormat, ExportNotification, ExportRequest, ExportStart, ExportStatus,
    ExportStatusReport, HistoryStatus, NotificationAction, NotificationId, NotificationKind,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundCue {
    Success,
    Error,
}

/// Hooks for whatever presents notifications. All methods default to no-ops.
pub trait NotificationListener: Send + Sync {
    fn on_change(&self, _notification: &ExportNotification) {}
    fn on_removed(&self, _id: NotificationId) {}
    fn play_sound(&self, _cue: SoundCue) {}
}

pub struct SilentListener;

impl NotificationListener for SilentListener {}

/// Result of submitting an export through the store.
#[derive(Debug)]
pub enum StartOutcome {
    /// The server queued a job; a notification now follows it.
    Tracking(NotificationId),
    /// The server answered with the file straight away.
    Ready(ExportFile),
}

struct PollHandle {
    cancel: watch::Sender<bool>,
    _task: JoinHandle<()>,
}

impl PollHandle {
    fn stop(self) {
        let _ = self.cancel.send(true);
    }
}

#[derive(Default)]
struct State {
    notifications: Vec<ExportNotification>,
    polls: HashMap<NotificationId, PollHandle>,
    history: DownloadHistory,
}

impl State {
    fn find_mut(&mut self, id: NotificationId) -> Option<&mut ExportNotification> {
        self.notifications.iter_mut().find(|n| n.id == id)
    }
}

struct Shared<B> {
    backend: Arc<B>,
    listener: Arc<dyn NotificationListener>,
    poll_interval: Duration,
    next_id: AtomicU64,
    next_history_id: AtomicU64,
    state: Mutex<State>,
}

/// How a tracked job ended.
enum Outcome {
    Completed { url: String, row_count: Option<u64> },
    Failed { status: ExportStatus, message: String },
}

impl<B: ExportBackend> Shared<B> {
    fn next_history_id(&self) -> u64 {
        self.next_history_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Apply one status report. Returns true when the job reached a terminal state.
    fn apply_report(&self, id: NotificationId, report: ExportStatusReport) -> bool {
        match report.status.unwrap_or(ExportStatus::Processing) {
            ExportStatus::Processing => {
                self.merge_progress(id, &report);
                false
            }
            ExportStatus::Completed => {
                let outcome = match report.file_url {
                    Some(url) => Outcome::Completed {
                        url,
                        row_count: report.row_count,
                    },
                    None => Outcome::Failed {
                        status: ExportStatus::Failed,
                        message: "Export finished without a file to download".to_string(),
                    },
                };
                self.finish(id, outcome);
                true
            }
            status @ (ExportStatus::Failed | ExportStatus::Cancelled) => {
                let message = report.error.unwrap_or_else(|| {
                    if status == ExportStatus::Cancelled {
                        "Export was cancelled".to_string()
                    } else {
                        "Export failed".to_string()
                    }
                });
                self.finish(id, Outcome::Failed { status, message });
                true
            }
        }
    }

    fn merge_progress(&self, id: NotificationId, report: &ExportStatusReport) {
        let updated = {
            let mut state = self.state.lock();
            let Some(n) = state.find_mut(id) else {
                return;
            };
            if n.is_terminal() {
                return;
            }
            if let Some(progress) = report.progress {
                n.progress = progress.min(100);
            }
            if report.remaining_time.is_some() {
                n.remaining_time = report.remaining_time;
            }
            if report.row_count.is_some() {
                n.row_count = report.row_count;
            }
            n.message = match n.remaining_time {
                Some(secs) => format!("Export in progress: {}% (about {}s left)", n.progress, secs),
                None => format!("Export in progress: {}%", n.progress),
            };
            n.updated_at = Utc::now();
            n.clone()
        };
        debug!(notification = id, progress = updated.progress, "export progress");
        self.listener.on_change(&updated);
    }

    /// Move a running notification to its terminal state. No-op if it is gone or already finished.
    fn finish(&self, id: NotificationId, outcome: Outcome) {
        let history_id = self.next_history_id();
        let (updated, cue) = {
            let mut state = self.state.lock();
            if let Some(handle) = state.polls.remove(&id) {
                handle.stop();
            }
            let Some(n) = state.find_mut(id) else {
                return;
            };
            if n.is_terminal() {
                return;
            }
            let now = Utc::now();
            let format = n
                .request
                .as_ref()
                .map(|r| r.format)
                .unwrap_or(ExportFormat::Excel);
            let data_type = n
                .request
                .as_ref()
                .map(|r| r.data_type.clone())
                .unwrap_or_else(|| "export".to_string());
            let fallback_name = export_file_name(&data_type, format, now.date_naive(), None);

            let (item, cue) = match outcome {
                Outcome::Completed { url, row_count } => {
                    n.status = ExportStatus::Completed;
                    n.kind = NotificationKind::Success;
                    n.title = "Export ready".to_string();
                    n.message = "Your export is ready to download.".to_string();
                    n.progress = 100;
                    n.remaining_time = None;
                    if row_count.is_some() {
                        n.row_count = row_count;
                    }
                    n.file_url = Some(url.clone());
                    n.action = Some(NotificationAction::Download { url: url.clone() });
                    let item = DownloadHistoryItem {
                        id: history_id,
                        filename: filename_from_url(&url).unwrap_or(fallback_name),
                        file_url: Some(url),
                        file_size: None,
                        timestamp: now,
                        format,
                        status: HistoryStatus::Completed,
                    };
                    (item, SoundCue::Success)
                }
                Outcome::Failed { status, message } => {
                    n.status = status;
                    n.kind = if status == ExportStatus::Cancelled {
                        NotificationKind::Warning
                    } else {
                        NotificationKind::Error
                    };
                    n.title = if status == ExportStatus::Cancelled {
                        "Export cancelled".to_string()
                    } else {
                        "Export failed".to_string()
                    };
                    n.message = message;
                    n.remaining_time = None;
                    n.action = n
                        .request
                        .clone()
                        .map(|request| NotificationAction::Retry { request });
                    let item = DownloadHistoryItem {
                        id: history_id,
                        filename: fallback_name,
                        file_url: None,
                        file_size: None,
                        timestamp: now,
                        format,
                        status: HistoryStatus::Failed,
                    };
                    (item, SoundCue::Error)
                }
            };
            n.updated_at = now;
            let updated = n.clone();
            state.history.push(item);
            (updated, cue)
        };
        info!(
            notification = id,
            status = ?updated.status,
            "export finished"
        );
        self.listener.on_change(&updated);
        self.listener.play_sound(cue);
    }
}

async fn poll_export<B: ExportBackend>(
    shared: Weak<Shared<B>>,
    id: NotificationId,
    data_type: String,
    task_id: String,
    interval: Duration,
    mut cancel: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }
        if *cancel.borrow() {
            break;
        }
        let Some(backend) = shared.upgrade().map(|s| s.backend.clone()) else {
            break;
        };
        let result = backend.check_status(&data_type, &task_id).await;
        if *cancel.borrow() {
            debug!(notification = id, "poll stopped while a status check was in flight");
            break;
        }
        let Some(store) = shared.upgrade() else {
            break;
        };
        match result {
            Ok(report) => {
                if store.apply_report(id, report) {
                    break;
                }
            }
            Err(e) => {
                warn!(notification = id, task_id = %task_id, error = %e, "status check failed, will retry");
            }
        }
    }
    debug!(notification = id, "poll task ended");
}

/// Process-wide list of export notifications plus the poll tasks behind them.
/// Cheap to clone; clones share state.
pub struct NotificationStore<B> {
    shared: Arc<Shared<B>>,
}

impl<B> Clone for NotificationStore<B> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<B: ExportBackend> NotificationStore<B> {
    pub fn new(backend: Arc<B>, poll_interval: Duration) -> Self {
        Self::with_listener(backend, poll_interval, Arc::new(SilentListener))
    }

    pub fn with_listener(
        backend: Arc<B>,
        poll_interval: Duration,
        listener: Arc<dyn NotificationListener>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                listener,
                poll_interval,
                next_id: AtomicU64::new(1),
                next_history_id: AtomicU64::new(1),
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.shared.poll_interval
    }

    /// Record a running export without following it.
    pub fn add(&self, request: &ExportRequest, task_id: Option<&str>) -> NotificationId {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let notification = ExportNotification {
            id,
            kind: NotificationKind::Info,
            title: format!("Exporting {}", request.data_type),
            message: "Export started".to_string(),
            progress: 0,
            status: ExportStatus::Processing,
            task_id: task_id.map(String::from),
            remaining_time: None,
            file_url: None,
            filters: request.filters.clone(),
            row_count: None,
            request: Some(request.clone()),
            action: None,
            created_at: now,
            updated_at: now,
        };
        self.shared.state.lock().notifications.push(notification.clone());
        self.shared.listener.on_change(&notification);
        id
    }

    /// Record a running export and poll its status until it ends or is removed.
    /// Must be called from within a tokio runtime.
    pub fn track(&self, request: &ExportRequest, task_id: &str) -> NotificationId {
        let id = self.add(request, Some(task_id));
        let (cancel, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(poll_export(
            Arc::downgrade(&self.shared),
            id,
            request.data_type.clone(),
            task_id.to_string(),
            self.shared.poll_interval,
            cancel_rx,
        ));
        let handle = PollHandle {
            cancel,
            _task: task,
        };
        let mut state = self.shared.state.lock();
        let still_running = state
            .notifications
            .iter()
            .any(|n| n.id == id && !n.is_terminal());
        if still_running {
            state.polls.insert(id, handle);
        } else {
            handle.stop();
        }
        info!(notification = id, task_id, data_type = %request.data_type, "tracking export");
        id
    }

    /// Submit an export. A queued job is tracked; an immediate file is returned and logged in history.
    pub async fn start(&self, request: ExportRequest) -> Result<StartOutcome> {
        let backend = Arc::clone(&self.shared.backend);
        match backend.start_export(&request).await? {
            ExportStart::Task { task_id, .. } => Ok(StartOutcome::Tracking(self.track(&request, &task_id))),
            ExportStart::File(file) => {
                let item = DownloadHistoryItem {
                    id: self.shared.next_history_id(),
                    filename: export_file_name(
                        &request.data_type,
                        request.format,
                        Utc::now().date_naive(),
                        file.content_disposition.as_deref(),
                    ),
                    file_url: None,
                    file_size: Some(file.bytes.len() as u64),
                    timestamp: Utc::now(),
                    format: request.format,
                    status: HistoryStatus::Completed,
                };
                self.shared.state.lock().history.push(item);
                self.shared.listener.play_sound(SoundCue::Success);
                Ok(StartOutcome::Ready(file))
            }
        }
    }

    /// Mutate a notification in place. The id cannot be changed. Returns false if it does not exist.
    pub fn update<F>(&self, id: NotificationId, f: F) -> bool
    where
        F: FnOnce(&mut ExportNotification),
    {
        let updated = {
            let mut state = self.shared.state.lock();
            let Some(n) = state.find_mut(id) else {
                return false;
            };
            f(n);
            n.id = id;
            n.updated_at = Utc::now();
            n.clone()
        };
        self.shared.listener.on_change(&updated);
        true
    }

    /// Dismiss a notification, stopping its poll task. Removing twice is a no-op.
    pub fn remove(&self, id: NotificationId) -> bool {
        let removed = {
            let mut state = self.shared.state.lock();
            if let Some(handle) = state.polls.remove(&id) {
                handle.stop();
            }
            let before = state.notifications.len();
            state.notifications.retain(|n| n.id != id);
            state.notifications.len() != before
        };
        if removed {
            debug!(notification = id, "notification removed");
            self.shared.listener.on_removed(id);
        }
        removed
    }

    /// Dismiss every notification and stop every poll task. History is kept.
    pub fn clear(&self) {
        let ids: Vec<NotificationId> = {
            let mut state = self.shared.state.lock();
            for (_, handle) in state.polls.drain() {
                handle.stop();
            }
            state.notifications.drain(..).map(|n| n.id).collect()
        };
        for id in ids {
            self.shared.listener.on_removed(id);
        }
    }

    /// Ask the server to cancel a running job; on acknowledgement the notification ends as cancelled.
    pub async fn cancel(&self, id: NotificationId) -> Result<()> {
        let (data_type, task_id) = {
            let state = self.shared.state.lock();
            let n = state
                .notifications
                .iter()
                .find(|n| n.id == id)
                .ok_or_else(|| Error::NotFound(format!("notification {}", id)))?;
            match (n.can_cancel(), &n.task_id, &n.request) {
                (true, Some(task_id), Some(request)) => (request.data_type.clone(), task_id.clone()),
                _ => {
                    return Err(Error::ExportFailed(format!(
                        "notification {} is not a running export",
                        id
                    )))
                }
            }
        };
        let backend = Arc::clone(&self.shared.backend);
        backend.cancel_export(&data_type, &task_id).await?;
        self.shared.finish(
            id,
            Outcome::Failed {
                status: ExportStatus::Cancelled,
                message: "Export cancelled at your request".to_string(),
            },
        );
        Ok(())
    }

    /// Re-dispatch the request behind a failed or cancelled notification, replacing it.
    pub async fn retry(&self, id: NotificationId) -> Result<StartOutcome> {
        let request = {
            let state = self.shared.state.lock();
            let n = state
                .notifications
                .iter()
                .find(|n| n.id == id)
                .ok_or_else(|| Error::NotFound(format!("notification {}", id)))?;
            match &n.action {
                Some(NotificationAction::Retry { request }) => request.clone(),
                _ => {
                    return Err(Error::ExportFailed(format!(
                        "notification {} has nothing to retry",
                        id
                    )))
                }
            }
        };
        self.remove(id);
        self.start(request).await
    }

    pub fn get(&self, id: NotificationId) -> Option<ExportNotification> {
        self.shared
            .state
            .lock()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    pub fn list(&self) -> Vec<ExportNotification> {
        self.shared.state.lock().notifications.clone()
    }

    pub fn history(&self) -> Vec<DownloadHistoryItem> {
        self.shared.state.lock().history.items()
    }

    pub fn clear_history(&self) {
        self.shared.state.lock().history.clear();
    }

    /// Number of poll tasks still registered.
    pub fn active_polls(&self) -> usize {
        self.shared.state.lock().polls.len()
    }
}
