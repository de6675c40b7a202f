mod common;

use billing_ingest::error::Error;
use billing_ingest::export::{NotificationStore, SoundCue, StartOutcome};
use billing_ingest::models::{
    ExportFile, ExportStatus, ExportStatusReport, HistoryStatus, NotificationAction, NotificationId,
    NotificationKind,
};
use common::{request, RecordingListener, ScriptedBackend, Step};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const INTERVAL: Duration = Duration::from_secs(2);
const URL: &str = "https://bo.example.dz/media/exports/ca_periodique_2024.xlsx";

fn store_with(
    backend: ScriptedBackend,
) -> (
    Arc<ScriptedBackend>,
    Arc<RecordingListener>,
    NotificationStore<ScriptedBackend>,
) {
    let backend = Arc::new(backend);
    let listener = Arc::new(RecordingListener::default());
    let store = NotificationStore::with_listener(Arc::clone(&backend), INTERVAL, listener.clone());
    (backend, listener, store)
}

async fn start_tracking(store: &NotificationStore<ScriptedBackend>) -> NotificationId {
    match store.start(request()).await.unwrap() {
        StartOutcome::Tracking(id) => id,
        StartOutcome::Ready(_) => panic!("expected a queued job"),
    }
}

#[tokio::test(start_paused = true)]
async fn progress_then_completion_updates_one_notification() {
    let (backend, listener, store) = store_with(ScriptedBackend::with_reports(vec![
        ExportStatusReport::processing(40),
        ExportStatusReport::completed(URL),
    ]));
    let id = start_tracking(&store).await;

    let created = store.get(id).unwrap();
    assert_eq!(created.status, ExportStatus::Processing);
    assert_eq!(created.task_id.as_deref(), Some("task-1"));
    assert_eq!(created.filters.get("dot").map(String::as_str), Some("Alger"));
    assert_eq!(store.active_polls(), 1);
    assert_eq!(backend.status_calls(), 0);

    sleep(Duration::from_millis(2100)).await;
    let running = store.get(id).unwrap();
    assert_eq!(running.progress, 40);
    assert_eq!(running.status, ExportStatus::Processing);
    assert_eq!(backend.status_calls(), 1);

    sleep(INTERVAL).await;
    let done = store.get(id).unwrap();
    assert_eq!(done.id, id);
    assert_eq!(done.status, ExportStatus::Completed);
    assert_eq!(done.kind, NotificationKind::Success);
    assert_eq!(done.progress, 100);
    assert_eq!(done.file_url.as_deref(), Some(URL));
    assert_eq!(
        done.action,
        Some(NotificationAction::Download {
            url: URL.to_string()
        })
    );
    assert_eq!(store.list().len(), 1);
    assert_eq!(store.active_polls(), 0);

    let history = store.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].filename, "ca_periodique_2024.xlsx");
    assert_eq!(history[0].status, HistoryStatus::Completed);
    assert_eq!(*listener.sounds.lock(), vec![SoundCue::Success]);

    // No polling after the terminal state.
    sleep(Duration::from_secs(20)).await;
    assert_eq!(backend.status_calls(), 2);
    assert_eq!(store.history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn removing_mid_poll_stops_status_checks() {
    let (backend, listener, store) = store_with(ScriptedBackend::with_reports(vec![
        ExportStatusReport::processing(10),
    ]));
    let id = start_tracking(&store).await;

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(backend.status_calls(), 1);

    assert!(store.remove(id));
    assert_eq!(store.active_polls(), 0);
    assert!(store.get(id).is_none());

    sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.status_calls(), 1);

    assert!(!store.remove(id));
    assert_eq!(*listener.removed.lock(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn response_arriving_after_removal_is_discarded() {
    let (backend, listener, store) = store_with(
        ScriptedBackend::with_reports(vec![ExportStatusReport::completed(URL)])
            .with_latency(Duration::from_secs(1)),
    );
    let id = start_tracking(&store).await;

    // First check starts at 2s and answers at 3s.
    sleep(Duration::from_millis(2500)).await;
    assert_eq!(backend.status_calls(), 1);
    assert!(store.remove(id));

    sleep(Duration::from_secs(10)).await;
    assert!(store.get(id).is_none());
    assert!(store.history().is_empty());
    assert!(listener.sounds.lock().is_empty());
    assert_eq!(backend.status_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failure_offers_retry_and_retry_replaces_notification() {
    let (backend, listener, store) = store_with(ScriptedBackend::with_reports(vec![
        ExportStatusReport::failed("Too many rows"),
    ]));
    let id = start_tracking(&store).await;

    sleep(Duration::from_millis(2100)).await;
    let failed = store.get(id).unwrap();
    assert_eq!(failed.status, ExportStatus::Failed);
    assert_eq!(failed.kind, NotificationKind::Error);
    assert_eq!(failed.message, "Too many rows");
    assert_eq!(
        failed.action,
        Some(NotificationAction::Retry { request: request() })
    );
    assert_eq!(store.history()[0].status, HistoryStatus::Failed);
    assert_eq!(*listener.sounds.lock(), vec![SoundCue::Error]);
    assert_eq!(store.active_polls(), 0);

    let new_id = match store.retry(id).await.unwrap() {
        StartOutcome::Tracking(new_id) => new_id,
        StartOutcome::Ready(_) => panic!("expected a queued job"),
    };
    assert_ne!(new_id, id);
    assert!(store.get(id).is_none());
    assert_eq!(backend.start_calls(), 2);
    assert_eq!(store.get(new_id).unwrap().task_id.as_deref(), Some("task-2"));
    assert_eq!(store.active_polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn retry_needs_a_failed_notification() {
    let (_backend, _listener, store) = store_with(ScriptedBackend::with_reports(vec![]));
    let id = start_tracking(&store).await;
    assert!(matches!(store.retry(id).await, Err(Error::ExportFailed(_))));
    assert!(matches!(store.retry(999).await, Err(Error::NotFound(_))));
}

#[tokio::test(start_paused = true)]
async fn cancel_ends_job_and_polling() {
    let (backend, listener, store) = store_with(ScriptedBackend::with_reports(vec![]));
    let id = start_tracking(&store).await;

    store.cancel(id).await.unwrap();
    assert_eq!(backend.cancel_calls(), 1);
    let cancelled = store.get(id).unwrap();
    assert_eq!(cancelled.status, ExportStatus::Cancelled);
    assert_eq!(cancelled.kind, NotificationKind::Warning);
    assert!(matches!(cancelled.action, Some(NotificationAction::Retry { .. })));
    assert!(!cancelled.can_cancel());
    assert_eq!(store.active_polls(), 0);
    assert_eq!(*listener.sounds.lock(), vec![SoundCue::Error]);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(backend.status_calls(), 0);

    // Already terminal.
    assert!(matches!(store.cancel(id).await, Err(Error::ExportFailed(_))));
    assert_eq!(backend.cancel_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn completed_without_url_is_a_failure() {
    let report = ExportStatusReport {
        status: Some(ExportStatus::Completed),
        progress: Some(100),
        ..Default::default()
    };
    let (_backend, _listener, store) = store_with(ScriptedBackend::with_reports(vec![report]));
    let id = start_tracking(&store).await;

    sleep(Duration::from_millis(2100)).await;
    let n = store.get(id).unwrap();
    assert_eq!(n.status, ExportStatus::Failed);
    assert!(matches!(n.action, Some(NotificationAction::Retry { .. })));
    assert_eq!(store.history()[0].status, HistoryStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn status_errors_are_retried_on_next_tick() {
    let (backend, _listener, store) = store_with(ScriptedBackend::with_steps(vec![
        Step::Fail(502),
        Step::Report(ExportStatusReport::completed(URL)),
    ]));
    let id = start_tracking(&store).await;

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(store.get(id).unwrap().status, ExportStatus::Processing);

    sleep(INTERVAL).await;
    assert_eq!(store.get(id).unwrap().status, ExportStatus::Completed);
    assert_eq!(backend.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn clear_drops_everything_but_history() {
    let (backend, _listener, store) = store_with(ScriptedBackend::with_reports(vec![
        ExportStatusReport::failed("boom"),
    ]));
    let first = start_tracking(&store).await;
    sleep(Duration::from_millis(2100)).await;
    assert!(store.get(first).unwrap().is_terminal());

    start_tracking(&store).await;
    start_tracking(&store).await;
    assert_eq!(store.active_polls(), 2);
    let calls = backend.status_calls();

    store.clear();
    assert!(store.list().is_empty());
    assert_eq!(store.active_polls(), 0);

    sleep(Duration::from_secs(20)).await;
    assert_eq!(backend.status_calls(), calls);
    assert_eq!(store.history().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn immediate_file_is_returned_and_logged() {
    let file = ExportFile {
        content_disposition: Some("attachment; filename=\"ventes.xlsx\"".to_string()),
        bytes: vec![1, 2, 3],
    };
    let (_backend, listener, store) = store_with(ScriptedBackend::immediate(file.clone()));

    match store.start(request()).await.unwrap() {
        StartOutcome::Ready(got) => assert_eq!(got, file),
        StartOutcome::Tracking(_) => panic!("expected the file"),
    }
    assert!(store.list().is_empty());
    assert_eq!(store.active_polls(), 0);
    let history = store.history();
    assert_eq!(history[0].filename, "ventes.xlsx");
    assert_eq!(history[0].file_size, Some(3));
    assert_eq!(*listener.sounds.lock(), vec![SoundCue::Success]);
}

#[tokio::test(start_paused = true)]
async fn update_keeps_identity() {
    let (_backend, _listener, store) = store_with(ScriptedBackend::with_reports(vec![]));
    let id = store.add(&request(), None);

    assert!(store.update(id, |n| {
        n.title = "Renamed".to_string();
        n.id = 999;
    }));
    let n = store.get(id).unwrap();
    assert_eq!(n.title, "Renamed");
    assert!(store.get(999).is_none());
    assert!(!store.update(12345, |_| {}));
    // Plain notifications are never polled.
    assert_eq!(store.active_polls(), 0);
}

#[tokio::test(start_paused = true)]
async fn history_keeps_ten_most_recent() {
    let (_backend, _listener, store) = store_with(ScriptedBackend::with_reports(
        (0..11).map(|i| ExportStatusReport::failed(format!("fail {}", i))).collect(),
    ));
    for _ in 0..11 {
        start_tracking(&store).await;
    }
    sleep(Duration::from_millis(2100)).await;
    assert_eq!(store.list().len(), 11);
    assert!(store.list().iter().all(|n| n.is_terminal()));
    assert_eq!(store.history().len(), 10);
}
