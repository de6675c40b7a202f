//! Command handlers behind the CLI. Each one returns what it printed as a serializable value.

use crate::api::ApiClient;
use crate::cli::{Commands, OverrideAction};
use crate::config::Settings;
use crate::db::Db;
use crate::detect::detect_file_type;
use crate::error::{Error, Result};
use crate::excel;
use crate::export::{
    export_and_download, ExportBackend, NotificationListener, NotificationStore, PollPolicy,
    SoundCue,
};
use crate::filename::{export_file_name, filename_from_url};
use crate::mapping::{display_value, FieldMapper};
use crate::models::{
    DownloadHistoryItem, ExportFormat, ExportNotification, ExportRequest, ExportStatus, FileType,
    HistoryStatus, NotificationAction,
};
use crate::pipeline::{Ingestion, Pipeline};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const PREVIEW_ROWS: usize = 10;

pub struct AppState {
    pub settings: Settings,
    pub api: ApiClient,
    pub db: Db,
    pub json: bool,
}

impl AppState {
    pub fn new(settings: Settings, json: bool) -> Result<Self> {
        let api = ApiClient::new(&settings)?;
        let db = Db::open(&settings.db_path())?;
        Ok(Self {
            settings,
            api,
            db,
            json,
        })
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(&self.api, Some(&self.db))
    }

    fn print<T: Serialize>(&self, value: &T, human: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", human());
        }
        Ok(())
    }
}

/// Prints notification changes to stderr and rings the terminal bell for sound cues.
struct TerminalListener;

impl NotificationListener for TerminalListener {
    fn on_change(&self, n: &ExportNotification) {
        eprintln!("[{}] {}: {} ({}%)", n.id, n.title, n.message, n.progress);
    }

    fn play_sound(&self, cue: SoundCue) {
        debug!(?cue, "sound cue");
        eprint!("\x07");
        let _ = std::io::stderr().flush();
    }
}

pub async fn run(state: &AppState, command: Commands) -> Result<()> {
    match command {
        Commands::Detect { file, hint } => detect(state, &file, hint.as_deref()),
        Commands::Map {
            file,
            file_type,
            rows,
            xlsx,
        } => map_local(state, &file, file_type, rows, xlsx.as_deref()),
        Commands::Upload {
            file,
            invoice_number,
            file_type,
            save,
        } => upload(state, &file, invoice_number, file_type, save).await,
        Commands::Inspect { id } => inspect(state, id).await,
        Commands::Process { id } => process(state, id).await,
        Commands::Save { id } => save(state, id).await,
        Commands::Download { id, output } => download(state, id, output).await,
        Commands::Delete { id } => {
            state.api.delete_invoice(id).await?;
            state.print(&json!({ "deleted": id }), || format!("Deleted upload {}", id))
        }
        Commands::List => list(state).await,
        Commands::Records { file_type, invoice } => records(state, file_type, invoice).await,
        Commands::Export {
            data_type,
            format,
            filters,
            output,
            track,
        } => {
            let mut request = ExportRequest::new(data_type, format);
            for (key, value) in filters {
                request = request.with_filter(key, value);
            }
            let dest = output.unwrap_or_else(default_download_dir);
            if track {
                export_tracked(state, request, &dest).await
            } else {
                export_once(state, request, &dest).await
            }
        }
        Commands::History { clear } => history(state, clear),
        Commands::Override { action } => overrides(state, action),
        Commands::PrintConfig => print_config(state),
    }
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::desktop_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn detect(state: &AppState, file: &Path, hint: Option<&str>) -> Result<()> {
    let preview = excel::read_preview(file, 0)?;
    let detection = detect_file_type(hint, Some(&preview.file_name), preview.headers.as_slice());
    state.print(&detection, || {
        format!(
            "{} ({}) via {:?}",
            detection.file_type,
            detection.file_type.label(),
            detection.source
        )
    })
}

fn map_local(
    state: &AppState,
    file: &Path,
    file_type: Option<FileType>,
    rows: usize,
    xlsx: Option<&Path>,
) -> Result<()> {
    let preview = excel::read_preview(file, rows)?;
    let file_type = file_type.unwrap_or_else(|| {
        detect_file_type(None, Some(&preview.file_name), preview.headers.as_slice()).file_type
    });
    let mapper = FieldMapper::new(file_type).with_overrides(state.db.overrides_for(file_type)?);
    let mapped = mapper.map_rows(&preview.rows);
    let columns = mapper.table_columns(&mapped);

    if let Some(path) = xlsx {
        excel::write_preview_workbook(path, file_type.label(), &columns, &mapped)?;
        info!(path = %path.display(), "wrote mapped preview");
    }

    let display: Vec<_> = mapped.iter().map(|r| r.display_row()).collect();
    state.print(
        &json!({ "file_type": file_type, "columns": columns, "rows": display }),
        || render_table(&columns, &mapped),
    )
}

fn render_table(columns: &[String], rows: &[crate::mapping::MappedRow]) -> String {
    let mut out = columns.join("\t");
    for row in rows {
        out.push('\n');
        let cells: Vec<String> = columns
            .iter()
            .map(|c| row.get(c).map(display_value).unwrap_or_default())
            .collect();
        out.push_str(&cells.join("\t"));
    }
    out
}

fn ingestion_summary(ingestion: &Ingestion) -> Value {
    json!({
        "id": ingestion.file.id,
        "file_name": ingestion.file.file_name,
        "status": ingestion.status(),
        "detection": ingestion.detection(),
        "summary": ingestion.summary(),
        "columns": ingestion.columns(),
        "rows": ingestion.rows().iter().map(|r| r.display_row()).collect::<Vec<_>>(),
    })
}

fn ingestion_text(ingestion: &Ingestion) -> String {
    let mut out = format!(
        "Upload {} ({}) status={} type={}",
        ingestion.file.id,
        ingestion.file.file_name,
        ingestion.status(),
        ingestion.file_type()
    );
    if !ingestion.rows().is_empty() {
        out.push('\n');
        let rows = &ingestion.rows()[..ingestion.rows().len().min(PREVIEW_ROWS)];
        out.push_str(&render_table(&ingestion.columns(), rows));
    }
    out
}

async fn upload(
    state: &AppState,
    file: &Path,
    invoice_number: Option<String>,
    file_type: Option<FileType>,
    save: bool,
) -> Result<()> {
    let invoice_number = invoice_number.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("UPLOAD-{}", Utc::now().format("%Y%m%d%H%M%S")))
    });
    let pipeline = state.pipeline();
    if save {
        let (ingestion, result) = pipeline.run(file, &invoice_number, file_type).await?;
        let mut value = ingestion_summary(&ingestion);
        value["saved_rows"] = json!(result.saved_rows);
        return state.print(&value, || {
            format!(
                "{}\nSaved {} rows{}",
                ingestion_text(&ingestion),
                result.saved_rows,
                result.message.map(|m| format!(": {}", m)).unwrap_or_default()
            )
        });
    }
    let ingestion = pipeline.upload(file, &invoice_number, file_type).await?;
    state.print(&ingestion.file, || ingestion_text(&ingestion))
}

async fn inspect(state: &AppState, id: i64) -> Result<()> {
    let pipeline = state.pipeline();
    let mut ingestion = pipeline.resume(id).await?;
    pipeline.inspect(&mut ingestion).await?;
    state.print(&ingestion_summary(&ingestion), || ingestion_text(&ingestion))
}

async fn process(state: &AppState, id: i64) -> Result<()> {
    let pipeline = state.pipeline();
    let mut ingestion = pipeline.resume(id).await?;
    pipeline.inspect(&mut ingestion).await?;
    pipeline.process(&mut ingestion, None).await?;
    state.print(&ingestion_summary(&ingestion), || ingestion_text(&ingestion))
}

async fn save(state: &AppState, id: i64) -> Result<()> {
    let pipeline = state.pipeline();
    let mut ingestion = pipeline.resume(id).await?;
    pipeline.inspect(&mut ingestion).await?;
    let result = pipeline.save(&mut ingestion).await?;
    state.print(
        &json!({ "id": id, "saved_rows": result.saved_rows, "message": result.message }),
        || format!("Saved {} rows from upload {}", result.saved_rows, id),
    )
}

async fn download(state: &AppState, id: i64, output: Option<PathBuf>) -> Result<()> {
    let file = state.api.download_invoice(id).await?;
    let name = file
        .content_disposition
        .as_deref()
        .and_then(crate::filename::filename_from_content_disposition)
        .map(|n| crate::filename::clean_file_name(&n))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| format!("upload_{}.xlsx", id));
    let path = match output {
        Some(p) if p.is_dir() => p.join(&name),
        Some(p) => p,
        None => default_download_dir().join(&name),
    };
    tokio::fs::write(&path, &file.bytes).await?;
    state.print(
        &json!({ "path": path, "bytes": file.bytes.len() }),
        || format!("Saved {} ({} bytes)", path.display(), file.bytes.len()),
    )
}

async fn list(state: &AppState) -> Result<()> {
    let files = state.api.list_invoices().await?;
    state.print(&files, || {
        files
            .iter()
            .map(|f| {
                format!(
                    "{}\t{}\t{}\t{}\t{}",
                    f.id,
                    f.invoice_number,
                    f.file_name,
                    f.status,
                    f.upload_date.as_deref().unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

async fn records(state: &AppState, file_type: FileType, invoice: Option<i64>) -> Result<()> {
    if file_type.records_endpoint().is_none() {
        warn!(file_type = %file_type, "no record listing for this file type");
    }
    let rows = state.api.list_records(file_type, invoice).await?;
    let mapper = FieldMapper::new(file_type);
    let mapped = mapper.map_rows(&rows);
    let columns = mapper.table_columns(&mapped);
    state.print(&rows, || render_table(&columns, &mapped))
}

fn record_history(state: &AppState, item: &DownloadHistoryItem) {
    if let Err(e) = state.db.record_download(item) {
        warn!(error = %e, "could not record download history");
    }
}

async fn export_once(state: &AppState, request: ExportRequest, dest: &Path) -> Result<()> {
    let policy = PollPolicy::from_settings(&state.settings);
    let result = export_and_download(&state.api, &request, policy, dest).await;
    let (filename, status, file_size) = match &result {
        Ok(path) => (
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            HistoryStatus::Completed,
            std::fs::metadata(path).ok().map(|m| m.len()),
        ),
        Err(_) => (
            export_file_name(&request.data_type, request.format, Utc::now().date_naive(), None),
            HistoryStatus::Failed,
            None,
        ),
    };
    record_history(
        state,
        &DownloadHistoryItem {
            id: 0,
            filename,
            file_url: None,
            file_size,
            timestamp: Utc::now(),
            format: request.format,
            status,
        },
    );
    let path = result?;
    state.print(&json!({ "path": path }), || format!("Saved {}", path.display()))
}

/// Follow the export through the notification store until it ends; Ctrl-C cancels the job.
async fn export_tracked(state: &AppState, request: ExportRequest, dest: &Path) -> Result<()> {
    let backend = Arc::new(state.api.clone());
    let store = NotificationStore::with_listener(
        Arc::clone(&backend),
        state.settings.poll_interval,
        Arc::new(TerminalListener),
    );

    let id = match store.start(request.clone()).await? {
        crate::export::StartOutcome::Ready(file) => {
            let name = export_file_name(
                &request.data_type,
                request.format,
                Utc::now().date_naive(),
                file.content_disposition.as_deref(),
            );
            tokio::fs::create_dir_all(dest).await?;
            let path = dest.join(&name);
            tokio::fs::write(&path, &file.bytes).await?;
            for item in store.history() {
                record_history(state, &item);
            }
            return state.print(&json!({ "path": path }), || format!("Saved {}", path.display()));
        }
        crate::export::StartOutcome::Tracking(id) => id,
    };

    let mut ticker = tokio::time::interval(state.settings.poll_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let finished = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                eprintln!("Cancelling export...");
                if let Err(e) = store.cancel(id).await {
                    warn!(error = %e, "cancel request failed");
                    store.remove(id);
                    return Err(Error::ExportCancelled);
                }
            }
            _ = ticker.tick() => {}
        }
        match store.get(id) {
            Some(n) if n.is_terminal() => break n,
            Some(_) => continue,
            None => return Err(Error::NotFound(format!("notification {}", id))),
        }
    };

    for item in store.history() {
        record_history(state, &item);
    }
    store.clear();

    match (finished.status, finished.action) {
        (ExportStatus::Completed, Some(NotificationAction::Download { url })) => {
            let file = backend.fetch_file(&url).await?;
            let name = match file.content_disposition.as_deref() {
                Some(cd) => export_file_name(
                    &request.data_type,
                    request.format,
                    Utc::now().date_naive(),
                    Some(cd),
                ),
                None => filename_from_url(&url).unwrap_or_else(|| {
                    export_file_name(&request.data_type, request.format, Utc::now().date_naive(), None)
                }),
            };
            tokio::fs::create_dir_all(dest).await?;
            let path = dest.join(&name);
            tokio::fs::write(&path, &file.bytes).await?;
            state.print(&json!({ "path": path }), || format!("Saved {}", path.display()))
        }
        (ExportStatus::Cancelled, _) => Err(Error::ExportCancelled),
        _ => Err(Error::ExportFailed(finished.message)),
    }
}

fn history(state: &AppState, clear: bool) -> Result<()> {
    if clear {
        let n = state.db.clear_download_history()?;
        return state.print(&json!({ "cleared": n }), || format!("Cleared {} entries", n));
    }
    let items = state.db.download_history()?;
    state.print(&items, || {
        items
            .iter()
            .map(|i| {
                format!(
                    "{}\t{}\t{}\t{}\t{}",
                    i.timestamp.format("%Y-%m-%d %H:%M"),
                    i.status.as_str(),
                    i.format,
                    i.filename,
                    i.file_size.map(|s| s.to_string()).unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

fn overrides(state: &AppState, action: OverrideAction) -> Result<()> {
    match action {
        OverrideAction::Set {
            file_type,
            raw_header,
            field_key,
        } => {
            state.db.upsert_override(file_type, &raw_header, &field_key)?;
            state.print(
                &json!({ "file_type": file_type, "raw_header": raw_header, "field_key": field_key }),
                || format!("{}: {} -> {}", file_type, raw_header, field_key),
            )
        }
        OverrideAction::List { file_type } => {
            let list: Vec<_> = state
                .db
                .list_overrides()?
                .into_iter()
                .filter(|o| file_type.map_or(true, |t| o.file_type == t))
                .collect();
            state.print(&list, || {
                list.iter()
                    .map(|o| format!("{}\t{}\t{}", o.file_type, o.raw_header, o.field_key))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        OverrideAction::Delete {
            file_type,
            raw_header,
        } => {
            let removed = state.db.delete_override(file_type, &raw_header)?;
            state.print(&json!({ "removed": removed }), || {
                if removed {
                    format!("Removed {} override for {}", file_type, raw_header)
                } else {
                    format!("No {} override for {}", file_type, raw_header)
                }
            })
        }
    }
}

fn print_config(state: &AppState) -> Result<()> {
    let s = &state.settings;
    let value = json!({
        "api_url": s.api_url,
        "auth": s.auth_status(),
        "request_timeout_secs": s.request_timeout.as_secs(),
        "poll_interval_secs": s.poll_interval.as_secs(),
        "poll_max_attempts": s.poll_max_attempts,
        "duplicate_retry_ms": s.duplicate_retry_delay.as_millis() as u64,
        "data_dir": s.data_dir,
        "database": s.db_path(),
        "export_formats": [ExportFormat::Excel, ExportFormat::Csv, ExportFormat::Pdf],
    });
    state.print(&value, || {
        format!(
            "api_url: {}\nauth: {}\ndata_dir: {}\npoll: every {}s, {} attempts",
            s.api_url,
            s.auth_status(),
            s.data_dir.display(),
            s.poll_interval.as_secs(),
            s.poll_max_attempts
        )
    })
}
