mod export;
mod file_type;

pub use export::{
    DownloadHistoryItem, ExportFile, ExportFormat, ExportNotification, ExportRequest, ExportStart,
    ExportStatus, ExportStatusReport, HistoryStatus, NotificationAction, NotificationId,
    NotificationKind,
};
pub use file_type::FileType;
