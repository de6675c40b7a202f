//! Upload → inspect → detect/map → process → save, with the upload status kept honest.

use crate::api::ApiClient;
use crate::db::Db;
use crate::detect::{detect_file_type, detect_from_file_name, Detection};
use crate::error::{Error, Result};
use crate::mapping::{FieldMapper, MappedRow};
use crate::models::FileType;
use crate::types::{
    InspectResult, ProcessOptions, ProcessResult, SaveRequest, SaveResult, SummaryData,
    UploadStatus, UploadedFile,
};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info, warn};

/// One uploaded file on its way through the pipeline.
#[derive(Debug, Clone)]
pub struct Ingestion {
    pub file: UploadedFile,
    status: UploadStatus,
    detection: Option<Detection>,
    mapper: Option<FieldMapper>,
    rows: Vec<MappedRow>,
    summary: SummaryData,
    /// Status came from the server rather than from this process.
    resumed: bool,
}

impl Ingestion {
    pub fn new(file: UploadedFile) -> Self {
        Self {
            status: file.status,
            file,
            detection: None,
            mapper: None,
            rows: Vec::new(),
            summary: SummaryData::default(),
            resumed: false,
        }
    }

    /// An upload picked up from the server's listing. The server owns its status,
    /// so `prepare` will not refuse an operation because of it.
    pub fn resumed(file: UploadedFile) -> Self {
        Self {
            resumed: true,
            ..Self::new(file)
        }
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    pub fn detection(&self) -> Option<Detection> {
        self.detection
    }

    pub fn file_type(&self) -> FileType {
        self.detection
            .map(|d| d.file_type)
            .unwrap_or(FileType::General)
    }

    pub fn rows(&self) -> &[MappedRow] {
        &self.rows
    }

    pub fn summary(&self) -> &SummaryData {
        &self.summary
    }

    pub fn mapper(&self) -> Option<&FieldMapper> {
        self.mapper.as_ref()
    }

    /// Table columns for the current preview.
    pub fn columns(&self) -> Vec<String> {
        match &self.mapper {
            Some(mapper) => mapper.table_columns(&self.rows),
            None => Vec::new(),
        }
    }

    pub fn advance(&mut self, next: UploadStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        info!(invoice = self.file.id, from = %self.status, to = %next, "upload status");
        self.status = next;
        self.file.status = next;
        Ok(())
    }

    /// Make sure `next` is reachable. A resumed upload whose server status does not lead
    /// to `next` is moved to the status that does; a local one gets `InvalidTransition`.
    pub fn prepare(&mut self, next: UploadStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            return Ok(());
        }
        let seed = predecessor(next).filter(|_| self.resumed);
        match seed {
            Some(seed) => {
                debug!(invoice = self.file.id, server = %self.status, local = %seed, "reseeding resumed upload");
                self.status = seed;
                self.file.status = seed;
                Ok(())
            }
            None => Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            }),
        }
    }

    fn fail(&mut self) {
        if self.status.can_transition_to(UploadStatus::Failed) {
            self.status = UploadStatus::Failed;
            self.file.status = UploadStatus::Failed;
        }
    }

    /// Classify from the server's inspection and map its preview rows.
    pub fn apply_inspection(&mut self, inspection: &InspectResult, overrides: Vec<(String, String)>) {
        let headers = inspection.headers();
        let file_name = inspection
            .file_name
            .as_deref()
            .unwrap_or(self.file.file_name.as_str());
        let detection = detect_file_type(
            inspection.detected_file_type.as_deref(),
            Some(file_name),
            headers.as_slice(),
        );
        let mapper = FieldMapper::new(detection.file_type).with_overrides(overrides);
        self.rows = mapper.map_rows(&inspection.preview_data);
        self.summary = inspection.summary.clone();
        self.detection = Some(detection);
        self.mapper = Some(mapper);
    }

    /// Replace the preview with processed rows, mapped with the same table.
    pub fn apply_processed(&mut self, processed: &ProcessResult) {
        let mapper = self
            .mapper
            .get_or_insert_with(|| FieldMapper::new(FileType::General));
        self.rows = mapper.map_rows(&processed.preview_data);
        self.summary = processed.summary.clone();
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions::for_file_type(self.file_type().as_str())
    }

    pub fn save_request(&self) -> SaveRequest {
        let mapper = self
            .mapper
            .clone()
            .unwrap_or_else(|| FieldMapper::new(self.file_type()));
        build_save_request(&mapper)
    }
}

fn predecessor(next: UploadStatus) -> Option<UploadStatus> {
    match next {
        UploadStatus::Processing => Some(UploadStatus::Pending),
        UploadStatus::Preview => Some(UploadStatus::Processing),
        UploadStatus::Saved => Some(UploadStatus::Preview),
        UploadStatus::Completed => Some(UploadStatus::Saved),
        UploadStatus::Pending | UploadStatus::Failed => None,
    }
}

pub fn build_save_request(mapper: &FieldMapper) -> SaveRequest {
    let mut options = Map::new();
    options.insert("remove_duplicates".to_string(), Value::Bool(true));
    SaveRequest {
        file_type: mapper.file_type().as_str().to_string(),
        map_fields: mapper.file_type() != FileType::General,
        field_mapping: mapper.as_json(),
        options,
    }
}

/// Drives an [`Ingestion`] against the API. Mapping overrides come from the local database when one is given.
pub struct Pipeline<'a> {
    api: &'a ApiClient,
    db: Option<&'a Db>,
}

impl<'a> Pipeline<'a> {
    pub fn new(api: &'a ApiClient, db: Option<&'a Db>) -> Self {
        Self { api, db }
    }

    fn overrides(&self, file_type: FileType) -> Vec<(String, String)> {
        let Some(db) = self.db else {
            return Vec::new();
        };
        db.overrides_for(file_type).unwrap_or_else(|e| {
            warn!(error = %e, "could not read mapping overrides");
            Vec::new()
        })
    }

    /// Upload a local file. The type hint, if not given, is guessed from the file name.
    pub async fn upload(
        &self,
        path: &Path,
        invoice_number: &str,
        file_type: Option<FileType>,
    ) -> Result<Ingestion> {
        let hint = file_type.or_else(|| {
            path.file_name()
                .and_then(|n| n.to_str())
                .and_then(detect_from_file_name)
        });
        let file = self.api.upload_invoice(path, invoice_number, hint).await?;
        info!(invoice = file.id, file = %file.file_name, "uploaded");
        Ok(Ingestion::new(file))
    }

    /// Resume work on a file that is already on the server.
    pub async fn resume(&self, invoice_id: i64) -> Result<Ingestion> {
        let file = self
            .api
            .list_invoices()
            .await?
            .into_iter()
            .find(|f| f.id == invoice_id)
            .ok_or_else(|| Error::NotFound(format!("invoice {}", invoice_id)))?;
        Ok(Ingestion::resumed(file))
    }

    pub async fn inspect(&self, ingestion: &mut Ingestion) -> Result<()> {
        let inspection = self.api.inspect(ingestion.file.id).await?;
        let file_type = detect_file_type(
            inspection.detected_file_type.as_deref(),
            Some(inspection.file_name.as_deref().unwrap_or(&ingestion.file.file_name)),
            inspection.headers().as_slice(),
        )
        .file_type;
        ingestion.apply_inspection(&inspection, self.overrides(file_type));
        if let Some(d) = ingestion.detection() {
            info!(invoice = ingestion.file.id, file_type = %d.file_type, source = ?d.source, "detected");
        }
        Ok(())
    }

    pub async fn process(&self, ingestion: &mut Ingestion, options: Option<ProcessOptions>) -> Result<()> {
        ingestion.prepare(UploadStatus::Processing)?;
        ingestion.advance(UploadStatus::Processing)?;
        let options = options.unwrap_or_else(|| ingestion.process_options());
        match self.api.process(ingestion.file.id, &options).await {
            Ok(processed) => {
                ingestion.apply_processed(&processed);
                ingestion.advance(UploadStatus::Preview)
            }
            Err(e) => {
                ingestion.fail();
                Err(e)
            }
        }
    }

    pub async fn save(&self, ingestion: &mut Ingestion) -> Result<SaveResult> {
        ingestion.prepare(UploadStatus::Saved)?;
        let request = ingestion.save_request();
        match self.api.save(ingestion.file.id, &request).await {
            Ok(result) => {
                ingestion.advance(UploadStatus::Saved)?;
                info!(invoice = ingestion.file.id, rows = result.saved_rows, "saved");
                Ok(result)
            }
            Err(e) => {
                ingestion.fail();
                Err(e)
            }
        }
    }

    /// Whole chain for a fresh upload, ending in `completed`.
    pub async fn run(
        &self,
        path: &Path,
        invoice_number: &str,
        file_type: Option<FileType>,
    ) -> Result<(Ingestion, SaveResult)> {
        let mut ingestion = self.upload(path, invoice_number, file_type).await?;
        self.inspect(&mut ingestion).await?;
        self.process(&mut ingestion, None).await?;
        let result = self.save(&mut ingestion).await?;
        ingestion.advance(UploadStatus::Completed)?;
        Ok((ingestion, result))
    }
}
