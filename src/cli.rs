use crate::models::{ExportFormat, FileType};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "billing-ingest", version)]
#[command(about = "Upload, map and export back-office billing spreadsheets", long_about = None)]
pub struct Cli {
    /// Enable debug logging (BILLING_LOG / RUST_LOG still take precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Guess the file type of a local spreadsheet
    Detect {
        file: PathBuf,
        /// Type reported by the server, tried first
        #[arg(long)]
        hint: Option<String>,
    },
    /// Preview how a local spreadsheet maps onto backend fields
    Map {
        file: PathBuf,
        #[arg(long)]
        file_type: Option<FileType>,
        /// Rows to preview
        #[arg(short = 'n', long, default_value = "10")]
        rows: usize,
        /// Also write the mapped preview to this .xlsx file
        #[arg(long)]
        xlsx: Option<PathBuf>,
    },
    /// Upload a spreadsheet; with --save, run inspect, process and save too
    Upload {
        file: PathBuf,
        #[arg(long)]
        invoice_number: Option<String>,
        #[arg(long)]
        file_type: Option<FileType>,
        #[arg(long)]
        save: bool,
    },
    /// Show the server's inspection of an upload, mapped
    Inspect { id: i64 },
    /// Run server-side cleaning on an upload
    Process { id: i64 },
    /// Persist processed rows of an upload
    Save { id: i64 },
    /// Download the original file of an upload
    Download {
        id: i64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete an upload
    Delete { id: i64 },
    /// List uploads
    List,
    /// List persisted rows for a file type
    Records {
        file_type: FileType,
        /// Only rows from this upload
        #[arg(long)]
        invoice: Option<i64>,
    },
    /// Export a dataset and download the result
    Export {
        data_type: String,
        #[arg(long, default_value = "excel")]
        format: ExportFormat,
        /// key=value, repeatable
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
        /// Directory to write into (default: Downloads)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Follow the job with live notifications; Ctrl-C cancels it
        #[arg(long)]
        track: bool,
    },
    /// Recent downloads
    History {
        #[arg(long)]
        clear: bool,
    },
    /// Manage mapping overrides
    Override {
        #[command(subcommand)]
        action: OverrideAction,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Subcommand)]
pub enum OverrideAction {
    /// Map a raw header to a backend field for one file type
    Set {
        file_type: FileType,
        raw_header: String,
        field_key: String,
    },
    /// List overrides
    List { file_type: Option<FileType> },
    /// Remove an override
    Delete { file_type: FileType, raw_header: String },
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {:?}", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty filter key in {:?}", s));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
