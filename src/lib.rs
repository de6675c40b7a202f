//! Client library for a telecom back-office billing API: classify and map
//! billing spreadsheets, drive their upload/processing lifecycle, and follow
//! server-side export jobs until the file is ready.

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod db;
pub mod detect;
pub mod error;
pub mod excel;
pub mod export;
pub mod filename;
pub mod logging;
pub mod mapping;
pub mod models;
pub mod pipeline;
pub mod types;

pub use error::{Error, Result};
