//! Batch file sources.
//!
//! A source lists pending batch files, parses them into typed rows and
//! removes them once they are safely ingested.

use async_trait::async_trait;
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::models::telemetry::REQUIRED_COLUMNS;
use crate::models::{RowError, TelemetryRow};

/// A batch file waiting to be ingested
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    /// File name, recorded in the ingestion log
    pub name: String,
    pub path: PathBuf,
}

/// Parsed contents of one batch file
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    /// Rows with their 1-based line numbers
    pub rows: Vec<(u64, TelemetryRow)>,
    /// Rows that could not be decoded
    pub row_errors: Vec<RowError>,
}

#[async_trait]
pub trait FileSource: Send + Sync {
    /// Pending files, in processing order
    async fn list_pending(&self) -> Result<Vec<SourceFile>, ServiceError>;

    /// Reads a whole file; fails only when the file as a whole is unusable
    async fn read_batch(&self, file: &SourceFile) -> Result<SourceBatch, ServiceError>;

    async fn remove(&self, file: &SourceFile) -> Result<(), ServiceError>;
}

/// Directory of `*.csv` files, processed in file-name order
#[derive(Debug, Clone)]
pub struct CsvDirectorySource {
    root: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl FileSource for CsvDirectorySource {
    async fn list_pending(&self) -> Result<Vec<SourceFile>, ServiceError> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            ServiceError::SourceError(format!(
                "cannot list {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_csv = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if !is_csv {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push(SourceFile { name, path });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(root = %self.root.display(), count = files.len(), "Listed pending batch files");
        Ok(files)
    }

    async fn read_batch(&self, file: &SourceFile) -> Result<SourceBatch, ServiceError> {
        let path = file.path.clone();
        tokio::task::spawn_blocking(move || read_csv_batch(&path))
            .await
            .map_err(|e| ServiceError::InternalError(format!("csv reader task failed: {}", e)))?
    }

    async fn remove(&self, file: &SourceFile) -> Result<(), ServiceError> {
        tokio::fs::remove_file(&file.path).await.map_err(|e| {
            ServiceError::SourceError(format!("cannot remove {}: {}", file.path.display(), e))
        })
    }
}

/// Parses a telemetry CSV file. Header problems fail the whole file; row problems are collected.
pub fn read_csv_batch(path: &Path) -> Result<SourceBatch, ServiceError> {
    let file = File::open(path)
        .map_err(|e| ServiceError::SourceError(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader
        .headers()
        .map_err(|e| ServiceError::SourceError(format!("{}: {}", path.display(), e)))?
        .clone();

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|h| h == *column))
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::SourceError(format!(
            "{}: missing column(s) {}",
            path.display(),
            missing.join(", ")
        )));
    }

    let mut batch = SourceBatch::default();
    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                warn!(file = %path.display(), line, error = %e, "Skipping undecodable row");
                batch.row_errors.push(RowError::new(line, e));
                continue;
            }
        };

        let line = record.position().map_or(0, |p| p.line());
        match record.deserialize::<TelemetryRow>(Some(&headers)) {
            Ok(row) => batch.rows.push((line, row)),
            Err(e) => {
                warn!(file = %path.display(), line, error = %e, "Skipping malformed row");
                batch.row_errors.push(RowError::new(line, e));
            }
        }
    }

    Ok(batch)
}
