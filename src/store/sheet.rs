//! CSV-backed submission sheet.
//!
//! One header row written on first use, then one row per completed
//! registration. Rows are only ever appended.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::registration::model::{Schema, SubmissionRecord};

use super::traits::SubmissionSink;

/// Append-only CSV sheet with a fixed header.
pub struct CsvSheet {
    path: PathBuf,
    headers: Vec<String>,
    /// Serializes appends from concurrent registrations.
    write_lock: Mutex<()>,
}

impl CsvSheet {
    /// Open the sheet at `path`, writing the header row if the file is absent
    /// or empty. Fails if an existing header does not match `schema`.
    pub async fn open(path: impl Into<PathBuf>, schema: &Schema) -> Result<Self, StorageError> {
        let path = path.into();
        let headers = schema.headers();

        let (p, h) = (path.clone(), headers.clone());
        let created = run_blocking(move || ensure_header(&p, &h)).await?;
        if created {
            info!(path = %path.display(), columns = headers.len(), "Created submission sheet");
        } else {
            debug!(path = %path.display(), "Opened existing submission sheet");
        }

        Ok(Self {
            path,
            headers,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Read back every data row (header excluded).
    pub async fn rows(&self) -> Result<Vec<Vec<String>>, StorageError> {
        let path = self.path.clone();
        run_blocking(move || {
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(true)
                .from_path(&path)?;
            let mut rows = Vec::new();
            for record in reader.records() {
                rows.push(record?.iter().map(String::from).collect());
            }
            Ok(rows)
        })
        .await
    }
}

#[async_trait]
impl SubmissionSink for CsvSheet {
    async fn append(&self, record: &SubmissionRecord) -> Result<(), StorageError> {
        let found: Vec<String> = record
            .values
            .iter()
            .map(|(f, _)| f.header().to_string())
            .collect();
        if found != self.headers {
            return Err(StorageError::SchemaMismatch {
                path: self.path.display().to_string(),
                expected: self.headers.clone(),
                found,
            });
        }

        let bytes = encode_row(record.row())?;
        let _guard = self.write_lock.lock().await;
        let path = self.path.clone();
        run_blocking(move || append_bytes(&path, &bytes)).await?;

        debug!(path = %self.path.display(), "Appended submission row");
        Ok(())
    }
}

/// Write the header if needed. Returns `true` if the header was written.
fn ensure_header(path: &Path, headers: &[String]) -> Result<bool, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let has_content = match std::fs::metadata(path) {
        Ok(meta) => meta.len() > 0,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => return Err(e.into()),
    };

    if !has_content {
        let bytes = encode_row(headers)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        // Another writer may have raced us between the check and the open.
        if file.metadata()?.len() == 0 {
            file.write_all(&bytes)?;
            file.sync_all()?;
            return Ok(true);
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    let found: Vec<String> = match reader.records().next() {
        Some(record) => record?.iter().map(String::from).collect(),
        None => Vec::new(),
    };
    if found != headers {
        return Err(StorageError::SchemaMismatch {
            path: path.display().to_string(),
            expected: headers.to_vec(),
            found,
        });
    }
    Ok(false)
}

/// Encode one CSV row in memory so it reaches the file in a single write.
fn encode_row<I, T>(cells: I) -> Result<Vec<u8>, StorageError>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(cells)?;
    writer
        .into_inner()
        .map_err(|e| StorageError::Io(e.into_error()))
}

/// Append `bytes` to the sheet, truncating back to the previous length if the
/// write fails part-way.
fn append_bytes(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    let prior_len = file.metadata()?.len();

    if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_data()) {
        if let Err(rollback) = file.set_len(prior_len) {
            warn!(
                path = %path.display(),
                error = %rollback,
                "Failed to roll back partial row"
            );
        }
        return Err(e.into());
    }
    Ok(())
}

async fn run_blocking<T, F>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
}
