//! Portfolio file storage on the local disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::channels::{Attachment, AttachmentKind, FileFetcher};
use crate::error::StorageError;

use super::traits::PortfolioStore;

/// Copies uploaded portfolios into a fixed directory.
pub struct LocalPortfolioStore {
    dir: PathBuf,
    fetcher: Arc<dyn FileFetcher>,
}

impl LocalPortfolioStore {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn FileFetcher>) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the portfolio directory if it does not exist.
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).await?;
        Ok(())
    }
}

#[async_trait]
impl PortfolioStore for LocalPortfolioStore {
    async fn save(
        &self,
        attachment: &Attachment,
        applicant_name: &str,
    ) -> Result<String, StorageError> {
        let bytes = self
            .fetcher
            .fetch(attachment)
            .await
            .map_err(|e| StorageError::Fetch {
                file_id: attachment.file_id.clone(),
                reason: e.to_string(),
            })?;

        let file_name = portfolio_file_name(applicant_name, attachment);
        fs::create_dir_all(&self.dir).await?;

        // Write under a temporary name so a half-written file never carries
        // the final name.
        let path = self.dir.join(&file_name);
        let partial = self.dir.join(format!(".{file_name}.part"));
        if let Err(e) = fs::write(&partial, &bytes).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }
        fs::rename(&partial, &path).await?;

        info!(
            path = %path.display(),
            bytes = bytes.len(),
            "Stored portfolio upload"
        );
        Ok(path.to_string_lossy().into_owned())
    }
}

/// `<Applicant_Name>_<suffix><ext>`: photos get `.jpg`, documents keep their
/// own extension. The suffix is the transport's unique id, or a fresh UUID.
pub fn portfolio_file_name(applicant_name: &str, attachment: &Attachment) -> String {
    let name = Some(sanitize(&applicant_name.trim().replace(' ', "_")))
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "applicant".to_string());

    let suffix = attachment
        .unique_id
        .as_deref()
        .map(sanitize)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string());

    let ext = match attachment.kind {
        AttachmentKind::Photo => ".jpg".to_string(),
        AttachmentKind::Document => attachment
            .file_name
            .as_deref()
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .map(sanitize)
            .filter(|e| !e.is_empty())
            .map(|e| format!(".{e}"))
            .unwrap_or_default(),
    };

    format!("{name}_{suffix}{ext}")
}

/// Keep letters, digits, `_` and `-`; drop everything else.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}
