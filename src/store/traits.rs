//! Storage traits the dialogue controller writes through.

use async_trait::async_trait;

use crate::channels::Attachment;
use crate::error::StorageError;
use crate::registration::model::SubmissionRecord;

/// Append-only destination for completed registrations.
///
/// Implementations must be safe under concurrent calls and must never leave a
/// partial row behind when an append fails.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    /// Append one record as a new row.
    async fn append(&self, record: &SubmissionRecord) -> Result<(), StorageError>;
}

/// Durable storage for uploaded portfolio files.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// Copy the attachment into storage and return its stored path.
    async fn save(&self, attachment: &Attachment, applicant_name: &str)
    -> Result<String, StorageError>;
}
