use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    BatchInsertReport, Delivery, DirectoryEntry, FeedbackSubmission, NotificationFlags,
    NotificationRequest, Operator, PendingEntry, PendingStatus, SubmissionStatus, SurveyResponse,
};
use crate::error::Result;
use crate::normalize::DedupKey;

#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Fails with `Duplicate` when the reference code or survey token is taken
    async fn insert(&self, submission: &FeedbackSubmission) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<FeedbackSubmission>>;
    async fn get_by_reference(&self, reference_code: &str) -> Result<Option<FeedbackSubmission>>;
    async fn get_by_survey_token(&self, token: &str) -> Result<Option<FeedbackSubmission>>;

    /// Move status from `from` to `to` only if it is still `from`.
    /// `None` means another writer changed the status first.
    async fn transition_status(
        &self,
        id: Uuid,
        from: SubmissionStatus,
        to: SubmissionStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<FeedbackSubmission>>;

    /// Set delivery flags. Never clears a flag and never touches status.
    async fn record_notification_flags(
        &self,
        id: Uuid,
        flags: NotificationFlags,
    ) -> Result<FeedbackSubmission>;

    /// Store a survey answer unless one is already stored. `false` when it was.
    async fn record_survey(&self, id: Uuid, response: &SurveyResponse) -> Result<bool>;
}

#[async_trait]
pub trait PendingEntryStore: Send + Sync {
    /// Pending or approved entry matching the key, compared case-insensitively
    async fn find_active(&self, key: &DedupKey) -> Result<Option<PendingEntry>>;
    /// Entries that collide with an active key are skipped, not errors
    async fn insert_batch(&self, entries: &[PendingEntry]) -> Result<BatchInsertReport>;
    async fn get(&self, id: Uuid) -> Result<Option<PendingEntry>>;
    async fn update(&self, entry: &PendingEntry) -> Result<()>;
    async fn list(&self, status: Option<PendingStatus>) -> Result<Vec<PendingEntry>>;
}

/// Canonical directory: read-side lookup plus its write-side sibling
#[async_trait]
pub trait DirectoryPort: Send + Sync {
    async fn exists(&self, name: &str, region: &str, sub_region: &str) -> Result<bool>;
    /// Fails with `Duplicate` when (name, region, sub_region) is already present
    async fn insert(
        &self,
        name: &str,
        region: &str,
        sub_region: &str,
        classification: &str,
    ) -> Result<DirectoryEntry>;
}

/// One delivery channel (email gateway, SMS gateway, ...)
#[async_trait]
pub trait NotifierPort: Send + Sync {
    async fn send(&self, request: &NotificationRequest) -> Result<Delivery>;
}

#[async_trait]
pub trait OperatorDirectoryPort: Send + Sync {
    async fn active_operators(&self) -> Result<Vec<Operator>>;
}
