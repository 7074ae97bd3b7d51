use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::app::ports::{DirectoryPort, FeedbackStore, OperatorDirectoryPort, PendingEntryStore};
use crate::domain::{
    BatchInsertReport, DirectoryEntry, FeedbackSubmission, NotificationFlags, Operator,
    PendingEntry, PendingStatus, SubmissionStatus, SurveyResponse,
};
use crate::error::{FeedbackError, Result};
use crate::normalize::{fold, DedupKey};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| FeedbackError::Storage {
        message: format!("in-memory store lock poisoned: {}", e),
    })
}

/// In-memory feedback store for development/testing
#[derive(Default)]
pub struct InMemoryFeedbackStore {
    submissions: Arc<Mutex<HashMap<Uuid, FeedbackSubmission>>>,
}

impl InMemoryFeedbackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.submissions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FeedbackStore for InMemoryFeedbackStore {
    async fn insert(&self, submission: &FeedbackSubmission) -> Result<()> {
        let mut submissions = lock(&self.submissions)?;
        if submissions
            .values()
            .any(|s| s.reference_code.eq_ignore_ascii_case(&submission.reference_code))
        {
            return Err(FeedbackError::Duplicate {
                what: format!("reference code {}", submission.reference_code),
            });
        }
        if submissions.values().any(|s| s.survey_token == submission.survey_token) {
            return Err(FeedbackError::Duplicate {
                what: "survey token".to_string(),
            });
        }
        submissions.insert(submission.id, submission.clone());

        debug!("Created submission {} with id {}", submission.reference_code, submission.id);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<FeedbackSubmission>> {
        Ok(lock(&self.submissions)?.get(&id).cloned())
    }

    async fn get_by_reference(&self, reference_code: &str) -> Result<Option<FeedbackSubmission>> {
        let submissions = lock(&self.submissions)?;
        Ok(submissions
            .values()
            .find(|s| s.reference_code.eq_ignore_ascii_case(reference_code))
            .cloned())
    }

    async fn get_by_survey_token(&self, token: &str) -> Result<Option<FeedbackSubmission>> {
        let submissions = lock(&self.submissions)?;
        Ok(submissions.values().find(|s| s.survey_token == token).cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: SubmissionStatus,
        to: SubmissionStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<FeedbackSubmission>> {
        let mut submissions = lock(&self.submissions)?;
        let submission = submissions
            .get_mut(&id)
            .ok_or_else(|| FeedbackError::not_found("feedback submission", id))?;
        if submission.status != from {
            return Ok(None);
        }
        submission.apply_status(to, at);
        debug!("Submission {} moved {} -> {}", id, from, to);
        Ok(Some(submission.clone()))
    }

    async fn record_notification_flags(
        &self,
        id: Uuid,
        flags: NotificationFlags,
    ) -> Result<FeedbackSubmission> {
        let mut submissions = lock(&self.submissions)?;
        let submission = submissions
            .get_mut(&id)
            .ok_or_else(|| FeedbackError::not_found("feedback submission", id))?;
        submission.merge_flags(flags, Utc::now());
        Ok(submission.clone())
    }

    async fn record_survey(&self, id: Uuid, response: &SurveyResponse) -> Result<bool> {
        let mut submissions = lock(&self.submissions)?;
        let submission = submissions
            .get_mut(&id)
            .ok_or_else(|| FeedbackError::not_found("feedback submission", id))?;
        if submission.survey.is_some() {
            return Ok(false);
        }
        submission.survey = Some(response.clone());
        submission.updated_at = response.completed_at;
        Ok(true)
    }
}

/// In-memory moderation queue. Enforces the same active dedup-key uniqueness
/// as the SQLite partial index.
#[derive(Default)]
pub struct InMemoryPendingEntryStore {
    entries: Arc<Mutex<HashMap<Uuid, PendingEntry>>>,
}

impl InMemoryPendingEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_active_in<'a>(
    entries: &'a HashMap<Uuid, PendingEntry>,
    key: &DedupKey,
) -> Option<&'a PendingEntry> {
    entries
        .values()
        .find(|e| e.status.is_active() && &e.dedup_key() == key)
}

#[async_trait]
impl PendingEntryStore for InMemoryPendingEntryStore {
    async fn find_active(&self, key: &DedupKey) -> Result<Option<PendingEntry>> {
        let entries = lock(&self.entries)?;
        Ok(find_active_in(&entries, key).cloned())
    }

    async fn insert_batch(&self, batch: &[PendingEntry]) -> Result<BatchInsertReport> {
        let mut entries = lock(&self.entries)?;
        let mut report = BatchInsertReport::default();

        for entry in batch {
            if entry.status.is_active() && find_active_in(&entries, &entry.dedup_key()).is_some() {
                debug!("Skipped duplicate {} candidate '{}'", entry.category, entry.value);
                report.skipped += 1;
                continue;
            }
            entries.insert(entry.id, entry.clone());
            report.inserted.push(entry.id);
        }
        Ok(report)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PendingEntry>> {
        Ok(lock(&self.entries)?.get(&id).cloned())
    }

    async fn update(&self, entry: &PendingEntry) -> Result<()> {
        let mut entries = lock(&self.entries)?;
        if !entries.contains_key(&entry.id) {
            return Err(FeedbackError::not_found("pending entry", entry.id));
        }
        entries.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn list(&self, status: Option<PendingStatus>) -> Result<Vec<PendingEntry>> {
        let entries = lock(&self.entries)?;
        let mut listed: Vec<PendingEntry> = entries
            .values()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect();
        listed.sort_by_key(|e| e.created_at);
        Ok(listed)
    }
}

/// In-memory canonical directory
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: Arc<Mutex<Vec<DirectoryEntry>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<DirectoryEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

fn same_place(entry: &DirectoryEntry, name: &str, region: &str, sub_region: &str) -> bool {
    fold(&entry.name) == fold(name)
        && fold(&entry.region) == fold(region)
        && fold(&entry.sub_region) == fold(sub_region)
}

#[async_trait]
impl DirectoryPort for InMemoryDirectory {
    async fn exists(&self, name: &str, region: &str, sub_region: &str) -> Result<bool> {
        let entries = lock(&self.entries)?;
        Ok(entries.iter().any(|e| same_place(e, name, region, sub_region)))
    }

    async fn insert(
        &self,
        name: &str,
        region: &str,
        sub_region: &str,
        classification: &str,
    ) -> Result<DirectoryEntry> {
        let mut entries = lock(&self.entries)?;
        if entries.iter().any(|e| same_place(e, name, region, sub_region)) {
            return Err(FeedbackError::Duplicate {
                what: format!("directory entry {} ({}, {})", name, region, sub_region),
            });
        }
        let entry = DirectoryEntry {
            id: Uuid::new_v4(),
            name: name.to_string(),
            region: region.to_string(),
            sub_region: sub_region.to_string(),
            classification: classification.to_string(),
            created_at: Utc::now(),
        };
        entries.push(entry.clone());

        debug!("Created directory entry {} with id {}", entry.name, entry.id);
        Ok(entry)
    }
}

/// Operator list that can be swapped at runtime
#[derive(Default)]
pub struct InMemoryOperatorDirectory {
    operators: Arc<Mutex<Vec<Operator>>>,
}

impl InMemoryOperatorDirectory {
    pub fn new(operators: Vec<Operator>) -> Self {
        Self {
            operators: Arc::new(Mutex::new(operators)),
        }
    }

    pub fn set_operators(&self, operators: Vec<Operator>) {
        if let Ok(mut current) = self.operators.lock() {
            *current = operators;
        }
    }
}

#[async_trait]
impl OperatorDirectoryPort for InMemoryOperatorDirectory {
    async fn active_operators(&self) -> Result<Vec<Operator>> {
        let operators = lock(&self.operators)?;
        Ok(operators.iter().filter(|op| op.active).cloned().collect())
    }
}
