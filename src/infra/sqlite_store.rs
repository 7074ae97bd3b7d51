//! SQLite-backed stores for submissions, the moderation queue and the directory.
//!
//! The application-level dedup check is only an optimisation; the partial
//! unique index on `pending_entries.dedup_key` is what turns a concurrent
//! duplicate insert into an ignored second write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::app::ports::{DirectoryPort, FeedbackStore, PendingEntryStore};
use crate::domain::{
    BatchInsertReport, DirectoryEntry, FeedbackSubmission, NotificationFlags, PendingEntry,
    PendingStatus, SubmissionStatus, SurveyResponse,
};
use crate::error::{FeedbackError, Result};
use crate::normalize::{fold, DedupKey};

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    CREATE TABLE IF NOT EXISTS feedback_submissions (
        id              TEXT PRIMARY KEY,
        reference_code  TEXT NOT NULL UNIQUE,
        survey_token    TEXT NOT NULL UNIQUE,
        status          TEXT NOT NULL,
        body            TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        updated_at      TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS pending_entries (
        id           TEXT PRIMARY KEY,
        category     TEXT NOT NULL,
        value        TEXT NOT NULL,
        region       TEXT,
        sub_region   TEXT,
        status       TEXT NOT NULL,
        feedback_id  TEXT,
        resolved_by  TEXT,
        resolved_at  TEXT,
        created_at   TEXT NOT NULL,
        dedup_key    TEXT NOT NULL
    );
    CREATE UNIQUE INDEX IF NOT EXISTS ux_pending_entries_active_key
        ON pending_entries (dedup_key)
        WHERE status IN ('pending', 'approved');
    CREATE INDEX IF NOT EXISTS ix_pending_entries_status
        ON pending_entries (status, created_at);
    CREATE TABLE IF NOT EXISTS directory_entries (
        id              TEXT PRIMARY KEY,
        name            TEXT NOT NULL,
        region          TEXT NOT NULL,
        sub_region      TEXT NOT NULL,
        classification  TEXT NOT NULL,
        name_key        TEXT NOT NULL,
        region_key      TEXT NOT NULL,
        sub_region_key  TEXT NOT NULL,
        created_at      TEXT NOT NULL,
        UNIQUE (name_key, region_key, sub_region_key)
    );
"#;

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| FeedbackError::Storage {
            message: format!("sqlite connection lock poisoned: {}", e),
        })
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| FeedbackError::Storage {
        message: format!("invalid uuid '{}' in database: {}", raw, e),
    })
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FeedbackError::Storage {
            message: format!("invalid timestamp '{}' in database: {}", raw, e),
        })
}

// ---------------------------------------------------------------------------
// Feedback submissions
// ---------------------------------------------------------------------------

#[async_trait]
impl FeedbackStore for SqliteStore {
    async fn insert(&self, submission: &FeedbackSubmission) -> Result<()> {
        let body = serde_json::to_string(submission)?;
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO feedback_submissions
                (id, reference_code, survey_token, status, body, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                submission.id.to_string(),
                submission.reference_code.to_uppercase(),
                submission.survey_token,
                submission.status.as_str(),
                body,
                submission.created_at.to_rfc3339(),
                submission.updated_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => {
                debug!(
                    "Created submission {} with id {}",
                    submission.reference_code, submission.id
                );
                Ok(())
            }
            Err(e) if is_constraint_violation(&e) => Err(FeedbackError::Duplicate {
                what: format!("submission identifiers for {}", submission.reference_code),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<FeedbackSubmission>> {
        let conn = self.conn()?;
        select_submission(&conn, "id", &id.to_string())
    }

    async fn get_by_reference(&self, reference_code: &str) -> Result<Option<FeedbackSubmission>> {
        let conn = self.conn()?;
        select_submission(&conn, "reference_code", &reference_code.to_uppercase())
    }

    async fn get_by_survey_token(&self, token: &str) -> Result<Option<FeedbackSubmission>> {
        let conn = self.conn()?;
        select_submission(&conn, "survey_token", token)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: SubmissionStatus,
        to: SubmissionStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<FeedbackSubmission>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut submission = select_submission(&tx, "id", &id.to_string())?
            .ok_or_else(|| FeedbackError::not_found("feedback submission", id))?;
        if submission.status != from {
            return Ok(None);
        }
        submission.apply_status(to, at);

        let changed = tx.execute(
            "UPDATE feedback_submissions SET status = ?2, body = ?3, updated_at = ?4
             WHERE id = ?1 AND status = ?5",
            params![
                id.to_string(),
                to.as_str(),
                serde_json::to_string(&submission)?,
                at.to_rfc3339(),
                from.as_str(),
            ],
        )?;
        tx.commit()?;
        if changed == 0 {
            return Ok(None);
        }
        debug!("Submission {} moved {} -> {}", id, from, to);
        Ok(Some(submission))
    }

    async fn record_notification_flags(
        &self,
        id: Uuid,
        flags: NotificationFlags,
    ) -> Result<FeedbackSubmission> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut submission = select_submission(&tx, "id", &id.to_string())?
            .ok_or_else(|| FeedbackError::not_found("feedback submission", id))?;
        submission.merge_flags(flags, Utc::now());

        // The status column is left alone; the body is rewritten from the row
        // read inside this transaction, so it carries the current status.
        tx.execute(
            "UPDATE feedback_submissions SET body = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(&submission)?,
                submission.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(submission)
    }

    async fn record_survey(&self, id: Uuid, response: &SurveyResponse) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut submission = select_submission(&tx, "id", &id.to_string())?
            .ok_or_else(|| FeedbackError::not_found("feedback submission", id))?;
        if submission.survey.is_some() {
            return Ok(false);
        }
        submission.survey = Some(response.clone());
        submission.updated_at = response.completed_at;

        let changed = tx.execute(
            "UPDATE feedback_submissions SET body = ?2, updated_at = ?3
             WHERE id = ?1 AND json_extract(body, '$.survey') IS NULL",
            params![
                id.to_string(),
                serde_json::to_string(&submission)?,
                submission.updated_at.to_rfc3339(),
            ],
        )?;
        tx.commit()?;
        Ok(changed == 1)
    }
}

/// Load one submission body by a unique column
fn select_submission(
    conn: &Connection,
    column: &'static str,
    key: &str,
) -> Result<Option<FeedbackSubmission>> {
    let body: Option<String> = conn
        .query_row(
            &format!("SELECT body FROM feedback_submissions WHERE {} = ?1", column),
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| serde_json::from_str(&b).map_err(FeedbackError::from))
        .transpose()
}

// ---------------------------------------------------------------------------
// Pending entries
// ---------------------------------------------------------------------------

const PENDING_COLUMNS: &str = "id, category, value, region, sub_region, status, feedback_id, \
     resolved_by, resolved_at, created_at";

struct PendingRow {
    id: String,
    category: String,
    value: String,
    region: Option<String>,
    sub_region: Option<String>,
    status: String,
    feedback_id: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<String>,
    created_at: String,
}

impl PendingRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            category: row.get(1)?,
            value: row.get(2)?,
            region: row.get(3)?,
            sub_region: row.get(4)?,
            status: row.get(5)?,
            feedback_id: row.get(6)?,
            resolved_by: row.get(7)?,
            resolved_at: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_entry(self) -> Result<PendingEntry> {
        Ok(PendingEntry {
            id: parse_uuid(&self.id)?,
            category: self.category.parse()?,
            value: self.value,
            region: self.region,
            sub_region: self.sub_region,
            status: self.status.parse()?,
            feedback_id: self.feedback_id.as_deref().map(parse_uuid).transpose()?,
            resolved_by: self.resolved_by,
            resolved_at: self.resolved_at.as_deref().map(parse_time).transpose()?,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

#[async_trait]
impl PendingEntryStore for SqliteStore {
    async fn find_active(&self, key: &DedupKey) -> Result<Option<PendingEntry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM pending_entries
                     WHERE dedup_key = ?1 AND status IN ('pending', 'approved')",
                    PENDING_COLUMNS
                ),
                params![key.fingerprint()],
                PendingRow::from_row,
            )
            .optional()?;
        row.map(PendingRow::into_entry).transpose()
    }

    async fn insert_batch(&self, entries: &[PendingEntry]) -> Result<BatchInsertReport> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut report = BatchInsertReport::default();
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO pending_entries
                    (id, category, value, region, sub_region, status, feedback_id,
                     resolved_by, resolved_at, created_at, dedup_key)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for entry in entries {
                let changed = stmt.execute(params![
                    entry.id.to_string(),
                    entry.category.as_str(),
                    entry.value,
                    entry.region,
                    entry.sub_region,
                    entry.status.as_str(),
                    entry.feedback_id.map(|id| id.to_string()),
                    entry.resolved_by,
                    entry.resolved_at.map(|t| t.to_rfc3339()),
                    entry.created_at.to_rfc3339(),
                    entry.dedup_key().fingerprint(),
                ])?;
                if changed == 0 {
                    debug!("Skipped duplicate {} candidate '{}'", entry.category, entry.value);
                    report.skipped += 1;
                } else {
                    report.inserted.push(entry.id);
                }
            }
        }
        tx.commit()?;
        Ok(report)
    }

    async fn get(&self, id: Uuid) -> Result<Option<PendingEntry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM pending_entries WHERE id = ?1", PENDING_COLUMNS),
                params![id.to_string()],
                PendingRow::from_row,
            )
            .optional()?;
        row.map(PendingRow::into_entry).transpose()
    }

    async fn update(&self, entry: &PendingEntry) -> Result<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            "UPDATE pending_entries
             SET status = ?2, resolved_by = ?3, resolved_at = ?4
             WHERE id = ?1",
            params![
                entry.id.to_string(),
                entry.status.as_str(),
                entry.resolved_by,
                entry.resolved_at.map(|t| t.to_rfc3339()),
            ],
        );
        match result {
            Ok(0) => Err(FeedbackError::not_found("pending entry", entry.id)),
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(FeedbackError::Duplicate {
                what: format!("active {} entry '{}'", entry.category, entry.value),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, status: Option<PendingStatus>) -> Result<Vec<PendingEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM pending_entries
             WHERE ?1 IS NULL OR status = ?1
             ORDER BY created_at",
            PENDING_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![status.map(|s| s.as_str())], PendingRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(PendingRow::into_entry).collect()
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[async_trait]
impl DirectoryPort for SqliteStore {
    async fn exists(&self, name: &str, region: &str, sub_region: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<String> = conn
            .query_row(
                "SELECT id FROM directory_entries
                 WHERE name_key = ?1 AND region_key = ?2 AND sub_region_key = ?3",
                params![fold(name), fold(region), fold(sub_region)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn insert(
        &self,
        name: &str,
        region: &str,
        sub_region: &str,
        classification: &str,
    ) -> Result<DirectoryEntry> {
        let entry = DirectoryEntry {
            id: Uuid::new_v4(),
            name: name.to_string(),
            region: region.to_string(),
            sub_region: sub_region.to_string(),
            classification: classification.to_string(),
            created_at: Utc::now(),
        };
        let conn = self.conn()?;
        let result = conn.execute(
            "INSERT INTO directory_entries
                (id, name, region, sub_region, classification,
                 name_key, region_key, sub_region_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.id.to_string(),
                entry.name,
                entry.region,
                entry.sub_region,
                entry.classification,
                fold(name),
                fold(region),
                fold(sub_region),
                entry.created_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => {
                debug!("Created directory entry {} with id {}", entry.name, entry.id);
                Ok(entry)
            }
            Err(e) if is_constraint_violation(&e) => Err(FeedbackError::Duplicate {
                what: format!("directory entry {} ({}, {})", name, region, sub_region),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PendingCategory;

    fn facility(value: &str) -> PendingEntry {
        PendingEntry::new(
            PendingCategory::Facility,
            value.to_string(),
            Some("Lagos".to_string()),
            Some("Ikeja".to_string()),
            None,
        )
    }

    #[tokio::test]
    async fn partial_index_ignores_active_duplicates() {
        let store = SqliteStore::open_in_memory().unwrap();
        let report = store
            .insert_batch(&[facility("Hope Clinic"), facility("hope  clinic")])
            .await
            .unwrap();
        assert_eq!(report.inserted.len(), 1);
        assert_eq!(report.skipped, 1);

        let found = store
            .find_active(&facility("HOPE CLINIC").dedup_key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.value, "Hope Clinic");
    }

    #[tokio::test]
    async fn rejected_rows_leave_the_key_free() {
        let store = SqliteStore::open_in_memory().unwrap();
        let entry = facility("Hope Clinic");
        store.insert_batch(&[entry.clone()]).await.unwrap();

        let mut rejected = entry;
        rejected.status = PendingStatus::Rejected;
        rejected.resolved_by = Some("moderator".to_string());
        rejected.resolved_at = Some(Utc::now());
        PendingEntryStore::update(&store, &rejected).await.unwrap();

        let report = store.insert_batch(&[facility("Hope Clinic")]).await.unwrap();
        assert_eq!(report.inserted.len(), 1);
        assert_eq!(store.list(None).await.unwrap().len(), 2);
        assert_eq!(store.list(Some(PendingStatus::Rejected)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn directory_unique_by_folded_triple() {
        let store = SqliteStore::open_in_memory().unwrap();
        DirectoryPort::insert(&store, "Hope Clinic", "Lagos", "Ikeja", "lagos/ikeja")
            .await
            .unwrap();

        assert!(store.exists("HOPE clinic", "lagos", "IKEJA").await.unwrap());
        assert!(!store.exists("Hope Clinic", "Lagos", "Yaba").await.unwrap());
        let err = DirectoryPort::insert(&store, "hope clinic", "LAGOS", "ikeja", "lagos/ikeja")
            .await
            .unwrap_err();
        assert!(err.is_duplicate());
    }

    fn stored_submission() -> FeedbackSubmission {
        use crate::domain::{ContactInfo, FeedbackCategory, FeedbackPayload};

        let payload = FeedbackPayload {
            category: FeedbackCategory::Complaint,
            description: "No water on the ward".to_string(),
            anonymous: false,
            contact: ContactInfo {
                name: None,
                email: Some("amaka@example.org".to_string()),
                phone: None,
            },
            facility: None,
            department: None,
            location: None,
            staff_name: None,
            issue_type: None,
            issue_other: None,
            incident_date: None,
            attachment_keys: Vec::new(),
        };
        FeedbackSubmission::from_payload(
            payload,
            "FB-20240101-QQQQ1".to_string(),
            "token-1".to_string(),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn flags_do_not_overwrite_a_newer_status() {
        let store = SqliteStore::open_in_memory().unwrap();
        let submission = stored_submission();
        FeedbackStore::insert(&store, &submission).await.unwrap();

        let now = Utc::now();
        let closed = store
            .transition_status(submission.id, SubmissionStatus::New, SubmissionStatus::Closed, now)
            .await
            .unwrap();
        assert!(closed.is_some());

        let flags = NotificationFlags {
            confirmation_sent: true,
            followup_sent: true,
            closure_sent: false,
        };
        store.record_notification_flags(submission.id, flags).await.unwrap();

        let current = FeedbackStore::get(&store, submission.id).await.unwrap().unwrap();
        assert_eq!(current.status, SubmissionStatus::Closed);
        assert!(current.closed_at.is_some());
        assert!(current.confirmation_sent);
        assert!(current.followup_sent);
    }

    #[tokio::test]
    async fn stale_prior_status_is_not_applied() {
        let store = SqliteStore::open_in_memory().unwrap();
        let submission = stored_submission();
        FeedbackStore::insert(&store, &submission).await.unwrap();
        let now = Utc::now();

        store
            .transition_status(submission.id, SubmissionStatus::New, SubmissionStatus::Closed, now)
            .await
            .unwrap();
        let stale = store
            .transition_status(submission.id, SubmissionStatus::New, SubmissionStatus::New, now)
            .await
            .unwrap();

        assert!(stale.is_none());
        let current = FeedbackStore::get(&store, submission.id).await.unwrap().unwrap();
        assert_eq!(current.status, SubmissionStatus::Closed);
    }

    #[tokio::test]
    async fn survey_answer_is_written_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let submission = stored_submission();
        FeedbackStore::insert(&store, &submission).await.unwrap();
        let answer = |rating| SurveyResponse {
            rating,
            comment: None,
            completed_at: Utc::now(),
        };

        assert!(store.record_survey(submission.id, &answer(4)).await.unwrap());
        assert!(!store.record_survey(submission.id, &answer(2)).await.unwrap());

        let current = FeedbackStore::get(&store, submission.id).await.unwrap().unwrap();
        assert_eq!(current.survey.map(|s| s.rating), Some(4));
    }
}
