use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::notification_dispatcher::{case_closed_intents, NotificationDispatcher};
use crate::app::ports::{DirectoryPort, FeedbackStore, PendingEntryStore};
use crate::constants::MAX_STATUS_ATTEMPTS;
use crate::domain::{
    any_delivered, Decision, FeedbackSubmission, IntentKind, NotificationFlags, PendingEntry,
    PendingStatus, PromotionOutcome, Resolution, SubmissionStatus,
};
use crate::error::{FeedbackError, Result};
use crate::normalize::fold;
use crate::observability::ModerationMetrics;

/// Operator-driven transitions for moderation candidates and submissions
pub struct ModerationUseCase {
    pending_store: Arc<dyn PendingEntryStore>,
    feedback_store: Arc<dyn FeedbackStore>,
    directory: Arc<dyn DirectoryPort>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl ModerationUseCase {
    pub fn new(
        pending_store: Arc<dyn PendingEntryStore>,
        feedback_store: Arc<dyn FeedbackStore>,
        directory: Arc<dyn DirectoryPort>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            pending_store,
            feedback_store,
            directory,
            dispatcher,
        }
    }

    /// Approve or reject a pending entry.
    ///
    /// Approving an already-approved entry is an idempotent retry: the original
    /// resolution is kept and promotion runs again against the live directory.
    /// Flipping a resolved entry to the other decision is refused.
    pub async fn resolve_pending_entry(
        &self,
        id: Uuid,
        decision: Decision,
        actor: &str,
    ) -> Result<Resolution> {
        let mut entry = self
            .pending_store
            .get(id)
            .await?
            .ok_or_else(|| FeedbackError::not_found("pending entry", id))?;

        let target = decision.target_status();
        match entry.status {
            PendingStatus::Pending => {
                entry.status = target;
                entry.resolved_by = Some(actor.to_string());
                entry.resolved_at = Some(Utc::now());
                self.pending_store.update(&entry).await?;
                ModerationMetrics::record_resolution(decision);
                info!(
                    "{} {} entry '{}' ({}) by {}",
                    target, entry.category, entry.value, entry.id, actor
                );
            }
            current if current == target => {
                info!(
                    "{} entry {} already {}, re-running side effects",
                    entry.category, entry.id, current
                );
            }
            current => {
                return Err(FeedbackError::InvalidTransition {
                    from: current.to_string(),
                    to: target.to_string(),
                });
            }
        }

        let promotion = match decision {
            Decision::Approved if entry.category.is_directory_backed() => {
                self.promote(&entry).await
            }
            _ => PromotionOutcome::NotApplicable,
        };
        ModerationMetrics::record_promotion(&promotion);

        Ok(Resolution { entry, promotion })
    }

    /// Write an approved facility into the directory unless it is already there.
    ///
    /// The existence check runs again here, at commit time, because the check
    /// made when the candidate was created may be stale. A failure is reported
    /// as a warning outcome; the entry's own transition stays recorded.
    async fn promote(&self, entry: &PendingEntry) -> PromotionOutcome {
        let (Some(region), Some(sub_region)) =
            (entry.region.as_deref(), entry.sub_region.as_deref())
        else {
            warn!("Facility entry {} has no region/sub-region, not promoting", entry.id);
            return PromotionOutcome::Failed(
                "facility entry is missing region or sub-region".to_string(),
            );
        };

        match self.directory.exists(&entry.value, region, sub_region).await {
            Ok(true) => {
                info!("Directory already lists '{}' in {}/{}", entry.value, region, sub_region);
                return PromotionOutcome::AlreadyPresent;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Directory re-check failed for entry {}: {}", entry.id, e);
                return PromotionOutcome::Failed(e.to_string());
            }
        }

        let classification = region_classification(region, sub_region);
        match self
            .directory
            .insert(&entry.value, region, sub_region, &classification)
            .await
        {
            Ok(created) => {
                info!("Promoted '{}' into the directory as {}", created.name, created.id);
                PromotionOutcome::Promoted(created)
            }
            // Another approval won the race between our check and our write
            Err(e) if e.is_duplicate() => PromotionOutcome::AlreadyPresent,
            Err(e) => {
                error!("Directory write failed for entry {}: {}", entry.id, e);
                PromotionOutcome::Failed(e.to_string())
            }
        }
    }

    /// Set a submission's review status.
    ///
    /// Any status may be set except leaving `closed`. The write only lands if
    /// the status is still the one just read; on a concurrent change the
    /// transition is re-validated against the fresh status. Entering `closed`
    /// from another status notifies a reachable reporter exactly once.
    pub async fn update_submission_status(
        &self,
        id: Uuid,
        new_status: SubmissionStatus,
        actor: &str,
    ) -> Result<FeedbackSubmission> {
        for attempt in 1..=MAX_STATUS_ATTEMPTS {
            let current = self
                .feedback_store
                .get(id)
                .await?
                .ok_or_else(|| FeedbackError::not_found("feedback submission", id))?;

            let prior = current.status;
            if prior.is_terminal() && new_status != prior {
                return Err(FeedbackError::InvalidTransition {
                    from: prior.to_string(),
                    to: new_status.to_string(),
                });
            }

            let Some(mut submission) = self
                .feedback_store
                .transition_status(id, prior, new_status, Utc::now())
                .await?
            else {
                debug!(
                    "Submission {} changed status concurrently (attempt {})",
                    current.reference_code, attempt
                );
                continue;
            };
            ModerationMetrics::record_status_change(new_status);
            info!(
                "Submission {} moved {} -> {} by {}",
                submission.reference_code, prior, new_status, actor
            );

            let newly_closed =
                new_status == SubmissionStatus::Closed && prior != SubmissionStatus::Closed;
            if newly_closed && submission.has_contact_channel() {
                if let Some(updated) = self.notify_closed(&submission).await {
                    submission = updated;
                }
            }
            return Ok(submission);
        }

        Err(FeedbackError::Storage {
            message: format!(
                "status of submission {} kept changing, gave up after {} attempts",
                id, MAX_STATUS_ATTEMPTS
            ),
        })
    }

    /// Send the case-closed notice; returns the record with `closure_sent` set
    /// when something was delivered
    async fn notify_closed(&self, submission: &FeedbackSubmission) -> Option<FeedbackSubmission> {
        let outcomes = self.dispatcher.dispatch(case_closed_intents(submission)).await;
        let flags = NotificationFlags {
            closure_sent: any_delivered(&outcomes, IntentKind::CaseClosed),
            ..Default::default()
        };
        if flags.is_empty() {
            return None;
        }
        match self
            .feedback_store
            .record_notification_flags(submission.id, flags)
            .await
        {
            Ok(updated) => Some(updated),
            Err(e) => {
                warn!(
                    "Failed to record closure notification for {}: {}",
                    submission.reference_code, e
                );
                None
            }
        }
    }

    /// Moderation queue, oldest first
    pub async fn list_entries(&self, status: Option<PendingStatus>) -> Result<Vec<PendingEntry>> {
        self.pending_store.list(status).await
    }
}

/// Directory classification tag derived from the candidate's disambiguators
pub fn region_classification(region: &str, sub_region: &str) -> String {
    format!("{}/{}", fold(region), fold(sub_region))
}
