use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::app::notification_dispatcher::{submission_intents, NotificationDispatcher};
use crate::app::ports::{DirectoryPort, FeedbackStore, PendingEntryStore};
use crate::constants::{ISSUE_TYPE_OTHER, MAX_REFERENCE_ATTEMPTS};
use crate::domain::{
    any_delivered, FeedbackPayload, FeedbackSubmission, IntentKind, NotificationFlags,
    PendingCategory, PendingEntry, SubmissionReceipt,
};
use crate::error::{FeedbackError, Result};
use crate::identifiers::{generate_reference_code, generate_survey_token};
use crate::normalize::{clean_opt, clean_text, same_text};
use crate::observability::IntakeMetrics;
use crate::vocabulary::ControlledVocabulary;

/// Accepts pre-validated feedback and runs the best-effort side effects.
///
/// Only persisting the submission can fail the call. Candidate derivation,
/// enqueueing and notification fan-out are each isolated: a failure there is
/// logged and never reported to the caller.
pub struct IntakeUseCase {
    feedback_store: Arc<dyn FeedbackStore>,
    pending_store: Arc<dyn PendingEntryStore>,
    directory: Arc<dyn DirectoryPort>,
    dispatcher: Arc<NotificationDispatcher>,
    vocabulary: Arc<ControlledVocabulary>,
}

impl IntakeUseCase {
    pub fn new(
        feedback_store: Arc<dyn FeedbackStore>,
        pending_store: Arc<dyn PendingEntryStore>,
        directory: Arc<dyn DirectoryPort>,
        dispatcher: Arc<NotificationDispatcher>,
        vocabulary: Arc<ControlledVocabulary>,
    ) -> Self {
        Self {
            feedback_store,
            pending_store,
            directory,
            dispatcher,
            vocabulary,
        }
    }

    pub async fn submit(&self, payload: FeedbackPayload) -> Result<SubmissionReceipt> {
        let start_time = Instant::now();

        let submission = match self.persist_new(payload).await {
            Ok(submission) => submission,
            Err(e) => {
                error!("Failed to persist feedback submission: {}", e);
                IntakeMetrics::record_submission_failed();
                return Err(e);
            }
        };
        info!(
            "Accepted {} feedback {} ({})",
            submission.category.as_str(),
            submission.reference_code,
            submission.id
        );

        // Everything below is best-effort: the submission is already durable
        let candidates = self.derive_candidates(&submission).await;
        self.enqueue_candidates(candidates).await;
        self.notify_created(&submission).await;

        IntakeMetrics::record_submission_accepted(start_time.elapsed().as_secs_f64());
        Ok(SubmissionReceipt {
            id: submission.id,
            reference_code: submission.reference_code,
        })
    }

    /// Mint identifiers and write the row, regenerating the reference code on collision
    async fn persist_new(&self, payload: FeedbackPayload) -> Result<FeedbackSubmission> {
        let survey_token = generate_survey_token();
        let mut last_error = None;

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let now = Utc::now();
            let submission = FeedbackSubmission::from_payload(
                payload.clone(),
                generate_reference_code(now),
                survey_token.clone(),
                now,
            );
            match self.feedback_store.insert(&submission).await {
                Ok(()) => return Ok(submission),
                Err(e) if e.is_duplicate() => {
                    warn!(
                        "Identifier collision on attempt {} for {}: {}",
                        attempt, submission.reference_code, e
                    );
                    IntakeMetrics::record_reference_collision();
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| FeedbackError::Duplicate {
            what: "reference code".to_string(),
        }))
    }

    /// Free-text values that are not yet part of a controlled vocabulary.
    ///
    /// A directory lookup failure fails open: the candidate is kept so a
    /// moderator sees it, rather than silently dropping the value.
    pub async fn derive_candidates(&self, submission: &FeedbackSubmission) -> Vec<PendingEntry> {
        let mut candidates = Vec::new();
        let feedback_id = Some(submission.id);

        if let Some(facility) = &submission.facility {
            let name = clean_text(&facility.name);
            let region = clean_text(&facility.region);
            let sub_region = clean_text(&facility.sub_region);
            if let (Some(name), Some(region), Some(sub_region)) = (name, region, sub_region) {
                let known = match self.directory.exists(&name, &region, &sub_region).await {
                    Ok(known) => known,
                    Err(e) => {
                        warn!(
                            "Directory lookup failed for facility '{}', queueing it: {}",
                            name, e
                        );
                        IntakeMetrics::record_lookup_failure("directory");
                        false
                    }
                };
                if !known {
                    candidates.push(PendingEntry::new(
                        PendingCategory::Facility,
                        name,
                        Some(region),
                        Some(sub_region),
                        feedback_id,
                    ));
                }
            }
        }

        if let Some(department) = clean_opt(submission.department.as_deref()) {
            if !self.vocabulary.is_known_department(&department) {
                candidates.push(PendingEntry::new(
                    PendingCategory::Department,
                    department,
                    None,
                    None,
                    feedback_id,
                ));
            }
        }

        if let Some(location) = clean_opt(submission.location.as_deref()) {
            if !self.vocabulary.is_known_location(&location) {
                candidates.push(PendingEntry::new(
                    PendingCategory::Location,
                    location,
                    None,
                    None,
                    feedback_id,
                ));
            }
        }

        let is_other = submission
            .issue_type
            .as_deref()
            .map_or(false, |t| same_text(t, ISSUE_TYPE_OTHER));
        if is_other {
            if let Some(text) = clean_opt(submission.issue_other.as_deref()) {
                if !self.vocabulary.is_known_issue_type(&text) {
                    candidates.push(PendingEntry::new(
                        PendingCategory::IssueClassification,
                        text,
                        None,
                        None,
                        feedback_id,
                    ));
                }
            }
        }

        debug!(
            "Derived {} moderation candidates for {}",
            candidates.len(),
            submission.reference_code
        );
        candidates
    }

    /// Suppress candidates already pending or approved, then batch-insert the rest.
    ///
    /// Check-then-insert is not atomic across requests; the store's unique
    /// constraint on the dedup key catches what the check misses. Returns the
    /// number of rows actually inserted.
    pub async fn enqueue_candidates(&self, candidates: Vec<PendingEntry>) -> usize {
        let derived = candidates.len();
        if derived == 0 {
            return 0;
        }

        let mut seen = HashSet::new();
        let mut fresh = Vec::with_capacity(derived);
        for candidate in candidates {
            let key = candidate.dedup_key();
            if !seen.insert(key.clone()) {
                continue;
            }
            match self.pending_store.find_active(&key).await {
                Ok(Some(existing)) => {
                    debug!(
                        "Suppressed {} candidate '{}': already {} as {}",
                        candidate.category, candidate.value, existing.status, existing.id
                    );
                }
                Ok(None) => fresh.push(candidate),
                Err(e) => {
                    warn!(
                        "Pending-entry lookup failed for {} '{}', inserting anyway: {}",
                        candidate.category, candidate.value, e
                    );
                    IntakeMetrics::record_lookup_failure("pending_entries");
                    fresh.push(candidate);
                }
            }
        }

        if fresh.is_empty() {
            IntakeMetrics::record_candidates(derived, 0, derived);
            return 0;
        }

        match self.pending_store.insert_batch(&fresh).await {
            Ok(report) => {
                let inserted = report.inserted.len();
                IntakeMetrics::record_candidates(derived, inserted, derived - inserted);
                if report.skipped > 0 {
                    info!("{} candidates lost an insert race and were ignored", report.skipped);
                }
                inserted
            }
            Err(e) => {
                error!("Failed to enqueue {} moderation candidates: {}", fresh.len(), e);
                0
            }
        }
    }

    /// Fan out creation notifications and record which of them were delivered.
    ///
    /// Only the flags are written back: an operator may have changed the
    /// status while the fan-out was in flight.
    async fn notify_created(&self, submission: &FeedbackSubmission) {
        let outcomes = self.dispatcher.dispatch(submission_intents(submission)).await;
        let flags = NotificationFlags {
            confirmation_sent: any_delivered(&outcomes, IntentKind::SubmissionConfirmation),
            followup_sent: any_delivered(&outcomes, IntentKind::SurveyInvite),
            closure_sent: false,
        };
        if flags.is_empty() {
            return;
        }

        if let Err(e) = self
            .feedback_store
            .record_notification_flags(submission.id, flags)
            .await
        {
            warn!(
                "Failed to record notification flags for {}: {}",
                submission.reference_code, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::notification_dispatcher::DispatcherSettings;
    use crate::app::ports::NotifierPort;
    use crate::domain::{
        Channel, ContactInfo, Delivery, DirectoryEntry, FacilityRef, FeedbackCategory,
        NotificationRequest, PendingStatus,
    };
    use crate::infra::{
        InMemoryDirectory, InMemoryFeedbackStore, InMemoryOperatorDirectory,
        InMemoryPendingEntryStore,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct UnreachableDirectory;

    #[async_trait]
    impl DirectoryPort for UnreachableDirectory {
        async fn exists(&self, _name: &str, _region: &str, _sub_region: &str) -> Result<bool> {
            Err(FeedbackError::Unavailable {
                service: "directory",
                message: "cache timeout".to_string(),
            })
        }

        async fn insert(
            &self,
            _name: &str,
            _region: &str,
            _sub_region: &str,
            _classification: &str,
        ) -> Result<DirectoryEntry> {
            Err(FeedbackError::Unavailable {
                service: "directory",
                message: "cache timeout".to_string(),
            })
        }
    }

    struct RecordingNotifier {
        requests: Mutex<Vec<NotificationRequest>>,
    }

    #[async_trait]
    impl NotifierPort for RecordingNotifier {
        async fn send(&self, request: &NotificationRequest) -> Result<Delivery> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(Delivery { delivered: true })
        }
    }

    struct Harness {
        intake: IntakeUseCase,
        feedback: Arc<InMemoryFeedbackStore>,
        pending: Arc<InMemoryPendingEntryStore>,
    }

    fn harness(directory: Arc<dyn DirectoryPort>) -> Harness {
        let feedback = Arc::new(InMemoryFeedbackStore::new());
        let pending = Arc::new(InMemoryPendingEntryStore::new());
        let dispatcher = NotificationDispatcher::new(
            Arc::new(InMemoryOperatorDirectory::default()),
            DispatcherSettings::default(),
        )
        .with_channel(
            Channel::Email,
            Arc::new(RecordingNotifier {
                requests: Mutex::new(Vec::new()),
            }),
        );
        let intake = IntakeUseCase::new(
            feedback.clone(),
            pending.clone(),
            directory,
            Arc::new(dispatcher),
            Arc::new(ControlledVocabulary::default()),
        );
        Harness {
            intake,
            feedback,
            pending,
        }
    }

    fn payload() -> FeedbackPayload {
        FeedbackPayload {
            category: FeedbackCategory::Complaint,
            description: "Waited six hours at triage".to_string(),
            anonymous: false,
            contact: ContactInfo {
                name: Some("Ngozi".to_string()),
                email: Some("ngozi@example.org".to_string()),
                phone: None,
            },
            facility: Some(FacilityRef {
                name: "Hope Clinic".to_string(),
                region: "Lagos".to_string(),
                sub_region: "Ikeja".to_string(),
            }),
            department: Some("Emergency".to_string()),
            location: Some("Waiting Area".to_string()),
            staff_name: None,
            issue_type: Some("waiting time".to_string()),
            issue_other: None,
            incident_date: None,
            attachment_keys: Vec::new(),
        }
    }

    #[tokio::test]
    async fn known_vocabulary_values_produce_no_candidates() {
        let directory = Arc::new(InMemoryDirectory::new());
        directory.insert("Hope Clinic", "Lagos", "Ikeja", "lagos/ikeja").await.unwrap();
        let h = harness(directory);

        h.intake.submit(payload()).await.unwrap();

        assert!(h.pending.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_values_become_pending_entries() {
        let h = harness(Arc::new(InMemoryDirectory::new()));
        let mut p = payload();
        p.department = Some("Hydrotherapy".to_string());
        p.location = Some("Roof Garden".to_string());
        p.issue_type = Some("Other".to_string());
        p.issue_other = Some("Generator noise".to_string());

        let receipt = h.intake.submit(p).await.unwrap();

        let entries = h.pending.list(Some(PendingStatus::Pending)).await.unwrap();
        let categories: HashSet<PendingCategory> = entries.iter().map(|e| e.category).collect();
        assert_eq!(entries.len(), 4);
        assert!(categories.contains(&PendingCategory::Facility));
        assert!(categories.contains(&PendingCategory::Department));
        assert!(categories.contains(&PendingCategory::Location));
        assert!(categories.contains(&PendingCategory::IssueClassification));
        assert!(entries.iter().all(|e| e.feedback_id == Some(receipt.id)));
    }

    #[tokio::test]
    async fn issue_text_without_other_is_ignored() {
        let h = harness(Arc::new(InMemoryDirectory::new()));
        let mut p = payload();
        p.facility = None;
        p.issue_type = Some("billing".to_string());
        p.issue_other = Some("Charged twice".to_string());

        h.intake.submit(p).await.unwrap();

        assert!(h.pending.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn incomplete_facility_triple_is_not_a_candidate() {
        let h = harness(Arc::new(InMemoryDirectory::new()));
        let mut p = payload();
        p.facility = Some(FacilityRef {
            name: "Hope Clinic".to_string(),
            region: "Lagos".to_string(),
            sub_region: "   ".to_string(),
        });

        h.intake.submit(p).await.unwrap();

        assert!(h.pending.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreachable_directory_fails_open() {
        let h = harness(Arc::new(UnreachableDirectory));

        let receipt = h.intake.submit(payload()).await.unwrap();

        let entries = h.pending.list(None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].category, PendingCategory::Facility);
        assert!(h.feedback.get(receipt.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn repeated_candidates_are_suppressed() {
        let h = harness(Arc::new(InMemoryDirectory::new()));
        h.intake.submit(payload()).await.unwrap();

        let mut p = payload();
        p.facility = Some(FacilityRef {
            name: "  hope CLINIC ".to_string(),
            region: "lagos".to_string(),
            sub_region: "IKEJA".to_string(),
        });
        h.intake.submit(p).await.unwrap();

        assert_eq!(h.pending.list(None).await.unwrap().len(), 1);
        assert_eq!(h.feedback.len(), 2);
    }

    #[tokio::test]
    async fn delivered_confirmation_sets_flags() {
        let h = harness(Arc::new(InMemoryDirectory::new()));
        let receipt = h.intake.submit(payload()).await.unwrap();

        let stored = h.feedback.get(receipt.id).await.unwrap().unwrap();
        assert!(stored.confirmation_sent);
        assert!(stored.followup_sent);
        assert!(!stored.closure_sent);
    }

    /// Reports a reference-code collision for the first `collisions` inserts
    struct CollidingFeedbackStore {
        inner: InMemoryFeedbackStore,
        collisions: usize,
        attempted: Mutex<Vec<String>>,
    }

    impl CollidingFeedbackStore {
        fn new(collisions: usize) -> Self {
            Self {
                inner: InMemoryFeedbackStore::new(),
                collisions,
                attempted: Mutex::new(Vec::new()),
            }
        }

        fn attempted(&self) -> Vec<String> {
            self.attempted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FeedbackStore for CollidingFeedbackStore {
        async fn insert(&self, submission: &FeedbackSubmission) -> Result<()> {
            let attempts = {
                let mut attempted = self.attempted.lock().unwrap();
                attempted.push(submission.reference_code.clone());
                attempted.len()
            };
            if attempts <= self.collisions {
                return Err(FeedbackError::Duplicate {
                    what: format!("reference code {}", submission.reference_code),
                });
            }
            self.inner.insert(submission).await
        }

        async fn get(&self, id: uuid::Uuid) -> Result<Option<FeedbackSubmission>> {
            self.inner.get(id).await
        }

        async fn get_by_reference(&self, code: &str) -> Result<Option<FeedbackSubmission>> {
            self.inner.get_by_reference(code).await
        }

        async fn get_by_survey_token(&self, token: &str) -> Result<Option<FeedbackSubmission>> {
            self.inner.get_by_survey_token(token).await
        }

        async fn transition_status(
            &self,
            id: uuid::Uuid,
            from: crate::domain::SubmissionStatus,
            to: crate::domain::SubmissionStatus,
            at: chrono::DateTime<Utc>,
        ) -> Result<Option<FeedbackSubmission>> {
            self.inner.transition_status(id, from, to, at).await
        }

        async fn record_notification_flags(
            &self,
            id: uuid::Uuid,
            flags: NotificationFlags,
        ) -> Result<FeedbackSubmission> {
            self.inner.record_notification_flags(id, flags).await
        }

        async fn record_survey(
            &self,
            id: uuid::Uuid,
            response: &crate::domain::SurveyResponse,
        ) -> Result<bool> {
            self.inner.record_survey(id, response).await
        }
    }

    fn intake_over(
        feedback: Arc<CollidingFeedbackStore>,
    ) -> (IntakeUseCase, Arc<InMemoryPendingEntryStore>, Arc<RecordingNotifier>) {
        let pending = Arc::new(InMemoryPendingEntryStore::new());
        let notifier = Arc::new(RecordingNotifier {
            requests: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::new(
            Arc::new(InMemoryOperatorDirectory::default()),
            DispatcherSettings::default(),
        )
        .with_channel(Channel::Email, notifier.clone());
        let intake = IntakeUseCase::new(
            feedback,
            pending.clone(),
            Arc::new(InMemoryDirectory::new()),
            Arc::new(dispatcher),
            Arc::new(ControlledVocabulary::default()),
        );
        (intake, pending, notifier)
    }

    #[tokio::test]
    async fn reference_collisions_mint_a_fresh_code() {
        let feedback = Arc::new(CollidingFeedbackStore::new(2));
        let (intake, _, _) = intake_over(feedback.clone());

        let receipt = intake.submit(payload()).await.unwrap();

        let attempted = feedback.attempted();
        assert_eq!(attempted.len(), 3);
        let distinct: HashSet<&String> = attempted.iter().collect();
        assert_eq!(distinct.len(), 3);
        assert_eq!(receipt.reference_code, attempted[2]);
        assert!(feedback.get(receipt.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn persistent_collisions_fail_without_side_effects() {
        let feedback = Arc::new(CollidingFeedbackStore::new(usize::MAX));
        let (intake, pending, notifier) = intake_over(feedback.clone());

        let err = intake.submit(payload()).await.unwrap_err();

        assert!(err.is_duplicate());
        assert_eq!(feedback.attempted().len(), MAX_REFERENCE_ATTEMPTS);
        assert!(pending.list(None).await.unwrap().is_empty());
        assert!(notifier.requests.lock().unwrap().is_empty());
    }
}
