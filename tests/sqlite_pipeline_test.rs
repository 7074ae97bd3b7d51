mod common;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use care_feedback::app::ports::{DirectoryPort, FeedbackStore, PendingEntryStore};
use care_feedback::app::{
    DispatcherSettings, IntakeUseCase, ModerationUseCase, NotificationDispatcher,
};
use care_feedback::domain::{Channel, Decision, PendingStatus, PromotionOutcome};
use care_feedback::infra::{InMemoryOperatorDirectory, SqliteStore};
use care_feedback::vocabulary::ControlledVocabulary;

use common::{hope_clinic_complaint, RecordingNotifier};

fn wire(store: Arc<SqliteStore>) -> (IntakeUseCase, ModerationUseCase) {
    let dispatcher = Arc::new(
        NotificationDispatcher::new(
            Arc::new(InMemoryOperatorDirectory::default()),
            DispatcherSettings {
                channel_timeout: Duration::from_millis(500),
                retry_attempts: 1,
                retry_backoff: Duration::from_millis(1),
            },
        )
        .with_channel(Channel::Email, RecordingNotifier::delivering())
        .with_channel(Channel::Sms, RecordingNotifier::delivering()),
    );
    let intake = IntakeUseCase::new(
        store.clone(),
        store.clone(),
        store.clone(),
        dispatcher.clone(),
        Arc::new(ControlledVocabulary::default()),
    );
    let moderation = ModerationUseCase::new(store.clone(), store.clone(), store, dispatcher);
    (intake, moderation)
}

#[tokio::test]
async fn test_pipeline_survives_reopening_the_database() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("nested").join("feedback.db");

    let receipt = {
        let store = Arc::new(SqliteStore::open(&path)?);
        let (intake, _) = wire(store);
        let receipt = intake.submit(hope_clinic_complaint()).await?;
        intake.submit(hope_clinic_complaint()).await?;
        receipt
    };

    let store = Arc::new(SqliteStore::open(&path)?);
    let stored = FeedbackStore::get(&*store, receipt.id)
        .await?
        .expect("submission persisted");
    assert_eq!(stored.reference_code, receipt.reference_code);
    assert!(stored.confirmation_sent);

    let by_reference = store
        .get_by_reference(&receipt.reference_code.to_lowercase())
        .await?
        .expect("lookup by reference is case-insensitive");
    assert_eq!(by_reference.id, receipt.id);

    let pending = PendingEntryStore::list(&*store, Some(PendingStatus::Pending)).await?;
    assert_eq!(pending.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_sqlite_promotion_is_idempotent() -> Result<()> {
    let store = Arc::new(SqliteStore::open_in_memory()?);
    let (intake, moderation) = wire(store.clone());

    intake.submit(hope_clinic_complaint()).await?;
    let id = moderation.list_entries(Some(PendingStatus::Pending)).await?[0].id;

    let first = moderation
        .resolve_pending_entry(id, Decision::Approved, "moderator-1")
        .await?;
    assert!(matches!(first.promotion, PromotionOutcome::Promoted(_)));
    let second = moderation
        .resolve_pending_entry(id, Decision::Approved, "moderator-1")
        .await?;
    assert_eq!(second.promotion, PromotionOutcome::AlreadyPresent);

    assert!(DirectoryPort::exists(&*store, "HOPE CLINIC", "lagos", "ikeja").await?);
    let duplicate = DirectoryPort::insert(&*store, "Hope Clinic", "Lagos", "Ikeja", "lagos/ikeja")
        .await
        .unwrap_err();
    assert!(duplicate.is_duplicate());
    Ok(())
}
