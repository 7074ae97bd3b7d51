#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use care_feedback::app::ports::{DirectoryPort, FeedbackStore, NotifierPort, PendingEntryStore};
use care_feedback::app::{
    DispatcherSettings, IntakeUseCase, ModerationUseCase, NotificationDispatcher, SurveyUseCase,
};
use care_feedback::domain::{
    Channel, ContactInfo, Delivery, FacilityRef, FeedbackCategory, FeedbackPayload, IntentKind,
    NotificationRequest, Operator,
};
use care_feedback::error::{FeedbackError, Result};
use care_feedback::infra::{
    InMemoryDirectory, InMemoryFeedbackStore, InMemoryOperatorDirectory, InMemoryPendingEntryStore,
};
use care_feedback::vocabulary::ControlledVocabulary;

/// Records every request; delivers unless told to fail
pub struct RecordingNotifier {
    requests: Mutex<Vec<NotificationRequest>>,
    fail: bool,
    calls: AtomicUsize,
}

impl RecordingNotifier {
    pub fn delivering() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn requests(&self) -> Vec<NotificationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_template(&self, template_id: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.template_id == template_id)
            .count()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotifierPort for RecordingNotifier {
    async fn send(&self, request: &NotificationRequest) -> Result<Delivery> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            return Err(FeedbackError::Unavailable {
                service: "gateway",
                message: "503 service unavailable".to_string(),
            });
        }
        Ok(Delivery { delivered: true })
    }
}

pub struct Fixture {
    pub intake: IntakeUseCase,
    pub moderation: ModerationUseCase,
    pub surveys: SurveyUseCase,
    pub feedback: Arc<dyn FeedbackStore>,
    pub pending: Arc<dyn PendingEntryStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub email: Arc<RecordingNotifier>,
    pub sms: Arc<RecordingNotifier>,
}

pub fn fixture_with(email: Arc<RecordingNotifier>, sms: Arc<RecordingNotifier>) -> Fixture {
    fixture_with_stores(
        Arc::new(InMemoryFeedbackStore::new()),
        Arc::new(InMemoryPendingEntryStore::new()),
        email,
        sms,
    )
}

pub fn fixture_with_stores(
    feedback: Arc<dyn FeedbackStore>,
    pending: Arc<dyn PendingEntryStore>,
    email: Arc<RecordingNotifier>,
    sms: Arc<RecordingNotifier>,
) -> Fixture {
    let directory = Arc::new(InMemoryDirectory::new());
    let operators = Arc::new(InMemoryOperatorDirectory::new(vec![Operator {
        name: "Duty officer".to_string(),
        email: Some("duty@health.example.org".to_string()),
        phone: None,
        active: true,
    }]));
    let dispatcher = Arc::new(
        NotificationDispatcher::new(
            operators,
            DispatcherSettings {
                channel_timeout: Duration::from_millis(500),
                retry_attempts: 1,
                retry_backoff: Duration::from_millis(1),
            },
        )
        .with_channel(Channel::Email, email.clone())
        .with_channel(Channel::Sms, sms.clone()),
    );
    let directory_port: Arc<dyn DirectoryPort> = directory.clone();

    Fixture {
        intake: IntakeUseCase::new(
            feedback.clone(),
            pending.clone(),
            directory_port.clone(),
            dispatcher.clone(),
            Arc::new(ControlledVocabulary::default()),
        ),
        moderation: ModerationUseCase::new(
            pending.clone(),
            feedback.clone(),
            directory_port,
            dispatcher,
        ),
        surveys: SurveyUseCase::new(feedback.clone()),
        feedback,
        pending,
        directory,
        email,
        sms,
    }
}

pub fn fixture() -> Fixture {
    fixture_with(RecordingNotifier::delivering(), RecordingNotifier::delivering())
}

/// Non-anonymous complaint about Hope Clinic, Lagos / Ikeja
pub fn hope_clinic_complaint() -> FeedbackPayload {
    FeedbackPayload {
        category: FeedbackCategory::Complaint,
        description: "Turned away at the front desk without triage".to_string(),
        anonymous: false,
        contact: ContactInfo {
            name: Some("Tunde".to_string()),
            email: Some("tunde@example.org".to_string()),
            phone: Some("+2348031234567".to_string()),
        },
        facility: Some(FacilityRef {
            name: "Hope Clinic".to_string(),
            region: "Lagos".to_string(),
            sub_region: "Ikeja".to_string(),
        }),
        department: Some("Emergency".to_string()),
        location: Some("Reception".to_string()),
        staff_name: None,
        issue_type: Some("staff attitude".to_string()),
        issue_other: None,
        incident_date: None,
        attachment_keys: Vec::new(),
    }
}

pub fn anonymous_inquiry() -> FeedbackPayload {
    FeedbackPayload {
        category: FeedbackCategory::Inquiry,
        description: "Is the eye clinic open on Saturdays?".to_string(),
        anonymous: true,
        contact: ContactInfo::default(),
        facility: None,
        department: Some("Eye Clinic".to_string()),
        location: None,
        staff_name: None,
        issue_type: None,
        issue_other: None,
        incident_date: None,
        attachment_keys: Vec::new(),
    }
}

pub fn intent_template(kind: IntentKind) -> &'static str {
    use care_feedback::constants::*;
    match kind {
        IntentKind::SubmissionConfirmation => TEMPLATE_SUBMISSION_CONFIRMATION,
        IntentKind::SurveyInvite => TEMPLATE_SURVEY_INVITE,
        IntentKind::AdminBroadcast => TEMPLATE_ADMIN_NEW_FEEDBACK,
        IntentKind::CaseClosed => TEMPLATE_CASE_CLOSED,
    }
}
