use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::app::ports::{NotifierPort, OperatorDirectoryPort};
use crate::config::NotificationConfig;
use crate::constants::{
    TEMPLATE_ADMIN_NEW_FEEDBACK, TEMPLATE_CASE_CLOSED, TEMPLATE_SUBMISSION_CONFIRMATION,
    TEMPLATE_SURVEY_INVITE,
};
use crate::domain::{
    Audience, Channel, Delivery, DispatchOutcome, FeedbackSubmission, IntentKind,
    NotificationIntent, NotificationRequest,
};
use crate::error::{FeedbackError, Result};
use crate::observability::NotificationMetrics;

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Upper bound for one intent, retries included
    pub channel_timeout: Duration,
    pub retry_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from(&NotificationConfig::default())
    }
}

impl From<&NotificationConfig> for DispatcherSettings {
    fn from(config: &NotificationConfig) -> Self {
        Self {
            channel_timeout: config.channel_timeout(),
            retry_attempts: config.retry_attempts.max(1),
            retry_backoff: config.retry_backoff(),
        }
    }
}

/// Fans notification intents out to channel adapters.
///
/// Every intent runs on its own task under its own timeout, so a failing or
/// hanging channel never cancels or delays its siblings. `dispatch` never
/// returns an error; failures come back as undelivered outcomes.
pub struct NotificationDispatcher {
    channels: HashMap<Channel, Arc<dyn NotifierPort>>,
    operators: Arc<dyn OperatorDirectoryPort>,
    settings: DispatcherSettings,
}

impl NotificationDispatcher {
    pub fn new(operators: Arc<dyn OperatorDirectoryPort>, settings: DispatcherSettings) -> Self {
        Self {
            channels: HashMap::new(),
            operators,
            settings,
        }
    }

    pub fn with_channel(mut self, channel: Channel, notifier: Arc<dyn NotifierPort>) -> Self {
        self.channels.insert(channel, notifier);
        self
    }

    pub async fn dispatch(&self, intents: Vec<NotificationIntent>) -> Vec<DispatchOutcome> {
        let mut handles = Vec::with_capacity(intents.len());

        for intent in intents {
            let kind = intent.kind;
            let channel = intent.channel;
            let notifier = self.channels.get(&channel).cloned();
            let operators = self.operators.clone();
            let settings = self.settings.clone();

            let handle = tokio::spawn(async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(
                    settings.channel_timeout,
                    attempt_delivery(notifier, operators, &intent, &settings),
                )
                .await
                {
                    Ok(Ok(delivery)) if delivery.delivered => DispatchOutcome {
                        kind,
                        channel,
                        delivered: true,
                        error: None,
                    },
                    Ok(Ok(_)) => {
                        DispatchOutcome::failed(kind, channel, "gateway reported undelivered")
                    }
                    Ok(Err(e)) => DispatchOutcome::failed(kind, channel, e.to_string()),
                    Err(_) => {
                        NotificationMetrics::record_timeout(channel);
                        DispatchOutcome::failed(
                            kind,
                            channel,
                            format!("timed out after {}ms", settings.channel_timeout.as_millis()),
                        )
                    }
                };
                NotificationMetrics::record_attempt(
                    kind,
                    channel,
                    outcome.delivered,
                    started.elapsed().as_secs_f64(),
                );
                outcome
            });

            handles.push((kind, channel, handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (kind, channel, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    DispatchOutcome::failed(kind, channel, format!("dispatch task failed: {}", e))
                }
            };
            match &outcome.error {
                None => debug!("Delivered {} via {}", kind, channel),
                Some(err) => warn!("Notification {} via {} not delivered: {}", kind, channel, err),
            }
            outcomes.push(outcome);
        }
        outcomes
    }
}

async fn attempt_delivery(
    notifier: Option<Arc<dyn NotifierPort>>,
    operators: Arc<dyn OperatorDirectoryPort>,
    intent: &NotificationIntent,
    settings: &DispatcherSettings,
) -> Result<Delivery> {
    let notifier = notifier.ok_or_else(|| FeedbackError::Unavailable {
        service: "notifier",
        message: format!("no adapter configured for channel {}", intent.channel),
    })?;

    let recipients = match &intent.audience {
        Audience::Direct(recipients) => recipients.clone(),
        Audience::ActiveOperators => operators
            .active_operators()
            .await?
            .iter()
            .filter(|op| op.active)
            .filter_map(|op| op.address_for(intent.channel).map(str::to_string))
            .collect(),
    };
    if recipients.is_empty() {
        return Err(FeedbackError::InvalidInput(format!(
            "no recipients for {} via {}",
            intent.kind, intent.channel
        )));
    }

    let request = NotificationRequest {
        channel: intent.channel,
        recipients,
        template_id: intent.template_id.to_string(),
        vars: intent.vars.clone(),
    };

    let mut attempt = 1;
    loop {
        let result = notifier.send(&request).await;
        let retryable = !matches!(&result, Ok(d) if d.delivered);
        if !retryable || attempt >= settings.retry_attempts {
            return result;
        }
        debug!(
            "Retrying {} via {} (attempt {} of {})",
            intent.kind, intent.channel, attempt + 1, settings.retry_attempts
        );
        attempt += 1;
        tokio::time::sleep(settings.retry_backoff).await;
    }
}

fn base_vars(submission: &FeedbackSubmission) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    vars.insert("reference_code".to_string(), submission.reference_code.clone());
    vars.insert("category".to_string(), submission.category.as_str().to_string());
    vars.insert("status".to_string(), submission.status.as_str().to_string());
    if let Some(name) = &submission.contact.name {
        vars.insert("name".to_string(), name.clone());
    }
    if let Some(facility) = &submission.facility {
        vars.insert("facility".to_string(), facility.name.clone());
    }
    vars
}

/// One intent per channel the reporter can be reached on
fn reporter_intents(
    submission: &FeedbackSubmission,
    kind: IntentKind,
    template_id: &'static str,
    vars: &BTreeMap<String, String>,
) -> Vec<NotificationIntent> {
    if !submission.has_contact_channel() {
        return Vec::new();
    }
    let mut intents = Vec::new();
    if let Some(email) = submission.contact.email() {
        intents.push(NotificationIntent::direct(
            kind,
            Channel::Email,
            email,
            template_id,
            vars.clone(),
        ));
    }
    if let Some(phone) = submission.contact.phone() {
        intents.push(NotificationIntent::direct(
            kind,
            Channel::Sms,
            phone,
            template_id,
            vars.clone(),
        ));
    }
    intents
}

/// Confirmation and survey invite for the reporter, plus a broadcast to operators
pub fn submission_intents(submission: &FeedbackSubmission) -> Vec<NotificationIntent> {
    let vars = base_vars(submission);
    let mut intents = reporter_intents(
        submission,
        IntentKind::SubmissionConfirmation,
        TEMPLATE_SUBMISSION_CONFIRMATION,
        &vars,
    );

    let mut survey_vars = vars.clone();
    survey_vars.insert("survey_token".to_string(), submission.survey_token.clone());
    intents.extend(reporter_intents(
        submission,
        IntentKind::SurveyInvite,
        TEMPLATE_SURVEY_INVITE,
        &survey_vars,
    ));

    let mut admin_vars = vars;
    admin_vars.insert("description".to_string(), submission.description.clone());
    admin_vars.remove("name");
    intents.push(NotificationIntent {
        kind: IntentKind::AdminBroadcast,
        channel: Channel::Email,
        audience: Audience::ActiveOperators,
        template_id: TEMPLATE_ADMIN_NEW_FEEDBACK,
        vars: admin_vars,
    });
    intents
}

pub fn case_closed_intents(submission: &FeedbackSubmission) -> Vec<NotificationIntent> {
    let vars = base_vars(submission);
    reporter_intents(submission, IntentKind::CaseClosed, TEMPLATE_CASE_CLOSED, &vars)
}
