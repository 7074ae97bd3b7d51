use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a notification is being sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    SubmissionConfirmation,
    SurveyInvite,
    AdminBroadcast,
    CaseClosed,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::SubmissionConfirmation => "submission_confirmation",
            IntentKind::SurveyInvite => "survey_invite",
            IntentKind::AdminBroadcast => "admin_broadcast",
            IntentKind::CaseClosed => "case_closed",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who receives an intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Audience {
    Direct(Vec<String>),
    /// Resolved against the operator directory when the intent is dispatched
    ActiveOperators,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationIntent {
    pub kind: IntentKind,
    pub channel: Channel,
    pub audience: Audience,
    pub template_id: &'static str,
    pub vars: BTreeMap<String, String>,
}

impl NotificationIntent {
    pub fn direct(
        kind: IntentKind,
        channel: Channel,
        recipient: impl Into<String>,
        template_id: &'static str,
        vars: BTreeMap<String, String>,
    ) -> Self {
        Self {
            kind,
            channel,
            audience: Audience::Direct(vec![recipient.into()]),
            template_id,
            vars,
        }
    }
}

/// Wire shape handed to a single channel adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub channel: Channel,
    pub recipients: Vec<String>,
    pub template_id: String,
    pub vars: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: bool,
}

/// Per-intent result reported by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub kind: IntentKind,
    pub channel: Channel,
    pub delivered: bool,
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn failed(kind: IntentKind, channel: Channel, error: impl Into<String>) -> Self {
        Self {
            kind,
            channel,
            delivered: false,
            error: Some(error.into()),
        }
    }
}

/// True when at least one intent of `kind` was delivered
pub fn any_delivered(outcomes: &[DispatchOutcome], kind: IntentKind) -> bool {
    outcomes.iter().any(|o| o.kind == kind && o.delivered)
}

/// Operator who receives admin broadcasts while active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Operator {
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms => self.phone.as_deref(),
        }
        .map(str::trim)
        .filter(|a| !a.is_empty())
    }
}
