use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::FeedbackError;

/// Closed set of feedback categories accepted by the intake pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackCategory {
    Complaint,
    Compliment,
    Suggestion,
    Inquiry,
}

impl FeedbackCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackCategory::Complaint => "complaint",
            FeedbackCategory::Compliment => "compliment",
            FeedbackCategory::Suggestion => "suggestion",
            FeedbackCategory::Inquiry => "inquiry",
        }
    }
}

impl FromStr for FeedbackCategory {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "complaint" => Ok(FeedbackCategory::Complaint),
            "compliment" => Ok(FeedbackCategory::Compliment),
            "suggestion" => Ok(FeedbackCategory::Suggestion),
            "inquiry" => Ok(FeedbackCategory::Inquiry),
            other => Err(FeedbackError::InvalidInput(format!(
                "unknown feedback category '{}'",
                other
            ))),
        }
    }
}

/// Review lifecycle of a submission: new -> in_review -> resolved -> closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    New,
    InReview,
    Resolved,
    Closed,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::New => "new",
            SubmissionStatus::InReview => "in_review",
            SubmissionStatus::Resolved => "resolved",
            SubmissionStatus::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Closed)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(SubmissionStatus::New),
            "in_review" => Ok(SubmissionStatus::InReview),
            "resolved" => Ok(SubmissionStatus::Resolved),
            "closed" => Ok(SubmissionStatus::Closed),
            other => Err(FeedbackError::InvalidInput(format!(
                "unknown submission status '{}'",
                other
            ))),
        }
    }
}

/// How the reporter can be reached. Empty for anonymous reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactInfo {
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    pub fn is_reachable(&self) -> bool {
        self.email().is_some() || self.phone().is_some()
    }
}

/// Free-text facility triple as typed by the reporter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityRef {
    pub name: String,
    pub region: String,
    pub sub_region: String,
}

/// Pre-validated submission payload handed to the intake pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackPayload {
    pub category: FeedbackCategory,
    pub description: String,
    #[serde(default)]
    pub anonymous: bool,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub facility: Option<FacilityRef>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub staff_name: Option<String>,
    #[serde(default)]
    pub issue_type: Option<String>,
    #[serde(default)]
    pub issue_other: Option<String>,
    #[serde(default)]
    pub incident_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub attachment_keys: Vec<String>,
}

/// Persisted feedback record. Never physically deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    pub id: Uuid,
    pub reference_code: String,
    pub survey_token: String,
    pub category: FeedbackCategory,
    pub description: String,
    pub anonymous: bool,
    pub contact: ContactInfo,
    pub facility: Option<FacilityRef>,
    pub department: Option<String>,
    pub location: Option<String>,
    pub staff_name: Option<String>,
    pub issue_type: Option<String>,
    pub issue_other: Option<String>,
    pub incident_date: Option<chrono::NaiveDate>,
    pub attachment_keys: Vec<String>,
    pub status: SubmissionStatus,
    pub confirmation_sent: bool,
    pub followup_sent: bool,
    pub closure_sent: bool,
    pub survey: Option<SurveyResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl FeedbackSubmission {
    pub fn from_payload(
        payload: FeedbackPayload,
        reference_code: String,
        survey_token: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            reference_code,
            survey_token,
            category: payload.category,
            description: payload.description,
            anonymous: payload.anonymous,
            // Anonymous reports keep no contact details at all
            contact: if payload.anonymous {
                ContactInfo::default()
            } else {
                payload.contact
            },
            facility: payload.facility,
            department: payload.department,
            location: payload.location,
            staff_name: payload.staff_name,
            issue_type: payload.issue_type,
            issue_other: payload.issue_other,
            incident_date: payload.incident_date,
            attachment_keys: payload.attachment_keys,
            status: SubmissionStatus::New,
            confirmation_sent: false,
            followup_sent: false,
            closure_sent: false,
            survey: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            closed_at: None,
        }
    }

    /// A submission with a non-anonymous, reachable contact channel
    pub fn has_contact_channel(&self) -> bool {
        !self.anonymous && self.contact.is_reachable()
    }

    /// Move to `to`, stamping `resolved_at` the first time the case is resolved
    /// and `closed_at` when it enters `closed`.
    pub fn apply_status(&mut self, to: SubmissionStatus, at: DateTime<Utc>) {
        let prior = self.status;
        self.status = to;
        self.updated_at = at;
        match to {
            SubmissionStatus::Resolved if self.resolved_at.is_none() => self.resolved_at = Some(at),
            SubmissionStatus::Closed if prior != SubmissionStatus::Closed => {
                self.closed_at = Some(at)
            }
            _ => {}
        }
    }

    /// Set every flag that is set in `flags`. A flag is never cleared.
    pub fn merge_flags(&mut self, flags: NotificationFlags, at: DateTime<Utc>) {
        self.confirmation_sent |= flags.confirmation_sent;
        self.followup_sent |= flags.followup_sent;
        self.closure_sent |= flags.closure_sent;
        self.updated_at = at;
    }
}

/// Delivery outcomes of one fan-out, written back without touching status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationFlags {
    pub confirmation_sent: bool,
    pub followup_sent: bool,
    pub closure_sent: bool,
}

impl NotificationFlags {
    pub fn is_empty(&self) -> bool {
        !(self.confirmation_sent || self.followup_sent || self.closure_sent)
    }
}

/// Answer to the one-time follow-up survey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub rating: u8,
    pub comment: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Returned to the caller of `submit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub id: Uuid,
    pub reference_code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn submission(now: DateTime<Utc>) -> FeedbackSubmission {
        let payload = FeedbackPayload {
            category: FeedbackCategory::Complaint,
            description: "Long wait".to_string(),
            anonymous: false,
            contact: ContactInfo::default(),
            facility: None,
            department: None,
            location: None,
            staff_name: None,
            issue_type: None,
            issue_other: None,
            incident_date: None,
            attachment_keys: Vec::new(),
        };
        FeedbackSubmission::from_payload(payload, "FB-20240101-AAAAA".into(), "t".into(), now)
    }

    #[test]
    fn closing_stamps_closed_at_once() {
        let opened = Utc::now();
        let mut s = submission(opened);
        let resolved = opened + Duration::minutes(5);
        let closed = opened + Duration::minutes(10);

        s.apply_status(SubmissionStatus::Resolved, resolved);
        s.apply_status(SubmissionStatus::Closed, closed);
        s.apply_status(SubmissionStatus::Closed, closed + Duration::minutes(1));

        assert_eq!(s.resolved_at, Some(resolved));
        assert_eq!(s.closed_at, Some(closed));
        assert_eq!(s.updated_at, closed + Duration::minutes(1));
    }

    #[test]
    fn merged_flags_are_never_cleared() {
        let now = Utc::now();
        let mut s = submission(now);
        s.merge_flags(
            NotificationFlags {
                confirmation_sent: true,
                ..Default::default()
            },
            now,
        );
        s.merge_flags(
            NotificationFlags {
                closure_sent: true,
                ..Default::default()
            },
            now,
        );

        assert!(s.confirmation_sent && s.closure_sent);
        assert!(!s.followup_sent);
        assert_eq!(s.status, SubmissionStatus::New);
    }
}
