use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::FeedbackError;
use crate::normalize::DedupKey;

/// Which controlled vocabulary a moderation candidate belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PendingCategory {
    Facility,
    Department,
    Location,
    IssueClassification,
}

impl PendingCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingCategory::Facility => "facility",
            PendingCategory::Department => "department",
            PendingCategory::Location => "location",
            PendingCategory::IssueClassification => "issue-classification",
        }
    }

    /// Categories whose approval writes into the canonical directory
    pub fn is_directory_backed(&self) -> bool {
        matches!(self, PendingCategory::Facility)
    }
}

impl fmt::Display for PendingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PendingCategory {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "facility" => Ok(PendingCategory::Facility),
            "department" => Ok(PendingCategory::Department),
            "location" => Ok(PendingCategory::Location),
            "issue-classification" => Ok(PendingCategory::IssueClassification),
            other => Err(FeedbackError::InvalidInput(format!(
                "unknown pending category '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    Pending,
    Approved,
    Rejected,
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Approved => "approved",
            PendingStatus::Rejected => "rejected",
        }
    }

    /// Pending and approved rows block recreation of the same candidate
    pub fn is_active(&self) -> bool {
        matches!(self, PendingStatus::Pending | PendingStatus::Approved)
    }
}

impl fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PendingStatus {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PendingStatus::Pending),
            "approved" => Ok(PendingStatus::Approved),
            "rejected" => Ok(PendingStatus::Rejected),
            other => Err(FeedbackError::InvalidInput(format!(
                "unknown pending status '{}'",
                other
            ))),
        }
    }
}

/// Operator decision on a moderation candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    pub fn target_status(&self) -> PendingStatus {
        match self {
            Decision::Approved => PendingStatus::Approved,
            Decision::Rejected => PendingStatus::Rejected,
        }
    }
}

impl FromStr for Decision {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" | "approve" => Ok(Decision::Approved),
            "rejected" | "reject" => Ok(Decision::Rejected),
            other => Err(FeedbackError::InvalidInput(format!(
                "unknown decision '{}'",
                other
            ))),
        }
    }
}

/// A free-text value waiting for human review before it becomes canonical
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub id: Uuid,
    pub category: PendingCategory,
    pub value: String,
    pub region: Option<String>,
    pub sub_region: Option<String>,
    pub status: PendingStatus,
    /// None when the entry was created outside the intake pipeline
    pub feedback_id: Option<Uuid>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PendingEntry {
    pub fn new(
        category: PendingCategory,
        value: String,
        region: Option<String>,
        sub_region: Option<String>,
        feedback_id: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            value,
            region,
            sub_region,
            status: PendingStatus::Pending,
            feedback_id,
            resolved_by: None,
            resolved_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey::new(
            self.category,
            &self.value,
            self.region.as_deref(),
            self.sub_region.as_deref(),
        )
    }
}

/// Canonical directory row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub id: Uuid,
    pub name: String,
    pub region: String,
    pub sub_region: String,
    pub classification: String,
    pub created_at: DateTime<Utc>,
}

/// Result of a batch insert into the pending-entry store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchInsertReport {
    pub inserted: Vec<Uuid>,
    /// Entries rejected by the active dedup-key constraint
    pub skipped: usize,
}

/// What happened to the directory when a pending entry was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionOutcome {
    /// Category is not directory-backed, or the decision was a rejection
    NotApplicable,
    Promoted(DirectoryEntry),
    /// A matching directory row already existed at commit time
    AlreadyPresent,
    /// The entry transition was recorded but the directory write failed
    Failed(String),
}

impl PromotionOutcome {
    pub fn is_warning(&self) -> bool {
        matches!(self, PromotionOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub entry: PendingEntry,
    pub promotion: PromotionOutcome,
}
