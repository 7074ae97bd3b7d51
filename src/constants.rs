//! Identifier and template constants to ensure consistency across the codebase

// Reference code layout: FB-YYYYMMDD-XXXXX
pub const REFERENCE_PREFIX: &str = "FB";
pub const REFERENCE_SUFFIX_LEN: usize = 5;
pub const MAX_REFERENCE_ATTEMPTS: usize = 5;

// Compare-and-set retries for a submission status change
pub const MAX_STATUS_ATTEMPTS: usize = 3;

// Notification template ids understood by the delivery gateways
pub const TEMPLATE_SUBMISSION_CONFIRMATION: &str = "feedback_submission_confirmation";
pub const TEMPLATE_SURVEY_INVITE: &str = "feedback_survey_invite";
pub const TEMPLATE_ADMIN_NEW_FEEDBACK: &str = "admin_new_feedback";
pub const TEMPLATE_CASE_CLOSED: &str = "feedback_case_closed";

// Issue type that asks for free text instead of a vocabulary value
pub const ISSUE_TYPE_OTHER: &str = "other";

// Defaults for the notification dispatcher
pub const DEFAULT_CHANNEL_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 1;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

// Default config file location
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_SQLITE_PATH: &str = "data/care_feedback.db";

// Log file written by the file layer, rolled daily
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILE: &str = "care_feedback.log";
