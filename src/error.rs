use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedbackError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Duplicate {what}")]
    Duplicate { what: String },

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Survey already completed for token {token}")]
    SurveyAlreadyCompleted { token: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{service} unavailable: {message}")]
    Unavailable { service: &'static str, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

impl FeedbackError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        FeedbackError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, FeedbackError::Duplicate { .. })
    }
}

pub type Result<T> = std::result::Result<T, FeedbackError>;
