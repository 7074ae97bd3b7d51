use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::app::ports::FeedbackStore;
use crate::domain::SurveyResponse;
use crate::error::{FeedbackError, Result};
use crate::normalize::clean_opt;

/// Survey answer as submitted with the one-time token
#[derive(Debug, Clone, Deserialize)]
pub struct SurveyAnswer {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Redeems follow-up survey tokens. Each token can be used once.
pub struct SurveyUseCase {
    feedback_store: Arc<dyn FeedbackStore>,
}

impl SurveyUseCase {
    pub fn new(feedback_store: Arc<dyn FeedbackStore>) -> Self {
        Self { feedback_store }
    }

    pub async fn redeem(&self, token: &str, answer: SurveyAnswer) -> Result<SurveyResponse> {
        if !(1..=5).contains(&answer.rating) {
            return Err(FeedbackError::InvalidInput(format!(
                "survey rating must be between 1 and 5, got {}",
                answer.rating
            )));
        }

        let submission = self
            .feedback_store
            .get_by_survey_token(token)
            .await?
            .ok_or_else(|| FeedbackError::not_found("survey token", token))?;

        let already_completed = || FeedbackError::SurveyAlreadyCompleted {
            token: token.to_string(),
        };
        if submission.survey.is_some() {
            return Err(already_completed());
        }

        let response = SurveyResponse {
            rating: answer.rating,
            comment: clean_opt(answer.comment.as_deref()),
            completed_at: Utc::now(),
        };
        // The read above can be stale under concurrent redeems; the store's
        // conditional write decides which answer wins.
        if !self.feedback_store.record_survey(submission.id, &response).await? {
            return Err(already_completed());
        }

        info!("Survey completed for {}", submission.reference_code);
        Ok(response)
    }
}
