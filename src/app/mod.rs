pub mod ports;
pub mod notification_dispatcher;
pub mod intake_use_case;
pub mod moderation_use_case;
pub mod survey_use_case;

pub use intake_use_case::IntakeUseCase;
pub use moderation_use_case::ModerationUseCase;
pub use notification_dispatcher::{DispatcherSettings, NotificationDispatcher};
pub use survey_use_case::{SurveyAnswer, SurveyUseCase};
