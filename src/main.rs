use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

use care_feedback::app::{
    DispatcherSettings, IntakeUseCase, ModerationUseCase, NotificationDispatcher, SurveyAnswer,
    SurveyUseCase,
};
use care_feedback::app::ports::NotifierPort;
use care_feedback::config::Config;
use care_feedback::domain::{
    Channel, Decision, FeedbackPayload, PendingStatus, PromotionOutcome, SubmissionStatus,
};
use care_feedback::infra::{InMemoryOperatorDirectory, LogNotifier, SqliteStore, WebhookNotifier};
use care_feedback::observability::metrics::render;
use care_feedback::observability::{init_logging, init_metrics};
use care_feedback::vocabulary::ControlledVocabulary;

#[derive(Parser)]
#[command(name = "care_feedback")]
#[command(about = "Healthcare feedback intake and moderation")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a feedback payload (JSON file)
    Submit {
        #[arg(long)]
        file: String,
    },
    /// Approve or reject a moderation candidate
    ResolveEntry {
        #[arg(long)]
        id: Uuid,
        /// approved | rejected
        #[arg(long)]
        decision: String,
        #[arg(long)]
        actor: String,
    },
    /// Move a submission to new, in_review, resolved or closed
    SetStatus {
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        status: String,
        #[arg(long)]
        actor: String,
    },
    /// List moderation candidates
    ListEntries {
        /// pending | approved | rejected
        #[arg(long)]
        status: Option<String>,
    },
    /// Redeem a follow-up survey token with an answer (JSON file)
    RedeemSurvey {
        #[arg(long)]
        token: String,
        #[arg(long)]
        file: String,
    },
}

struct Services {
    intake: IntakeUseCase,
    moderation: ModerationUseCase,
    surveys: SurveyUseCase,
}

fn notifier_for(url: Option<&str>, config: &Config) -> anyhow::Result<Arc<dyn NotifierPort>> {
    let notifier: Arc<dyn NotifierPort> = match url {
        Some(url) => Arc::new(WebhookNotifier::new(url, config.notifications.channel_timeout())?),
        None => Arc::new(LogNotifier),
    };
    Ok(notifier)
}

fn build_services(config: &Config) -> anyhow::Result<Services> {
    let store = Arc::new(
        SqliteStore::open(&config.storage.sqlite_path)
            .with_context(|| format!("opening database at {}", config.storage.sqlite_path))?,
    );
    let operators = Arc::new(InMemoryOperatorDirectory::new(config.operators.clone()));

    let dispatcher = Arc::new(
        NotificationDispatcher::new(operators, DispatcherSettings::from(&config.notifications))
            .with_channel(
                Channel::Email,
                notifier_for(config.notifications.email_webhook_url.as_deref(), config)?,
            )
            .with_channel(
                Channel::Sms,
                notifier_for(config.notifications.sms_webhook_url.as_deref(), config)?,
            ),
    );
    let vocabulary = Arc::new(ControlledVocabulary::from_config(&config.vocabulary));

    Ok(Services {
        intake: IntakeUseCase::new(
            store.clone(),
            store.clone(),
            store.clone(),
            dispatcher.clone(),
            vocabulary,
        ),
        moderation: ModerationUseCase::new(store.clone(), store.clone(), store.clone(), dispatcher),
        surveys: SurveyUseCase::new(store),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("loading configuration")?;
    let _log_guard = init_logging(&config.logging);
    init_metrics(&config.metrics);
    let services = build_services(&config)?;

    match cli.command {
        Commands::Submit { file } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file))?;
            let payload: FeedbackPayload = serde_json::from_str(&raw)?;
            let receipt = services.intake.submit(payload).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
        Commands::ResolveEntry { id, decision, actor } => {
            let decision: Decision = decision.parse()?;
            let resolution = services
                .moderation
                .resolve_pending_entry(id, decision, &actor)
                .await?;
            println!("{}", serde_json::to_string_pretty(&resolution.entry)?);
            match resolution.promotion {
                PromotionOutcome::Promoted(entry) => info!("Directory entry created: {}", entry.id),
                PromotionOutcome::AlreadyPresent => info!("Directory already had this facility"),
                PromotionOutcome::Failed(reason) => {
                    error!("Entry approved but directory promotion failed: {}", reason)
                }
                PromotionOutcome::NotApplicable => {}
            }
        }
        Commands::SetStatus { id, status, actor } => {
            let status: SubmissionStatus = status.parse()?;
            let submission = services
                .moderation
                .update_submission_status(id, status, &actor)
                .await?;
            println!("{}", serde_json::to_string_pretty(&submission)?);
        }
        Commands::ListEntries { status } => {
            let status = status
                .map(|s| s.parse::<PendingStatus>())
                .transpose()?;
            let entries = services.moderation.list_entries(status).await?;
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        Commands::RedeemSurvey { token, file } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file))?;
            let answer: SurveyAnswer = serde_json::from_str(&raw)?;
            let response = services.surveys.redeem(&token, answer).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    if let Some(snapshot) = render() {
        debug!("Metrics snapshot:\n{}", snapshot);
    }
    Ok(())
}
