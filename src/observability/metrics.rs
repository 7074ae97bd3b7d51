//! Phase-organized metrics for the feedback core
//!
//! Every metric follows the naming convention `feedback_{phase}_{name}[_total]`.
//! Recording is a no-op until `init_metrics` installs a recorder, so library
//! callers and tests never need to set anything up.

use std::sync::{Once, OnceLock};
use tracing::{info, warn};

use crate::config::MetricsConfig;
use crate::domain::{Channel, Decision, IntentKind, PromotionOutcome, SubmissionStatus};

static INIT: Once = Once::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Macro to create phase-specific metric names with consistent naming
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("feedback_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("feedback_", $phase, "_", $name)
    };
}

/// Install the Prometheus recorder. Idempotent.
pub fn init_metrics(config: &MetricsConfig) {
    INIT.call_once(|| {
        let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new();

        if let Some(addr_str) = &config.listen_addr {
            match addr_str.parse::<std::net::SocketAddr>() {
                Ok(addr) => {
                    builder = builder.with_http_listener(addr);
                    info!("Prometheus HTTP exporter listening at http://{}/metrics", addr);
                }
                Err(e) => warn!("Invalid metrics addr '{}': {}", addr_str, e),
            }
        }

        match builder.install_recorder() {
            Ok(handle) => {
                if HANDLE.set(handle).is_err() {
                    warn!("METRICS: handle already stored");
                }
                info!("Prometheus recorder installed");
            }
            Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
        }
    });
}

/// Render the current snapshot in Prometheus text format, if a recorder is installed
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

/// Metrics for the intake pipeline
pub struct IntakeMetrics;

impl IntakeMetrics {
    pub fn record_submission_accepted(duration_secs: f64) {
        ::metrics::counter!(phase_metric!(counter, "intake", "submissions_accepted")).increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "intake", "submit_duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_submission_failed() {
        ::metrics::counter!(phase_metric!(counter, "intake", "submissions_failed")).increment(1);
    }

    pub fn record_reference_collision() {
        ::metrics::counter!(phase_metric!(counter, "intake", "reference_collisions")).increment(1);
    }

    pub fn record_lookup_failure(dependency: &'static str) {
        ::metrics::counter!(
            phase_metric!(counter, "intake", "lookup_failures"),
            "dependency" => dependency
        )
        .increment(1);
    }

    pub fn record_candidates(derived: usize, inserted: usize, suppressed: usize) {
        ::metrics::counter!(phase_metric!(counter, "intake", "candidates_derived"))
            .increment(derived as u64);
        ::metrics::counter!(phase_metric!(counter, "intake", "candidates_inserted"))
            .increment(inserted as u64);
        ::metrics::counter!(phase_metric!(counter, "intake", "candidates_suppressed"))
            .increment(suppressed as u64);
    }
}

/// Metrics for the moderation state machine
pub struct ModerationMetrics;

impl ModerationMetrics {
    pub fn record_resolution(decision: Decision) {
        let label = match decision {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        };
        ::metrics::counter!(
            phase_metric!(counter, "moderation", "entries_resolved"),
            "decision" => label
        )
        .increment(1);
    }

    pub fn record_promotion(outcome: &PromotionOutcome) {
        let label = match outcome {
            PromotionOutcome::NotApplicable => return,
            PromotionOutcome::Promoted(_) => "promoted",
            PromotionOutcome::AlreadyPresent => "already_present",
            PromotionOutcome::Failed(_) => "failed",
        };
        ::metrics::counter!(
            phase_metric!(counter, "moderation", "promotions"),
            "outcome" => label
        )
        .increment(1);
    }

    pub fn record_status_change(status: SubmissionStatus) {
        ::metrics::counter!(
            phase_metric!(counter, "moderation", "status_changes"),
            "status" => status.as_str()
        )
        .increment(1);
    }
}

/// Metrics for notification fan-out
pub struct NotificationMetrics;

impl NotificationMetrics {
    pub fn record_attempt(kind: IntentKind, channel: Channel, delivered: bool, duration_secs: f64) {
        let outcome = if delivered { "delivered" } else { "undelivered" };
        ::metrics::counter!(
            phase_metric!(counter, "notification", "attempts"),
            "kind" => kind.as_str(),
            "channel" => channel.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "notification", "attempt_duration_seconds"))
            .record(duration_secs);
    }

    pub fn record_timeout(channel: Channel) {
        ::metrics::counter!(
            phase_metric!(counter, "notification", "timeouts"),
            "channel" => channel.as_str()
        )
        .increment(1);
    }
}
