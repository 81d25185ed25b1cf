use inspect_shared::BatchResult;
use log::Level;

use crate::orchestrator::SubmitError;

/// User-facing events raised around a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    BatchStarted { count: usize },
    DefectsFound { count: usize, skipped: usize },
    AllPassed { skipped: usize },
    Failed { message: String },
}

impl Notification {
    pub fn message(&self) -> String {
        match self {
            Notification::BatchStarted { count } => {
                format!("Analyzing {} image{}...", count, plural(*count))
            }
            Notification::DefectsFound { count, skipped } => format!(
                "Analysis complete: {} defective product{} found!{}",
                count,
                plural(*count),
                skipped_suffix(*skipped)
            ),
            Notification::AllPassed { skipped } => format!(
                "Analysis complete: All products passed inspection!{}",
                skipped_suffix(*skipped)
            ),
            Notification::Failed { message } => format!("Analysis failed: {}", message),
        }
    }

    pub fn level(&self) -> Level {
        match self {
            Notification::BatchStarted { .. } | Notification::AllPassed { .. } => Level::Info,
            Notification::DefectsFound { .. } => Level::Warn,
            Notification::Failed { .. } => Level::Error,
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

fn skipped_suffix(skipped: usize) -> String {
    match skipped {
        0 => String::new(),
        n => format!(" ({} image{} skipped)", n, plural(n)),
    }
}

/// Picks the notification to raise once `submit` has settled.
pub fn completion_notice(outcome: &Result<BatchResult, SubmitError>) -> Notification {
    match outcome {
        Ok(batch) => {
            let skipped = batch.skipped.len();
            match batch.defect_count() {
                0 => Notification::AllPassed { skipped },
                count => Notification::DefectsFound { count, skipped },
            }
        }
        Err(err) => Notification::Failed {
            message: err.to_string(),
        },
    }
}

/// Sink for notifications. Delivery is fire-and-forget.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        log::log!(notification.level(), "{}", notification.message());
    }
}
