//! Top-level run orchestration.
//!
//! One run: for every address in the reply mapping, list matching unread
//! messages, resolve the sender's policy once, plan one reply batch per
//! message, then hand the whole batch to the dispatch engine. The runner
//! adds no logic of its own beyond composition and the end-of-run summary.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::dispatch::{DispatchEngine, DispatchResult};
use crate::error::{PlanError, Result, SourceError};
use crate::planner::{self, ReplyPlan};
use crate::policy;
use crate::source::MessageSource;

/// Aggregated outcome of one run. Per-item failures live here; none of
/// them fail the process.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Senders whose listing was attempted.
    pub senders_processed: usize,
    /// Listing failures, by sender.
    pub list_errors: Vec<(String, SourceError)>,
    /// Messages that could not be planned (malformed), by message.
    pub plan_errors: Vec<PlanError>,
    /// One result per dispatched plan.
    pub results: Vec<DispatchResult>,
}

impl RunSummary {
    /// Originals removed from the mailbox this run.
    pub fn messages_bounced(&self) -> usize {
        self.results.iter().filter(|r| r.original_deleted).count()
    }

    /// Reply copies that went out.
    pub fn replies_sent(&self) -> usize {
        self.results.iter().map(|r| r.sent_reply_ids.len()).sum()
    }

    /// All recorded non-fatal failures.
    pub fn error_count(&self) -> usize {
        self.list_errors.len()
            + self.plan_errors.len()
            + self
                .results
                .iter()
                .map(|r| {
                    r.send_errors.len()
                        + r.reply_delete_errors.len()
                        + usize::from(r.original_delete_error.is_some())
                })
                .sum::<usize>()
    }
}

/// Drives one bouncing run over a [`MessageSource`].
pub struct Runner {
    config: GlobalConfig,
    source: Arc<dyn MessageSource>,
    engine: DispatchEngine,
}

impl Runner {
    pub fn new(config: GlobalConfig, source: Arc<dyn MessageSource>) -> Self {
        let engine = DispatchEngine::new(
            Arc::clone(&source),
            config.pool_size,
            config.delete_delay(),
        );
        Self {
            config,
            source,
            engine,
        }
    }

    /// Execute one full run. Errors returned here are fatal resolution
    /// problems; everything transport-level is recorded in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        info!("executing automatic message bouncing");

        let mut summary = RunSummary::default();
        let mut plans: Vec<ReplyPlan> = Vec::new();

        for sender in self.config.reply_mapping.keys() {
            summary.senders_processed += 1;

            let messages = match self.source.list(sender).await {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(sender = %sender, error = %err, "listing failed, skipping sender");
                    summary.list_errors.push((sender.clone(), err));
                    continue;
                }
            };
            if messages.is_empty() {
                continue;
            }

            // Config is validated at load, so resolution failing here
            // means the config itself is unusable.
            let sender_policy = policy::resolve(&self.config, sender)?;
            info!(
                sender = %sender,
                messages = messages.len(),
                copies = sender_policy.reply_count,
                "sender found in reply mapping"
            );

            for message in &messages {
                match planner::plan(&sender_policy, message) {
                    Ok(plan) => plans.push(plan),
                    Err(err) => {
                        warn!(message = %message.id, error = %err, "message not plannable");
                        summary.plan_errors.push(err);
                    }
                }
            }
        }

        summary.results = self.engine.dispatch_all(plans).await;

        info!(
            senders = summary.senders_processed,
            bounced = summary.messages_bounced(),
            replies = summary.replies_sent(),
            errors = summary.error_count(),
            "executed automatic message bouncing"
        );
        Ok(summary)
    }
}
