//! Dispatch engine — sends planned replies with bounded parallelism and
//! runs the send → wait → delete lifecycle per copy.
//!
//! Concurrency is bounded per network call: every send and every delete
//! acquires a permit from one semaphore shared across the whole run, so at
//! most `pool_size` mail-API operations are ever outstanding. The
//! delete-delay wait holds no permit.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{DeleteError, SendError};
use crate::planner::ReplyPlan;
use crate::source::MessageSource;

/// Outcome of dispatching one plan.
#[derive(Debug)]
pub struct DispatchResult {
    /// Id of the original message the plan was built from.
    pub message_id: String,
    /// Ids of the successfully sent reply copies.
    pub sent_reply_ids: Vec<String>,
    /// One entry per copy that failed to send.
    pub send_errors: Vec<SendError>,
    /// Failed deletions of sent replies. The replies stay in the sent box
    /// until a later run re-encounters them via the mail store.
    pub reply_delete_errors: Vec<DeleteError>,
    /// Whether the original message was deleted.
    pub original_deleted: bool,
    /// Set when the original delete was attempted and failed.
    pub original_delete_error: Option<DeleteError>,
}

impl DispatchResult {
    /// True when nothing went wrong for this plan.
    pub fn is_clean(&self) -> bool {
        self.send_errors.is_empty()
            && self.reply_delete_errors.is_empty()
            && self.original_delete_error.is_none()
    }
}

/// What happened to one reply copy.
enum CopyOutcome {
    Sent {
        reply_id: String,
        delete_error: Option<DeleteError>,
    },
    Failed(SendError),
}

/// Executes reply plans against a [`MessageSource`].
pub struct DispatchEngine {
    source: Arc<dyn MessageSource>,
    permits: Arc<Semaphore>,
    delete_delay: Duration,
}

impl DispatchEngine {
    /// Create an engine bounded to `pool_size` concurrent mail-API calls.
    pub fn new(source: Arc<dyn MessageSource>, pool_size: usize, delete_delay: Duration) -> Self {
        Self {
            source,
            permits: Arc::new(Semaphore::new(pool_size)),
            delete_delay,
        }
    }

    /// Execute one plan: send all copies, clean up non-retained replies
    /// after the delay, then delete the original if at least one copy went
    /// out. Never fails the run — every failure lands in the result.
    pub async fn dispatch(&self, plan: ReplyPlan) -> DispatchResult {
        debug!(
            message = %plan.source_message_id,
            copies = plan.copies,
            recipient = %plan.recipient,
            "dispatching reply plan"
        );

        let copies = join_all((0..plan.copies).map(|copy| self.run_copy(&plan, copy))).await;

        let mut sent_reply_ids = Vec::new();
        let mut send_errors = Vec::new();
        let mut reply_delete_errors = Vec::new();
        for outcome in copies {
            match outcome {
                CopyOutcome::Sent {
                    reply_id,
                    delete_error,
                } => {
                    sent_reply_ids.push(reply_id);
                    reply_delete_errors.extend(delete_error);
                }
                CopyOutcome::Failed(err) => send_errors.push(err),
            }
        }

        // The original goes only once at least one reply went out; with
        // zero successes it stays put so the next scheduled run retries.
        let (original_deleted, original_delete_error) = if sent_reply_ids.is_empty() {
            debug!(
                message = %plan.source_message_id,
                "no copies sent, leaving original for next run"
            );
            (false, None)
        } else {
            match self.bounded_delete(&plan.source_message_id).await {
                Ok(()) => (true, None),
                Err(err) => {
                    warn!(message = %plan.source_message_id, error = %err, "original not deleted");
                    (false, Some(err))
                }
            }
        };

        DispatchResult {
            message_id: plan.source_message_id,
            sent_reply_ids,
            send_errors,
            reply_delete_errors,
            original_deleted,
            original_delete_error,
        }
    }

    /// Execute many plans concurrently. Plans share the engine's permit
    /// pool, so fan-out here adds no network concurrency.
    pub async fn dispatch_all(&self, plans: Vec<ReplyPlan>) -> Vec<DispatchResult> {
        join_all(plans.into_iter().map(|plan| self.dispatch(plan))).await
    }

    /// Send one copy and, on success, delete the sent reply after the
    /// delay unless the policy retains it.
    async fn run_copy(&self, plan: &ReplyPlan, copy: u32) -> CopyOutcome {
        let send_result = {
            let _permit = self.acquire().await;
            self.source
                .send(&plan.recipient, &plan.subject, &plan.body)
                .await
        };

        let reply_id = match send_result {
            Ok(id) => id,
            Err(err) => {
                warn!(
                    message = %plan.source_message_id,
                    copy,
                    error = %err,
                    "reply not sent, leaving original for next run"
                );
                return CopyOutcome::Failed(SendError {
                    recipient: plan.recipient.clone(),
                    copy,
                    reason: err.to_string(),
                });
            }
        };
        debug!(message = %plan.source_message_id, copy, reply = %reply_id, "reply sent");

        if plan.retain_reply {
            return CopyOutcome::Sent {
                reply_id,
                delete_error: None,
            };
        }

        // Give the store time to surface the reply in the sent box. The
        // permit is released for the wait; only the delete call re-takes
        // one.
        tokio::time::sleep(self.delete_delay).await;

        let delete_error = match self.bounded_delete(&reply_id).await {
            Ok(()) => None,
            Err(err) => {
                warn!(reply = %reply_id, error = %err, "sent reply not deleted");
                Some(err)
            }
        };
        CopyOutcome::Sent {
            reply_id,
            delete_error,
        }
    }

    /// Delete one message under a pool permit.
    async fn bounded_delete(&self, id: &str) -> Result<(), DeleteError> {
        let _permit = self.acquire().await;
        self.source.delete(id).await.map_err(|err| DeleteError {
            id: id.to_string(),
            reason: err.to_string(),
        })
    }

    async fn acquire(&self) -> tokio::sync::SemaphorePermit<'_> {
        // The semaphore lives as long as the engine and is never closed.
        self.permits
            .acquire()
            .await
            .expect("dispatch semaphore closed")
    }
}
