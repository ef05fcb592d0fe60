//! Instrumented in-memory source for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::SourceError;
use crate::source::{IncomingMessage, MessageSource};

/// A recorded send call.
#[derive(Debug, Clone)]
pub(crate) struct SentReply {
    pub reply_id: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub at: Instant,
}

/// A recorded delete call.
#[derive(Debug, Clone)]
pub(crate) struct DeletedMessage {
    pub id: String,
    pub at: Instant,
}

/// In-memory `MessageSource` that records every call, injects failures,
/// and gauges how many network operations are in flight at once.
#[derive(Default)]
pub(crate) struct MockSource {
    pub listings: Mutex<HashMap<String, Vec<IncomingMessage>>>,
    pub sends: Mutex<Vec<SentReply>>,
    pub deletes: Mutex<Vec<DeletedMessage>>,
    /// Fail this many send calls before succeeding.
    pub fail_first_sends: AtomicUsize,
    /// Ids whose delete call fails.
    pub fail_deletes: Mutex<HashSet<String>>,
    /// Senders whose list call fails.
    pub fail_lists: Mutex<HashSet<String>>,
    /// Simulated network latency per send/delete call.
    pub latency: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    next_reply: AtomicUsize,
}

impl MockSource {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Default::default()
        }
    }

    pub fn stock(&self, sender: &str, messages: Vec<IncomingMessage>) {
        self.listings
            .lock()
            .unwrap()
            .insert(sender.to_string(), messages);
    }

    pub fn message(id: &str, sender: &str) -> IncomingMessage {
        IncomingMessage {
            id: id.to_string(),
            sender: sender.to_string(),
            recipient: "me@example.com".to_string(),
            subject: "hello".to_string(),
            date: "Sat, 30 Aug 2025 10:00:00 +0000".to_string(),
            body: "original body".to_string(),
        }
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deletes
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.id.clone())
            .collect()
    }

    async fn enter(&self) -> InFlightGuard<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        InFlightGuard { gauge: &self.in_flight }
    }
}

struct InFlightGuard<'a> {
    gauge: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.gauge.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageSource for MockSource {
    async fn list(&self, sender: &str) -> Result<Vec<IncomingMessage>, SourceError> {
        if self.fail_lists.lock().unwrap().contains(sender) {
            return Err(SourceError::ListFailed {
                sender: sender.to_string(),
                reason: "injected list failure".to_string(),
            });
        }
        Ok(self
            .listings
            .lock()
            .unwrap()
            .get(sender)
            .cloned()
            .unwrap_or_default())
    }

    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, SourceError> {
        let _guard = self.enter().await;

        let remaining = self
            .fail_first_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(SourceError::SendFailed {
                recipient: recipient.to_string(),
                reason: "injected send failure".to_string(),
            });
        }

        let reply_id = format!("reply-{}", self.next_reply.fetch_add(1, Ordering::SeqCst));
        self.sends.lock().unwrap().push(SentReply {
            reply_id: reply_id.clone(),
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            at: Instant::now(),
        });
        Ok(reply_id)
    }

    async fn delete(&self, id: &str) -> Result<(), SourceError> {
        let _guard = self.enter().await;

        if self.fail_deletes.lock().unwrap().contains(id) {
            return Err(SourceError::DeleteFailed {
                id: id.to_string(),
                reason: "injected delete failure".to_string(),
            });
        }
        self.deletes.lock().unwrap().push(DeletedMessage {
            id: id.to_string(),
            at: Instant::now(),
        });
        // The store is the single source of truth: a deleted original no
        // longer shows up in later listings.
        for messages in self.listings.lock().unwrap().values_mut() {
            messages.retain(|m| m.id != id);
        }
        Ok(())
    }
}
