//! Mail store abstraction.
//!
//! The engine only ever talks to the mailbox through [`MessageSource`];
//! the Gmail REST implementation lives in [`gmail`], and tests substitute
//! an instrumented in-memory source.

pub mod auth;
pub mod gmail;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;

use crate::error::SourceError;

pub use auth::TokenProvider;
pub use gmail::GmailSource;

/// A message pulled from the mail store. Owned by the store; the engine
/// only reads it.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Store-assigned opaque identifier.
    pub id: String,
    /// From address.
    pub sender: String,
    /// To address (the mailbox owner), as it appeared on the message.
    pub recipient: String,
    /// Subject line; empty when the header was missing.
    pub subject: String,
    /// Sent datetime as carried in the Date header; empty when missing.
    pub date: String,
    /// Decoded body, or the store's snippet when no decodable part exists.
    pub body: String,
}

/// Interface to the mail store consumed by the engine.
///
/// Implementations issue the network calls; the engine bounds how many are
/// in flight. Quota metering beyond that bound is the store's concern
/// (roughly 225 quota units per full send+delete+delete cycle against a
/// shared 250 units/second ceiling on the Gmail side).
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// List unread messages from the given sender. May be empty.
    async fn list(&self, sender: &str) -> Result<Vec<IncomingMessage>, SourceError>;

    /// Send a reply; returns the store-assigned id of the sent message.
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, SourceError>;

    /// Delete a message (original or sent reply) by id.
    async fn delete(&self, id: &str) -> Result<(), SourceError>;
}
