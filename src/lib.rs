//! Mail Bouncer — automated rejection of unwanted email.
//!
//! Scans a mailbox for unread messages from configured senders, sends each
//! one a reply (optionally several copies), and deletes the original and
//! the reply after a delay. Designed to run from cron; no state is kept
//! between runs beyond the mailbox itself.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod planner;
pub mod policy;
pub mod runner;
pub mod source;
