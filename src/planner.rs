//! Reply planning — turns a policy and a message into concrete reply intents.

use crate::error::PlanError;
use crate::policy::ResolvedPolicy;
use crate::source::IncomingMessage;

/// The reply intents for one message. Created once by [`plan`], consumed
/// once by the dispatch engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPlan {
    /// Id of the message being bounced.
    pub source_message_id: String,
    /// Where every copy goes.
    pub recipient: String,
    /// Reply subject.
    pub subject: String,
    /// Reply body, identical across copies.
    pub body: String,
    /// Number of identical copies to send. Always equals the policy's
    /// `reply_count`.
    pub copies: u32,
    /// Keep the sent copies instead of deleting them after the delay.
    pub retain_reply: bool,
}

/// Build the reply plan for one message under a resolved policy.
///
/// All `copies` intents are identical; sending the same reply body several
/// times is the point of the `multiple` knob — enough duplicates trip the
/// spam filter on the recipient side. The body quotes the original under a
/// metadata block so the bounced party sees exactly what came back.
pub fn plan(policy: &ResolvedPolicy, message: &IncomingMessage) -> Result<ReplyPlan, PlanError> {
    if message.id.is_empty() {
        return Err(PlanError::MissingId);
    }
    if message.sender.is_empty() {
        return Err(PlanError::MissingSender {
            id: message.id.clone(),
        });
    }

    let metadata = format!(
        "From:  {}\nSent:  {}\nTo:  {}\nSubject:  {}",
        message.sender, message.date, message.recipient, message.subject
    );

    Ok(ReplyPlan {
        source_message_id: message.id.clone(),
        recipient: policy.recipient.clone(),
        subject: format!("Re:  {}", message.subject),
        body: format!("{}\n\n{}\n\n{}", policy.body_prefix, metadata, message.body),
        copies: policy.reply_count,
        retain_reply: policy.retain_reply,
    })
}
