use crate::messages::ProposerRequest;
use crate::types::{AcceptorAddr, ReplyTo};

/// Delivers requests to acceptors.
///
/// Sending is fire-and-forget: implementations must not block, and nothing
/// is assumed about delivery. Replies come back separately and are handed to
/// the session registry as [`Inbound`](crate::messages::Inbound) messages.
pub trait MessageChannel: Send + Sync {
    fn send(&self, to: &AcceptorAddr, request: ProposerRequest, reply_to: &ReplyTo);
}
