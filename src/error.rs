use std::time::Duration;

use crate::types::ServiceId;

/// Errors surfaced to the owner of proposer sessions.
///
/// Stale or duplicate replies and rejected rounds are part of normal
/// operation and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum ProposerError {
    #[error("proposal {0} was already started")]
    AlreadyStarted(ServiceId),

    #[error("a proposal for {0} is still in progress")]
    SessionInProgress(ServiceId),

    #[error("no proposal session for {0}")]
    UnknownSession(ServiceId),

    #[error("proposal {correlation_id} did not complete within {deadline:?}")]
    DeadlineElapsed {
        correlation_id: ServiceId,
        deadline: Duration,
    },

    #[error("proposal {0} was discarded before it completed")]
    SessionDiscarded(ServiceId),
}
