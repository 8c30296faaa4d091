use serde::{Deserialize, Serialize};

use crate::types::{AcceptorAddr, BallotId, ServiceId};

/// Phase 1a. Asks an acceptor to promise not to accept lower ballots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prepare {
    pub correlation_id: ServiceId,
    pub ballot_id: BallotId,
}

/// Phase 1b grant. The responder comes from the reply envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promise {
    pub correlation_id: ServiceId,
    pub ballot_id: BallotId,
}

/// Phase 1b denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRejected {
    pub correlation_id: ServiceId,
    /// The ballot being rejected.
    pub ballot_id: BallotId,
    /// The highest ballot the rejecting acceptor knows of.
    pub value_ballot_id: BallotId,
}

/// Phase 2a. Asks a promised acceptor to accept the proposed address pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accept {
    pub correlation_id: ServiceId,
    pub ballot_id: BallotId,
    pub control_uri: String,
    pub data_uri: String,
}

/// Phase 2b. The responder comes from the reply envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accepted {
    pub correlation_id: ServiceId,
    pub ballot_id: BallotId,
}

/// Requests a proposer sends to acceptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposerRequest {
    Prepare(Prepare),
    Accept(Accept),
}

impl ProposerRequest {
    pub fn ballot_id(&self) -> BallotId {
        match self {
            ProposerRequest::Prepare(prepare) => prepare.ballot_id,
            ProposerRequest::Accept(accept) => accept.ballot_id,
        }
    }
}

/// Replies acceptors send back to a proposer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposerReply {
    Promise(Promise),
    PrepareRejected(PrepareRejected),
    Accepted(Accepted),
}

impl ProposerReply {
    pub fn correlation_id(&self) -> ServiceId {
        match self {
            ProposerReply::Promise(promise) => promise.correlation_id,
            ProposerReply::PrepareRejected(rejected) => rejected.correlation_id,
            ProposerReply::Accepted(accepted) => accepted.correlation_id,
        }
    }

    pub fn ballot_id(&self) -> BallotId {
        match self {
            ProposerReply::Promise(promise) => promise.ballot_id,
            ProposerReply::PrepareRejected(rejected) => rejected.ballot_id,
            ProposerReply::Accepted(accepted) => accepted.ballot_id,
        }
    }
}

/// A reply together with the acceptor that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inbound {
    pub from: AcceptorAddr,
    pub reply: ProposerReply,
}

impl Inbound {
    pub fn new(from: impl Into<AcceptorAddr>, reply: ProposerReply) -> Self {
        Self {
            from: from.into(),
            reply,
        }
    }
}
