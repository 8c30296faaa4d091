//! Proposer side of the Paxos round that decides which node owns a grid
//! service slot.
//!
//! A [`ProposerSession`] drives Prepare/Promise and Accept/Accepted against
//! the acceptors an [`AcceptorDirectory`] reports as active for the service,
//! and retries with a higher ballot whenever a quorum rejects it. The
//! [`SessionRegistry`] keeps one session per correlation id, serializes the
//! replies routed to it and lets the caller bound a proposal with a deadline.

pub mod ballot;
pub mod channel;
pub mod config;
pub mod directory;
pub mod error;
pub mod messages;
pub mod quorum;
pub mod registry;
pub mod rpc;
pub mod session;
pub mod tracker;
pub mod types;

pub use ballot::BallotState;
pub use channel::MessageChannel;
pub use config::{ProposerConfig, RetryBallot};
pub use directory::{AcceptorDirectory, NodeDirectory, NodeState};
pub use error::ProposerError;
pub use messages::{
    Accept, Accepted, Inbound, Prepare, PrepareRejected, Promise, ProposerReply, ProposerRequest,
};
pub use registry::SessionRegistry;
pub use session::{CompletionHook, NoopCompletion, Phase, Progress, ProposerSession};
pub use tracker::ResponseTracker;
pub use types::{AcceptorAddr, BallotId, Consensus, ProposedValue, ReplyTo, ServiceId};
