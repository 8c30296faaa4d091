//! Proposer configuration

use clap::ValueEnum;

use crate::types::ReplyTo;

/// How the next ballot is chosen when a round starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RetryBallot {
    /// One above the highest ballot this session has proposed. Ignores what
    /// rejecting acceptors report, so against a competitor that is far ahead
    /// it climbs one ballot per round.
    OwnHistory,
    /// One above the highest of our own ballots and every ballot reported by
    /// the acceptors that rejected the previous round.
    #[default]
    ObservedMax,
}

#[derive(Debug, Clone, Default)]
pub struct ProposerConfig {
    /// Address carried by every request so replies find their way back.
    pub reply_to: ReplyTo,
    pub retry_ballot: RetryBallot,
}

impl ProposerConfig {
    pub fn new(reply_to: ReplyTo) -> Self {
        Self {
            reply_to,
            ..Self::default()
        }
    }

    pub fn with_retry_ballot(mut self, retry_ballot: RetryBallot) -> Self {
        self.retry_ballot = retry_ballot;
        self
    }
}
