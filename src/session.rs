//! Proposer session: one Paxos attempt to assign a grid service slot.
//!
//! A session walks `Idle → Preparing → Accepting → Completed`. A quorum of
//! rejections sends it back to `Preparing` with a higher ballot and a freshly
//! discovered acceptor set.
//!
//! The session is a plain state machine. It never blocks and never awaits:
//! requests go out through a [`MessageChannel`] and replies come back through
//! the `on_*` entry points. Callers serialize access, one lock per session
//! (see [`SessionRegistry`](crate::registry::SessionRegistry)).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::ballot::BallotState;
use crate::channel::MessageChannel;
use crate::config::ProposerConfig;
use crate::directory::{unique_in_order, AcceptorDirectory};
use crate::error::ProposerError;
use crate::messages::{
    Accept, Accepted, Inbound, Prepare, PrepareRejected, Promise, ProposerReply, ProposerRequest,
};
use crate::quorum::{is_quorum, quorum};
use crate::tracker::ResponseTracker;
use crate::types::{AcceptorAddr, BallotId, Consensus, ProposedValue, ServiceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Preparing,
    Accepting,
    Completed,
}

/// Snapshot published on every phase change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub phase: Phase,
    pub ballot_id: BallotId,
    /// Number of Prepare phases entered so far.
    pub round: u32,
    /// Set once the session has been dropped by its owner. No further
    /// progress will be published.
    pub discarded: bool,
}

/// Action taken once a session reaches consensus, e.g. starting the service
/// on the winning node.
pub trait CompletionHook: Send + Sync {
    fn on_completed(&self, consensus: &Consensus);
}

/// Completion hook that does nothing beyond letting the session finish.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCompletion;

impl CompletionHook for NoopCompletion {
    fn on_completed(&self, _consensus: &Consensus) {}
}

struct Target {
    correlation_id: ServiceId,
    value: ProposedValue,
}

pub struct ProposerSession {
    config: ProposerConfig,
    directory: Arc<dyn AcceptorDirectory>,
    channel: Arc<dyn MessageChannel>,
    on_completed: Arc<dyn CompletionHook>,

    /// Set by `start_proposal`.
    target: Option<Target>,

    ballot: BallotState,

    /// Acceptors discovered for the current Prepare phase only.
    acceptors: Vec<AcceptorAddr>,

    promised: ResponseTracker,
    accepted: ResponseTracker,
    rejected: ResponseTracker,

    phase: Phase,
    round: u32,
    consensus: Option<Consensus>,
    discarded: bool,
    progress: watch::Sender<Progress>,
}

impl ProposerSession {
    pub fn new(
        config: ProposerConfig,
        directory: Arc<dyn AcceptorDirectory>,
        channel: Arc<dyn MessageChannel>,
        on_completed: Arc<dyn CompletionHook>,
    ) -> Self {
        let (progress, _) = watch::channel(Progress {
            phase: Phase::Idle,
            ballot_id: BallotId::ZERO,
            round: 0,
            discarded: false,
        });

        Self {
            config,
            directory,
            channel,
            on_completed,
            target: None,
            ballot: BallotState::new(),
            acceptors: Vec::new(),
            promised: ResponseTracker::new(),
            accepted: ResponseTracker::new(),
            rejected: ResponseTracker::new(),
            phase: Phase::Idle,
            round: 0,
            consensus: None,
            discarded: false,
            progress,
        }
    }

    /// Makes every ballot this session proposes greater than `floor`, e.g.
    /// the highest ballot of a session it replaces.
    pub fn with_ballot_floor(mut self, floor: BallotId) -> Self {
        self.ballot = BallotState::starting_after(floor);
        self
    }

    /// Proposes `control_uri`/`data_uri` as the owner of the `service_type`
    /// slot and sends the first round of Prepare requests.
    pub fn start_proposal(
        &mut self,
        service_type: &str,
        control_uri: impl Into<String>,
        data_uri: impl Into<String>,
    ) -> Result<ServiceId, ProposerError> {
        let correlation_id = ServiceId::for_service_type(service_type);
        if self.target.is_some() {
            return Err(ProposerError::AlreadyStarted(correlation_id));
        }

        self.target = Some(Target {
            correlation_id,
            value: ProposedValue::new(control_uri, data_uri),
        });

        info!(%correlation_id, service_type, "starting proposal");

        self.enter_prepare_phase();

        Ok(correlation_id)
    }

    pub fn handle(&mut self, inbound: Inbound) {
        match inbound.reply {
            ProposerReply::Promise(promise) => self.on_promise(inbound.from, promise),
            ProposerReply::PrepareRejected(rejected) => {
                self.on_prepare_rejected(inbound.from, rejected)
            }
            ProposerReply::Accepted(accepted) => self.on_accepted(inbound.from, accepted),
        }
    }

    pub fn on_promise(&mut self, from: AcceptorAddr, promise: Promise) {
        if !self.is_current(promise.correlation_id, promise.ballot_id) {
            trace!(acceptor = %from, ballot = %promise.ballot_id, "ignoring stale promise");
            return;
        }

        if !self.acceptors.contains(&from) {
            trace!(acceptor = %from, "ignoring promise from unknown acceptor");
            return;
        }

        match self.phase {
            Phase::Preparing => {}
            Phase::Completed => {
                self.promised.add(from);
                return;
            }
            Phase::Idle | Phase::Accepting => {
                trace!(acceptor = %from, phase = ?self.phase, "ignoring late promise");
                return;
            }
        }

        if !self.promised.add(from) {
            trace!(acceptor = %from, "ignoring duplicate promise");
            return;
        }

        debug!(
            acceptor = %from,
            promised = self.promised.len(),
            quorum = quorum(self.acceptors.len()),
            "promise recorded"
        );

        if is_quorum(self.promised.len(), self.acceptors.len()) {
            self.enter_accept_phase(self.ballot.proposed());
        }
    }

    pub fn on_accepted(&mut self, from: AcceptorAddr, accepted: Accepted) {
        if !self.is_current(accepted.correlation_id, accepted.ballot_id) {
            trace!(acceptor = %from, ballot = %accepted.ballot_id, "ignoring stale accepted");
            return;
        }

        if !matches!(self.phase, Phase::Accepting | Phase::Completed) {
            trace!(acceptor = %from, phase = ?self.phase, "ignoring accepted outside accept phase");
            return;
        }

        // Only promised acceptors were sent an Accept.
        if !self.promised.contains(&from) {
            trace!(acceptor = %from, "ignoring accepted from acceptor that never promised");
            return;
        }

        if !self.accepted.add(from) {
            trace!(acceptor = %from, "ignoring duplicate accepted");
            return;
        }

        if self.phase == Phase::Completed {
            return;
        }

        debug!(
            acceptor = %from,
            accepted = self.accepted.len(),
            promised = self.promised.len(),
            "accepted recorded"
        );

        if self.accepted.len() == self.promised.len() {
            self.complete();
        }
    }

    pub fn on_prepare_rejected(&mut self, from: AcceptorAddr, rejected: PrepareRejected) {
        if !self.is_current(rejected.correlation_id, rejected.ballot_id) {
            trace!(acceptor = %from, ballot = %rejected.ballot_id, "ignoring stale rejection");
            return;
        }

        if !matches!(self.phase, Phase::Preparing | Phase::Accepting) {
            trace!(acceptor = %from, phase = ?self.phase, "ignoring rejection");
            return;
        }

        if !self.acceptors.contains(&from) {
            trace!(acceptor = %from, "ignoring rejection from unknown acceptor");
            return;
        }

        if !self.rejected.add(from) {
            trace!(acceptor = %from, "ignoring duplicate rejection");
            return;
        }

        let rejected_count = self.ballot.record_rejection(rejected.value_ballot_id);

        debug!(
            acceptor = %from,
            value_ballot = %rejected.value_ballot_id,
            rejected = rejected_count,
            quorum = quorum(self.acceptors.len()),
            "rejection recorded"
        );

        if is_quorum(rejected_count, self.acceptors.len()) {
            info!(
                ballot = %self.ballot.proposed(),
                highest_rejected = %self.ballot.highest_rejected(),
                "proposal rejected by quorum, retrying"
            );
            self.enter_prepare_phase();
        }
    }

    pub fn correlation_id(&self) -> Option<ServiceId> {
        self.target.as_ref().map(|target| target.correlation_id)
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ballot(&self) -> &BallotState {
        &self.ballot
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn acceptors(&self) -> &[AcceptorAddr] {
        &self.acceptors
    }

    pub fn promised(&self) -> &ResponseTracker {
        &self.promised
    }

    pub fn accepted(&self) -> &ResponseTracker {
        &self.accepted
    }

    pub fn consensus(&self) -> Option<&Consensus> {
        self.consensus.as_ref()
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    pub fn is_discarded(&self) -> bool {
        self.discarded
    }

    /// Marks the session as abandoned and wakes everyone waiting on its
    /// progress. Replies are ignored from now on.
    pub fn discard(&mut self) {
        if self.discarded {
            return;
        }
        self.discarded = true;
        self.set_phase(self.phase);
    }

    fn is_current(&self, correlation_id: ServiceId, ballot_id: BallotId) -> bool {
        !self.discarded
            && self.correlation_id() == Some(correlation_id)
            && ballot_id == self.ballot.proposed()
    }

    fn enter_prepare_phase(&mut self) {
        let Some(correlation_id) = self.correlation_id() else {
            return;
        };

        let Some(ballot_id) = self.ballot.begin_round(self.config.retry_ballot) else {
            warn!(
                %correlation_id,
                highest = %self.ballot.highest(),
                highest_rejected = %self.ballot.highest_rejected(),
                "ballot space exhausted, not starting another round"
            );
            return;
        };

        self.promised.clear();
        self.accepted.clear();
        self.rejected.clear();
        self.acceptors = unique_in_order(self.directory.active_acceptors_for(correlation_id));
        self.round += 1;
        self.set_phase(Phase::Preparing);

        if self.acceptors.is_empty() {
            warn!(%correlation_id, ballot = %ballot_id, "no active acceptors for service");
        }

        info!(
            %correlation_id,
            ballot = %ballot_id,
            round = self.round,
            acceptors = self.acceptors.len(),
            "entering prepare phase"
        );

        let prepare = Prepare {
            correlation_id,
            ballot_id,
        };
        for acceptor in &self.acceptors {
            self.channel.send(
                acceptor,
                ProposerRequest::Prepare(prepare),
                &self.config.reply_to,
            );
        }
    }

    fn enter_accept_phase(&mut self, ballot_id: BallotId) {
        let Some(target) = &self.target else {
            return;
        };

        let accept = Accept {
            correlation_id: target.correlation_id,
            ballot_id,
            control_uri: target.value.control_uri.clone(),
            data_uri: target.value.data_uri.clone(),
        };

        self.set_phase(Phase::Accepting);

        let mut promised: Vec<AcceptorAddr> = self.promised.iter().copied().collect();
        promised.sort();

        info!(
            correlation_id = %accept.correlation_id,
            ballot = %ballot_id,
            promised = promised.len(),
            "entering accept phase"
        );

        for acceptor in &promised {
            self.channel.send(
                acceptor,
                ProposerRequest::Accept(accept.clone()),
                &self.config.reply_to,
            );
        }
    }

    fn complete(&mut self) {
        let Some(target) = &self.target else {
            return;
        };

        let mut acceptors: Vec<AcceptorAddr> = self.accepted.iter().copied().collect();
        acceptors.sort();

        let consensus = Consensus {
            correlation_id: target.correlation_id,
            ballot_id: self.ballot.proposed(),
            value: target.value.clone(),
            acceptors,
        };

        info!(
            correlation_id = %consensus.correlation_id,
            ballot = %consensus.ballot_id,
            control_uri = %consensus.value.control_uri,
            "proposal completed"
        );

        self.consensus = Some(consensus.clone());
        self.set_phase(Phase::Completed);
        self.on_completed.on_completed(&consensus);
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.progress.send_replace(Progress {
            phase,
            ballot_id: self.ballot.proposed(),
            round: self.round,
            discarded: self.discarded,
        });
    }
}
