//! In-memory home of proposer sessions, keyed by correlation id.
//!
//! Each session sits behind its own mutex, so replies for one proposal are
//! applied one at a time while proposals for different services proceed
//! independently.

use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::channel::MessageChannel;
use crate::config::ProposerConfig;
use crate::directory::AcceptorDirectory;
use crate::error::ProposerError;
use crate::messages::Inbound;
use crate::session::{CompletionHook, Phase, ProposerSession};
use crate::types::{BallotId, Consensus, ServiceId};

pub type SharedSession = Arc<Mutex<ProposerSession>>;

pub struct SessionRegistry {
    config: ProposerConfig,
    directory: Arc<dyn AcceptorDirectory>,
    channel: Arc<dyn MessageChannel>,
    on_completed: Arc<dyn CompletionHook>,
    sessions: Mutex<HashMap<ServiceId, SharedSession>>,
}

impl SessionRegistry {
    pub fn new(
        config: ProposerConfig,
        directory: Arc<dyn AcceptorDirectory>,
        channel: Arc<dyn MessageChannel>,
        on_completed: Arc<dyn CompletionHook>,
    ) -> Self {
        Self {
            config,
            directory,
            channel,
            on_completed,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a session for `service_type` and sends its first Prepare.
    ///
    /// Fails if a proposal for the same service is still running. A completed
    /// one is replaced, and the new session proposes above its ballots.
    pub async fn start_proposal(
        &self,
        service_type: &str,
        control_uri: impl Into<String>,
        data_uri: impl Into<String>,
    ) -> Result<ServiceId, ProposerError> {
        let correlation_id = ServiceId::for_service_type(service_type);

        let mut guard = {
            let mut sessions = self.sessions.lock().await;

            let mut floor = BallotId::ZERO;
            if let Some(existing) = sessions.get(&correlation_id) {
                let existing = existing.lock().await;
                if existing.phase() != Phase::Completed {
                    return Err(ProposerError::SessionInProgress(correlation_id));
                }
                floor = existing.ballot().highest();
                debug!(%correlation_id, %floor, "replacing completed session");
            }

            let session = Arc::new(Mutex::new(
                ProposerSession::new(
                    self.config.clone(),
                    Arc::clone(&self.directory),
                    Arc::clone(&self.channel),
                    Arc::clone(&self.on_completed),
                )
                .with_ballot_floor(floor),
            ));

            // Replies to the first Prepare queue up on this lock until the
            // session has started.
            let guard = Arc::clone(&session).lock_owned().await;
            sessions.insert(correlation_id, session);
            guard
        };

        guard.start_proposal(service_type, control_uri, data_uri)
    }

    /// Routes a reply to the session it belongs to.
    pub async fn deliver(&self, inbound: Inbound) -> Result<(), ProposerError> {
        let session = self.session(inbound.reply.correlation_id()).await?;
        session.lock().await.handle(inbound);
        Ok(())
    }

    /// Delivers every reply from `inbound` until the stream ends.
    pub async fn dispatch(&self, inbound: impl Stream<Item = Inbound>) {
        futures::pin_mut!(inbound);

        while let Some(message) = inbound.next().await {
            if let Err(err) = self.deliver(message).await {
                debug!(acceptor = %message.from, "dropping reply: {err}");
            }
        }

        debug!("reply stream closed");
    }

    /// Waits for a session to complete. If `deadline` passes first the
    /// session is discarded.
    pub async fn await_completion(
        &self,
        correlation_id: ServiceId,
        deadline: Duration,
    ) -> Result<Consensus, ProposerError> {
        let session = self.session(correlation_id).await?;
        let mut progress = session.lock().await.subscribe();

        let waited = tokio::time::timeout(
            deadline,
            progress.wait_for(|progress| {
                progress.phase == Phase::Completed || progress.discarded
            }),
        )
        .await
        .map(|changed| changed.map(|_| ()));

        match waited {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(ProposerError::SessionDiscarded(correlation_id)),
            Err(_) => {
                warn!(%correlation_id, ?deadline, "proposal deadline elapsed, discarding session");
                self.discard_session(correlation_id, &session).await;
                return Err(ProposerError::DeadlineElapsed {
                    correlation_id,
                    deadline,
                });
            }
        }

        let consensus = session.lock().await.consensus().cloned();
        consensus.ok_or(ProposerError::SessionDiscarded(correlation_id))
    }

    /// Forgets a session. Replies still in flight for it are dropped and
    /// anyone waiting on it gets [`ProposerError::SessionDiscarded`].
    pub async fn discard(&self, correlation_id: ServiceId) -> bool {
        let removed = self.sessions.lock().await.remove(&correlation_id);
        let Some(session) = removed else {
            return false;
        };

        session.lock().await.discard();
        info!(%correlation_id, "session discarded");
        true
    }

    pub async fn phase(&self, correlation_id: ServiceId) -> Result<Phase, ProposerError> {
        let session = self.session(correlation_id).await?;
        let phase = session.lock().await.phase();
        Ok(phase)
    }

    pub async fn consensus(
        &self,
        correlation_id: ServiceId,
    ) -> Result<Option<Consensus>, ProposerError> {
        let session = self.session(correlation_id).await?;
        let consensus = session.lock().await.consensus().cloned();
        Ok(consensus)
    }

    pub async fn session(&self, correlation_id: ServiceId) -> Result<SharedSession, ProposerError> {
        self.sessions
            .lock()
            .await
            .get(&correlation_id)
            .cloned()
            .ok_or(ProposerError::UnknownSession(correlation_id))
    }

    /// Removes `session` unless it has already been replaced.
    async fn discard_session(&self, correlation_id: ServiceId, session: &SharedSession) {
        {
            let mut sessions = self.sessions.lock().await;
            if !sessions
                .get(&correlation_id)
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                return;
            }
            sessions.remove(&correlation_id);
        }

        session.lock().await.discard();
        info!(%correlation_id, "session discarded");
    }
}
