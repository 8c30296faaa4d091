//! tarpc transport between proposers and acceptors.

use anyhow::{Context, Result};
use futures::channel::mpsc::UnboundedSender;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tarpc::{client::Config, context, tokio_serde::formats::Json};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::channel::MessageChannel;
use crate::messages::{
    Accept, Accepted, Inbound, Prepare, PrepareRejected, Promise, ProposerReply, ProposerRequest,
};
use crate::types::{AcceptorAddr, ReplyTo};

#[tarpc::service]
pub trait AcceptorService {
    async fn prepare(message: Prepare, reply_to: ReplyTo) -> PrepareReply;
    async fn accept(message: Accept, reply_to: ReplyTo) -> AcceptReply;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrepareReply {
    Promise(Promise),
    Rejected(PrepareRejected),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptReply {
    Accepted(Accepted),
    Rejected(PrepareRejected),
}

impl From<PrepareReply> for ProposerReply {
    fn from(reply: PrepareReply) -> Self {
        match reply {
            PrepareReply::Promise(promise) => ProposerReply::Promise(promise),
            PrepareReply::Rejected(rejected) => ProposerReply::PrepareRejected(rejected),
        }
    }
}

impl From<AcceptReply> for ProposerReply {
    fn from(reply: AcceptReply) -> Self {
        match reply {
            AcceptReply::Accepted(accepted) => ProposerReply::Accepted(accepted),
            AcceptReply::Rejected(rejected) => ProposerReply::PrepareRejected(rejected),
        }
    }
}

/// [`MessageChannel`] that calls acceptors over tarpc and forwards their
/// replies to `replies`, usually drained by
/// [`SessionRegistry::dispatch`](crate::registry::SessionRegistry::dispatch).
///
/// Every request runs on its own task, so `send` must be called from within
/// a tokio runtime.
#[derive(Clone)]
pub struct RpcChannel {
    /// Client used to communicate with each acceptor.
    clients: Arc<Mutex<HashMap<AcceptorAddr, AcceptorServiceClient>>>,

    replies: UnboundedSender<Inbound>,
}

impl RpcChannel {
    pub fn new(replies: UnboundedSender<Inbound>) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            replies,
        }
    }

    async fn get_or_init_client(&self, acceptor: AcceptorAddr) -> Result<AcceptorServiceClient> {
        if let Some(client) = self.clients.lock().await.get(&acceptor) {
            return Ok(client.clone());
        }

        // Connect without holding the lock so a slow acceptor does not hold
        // up requests to the others.
        let mut transport = tarpc::serde_transport::tcp::connect(acceptor.0, Json::default);
        transport.config_mut().max_frame_length(usize::MAX);
        let transport = transport.await.context("initializing transport")?;

        let client = AcceptorServiceClient::new(Config::default(), transport).spawn();

        // Another request may have connected first. Keep its client.
        let client = self
            .clients
            .lock()
            .await
            .entry(acceptor)
            .or_insert(client)
            .clone();

        Ok(client)
    }

    async fn request(
        &self,
        acceptor: AcceptorAddr,
        request: ProposerRequest,
        reply_to: ReplyTo,
    ) -> Result<ProposerReply> {
        let client = self
            .get_or_init_client(acceptor)
            .await
            .with_context(|| format!("getting rpc client: acceptor={acceptor}"))?;

        let reply: ProposerReply = match request {
            ProposerRequest::Prepare(prepare) => client
                .prepare(context::current(), prepare, reply_to)
                .await
                .context("sending prepare request")?
                .into(),
            ProposerRequest::Accept(accept) => client
                .accept(context::current(), accept, reply_to)
                .await
                .context("sending accept request")?
                .into(),
        };

        Ok(reply)
    }

    async fn deliver(&self, acceptor: AcceptorAddr, request: ProposerRequest, reply_to: ReplyTo) {
        let ballot = request.ballot_id();

        match self.request(acceptor, request, reply_to).await {
            Ok(reply) => {
                debug!(%acceptor, %ballot, ?reply, "reply received");
                if self.replies.unbounded_send(Inbound::new(acceptor, reply)).is_err() {
                    warn!(%acceptor, "reply dispatcher has shut down, dropping reply");
                }
            }
            Err(err) => {
                // Drop the client so the next request reconnects.
                self.clients.lock().await.remove(&acceptor);
                warn!(%acceptor, %ballot, "request failed: {err:?}");
            }
        }
    }
}

impl MessageChannel for RpcChannel {
    fn send(&self, to: &AcceptorAddr, request: ProposerRequest, reply_to: &ReplyTo) {
        let channel = self.clone();
        let acceptor = *to;
        let reply_to = *reply_to;

        tokio::spawn(async move { channel.deliver(acceptor, request, reply_to).await });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BallotId, ServiceId};
    use futures::channel::mpsc;
    use std::{net::SocketAddr, time::Duration};
    use tokio::net::TcpListener;

    #[test]
    fn rejected_accept_is_routed_as_prepare_rejected() {
        let rejected = PrepareRejected {
            correlation_id: ServiceId::for_service_type("grid"),
            ballot_id: BallotId(2),
            value_ballot_id: BallotId(4),
        };

        assert_eq!(
            ProposerReply::from(AcceptReply::Rejected(rejected)),
            ProposerReply::PrepareRejected(rejected)
        );
        assert_eq!(
            ProposerReply::from(PrepareReply::Rejected(rejected)),
            ProposerReply::PrepareRejected(rejected)
        );
    }

    #[tokio::test]
    async fn unreachable_acceptor_produces_no_reply() {
        let (replies_tx, mut replies_rx) = mpsc::unbounded();
        let channel = RpcChannel::new(replies_tx);
        let acceptor = AcceptorAddr(SocketAddr::from(([127, 0, 0, 1], 1)));
        let prepare = Prepare {
            correlation_id: ServiceId::for_service_type("grid"),
            ballot_id: BallotId(1),
        };

        channel
            .deliver(acceptor, ProposerRequest::Prepare(prepare), ReplyTo::default())
            .await;

        assert!(replies_rx.try_next().is_err());
        assert!(channel.clients.lock().await.is_empty());

        // Fire-and-forget from the caller's point of view.
        channel.send(&acceptor, ProposerRequest::Prepare(prepare), &ReplyTo::default());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(replies_rx.try_next().is_err());
    }

    #[tokio::test]
    async fn slow_acceptor_does_not_block_connecting_to_others() {
        let (replies_tx, _replies_rx) = mpsc::unbounded();
        let channel = RpcChannel::new(replies_tx);

        // Nothing routes to this address, so the connect hangs until the
        // kernel gives up (or fails right away without a route).
        let silent = AcceptorAddr(SocketAddr::from(([10, 255, 255, 1], 9)));
        let pending = tokio::spawn({
            let channel = channel.clone();
            async move { channel.get_or_init_client(silent).await.is_ok() }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live = AcceptorAddr(listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut streams = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                streams.push(stream);
            }
        });

        tokio::time::timeout(Duration::from_secs(2), channel.get_or_init_client(live))
            .await
            .expect("connecting to a live acceptor waited on a silent one")
            .unwrap();

        let clients = tokio::time::timeout(Duration::from_secs(1), channel.clients.lock())
            .await
            .expect("client cache locked across a connect");
        assert!(clients.contains_key(&live));
        drop(clients);

        pending.abort();
    }
}
