use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use futures::channel::mpsc;
use tracing::info;

use grid_paxos::{
    rpc::RpcChannel, AcceptorAddr, Consensus, NodeDirectory, ProposerConfig, ReplyTo,
    RetryBallot, ServiceId, SessionRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "grid-proposer")]
#[command(about = "Propose a node as the owner of a grid service slot")]
struct Args {
    /// Service type whose slot is being assigned.
    #[arg(short, long)]
    service_type: String,

    #[arg(long)]
    control_uri: String,

    #[arg(long)]
    data_uri: String,

    /// Acceptor control address. Repeat for each acceptor.
    #[arg(short, long = "acceptor", required = true)]
    acceptors: Vec<SocketAddr>,

    /// Address acceptors should reply to.
    #[arg(short, long, default_value = "127.0.0.1:0")]
    reply_to: SocketAddr,

    #[arg(long, value_enum, default_value_t = RetryBallot::ObservedMax)]
    retry_ballot: RetryBallot,

    /// Give up on the proposal after this many milliseconds.
    #[arg(short, long, default_value_t = 30_000)]
    deadline_ms: u64,
}

struct LogCompletion;

impl grid_paxos::CompletionHook for LogCompletion {
    fn on_completed(&self, consensus: &Consensus) {
        info!(
            correlation_id = %consensus.correlation_id,
            ballot = %consensus.ballot_id,
            acceptors = consensus.acceptors.len(),
            "consensus reached"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let service_id = ServiceId::for_service_type(&args.service_type);
    let directory = Arc::new(NodeDirectory::new());
    for acceptor in &args.acceptors {
        directory.activate(service_id, AcceptorAddr(*acceptor));
    }

    let (replies_tx, replies_rx) = mpsc::unbounded();
    let config = ProposerConfig::new(ReplyTo(args.reply_to)).with_retry_ballot(args.retry_ballot);

    let registry = Arc::new(SessionRegistry::new(
        config,
        directory,
        Arc::new(RpcChannel::new(replies_tx)),
        Arc::new(LogCompletion),
    ));

    let dispatcher = tokio::spawn({
        let registry = Arc::clone(&registry);
        async move { registry.dispatch(replies_rx).await }
    });

    let correlation_id = registry
        .start_proposal(&args.service_type, args.control_uri, args.data_uri)
        .await
        .context("starting proposal")?;

    let consensus = registry
        .await_completion(correlation_id, Duration::from_millis(args.deadline_ms))
        .await
        .context("waiting for consensus")?;

    info!(
        %correlation_id,
        ballot = %consensus.ballot_id,
        control_uri = %consensus.value.control_uri,
        data_uri = %consensus.value.data_uri,
        "grid service assigned"
    );

    dispatcher.abort();

    Ok(())
}
