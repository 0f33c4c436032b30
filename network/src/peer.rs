//! Peer links, the gossip state machine, and broadcast (C7).
//!
//! Each link is one reader task over a newline-delimited JSON duplex
//! connection, sharing the single `NodeState` behind a `tokio::sync::Mutex`
//! with every other link and the mining task (§5).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use smellycoin_core::NodeState;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::message::{MessageError, MessageType, PeerMessage};

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message protocol error: {0}")]
    Protocol(#[from] MessageError),

    #[error("no peers connected")]
    NoPeers,
}

/// The delay between sending `QUERY_LATEST` and `QUERY_TRANSACTION_POOL` on
/// link establishment, giving the peer time to answer the first query.
pub const TRANSACTION_POOL_QUERY_DELAY: Duration = Duration::from_millis(500);

/// A handle for sending framed messages out to one connected peer.
#[derive(Clone)]
pub struct PeerHandle {
    pub addr: SocketAddr,
    sender: mpsc::UnboundedSender<PeerMessage>,
}

impl PeerHandle {
    pub fn send(&self, message: PeerMessage) {
        // The receiver only disappears once the link's writer task has
        // exited, at which point the peer is already being removed.
        let _ = self.sender.send(message);
    }
}

/// Peers are held as a list without deduplication, per the connection
/// lifecycle design.
pub struct PeerManager {
    state: Arc<Mutex<NodeState>>,
    peers: RwLock<Vec<PeerHandle>>,
}

impl PeerManager {
    pub fn new(state: Arc<Mutex<NodeState>>) -> Self {
        PeerManager {
            state,
            peers: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> Arc<Mutex<NodeState>> {
        self.state.clone()
    }

    pub async fn peer_count(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn broadcast(&self, message: PeerMessage) {
        for peer in self.peers.read().await.iter() {
            peer.send(message.clone());
        }
    }

    async fn register(&self, handle: PeerHandle) {
        self.peers.write().await.push(handle);
    }

    async fn remove(&self, addr: SocketAddr) {
        self.peers.write().await.retain(|p| p.addr != addr);
    }

    /// Dial `addr` and run the same per-link state machine an inbound
    /// connection would run.
    pub async fn connect(self: &Arc<Self>, addr: SocketAddr) -> Result<(), PeerError> {
        let stream = TcpStream::connect(addr).await?;
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.run_link(stream, addr).await {
                warn!("peer link {} ended: {}", addr, e);
            }
        });
        Ok(())
    }

    /// Adopt an inbound connection accepted by the listener.
    pub async fn accept(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.run_link(stream, addr).await {
                warn!("peer link {} ended: {}", addr, e);
            }
        });
    }

    async fn run_link(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<(), PeerError> {
        let (read_half, write_half) = tokio::io::split(stream);
        self.run_link_halves(read_half, write_half, addr).await
    }

    async fn run_link_halves<R, W>(
        self: &Arc<Self>,
        read_half: R,
        write_half: W,
        addr: SocketAddr,
    ) -> Result<(), PeerError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut reader = FramedRead::new(read_half, LinesCodec::new());
        let mut writer = FramedWrite::new(write_half, LinesCodec::new());

        let (tx, mut rx) = mpsc::unbounded_channel::<PeerMessage>();
        self.register(PeerHandle { addr, sender: tx.clone() }).await;

        let writer_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match message.to_line() {
                    Ok(line) => {
                        if writer.send(line).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!("failed to encode outgoing message: {}", e),
                }
            }
        });

        // Handshake: query the peer's tip now, its mempool 500ms later.
        let _ = tx.send(PeerMessage::query_latest());
        {
            let tx = tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(TRANSACTION_POOL_QUERY_DELAY).await;
                let _ = tx.send(PeerMessage::query_transaction_pool());
            });
        }

        let result = loop {
            match reader.next().await {
                Some(Ok(line)) => {
                    let message = match PeerMessage::from_line(&line) {
                        Ok(m) => m,
                        Err(e) => {
                            debug!("dropping malformed message from {}: {}", addr, e);
                            continue;
                        }
                    };
                    self.handle_message(message, &tx).await;
                }
                Some(Err(e)) => break Err(PeerError::Io(e.into())),
                None => break Ok(()),
            }
        };

        info!("connection closed: {}", addr);
        self.remove(addr).await;
        writer_task.abort();
        result
    }

    /// Implements the branching logic for each of the five message kinds.
    async fn handle_message(self: &Arc<Self>, message: PeerMessage, reply: &mpsc::UnboundedSender<PeerMessage>) {
        match message.msg_type {
            MessageType::QueryLatest => {
                let state = self.state.lock().await;
                match PeerMessage::response_latest(state.latest_block()) {
                    Ok(m) => {
                        let _ = reply.send(m);
                    }
                    Err(e) => error!("failed to build response_latest: {}", e),
                }
            }
            MessageType::QueryAll => {
                let state = self.state.lock().await;
                match PeerMessage::response_blockchain(state.chain()) {
                    Ok(m) => {
                        let _ = reply.send(m);
                    }
                    Err(e) => error!("failed to build response_blockchain: {}", e),
                }
            }
            MessageType::ResponseBlockchain => {
                let received = match message.blocks() {
                    Ok(b) => b,
                    Err(e) => {
                        debug!("invalid blocks in RESPONSE_BLOCKCHAIN: {}", e);
                        return;
                    }
                };
                self.handle_received_blockchain(received).await;
            }
            MessageType::QueryTransactionPool => {
                let state = self.state.lock().await;
                match PeerMessage::response_transaction_pool(&state.mempool().snapshot()) {
                    Ok(m) => {
                        let _ = reply.send(m);
                    }
                    Err(e) => error!("failed to build response_transaction_pool: {}", e),
                }
            }
            MessageType::ResponseTransactionPool => {
                let received = match message.transactions() {
                    Ok(t) => t,
                    Err(e) => {
                        debug!("invalid transactions in RESPONSE_TRANSACTION_POOL: {}", e);
                        return;
                    }
                };
                self.handle_received_transaction_pool(received).await;
            }
        }
    }

    /// `R` = received chain. Ignore if empty or not longer than ours;
    /// append the tip if it links directly; ask for the full chain if we
    /// only got the tip; otherwise attempt a full chain replacement.
    async fn handle_received_blockchain(self: &Arc<Self>, received: Vec<smellycoin_core::Block>) {
        let Some(latest_received) = received.last().cloned() else {
            debug!("received an empty blockchain");
            return;
        };

        let (accepted_tip, need_full_chain, replaced) = {
            let mut state = self.state.lock().await;
            if latest_received.index <= state.latest_block().index {
                (false, false, false)
            } else if state.latest_block().hash == latest_received.previous_hash {
                let ok = state.append(latest_received.clone());
                (ok, false, false)
            } else if received.len() == 1 {
                (false, true, false)
            } else {
                let ok = state.replace_chain(received);
                (false, false, ok)
            }
        };

        if accepted_tip {
            self.broadcast_latest().await;
        } else if need_full_chain {
            self.broadcast(PeerMessage::query_all()).await;
        } else if replaced {
            self.broadcast_latest().await;
        }
    }

    /// Admit each received transaction; broadcast the pool after every
    /// successful addition. Invalid adds are dropped silently — the peer
    /// may simply be ahead of us.
    async fn handle_received_transaction_pool(self: &Arc<Self>, received: Vec<smellycoin_core::Transaction>) {
        for tx in received {
            let added = {
                let mut state = self.state.lock().await;
                state.add_to_mempool(tx).is_ok()
            };
            if added {
                self.broadcast_transaction_pool().await;
            }
        }
    }

    pub async fn broadcast_latest(self: &Arc<Self>) {
        let message = {
            let state = self.state.lock().await;
            PeerMessage::response_latest(state.latest_block())
        };
        match message {
            Ok(m) => self.broadcast(m).await,
            Err(e) => error!("failed to build broadcast_latest: {}", e),
        }
    }

    pub async fn broadcast_transaction_pool(self: &Arc<Self>) {
        let message = {
            let state = self.state.lock().await;
            PeerMessage::response_transaction_pool(&state.mempool().snapshot())
        };
        match message {
            Ok(m) => self.broadcast(m).await,
            Err(e) => error!("failed to build broadcast_transaction_pool: {}", e),
        }
    }
}
