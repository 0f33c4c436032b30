//! Networking for SmellyCoin: peer links and the gossip protocol (C7).
//!
//! A node listens on one TCP address and dials a list of seed peers; every
//! link, inbound or outbound, runs the same gossip state machine over
//! newline-delimited JSON.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};
use smellycoin_core::NodeState;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub mod message;
pub mod peer;

pub use message::{MessageError, MessageType, PeerMessage};
pub use peer::{PeerError, PeerHandle, PeerManager};

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer error: {0}")]
    Peer(#[from] PeerError),
}

/// Everything a node needs to join the gossip network: where to listen, and
/// who to dial on startup.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub listen_addr: SocketAddr,
    pub seed_peers: Vec<SocketAddr>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            listen_addr: "0.0.0.0:6001".parse().expect("valid default listen address"),
            seed_peers: Vec::new(),
        }
    }
}

/// Owns the listener and the shared [`PeerManager`]. `start` never returns
/// while the listener is healthy; each accepted connection is handed off to
/// its own link task.
pub struct NetworkService {
    config: NetworkConfig,
    peers: Arc<PeerManager>,
}

impl NetworkService {
    pub fn new(config: NetworkConfig, state: Arc<Mutex<NodeState>>) -> Self {
        NetworkService {
            config,
            peers: Arc::new(PeerManager::new(state)),
        }
    }

    pub fn peers(&self) -> Arc<PeerManager> {
        self.peers.clone()
    }

    /// Dial every configured seed peer; a failed dial is logged and
    /// otherwise ignored, since peers come and go.
    pub async fn connect_to_seeds(&self) {
        for addr in &self.config.seed_peers {
            if let Err(e) = self.peers.connect(*addr).await {
                warn!("failed to connect to seed peer {}: {}", addr, e);
            }
        }
    }

    /// Bind the listener and accept connections until the socket errors.
    pub async fn run(&self) -> Result<(), NetworkError> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        info!("listening for peers on {}", self.config.listen_addr);

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("accepted connection from {}", addr);
                    self.peers.accept(stream, addr).await;
                }
                Err(e) => {
                    error!("listener error: {}", e);
                    return Err(NetworkError::Io(e));
                }
            }
        }
    }
}
