//! The administrative HTTP surface for SmellyCoin.
//!
//! A plain REST API, one route per external interface operation (§6), built
//! on `axum` the way the rest of the workspace already depends on it —
//! there is no JSON-RPC envelope here, since the source system this spec
//! distills from exposes a route-per-operation REST API rather than a
//! JSON-RPC method table.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use log::info;
use smellycoin_core::NodeState;
use smellycoin_network::PeerManager;
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

pub mod handlers;

pub use handlers::*;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Shared handle every route needs: the node's state, its peer manager (for
/// `/peers` and `/addPeer`), the node's own mining/wallet address, and its
/// private key for signing outgoing transactions.
#[derive(Clone)]
pub struct RpcContext {
    pub state: Arc<Mutex<NodeState>>,
    pub peers: Arc<PeerManager>,
    pub my_address: String,
    pub private_key: String,
}

#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub bind_addr: SocketAddr,
}

impl Default for RpcConfig {
    fn default() -> Self {
        RpcConfig {
            bind_addr: "127.0.0.1:3001".parse().expect("valid default RPC bind address"),
        }
    }
}

pub struct RpcServer {
    config: RpcConfig,
    context: RpcContext,
}

impl RpcServer {
    pub fn new(config: RpcConfig, context: RpcContext) -> Self {
        RpcServer { config, context }
    }

    pub fn router(&self) -> Router {
        handlers::router(self.context.clone()).layer(CorsLayer::permissive())
    }

    pub async fn start(&self) -> Result<(), RpcError> {
        info!("starting RPC server on {}", self.config.bind_addr);
        axum::Server::bind(&self.config.bind_addr)
            .serve(self.router().into_make_service())
            .await
            .map_err(|e| RpcError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        Ok(())
    }
}
