//! SmellyCoin node entry point: parses CLI flags and an optional config
//! file, wires up the shared node state, and starts the peer listener, the
//! RPC server, and (if enabled) the mining loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use serde::Deserialize;
use smellycoin_core::NodeState;
use smellycoin_network::{NetworkConfig, NetworkService};
use smellycoin_rpc::{RpcConfig, RpcContext, RpcServer};
use smellycoin_storage::KeyStore;
use tokio::sync::Mutex;

#[derive(Parser)]
#[clap(name = "smellycoin", about = "A minimal peer-to-peer cryptocurrency node")]
struct Cli {
    /// Optional TOML config file; CLI flags below override its values.
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen for peer connections on.
    #[clap(long)]
    listen: Option<SocketAddr>,

    /// Address to bind the administrative HTTP API on.
    #[clap(long)]
    rpc_bind: Option<SocketAddr>,

    /// A seed peer to dial on startup; may be repeated.
    #[clap(long = "peer")]
    peers: Vec<SocketAddr>,

    /// Path to the node's private key file, created on first run if absent.
    #[clap(long)]
    key_file: Option<PathBuf>,

    /// Start the mining loop immediately.
    #[clap(long)]
    mine: bool,

    /// Increase log verbosity (repeatable).
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease log verbosity (repeatable).
    #[clap(short = 'q', long, action = clap::ArgAction::Count)]
    quiet: u8,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    listen: Option<SocketAddr>,
    rpc_bind: Option<SocketAddr>,
    peers: Option<Vec<SocketAddr>>,
    key_file: Option<PathBuf>,
    mine: Option<bool>,
}

struct NodeConfig {
    listen: SocketAddr,
    rpc_bind: SocketAddr,
    peers: Vec<SocketAddr>,
    key_file: PathBuf,
    mine: bool,
}

impl NodeConfig {
    fn resolve(cli: &Cli, file: FileConfig) -> Self {
        NodeConfig {
            listen: cli.listen.or(file.listen).unwrap_or_else(|| "0.0.0.0:6001".parse().unwrap()),
            rpc_bind: cli.rpc_bind.or(file.rpc_bind).unwrap_or_else(|| "127.0.0.1:3001".parse().unwrap()),
            peers: if !cli.peers.is_empty() { cli.peers.clone() } else { file.peers.unwrap_or_default() },
            key_file: cli.key_file.clone().or(file.key_file).unwrap_or_else(|| PathBuf::from("private_key")),
            mine: cli.mine || file.mine.unwrap_or(false),
        }
    }
}

fn load_file_config(path: Option<&PathBuf>) -> FileConfig {
    let Some(path) = path else { return FileConfig::default() };
    let built = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()).required(false))
        .build();

    match built.and_then(|c| c.try_deserialize()) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!("failed to load config file {}: {}", path.display(), e);
            FileConfig::default()
        }
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match verbose as i16 - quiet as i16 {
        i16::MIN..=-1 => log::LevelFilter::Error,
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let file_config = load_file_config(cli.config.as_ref());
    let config = NodeConfig::resolve(&cli, file_config);

    info!("starting SmellyCoin node");

    let key_store = KeyStore::new(config.key_file.clone());
    let private_key = match key_store.load_or_create() {
        Ok(key) => key,
        Err(e) => {
            error!("failed to load or create private key: {}", e);
            std::process::exit(1);
        }
    };
    let my_address = match smellycoin_crypto::public_key_from_private(&private_key) {
        Ok(address) => address,
        Err(e) => {
            error!("failed to derive address from private key: {}", e);
            std::process::exit(1);
        }
    };
    info!("node address: {}", my_address);

    let state = Arc::new(Mutex::new(NodeState::new()));

    let network_config = NetworkConfig {
        listen_addr: config.listen,
        seed_peers: config.peers,
    };
    let network = NetworkService::new(network_config, state.clone());
    let peers = network.peers();

    let rpc_context = RpcContext {
        state: state.clone(),
        peers: peers.clone(),
        my_address: my_address.clone(),
        private_key: private_key.clone(),
    };
    let rpc_server = RpcServer::new(RpcConfig { bind_addr: config.rpc_bind }, rpc_context);

    network.connect_to_seeds().await;

    let network_task = tokio::spawn(async move {
        if let Err(e) = network.run().await {
            error!("network service exited: {}", e);
        }
    });

    let rpc_task = tokio::spawn(async move {
        if let Err(e) = rpc_server.start().await {
            error!("RPC server exited: {}", e);
        }
    });

    let mining_task = if config.mine {
        let mining_service = Arc::new(smellycoin_mining::MiningService::new(state.clone(), my_address.clone()));
        let peers_for_mining = peers.clone();
        Some(mining_service.spawn(move |_block| {
            let peers = peers_for_mining.clone();
            async move {
                peers.broadcast_latest().await;
            }
        }))
    } else {
        None
    };

    info!("SmellyCoin node started");

    if let Some(mining_task) = mining_task {
        let _ = tokio::join!(network_task, rpc_task, mining_task);
    } else {
        let _ = tokio::join!(network_task, rpc_task);
    }
}
