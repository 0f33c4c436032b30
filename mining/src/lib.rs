//! The mining loop: repeatedly search for a valid nonce against a snapshot
//! of the current chain tip and mempool, never holding the state lock while
//! searching (§5).

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use smellycoin_core::{block::find_block, Block, NodeState};
use smellycoin_util::format_timestamp;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum MiningError {
    #[error("mining task panicked: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

/// Runs the find-block loop on a blocking thread pool and notifies peers of
/// accepted blocks through `on_block`.
pub struct MiningService {
    state: Arc<Mutex<NodeState>>,
    miner_address: String,
    stop: Arc<Notify>,
}

impl MiningService {
    pub fn new(state: Arc<Mutex<NodeState>>, miner_address: String) -> Self {
        MiningService {
            state,
            miner_address,
            stop: Arc::new(Notify::new()),
        }
    }

    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop.clone()
    }

    /// Run until `stop_handle().notify_one()` is called. On each iteration:
    /// snapshot the template under the lock, mine off the async runtime via
    /// `spawn_blocking`, then re-acquire the lock only to attempt `append`.
    pub async fn run<F, Fut>(&self, mut on_block: F) -> Result<(), MiningError>
    where
        F: FnMut(Block) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        loop {
            let template = {
                let state = self.state.lock().await;
                state.mining_template(&self.miner_address)
            };
            let (index, prev_hash, timestamp, data, difficulty) = template;

            let mining = tokio::task::spawn_blocking(move || {
                find_block(index, &prev_hash, timestamp, data, difficulty)
            });

            tokio::select! {
                result = mining => {
                    let block = result?;
                    let accepted = {
                        let mut state = self.state.lock().await;
                        state.append(block.clone())
                    };
                    if accepted {
                        info!(
                            "mined block {} at difficulty {} ({})",
                            block.index,
                            block.difficulty,
                            format_timestamp(block.timestamp as i64)
                        );
                        on_block(block).await;
                    } else {
                        info!("mined block {} was superseded before it could be appended", block.index);
                    }
                }
                _ = self.stop.notified() => {
                    info!("mining service stopping");
                    return Ok(());
                }
            }
        }
    }

    pub fn spawn<F, Fut>(self: Arc<Self>, on_block: F) -> JoinHandle<()>
    where
        F: FnMut(Block) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        tokio::spawn(async move {
            if let Err(e) = self.run(on_block).await {
                error!("mining service exited: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn mines_and_appends_one_block_then_stops() {
        let state = Arc::new(Mutex::new(NodeState::new()));
        let miner = format!("04{}", "2".repeat(128));
        let service = Arc::new(MiningService::new(state.clone(), miner));
        let stop = service.stop_handle();

        let found = Arc::new(AtomicUsize::new(0));
        let found_clone = found.clone();
        let stop_clone = stop.clone();

        let handle = service.spawn(move |_block| {
            found_clone.fetch_add(1, Ordering::SeqCst);
            stop_clone.notify_one();
            async {}
        });

        tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .expect("mining should finish quickly at low genesis difficulty")
            .unwrap();

        assert_eq!(found.load(Ordering::SeqCst), 1);
        assert_eq!(state.lock().await.chain().len(), 2);
    }
}
