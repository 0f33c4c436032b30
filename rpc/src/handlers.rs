//! Route handlers for every external interface operation (§6).

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde::Deserialize;
use serde_json::json;
use smellycoin_core::Transaction;
use smellycoin_wallet::{balance_of, build_transaction};

use crate::RpcContext;

pub fn router(context: RpcContext) -> Router {
    Router::new()
        .route("/blocks", get(get_blocks))
        .route("/block/:hash", get(get_block))
        .route("/transaction/:id", get(get_transaction))
        .route("/address/:address", get(get_address_utxos))
        .route("/unspentTransactionOutputs", get(get_unspent_outputs))
        .route("/myUnspentTransactionOutputs", get(get_my_unspent_outputs))
        .route("/mineRawBlock", post(mine_raw_block))
        .route("/mineBlock", post(mine_block))
        .route("/balance", get(get_balance))
        .route("/address", get(get_my_address))
        .route("/mineTransactions", post(mine_transactions))
        .route("/sendTransaction", post(send_transaction))
        .route("/transactionPool", get(get_transaction_pool))
        .route("/peers", get(get_peers))
        .route("/addPeer", post(add_peer))
        .layer(Extension(context))
}

async fn get_blocks(Extension(ctx): Extension<RpcContext>) -> impl IntoResponse {
    let state = ctx.state.lock().await;
    Json(state.chain().to_vec())
}

async fn get_block(Extension(ctx): Extension<RpcContext>, Path(hash): Path<String>) -> Response {
    let state = ctx.state.lock().await;
    match state.chain().iter().find(|b| b.hash == hash) {
        Some(block) => Json(block.clone()).into_response(),
        None => Json(json!({ "block": "Not found" })).into_response(),
    }
}

async fn get_transaction(Extension(ctx): Extension<RpcContext>, Path(id): Path<String>) -> Response {
    let state = ctx.state.lock().await;
    let found = state
        .chain()
        .iter()
        .flat_map(|b| b.data.iter())
        .find(|tx| tx.id == id)
        .cloned();
    match found {
        Some(tx) => Json(tx).into_response(),
        None => Json(json!({ "transaction": "Not found" })).into_response(),
    }
}

async fn get_address_utxos(Extension(ctx): Extension<RpcContext>, Path(address): Path<String>) -> impl IntoResponse {
    let state = ctx.state.lock().await;
    let utxos: Vec<_> = state.utxo_set().for_address(&address).cloned().collect();
    Json(json!({ "unspentTxOuts": utxos }))
}

async fn get_unspent_outputs(Extension(ctx): Extension<RpcContext>) -> impl IntoResponse {
    let state = ctx.state.lock().await;
    let utxos: Vec<_> = state.utxo_set().iter().cloned().collect();
    Json(utxos)
}

async fn get_my_unspent_outputs(Extension(ctx): Extension<RpcContext>) -> impl IntoResponse {
    let state = ctx.state.lock().await;
    let utxos: Vec<_> = state.utxo_set().for_address(&ctx.my_address).cloned().collect();
    Json(utxos)
}

#[derive(Debug, Deserialize)]
struct RawBlockRequest {
    transactions: Vec<Transaction>,
}

/// Mines a block over exactly the caller-supplied transaction list — no
/// coinbase is injected, unlike `/mineBlock` and `/mineTransactions`.
async fn mine_raw_block(
    Extension(ctx): Extension<RpcContext>,
    Json(request): Json<RawBlockRequest>,
) -> Response {
    let template = {
        let state = ctx.state.lock().await;
        let latest = state.latest_block();
        (latest.index + 1, latest.hash.clone(), smellycoin_core::current_timestamp(), state.next_difficulty())
    };
    let (index, prev_hash, timestamp, difficulty) = template;
    let block = smellycoin_core::block::find_block(index, &prev_hash, timestamp, request.transactions, difficulty);

    let accepted = {
        let mut state = ctx.state.lock().await;
        state.append(block.clone())
    };

    if accepted {
        ctx.peers.broadcast_latest().await;
        (StatusCode::OK, Json(block)).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": "could not generate block" }))).into_response()
    }
}

async fn mine_block(Extension(ctx): Extension<RpcContext>) -> Response {
    let template = {
        let state = ctx.state.lock().await;
        state.mining_template(&ctx.my_address)
    };
    let (index, prev_hash, timestamp, data, difficulty) = template;
    let block = smellycoin_core::block::find_block(index, &prev_hash, timestamp, data, difficulty);

    let accepted = {
        let mut state = ctx.state.lock().await;
        state.append(block.clone())
    };

    if accepted {
        ctx.peers.broadcast_latest().await;
        (StatusCode::OK, Json(block)).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": "could not generate block" }))).into_response()
    }
}

async fn get_balance(Extension(ctx): Extension<RpcContext>) -> impl IntoResponse {
    let state = ctx.state.lock().await;
    let balance = balance_of(&ctx.my_address, state.utxo_set());
    Json(json!({ "balance": balance }))
}

async fn get_my_address(Extension(ctx): Extension<RpcContext>) -> impl IntoResponse {
    Json(json!({ "address": ctx.my_address }))
}

#[derive(Debug, Deserialize)]
struct TransactionRequest {
    address: String,
    amount: u64,
}

async fn mine_transactions(
    Extension(ctx): Extension<RpcContext>,
    Json(request): Json<TransactionRequest>,
) -> Response {
    let build_result = {
        let state = ctx.state.lock().await;
        build_transaction(
            &request.address,
            request.amount,
            &ctx.private_key,
            state.utxo_set(),
            &state.mempool().snapshot(),
        )
    };

    let tx = match build_result {
        Ok(tx) => tx,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    };

    let template = {
        let mut state = ctx.state.lock().await;
        if let Err(e) = state.add_to_mempool(tx) {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
        }
        state.mining_template(&ctx.my_address)
    };
    let (index, prev_hash, timestamp, data, difficulty) = template;
    let block = smellycoin_core::block::find_block(index, &prev_hash, timestamp, data, difficulty);

    let accepted = {
        let mut state = ctx.state.lock().await;
        state.append(block.clone())
    };

    if accepted {
        ctx.peers.broadcast_latest().await;
        (StatusCode::OK, Json(block)).into_response()
    } else {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": "could not generate block" }))).into_response()
    }
}

async fn send_transaction(
    Extension(ctx): Extension<RpcContext>,
    Json(request): Json<TransactionRequest>,
) -> Response {
    let build_result = {
        let state = ctx.state.lock().await;
        build_transaction(
            &request.address,
            request.amount,
            &ctx.private_key,
            state.utxo_set(),
            &state.mempool().snapshot(),
        )
    };

    let tx = match build_result {
        Ok(tx) => tx,
        Err(e) => {
            warn!("sendTransaction failed to build: {}", e);
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
        }
    };

    let added = {
        let mut state = ctx.state.lock().await;
        state.add_to_mempool(tx.clone())
    };

    match added {
        Ok(()) => {
            info!("accepted transaction {} into the mempool", tx.id);
            ctx.peers.broadcast_transaction_pool().await;
            (StatusCode::OK, Json(tx)).into_response()
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn get_transaction_pool(Extension(ctx): Extension<RpcContext>) -> impl IntoResponse {
    let state = ctx.state.lock().await;
    Json(state.mempool().snapshot())
}

async fn get_peers(Extension(ctx): Extension<RpcContext>) -> impl IntoResponse {
    let count = ctx.peers.peer_count().await;
    Json(json!({ "peerCount": count }))
}

#[derive(Debug, Deserialize)]
struct PeerRequest {
    url: String,
}

async fn add_peer(Extension(ctx): Extension<RpcContext>, Json(request): Json<PeerRequest>) -> Response {
    match request.url.parse() {
        Ok(addr) => {
            let peers = ctx.peers.clone();
            tokio::spawn(async move {
                if let Err(e) = peers.connect(addr).await {
                    warn!("addPeer failed to connect to {}: {}", addr, e);
                }
            });
            (StatusCode::OK, Json(json!({ "data": "Success" }))).into_response()
        }
        Err(_) => (StatusCode::BAD_REQUEST, Json(json!({ "error": "invalid peer address" }))).into_response(),
    }
}

