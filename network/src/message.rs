//! The five-message peer gossip envelope (C7).

use std::convert::TryFrom;
use std::fmt;

use serde::{Deserialize, Serialize};
use smellycoin_core::{Block, Transaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unknown message type: {0}")]
    UnknownType(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MessageType {
    QueryLatest = 0,
    QueryAll = 1,
    ResponseBlockchain = 2,
    QueryTransactionPool = 3,
    ResponseTransactionPool = 4,
}

impl TryFrom<u32> for MessageType {
    type Error = MessageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::QueryLatest),
            1 => Ok(MessageType::QueryAll),
            2 => Ok(MessageType::ResponseBlockchain),
            3 => Ok(MessageType::QueryTransactionPool),
            4 => Ok(MessageType::ResponseTransactionPool),
            other => Err(MessageError::UnknownType(other)),
        }
    }
}

impl Serialize for MessageType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(*self as u32)
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = u32::deserialize(deserializer)?;
        MessageType::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::QueryLatest => "QUERY_LATEST",
            MessageType::QueryAll => "QUERY_ALL",
            MessageType::ResponseBlockchain => "RESPONSE_BLOCKCHAIN",
            MessageType::QueryTransactionPool => "QUERY_TRANSACTION_POOL",
            MessageType::ResponseTransactionPool => "RESPONSE_TRANSACTION_POOL",
        };
        write!(f, "{}", name)
    }
}

/// The wire envelope: `{"type": <int>, "data": <string>}`. `data` is itself
/// a JSON-encoded string (double-encoding), per the wire contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerMessage {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    pub data: String,
}

impl PeerMessage {
    pub fn query_latest() -> Self {
        PeerMessage {
            msg_type: MessageType::QueryLatest,
            data: String::new(),
        }
    }

    pub fn query_all() -> Self {
        PeerMessage {
            msg_type: MessageType::QueryAll,
            data: String::new(),
        }
    }

    pub fn query_transaction_pool() -> Self {
        PeerMessage {
            msg_type: MessageType::QueryTransactionPool,
            data: String::new(),
        }
    }

    pub fn response_latest(tip: &Block) -> Result<Self, MessageError> {
        let data = serde_json::to_string(std::slice::from_ref(tip))?;
        Ok(PeerMessage {
            msg_type: MessageType::ResponseBlockchain,
            data,
        })
    }

    pub fn response_blockchain(chain: &[Block]) -> Result<Self, MessageError> {
        let data = serde_json::to_string(chain)?;
        Ok(PeerMessage {
            msg_type: MessageType::ResponseBlockchain,
            data,
        })
    }

    pub fn response_transaction_pool(pool: &[Transaction]) -> Result<Self, MessageError> {
        let data = serde_json::to_string(pool)?;
        Ok(PeerMessage {
            msg_type: MessageType::ResponseTransactionPool,
            data,
        })
    }

    pub fn blocks(&self) -> Result<Vec<Block>, MessageError> {
        Ok(serde_json::from_str(&self.data)?)
    }

    pub fn transactions(&self) -> Result<Vec<Transaction>, MessageError> {
        Ok(serde_json::from_str(&self.data)?)
    }

    pub fn to_line(&self) -> Result<String, MessageError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_line(line: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(line)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smellycoin_core::Block;

    #[test]
    fn round_trips_query_latest_over_the_wire() {
        let msg = PeerMessage::query_latest();
        let line = msg.to_line().unwrap();
        let back = PeerMessage::from_line(&line).unwrap();
        assert_eq!(back.msg_type, MessageType::QueryLatest);
        assert_eq!(back.data, "");
    }

    #[test]
    fn response_latest_wraps_single_block() {
        let genesis = Block::genesis();
        let msg = PeerMessage::response_latest(&genesis).unwrap();
        let blocks = msg.blocks().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].hash, genesis.hash);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        assert!(matches!(MessageType::try_from(99), Err(MessageError::UnknownType(99))));
    }
}
