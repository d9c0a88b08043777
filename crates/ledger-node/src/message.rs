use ledger_core::Block;
use serde::{Deserialize, Serialize};

use crate::error::NodeError;

/// Wire message, one per connection, encoded as
/// `{"type": "NewBlock" | "NewTransaction", "payload": ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    NewBlock(Block),
    NewTransaction(String),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::NewBlock(_) => "NewBlock",
            Message::NewTransaction(_) => "NewTransaction",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, NodeError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
