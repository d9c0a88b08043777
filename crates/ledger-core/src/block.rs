use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::merkle::merkle_root_hex;
use crate::pow::meets_difficulty;

/// One sealed unit of the ledger.
///
/// `current_hash` commits to every other field, see [`content_hash`]. Blocks
/// are plain data: anything received from a peer must be checked with
/// [`Block::has_valid_hash`] before it is trusted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub transactions: Vec<String>,
    pub nonce: u64,
    /// Empty for the first block of a chain.
    pub previous_hash: String,
    pub merkle_root: String,
    pub current_hash: String,
}

impl Block {
    /// Build the Merkle root and content hash for the given fields.
    pub fn seal(transactions: Vec<String>, nonce: u64, previous_hash: impl Into<String>) -> Self {
        let mut block = Self {
            transactions,
            nonce,
            previous_hash: previous_hash.into(),
            merkle_root: String::new(),
            current_hash: String::new(),
        };
        block.reseal();
        block
    }

    /// Content hash over the block's current fields. Sealing and verification
    /// both go through here.
    pub fn calculate_hash(&self) -> String {
        content_hash(
            &self.transactions,
            self.nonce,
            &self.previous_hash,
            &self.merkle_root,
        )
    }

    pub fn calculate_merkle_root(&self) -> String {
        merkle_root_hex(&self.transactions)
    }

    pub fn has_valid_hash(&self) -> bool {
        self.current_hash == self.calculate_hash()
    }

    pub fn has_valid_merkle_root(&self) -> bool {
        self.merkle_root == self.calculate_merkle_root()
    }

    pub fn meets_difficulty(&self, difficulty: usize) -> bool {
        meets_difficulty(&self.current_hash, difficulty)
    }

    /// Recompute the Merkle root and then the content hash in place.
    pub(crate) fn reseal(&mut self) {
        self.merkle_root = self.calculate_merkle_root();
        self.current_hash = self.calculate_hash();
    }
}

/// SHA-256 over `concat(transactions) || decimal(nonce) || previous_hash ||
/// merkle_root`, rendered as lowercase hex. Nothing separates the parts.
pub fn content_hash<T: AsRef<str>>(
    transactions: &[T],
    nonce: u64,
    previous_hash: &str,
    merkle_root: &str,
) -> String {
    let mut hasher = Sha256::new();
    for tx in transactions {
        hasher.update(tx.as_ref().as_bytes());
    }
    hasher.update(nonce.to_string().as_bytes());
    hasher.update(previous_hash.as_bytes());
    hasher.update(merkle_root.as_bytes());
    hex::encode(hasher.finalize())
}
