use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::block::Block;
use crate::constants::{HASH_HEX_SIZE, NONCE_WINDOW};
use crate::error::LedgerError;
use crate::merkle::merkle_root_hex;

/// Shared stop signal for a running nonce search.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// True if the hex hash starts with `difficulty` ASCII `'0'` characters.
pub fn meets_difficulty(hash_hex: &str, difficulty: usize) -> bool {
    leading_zero_chars(hash_hex) >= difficulty
}

pub fn leading_zero_chars(hash_hex: &str) -> usize {
    hash_hex.bytes().take_while(|b| *b == b'0').count()
}

/// Same test as [`meets_difficulty`], applied to raw digest bytes so the
/// search loop can skip hex encoding.
fn digest_meets_difficulty(digest: &[u8], difficulty: usize) -> bool {
    if difficulty > HASH_HEX_SIZE {
        return false;
    }
    let full = difficulty / 2;
    if digest[..full].iter().any(|b| *b != 0) {
        return false;
    }
    difficulty % 2 == 0 || digest[full] >> 4 == 0
}

/// Everything needed to search for a nonce, captured from the ledger so the
/// search itself can run without holding it.
#[derive(Clone, Debug)]
pub struct MiningJob {
    transactions: Vec<String>,
    previous_hash: String,
    merkle_root: String,
    difficulty: usize,
    height: usize,
}

impl MiningJob {
    pub fn new(
        transactions: Vec<String>,
        previous_hash: impl Into<String>,
        difficulty: usize,
        height: usize,
    ) -> Self {
        let merkle_root = merkle_root_hex(&transactions);
        Self {
            transactions,
            previous_hash: previous_hash.into(),
            merkle_root,
            difficulty,
            height,
        }
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Chain length the job was prepared against.
    pub fn height(&self) -> usize {
        self.height
    }

    fn prefix_state(&self) -> Sha256 {
        let mut hasher = Sha256::new();
        for tx in &self.transactions {
            hasher.update(tx.as_bytes());
        }
        hasher
    }

    fn satisfies(&self, prefix: &Sha256, nonce: u64) -> bool {
        let mut hasher = prefix.clone();
        hasher.update(nonce.to_string().as_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hasher.update(self.merkle_root.as_bytes());
        digest_meets_difficulty(&hasher.finalize(), self.difficulty)
    }

    /// Search nonces upward from 0 and seal the block with the first one
    /// whose hash meets the difficulty.
    ///
    /// Windows of [`NONCE_WINDOW`] nonces are scanned in parallel with
    /// `find_first`, so the result is always the smallest satisfying nonce
    /// and matches a sequential scan exactly. `cancel` is polled between
    /// windows.
    pub fn run(self, cancel: &CancelFlag) -> Result<Block, LedgerError> {
        let prefix = self.prefix_state();
        let mut start = 0u64;
        loop {
            if cancel.is_cancelled() {
                debug!(height = self.height, attempts = start, "mining cancelled");
                return Err(LedgerError::MiningCancelled { attempts: start });
            }
            let end = start.saturating_add(NONCE_WINDOW);
            let found = (start..end)
                .into_par_iter()
                .find_first(|nonce| self.satisfies(&prefix, *nonce));

            if let Some(nonce) = found {
                let block = Block::seal(self.transactions, nonce, self.previous_hash);
                info!(
                    "Mined block {} with nonce {} and hash {}",
                    self.height, nonce, block.current_hash
                );
                return Ok(block);
            }
            if end == u64::MAX {
                return Err(LedgerError::NonceSpaceExhausted {
                    difficulty: self.difficulty,
                });
            }
            start = end;
        }
    }
}
