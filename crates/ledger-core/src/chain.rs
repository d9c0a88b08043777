use serde::Serialize;
use tracing::{info, warn};

use crate::block::Block;
use crate::config::LedgerConfig;
use crate::constants::DISPLAY_HASH_LEN;
use crate::error::{IntegrityError, LedgerError};
use crate::pow::{CancelFlag, MiningJob};

/// Display form of one block, as listed by [`Ledger::block_rows`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BlockRow {
    pub index: usize,
    pub transactions: String,
    pub nonce: u64,
    pub previous_hash: String,
    pub current_hash: String,
}

/// An ordered, append-only sequence of blocks plus the settings that govern
/// mining on top of it.
///
/// Nothing here is synchronised; callers sharing a ledger between tasks
/// wrap it in a lock.
#[derive(Clone, Debug, Default)]
pub struct Ledger {
    blocks: Vec<Block>,
    config: LedgerConfig,
}

impl Ledger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            blocks: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Hash the next block must link to; empty for an empty ledger.
    pub fn tip_hash(&self) -> &str {
        self.tip().map(|b| b.current_hash.as_str()).unwrap_or("")
    }

    pub fn min_transactions_per_block(&self) -> usize {
        self.config.min_transactions_per_block
    }

    pub fn set_min_transactions_per_block(&mut self, n: usize) -> Result<(), LedgerError> {
        if n == 0 {
            return Err(LedgerError::InvalidThreshold(n));
        }
        self.config.min_transactions_per_block = n;
        Ok(())
    }

    /// Difficulty the next mined block has to meet.
    pub fn current_difficulty(&self) -> usize {
        self.config.difficulty_at(self.len())
    }

    /// Check the transaction threshold and capture a search job for the
    /// next block. Nothing is modified.
    pub fn prepare_mining(
        &self,
        transactions: Vec<String>,
        previous_hash: &str,
    ) -> Result<MiningJob, LedgerError> {
        let required = self.min_transactions_per_block();
        if transactions.len() < required {
            warn!(
                got = transactions.len(),
                required, "not enough transactions to mine a new block"
            );
            return Err(LedgerError::NotEnoughTransactions {
                got: transactions.len(),
                required,
            });
        }
        Ok(MiningJob::new(
            transactions,
            previous_hash,
            self.current_difficulty(),
            self.len(),
        ))
    }

    /// Append a block mined from a job prepared against this ledger. Fails if
    /// other blocks were appended since the job was prepared.
    pub fn append_mined(&mut self, height: usize, block: Block) -> Result<usize, LedgerError> {
        if height != self.len() {
            return Err(LedgerError::StaleTip {
                expected: height,
                actual: self.len(),
            });
        }
        self.blocks.push(block);
        info!(height = self.len(), "block added");
        Ok(self.len() - 1)
    }

    /// Mine a block over `transactions` on top of `previous_hash` and append
    /// it. Blocks until a nonce is found.
    pub fn mine(
        &mut self,
        transactions: Vec<String>,
        previous_hash: &str,
    ) -> Result<Block, LedgerError> {
        self.mine_with_cancel(transactions, previous_hash, &CancelFlag::new())
    }

    pub fn mine_with_cancel(
        &mut self,
        transactions: Vec<String>,
        previous_hash: &str,
        cancel: &CancelFlag,
    ) -> Result<Block, LedgerError> {
        let job = self.prepare_mining(transactions, previous_hash)?;
        let height = job.height();
        let block = job.run(cancel)?;
        self.append_mined(height, block.clone())?;
        Ok(block)
    }

    /// Accept a block from a peer if its hash matches its content and it
    /// links to the local tip. Returns its index.
    pub fn accept_block(&mut self, block: Block) -> Result<usize, LedgerError> {
        let computed = block.calculate_hash();
        if block.current_hash != computed {
            return Err(LedgerError::HashMismatch {
                stored: block.current_hash,
                computed,
            });
        }
        if block.previous_hash != self.tip_hash() {
            return Err(LedgerError::TipMismatch {
                expected: self.tip_hash().to_string(),
                got: block.previous_hash,
            });
        }
        self.blocks.push(block);
        Ok(self.len() - 1)
    }

    /// Hash, linkage and Merkle consistency of the whole chain.
    pub fn verify_chain(&self) -> bool {
        self.check_integrity().is_ok()
    }

    /// Like [`Ledger::verify_chain`] but reports the first failure.
    /// Proof-of-work is not part of this check.
    pub fn check_integrity(&self) -> Result<(), IntegrityError> {
        for (index, block) in self.blocks.iter().enumerate() {
            if !block.has_valid_hash() {
                return Err(IntegrityError::ContentHash { index });
            }
            if index > 0 && block.previous_hash != self.blocks[index - 1].current_hash {
                return Err(IntegrityError::Linkage { index });
            }
            if !block.has_valid_merkle_root() {
                return Err(IntegrityError::MerkleRoot { index });
            }
        }
        Ok(())
    }

    /// Re-check every stored hash against the difficulty in force at its
    /// height. Rewritten blocks usually fail this.
    pub fn verify_proof_of_work(&self) -> Result<(), IntegrityError> {
        for (index, block) in self.blocks.iter().enumerate() {
            let difficulty = self.config.difficulty_at(index);
            if !block.meets_difficulty(difficulty) {
                return Err(IntegrityError::ProofOfWork { index, difficulty });
            }
        }
        Ok(())
    }

    /// Append `transaction` to block `index`, then relink and rehash that
    /// block and every later one. Proof-of-work is not redone.
    pub fn rewrite_block(&mut self, index: usize, transaction: &str) -> Result<(), LedgerError> {
        if index >= self.len() {
            return Err(LedgerError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        self.blocks[index].transactions.push(transaction.to_string());
        for i in index..self.blocks.len() {
            if i > 0 {
                let previous = self.blocks[i - 1].current_hash.clone();
                self.blocks[i].previous_hash = previous;
            }
            self.blocks[i].reseal();
        }
        info!(index, rehashed = self.len() - index, "block rewritten");
        Ok(())
    }

    pub fn block_rows(&self) -> Vec<BlockRow> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(index, block)| BlockRow {
                index,
                transactions: block.transactions.join(", "),
                nonce: block.nonce,
                previous_hash: shorten_hash(&block.previous_hash, DISPLAY_HASH_LEN),
                current_hash: shorten_hash(&block.current_hash, DISPLAY_HASH_LEN),
            })
            .collect()
    }
}

/// Cut `hash` to `max` characters, the last three being `...`.
pub fn shorten_hash(hash: &str, max: usize) -> String {
    if hash.chars().count() <= max {
        return hash.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = hash.chars().take(keep).collect();
    out.push_str("...");
    out
}
