use thiserror::Error;

/// Reasons a ledger operation is refused. None of these leave the ledger
/// partially modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("not enough transactions to mine a block: got {got}, need at least {required}")]
    NotEnoughTransactions { got: usize, required: usize },

    #[error("block index {index} out of range for chain of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("minimum transactions per block must be positive, got {0}")]
    InvalidThreshold(usize),

    #[error("block hash {stored} does not match recomputed hash {computed}")]
    HashMismatch { stored: String, computed: String },

    #[error("block previous hash {got:?} does not match local tip {expected:?}")]
    TipMismatch { expected: String, got: String },

    #[error("chain grew from {expected} to {actual} blocks while mining")]
    StaleTip { expected: usize, actual: usize },

    #[error("mining cancelled after {attempts} nonces")]
    MiningCancelled { attempts: u64 },

    #[error("nonce space exhausted at difficulty {difficulty}")]
    NonceSpaceExhausted { difficulty: usize },
}

/// First inconsistency found by a chain scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("block {index}: stored hash does not match its content")]
    ContentHash { index: usize },

    #[error("block {index}: previous hash does not match the preceding block")]
    Linkage { index: usize },

    #[error("block {index}: merkle root does not match its transactions")]
    MerkleRoot { index: usize },

    #[error("block {index}: hash lacks {difficulty} leading zeros")]
    ProofOfWork { index: usize, difficulty: usize },
}

impl IntegrityError {
    pub fn index(&self) -> usize {
        match self {
            IntegrityError::ContentHash { index }
            | IntegrityError::Linkage { index }
            | IntegrityError::MerkleRoot { index }
            | IntegrityError::ProofOfWork { index, .. } => *index,
        }
    }
}
