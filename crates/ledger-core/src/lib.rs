//! Ledger engine: Merkle commitments, sealed blocks, proof-of-work mining,
//! chain verification and historical rewrites.

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod error;
pub mod merkle;
pub mod pow;

pub use block::{content_hash, Block};
pub use chain::{BlockRow, Ledger};
pub use config::LedgerConfig;
pub use error::{IntegrityError, LedgerError};
pub use merkle::{merkle_root, merkle_root_hex, MerkleTree};
pub use pow::{CancelFlag, MiningJob};

pub type Hash = [u8; 32];
