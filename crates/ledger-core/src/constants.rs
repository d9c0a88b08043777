use crate::Hash;

pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const INITIAL_DIFFICULTY: usize = 2;
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: usize = 5;
pub const MIN_TRANSACTIONS_PER_BLOCK: usize = 2;
/// Nonces handed to the rayon pool per cancellation check.
pub const NONCE_WINDOW: u64 = 1 << 14;
pub const DISPLAY_HASH_LEN: usize = 16;
pub const EMPTY_MERKLE_ROOT: Hash = [0u8; HASH_SIZE];
