use std::time::Duration;

pub const DEFAULT_LISTEN: &str = "localhost:8001";
pub const DEFAULT_PEERS: [&str; 2] = ["localhost:8001", "localhost:8002"];
/// Upper bound for a single inbound message; one message per connection.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;
pub const READ_CHUNK_SIZE: usize = 8 * 1024;
/// Pause after a failed `accept` so a persistent error does not spin.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);
