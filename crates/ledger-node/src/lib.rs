//! Peer node around a [`ledger_core::Ledger`]: raw TCP broadcast of blocks
//! and transactions to a static peer list, and validation of inbound blocks.

pub mod config;
pub mod console;
pub mod constants;
pub mod error;
pub mod message;
pub mod node;
pub mod transport;

pub use config::NodeConfig;
pub use error::NodeError;
pub use message::Message;
pub use node::{ConnectionState, InboundOutcome, PeerNode};
pub use transport::{MemoryTransport, TcpTransport, Transport};
