use std::{fs, path::Path, time::Duration};

use ledger_core::LedgerConfig;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LISTEN, DEFAULT_PEERS, MAX_MESSAGE_SIZE};
use crate::error::NodeError;

/// Node settings. Every field has a default, so a TOML file only needs the
/// keys it changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub listen: String,
    /// Static membership. The node's own address may appear here; it is
    /// skipped when broadcasting.
    pub peers: Vec<String>,
    pub max_message_size: usize,
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
    pub ledger: LedgerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            peers: DEFAULT_PEERS.iter().map(|p| p.to_string()).collect(),
            max_message_size: MAX_MESSAGE_SIZE,
            connect_timeout_ms: None,
            read_timeout_ms: None,
            write_timeout_ms: None,
            ledger: LedgerConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn for_port(port: u16) -> Self {
        Self {
            listen: format!("localhost:{port}"),
            ..Self::default()
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let config_error = |reason: String| NodeError::Config {
            path: path.display().to_string(),
            reason,
        };
        let text = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
        toml::from_str(&text).map_err(|e| config_error(e.to_string()))
    }

    /// Peers to broadcast to, excluding this node's own address.
    pub fn remote_peers(&self) -> impl Iterator<Item = &str> {
        self.peers
            .iter()
            .map(String::as_str)
            .filter(move |peer| *peer != self.listen)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}
