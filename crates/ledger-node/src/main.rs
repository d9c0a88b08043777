use std::{io::BufRead, path::PathBuf};

use anyhow::Result;
use clap::Parser;
use ledger_core::CancelFlag;
use ledger_node::{console::Console, NodeConfig, PeerNode};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-node")]
#[command(about = "Proof-of-work ledger node with an operator console")]
struct Args {
    /// TOML config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to listen on, as localhost:<port>
    #[arg(long)]
    port: Option<u16>,

    /// Full listen address, takes precedence over --port
    #[arg(long)]
    listen: Option<String>,

    /// Peer address, repeatable; replaces the configured peer list
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Minimum transactions per block
    #[arg(long)]
    min_transactions: Option<usize>,

    /// Transaction to broadcast once at startup
    #[arg(long)]
    announce: Option<String>,
}

impl Args {
    fn node_config(&self) -> Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)?,
            None => NodeConfig::default(),
        };
        if let Some(port) = self.port {
            config.listen = format!("localhost:{port}");
        }
        if let Some(listen) = &self.listen {
            config.listen = listen.clone();
        }
        if !self.peers.is_empty() {
            config.peers = self.peers.clone();
        }
        if let Some(n) = self.min_transactions {
            anyhow::ensure!(n > 0, "--min-transactions must be positive");
            config.ledger.min_transactions_per_block = n;
        }
        Ok(config)
    }
}

/// Forward stdin lines from a plain thread so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(|line| line.ok()) {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.node_config()?;
    let node = PeerNode::new(config);

    // Without its listener the node has nothing to do.
    let listener = node.bind().await?;
    let server = node.clone();
    tokio::spawn(async move {
        if let Err(err) = server.serve(listener).await {
            error!(%err, "peer server failed");
        }
    });

    if let Some(transaction) = &args.announce {
        node.broadcast_new_transaction(transaction);
    }

    let cancel = CancelFlag::new();
    let console = Console::new(node, cancel.clone());
    tokio::select! {
        _ = console.run(spawn_stdin_reader()) => info!("console closed"),
        _ = tokio::signal::ctrl_c() => {
            cancel.cancel();
            info!("interrupted, shutting down");
        }
    }
    Ok(())
}
