use anyhow::Result;
use clap::{Parser, Subcommand};
use ledger_core::MerkleTree;
use ledger_node::{console::format_merkle_tree, Message, TcpTransport, Transport};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "One-shot client for the ledger peer protocol")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a raw transaction to a node
    SendTx {
        /// Node address (e.g. localhost:8001)
        #[arg(long, default_value = "localhost:8001")]
        node: String,
        /// Transaction text
        text: String,
    },
    /// Print the Merkle root of a transaction list
    MerkleRoot {
        /// Also print every node of the tree
        #[arg(long)]
        tree: bool,
        /// Transactions, in block order
        #[arg(required = true)]
        txs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::SendTx { node, text } => {
            let bytes = Message::NewTransaction(text).encode()?;
            TcpTransport::default().send(&node, bytes).await?;
            info!(%node, "transaction sent");
            println!("sent to {node}");
        }
        Command::MerkleRoot { tree, txs } => {
            let merkle = MerkleTree::new(&txs);
            if tree {
                print!("{}", format_merkle_tree(&merkle));
            }
            println!("{}", merkle.root_hex());
        }
    }
    Ok(())
}
