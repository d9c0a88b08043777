//! Line-oriented operator console. It only parses input, calls into the
//! node and formats what comes back.

use std::fmt::Write as _;

use ledger_core::{BlockRow, CancelFlag, MerkleTree};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::node::PeerNode;
use crate::transport::Transport;

pub const HELP: &str = "\
commands:
  mine <tx1, tx2, ...>    mine a block on the local tip and broadcast it
  show                    list blocks
  rewrite <index> <text>  append a transaction to a block and rehash forward
  verify                  check hashes, links and merkle roots
  pow                     re-check proof-of-work of every block
  set-min <n>             minimum transactions per block
  tx <text>               broadcast a transaction
  tree <index>            show the merkle tree of a block
  help                    this text
  quit                    exit";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Mine(Vec<String>),
    Show,
    Rewrite { index: usize, transaction: String },
    Verify,
    ProofOfWork,
    SetMin(usize),
    Transaction(String),
    Tree(usize),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command {0:?}, try `help`")]
    Unknown(String),
    #[error("transactions cannot be empty")]
    EmptyTransactions,
    #[error("transaction cannot be empty")]
    EmptyTransaction,
    #[error("expected a non-negative integer, got {0:?}")]
    BadNumber(String),
    #[error("usage: {0}")]
    Usage(&'static str),
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };
    match word {
        "mine" => {
            let transactions: Vec<String> = rest
                .split(',')
                .map(str::trim)
                .filter(|tx| !tx.is_empty())
                .map(str::to_string)
                .collect();
            if transactions.is_empty() {
                return Err(CommandError::EmptyTransactions);
            }
            Ok(Command::Mine(transactions))
        }
        "show" | "ls" => Ok(Command::Show),
        "rewrite" => {
            let (index, text) = rest
                .split_once(char::is_whitespace)
                .ok_or(CommandError::Usage("rewrite <index> <text>"))?;
            let transaction = text.trim();
            if transaction.is_empty() {
                return Err(CommandError::EmptyTransaction);
            }
            Ok(Command::Rewrite {
                index: parse_number(index)?,
                transaction: transaction.to_string(),
            })
        }
        "verify" => Ok(Command::Verify),
        "pow" => Ok(Command::ProofOfWork),
        "set-min" => Ok(Command::SetMin(parse_number(rest)?)),
        "tx" => {
            if rest.is_empty() {
                return Err(CommandError::EmptyTransaction);
            }
            Ok(Command::Transaction(rest.to_string()))
        }
        "tree" => Ok(Command::Tree(parse_number(rest)?)),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn parse_number(s: &str) -> Result<usize, CommandError> {
    s.trim()
        .parse()
        .map_err(|_| CommandError::BadNumber(s.trim().to_string()))
}

/// Aligned table, two spaces between columns.
pub fn format_block_table(rows: &[BlockRow]) -> String {
    let header = ["Block", "Transactions", "Nonce", "Previous Hash", "Current Hash"];
    let cells: Vec<[String; 5]> = rows
        .iter()
        .map(|r| {
            [
                r.index.to_string(),
                r.transactions.clone(),
                r.nonce.to_string(),
                r.previous_hash.clone(),
                r.current_hash.clone(),
            ]
        })
        .collect();

    let mut widths = header.map(|h| h.chars().count());
    for row in &cells {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_line = |fields: &[&str]| {
        let line: Vec<String> = fields
            .iter()
            .zip(widths)
            .map(|(f, w)| format!("{f:<w$}"))
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    };
    push_line(&header);
    for row in &cells {
        let fields: Vec<&str> = row.iter().map(String::as_str).collect();
        push_line(&fields);
    }
    out
}

pub fn format_merkle_tree(tree: &MerkleTree) -> String {
    let mut out = String::from("Level  Left Child  Right Child  Resulting Hash\n");
    for row in tree.rows() {
        let _ = writeln!(
            out,
            "{}  {}  {}  {}",
            row.level,
            row.left.as_deref().unwrap_or("leaf"),
            row.right.as_deref().unwrap_or("leaf"),
            row.hash
        );
    }
    out
}

pub struct Console<T: Transport> {
    node: PeerNode<T>,
    cancel: CancelFlag,
}

impl<T: Transport> Console<T> {
    /// `cancel` aborts any mining started from the console.
    pub fn new(node: PeerNode<T>, cancel: CancelFlag) -> Self {
        Self { node, cancel }
    }

    /// Process lines until `quit` or the sender hangs up.
    pub async fn run(&self, mut lines: mpsc::Receiver<String>) {
        println!("{HELP}");
        while let Some(line) = lines.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line) {
                Ok(command) => match self.execute(command).await {
                    Some(reply) => println!("{reply}"),
                    None => break,
                },
                Err(err) => println!("{err}"),
            }
        }
    }

    /// Run one command and return the text to show; `None` means quit.
    pub async fn execute(&self, command: Command) -> Option<String> {
        let reply = match command {
            Command::Mine(transactions) => {
                match self.node.mine_next(transactions, &self.cancel).await {
                    Ok(block) => {
                        self.node.broadcast_new_block(&block);
                        format!(
                            "New block mined with hash {}. Broadcasting...",
                            block.current_hash
                        )
                    }
                    Err(err) => format!("Failed to mine a new block: {err}"),
                }
            }
            Command::Show => {
                let rows = self.node.display_blocks().await;
                if rows.is_empty() {
                    "No blocks yet.".to_string()
                } else {
                    format_block_table(&rows)
                }
            }
            Command::Rewrite { index, transaction } => {
                match self.node.rewrite_block(index, &transaction).await {
                    Ok(()) => "Block updated successfully.".to_string(),
                    Err(err) => format!("Rewrite rejected: {err}"),
                }
            }
            Command::Verify => match self.node.check_integrity().await {
                Ok(()) => "Blockchain is valid.".to_string(),
                Err(err) => format!("Blockchain is invalid: {err}"),
            },
            Command::ProofOfWork => match self.node.verify_proof_of_work().await {
                Ok(()) => "Every block meets its difficulty.".to_string(),
                Err(err) => format!("Proof-of-work check failed: {err}"),
            },
            Command::SetMin(n) => match self.node.set_min_transactions_per_block(n).await {
                Ok(()) => format!("Number of transactions per block set to {n}."),
                Err(err) => err.to_string(),
            },
            Command::Transaction(transaction) => {
                self.node.broadcast_new_transaction(&transaction);
                "Transaction broadcast.".to_string()
            }
            Command::Tree(index) => match self.node.block(index).await {
                Some(block) => format_merkle_tree(&MerkleTree::new(&block.transactions)),
                None => format!("No block at index {index}."),
            },
            Command::Help => HELP.to_string(),
            Command::Quit => return None,
        };
        Some(reply)
    }
}
