use std::{fmt, future::Future, net::SocketAddr, sync::Arc};

use ledger_core::{Block, BlockRow, CancelFlag, IntegrityError, Ledger, LedgerError, MiningJob};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::Mutex,
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::config::NodeConfig;
use crate::constants::ACCEPT_ERROR_BACKOFF;
use crate::error::NodeError;
use crate::message::Message;
use crate::transport::{read_message, with_timeout, TcpTransport, Transport};

/// Lifecycle of one inbound connection, used in debug logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Listening,
    Accepted,
    Decoding,
    Validating,
    Rejected,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Listening => "listening",
            ConnectionState::Accepted => "accepted",
            ConnectionState::Decoding => "decoding",
            ConnectionState::Validating => "validating",
            ConnectionState::Rejected => "rejected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What an inbound message did to the local node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundOutcome {
    BlockAccepted { index: usize },
    BlockRejected(LedgerError),
    /// Transactions are only logged; there is no pool to put them in.
    TransactionReceived(String),
}

/// A ledger bound to a network address and a static set of peers.
///
/// All ledger access, local or from inbound connections, goes through one
/// async mutex. Proof-of-work runs outside the lock on the blocking pool.
pub struct PeerNode<T: Transport = TcpTransport> {
    config: Arc<NodeConfig>,
    ledger: Arc<Mutex<Ledger>>,
    transport: Arc<T>,
}

impl<T: Transport> Clone for PeerNode<T> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            ledger: Arc::clone(&self.ledger),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl PeerNode<TcpTransport> {
    pub fn new(config: NodeConfig) -> Self {
        let transport = TcpTransport::new(config.connect_timeout(), config.write_timeout());
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> PeerNode<T> {
    pub fn with_transport(config: NodeConfig, transport: T) -> Self {
        let ledger = Ledger::new(config.ledger.clone());
        Self {
            config: Arc::new(config),
            ledger: Arc::new(Mutex::new(ledger)),
            transport: Arc::new(transport),
        }
    }

    pub fn address(&self) -> &str {
        &self.config.listen
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn chain_len(&self) -> usize {
        self.ledger.lock().await.len()
    }

    pub async fn tip_hash(&self) -> String {
        self.ledger.lock().await.tip_hash().to_string()
    }

    pub async fn blocks(&self) -> Vec<Block> {
        self.ledger.lock().await.blocks().to_vec()
    }

    pub async fn block(&self, index: usize) -> Option<Block> {
        self.ledger.lock().await.get(index).cloned()
    }

    pub async fn display_blocks(&self) -> Vec<BlockRow> {
        self.ledger.lock().await.block_rows()
    }

    pub async fn min_transactions_per_block(&self) -> usize {
        self.ledger.lock().await.min_transactions_per_block()
    }

    pub async fn set_min_transactions_per_block(&self, n: usize) -> Result<(), LedgerError> {
        self.ledger.lock().await.set_min_transactions_per_block(n)
    }

    pub async fn current_difficulty(&self) -> usize {
        self.ledger.lock().await.current_difficulty()
    }

    /// Mine on top of `previous_hash` and append the result locally. Does not
    /// broadcast.
    pub async fn mine(
        &self,
        transactions: Vec<String>,
        previous_hash: &str,
        cancel: &CancelFlag,
    ) -> Result<Block, NodeError> {
        let job = self
            .ledger
            .lock()
            .await
            .prepare_mining(transactions, previous_hash)?;
        self.run_job(job, cancel).await
    }

    /// Mine on top of the current local tip.
    pub async fn mine_next(
        &self,
        transactions: Vec<String>,
        cancel: &CancelFlag,
    ) -> Result<Block, NodeError> {
        let job = {
            let ledger = self.ledger.lock().await;
            let tip = ledger.tip_hash().to_string();
            ledger.prepare_mining(transactions, &tip)?
        };
        self.run_job(job, cancel).await
    }

    async fn run_job(&self, job: MiningJob, cancel: &CancelFlag) -> Result<Block, NodeError> {
        let height = job.height();
        info!(height, difficulty = job.difficulty(), "mining a new block");
        let cancel = cancel.clone();
        let block = tokio::task::spawn_blocking(move || job.run(&cancel)).await??;
        self.ledger
            .lock()
            .await
            .append_mined(height, block.clone())?;
        Ok(block)
    }

    pub async fn rewrite_block(&self, index: usize, transaction: &str) -> Result<(), LedgerError> {
        self.ledger.lock().await.rewrite_block(index, transaction)
    }

    pub async fn verify_chain(&self) -> bool {
        self.ledger.lock().await.verify_chain()
    }

    pub async fn check_integrity(&self) -> Result<(), IntegrityError> {
        self.ledger.lock().await.check_integrity()
    }

    pub async fn verify_proof_of_work(&self) -> Result<(), IntegrityError> {
        self.ledger.lock().await.verify_proof_of_work()
    }

    /// Send `block` to every known peer except this node. Each send is its
    /// own task; the handles may be dropped.
    pub fn broadcast_new_block(&self, block: &Block) -> Vec<JoinHandle<()>> {
        self.broadcast(&Message::NewBlock(block.clone()))
    }

    pub fn broadcast_new_transaction(&self, transaction: &str) -> Vec<JoinHandle<()>> {
        self.broadcast(&Message::NewTransaction(transaction.to_string()))
    }

    fn broadcast(&self, message: &Message) -> Vec<JoinHandle<()>> {
        let kind = message.kind();
        let bytes = match message.encode() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(kind, %err, "failed to encode message");
                return Vec::new();
            }
        };
        self.config
            .remote_peers()
            .map(|peer| {
                let transport = Arc::clone(&self.transport);
                let peer = peer.to_string();
                let bytes = bytes.clone();
                tokio::spawn(async move {
                    match transport.send(&peer, bytes).await {
                        Ok(()) => debug!(%peer, kind, "message sent"),
                        Err(err) => warn!(%peer, kind, %err, "failed to send message"),
                    }
                })
            })
            .collect()
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn start_server(&self) -> Result<(), NodeError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    pub async fn bind(&self) -> Result<TcpListener, NodeError> {
        let addr = self.config.listen.clone();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })
    }

    pub async fn serve(&self, listener: TcpListener) -> Result<(), NodeError> {
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves, one task per connection.
    pub async fn serve_with_shutdown<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), NodeError>
    where
        F: Future<Output = ()>,
    {
        let local = listener.local_addr()?;
        info!(addr = %local, state = %ConnectionState::Listening, "peer server listening");
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(addr = %local, "peer server stopped");
                    return Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let node = self.clone();
                        tokio::spawn(async move {
                            if let Err(err) = node.handle_connection(stream, peer).await {
                                warn!(%peer, %err, "connection failed");
                            }
                            debug!(%peer, state = %ConnectionState::Closed);
                        });
                    }
                    Err(err) => {
                        error!(%err, "failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }
    }

    /// Read one bounded message from `stream` and act on it.
    pub async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
    ) -> Result<InboundOutcome, NodeError> {
        debug!(%peer, state = %ConnectionState::Accepted);
        let limit = self.config.max_message_size;
        let bytes = with_timeout(
            "read",
            self.config.read_timeout(),
            read_message(&mut stream, limit),
        )
        .await?;
        self.handle_bytes(&bytes).await
    }

    pub async fn handle_bytes(&self, bytes: &[u8]) -> Result<InboundOutcome, NodeError> {
        debug!(len = bytes.len(), state = %ConnectionState::Decoding);
        let message = Message::decode(bytes)?;
        Ok(self.handle_message(message).await)
    }

    pub async fn handle_message(&self, message: Message) -> InboundOutcome {
        match message {
            Message::NewBlock(block) => {
                debug!(hash = %block.current_hash, state = %ConnectionState::Validating);
                let mut ledger = self.ledger.lock().await;
                match ledger.accept_block(block) {
                    Ok(index) => {
                        info!(index, "new block added from peer");
                        InboundOutcome::BlockAccepted { index }
                    }
                    Err(err) => {
                        warn!(%err, state = %ConnectionState::Rejected, "invalid block received");
                        InboundOutcome::BlockRejected(err)
                    }
                }
            }
            Message::NewTransaction(transaction) => {
                info!(%transaction, "transaction received");
                InboundOutcome::TransactionReceived(transaction)
            }
        }
    }
}
