use std::{
    collections::HashSet,
    future::Future,
    io,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde::de::IgnoredAny;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

use crate::constants::READ_CHUNK_SIZE;
use crate::error::NodeError;

/// Outbound delivery of one encoded message to one peer address.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        addr: &str,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), NodeError>> + Send;
}

/// Connect, write the whole message, close the write half.
#[derive(Clone, Debug, Default)]
pub struct TcpTransport {
    connect_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new(connect_timeout: Option<Duration>, write_timeout: Option<Duration>) -> Self {
        Self {
            connect_timeout,
            write_timeout,
        }
    }
}

impl Transport for TcpTransport {
    async fn send(&self, addr: &str, bytes: Vec<u8>) -> Result<(), NodeError> {
        let mut stream =
            with_timeout("connect", self.connect_timeout, TcpStream::connect(addr)).await?;
        with_timeout("write", self.write_timeout, async {
            stream.write_all(&bytes).await?;
            stream.shutdown().await
        })
        .await
    }
}

/// Records sends instead of performing them. Addresses marked unreachable
/// fail with `ConnectionRefused`.
#[derive(Clone, Debug, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unreachable(&self, addr: &str) {
        lock(&self.unreachable).insert(addr.to_string());
    }

    /// Drain everything sent so far, in send order.
    pub fn take(&self) -> Vec<(String, Vec<u8>)> {
        std::mem::take(&mut *lock(&self.sent))
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }
}

impl Transport for MemoryTransport {
    async fn send(&self, addr: &str, bytes: Vec<u8>) -> Result<(), NodeError> {
        if lock(&self.unreachable).contains(addr) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }
        lock(&self.sent).push((addr.to_string(), bytes));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run `fut`, failing with [`NodeError::Timeout`] if `limit` elapses first.
pub(crate) async fn with_timeout<T, E, F>(
    op: &'static str,
    limit: Option<Duration>,
    fut: F,
) -> Result<T, NodeError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<NodeError>,
{
    match limit {
        Some(after) => match tokio::time::timeout(after, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(NodeError::Timeout { op, after }),
        },
        None => fut.await.map_err(Into::into),
    }
}

/// Read one message: stop as soon as the buffer holds a complete JSON value,
/// or at EOF. More than `limit` bytes is an error.
pub(crate) async fn read_message<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, NodeError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(limit.min(READ_CHUNK_SIZE));
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(buf);
        }
        if n > limit - buf.len() {
            return Err(NodeError::MessageTooLarge { limit });
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = complete_value_len(&buf) {
            buf.truncate(end);
            return Ok(buf);
        }
    }
}

/// Length of the first JSON value in `buf`, or `None` while it is still
/// incomplete. Malformed input counts as complete and is left to the decoder.
fn complete_value_len(buf: &[u8]) -> Option<usize> {
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<IgnoredAny>();
    match values.next() {
        Some(Ok(_)) => Some(values.byte_offset()),
        Some(Err(err)) if err.is_eof() => None,
        Some(Err(_)) => Some(buf.len()),
        None => None,
    }
}
