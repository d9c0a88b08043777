use std::time::Duration;

use ledger_core::{Block, CancelFlag, LedgerError};
use ledger_node::{
    InboundOutcome, Message, NodeConfig, NodeError, PeerNode, TcpTransport, Transport,
};
use rand::Rng;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::oneshot,
    time::{sleep, timeout},
};

async fn bind_local() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

fn config(listen: &str, peers: &[&str]) -> NodeConfig {
    NodeConfig {
        listen: listen.to_string(),
        peers: peers.iter().map(|p| p.to_string()).collect(),
        ..NodeConfig::default()
    }
}

fn serve(node: &PeerNode, listener: TcpListener) {
    let server = node.clone();
    tokio::spawn(async move { server.serve(listener).await });
}

async fn wait_for_len(node: &PeerNode, len: usize) {
    for _ in 0..250 {
        if node.chain_len().await == len {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("chain never reached length {len}");
}

fn txs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn broadcast_block_extends_peer_chain() -> anyhow::Result<()> {
    let (listener_a, addr_a) = bind_local().await;
    let (listener_b, addr_b) = bind_local().await;
    let members = [addr_a.as_str(), addr_b.as_str()];
    let a = PeerNode::new(config(&addr_a, &members));
    let b = PeerNode::new(config(&addr_b, &members));
    serve(&a, listener_a);
    serve(&b, listener_b);

    let block = a.mine_next(txs(&["a", "b"]), &CancelFlag::new()).await?;
    assert!(block.current_hash.starts_with("00"));
    assert_eq!(block.previous_hash, "");

    for handle in a.broadcast_new_block(&block) {
        handle.await?;
    }
    wait_for_len(&b, 1).await;
    assert_eq!(b.tip_hash().await, block.current_hash);
    // a never sends to itself
    assert_eq!(a.chain_len().await, 1);
    Ok(())
}

#[tokio::test]
async fn peer_follows_a_growing_chain() -> anyhow::Result<()> {
    let (listener_a, addr_a) = bind_local().await;
    let (listener_b, addr_b) = bind_local().await;
    let members = [addr_a.as_str(), addr_b.as_str()];
    let a = PeerNode::new(config(&addr_a, &members));
    let b = PeerNode::new(config(&addr_b, &members));
    serve(&a, listener_a);
    serve(&b, listener_b);

    let mut rng = rand::thread_rng();
    for height in 1..=4 {
        let batch: Vec<String> = (0..rng.gen_range(2..6))
            .map(|i| format!("h{height}-tx{i}-{}", rng.gen::<u16>()))
            .collect();
        let block = a.mine_next(batch, &CancelFlag::new()).await?;
        for handle in a.broadcast_new_block(&block) {
            handle.await?;
        }
        wait_for_len(&b, height).await;
    }

    assert_eq!(b.blocks().await, a.blocks().await);
    assert!(b.verify_chain().await);
    Ok(())
}

#[tokio::test]
async fn block_not_on_local_tip_is_discarded() -> anyhow::Result<()> {
    let (listener_b, addr_b) = bind_local().await;
    let b = PeerNode::new(config(&addr_b, &[]));
    b.mine_next(txs(&["local", "first"]), &CancelFlag::new()).await?;

    let a = PeerNode::new(config("127.0.0.1:1", &[]));
    let foreign = a.mine_next(txs(&["a", "b"]), &CancelFlag::new()).await?;

    let bytes = Message::NewBlock(foreign).encode()?;
    let send = tokio::spawn(async move { TcpTransport::default().send(&addr_b, bytes).await });
    let (stream, peer) = listener_b.accept().await?;
    let outcome = b.handle_connection(stream, peer).await?;
    send.await??;

    assert!(matches!(
        outcome,
        InboundOutcome::BlockRejected(LedgerError::TipMismatch { .. })
    ));
    assert_eq!(b.chain_len().await, 1);
    Ok(())
}

#[tokio::test]
async fn block_on_local_tip_is_accepted_over_tcp() -> anyhow::Result<()> {
    let (listener_b, addr_b) = bind_local().await;
    let b = PeerNode::new(config(&addr_b, &[]));
    let block = Block::seal(txs(&["a", "b"]), 701, "");

    let bytes = Message::NewBlock(block.clone()).encode()?;
    let send = tokio::spawn(async move { TcpTransport::default().send(&addr_b, bytes).await });
    let (stream, peer) = listener_b.accept().await?;
    let outcome = b.handle_connection(stream, peer).await?;
    send.await??;

    assert_eq!(outcome, InboundOutcome::BlockAccepted { index: 0 });
    assert_eq!(b.tip_hash().await, block.current_hash);
    Ok(())
}

#[tokio::test]
async fn block_is_handled_while_sender_keeps_socket_open() -> anyhow::Result<()> {
    let (listener_b, addr_b) = bind_local().await;
    let b = PeerNode::new(config(&addr_b, &[]));
    let block = Block::seal(txs(&["a", "b"]), 701, "");

    let mut client = TcpStream::connect(&addr_b).await?;
    let (stream, peer) = listener_b.accept().await?;
    client.write_all(&Message::NewBlock(block.clone()).encode()?).await?;

    let outcome = timeout(Duration::from_secs(5), b.handle_connection(stream, peer)).await??;
    assert_eq!(outcome, InboundOutcome::BlockAccepted { index: 0 });
    assert_eq!(b.tip_hash().await, block.current_hash);
    drop(client);
    Ok(())
}

#[tokio::test]
async fn oversized_message_is_refused() -> anyhow::Result<()> {
    let (listener_b, addr_b) = bind_local().await;
    let b = PeerNode::new(NodeConfig {
        max_message_size: 64,
        ..config(&addr_b, &[])
    });

    let bytes = Message::NewTransaction("x".repeat(200)).encode()?;
    let send = tokio::spawn(async move { TcpTransport::default().send(&addr_b, bytes).await });
    let (stream, peer) = listener_b.accept().await?;
    let err = b.handle_connection(stream, peer).await.unwrap_err();
    assert!(matches!(err, NodeError::MessageTooLarge { limit: 64 }));
    let _ = send.await?;
    Ok(())
}

#[tokio::test]
async fn silent_peer_hits_read_timeout() -> anyhow::Result<()> {
    let (listener_b, addr_b) = bind_local().await;
    let b = PeerNode::new(NodeConfig {
        read_timeout_ms: Some(50),
        ..config(&addr_b, &[])
    });

    let _idle = TcpStream::connect(&addr_b).await?;
    let (stream, peer) = listener_b.accept().await?;
    let err = b.handle_connection(stream, peer).await.unwrap_err();
    assert!(matches!(err, NodeError::Timeout { op: "read", .. }));
    Ok(())
}

#[tokio::test]
async fn dead_peer_does_not_stop_broadcast() -> anyhow::Result<()> {
    let (dead, dead_addr) = bind_local().await;
    drop(dead);
    let (listener_live, live_addr) = bind_local().await;
    let live = PeerNode::new(config(&live_addr, &[]));

    let sender = PeerNode::new(NodeConfig {
        connect_timeout_ms: Some(1_000),
        ..config("127.0.0.1:1", &[dead_addr.as_str(), live_addr.as_str()])
    });
    let handles = sender.broadcast_new_transaction("Sample Transaction Data");
    assert_eq!(handles.len(), 2);

    let (stream, peer) = listener_live.accept().await?;
    let outcome = live.handle_connection(stream, peer).await?;
    assert_eq!(
        outcome,
        InboundOutcome::TransactionReceived("Sample Transaction Data".into())
    );
    for handle in handles {
        handle.await?;
    }
    Ok(())
}

#[tokio::test]
async fn server_stops_on_shutdown_signal() -> anyhow::Result<()> {
    let (listener, addr) = bind_local().await;
    let node = PeerNode::new(config(&addr, &[]));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = {
        let node = node.clone();
        tokio::spawn(async move {
            node.serve_with_shutdown(listener, async {
                let _ = stop_rx.await;
            })
            .await
        })
    };

    TcpTransport::default()
        .send(&addr, Message::NewTransaction("ping".into()).encode()?)
        .await?;
    stop_tx.send(()).ok();
    timeout(Duration::from_secs(5), server).await???;
    Ok(())
}

#[tokio::test]
async fn bind_failure_is_reported() -> anyhow::Result<()> {
    let (_held, addr) = bind_local().await;
    let node = PeerNode::new(config(&addr, &[]));
    let err = node.bind().await.unwrap_err();
    assert!(matches!(err, NodeError::Bind { .. }));
    Ok(())
}
