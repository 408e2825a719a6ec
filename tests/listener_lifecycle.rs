use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use chain_event_listener::{
    BlockListener, BlockSummary, ChainEvent, EventStream, ListenerConfig, ListenerError, MemoryBlockSource,
    MemoryWatchStore, Network, PollingListener, TxSummary, WatchStore,
};

const DEPTH: u64 = 3;

struct Harness {
    listener: PollingListener,
    events: EventStream,
    source: Arc<MemoryBlockSource>,
    store: Arc<MemoryWatchStore>,
}

fn harness(network: Network) -> Harness {
    let source = Arc::new(MemoryBlockSource::new());
    let store = Arc::new(MemoryWatchStore::new());
    let config = ListenerConfig::default()
        .with_confirmation_depth(DEPTH)
        .with_poll_interval(Duration::from_millis(10));
    let mut listener = PollingListener::new(network, source.clone(), store.clone(), config);
    let events = listener.take_events().expect("fresh listener has a stream");
    Harness {
        listener,
        events,
        source,
        store,
    }
}

fn drain(events: &mut EventStream) -> Vec<ChainEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn transfer(hash: &str, from: &str, to: &str) -> TxSummary {
    TxSummary::new(hash, from, to, 100)
}

/// One pending and one confirmed event per transaction, confirmation only once buried deep enough
#[tokio::test]
async fn test_monotonic_confirmation_over_many_blocks() {
    let mut h = harness(Network::ETH);
    assert_ok!(h.listener.watch_address("0xaddr"));

    for number in 1..=20u64 {
        let mut block = BlockSummary::new(number, format!("h{}", number));
        if number % 3 == 0 {
            block = block.with_transaction(transfer(&format!("tx{}", number), "0xsender", "0xaddr"));
        }
        h.source.add_block(block);

        assert_ok!(h.listener.poll_once().await);
        for event in drain(&mut h.events) {
            if event.confirmed {
                assert!(number >= event.block_number + DEPTH);
            }
            assert!(!event.reorged);
            // Confirmations for a block are only produced after its detection
            assert!(event.block_number <= number);
        }
    }

    // Blocks 3..=15 are confirmed (20 - 3 = 17), 18 still pending
    let status = assert_ok!(h.listener.status());
    assert_eq!(status.pending_events, 1);
    assert_eq!(status.last_block, 20);
}

#[tokio::test]
async fn test_detection_and_confirmation_sequence() {
    let mut h = harness(Network::BTC);
    assert_ok!(h.listener.watch_address("1watched"));

    h.source.add_block(
        BlockSummary::new(1, "b1")
            .with_transaction(transfer("a", "1watched", "1other"))
            .with_transaction(transfer("b", "1other", "1else")),
    );
    h.source.add_block(BlockSummary::new(2, "b2").with_transaction(transfer("c", "1x", "1watched")));
    h.source.extend_empty_to(5);

    let outcome = assert_ok!(h.listener.poll_once().await);
    assert_eq!(outcome.blocks_processed, 5);
    assert_eq!(outcome.detected, 2);
    assert_eq!(outcome.confirmed, 2);

    let summary: Vec<(String, u64, bool)> = drain(&mut h.events)
        .into_iter()
        .map(|e| (e.tx_hash, e.block_number, e.confirmed))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("a".to_string(), 1, false),
            ("c".to_string(), 2, false),
            ("a".to_string(), 1, true),
            ("c".to_string(), 2, true),
        ]
    );
}

#[tokio::test]
async fn test_reorg_keeps_surviving_transaction_pending() {
    let mut h = harness(Network::ETH);
    assert_ok!(h.listener.watch_address("0xaddr"));

    h.source.add_block(BlockSummary::new(1, "h1"));
    h.source.add_block(BlockSummary::new(2, "h2").with_transaction(transfer("tx", "0xsender", "0xaddr")));
    assert_ok!(h.listener.poll_once().await);
    assert_eq!(drain(&mut h.events).len(), 1);

    // Same transaction survives into the replacement block
    h.source.replace_block(BlockSummary::new(2, "h2b").with_transaction(transfer("tx", "0xsender", "0xaddr")));
    assert_ok!(h.listener.rewind_to(1));
    assert_ok!(h.listener.poll_once().await);

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 2);
    assert!(events[0].reorged && events[0].tx_hash == "tx");
    assert!(events[1].is_pending() && events[1].tx_hash == "tx");

    // The fresh occurrence confirms normally
    h.source.extend_empty_to(5);
    assert_ok!(h.listener.poll_once().await);
    let events = drain(&mut h.events);
    assert_eq!(events.len(), 1);
    assert!(events[0].confirmed && !events[0].reorged);
}

#[tokio::test]
async fn test_deep_reorg_retracts_everything_pending() {
    let mut h = harness(Network::ETH);
    assert_ok!(h.listener.watch_address("0xaddr"));

    for number in 1..=3u64 {
        h.source.add_block(
            BlockSummary::new(number, format!("h{}", number))
                .with_transaction(transfer(&format!("tx{}", number), "0xsender", "0xaddr")),
        );
    }
    assert_ok!(h.listener.poll_once().await);
    drain(&mut h.events);

    // Block 1 replaced with nothing; blocks 2 and 3 re-fetched unchanged
    h.source.replace_block(BlockSummary::new(1, "h1b"));
    assert_ok!(h.listener.rewind_to(0));
    let outcome = assert_ok!(h.listener.poll_once().await);
    assert_eq!(outcome.reorged, 3);

    let events = drain(&mut h.events);
    let retracted: Vec<&str> = events.iter().filter(|e| e.reorged).map(|e| e.tx_hash.as_str()).collect();
    assert_eq!(retracted, vec!["tx1", "tx2", "tx3"]);

    // Nothing pending is ever lost: tx2 and tx3 are re-detected from their blocks
    let redetected: Vec<&str> = events.iter().filter(|e| e.is_pending()).map(|e| e.tx_hash.as_str()).collect();
    assert_eq!(redetected, vec!["tx2", "tx3"]);
}

#[tokio::test]
async fn test_watch_changes_apply_from_next_cycle() {
    let mut h = harness(Network::TRX);

    h.source.add_block(BlockSummary::new(1, "t1").with_transaction(transfer("early", "Ta", "Tb")));
    assert_ok!(h.listener.poll_once().await);
    assert!(drain(&mut h.events).is_empty());

    assert_ok!(h.listener.watch_address("Tb"));
    assert!(assert_ok!(h.store.contains("Tb")));
    h.source.add_block(BlockSummary::new(2, "t2").with_transaction(transfer("late", "Ta", "Tb")));
    assert_ok!(h.listener.poll_once().await);

    let events = drain(&mut h.events);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].tx_hash, "late");
    assert_eq!(events[0].network, Network::TRX);

    assert_ok!(h.listener.unwatch_address("Tb"));
    h.source.add_block(BlockSummary::new(3, "t3").with_transaction(transfer("after", "Ta", "Tb")));
    assert_ok!(h.listener.poll_once().await);
    assert!(drain(&mut h.events).iter().all(|e| e.tx_hash != "after"));
}

#[tokio::test]
async fn test_running_listener_shuts_down_cleanly() {
    let mut h = harness(Network::ETH);
    assert_ok!(h.listener.watch_address("0xaddr"));
    h.source.add_block(BlockSummary::new(1, "h1").with_transaction(transfer("tx1", "0xsender", "0xaddr")));

    let root = CancellationToken::new();
    assert_ok!(h.listener.start(root.clone()).await);

    let first = timeout(Duration::from_secs(2), h.events.recv())
        .await
        .expect("timed out waiting for detection")
        .expect("stream closed early");
    assert_eq!(first.tx_hash, "tx1");

    h.source.extend_empty_to(4);
    let confirmed = timeout(Duration::from_secs(2), h.events.recv())
        .await
        .expect("timed out waiting for confirmation")
        .expect("stream closed early");
    assert!(confirmed.confirmed);

    assert_ok!(h.listener.stop().await);
    assert!(h.events.recv().await.is_none());

    let error = assert_err!(h.listener.start(root).await);
    assert!(matches!(error, ListenerError::Stopped(_)));
}

#[tokio::test]
async fn test_invalid_address_is_surfaced() {
    let h = harness(Network::ETH);
    let error = assert_err!(h.listener.watch_address(" padded "));
    assert!(matches!(error, ListenerError::Storage(_)));
}
