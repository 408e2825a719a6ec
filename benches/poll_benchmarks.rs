use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use chain_event_listener::{
    BlockListener, BlockSummary, ListenerConfig, MemoryBlockSource, MemoryWatchStore, Network, PollingListener,
    TxSummary,
};

fn create_test_chain(blocks: u64, transfers_per_block: u64) -> Arc<MemoryBlockSource> {
    let source = Arc::new(MemoryBlockSource::new());
    for number in 1..=blocks {
        let mut block = BlockSummary::new(number, format!("0x{:064x}", number));
        for i in 0..transfers_per_block {
            let to = if i % 10 == 0 { "0xwatched".to_string() } else { format!("0x{:040x}", i) };
            block = block.with_transaction(TxSummary::new(
                format!("0x{:060x}{:04x}", number, i),
                format!("0x{:040x}", number),
                to,
                u128::from(i + 1) * 1_000_000_000_000_000_000,
            ));
        }
        source.add_block(block);
    }
    source
}

fn create_listener(source: Arc<MemoryBlockSource>, watched: usize) -> PollingListener {
    let store = Arc::new(MemoryWatchStore::with_addresses(
        std::iter::once("0xwatched".to_string()).chain((0..watched).map(|i| format!("0xextra{:034x}", i))),
    ));
    let config = ListenerConfig::default()
        .with_confirmation_depth(12)
        .with_poll_interval(Duration::from_secs(1))
        .with_channel_capacity(1_000_000);
    PollingListener::new(Network::ETH, source, store, config)
}

fn bench_catch_up(c: &mut Criterion) {
    let runtime = Runtime::new().expect("Failed to create runtime");
    let mut group = c.benchmark_group("poll_catch_up");

    for blocks in [10u64, 100, 1000].iter() {
        let source = create_test_chain(*blocks, 50);
        group.bench_with_input(BenchmarkId::new("blocks", blocks), blocks, |b, _| {
            b.iter(|| {
                let mut listener = create_listener(Arc::clone(&source), 100);
                let _events = listener.take_events();
                let outcome = runtime.block_on(listener.poll_once()).expect("poll failed");
                black_box(outcome);
            });
        });
    }

    group.finish();
}

fn bench_watch_set_size(c: &mut Criterion) {
    let runtime = Runtime::new().expect("Failed to create runtime");
    let source = create_test_chain(100, 50);
    let mut group = c.benchmark_group("poll_watch_set");

    for watched in [1usize, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("addresses", watched), watched, |b, &watched| {
            b.iter(|| {
                let mut listener = create_listener(Arc::clone(&source), watched);
                let _events = listener.take_events();
                black_box(runtime.block_on(listener.poll_once()).expect("poll failed"));
            });
        });
    }

    group.finish();
}

fn bench_idle_poll(c: &mut Criterion) {
    let runtime = Runtime::new().expect("Failed to create runtime");
    let source = create_test_chain(100, 10);
    let mut listener = create_listener(source, 10);
    let _events = listener.take_events();
    runtime.block_on(listener.poll_once()).expect("poll failed");

    // Nothing new at the head: one height query and a confirmation sweep
    c.bench_function("poll_idle_head", |b| {
        b.iter(|| black_box(runtime.block_on(listener.poll_once()).expect("poll failed")));
    });
}

criterion_group!(benches, bench_catch_up, bench_watch_set_size, bench_idle_poll);
criterion_main!(benches);
