//! Polling listener: one per network.
//!
//! The poll task exclusively owns the cursor, the seen-hash window and the
//! pending-event ledger. Nothing else reads or writes them while the task
//! runs; `poll_once`, `rewind_to` and `status` only work while idle.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blockchain::source::{BlockSource, SourceError};
use crate::error::{ListenerError, Result};
use crate::logging::{ErrorLogger, LogContext, MetricsLogger};
use crate::models::{BlockSummary, ChainEvent, Network};
use crate::storage::WatchStore;

/// Depth used when a listener is configured with zero confirmations
pub const DEFAULT_CONFIRMATION_DEPTH: u64 = 12;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Receiving side of a listener's bounded event stream
pub type EventStream = mpsc::Receiver<ChainEvent>;

#[derive(Debug, Clone, PartialEq)]
pub struct ListenerConfig {
    pub confirmation_depth: u64,
    pub poll_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            confirmation_depth: DEFAULT_CONFIRMATION_DEPTH,
            poll_interval: Duration::from_secs(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ListenerConfig {
    pub fn with_confirmation_depth(mut self, depth: u64) -> Self {
        self.confirmation_depth = depth;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Replace zero values with usable defaults
    fn normalized(mut self) -> Self {
        if self.confirmation_depth == 0 {
            self.confirmation_depth = DEFAULT_CONFIRMATION_DEPTH;
        }
        if self.poll_interval.is_zero() {
            self.poll_interval = Duration::from_millis(1);
        }
        if self.channel_capacity == 0 {
            self.channel_capacity = DEFAULT_CHANNEL_CAPACITY;
        }
        self
    }
}

/// What one poll cycle did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollOutcome {
    pub latest: u64,
    pub blocks_processed: u64,
    pub detected: u64,
    pub confirmed: u64,
    pub reorged: u64,
}

/// Snapshot of an idle listener's bookkeeping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerStatus {
    pub network: Network,
    pub last_block: u64,
    pub seen_hashes: usize,
    pub max_seen_block: Option<u64>,
    pub pending_blocks: usize,
    pub pending_events: usize,
}

/// A per-network source of chain events that a manager can supervise
#[async_trait]
pub trait BlockListener: Send {
    fn network(&self) -> &Network;

    /// Spawn the poll loop under a child of `cancel`
    async fn start(&mut self, cancel: CancellationToken) -> Result<()>;

    /// Cancel the poll loop, wait for it to exit, then close the event stream
    async fn stop(&mut self) -> Result<()>;

    fn watch_address(&self, address: &str) -> Result<()>;

    fn unwatch_address(&self, address: &str) -> Result<()>;

    /// Hand out the event stream; only the first call returns it
    fn take_events(&mut self) -> Option<EventStream>;
}

/// Single-writer state driven by the poll task
struct PollState {
    network: Network,
    source: Arc<dyn BlockSource>,
    watch_store: Arc<dyn WatchStore>,
    confirmation_depth: u64,
    last_block: u64,
    block_hashes: BTreeMap<u64, String>,
    pending: BTreeMap<u64, Vec<ChainEvent>>,
    events: mpsc::Sender<ChainEvent>,
}

async fn until_cancelled<T, F>(cancel: &CancellationToken, query: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, SourceError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ListenerError::Cancelled),
        result = query => result.map_err(ListenerError::from),
    }
}

impl PollState {
    async fn poll(&mut self, cancel: &CancellationToken) -> Result<PollOutcome> {
        let latest = until_cancelled(cancel, self.source.latest_height()).await?;
        let mut outcome = PollOutcome {
            latest,
            ..PollOutcome::default()
        };

        if latest > self.last_block {
            let watched: HashSet<String> = self.watch_store.list()?.into_iter().collect();

            for number in self.last_block + 1..=latest {
                if cancel.is_cancelled() {
                    return Err(ListenerError::Cancelled);
                }
                let block = until_cancelled(cancel, self.source.block(number)).await?;
                self.process_block(block, &watched, cancel, &mut outcome).await?;
                outcome.blocks_processed += 1;
            }
        }

        self.sweep_confirmations(latest, cancel, &mut outcome).await?;
        Ok(outcome)
    }

    async fn process_block(
        &mut self,
        block: BlockSummary,
        watched: &HashSet<String>,
        cancel: &CancellationToken,
        outcome: &mut PollOutcome,
    ) -> Result<()> {
        let number = block.number;

        let previous = self.block_hashes.get(&number).cloned();
        let mut matched: HashSet<String> = HashSet::new();
        match previous.as_deref() {
            Some(previous) if previous == block.hash => {
                // Re-fetched after a rewind; still-pending matches are not emitted twice
                debug!("[{}] Block {} unchanged, rescanning", self.network, number);
                if let Some(pending) = self.pending.get(&number) {
                    matched.extend(pending.iter().map(|event| event.tx_hash.clone()));
                }
            }
            Some(previous) => {
                let max_known = self.block_hashes.keys().next_back().copied();
                MetricsLogger::log_reorg(&self.network, number, previous, &block.hash, max_known);
                self.invalidate_from(number, cancel, outcome).await?;
            }
            None => {}
        }

        self.block_hashes.insert(number, block.hash.clone());
        self.last_block = number;
        self.prune_hashes();

        for tx in &block.transactions {
            if !tx.touches(|address| watched.contains(address)) || !matched.insert(tx.hash.clone()) {
                continue;
            }

            let event = ChainEvent::detected(self.network.clone(), number, tx);
            self.emit(event.clone(), cancel).await?;
            self.pending.entry(number).or_default().push(event);
            outcome.detected += 1;
        }

        Ok(())
    }

    /// Retract every pending event at or above `from` and forget the hashes
    /// of the replaced branch.
    ///
    /// Pending blocks above the window's highest entry are retracted too, so
    /// a reorg deeper than the window still leaves nothing pending behind.
    async fn invalidate_from(&mut self, from: u64, cancel: &CancellationToken, outcome: &mut PollOutcome) -> Result<()> {
        let stale = self.pending.split_off(&from);
        let mut stale = stale.into_iter();

        while let Some((block_number, events)) = stale.next() {
            let mut remaining = events.into_iter();
            while let Some(event) = remaining.next() {
                if let Err(e) = self.emit(event.clone().into_reorged(), cancel).await {
                    // Put back what was never retracted
                    let mut unsent = vec![event];
                    unsent.extend(remaining);
                    self.pending.insert(block_number, unsent);
                    self.pending.extend(stale);
                    return Err(e);
                }
                outcome.reorged += 1;
            }
        }

        let _ = self.block_hashes.split_off(&from);
        Ok(())
    }

    /// Emit confirmations, oldest block first, for every pending block buried
    /// at least `confirmation_depth` deep under `latest`
    async fn sweep_confirmations(&mut self, latest: u64, cancel: &CancellationToken, outcome: &mut PollOutcome) -> Result<()> {
        let Some(threshold) = latest.checked_sub(self.confirmation_depth) else {
            return Ok(());
        };

        while let Some(entry) = self.pending.first_entry() {
            if *entry.key() > threshold {
                break;
            }
            let (block_number, events) = entry.remove_entry();

            let mut remaining = events.into_iter();
            while let Some(event) = remaining.next() {
                if let Err(e) = self.emit(event.clone().into_confirmed(), cancel).await {
                    let mut unsent = vec![event];
                    unsent.extend(remaining);
                    self.pending.insert(block_number, unsent);
                    return Err(e);
                }
                outcome.confirmed += 1;
            }
        }

        Ok(())
    }

    /// Keep only the `confirmation_depth + 2` heights ending at the window's
    /// highest key, which after a rewind may sit above the cursor
    fn prune_hashes(&mut self) {
        let Some(&highest) = self.block_hashes.keys().next_back() else {
            return;
        };
        if let Some(floor) = highest.checked_sub(self.confirmation_depth.saturating_add(1)) {
            self.block_hashes = self.block_hashes.split_off(&floor);
        }
    }

    /// Push into the bounded stream, giving up if cancelled while waiting for room
    async fn emit(&self, event: ChainEvent, cancel: &CancellationToken) -> Result<()> {
        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ListenerError::Cancelled),
            sent = self.events.send(event.clone()) => sent,
        };
        sent.map_err(|_| ListenerError::StreamClosed)?;
        MetricsLogger::log_event(&event);
        Ok(())
    }

    fn status(&self) -> ListenerStatus {
        ListenerStatus {
            network: self.network.clone(),
            last_block: self.last_block,
            seen_hashes: self.block_hashes.len(),
            max_seen_block: self.block_hashes.keys().next_back().copied(),
            pending_blocks: self.pending.len(),
            pending_events: self.pending.values().map(Vec::len).sum(),
        }
    }
}

async fn run_poll_loop(mut state: PollState, poll_interval: Duration, cancel: CancellationToken) -> PollState {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        match state.poll(&cancel).await {
            Ok(outcome) => MetricsLogger::log_poll_cycle(
                &state.network,
                outcome.latest,
                outcome.blocks_processed,
                outcome.detected,
                outcome.confirmed,
                outcome.reorged,
                started.elapsed().as_millis() as u64,
            ),
            Err(ListenerError::Cancelled) => break,
            Err(ListenerError::StreamClosed) => {
                warn!("[{}] Event stream receiver dropped, stopping poll loop", state.network);
                break;
            }
            Err(error) => ErrorLogger::log_error(
                &error,
                Some(
                    LogContext::new("listener", "poll")
                        .with_network(&state.network)
                        .with_block_number(state.last_block),
                ),
            ),
        }
    }

    debug!("[{}] Poll loop exited at block {}", state.network, state.last_block);
    state
}

/// Listener that polls a [`BlockSource`] on a fixed interval
pub struct PollingListener {
    network: Network,
    config: ListenerConfig,
    watch_store: Arc<dyn WatchStore>,
    state: Option<PollState>,
    events: Option<EventStream>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<PollState>>,
}

impl PollingListener {
    pub fn new(
        network: Network,
        source: Arc<dyn BlockSource>,
        watch_store: Arc<dyn WatchStore>,
        config: ListenerConfig,
    ) -> Self {
        let config = config.normalized();
        let (sender, receiver) = mpsc::channel(config.channel_capacity);

        let state = PollState {
            network: network.clone(),
            source,
            watch_store: Arc::clone(&watch_store),
            confirmation_depth: config.confirmation_depth,
            last_block: 0,
            block_hashes: BTreeMap::new(),
            pending: BTreeMap::new(),
            events: sender,
        };

        Self {
            network,
            config,
            watch_store,
            state: Some(state),
            events: Some(receiver),
            cancel: None,
            task: None,
        }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    fn idle_state(&mut self) -> Result<&mut PollState> {
        if self.task.is_some() {
            return Err(ListenerError::Running(self.network.clone()));
        }
        self.state
            .as_mut()
            .ok_or_else(|| ListenerError::Stopped(self.network.clone()))
    }

    /// Run one poll cycle on the caller's task
    pub async fn poll_once(&mut self) -> Result<PollOutcome> {
        let cancel = CancellationToken::new();
        self.idle_state()?.poll(&cancel).await
    }

    /// Move the cursor back so the next cycle re-fetches blocks after `block`.
    ///
    /// Administrative; normal operation only moves the cursor forward.
    pub fn rewind_to(&mut self, block: u64) -> Result<()> {
        let state = self.idle_state()?;
        info!("[{}] Rewinding cursor from {} to {}", state.network, state.last_block, block);
        state.last_block = block;
        Ok(())
    }

    pub fn status(&mut self) -> Result<ListenerStatus> {
        Ok(self.idle_state()?.status())
    }
}

#[async_trait]
impl BlockListener for PollingListener {
    fn network(&self) -> &Network {
        &self.network
    }

    async fn start(&mut self, cancel: CancellationToken) -> Result<()> {
        if self.task.is_some() {
            return Err(ListenerError::AlreadyStarted(self.network.clone()));
        }
        let state = self
            .state
            .take()
            .ok_or_else(|| ListenerError::Stopped(self.network.clone()))?;

        LogContext::new("listener", "start")
            .with_network(&self.network)
            .with_metadata("poll_interval_ms", serde_json::json!(self.config.poll_interval.as_millis() as u64))
            .with_metadata("confirmation_depth", serde_json::json!(self.config.confirmation_depth))
            .info("Starting block listener");

        let cancel = cancel.child_token();
        self.task = Some(tokio::spawn(run_poll_loop(state, self.config.poll_interval, cancel.clone())));
        self.cancel = Some(cancel);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }

        let joined = match self.task.take() {
            Some(task) => task
                .await
                .map(drop)
                .map_err(|e| ListenerError::TaskJoin(e.to_string())),
            None => Ok(()),
        };

        // Dropping the state drops the only sender, closing the stream once drained
        self.state = None;
        info!("[{}] Listener stopped", self.network);
        joined
    }

    fn watch_address(&self, address: &str) -> Result<()> {
        self.watch_store.add(address)?;
        info!("[{}] Watching address {}", self.network, address);
        Ok(())
    }

    fn unwatch_address(&self, address: &str) -> Result<()> {
        self.watch_store.remove(address)?;
        info!("[{}] Unwatched address {}", self.network, address);
        Ok(())
    }

    fn take_events(&mut self) -> Option<EventStream> {
        self.events.take()
    }
}

impl Drop for PollingListener {
    fn drop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}
