use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::models::BlockSummary;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Block source unavailable: {0}")]
    Unavailable(String),
    #[error("Block not found: {number}")]
    BlockNotFound { number: u64 },
}

/// Read-only view of a chain: the current head and the blocks below it.
///
/// Implementations bound their own latency; the listener waits on each call
/// until it returns or the listener is cancelled.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Current chain head height
    async fn latest_height(&self) -> Result<u64, SourceError>;

    /// Hash and transactions of the block at `number`
    async fn block(&self, number: u64) -> Result<BlockSummary, SourceError>;
}

#[derive(Debug, Default)]
struct ChainState {
    blocks: BTreeMap<u64, BlockSummary>,
    failures_remaining: u32,
    fail_block: Option<u64>,
}

impl ChainState {
    fn take_failure(&mut self) -> bool {
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return true;
        }
        false
    }
}

/// In-memory chain whose head is the highest block added.
///
/// Used by tests, benchmarks and the demo simulator; supports replacing
/// blocks to model reorganizations and injecting query failures.
#[derive(Debug, Default)]
pub struct MemoryBlockSource {
    state: Mutex<ChainState>,
}

impl MemoryBlockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a block
    pub fn add_block(&self, block: BlockSummary) {
        if let Ok(mut state) = self.state.lock() {
            state.blocks.insert(block.number, block);
        }
    }

    /// Overwrite a block, returning the one it replaced
    pub fn replace_block(&self, block: BlockSummary) -> Option<BlockSummary> {
        self.state
            .lock()
            .ok()
            .and_then(|mut state| state.blocks.insert(block.number, block))
    }

    /// Drop every block at or above `number`, lowering the head
    pub fn truncate_from(&self, number: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.blocks.split_off(&number);
        }
    }

    /// Append empty blocks until the head reaches `height`
    pub fn extend_empty_to(&self, height: u64) {
        if let Ok(mut state) = self.state.lock() {
            let start = state.blocks.keys().next_back().map_or(1, |head| head + 1);
            for number in start..=height {
                state
                    .blocks
                    .insert(number, BlockSummary::new(number, format!("hash-{}", number)));
            }
        }
    }

    /// Make the next `count` queries of any kind fail
    pub fn fail_next(&self, count: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.failures_remaining = count;
        }
    }

    /// Make every fetch of block `number` fail until cleared with `None`
    pub fn fail_block(&self, number: Option<u64>) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_block = number;
        }
    }

    pub fn head(&self) -> u64 {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.blocks.keys().next_back().copied())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ChainState>, SourceError> {
        self.state
            .lock()
            .map_err(|_| SourceError::Unavailable("chain state poisoned".to_string()))
    }
}

#[async_trait]
impl BlockSource for MemoryBlockSource {
    async fn latest_height(&self) -> Result<u64, SourceError> {
        let mut state = self.lock()?;
        if state.take_failure() {
            return Err(SourceError::Unavailable("injected failure".to_string()));
        }
        Ok(state.blocks.keys().next_back().copied().unwrap_or(0))
    }

    async fn block(&self, number: u64) -> Result<BlockSummary, SourceError> {
        let mut state = self.lock()?;
        if state.take_failure() || state.fail_block == Some(number) {
            return Err(SourceError::Unavailable(format!("injected failure at block {}", number)));
        }
        state
            .blocks
            .get(&number)
            .cloned()
            .ok_or(SourceError::BlockNotFound { number })
    }
}
