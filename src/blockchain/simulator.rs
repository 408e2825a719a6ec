use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::blockchain::source::MemoryBlockSource;
use crate::models::{BlockSummary, Network, TxSummary};

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub block_interval: Duration,
    pub transfers_per_block: usize,
    /// Chance that the tip is replaced before the next block is minted
    pub reorg_probability: f64,
    /// Addresses that take part in roughly half of the generated transfers
    pub addresses: Vec<String>,
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_secs(1),
            transfers_per_block: 4,
            reorg_probability: 0.0,
            addresses: Vec::new(),
            seed: None,
        }
    }
}

/// Grows a [`MemoryBlockSource`] with random transfer traffic.
///
/// A tip replacement only surfaces as a reorg to listeners that fetch that
/// height again; listeners already past it keep the old content.
pub struct ChainSimulator {
    network: Network,
    source: Arc<MemoryBlockSource>,
    config: SimulatorConfig,
    rng: StdRng,
    next_tx: u64,
}

impl ChainSimulator {
    pub fn new(network: Network, source: Arc<MemoryBlockSource>, mut config: SimulatorConfig) -> Self {
        config.reorg_probability = config.reorg_probability.clamp(0.0, 1.0);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            network,
            source,
            config,
            rng,
            next_tx: 0,
        }
    }

    /// Append a block on top of the current head
    pub fn mint_block(&mut self) -> BlockSummary {
        let number = self.source.head() + 1;
        let block = self.generate_block(number);
        self.source.add_block(block.clone());
        debug!(
            "[{}] Minted block {} with {} transfers",
            self.network,
            number,
            block.transactions.len()
        );
        block
    }

    /// Replace the head block with fresh content, returning its height
    pub fn reorg_tip(&mut self) -> Option<u64> {
        let number = self.source.head();
        if number == 0 {
            return None;
        }
        let replacement = self.generate_block(number);
        let replaced = self.source.replace_block(replacement.clone())?;
        info!(
            "[{}] Simulated reorg at block {}: {} -> {}",
            self.network, number, replaced.hash, replacement.hash
        );
        Some(number)
    }

    /// One simulated block interval: maybe reorg the tip, then mint
    pub fn step(&mut self) -> BlockSummary {
        if self.rng.gen_bool(self.config.reorg_probability) {
            self.reorg_tip();
        }
        self.mint_block()
    }

    /// Mint blocks every `block_interval` until cancelled, returning how many were minted
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.block_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut minted = 0;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                self.step();
                minted += 1;
            }

            info!("[{}] Simulator stopped after {} blocks", self.network, minted);
            minted
        })
    }

    fn generate_block(&mut self, number: u64) -> BlockSummary {
        let hash = format!("{}-{:016x}", number, self.rng.gen::<u64>());
        let mut block = BlockSummary::new(number, hash);

        for _ in 0..self.config.transfers_per_block {
            self.next_tx += 1;
            let tx_hash = format!("{}-tx-{:08}", self.network.as_str().to_lowercase(), self.next_tx);
            let (from, to) = self.pick_endpoints();
            let amount = self.rng.gen_range(1..=1_000_000u128);
            block = block.with_transaction(TxSummary::new(tx_hash, from, to, amount));
        }

        block
    }

    fn pick_endpoints(&mut self) -> (String, String) {
        let outsider = |rng: &mut StdRng| format!("ext-{:06x}", rng.gen_range(0..0xffffffu32));

        if self.config.addresses.is_empty() || !self.rng.gen_bool(0.5) {
            return (outsider(&mut self.rng), outsider(&mut self.rng));
        }

        let index = self.rng.gen_range(0..self.config.addresses.len());
        let watched = self.config.addresses[index].clone();
        if self.rng.gen_bool(0.5) {
            (outsider(&mut self.rng), watched)
        } else {
            (watched, outsider(&mut self.rng))
        }
    }
}
