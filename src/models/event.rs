use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use crate::models::TxSummary;

/// Key identifying one chain; any string works, the constants cover the stock deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Network(Cow<'static, str>);

impl Network {
    pub const BTC: Network = Network(Cow::Borrowed("BTC"));
    pub const ETH: Network = Network(Cow::Borrowed("ETH"));
    pub const TRX: Network = Network(Cow::Borrowed("TRX"));

    pub fn new(name: impl Into<String>) -> Self {
        Network(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Network {
    fn from(name: &str) -> Self {
        Network::new(name)
    }
}

impl From<String> for Network {
    fn from(name: String) -> Self {
        Network::new(name)
    }
}

/// One lifecycle transition of a watched transaction.
///
/// A match is first emitted with both flags false. It is later re-emitted
/// exactly once more, either with `confirmed` set once enough blocks sit on
/// top of it, or with `reorged` set when its block was replaced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainEvent {
    pub network: Network,
    pub block_number: u64,
    pub tx_hash: String,
    pub from: String,
    pub to: String,
    pub amount: u128,
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reorged: bool,
}

impl ChainEvent {
    /// Unconfirmed event for a transaction matched in `block_number`
    pub fn detected(network: Network, block_number: u64, tx: &TxSummary) -> Self {
        Self {
            network,
            block_number,
            tx_hash: tx.hash.clone(),
            from: tx.from.clone(),
            to: tx.to.clone(),
            amount: tx.amount,
            confirmed: false,
            reorged: false,
        }
    }

    pub fn into_confirmed(mut self) -> Self {
        self.confirmed = true;
        self.reorged = false;
        self
    }

    pub fn into_reorged(mut self) -> Self {
        self.reorged = true;
        self.confirmed = false;
        self
    }

    pub fn is_pending(&self) -> bool {
        !self.confirmed && !self.reorged
    }
}
