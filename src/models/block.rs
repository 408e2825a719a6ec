use serde::{Deserialize, Serialize};

/// A block as returned by a block source: its hash and the transactions it carries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockSummary {
    pub number: u64,
    pub hash: String,
    pub transactions: Vec<TxSummary>,
}

/// Minimal transaction shape needed for address matching
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxSummary {
    pub hash: String,
    pub from: String,
    pub to: String,
    pub amount: u128,
}

impl BlockSummary {
    pub fn new(number: u64, hash: impl Into<String>) -> Self {
        Self {
            number,
            hash: hash.into(),
            transactions: Vec::new(),
        }
    }

    pub fn with_transaction(mut self, tx: TxSummary) -> Self {
        self.transactions.push(tx);
        self
    }
}

impl TxSummary {
    pub fn new(hash: impl Into<String>, from: impl Into<String>, to: impl Into<String>, amount: u128) -> Self {
        Self {
            hash: hash.into(),
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    /// True when either side of the transfer is in `is_watched`
    pub fn touches<F>(&self, is_watched: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        is_watched(&self.from) || is_watched(&self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_block_builder() {
        let block = BlockSummary::new(7, "0xblock7")
            .with_transaction(TxSummary::new("tx1", "0xa", "0xb", 10))
            .with_transaction(TxSummary::new("tx2", "0xb", "0xc", 20));

        assert_eq!(block.number, 7);
        assert_eq!(block.hash, "0xblock7");
        assert_eq!(block.transactions.len(), 2);
        assert_eq!(block.transactions[1].amount, 20);
    }

    #[test]
    fn test_tx_touches_either_side() {
        let watched: HashSet<&str> = ["0xwatched"].into_iter().collect();

        let inbound = TxSummary::new("tx1", "0xother", "0xwatched", 1);
        let outbound = TxSummary::new("tx2", "0xwatched", "0xother", 1);
        let unrelated = TxSummary::new("tx3", "0xother", "0xanother", 1);

        assert!(inbound.touches(|a| watched.contains(a)));
        assert!(outbound.touches(|a| watched.contains(a)));
        assert!(!unrelated.touches(|a| watched.contains(a)));
    }

    #[test]
    fn test_block_summary_serialization() {
        let block = BlockSummary::new(1, "h1").with_transaction(TxSummary::new("tx1", "0xs", "0xr", 100));

        let json = serde_json::to_string(&block).expect("Failed to serialize");
        assert!(json.contains("\"number\":1"));
        assert!(json.contains("\"amount\":100"));

        let deserialized: BlockSummary = serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(block, deserialized);
    }
}
