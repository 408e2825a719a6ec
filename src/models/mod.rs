pub mod block;
pub mod event;

pub use block::{BlockSummary, TxSummary};
pub use event::{ChainEvent, Network};
