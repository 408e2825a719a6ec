pub mod source;
pub mod listener;
pub mod manager;
pub mod simulator;

pub use source::{BlockSource, MemoryBlockSource, SourceError};
pub use listener::{
    BlockListener, EventStream, ListenerConfig, ListenerStatus, PollOutcome, PollingListener,
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONFIRMATION_DEPTH,
};
pub use manager::{EventHandler, ListenerManager};
pub use simulator::{ChainSimulator, SimulatorConfig};
