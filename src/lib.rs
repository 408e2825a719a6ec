pub mod blockchain;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod storage;

pub use blockchain::{
    BlockListener, BlockSource, ChainSimulator, EventHandler, EventStream, ListenerConfig, ListenerManager,
    ListenerStatus, MemoryBlockSource, PollOutcome, PollingListener, SimulatorConfig, SourceError,
};
pub use config::{AppConfig, ListenerSettings, LoggingConfig, NetworkConfig, SimulationConfig, StorageConfig};
pub use error::{ConfigError, ErrorSeverity, HandlerError, ListenerError, Result};
pub use logging::{init_logging, ErrorLogger, LogContext, MetricsLogger};
pub use models::{BlockSummary, ChainEvent, Network, TxSummary};
pub use storage::{MemoryWatchStore, SqliteWatchStore, StorageError, WatchStore};
