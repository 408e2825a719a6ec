use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::blockchain::listener::{BlockListener, EventStream};
use crate::error::{HandlerError, ListenerError, Result};
use crate::logging::{ErrorLogger, LogContext};
use crate::models::{ChainEvent, Network};

/// Application callback fed by every registered listener.
///
/// Failures are logged per event and never stop delivery of later events.
/// Any `Fn(&ChainEvent) -> Result<(), HandlerError>` closure qualifies.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &ChainEvent) -> std::result::Result<(), HandlerError>;
}

#[async_trait]
impl<F> EventHandler for F
where
    F: Fn(&ChainEvent) -> std::result::Result<(), HandlerError> + Send + Sync,
{
    async fn handle(&self, event: &ChainEvent) -> std::result::Result<(), HandlerError> {
        self(event)
    }
}

/// Supervises one listener per network and fans their streams into one handler
pub struct ListenerManager {
    listeners: BTreeMap<Network, Box<dyn BlockListener>>,
    handler: Arc<dyn EventHandler>,
    drains: Vec<(Network, JoinHandle<u64>)>,
}

impl ListenerManager {
    pub fn new<H>(handler: H) -> Self
    where
        H: EventHandler + 'static,
    {
        Self::with_shared_handler(Arc::new(handler))
    }

    /// Use a handler the caller keeps a reference to
    pub fn with_shared_handler(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            listeners: BTreeMap::new(),
            handler,
            drains: Vec::new(),
        }
    }

    /// Register the listener for `network`; a later registration for the same key replaces it
    pub fn register(&mut self, network: Network, listener: Box<dyn BlockListener>) {
        if self.listeners.insert(network.clone(), listener).is_some() {
            warn!("[{}] Replaced previously registered listener", network);
        }
    }

    pub fn networks(&self) -> Vec<Network> {
        self.listeners.keys().cloned().collect()
    }

    /// Start every listener, in ascending network order, each with its own draining task.
    ///
    /// Stops at the first listener that fails to start. Listeners started
    /// before it keep running and are drained; `stop_all` shuts them down.
    pub async fn start_all(&mut self, cancel: &CancellationToken) -> Result<()> {
        for (network, listener) in self.listeners.iter_mut() {
            if let Err(e) = listener.start(cancel.clone()).await {
                ErrorLogger::log_error(&e, Some(LogContext::new("listener_manager", "start").with_network(network)));
                return Err(e);
            }

            let events = listener
                .take_events()
                .ok_or_else(|| ListenerError::EventsUnavailable(network.clone()))?;

            let drain = tokio::spawn(drain_events(network.clone(), events, Arc::clone(&self.handler)));
            self.drains.push((network.clone(), drain));
        }

        info!("All listeners started (count: {})", self.listeners.len());
        Ok(())
    }

    /// Stop every listener, then wait for their streams to drain into the handler.
    ///
    /// A failing listener does not keep the others running; all failures are
    /// reported together.
    pub async fn stop_all(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        for (network, listener) in self.listeners.iter_mut() {
            if let Err(e) = listener.stop().await {
                ErrorLogger::log_error(&e, Some(LogContext::new("listener_manager", "stop").with_network(network)));
                failures.push((network.clone(), e.to_string()));
            }
        }

        for (network, drain) in self.drains.drain(..) {
            if failures.iter().any(|(failed, _)| *failed == network) {
                // Its stream may never close
                drain.abort();
                continue;
            }
            match drain.await {
                Ok(handled) => debug!("[{}] Drained {} events", network, handled),
                Err(e) => failures.push((network, format!("draining task failed: {}", e))),
            }
        }

        if failures.is_empty() {
            info!("All listeners stopped");
            Ok(())
        } else {
            Err(ListenerError::Shutdown { failures })
        }
    }

    /// Watch `address` on the listener registered for `network`
    pub fn watch(&self, network: &Network, address: &str) -> Result<()> {
        self.listener(network)?.watch_address(address)
    }

    pub fn unwatch(&self, network: &Network, address: &str) -> Result<()> {
        self.listener(network)?.unwatch_address(address)
    }

    fn listener(&self, network: &Network) -> Result<&dyn BlockListener> {
        self.listeners
            .get(network)
            .map(|listener| &**listener)
            .ok_or_else(|| ListenerError::UnregisteredNetwork(network.clone()))
    }
}

async fn drain_events(network: Network, mut events: EventStream, handler: Arc<dyn EventHandler>) -> u64 {
    let mut handled = 0;
    while let Some(event) = events.recv().await {
        if let Err(error) = handler.handle(&event).await {
            ErrorLogger::log_handler_failure(&event, &error);
        }
        handled += 1;
    }
    debug!("[{}] Event stream exhausted", network);
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::listener::{ListenerConfig, PollingListener};
    use crate::blockchain::source::MemoryBlockSource;
    use crate::models::{BlockSummary, TxSummary};
    use crate::storage::{MemoryWatchStore, WatchStore};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    fn ok_handler() -> impl EventHandler {
        |_: &ChainEvent| -> std::result::Result<(), HandlerError> { Ok(()) }
    }

    fn test_listener(network: Network) -> (PollingListener, Arc<MemoryWatchStore>, Arc<MemoryBlockSource>) {
        let store = Arc::new(MemoryWatchStore::new());
        let source = Arc::new(MemoryBlockSource::new());
        let config = ListenerConfig::default()
            .with_confirmation_depth(3)
            .with_poll_interval(Duration::from_millis(20));
        let listener = PollingListener::new(network, source.clone(), store.clone(), config);
        (listener, store, source)
    }

    #[test]
    fn test_register_and_watch() {
        let mut manager = ListenerManager::new(ok_handler());
        let (listener, store, _) = test_listener(Network::ETH);
        manager.register(Network::ETH, Box::new(listener));

        manager.watch(&Network::ETH, "0xaddr").unwrap();
        assert!(store.contains("0xaddr").unwrap());

        manager.unwatch(&Network::ETH, "0xaddr").unwrap();
        assert!(!store.contains("0xaddr").unwrap());
    }

    #[test]
    fn test_unknown_network() {
        let manager = ListenerManager::new(ok_handler());
        let result = manager.watch(&Network::BTC, "1abc");
        assert!(matches!(result, Err(ListenerError::UnregisteredNetwork(n)) if n == Network::BTC));
    }

    #[test]
    fn test_last_registration_wins() {
        let mut manager = ListenerManager::new(ok_handler());
        let (first, first_store, _) = test_listener(Network::ETH);
        let (second, second_store, _) = test_listener(Network::ETH);

        manager.register(Network::ETH, Box::new(first));
        manager.register(Network::ETH, Box::new(second));
        assert_eq!(manager.networks(), vec![Network::ETH]);

        manager.watch(&Network::ETH, "0xaddr").unwrap();
        assert!(!first_store.contains("0xaddr").unwrap());
        assert!(second_store.contains("0xaddr").unwrap());
    }

    #[tokio::test]
    async fn test_start_all_feeds_handler_until_stop() {
        let handled = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&handled);
        let mut manager = ListenerManager::new(move |_: &ChainEvent| -> std::result::Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let (listener, _, source) = test_listener(Network::ETH);
        source.add_block(BlockSummary::new(1, "h1").with_transaction(TxSummary::new("tx1", "0xsender", "0xaddr", 100)));
        manager.register(Network::ETH, Box::new(listener));
        manager.watch(&Network::ETH, "0xaddr").unwrap();

        manager.start_all(&CancellationToken::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        manager.stop_all().await.unwrap();

        assert_eq!(handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_stop_draining() {
        let handled = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&handled);
        let mut manager = ListenerManager::new(move |_: &ChainEvent| -> std::result::Result<(), HandlerError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::from("downstream unavailable"))
        });

        let (listener, _, source) = test_listener(Network::TRX);
        source.add_block(
            BlockSummary::new(1, "h1")
                .with_transaction(TxSummary::new("tx1", "Tsender", "Taddr", 1))
                .with_transaction(TxSummary::new("tx2", "Taddr", "Tother", 2)),
        );
        source.extend_empty_to(4);
        manager.register(Network::TRX, Box::new(listener));
        manager.watch(&Network::TRX, "Taddr").unwrap();

        manager.start_all(&CancellationToken::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        manager.stop_all().await.unwrap();

        // Two detections and two confirmations, all delivered despite failures
        assert_eq!(handled.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_start_failure_is_reported() {
        let mut manager = ListenerManager::new(ok_handler());
        let (mut listener, _, _) = test_listener(Network::ETH);
        listener.stop().await.unwrap();
        manager.register(Network::ETH, Box::new(listener));

        let result = manager.start_all(&CancellationToken::new()).await;
        assert!(matches!(result, Err(ListenerError::Stopped(_))));
    }
}
