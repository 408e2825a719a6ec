use chain_event_listener::{
    init_logging, AppConfig, ChainEvent, ChainSimulator, ErrorLogger, HandlerError, ListenerManager, LogContext,
    MemoryBlockSource, MemoryWatchStore, Network, PollingListener, SqliteWatchStore, WatchStore,
};
use clap::Parser;
use log::info;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "chain-listener")]
#[command(about = "Watches simulated chains and reports transfers touching watched addresses")]
#[command(version = "0.1.0")]
struct Args {
    /// Configuration file (defaults to $CONFIG_FILE or ./config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    run_secs: Option<u64>,

    /// Print a sample configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", AppConfig::generate_sample_config()?);
        return Ok(());
    }

    let config = AppConfig::load_with(args.config.as_deref())?;
    init_logging(&config.logging)?;

    let networks = config.network_keys();
    info!(
        "Starting chain listener (networks: {}, storage: {})",
        networks.iter().map(Network::as_str).collect::<Vec<_>>().join(", "),
        config.storage.backend
    );

    // Events go to stdout as JSON lines; logs stay on stderr
    let mut manager = ListenerManager::new(|event: &ChainEvent| -> Result<(), HandlerError> {
        let line = serde_json::to_string(event).map_err(|e| HandlerError(e.to_string()))?;
        println!("{}", line);
        Ok(())
    });

    let shared_sqlite = match config.storage.backend.as_str() {
        "sqlite" => match networks.first() {
            Some(network) => Some(SqliteWatchStore::open(&config.storage.path, network.clone())?),
            None => None,
        },
        _ => None,
    };

    let simulation_cancel = CancellationToken::new();
    let mut simulators = Vec::new();

    for (index, network) in networks.iter().enumerate() {
        let source = Arc::new(MemoryBlockSource::new());

        let mut simulator_config = config.simulator_config();
        simulator_config.seed = simulator_config.seed.map(|seed| seed.wrapping_add(index as u64));
        let simulator = ChainSimulator::new(network.clone(), Arc::clone(&source), simulator_config);
        simulators.push(simulator.spawn(simulation_cancel.clone()));

        let watch_store: Arc<dyn WatchStore> = match &shared_sqlite {
            Some(store) => Arc::new(store.for_network(network.clone())),
            None => Arc::new(MemoryWatchStore::new()),
        };

        let listener = PollingListener::new(
            network.clone(),
            source,
            watch_store,
            config.listener_config_for(network),
        );
        manager.register(network.clone(), Box::new(listener));

        for address in &config.simulation.watched_addresses {
            manager.watch(network, address)?;
        }
    }

    let cancel = CancellationToken::new();
    if let Err(e) = manager.start_all(&cancel).await {
        // Listeners started before the failure are still running
        simulation_cancel.cancel();
        let _ = manager.stop_all().await;
        return Err(e.into());
    }

    let deadline = async {
        match args.run_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl-C, shutting down");
        }
        _ = deadline => info!("Run time elapsed, shutting down"),
    }

    simulation_cancel.cancel();
    for simulator in simulators {
        if let Err(e) = simulator.await {
            LogContext::new("main", "shutdown")
                .with_metadata("error", serde_json::json!(e.to_string()))
                .warn("Simulator task failed");
        }
    }

    let stopped = manager.stop_all().await;
    cancel.cancel();

    if let Err(e) = stopped {
        ErrorLogger::log_error(&e, Some(LogContext::new("main", "shutdown")));
        return Err(e.into());
    }

    info!("Chain listener stopped");
    Ok(())
}
