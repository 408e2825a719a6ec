use log::{debug, error, info, trace, warn};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::LoggingConfig;
use crate::error::{ErrorSeverity, HandlerError, ListenerError};
use crate::models::{ChainEvent, Network};

/// Structured logging context, rendered as one JSON object per line
pub struct LogContext {
    pub component: String,
    pub operation: String,
    pub metadata: HashMap<String, Value>,
}

impl LogContext {
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            component: component.to_string(),
            operation: operation.to_string(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn with_network(self, network: &Network) -> Self {
        self.with_metadata("network", json!(network.as_str()))
    }

    pub fn with_block_number(self, block_number: u64) -> Self {
        self.with_metadata("block_number", json!(block_number))
    }

    pub fn with_tx_hash(self, tx_hash: &str) -> Self {
        self.with_metadata("tx_hash", json!(tx_hash))
    }

    pub fn with_address(self, address: &str) -> Self {
        self.with_metadata("address", json!(address))
    }

    pub fn with_duration_ms(self, duration_ms: u64) -> Self {
        self.with_metadata("duration_ms", json!(duration_ms))
    }

    fn format_message(&self, level: &str, message: &str) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let mut log_entry = json!({
            "timestamp": timestamp,
            "level": level,
            "component": self.component,
            "operation": self.operation,
            "message": message,
        });

        for (key, value) in &self.metadata {
            log_entry[key] = value.clone();
        }

        log_entry.to_string()
    }

    pub fn info(&self, message: &str) {
        info!("{}", self.format_message("INFO", message));
    }

    pub fn warn(&self, message: &str) {
        warn!("{}", self.format_message("WARN", message));
    }

    pub fn error(&self, message: &str) {
        error!("{}", self.format_message("ERROR", message));
    }

    pub fn debug(&self, message: &str) {
        debug!("{}", self.format_message("DEBUG", message));
    }

    pub fn trace(&self, message: &str) {
        trace!("{}", self.format_message("TRACE", message));
    }
}

/// Error logging utilities
pub struct ErrorLogger;

impl ErrorLogger {
    pub fn log_error(error: &ListenerError, context: Option<LogContext>) {
        let severity = error.severity();

        let log_context = context
            .unwrap_or_else(|| LogContext::new("error", "unknown"))
            .with_metadata("error_type", json!(format!("{:?}", error)))
            .with_metadata("severity", json!(format!("{:?}", severity)))
            .with_metadata("recoverable", json!(error.is_recoverable()));

        let message = format!("Error occurred: {}", error);

        match severity {
            ErrorSeverity::Critical | ErrorSeverity::High => log_context.error(&message),
            ErrorSeverity::Medium => log_context.warn(&message),
            ErrorSeverity::Low => log_context.debug(&message),
        }
    }

    pub fn log_handler_failure(event: &ChainEvent, error: &HandlerError) {
        LogContext::new("listener_manager", "handle_event")
            .with_network(&event.network)
            .with_block_number(event.block_number)
            .with_tx_hash(&event.tx_hash)
            .with_metadata("error", json!(error.to_string()))
            .error("Handle event failed");
    }
}

/// Listener lifecycle and throughput records
pub struct MetricsLogger;

impl MetricsLogger {
    pub fn log_poll_cycle(
        network: &Network,
        latest: u64,
        blocks_processed: u64,
        detected: u64,
        confirmed: u64,
        reorged: u64,
        duration_ms: u64,
    ) {
        let context = LogContext::new("metrics", "poll_cycle")
            .with_network(network)
            .with_metadata("latest", json!(latest))
            .with_metadata("blocks_processed", json!(blocks_processed))
            .with_metadata("detected", json!(detected))
            .with_metadata("confirmed", json!(confirmed))
            .with_metadata("reorged", json!(reorged))
            .with_duration_ms(duration_ms);

        if blocks_processed == 0 && confirmed == 0 && reorged == 0 {
            context.trace("Poll cycle found nothing new");
        } else {
            context.debug(&format!(
                "Processed {} blocks up to {} in {}ms",
                blocks_processed, latest, duration_ms
            ));
        }
    }

    pub fn log_reorg(network: &Network, block_number: u64, old_hash: &str, new_hash: &str, max_known: Option<u64>) {
        LogContext::new("listener", "reorg")
            .with_network(network)
            .with_block_number(block_number)
            .with_metadata("old_hash", json!(old_hash))
            .with_metadata("new_hash", json!(new_hash))
            .with_metadata("max_known_block", json!(max_known))
            .warn("Chain reorganization detected");
    }

    pub fn log_event(event: &ChainEvent) {
        let context = LogContext::new("listener", "emit")
            .with_network(&event.network)
            .with_block_number(event.block_number)
            .with_tx_hash(&event.tx_hash)
            .with_address(&event.to)
            .with_metadata("confirmed", json!(event.confirmed))
            .with_metadata("reorged", json!(event.reorged));

        if event.reorged {
            context.warn("Invalidating event");
        } else if event.confirmed {
            context.info("Transaction confirmed");
        } else {
            context.info("Detected transaction");
        }
    }
}

/// Initialize logging for the application
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let json_format = config.format == "json";

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.level.as_str()))
        .format(move |buf, record| {
            use std::io::Write;

            let message = record.args().to_string();
            let structured = serde_json::from_str::<Value>(&message).ok().filter(Value::is_object);

            match (json_format, structured) {
                (true, Some(value)) => writeln!(buf, "{}", value),
                (true, None) => writeln!(
                    buf,
                    "{}",
                    json!({
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "message": message,
                    })
                ),
                (false, _) => writeln!(
                    buf,
                    "{} [{}] {}: {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    message
                ),
            }
        })
        .try_init()?;

    info!("Logging initialized");
    Ok(())
}
