//! The log registry: opens, caches, and closes named logs.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info};

use strand_store::OrderedStore;

use crate::config::LogConfig;
use crate::error::{LogError, Result};
use crate::log::Log;

/// Factory and registry for named [`Log`]s.
///
/// Owns the shared configuration and the storage handle; the registry is
/// scoped to the manager (never process-global), so multiple managers can
/// coexist in one process without cross-contamination. Closing the manager
/// closes every open log but never the store, which belongs to the caller.
pub struct LogManager {
    config: LogConfig,
    store: Arc<dyn OrderedStore>,
    logs: Mutex<HashMap<String, Arc<Log>>>,
    closed: AtomicBool,
}

impl LogManager {
    /// Create a manager over a store handle.
    pub fn new(config: LogConfig, store: Arc<dyn OrderedStore>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            logs: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// The manager's configuration.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Open the named log, or return the instance already open under that
    /// name. Idempotent for the manager's lifetime: registrations and
    /// checkpoints are shared, not duplicated.
    pub async fn open_log(&self, name: &str) -> Result<Arc<Log>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::Closed);
        }
        let mut logs = self.logs.lock().await;
        if let Some(log) = logs.get(name) {
            debug!(log = %name, "returning already-open log");
            return Ok(Arc::clone(log));
        }
        let log = Arc::new(Log::open(name, &self.config, Arc::clone(&self.store)));
        logs.insert(name.to_string(), Arc::clone(&log));
        info!(log = %name, partitions = log.partition_count(), "opened log");
        Ok(log)
    }

    /// Close every open log and clear the registry. Idempotent. The
    /// underlying store handle stays open.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut logs = self.logs.lock().await;
        for (_, log) in logs.drain() {
            log.close().await;
        }
        info!("log manager closed");
    }
}
