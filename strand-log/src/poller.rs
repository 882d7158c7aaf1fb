//! Per-partition polling engine.
//!
//! Each partition of each log runs one lightweight task that scans the
//! backing store past the slowest cursor on a fixed interval, decodes the
//! entries once, and fans them out to every reader whose cursor is behind.
//! Writers never touch this path; readers and writers are decoupled
//! entirely through the store.

use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{RwLock, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use strand_store::OrderedStore;

use crate::codec;
use crate::error::Result;
use crate::message::Message;
use crate::registry::{RegisteredReader, Registrations};

/// Lifecycle of one partition's polling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Not yet started, or fully shut down.
    Stopped,
    /// Scanning on the poll interval.
    Running,
    /// Shutdown requested; finishing the in-flight cycle.
    Stopping,
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// The polling engine for a single partition.
pub(crate) struct PartitionPoller {
    log_name: String,
    partition: u32,
    keyspace: String,
    checkpoint_keyspace: String,
    store: Arc<dyn OrderedStore>,
    registrations: Arc<Registrations>,
    poll_interval: Duration,
    /// Scans stop this far behind the current time. A write's key is
    /// assigned before its put completes, so a key younger than this margin
    /// may still have a smaller-keyed write racing below it.
    read_lag: Duration,
    state: Arc<RwLock<PollerState>>,
    /// Last checkpoint cursor successfully written for this partition.
    last_persisted: Option<Vec<u8>>,
    /// Checkpoint write that failed and awaits retry.
    pending_checkpoint: Option<(String, Vec<u8>)>,
}

impl PartitionPoller {
    pub(crate) fn new(
        log_name: String,
        partition: u32,
        store: Arc<dyn OrderedStore>,
        registrations: Arc<Registrations>,
        poll_interval: Duration,
        read_lag: Duration,
        state: Arc<RwLock<PollerState>>,
    ) -> Self {
        let keyspace = codec::partition_keyspace(&log_name, partition);
        let checkpoint_keyspace = codec::checkpoint_keyspace(&log_name);
        Self {
            log_name,
            partition,
            keyspace,
            checkpoint_keyspace,
            store,
            registrations,
            poll_interval,
            read_lag,
            state,
            last_persisted: None,
            pending_checkpoint: None,
        }
    }

    /// Run until the shutdown signal fires. The in-flight cycle always
    /// completes before the state reaches `Stopping`, so shutdown latency
    /// is bounded by one poll interval plus one batch.
    pub(crate) async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        *self.state.write().await = PollerState::Running;
        debug!(
            log = %self.log_name,
            partition = self.partition,
            "partition poller running"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.cycle().await {
                        warn!(
                            log = %self.log_name,
                            partition = self.partition,
                            error = %err,
                            "poll cycle failed"
                        );
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        *self.state.write().await = PollerState::Stopping;
        self.flush_pending_checkpoint().await;
        *self.state.write().await = PollerState::Stopped;
        debug!(
            log = %self.log_name,
            partition = self.partition,
            "partition poller stopped"
        );
    }

    /// One scan-decode-deliver pass over this partition.
    async fn cycle(&mut self) -> Result<()> {
        let snapshot = self.registrations.snapshot().await;
        if snapshot.is_empty() {
            self.flush_pending_checkpoint().await;
            return Ok(());
        }
        let partition = self.partition as usize;

        let mut cursors = Vec::with_capacity(snapshot.len());
        for slot in &snapshot {
            cursors.push(slot.cursor(partition).await);
        }
        let min_cursor = cursors
            .iter()
            .min()
            .cloned()
            .unwrap_or_default();

        // The scan stops `read_lag` behind the clock. Advancing a cursor
        // past a position a concurrent `add` may still materialize below
        // would skip that message forever.
        let horizon = codec::timestamp_micros(Utc::now())
            .saturating_sub(u64::try_from(self.read_lag.as_micros()).unwrap_or(u64::MAX));
        let upper = codec::encode_position(horizon, u64::MAX);
        let entries = self
            .store
            .scan(
                &self.keyspace,
                Bound::Included(min_cursor),
                Bound::Included(upper),
            )
            .await?;

        if !entries.is_empty() {
            let batch = self.decode(entries);
            for (slot, start) in snapshot.iter().zip(&cursors) {
                self.deliver(slot, partition, start, &batch).await;
            }
        }

        self.persist_checkpoint(&snapshot).await;
        Ok(())
    }

    /// Decode raw entries once for the whole cycle. Undecodable entries are
    /// reported and kept as `None` tombstones so cursors still step past
    /// them; dropping them outright would leave a corrupt tail entry
    /// rescanned on every cycle forever.
    fn decode(&self, entries: Vec<(Vec<u8>, Bytes)>) -> Vec<(Vec<u8>, Option<Message>)> {
        let mut batch = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match decode_message(&key, &value) {
                Ok(message) => batch.push((key, Some(message))),
                Err(err) => {
                    error!(
                        log = %self.log_name,
                        partition = self.partition,
                        error = %err,
                        "skipping undecodable entry"
                    );
                    batch.push((key, None));
                }
            }
        }
        batch
    }

    /// Deliver the portion of the batch past `start` to one reader. On
    /// callback failure the cursor stays pinned at the batch start, so the
    /// whole batch is redelivered to this reader (and only this reader) on
    /// the next successful cycle.
    async fn deliver(
        &self,
        slot: &Arc<RegisteredReader>,
        partition: usize,
        start: &[u8],
        batch: &[(Vec<u8>, Option<Message>)],
    ) {
        let mut cursor: Option<Vec<u8>> = None;
        for (key, message) in batch {
            if key.as_slice() < start {
                continue;
            }
            if slot.is_removed() {
                break;
            }
            match message {
                Some(message) => match slot.reader().read(message.clone()).await {
                    Ok(()) => cursor = Some(codec::successor(key)),
                    Err(err) => {
                        warn!(
                            log = %self.log_name,
                            partition = self.partition,
                            error = %err,
                            "reader callback failed; batch will be redelivered"
                        );
                        return;
                    }
                },
                // Undecodable tombstone: advance past it without delivering.
                None => cursor = Some(codec::successor(key)),
            }
        }
        if let Some(cursor) = cursor {
            slot.set_cursor(partition, cursor).await;
            slot.reader().update_state().await;
        }
    }

    /// Persist the governing identifier's checkpoint at the minimum cursor
    /// across its readers. Failure is non-fatal: the in-memory cursors have
    /// already advanced, and a restart simply redelivers from the last
    /// persisted position.
    async fn persist_checkpoint(&mut self, snapshot: &[Arc<RegisteredReader>]) {
        let Some(id) = self.registrations.identifier().await else {
            return;
        };
        let partition = self.partition as usize;

        let mut min: Option<Vec<u8>> = None;
        for slot in snapshot {
            if slot.is_removed() || slot.identifier() != Some(id.as_str()) {
                continue;
            }
            let cursor = slot.cursor(partition).await;
            min = Some(match min {
                Some(current) if current <= cursor => current,
                _ => cursor,
            });
        }
        let Some(cursor) = min else { return };

        if self.last_persisted.as_ref() == Some(&cursor) {
            return;
        }
        self.pending_checkpoint = Some((id, cursor));
        self.flush_pending_checkpoint().await;
    }

    async fn flush_pending_checkpoint(&mut self) {
        let Some((id, cursor)) = self.pending_checkpoint.take() else {
            return;
        };
        let key = codec::checkpoint_key(&id, self.partition);
        match self
            .store
            .put(
                &self.checkpoint_keyspace,
                key,
                Bytes::copy_from_slice(&cursor),
            )
            .await
        {
            Ok(()) => self.last_persisted = Some(cursor),
            Err(err) => {
                warn!(
                    log = %self.log_name,
                    partition = self.partition,
                    identifier = %id,
                    error = %err,
                    "checkpoint persist failed, will retry"
                );
                self.pending_checkpoint = Some((id, cursor));
            }
        }
    }
}

fn decode_message(key: &[u8], value: &[u8]) -> Result<Message> {
    let (micros, _) = codec::decode_position(key)?;
    let timestamp = codec::time_from_micros(micros)?;
    let (sender, payload) = codec::decode_entry(value)?;
    Ok(Message::new(sender, timestamp, payload))
}
