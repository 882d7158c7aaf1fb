//! A named, durable, ordered, append-only sequence of messages.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use strand_store::OrderedStore;

use crate::codec;
use crate::config::LogConfig;
use crate::error::{LogError, Result};
use crate::marker::ReadMarker;
use crate::message::Message;
use crate::partitioner::Partitioner;
use crate::poller::{PartitionPoller, PollerState};
use crate::reader::MessageReader;
use crate::registry::{CursorMode, RegisteredReader, Registrations};

/// A durable, partitioned message log.
///
/// Obtained from [`crate::LogManager::open_log`]; writes go through
/// [`Log::add`] and deliveries happen on per-partition polling tasks feeding
/// the registered [`MessageReader`]s.
pub struct Log {
    name: String,
    sender: String,
    partitioner: Partitioner,
    store: Arc<dyn OrderedStore>,
    registrations: Arc<Registrations>,
    checkpoint_keyspace: String,
    partition_keyspaces: Vec<String>,
    /// Process-monotonic sequence feeding the key disambiguator.
    next_seq: AtomicU64,
    /// High 16 bits of the disambiguator, derived from the sender id, so
    /// two processes writing in the same microsecond cannot collide on a
    /// key.
    sender_tag: u64,
    /// Guards against a backwards clock step producing keys that sort
    /// before already-written ones.
    last_micros: AtomicU64,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    poller_handles: Mutex<Vec<JoinHandle<()>>>,
    poller_states: Vec<Arc<RwLock<PollerState>>>,
}

impl Log {
    /// Open the log and start one polling task per partition.
    pub(crate) fn open(name: &str, config: &LogConfig, store: Arc<dyn OrderedStore>) -> Self {
        let partitioner = config.partitioner_for(name);
        let partition_count = partitioner.partition_count();
        let registrations = Arc::new(Registrations::new());
        let (shutdown, shutdown_rx) = watch::channel(false);

        let mut poller_states = Vec::with_capacity(partition_count as usize);
        let mut handles = Vec::with_capacity(partition_count as usize);
        for partition in 0..partition_count {
            let state = Arc::new(RwLock::new(PollerState::Stopped));
            let poller = PartitionPoller::new(
                name.to_string(),
                partition,
                Arc::clone(&store),
                Arc::clone(&registrations),
                config.poll_interval,
                config.read_lag,
                Arc::clone(&state),
            );
            handles.push(tokio::spawn(poller.run(shutdown_rx.clone())));
            poller_states.push(state);
        }

        let mut hasher = DefaultHasher::new();
        config.sender_id.hash(&mut hasher);
        let sender_tag = (hasher.finish() & 0xFFFF) << 48;

        debug!(log = %name, partitions = partition_count, "log opened");

        Self {
            name: name.to_string(),
            sender: config.sender_id.clone(),
            partitioner,
            store,
            registrations,
            checkpoint_keyspace: codec::checkpoint_keyspace(name),
            partition_keyspaces: (0..partition_count)
                .map(|p| codec::partition_keyspace(name, p))
                .collect(),
            next_seq: AtomicU64::new(0),
            sender_tag,
            last_micros: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            shutdown,
            poller_handles: Mutex::new(handles),
            poller_states,
        }
    }

    /// The log's name, unique within its manager.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of partitions backing this log.
    pub fn partition_count(&self) -> u32 {
        self.partitioner.partition_count()
    }

    /// Current state of one partition's polling task.
    pub async fn poller_state(&self, partition: u32) -> PollerState {
        match self.poller_states.get(partition as usize) {
            Some(state) => *state.read().await,
            None => PollerState::Stopped,
        }
    }

    /// Synchronously persist a message and return its envelope.
    ///
    /// The write timestamp is assigned here; ordering among concurrent
    /// `add` calls to the same partition follows the key order in the
    /// backing store, with a monotonically increasing disambiguator
    /// breaking timestamp ties.
    pub async fn add(&self, payload: Bytes) -> Result<Message> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::Closed);
        }

        let now_micros = codec::timestamp_micros(Utc::now());
        let prev = self.last_micros.fetch_max(now_micros, Ordering::SeqCst);
        let micros = now_micros.max(prev);
        let timestamp = codec::time_from_micros(micros)?;

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let disambiguator = self.sender_tag | (seq & 0x0000_FFFF_FFFF_FFFF);
        let partition = self.partitioner.assign(&self.sender, micros);

        let key = codec::encode_position(micros, disambiguator);
        let value = codec::encode_entry(&self.sender, &payload);
        self.store
            .put(&self.partition_keyspaces[partition as usize], key, value)
            .await?;

        debug!(log = %self.name, partition, "message appended");
        Ok(Message::new(self.sender.clone(), timestamp, payload))
    }

    /// Attach one or more readers sharing the same start marker.
    ///
    /// The first registration binds the log's cursor mode. While an
    /// identifier governs the log, only registrations with the same
    /// identifier are accepted; they merge onto the persisted checkpoint.
    /// Supplying zero readers is always rejected. No partial registration
    /// survives a failure.
    pub async fn register_reader(
        &self,
        marker: ReadMarker,
        readers: Vec<Arc<dyn MessageReader>>,
    ) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LogError::Closed);
        }
        if readers.is_empty() {
            return Err(LogError::InvalidReadMarker(
                "at least one reader is required".to_string(),
            ));
        }

        let mut state = self.registrations.lock().await;

        match (&state.mode, marker.identifier()) {
            (Some(CursorMode::Identifier(bound)), Some(id)) if bound != id => {
                return Err(LogError::InvalidReadMarker(format!(
                    "log '{}' is governed by identifier '{bound}', got '{id}'",
                    self.name
                )));
            }
            (Some(CursorMode::Identifier(bound)), None) => {
                return Err(LogError::InvalidReadMarker(format!(
                    "log '{}' is governed by identifier '{bound}'; bare markers are rejected",
                    self.name
                )));
            }
            _ => {}
        }

        let now = Utc::now();
        let cursors = match marker.identifier() {
            Some(id) => self.resolve_checkpoint_cursors(id, &marker, now).await?,
            None => vec![
                codec::position_for_time(marker.start_time(now));
                self.partition_count() as usize
            ],
        };

        let identifier = marker.identifier().map(str::to_string);
        for reader in readers {
            state.readers.push(Arc::new(RegisteredReader::new(
                reader,
                identifier.clone(),
                cursors.clone(),
            )));
        }
        state.mode = Some(match identifier {
            Some(id) => CursorMode::Identifier(id),
            None => CursorMode::Bare,
        });

        debug!(log = %self.name, "readers registered");
        Ok(())
    }

    /// Load the persisted cursor for every partition, creating checkpoints
    /// at the marker's fallback position where none exist yet.
    async fn resolve_checkpoint_cursors(
        &self,
        id: &str,
        marker: &ReadMarker,
        now: chrono::DateTime<Utc>,
    ) -> Result<Vec<Vec<u8>>> {
        let fallback = codec::position_for_time(marker.start_time(now));
        let mut cursors = Vec::with_capacity(self.partition_count() as usize);
        let mut missing = Vec::new();
        for partition in 0..self.partition_count() {
            let key = codec::checkpoint_key(id, partition);
            match self.store.get(&self.checkpoint_keyspace, &key).await? {
                Some(cursor) => cursors.push(cursor.to_vec()),
                None => {
                    missing.push(key);
                    cursors.push(fallback.clone());
                }
            }
        }
        // Missing checkpoints are written only after every partition has
        // resolved, so a failed lookup creates nothing. A put failure below
        // can still leave checkpoints for a prefix of the partitions; a
        // later registration with the same identifier resumes from those
        // rather than its own fallback.
        for key in missing {
            self.store
                .put(
                    &self.checkpoint_keyspace,
                    key,
                    Bytes::copy_from_slice(&fallback),
                )
                .await?;
        }
        Ok(cursors)
    }

    /// Remove a single reader's registration. Other readers' cursors and
    /// checkpoints are untouched.
    pub async fn unregister_reader(&self, reader: &Arc<dyn MessageReader>) -> bool {
        self.registrations.remove(reader).await
    }

    /// Stop every partition poller, wait for in-flight delivery to finish,
    /// and release all registrations. Idempotent; after this returns no
    /// reader callback fires.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Receivers may already be gone if the runtime dropped the tasks.
        let _ = self.shutdown.send(true);

        let mut handles = self.poller_handles.lock().await;
        for handle in handles.drain(..) {
            if let Err(err) = handle.await {
                warn!(log = %self.name, error = %err, "poller task join failed");
            }
        }
        self.registrations.clear().await;
        info!(log = %self.name, "log closed");
    }
}
