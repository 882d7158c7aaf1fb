//! Reader registration state shared between a log and its pollers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, MutexGuard};

use crate::reader::MessageReader;

/// How the log's cursors are governed: by bare markers, or by one
/// checkpoint identifier. Fixed by the first registration and kept for the
/// log's lifetime, even if all readers unregister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CursorMode {
    Bare,
    Identifier(String),
}

/// One reader's registration: the callback, the optional checkpoint
/// identifier it shares, and one cursor per partition. Cursors are scan
/// lower bounds (inclusive) in the partition keyspace.
pub(crate) struct RegisteredReader {
    reader: Arc<dyn MessageReader>,
    identifier: Option<String>,
    cursors: Vec<Mutex<Vec<u8>>>,
    removed: AtomicBool,
}

impl RegisteredReader {
    pub(crate) fn new(
        reader: Arc<dyn MessageReader>,
        identifier: Option<String>,
        cursors: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            reader,
            identifier,
            cursors: cursors.into_iter().map(Mutex::new).collect(),
            removed: AtomicBool::new(false),
        }
    }

    pub(crate) fn reader(&self) -> &Arc<dyn MessageReader> {
        &self.reader
    }

    pub(crate) fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub(crate) async fn cursor(&self, partition: usize) -> Vec<u8> {
        self.cursors[partition].lock().await.clone()
    }

    pub(crate) async fn set_cursor(&self, partition: usize, cursor: Vec<u8>) {
        *self.cursors[partition].lock().await = cursor;
    }

    /// Checked by the delivery loop before every callback, so a reader
    /// removed mid-cycle stops receiving messages immediately.
    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub(crate) struct RegistrationState {
    pub(crate) readers: Vec<Arc<RegisteredReader>>,
    pub(crate) mode: Option<CursorMode>,
}

/// The registration set, shared between the log (register/unregister/close)
/// and one poller per partition (snapshot per cycle).
#[derive(Default)]
pub(crate) struct Registrations {
    inner: Mutex<RegistrationState>,
}

impl Registrations {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for registration changes.
    pub(crate) async fn lock(&self) -> MutexGuard<'_, RegistrationState> {
        self.inner.lock().await
    }

    /// Consistent snapshot of the live registration set for one poll cycle.
    pub(crate) async fn snapshot(&self) -> Vec<Arc<RegisteredReader>> {
        self.inner
            .lock()
            .await
            .readers
            .iter()
            .filter(|slot| !slot.is_removed())
            .cloned()
            .collect()
    }

    /// The governing checkpoint identifier, if any.
    pub(crate) async fn identifier(&self) -> Option<String> {
        match &self.inner.lock().await.mode {
            Some(CursorMode::Identifier(id)) => Some(id.clone()),
            _ => None,
        }
    }

    /// Remove the registration holding `reader`. Returns whether it was
    /// present.
    pub(crate) async fn remove(&self, reader: &Arc<dyn MessageReader>) -> bool {
        let mut state = self.inner.lock().await;
        let before = state.readers.len();
        state.readers.retain(|slot| {
            if Arc::ptr_eq(slot.reader(), reader) {
                slot.mark_removed();
                false
            } else {
                true
            }
        });
        state.readers.len() != before
    }

    /// Drop every registration. Used by `Log::close` after the pollers
    /// have stopped.
    pub(crate) async fn clear(&self) {
        let mut state = self.inner.lock().await;
        for slot in &state.readers {
            slot.mark_removed();
        }
        state.readers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::message::Message;
    use async_trait::async_trait;

    struct NoopReader;

    #[async_trait]
    impl MessageReader for NoopReader {
        async fn read(&self, _message: Message) -> Result<()> {
            Ok(())
        }
    }

    fn reader() -> Arc<dyn MessageReader> {
        Arc::new(NoopReader)
    }

    #[tokio::test]
    async fn snapshot_excludes_removed_readers() {
        let regs = Registrations::new();
        let a = reader();
        let b = reader();
        {
            let mut state = regs.lock().await;
            state
                .readers
                .push(Arc::new(RegisteredReader::new(a.clone(), None, vec![vec![0]])));
            state
                .readers
                .push(Arc::new(RegisteredReader::new(b.clone(), None, vec![vec![0]])));
        }

        assert_eq!(regs.snapshot().await.len(), 2);
        assert!(regs.remove(&a).await);
        assert_eq!(regs.snapshot().await.len(), 1);
        assert!(!regs.remove(&a).await, "second removal is a no-op");
    }

    #[tokio::test]
    async fn removal_flag_is_visible_on_held_snapshots() {
        let regs = Registrations::new();
        let a = reader();
        {
            let mut state = regs.lock().await;
            state
                .readers
                .push(Arc::new(RegisteredReader::new(a.clone(), None, vec![vec![0]])));
        }

        let snapshot = regs.snapshot().await;
        assert!(!snapshot[0].is_removed());
        regs.remove(&a).await;
        assert!(snapshot[0].is_removed());
    }

    #[tokio::test]
    async fn cursors_are_per_partition() {
        let slot = RegisteredReader::new(reader(), None, vec![vec![1], vec![2]]);
        assert_eq!(slot.cursor(0).await, vec![1]);
        assert_eq!(slot.cursor(1).await, vec![2]);

        slot.set_cursor(1, vec![9]).await;
        assert_eq!(slot.cursor(0).await, vec![1]);
        assert_eq!(slot.cursor(1).await, vec![9]);
    }

    #[tokio::test]
    async fn identifier_reflects_mode() {
        let regs = Registrations::new();
        assert_eq!(regs.identifier().await, None);

        regs.lock().await.mode = Some(CursorMode::Bare);
        assert_eq!(regs.identifier().await, None);

        regs.lock().await.mode = Some(CursorMode::Identifier("job".to_string()));
        assert_eq!(regs.identifier().await, Some("job".to_string()));
    }
}
