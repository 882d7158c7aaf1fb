//! The reader capability interface.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::Message;

/// A caller-supplied delivery callback plus a checkpoint-flush hook.
///
/// `read` is invoked once per delivered message, in partition order, on the
/// log's polling task for that partition. A returned error is treated as a
/// recoverable per-cycle outcome: the polling engine withholds the rest of
/// the batch from this reader, leaves its cursor where the batch started,
/// and redelivers on the next successful cycle. Sibling readers are never
/// affected.
#[async_trait]
pub trait MessageReader: Send + Sync {
    /// Handle one delivered message.
    async fn read(&self, message: Message) -> Result<()>;

    /// Persist any reader-side state. Invoked at least once per poll cycle
    /// in which this reader's cursor advanced.
    async fn update_state(&self) {}
}
