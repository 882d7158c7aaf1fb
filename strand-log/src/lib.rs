//! Durable, partitioned, multi-reader message log over an ordered keyspace
//! store.
//!
//! A [`LogManager`] opens named [`Log`]s over a caller-owned
//! [`strand_store::OrderedStore`] handle. Writers `add` opaque byte
//! payloads; each write is a single durable store mutation. Readers
//! register a [`MessageReader`] callback with a [`ReadMarker`] describing
//! where their cursor starts, and a per-partition polling engine delivers
//! stored messages in partition order, at least once.
//!
//! Fixed-partition logs keep a single total order identical to write order;
//! spread logs hash writes across partitions and guarantee order only
//! within each partition.
//!
//! # Key Types
//!
//! - [`LogManager`] - Opens and caches named logs, owns shared config
//! - [`Log`] - Durable append plus multi-reader delivery
//! - [`ReadMarker`] - Start position for a reader registration
//! - [`MessageReader`] - Delivery callback and checkpoint-flush hook
//! - [`Message`] - Immutable sender/timestamp/payload envelope

pub mod codec;
pub mod config;
pub mod error;
pub mod log;
pub mod manager;
pub mod marker;
pub mod message;
pub mod partitioner;
pub mod poller;
pub mod reader;

mod registry;

// Re-exports
pub use config::LogConfig;
pub use error::{LogError, Result};
pub use log::Log;
pub use manager::LogManager;
pub use marker::ReadMarker;
pub use message::Message;
pub use partitioner::Partitioner;
pub use poller::PollerState;
pub use reader::MessageReader;
