//! Ordered keyspace store abstraction for strand.
//!
//! The log subsystem is written against a small storage capability
//! interface: atomic single-key writes and sorted range scans over named,
//! independent keyspaces. Any backend providing those two operations can
//! carry a strand log.
//!
//! # Key Types
//!
//! - [`OrderedStore`] - Trait for atomic puts and ordered scans
//! - [`MemoryStore`] - In-memory implementation for tests and embedders

pub mod error;
pub mod memory;
pub mod traits;

// Re-exports
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use traits::OrderedStore;
