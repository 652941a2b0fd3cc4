//! Event ledger boundary.
//!
//! This module defines the infrastructure-facing abstraction for persisting
//! event records and tracking their processing status, without making any
//! storage assumptions.

pub mod in_memory;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use query::{EventFilter, Pagination};
pub use r#trait::{EventStore, EventStoreError, StatusCounts};
