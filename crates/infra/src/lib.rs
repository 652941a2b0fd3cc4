//! Relay layer: event ledger, persist-then-route publishing, queue consumers
//! and topology configuration.

pub mod config;
pub mod consumer;
pub mod event_store;
pub mod publisher;


pub use config::{ConfigError, ConsumerSettings, QueueSpec, RelayConfig};
pub use consumer::{
    ConsumeError, Consumer, ConsumerConfig, ConsumerGroup, ConsumerHandle, ConsumerState,
    ConsumerStats, Outcome, RedeliveryPolicy,
};
pub use event_store::{
    EventFilter, EventStore, EventStoreError, InMemoryEventStore, Pagination, StatusCounts,
};
pub use publisher::{PublishError, Publisher};
