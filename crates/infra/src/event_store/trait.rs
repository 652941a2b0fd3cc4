use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use eventrelay_core::{DomainError, Event, EventId, EventStatus, NewEvent, StatusUpdate};
use std::sync::Arc;

use super::query::EventFilter;

/// Event store operation error.
///
/// These are **infrastructure errors** (availability, addressing) plus the
/// one lifecycle rule the store enforces: statuses never regress.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventStoreError {
    /// The backing store could not be reached or refused the operation.
    #[error("event store unavailable: {0}")]
    Unavailable(String),

    #[error("event not found: {0}")]
    NotFound(EventId),

    /// The requested status would move a record backwards or out of a
    /// terminal state.
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
}

impl From<DomainError> for EventStoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvariantViolation(msg) => EventStoreError::InvalidTransition(msg),
            other => EventStoreError::InvalidTransition(other.to_string()),
        }
    }
}

/// Number of records per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: EventStatus) {
        match status {
            EventStatus::Pending => self.pending += 1,
            EventStatus::Processing => self.processing += 1,
            EventStatus::Completed => self.completed += 1,
            EventStatus::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// Durable event ledger.
///
/// The store is the single source of truth for event status. Publishers save
/// records before routing them; consumers report outcomes through
/// `update_status`.
///
/// ## Implementation Requirements
///
/// - `save` assigns a unique id and stores the record as Pending.
/// - `update_status` is idempotent: applying the current status again returns
///   [`StatusUpdate::Unchanged`] and leaves `processed_at` untouched. Handler
///   retries can race with delayed acknowledgments, so this is relied upon.
/// - Transitions are monotonic; regressions fail with
///   [`EventStoreError::InvalidTransition`].
/// - Records are never deleted.
pub trait EventStore: Send + Sync {
    fn save(&self, event: NewEvent) -> Result<Event, EventStoreError>;

    /// Move a record to `status`. `processed_at` is recorded only for terminal
    /// statuses (defaults to now).
    fn update_status(
        &self,
        id: EventId,
        status: EventStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<StatusUpdate, EventStoreError>;

    fn get(&self, id: EventId) -> Result<Option<Event>, EventStoreError>;

    /// Records matching `filter`, oldest first.
    fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, EventStoreError>;

    fn count_by_status(&self) -> Result<StatusCounts, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn save(&self, event: NewEvent) -> Result<Event, EventStoreError> {
        (**self).save(event)
    }

    fn update_status(
        &self,
        id: EventId,
        status: EventStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<StatusUpdate, EventStoreError> {
        (**self).update_status(id, status, processed_at)
    }

    fn get(&self, id: EventId) -> Result<Option<Event>, EventStoreError> {
        (**self).get(id)
    }

    fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, EventStoreError> {
        (**self).list(filter)
    }

    fn count_by_status(&self) -> Result<StatusCounts, EventStoreError> {
        (**self).count_by_status()
    }
}
