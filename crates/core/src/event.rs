//! Event ledger records.
//!
//! An [`Event`] is the durable record of a domain occurrence submitted for
//! asynchronous processing. The record is the single source of truth for
//! whether that occurrence has been handled:
//!
//! ```text
//! Pending ──► Processing ──► Completed
//!    │             │
//!    └─────────────┴───────► Failed
//! ```
//!
//! Transitions are monotonic. A terminal record (Completed / Failed) never
//! changes again, and re-applying the current status is a no-op so that
//! racing consumers can report the same outcome twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{DomainError, DomainResult};
use crate::id::EventId;

/// Processing status of an event record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Persisted, not yet picked up by a consumer.
    Pending,
    /// A consumer is handling at least one delivery of the event.
    Processing,
    /// Handled successfully.
    Completed,
    /// Retries exhausted or rejected by the handler.
    Failed,
}

impl EventStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            EventStatus::Pending => 0,
            EventStatus::Processing => 1,
            EventStatus::Completed | EventStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward step.
    ///
    /// Staying on the same status is not a step; see [`Event::transition`].
    pub fn can_advance_to(self, next: EventStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Completed => "completed",
            EventStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event ready to be saved (not yet assigned an id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl NewEvent {
    pub fn new(event_type: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Assign an id and produce the initial (Pending) record.
    pub fn into_event(self, id: EventId) -> Event {
        Event {
            id,
            event_type: self.event_type,
            payload: self.payload,
            status: EventStatus::Pending,
            created_at: self.created_at,
            processed_at: None,
        }
    }
}

/// Outcome of applying a status to a record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusUpdate {
    /// The record moved to the requested status.
    Applied,
    /// The record already had the requested status; nothing changed.
    Unchanged,
}

/// A persisted event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub event_type: String,
    pub payload: JsonValue,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    /// Set exactly when the record reaches a terminal status.
    pub processed_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn is_pending(&self) -> bool {
        self.status == EventStatus::Pending
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move the record to `next`.
    ///
    /// `processed_at` is recorded only on terminal transitions; when the caller
    /// does not supply one, the current time is used. Non-terminal transitions
    /// ignore it.
    pub fn transition(
        &mut self,
        next: EventStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> DomainResult<StatusUpdate> {
        if self.status == next {
            return Ok(StatusUpdate::Unchanged);
        }

        if !self.status.can_advance_to(next) {
            return Err(DomainError::invariant(format!(
                "event {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        self.status = next;
        if next.is_terminal() {
            self.processed_at = Some(processed_at.unwrap_or_else(Utc::now));
        }
        Ok(StatusUpdate::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pending() -> Event {
        NewEvent::new("order.created", serde_json::json!({"id": 1})).into_event(EventId::new())
    }

    #[test]
    fn new_record_is_pending_without_processed_at() {
        let event = pending();
        assert!(event.is_pending());
        assert!(event.processed_at.is_none());
    }

    #[test]
    fn processing_does_not_stamp_processed_at() {
        let mut event = pending();
        let update = event.transition(EventStatus::Processing, Some(Utc::now())).unwrap();
        assert_eq!(update, StatusUpdate::Applied);
        assert!(event.processed_at.is_none());
    }

    #[test]
    fn completion_stamps_processed_at() {
        let mut event = pending();
        let at = Utc::now();
        event.transition(EventStatus::Processing, None).unwrap();
        event.transition(EventStatus::Completed, Some(at)).unwrap();
        assert_eq!(event.status, EventStatus::Completed);
        assert_eq!(event.processed_at, Some(at));
    }

    #[test]
    fn pending_may_fail_directly() {
        let mut event = pending();
        event.transition(EventStatus::Failed, None).unwrap();
        assert_eq!(event.status, EventStatus::Failed);
        assert!(event.processed_at.is_some());
    }

    #[test]
    fn repeating_terminal_status_is_a_noop() {
        let mut event = pending();
        let first = Utc::now();
        event.transition(EventStatus::Completed, Some(first)).unwrap();

        let later = first + chrono::Duration::seconds(5);
        let update = event.transition(EventStatus::Completed, Some(later)).unwrap();
        assert_eq!(update, StatusUpdate::Unchanged);
        assert_eq!(event.processed_at, Some(first));
    }

    #[test]
    fn terminal_records_never_regress() {
        let mut event = pending();
        event.transition(EventStatus::Completed, None).unwrap();

        for next in [EventStatus::Pending, EventStatus::Processing, EventStatus::Failed] {
            let err = event.transition(next, None).unwrap_err();
            assert!(matches!(err, DomainError::InvariantViolation(_)));
        }
        assert_eq!(event.status, EventStatus::Completed);
    }

    #[test]
    fn processing_cannot_return_to_pending() {
        let mut event = pending();
        event.transition(EventStatus::Processing, None).unwrap();
        assert!(event.transition(EventStatus::Pending, None).is_err());
    }

    fn any_status() -> impl Strategy<Value = EventStatus> {
        prop_oneof![
            Just(EventStatus::Pending),
            Just(EventStatus::Processing),
            Just(EventStatus::Completed),
            Just(EventStatus::Failed),
        ]
    }

    proptest! {
        /// Property: whatever sequence of updates is attempted, the status rank
        /// never decreases and processed_at is set iff the record is terminal.
        #[test]
        fn status_is_monotonic(steps in prop::collection::vec(any_status(), 0..20)) {
            let mut event = pending();
            for next in steps {
                let before = event.status.rank();
                let _ = event.transition(next, None);
                prop_assert!(event.status.rank() >= before);
                prop_assert_eq!(event.processed_at.is_some(), event.is_terminal());
            }
        }
    }
}
