//! Event query filters for inspection and reconciliation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use eventrelay_core::{Event, EventStatus};

/// Pagination parameters for event queries.
///
/// Deserialized input goes through [`Pagination::new`], so `limit` is capped
/// at [`Pagination::MAX_LIMIT`] and missing fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PaginationParams")]
pub struct Pagination {
    /// Maximum number of events to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Deserialize)]
struct PaginationParams {
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    offset: Option<u32>,
}

impl From<PaginationParams> for Pagination {
    fn from(params: PaginationParams) -> Self {
        Self::new(params.limit, params.offset)
    }
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for event queries. All criteria are optional and combine
/// with AND.
///
/// ```ignore
/// // Events stuck in Pending for more than a minute (routing never happened).
/// let stale = EventFilter::default()
///     .with_status(EventStatus::Pending)
///     .created_before(Utc::now() - chrono::Duration::minutes(1));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Exact event type, e.g. `order.created`.
    pub event_type: Option<String>,
    pub status: Option<EventStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl EventFilter {
    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_status(mut self, status: EventStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn created_after(mut self, at: DateTime<Utc>) -> Self {
        self.created_after = Some(at);
        self
    }

    pub fn created_before(mut self, at: DateTime<Utc>) -> Self {
        self.created_before = Some(at);
        self
    }

    pub fn paginate(mut self, limit: u32, offset: u32) -> Self {
        self.pagination = Pagination::new(Some(limit), Some(offset));
        self
    }

    /// Whether `event` satisfies every criterion (pagination aside).
    pub fn matches(&self, event: &Event) -> bool {
        self.event_type.as_deref().is_none_or(|t| event.event_type == t)
            && self.status.is_none_or(|s| event.status == s)
            && self.created_after.is_none_or(|at| event.created_at > at)
            && self.created_before.is_none_or(|at| event.created_at < at)
    }
}
