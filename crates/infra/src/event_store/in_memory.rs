use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use eventrelay_core::{Event, EventId, EventStatus, NewEvent, StatusUpdate};

use super::query::{EventFilter, Pagination};
use super::r#trait::{EventStore, EventStoreError, StatusCounts};

#[derive(Debug, Default)]
struct Ledger {
    /// Insertion (= creation) order.
    events: Vec<Event>,
    index: HashMap<EventId, usize>,
}

/// In-memory event ledger.
///
/// Intended for tests/dev and single-process deployments. Not optimized for
/// large volumes (`list` scans).
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    ledger: RwLock<Ledger>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Ledger> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ledger> {
        self.ledger.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().events.is_empty()
    }
}

impl EventStore for InMemoryEventStore {
    fn save(&self, event: NewEvent) -> Result<Event, EventStoreError> {
        let mut ledger = self.write();

        let mut id = EventId::new();
        while ledger.index.contains_key(&id) {
            id = EventId::new();
        }

        let event = event.into_event(id);
        let position = ledger.events.len();
        ledger.events.push(event.clone());
        ledger.index.insert(id, position);
        Ok(event)
    }

    fn update_status(
        &self,
        id: EventId,
        status: EventStatus,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<StatusUpdate, EventStoreError> {
        let mut ledger = self.write();
        let position = *ledger.index.get(&id).ok_or(EventStoreError::NotFound(id))?;
        let update = ledger.events[position].transition(status, processed_at)?;
        Ok(update)
    }

    fn get(&self, id: EventId) -> Result<Option<Event>, EventStoreError> {
        let ledger = self.read();
        Ok(ledger.index.get(&id).map(|&pos| ledger.events[pos].clone()))
    }

    fn list(&self, filter: &EventFilter) -> Result<Vec<Event>, EventStoreError> {
        let page = filter.pagination;
        // The fields are public, so a hand-built filter can skip the cap.
        let limit = page.limit.min(Pagination::MAX_LIMIT);
        Ok(self
            .read()
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .skip(page.offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    fn count_by_status(&self) -> Result<StatusCounts, EventStoreError> {
        let mut counts = StatusCounts::default();
        for event in &self.read().events {
            counts.record(event.status);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn save(store: &InMemoryEventStore, event_type: &str) -> Event {
        store.save(NewEvent::new(event_type, json!({"id": 1}))).unwrap()
    }

    #[test]
    fn save_assigns_id_and_pending_status() {
        let store = InMemoryEventStore::new();
        let a = save(&store, "order.created");
        let b = save(&store, "order.created");

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, EventStatus::Pending);
        assert_eq!(store.get(a.id).unwrap(), Some(a));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn get_unknown_returns_none() {
        let store = InMemoryEventStore::new();
        assert_eq!(store.get(EventId::new()).unwrap(), None);
    }

    #[test]
    fn update_status_is_idempotent() {
        let store = InMemoryEventStore::new();
        let e = save(&store, "order.created");

        let at = Utc::now();
        assert_eq!(
            store.update_status(e.id, EventStatus::Completed, Some(at)).unwrap(),
            StatusUpdate::Applied
        );
        assert_eq!(
            store.update_status(e.id, EventStatus::Completed, None).unwrap(),
            StatusUpdate::Unchanged
        );

        let stored = store.get(e.id).unwrap().unwrap();
        assert_eq!(stored.processed_at, Some(at));
    }

    #[test]
    fn update_status_rejects_regression() {
        let store = InMemoryEventStore::new();
        let e = save(&store, "order.created");
        store.update_status(e.id, EventStatus::Failed, None).unwrap();

        let err = store
            .update_status(e.id, EventStatus::Completed, None)
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidTransition(_)));
        assert_eq!(store.get(e.id).unwrap().unwrap().status, EventStatus::Failed);
    }

    #[test]
    fn update_unknown_event_fails() {
        let store = InMemoryEventStore::new();
        let id = EventId::new();
        assert_eq!(
            store.update_status(id, EventStatus::Completed, None),
            Err(EventStoreError::NotFound(id))
        );
    }

    #[test]
    fn list_filters_and_paginates_in_creation_order() {
        let store = InMemoryEventStore::new();
        let first = save(&store, "order.created");
        save(&store, "payment.completed");
        let third = save(&store, "order.created");
        let fourth = save(&store, "order.created");

        let orders = store
            .list(&EventFilter::default().with_event_type("order.created"))
            .unwrap();
        assert_eq!(
            orders.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![first.id, third.id, fourth.id]
        );

        let page = store
            .list(&EventFilter::default().with_event_type("order.created").paginate(1, 1))
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, third.id);
    }

    #[test]
    fn list_never_returns_more_than_the_cap() {
        let store = InMemoryEventStore::new();
        for _ in 0..Pagination::MAX_LIMIT + 5 {
            save(&store, "order.created");
        }

        let filter = EventFilter {
            pagination: Pagination {
                limit: u32::MAX,
                offset: 0,
            },
            ..Default::default()
        };
        assert_eq!(store.list(&filter).unwrap().len(), Pagination::MAX_LIMIT as usize);
    }

    #[test]
    fn counts_by_status() {
        let store = InMemoryEventStore::new();
        let a = save(&store, "order.created");
        let b = save(&store, "order.created");
        save(&store, "order.created");
        store.update_status(a.id, EventStatus::Completed, None).unwrap();
        store.update_status(b.id, EventStatus::Processing, None).unwrap();

        let counts = store.count_by_status().unwrap();
        assert_eq!(
            counts,
            StatusCounts {
                pending: 1,
                processing: 1,
                completed: 1,
                failed: 0
            }
        );
        assert_eq!(counts.total(), 3);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pages_are_windows_of_the_filtered_list(
                kinds in proptest::collection::vec(0u8..3, 0..60),
                limit in 1u32..20,
                offset in 0u32..70,
            ) {
                let store = InMemoryEventStore::new();
                for kind in &kinds {
                    save(&store, &format!("order.kind{kind}"));
                }

                let filter = EventFilter::default().with_event_type("order.kind1");
                let all = store.list(&filter.clone().paginate(Pagination::MAX_LIMIT, 0)).unwrap();
                let page = store.list(&filter.paginate(limit, offset)).unwrap();

                let expected: Vec<_> = all
                    .iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect();
                prop_assert_eq!(page, expected);
                prop_assert!(all.iter().all(|e| e.event_type == "order.kind1"));
            }
        }
    }
}
