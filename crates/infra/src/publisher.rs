//! Persist-then-route publishing.
//!
//! Every published event is written to the ledger first; routing happens
//! only once the record exists. A routing failure leaves the record Pending
//! so it can be found and republished later.

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, warn};

use eventrelay_core::{Event, EventId, NewEvent};
use eventrelay_events::{BrokerError, MessageBody, Transport};

use crate::event_store::{EventStore, EventStoreError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PublishError {
    /// The event could not be persisted; nothing was routed.
    #[error("persistence failed: {0}")]
    Persistence(#[from] EventStoreError),

    #[error("event not found: {0}")]
    NotFound(EventId),

    #[error("event {0} is no longer pending")]
    NotPending(EventId),

    /// Only returned by [`Publisher::republish`]; `publish` swallows routing
    /// failures.
    #[error("routing failed: {0}")]
    Routing(#[from] BrokerError),
}

/// Publishes events through a named exchange, recording them first.
#[derive(Debug, Clone)]
pub struct Publisher<S, T> {
    store: S,
    transport: T,
    exchange: String,
}

impl<S, T> Publisher<S, T>
where
    S: EventStore,
    T: Transport,
{
    pub fn new(store: S, transport: T, exchange: impl Into<String>) -> Self {
        Self {
            store,
            transport,
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist a Pending record for `event_type`, then route it with
    /// `event_type` as the routing key.
    ///
    /// Returns the persisted record. A message that matches no binding is
    /// not an error: the record simply stays Pending.
    pub fn publish(
        &self,
        event_type: impl Into<String>,
        payload: JsonValue,
    ) -> Result<Event, PublishError> {
        let event = self.store.save(NewEvent::new(event_type, payload))?;

        match self.route(&event) {
            Ok(reached) => {
                debug!(
                    exchange = %self.exchange,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    queues = reached,
                    "event published"
                );
            }
            Err(err) => {
                warn!(
                    exchange = %self.exchange,
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %err,
                    "event persisted but routing failed; left pending"
                );
            }
        }

        Ok(event)
    }

    /// Route an already persisted Pending event again.
    ///
    /// Used to reconcile records whose first routing attempt failed. Each
    /// call produces another delivery, so the handlers downstream see it
    /// at least once more.
    pub fn republish(&self, id: EventId) -> Result<usize, PublishError> {
        let event = self.store.get(id)?.ok_or(PublishError::NotFound(id))?;
        if !event.is_pending() {
            return Err(PublishError::NotPending(id));
        }

        let reached = self.route(&event)?;
        debug!(exchange = %self.exchange, event_id = %id, queues = reached, "event republished");
        Ok(reached)
    }

    fn route(&self, event: &Event) -> Result<usize, BrokerError> {
        let body = MessageBody::new(event.event_type.clone(), event.payload.clone())
            .with_correlation(event.id);
        self.transport
            .publish(&self.exchange, &event.event_type, body)
    }
}
