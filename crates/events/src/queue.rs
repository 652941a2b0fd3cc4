//! Durable FIFO queue with in-flight tracking.
//!
//! Every message is in exactly one place at a time:
//!
//! ```text
//!              enqueue                 dequeue
//! publisher ───────────► [ pending ] ──────────► { in-flight }
//!                            ▲                    │   │   │
//!                            │  reject(requeue)   │   │   │ ack
//!                            └────────────────────┘   │   ▼
//!                                                     │ removed
//!                              reject(no requeue)     ▼
//!                                           dead-letter queue / dropped
//! ```
//!
//! Verdicts (`ack` / `reject`) on a tag that is not in flight are no-ops, so
//! a duplicated verdict can never remove or requeue a message twice.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::message::{DeliveryTag, Message, MessageBody};

/// Declaration options for a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Whether the queue is meant to survive a broker restart. The in-process
    /// broker records the flag; networked transports honor it.
    pub durable: bool,
    /// Maximum number of pending messages. `None` is unbounded (the default);
    /// when the limit is reached new publishes to this queue are refused.
    pub max_length: Option<usize>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            durable: true,
            max_length: None,
        }
    }
}

impl QueueOptions {
    pub fn transient() -> Self {
        Self {
            durable: false,
            ..Default::default()
        }
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }
}

/// Counters over the lifetime of a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub acked: u64,
    pub requeued: u64,
    pub dead_lettered: u64,
    pub dropped: u64,
    /// Publishes refused because `max_length` was reached.
    pub overflowed: u64,
}

/// Most recent dropped messages kept for inspection. Older ones are only
/// counted in [`QueueStats::dropped`].
pub const DROPPED_RETAINED: usize = 1024;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Message>,
    in_flight: HashMap<DeliveryTag, Message>,
    dropped: VecDeque<Message>,
    next_tag: u64,
    stats: QueueStats,
}

impl QueueState {
    fn push(
        &mut self,
        routing_key: String,
        body: MessageBody,
        redelivery_count: u32,
    ) -> DeliveryTag {
        self.next_tag += 1;
        let delivery_tag = DeliveryTag::new(self.next_tag);
        self.pending.push_back(Message {
            delivery_tag,
            routing_key,
            body,
            redelivery_count,
            enqueued_at: Utc::now(),
        });
        delivery_tag
    }

    fn drop_message(&mut self, message: Message) {
        self.stats.dropped += 1;
        if self.dropped.len() == DROPPED_RETAINED {
            self.dropped.pop_front();
        }
        self.dropped.push_back(message);
    }

    fn take_next(&mut self) -> Option<Message> {
        let message = self.pending.pop_front()?;
        self.in_flight.insert(message.delivery_tag, message.clone());
        self.stats.delivered += 1;
        Some(message)
    }
}

/// A named message queue.
///
/// Safe to share between the exchange (producer side) and any number of
/// competing consumers via `Arc<Queue>`.
#[derive(Debug)]
pub struct Queue {
    name: String,
    options: QueueOptions,
    state: Mutex<QueueState>,
    ready: Condvar,
    dead_letter: OnceLock<Arc<Queue>>,
}

impl Queue {
    pub fn new(name: impl Into<String>, options: QueueOptions) -> Self {
        Self {
            name: name.into(),
            options,
            state: Mutex::new(QueueState::default()),
            ready: Condvar::new(),
            dead_letter: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub fn is_durable(&self) -> bool {
        self.options.durable
    }

    /// Route messages rejected without requeue to `target`.
    ///
    /// Topology-time only: returns `false` if a dead-letter queue is already
    /// attached or `target` is this queue.
    pub fn attach_dead_letter(&self, target: Arc<Queue>) -> bool {
        if target.name == self.name {
            return false;
        }
        self.dead_letter.set(target).is_ok()
    }

    pub fn dead_letter(&self) -> Option<&Arc<Queue>> {
        self.dead_letter.get()
    }

    // Every critical section leaves the state consistent, so a panic elsewhere
    // while holding the lock does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a message to the tail.
    ///
    /// Returns the delivery tag, or `None` when a configured `max_length` is
    /// reached (the message is not stored).
    pub fn enqueue(
        &self,
        routing_key: impl Into<String>,
        body: MessageBody,
    ) -> Option<DeliveryTag> {
        let mut state = self.lock();

        if let Some(max) = self.options.max_length {
            if state.pending.len() >= max {
                state.stats.overflowed += 1;
                warn!(queue = %self.name, max_length = max, "queue full, message refused");
                return None;
            }
        }

        let tag = state.push(routing_key.into(), body, 0);
        state.stats.enqueued += 1;
        drop(state);

        self.ready.notify_one();
        Some(tag)
    }

    /// Take the head message and mark it in flight. Never blocks.
    pub fn dequeue(&self) -> Option<Message> {
        self.lock().take_next()
    }

    /// Like [`Queue::dequeue`], but waits up to `timeout` for a message to be
    /// enqueued (or requeued) when the queue is empty.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        loop {
            if let Some(message) = state.take_next() {
                return Some(message);
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }

            let (guard, _) = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
        }
    }

    /// Acknowledge a delivery, removing the message permanently.
    ///
    /// Returns `false` (and does nothing) when the tag is not in flight.
    pub fn ack(&self, tag: DeliveryTag) -> bool {
        let mut state = self.lock();
        match state.in_flight.remove(&tag) {
            Some(_) => {
                state.stats.acked += 1;
                true
            }
            None => {
                trace!(
                    queue = %self.name,
                    delivery_tag = %tag,
                    "ack for unknown delivery tag ignored"
                );
                false
            }
        }
    }

    /// Reject a delivery.
    ///
    /// With `requeue` the message goes back to the **tail** with its
    /// `redelivery_count` incremented and a fresh delivery tag. Without it,
    /// the message moves to the dead-letter queue if one is attached (where it
    /// starts over with `redelivery_count = 0`), otherwise to the dropped set.
    ///
    /// Returns `false` (and does nothing) when the tag is not in flight.
    pub fn reject(&self, tag: DeliveryTag, requeue: bool) -> bool {
        let mut state = self.lock();

        let Some(message) = state.in_flight.remove(&tag) else {
            trace!(
                queue = %self.name,
                delivery_tag = %tag,
                "reject for unknown delivery tag ignored"
            );
            return false;
        };

        if requeue {
            let redeliveries = message.redelivery_count.saturating_add(1);
            let new_tag = state.push(message.routing_key, message.body, redeliveries);
            state.stats.requeued += 1;
            drop(state);

            debug!(
                queue = %self.name,
                delivery_tag = %tag,
                new_delivery_tag = %new_tag,
                redelivery_count = redeliveries,
                "message requeued"
            );
            self.ready.notify_one();
            return true;
        }

        let Some(target) = self.dead_letter.get() else {
            state.drop_message(message);
            return true;
        };

        state.stats.dead_lettered += 1;
        drop(state);

        // Own lock released first: two queues dead-lettering into each other
        // must not deadlock.
        let Message {
            routing_key, body, ..
        } = message;
        match target.enqueue(routing_key.clone(), body.clone()) {
            Some(_) => {
                debug!(queue = %self.name, dead_letter = %target.name, "message dead-lettered");
            }
            None => {
                warn!(
                    queue = %self.name,
                    dead_letter = %target.name,
                    "dead-letter queue refused message, dropping"
                );
                self.lock().drop_message(Message {
                    delivery_tag: tag,
                    routing_key,
                    body,
                    redelivery_count: 0,
                    enqueued_at: Utc::now(),
                });
            }
        }
        true
    }

    /// Number of pending (not in-flight) messages.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// No pending and no in-flight messages.
    pub fn is_idle(&self) -> bool {
        let state = self.lock();
        state.pending.is_empty() && state.in_flight.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats.clone()
    }

    /// The most recent messages that reached the terminal dropped state,
    /// oldest first. At most [`DROPPED_RETAINED`] are kept.
    pub fn dropped(&self) -> Vec<Message> {
        self.lock().dropped.iter().cloned().collect()
    }

    /// Like [`Queue::dropped`], but empties the retained set.
    pub fn take_dropped(&self) -> Vec<Message> {
        self.lock().dropped.drain(..).collect()
    }

    /// Discard all pending messages. In-flight deliveries are untouched.
    pub fn purge(&self) -> usize {
        let mut state = self.lock();
        let purged = state.pending.len();
        state.pending.clear();
        purged
    }
}
