//! Topic exchange: binding table + fan-out.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::message::MessageBody;
use crate::queue::Queue;
use crate::topic::{InvalidPatternError, Pattern};

/// Routing discipline of an exchange. Only topic routing is supported.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    #[default]
    Topic,
}

/// Declared association between a pattern and a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub pattern: Pattern,
    pub queue_name: String,
}

#[derive(Debug)]
struct Bound {
    binding: Binding,
    queue: Arc<Queue>,
}

/// A named routing table.
///
/// Publishing with routing key `k` enqueues exactly one copy of the message in
/// every queue that has at least one binding matching `k`, however many of
/// its bindings match.
#[derive(Debug)]
pub struct Exchange {
    name: String,
    kind: ExchangeKind,
    // Rebinding is rare; publishes only take the read lock.
    bindings: RwLock<Vec<Bound>>,
}

impl Exchange {
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            bindings: RwLock::new(Vec::new()),
        }
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Topic)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Bound>> {
        self.bindings.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Bound>> {
        self.bindings.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind `queue` with `pattern`.
    ///
    /// Returns `Ok(false)` when the same (pattern, queue) pair is already bound.
    pub fn bind(&self, pattern: &str, queue: &Arc<Queue>) -> Result<bool, InvalidPatternError> {
        let pattern = Pattern::parse(pattern)?;
        let mut bindings = self.write();

        let exists = bindings
            .iter()
            .any(|b| b.binding.pattern == pattern && b.binding.queue_name == queue.name());
        if exists {
            return Ok(false);
        }

        debug!(exchange = %self.name, pattern = %pattern, queue = %queue.name(), "binding added");
        bindings.push(Bound {
            binding: Binding {
                pattern,
                queue_name: queue.name().to_string(),
            },
            queue: Arc::clone(queue),
        });
        Ok(true)
    }

    /// Remove a binding. Returns whether it existed.
    pub fn unbind(&self, pattern: &str, queue_name: &str) -> bool {
        let mut bindings = self.write();
        let before = bindings.len();
        bindings.retain(|b| {
            !(b.binding.pattern.as_str() == pattern && b.binding.queue_name == queue_name)
        });
        bindings.len() != before
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.read().iter().map(|b| b.binding.clone()).collect()
    }

    /// Names of the queues a message with `routing_key` would reach.
    pub fn route(&self, routing_key: &str) -> BTreeSet<String> {
        self.read()
            .iter()
            .filter(|b| b.binding.pattern.matches(routing_key))
            .map(|b| b.binding.queue_name.clone())
            .collect()
    }

    fn matching_queues(&self, routing_key: &str) -> Vec<Arc<Queue>> {
        let mut seen = BTreeSet::new();
        self.read()
            .iter()
            .filter(|b| b.binding.pattern.matches(routing_key))
            .filter(|b| seen.insert(b.binding.queue_name.clone()))
            .map(|b| Arc::clone(&b.queue))
            .collect()
    }

    /// Fan `body` out to every matching queue.
    ///
    /// Returns the number of queues that accepted a copy. No match is not an
    /// error: the message is dropped.
    pub fn publish(&self, routing_key: &str, body: MessageBody) -> usize {
        let targets = self.matching_queues(routing_key);

        if targets.is_empty() {
            debug!(exchange = %self.name, routing_key, "no binding matched, message dropped");
            return 0;
        }

        let reached = targets
            .iter()
            .filter(|queue| queue.enqueue(routing_key, body.clone()).is_some())
            .count();

        trace!(exchange = %self.name, routing_key, reached, "message routed");
        reached
    }
}
