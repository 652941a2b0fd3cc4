//! In-process broker: the explicit context owning exchanges and queues.
//!
//! Whoever builds publishers and consumers owns a `Broker` (usually behind an
//! `Arc`) and hands it to them; there is no process-wide registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tracing::info;

use crate::error::BrokerError;
use crate::exchange::{Exchange, ExchangeKind};
use crate::message::{DeliveryTag, Message, MessageBody};
use crate::queue::{Queue, QueueOptions};
use crate::transport::Transport;

#[derive(Debug, Default)]
pub struct Broker {
    exchanges: RwLock<HashMap<String, Arc<Exchange>>>,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Declare (or look up) an exchange. Declaring twice returns the same one.
    pub fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Arc<Exchange> {
        let mut exchanges = self.exchanges.write().unwrap_or_else(PoisonError::into_inner);
        exchanges
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(exchange = name, kind = ?kind, "exchange declared");
                Arc::new(Exchange::new(name, kind))
            })
            .clone()
    }

    /// Declare (or look up) a queue.
    ///
    /// Redeclaring with identical options returns the existing queue; with
    /// different options it fails, as AMQP brokers do.
    pub fn declare_queue(
        &self,
        name: &str,
        options: QueueOptions,
    ) -> Result<Arc<Queue>, BrokerError> {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = queues.get(name) {
            if existing.options() != &options {
                return Err(BrokerError::QueueRedeclared(name.to_string()));
            }
            return Ok(existing.clone());
        }

        info!(
            queue = name,
            durable = options.durable,
            max_length = ?options.max_length,
            "queue declared"
        );
        let queue = Arc::new(Queue::new(name, options));
        queues.insert(name.to_string(), queue.clone());
        Ok(queue)
    }

    /// Declare `dead_letter` (same options as `queue`, unbounded) and attach it
    /// as the dead-letter target of `queue`.
    pub fn declare_dead_letter(
        &self,
        queue: &str,
        dead_letter: &str,
    ) -> Result<Arc<Queue>, BrokerError> {
        let source = self.queue(queue)?;

        if let Some(existing) = source.dead_letter() {
            if existing.name() == dead_letter {
                return Ok(existing.clone());
            }
            return Err(BrokerError::QueueRedeclared(queue.to_string()));
        }

        let options = QueueOptions {
            max_length: None,
            ..source.options().clone()
        };
        let target = self.declare_queue(dead_letter, options)?;
        if !source.attach_dead_letter(target.clone()) {
            return Err(BrokerError::QueueRedeclared(queue.to_string()));
        }

        info!(queue, dead_letter, "dead-letter queue attached");
        Ok(target)
    }

    pub fn exchange(&self, name: &str) -> Result<Arc<Exchange>, BrokerError> {
        self.exchanges
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownExchange(name.to_string()))
    }

    pub fn queue(&self, name: &str) -> Result<Arc<Queue>, BrokerError> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownQueue(name.to_string()))
    }

    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Bind `queue` to `exchange` with `pattern`.
    ///
    /// Returns `Ok(false)` if the binding already existed.
    pub fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        pattern: &str,
    ) -> Result<bool, BrokerError> {
        let exchange = self.exchange(exchange)?;
        let queue = self.queue(queue)?;
        Ok(exchange.bind(pattern, &queue)?)
    }
}

impl Transport for Broker {
    fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError> {
        Broker::declare_exchange(self, name, kind);
        Ok(())
    }

    fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError> {
        Broker::declare_queue(self, name, options).map(|_| ())
    }

    fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), BrokerError> {
        self.bind_queue(queue, exchange, pattern).map(|_| ())
    }

    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: MessageBody,
    ) -> Result<usize, BrokerError> {
        Ok(self.exchange(exchange)?.publish(routing_key, body))
    }

    fn fetch(&self, queue: &str, timeout: Duration) -> Result<Option<Message>, BrokerError> {
        let queue = self.queue(queue)?;
        if timeout.is_zero() {
            return Ok(queue.dequeue());
        }
        Ok(queue.dequeue_timeout(timeout))
    }

    fn ack(&self, queue: &str, tag: DeliveryTag) -> Result<(), BrokerError> {
        self.queue(queue)?.ack(tag);
        Ok(())
    }

    fn reject(&self, queue: &str, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        self.queue(queue)?.reject(tag, requeue);
        Ok(())
    }
}
