//! Broker transport contract.
//!
//! The wire-level surface publishers and consumers talk to. [`crate::Broker`]
//! is the in-process implementation; a networked broker (AMQP, Redis
//! streams, ...) can implement the same trait and be swapped in without
//! touching the publisher or consumer code.
//!
//! Consumption is **pull-based**: a consumer loop fetches one message,
//! decides, and settles it with exactly one `ack` or `reject`. Settling an
//! unknown delivery tag must succeed as a no-op.

use std::sync::Arc;
use std::time::Duration;

use crate::error::BrokerError;
use crate::exchange::ExchangeKind;
use crate::message::{DeliveryTag, Message, MessageBody};
use crate::queue::QueueOptions;

pub trait Transport: Send + Sync {
    fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError>;

    fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError>;

    fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), BrokerError>;

    /// Route `body` through `exchange`; returns the number of queues reached.
    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: MessageBody,
    ) -> Result<usize, BrokerError>;

    /// Take the next message from `queue`, waiting up to `timeout` for one.
    fn fetch(&self, queue: &str, timeout: Duration) -> Result<Option<Message>, BrokerError>;

    fn ack(&self, queue: &str, tag: DeliveryTag) -> Result<(), BrokerError>;

    fn reject(&self, queue: &str, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError>;
}

impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    fn declare_exchange(&self, name: &str, kind: ExchangeKind) -> Result<(), BrokerError> {
        (**self).declare_exchange(name, kind)
    }

    fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<(), BrokerError> {
        (**self).declare_queue(name, options)
    }

    fn bind(&self, queue: &str, exchange: &str, pattern: &str) -> Result<(), BrokerError> {
        (**self).bind(queue, exchange, pattern)
    }

    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: MessageBody,
    ) -> Result<usize, BrokerError> {
        (**self).publish(exchange, routing_key, body)
    }

    fn fetch(&self, queue: &str, timeout: Duration) -> Result<Option<Message>, BrokerError> {
        (**self).fetch(queue, timeout)
    }

    fn ack(&self, queue: &str, tag: DeliveryTag) -> Result<(), BrokerError> {
        (**self).ack(queue, tag)
    }

    fn reject(&self, queue: &str, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        (**self).reject(queue, tag, requeue)
    }
}
