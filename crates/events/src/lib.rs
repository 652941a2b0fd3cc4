//! Topic-routed publish/subscribe mechanics (in-process, no IO).
//!
//! ```text
//! publish(routing key) ─► Exchange ─┬─► Queue "orders"   (order.*)
//!                                   ├─► Queue "payments" (payment.*)
//!                                   └─► Queue "audit"    (#)
//! ```
//!
//! - [`topic`]: pattern validation and matching, the only routing rule.
//! - [`Exchange`]: binding table and fan-out (one copy per queue).
//! - [`Queue`]: FIFO buffer with in-flight tracking, ack / reject / requeue.
//! - [`Broker`]: explicit context owning the topology; implements
//!   [`Transport`], the contract a networked broker would also implement.
//! - [`Handler`]: what consumers invoke per message.
//!
//! Delivery is **at-least-once**. Consumers must be idempotent.

pub mod broker;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod message;
pub mod queue;
pub mod topic;
pub mod transport;

pub use broker::Broker;
pub use error::BrokerError;
pub use exchange::{Binding, Exchange, ExchangeKind};
pub use handler::{Handler, HandlerError};
pub use message::{DeliveryTag, Message, MessageBody};
pub use queue::{DROPPED_RETAINED, Queue, QueueOptions, QueueStats};
pub use topic::{InvalidPatternError, Pattern, PatternFault};
pub use transport::Transport;
