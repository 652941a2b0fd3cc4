//! Broker topology errors.

use thiserror::Error;

use crate::topic::InvalidPatternError;

/// Errors raised while declaring or addressing broker topology.
///
/// Unknown delivery tags are deliberately absent: ack/reject on a tag that is
/// no longer in flight is a silent no-op.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error(transparent)]
    InvalidPattern(#[from] InvalidPatternError),

    #[error("exchange not declared: {0}")]
    UnknownExchange(String),

    #[error("queue not declared: {0}")]
    UnknownQueue(String),

    /// A queue was redeclared with different options.
    #[error("queue `{0}` already declared with different options")]
    QueueRedeclared(String),

    /// The transport is unreachable (networked implementations).
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}
