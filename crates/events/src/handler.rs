use thiserror::Error;

use crate::message::Message;

/// Failure reported by a message handler.
///
/// The handler never settles a delivery itself; the consumer turns the
/// returned value into the verdict.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Processing failed; the message may succeed on redelivery.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The message can never be processed; skip remaining redeliveries.
    #[error("handler rejected message: {0}")]
    Rejected(String),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Failed(_))
    }
}

/// Processes one delivered message.
///
/// Handlers must be idempotent: delivery is at-least-once, so the same
/// message may be seen again after a failure or a crash before the verdict.
pub trait Handler: Send + Sync {
    fn handle(&self, message: &Message) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, message: &Message) -> Result<(), HandlerError> {
        self(message)
    }
}
