//! `eventrelay-core`: event ledger building blocks.
//!
//! This crate contains the **pure** record model (no broker or storage concerns).

pub mod error;
pub mod event;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use event::{Event, EventStatus, NewEvent, StatusUpdate};
pub use id::EventId;
