//! Ports shared by the domain crates
//!
//! The ledger core never reaches outside the process by itself. Everything it
//! needs from its surroundings (fresh identifiers, a persistence backend) is
//! expressed as a trait here or in the domain crate, and adapters implement
//! those traits.

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Error type for port operations
///
/// Shared by every adapter so that callers see one error surface no matter
/// which backend sits behind a port.
#[derive(Debug, Error)]
pub enum PortError {
    /// The requested entity was not found
    #[error("Not found: {entity_type} with id {id}")]
    NotFound {
        entity_type: String,
        id: String,
    },

    /// Nothing has been stored behind the port yet
    #[error("Nothing stored: {message}")]
    Empty {
        message: String,
    },

    /// A data transformation error occurred (encode/decode)
    #[error("Transformation error: {message}")]
    Transformation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An internal error occurred
    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl PortError {
    /// Creates a NotFound error
    pub fn not_found(entity_type: impl Into<String>, id: impl fmt::Display) -> Self {
        PortError::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn empty(message: impl Into<String>) -> Self {
        PortError::Empty {
            message: message.into(),
        }
    }

    /// Wraps an encoder/decoder failure
    pub fn transformation<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PortError::Transformation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PortError::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this error indicates the entity was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound { .. } | PortError::Empty { .. })
    }
}

/// Source of fresh identifiers for newly created entities
pub trait IdSource: fmt::Debug {
    /// Returns a UUID that has never been handed out by this source
    fn next_uuid(&mut self) -> Uuid;
}

/// Production id source: time-ordered v7 UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Source;

impl IdSource for UuidV7Source {
    fn next_uuid(&mut self) -> Uuid {
        Uuid::now_v7()
    }
}

/// Deterministic id source producing `1, 2, 3, ...` as UUIDs
///
/// Useful when tests compare identifiers or snapshots across runs.
#[derive(Debug, Clone)]
pub struct SequentialIdSource {
    next: u128,
}

impl SequentialIdSource {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Starts counting at `start`
    pub fn starting_at(start: u128) -> Self {
        Self { next: start }
    }
}

impl Default for SequentialIdSource {
    fn default() -> Self {
        Self::new()
    }
}

impl IdSource for SequentialIdSource {
    fn next_uuid(&mut self) -> Uuid {
        let id = Uuid::from_u128(self.next);
        self.next += 1;
        id
    }
}
