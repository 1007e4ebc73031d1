//! Error taxonomy shared by every engine operation.
//!
//! Validation failures (`InvalidArgument`, `NotFound`, `InvalidState`,
//! `Forbidden`) are deterministic and safe to return to the caller as-is.
//! `Conflict` means an expected-state precondition failed and the caller
//! should re-fetch before retrying. `UpstreamUnavailable` marks a roster
//! lookup that could not be answered at all, distinct from a missing record.

use thiserror::Error;

use crate::fields::TaskState;

/// Errors returned by the engine, resolver, stores and registries.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field is missing or malformed.
    #[error("argumento inválido: {0}")]
    InvalidArgument(String),

    /// A referenced record does not exist.
    #[error("{what} '{id}' no existe")]
    NotFound { what: &'static str, id: String },

    /// The operation is not legal from the task's current state.
    #[error("no se puede {action}: la tarea está {state}")]
    InvalidState { action: String, state: TaskState },

    /// The actor's role or ownership does not satisfy the permission rule.
    #[error("permiso denegado: {action}")]
    Forbidden { action: String },

    /// An expected-current-state precondition failed; re-fetch and retry.
    #[error("conflicto: {0}")]
    Conflict(String),

    /// The roster/directory could not be consulted at all.
    #[error("servicio no disponible: {0}")]
    UpstreamUnavailable(String),

    /// Storage failure while loading or saving the database.
    #[error("error de almacenamiento: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a missing record.
    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            what,
            id: id.to_string(),
        }
    }

    /// Shorthand for a state guard failure.
    pub fn invalid_state(action: impl Into<String>, state: TaskState) -> Self {
        Error::InvalidState {
            action: action.into(),
            state,
        }
    }

    /// Shorthand for a permission failure.
    pub fn forbidden(action: impl Into<String>) -> Self {
        Error::Forbidden {
            action: action.into(),
        }
    }
}
