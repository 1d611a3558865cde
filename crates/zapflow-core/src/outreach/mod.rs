//! Outreach core: scheduling, dispatch, delivery tracking, drip rules

pub mod dispatcher;
pub mod drip;
pub mod engine;
pub mod import;
pub mod template;
pub mod tracker;

use thiserror::Error;

use crate::transport::TransportError;

/// Outreach component errors, mapped onto the API boundary by the caller
#[derive(Error, Debug)]
pub enum OutreachError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("State conflict: {0}")]
    StateConflict(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl OutreachError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            OutreachError::Validation(_) => 422,
            OutreachError::NotFound(_) => 404,
            OutreachError::StateConflict(_) => 409,
            OutreachError::Transport(_) => 502,
            OutreachError::Database(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            OutreachError::Validation(_) => "validation_error",
            OutreachError::NotFound(_) => "not_found",
            OutreachError::StateConflict(_) => "state_conflict",
            OutreachError::Transport(_) => "transport_error",
            OutreachError::Database(_) => "database_error",
        }
    }
}
