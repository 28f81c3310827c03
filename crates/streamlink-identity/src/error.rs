//! Error types for identity provisioning.

use thiserror::Error;

pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("admin authentication failed ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("{operation} failed ({status}): {body}")]
    Unexpected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("client {0} not found")]
    ClientNotFound(String),
}
