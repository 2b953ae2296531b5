//! Authentication session management.
//!
//! Token policy, session cache, the session service with its network
//! boundary, the observable auth state, and the route guard.

pub mod cache;
pub mod guard;
pub mod http;
pub mod service;
pub mod state;
pub mod token_policy;
pub mod transport;

use thiserror::Error;

use crate::storage::StoreError;
use transport::TransportError;

/// Notice shown when a protected view finds no valid session.
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";

/// Authentication errors.
///
/// `Display` is the message shown to the user on the login form.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Incorrect email or password")]
    InvalidCredentials,

    #[error("{0}")]
    ValidationError(String),

    #[error("Too many login attempts. Please try again later.")]
    RateLimited,

    #[error("Server error. Please try again later.")]
    ServerError { status: u16 },

    #[error("Unable to reach the server. Please check your connection.")]
    NetworkError(String),

    #[error("Something went wrong. Please try again.")]
    Unexpected(String),

    #[error("Malformed token")]
    MalformedToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("{}", SESSION_EXPIRED_MESSAGE)]
    ExpiredSession,

    #[error("No active session")]
    SessionNotFound,

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<TransportError> for AuthError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Network(msg) => AuthError::NetworkError(msg),
            TransportError::Http { status: 400, message } => AuthError::ValidationError(
                message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Invalid input".to_string()),
            ),
            TransportError::Http { status: 401, .. } => AuthError::InvalidCredentials,
            TransportError::Http { status: 429, .. } => AuthError::RateLimited,
            TransportError::Http { status, .. } => AuthError::ServerError { status },
            TransportError::Unknown(msg) => AuthError::Unexpected(msg),
        }
    }
}
