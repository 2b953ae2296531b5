//! Network boundary of the session service.
//!
//! The remote auth API is opaque; everything the service needs from it goes
//! through [`AuthTransport`], and every failure is reduced to a
//! [`TransportError`] at this boundary.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::{Credentials, DeviceInfo, DeviceSession, User};

/// How a request to the auth API failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response was received.
    #[error("network failure: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Http {
        status: u16,
        message: Option<String>,
    },

    /// A response arrived but could not be understood.
    #[error("unexpected response: {0}")]
    Unknown(String),
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginGrant {
    pub user: User,
    pub refresh_token: Option<String>,
    pub csrf_token: Option<String>,
    /// Bearer token the server placed in the `token` cookie, if any.
    pub cookie_token: Option<String>,
}

/// Result of a successful token refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub token: String,
    /// Rotated refresh credential, when the server issues one.
    pub refresh_token: Option<String>,
    pub cookie_token: Option<String>,
}

/// Calls the session service makes against the remote auth API.
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, TransportError>;

    /// `POST /auth/refresh`
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, TransportError>;

    /// `POST /auth/sessions/register`
    async fn register_session(
        &self,
        access_token: &str,
        device: &DeviceInfo,
    ) -> Result<DeviceSession, TransportError>;

    /// `GET /auth/sessions`
    async fn list_sessions(&self, access_token: &str)
    -> Result<Vec<DeviceSession>, TransportError>;

    /// `POST /auth/sessions/revoke`
    async fn revoke_session(
        &self,
        access_token: &str,
        session_id: &str,
    ) -> Result<(), TransportError>;

    /// `POST /auth/sessions/revoke-all-except`
    async fn revoke_all_except(
        &self,
        access_token: &str,
        keep_session_id: &str,
    ) -> Result<(), TransportError>;
}
