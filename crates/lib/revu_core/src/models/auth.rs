//! Authentication domain models.
//!
//! Field names follow the remote API's camelCase wire format.

use serde::{Deserialize, Serialize};

/// Identity record returned by a successful login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub gender: String,
    /// Avatar reference (URL).
    #[serde(default)]
    pub image: String,
    /// Opaque bearer token.
    #[serde(default, alias = "accessToken")]
    pub token: String,
}

impl User {
    /// "First Last", falling back to the username.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }
}

/// Login form input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields must contain something besides whitespace.
    pub fn is_complete(&self) -> bool {
        !self.username.trim().is_empty() && !self.password.trim().is_empty()
    }
}

/// The persisted session, assembled from its individual storage keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token: String,
    /// Epoch millis at which the token was stored.
    pub issued_at_ms: i64,
    pub user: Option<User>,
}

/// Last-known validity verdict, reused for the cache TTL window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAuthState {
    pub is_valid: bool,
    pub last_checked_ms: i64,
    pub user: Option<User>,
}

/// Claims every bearer JWT must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (standard JWT `sub` claim).
    pub sub: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// Description of the device a session runs on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub user_agent: String,
    pub platform: String,
}

impl DeviceInfo {
    /// Describe the running process with a fresh device id.
    pub fn current(user_agent: impl Into<String>) -> Self {
        Self {
            device_id: uuid::Uuid::new_v4().to_string(),
            user_agent: user_agent.into(),
            platform: std::env::consts::OS.to_string(),
        }
    }
}

/// One entry of the multi-device session registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSession {
    pub id: String,
    pub device_info: DeviceInfo,
    /// RFC 3339 timestamp of last activity.
    pub last_active: String,
    #[serde(default)]
    pub is_current_device: bool,
}
