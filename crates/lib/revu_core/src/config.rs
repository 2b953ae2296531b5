//! Session manager configuration.

/// Default remote auth endpoint.
pub const DEFAULT_API_URL: &str = "https://dummyjson.com";

/// Session lifetime: 8 hours.
pub const DEFAULT_SESSION_LIFETIME_MS: i64 = 8 * 60 * 60 * 1000;

/// Refresh once less than 15 minutes of the session remain.
pub const DEFAULT_REFRESH_THRESHOLD_MS: i64 = 15 * 60 * 1000;

/// How long a validity verdict may be reused: 5 seconds.
pub const DEFAULT_CACHE_TTL_MS: i64 = 5_000;

/// Unauthenticated entry point.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Configuration for the session manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Base URL of the remote auth endpoint (e.g. "https://dummyjson.com").
    pub api_url: String,
    /// Maximum age of a session, measured from `login_timestamp`.
    pub session_lifetime_ms: i64,
    /// Remaining lifetime below which a refresh is attempted.
    pub refresh_threshold_ms: i64,
    /// Window during which a cached validity verdict is reused.
    pub cache_ttl_ms: i64,
    /// Path the UI redirects to when unauthenticated.
    pub login_path: String,
    /// Rebuild a minimal identity from token claims when no user snapshot
    /// exists. Off by default: such sessions are treated as not found.
    pub reconstruct_identity: bool,
}

impl SessionConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                    | Default                 |
    /// |-----------------------------|-------------------------|
    /// | `REVU_API_URL`              | `https://dummyjson.com` |
    /// | `REVU_SESSION_LIFETIME_MS`  | 8 hours                 |
    /// | `REVU_REFRESH_THRESHOLD_MS` | 15 minutes              |
    /// | `REVU_CACHE_TTL_MS`         | 5 seconds               |
    /// | `REVU_LOGIN_PATH`           | `/login`                |
    /// | `REVU_RECONSTRUCT_IDENTITY` | `false`                 |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_url: std::env::var("REVU_API_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.api_url),
            session_lifetime_ms: env_millis("REVU_SESSION_LIFETIME_MS")
                .unwrap_or(defaults.session_lifetime_ms),
            refresh_threshold_ms: env_millis("REVU_REFRESH_THRESHOLD_MS")
                .unwrap_or(defaults.refresh_threshold_ms),
            cache_ttl_ms: env_millis("REVU_CACHE_TTL_MS").unwrap_or(defaults.cache_ttl_ms),
            login_path: std::env::var("REVU_LOGIN_PATH")
                .ok()
                .filter(|v| v.starts_with('/'))
                .unwrap_or(defaults.login_path),
            reconstruct_identity: std::env::var("REVU_RECONSTRUCT_IDENTITY")
                .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            session_lifetime_ms: DEFAULT_SESSION_LIFETIME_MS,
            refresh_threshold_ms: DEFAULT_REFRESH_THRESHOLD_MS,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            reconstruct_identity: false,
        }
    }
}

/// Parse a non-negative millisecond value; garbage falls back to the default.
fn env_millis(key: &str) -> Option<i64> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|v| *v >= 0)
}
