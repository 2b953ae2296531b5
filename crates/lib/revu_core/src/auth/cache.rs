//! In-memory session cache with TTL-based expiration.
//!
//! Holds the last validity verdict so routine checks skip storage reads.
//! `write` and `invalidate` are synchronous and must be called in the same
//! call that mutates the persisted session.

use crate::models::auth::{CachedAuthState, User};

/// Memoized validity and identity of the current session.
#[derive(Debug)]
pub struct SessionCache {
    entry: Option<CachedAuthState>,
    /// How long a verdict may be reused (milliseconds).
    pub ttl_ms: i64,
}

impl SessionCache {
    pub fn new(ttl_ms: i64) -> Self {
        Self { entry: None, ttl_ms }
    }

    /// The cached verdict if it was recorded less than `ttl_ms` ago.
    pub fn read(&self, now_ms: i64) -> Option<&CachedAuthState> {
        self.entry
            .as_ref()
            .filter(|entry| now_ms.saturating_sub(entry.last_checked_ms) < self.ttl_ms)
    }

    /// Overwrite the verdict, stamped with `now_ms`.
    pub fn write(&mut self, is_valid: bool, user: Option<User>, now_ms: i64) {
        self.entry = Some(CachedAuthState {
            is_valid,
            last_checked_ms: now_ms,
            user,
        });
    }

    /// Force the next `read` to miss.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
