//! # revu_core
//!
//! Client-side authentication session manager for Revu.
//!
//! The crate is organised leaves first: [`storage`] persists session keys,
//! [`auth::cache`] and [`auth::token_policy`] decide validity cheaply,
//! [`auth::service::AuthSessionService`] orchestrates login/logout/refresh,
//! [`auth::state::AuthStateStore`] is the observable UI state, and
//! [`auth::guard::RouteGuard`] gates protected views.

pub mod auth;
pub mod clock;
pub mod config;
pub mod models;
pub mod notify;
pub mod storage;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
