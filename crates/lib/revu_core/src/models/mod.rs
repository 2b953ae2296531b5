//! Domain models shared by the session manager.

pub mod auth;
