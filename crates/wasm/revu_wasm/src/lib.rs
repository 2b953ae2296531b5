//! Token policy checks exported to the web client.
//!
//! Timestamps cross the boundary as `f64` epoch milliseconds (JS `Date.now()`).

use revu_core::auth::token_policy;
use wasm_bindgen::prelude::*;

/// Returns the version of the revu_wasm package.
#[wasm_bindgen]
pub fn version() -> String {
    revu_core::version().to_string()
}

#[wasm_bindgen(js_name = isTokenWellFormed)]
pub fn is_token_well_formed(token: &str) -> bool {
    token_policy::is_well_formed(token)
}

#[wasm_bindgen(js_name = isTokenUnexpired)]
pub fn is_token_unexpired(token: &str, now_ms: f64) -> bool {
    token_policy::is_unexpired(token, now_ms as i64)
}

#[wasm_bindgen(js_name = isWithinLifetime)]
pub fn is_within_lifetime(issued_at_ms: f64, now_ms: f64, lifetime_ms: f64) -> bool {
    token_policy::is_within_lifetime(issued_at_ms as i64, now_ms as i64, lifetime_ms as i64)
}

#[wasm_bindgen(js_name = needsRefresh)]
pub fn needs_refresh(
    issued_at_ms: f64,
    now_ms: f64,
    lifetime_ms: f64,
    refresh_threshold_ms: f64,
) -> bool {
    token_policy::needs_refresh(
        issued_at_ms as i64,
        now_ms as i64,
        lifetime_ms as i64,
        refresh_threshold_ms as i64,
    )
}
