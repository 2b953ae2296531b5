//! Token and session lifetime policy.
//!
//! Pure functions; malformed input yields `false` and a debug diagnostic.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use tracing::debug;

use crate::models::auth::TokenClaims;

/// Decode the claims of a bearer JWT without verifying its signature.
///
/// The client never holds the signing key; the server remains the authority
/// on signatures. Requires `sub`, `iat` and `exp`.
pub fn decode_claims(token: &str) -> Option<TokenClaims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    match decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            debug!("malformed token rejected: {e}");
            None
        }
    }
}

/// Whether the token decodes and carries subject, issued-at and expiry claims.
pub fn is_well_formed(token: &str) -> bool {
    decode_claims(token).is_some()
}

/// `exp` strictly after `now_ms`, and `iat` not in the future.
pub fn is_unexpired(token: &str, now_ms: i64) -> bool {
    let Some(claims) = decode_claims(token) else {
        return false;
    };
    let expires_ms = claims.exp.saturating_mul(1000);
    let issued_ms = claims.iat.saturating_mul(1000);
    if expires_ms <= now_ms {
        debug!(sub = %claims.sub, "token expired");
        return false;
    }
    if issued_ms > now_ms {
        debug!(sub = %claims.sub, "token issued in the future");
        return false;
    }
    true
}

/// `now - issued_at < lifetime`.
pub fn is_within_lifetime(issued_at_ms: i64, now_ms: i64, lifetime_ms: i64) -> bool {
    now_ms.saturating_sub(issued_at_ms) < lifetime_ms
}

/// Remaining lifetime lies strictly between zero and the threshold.
///
/// Sessions that are already over are not refreshed; they are invalidated.
pub fn needs_refresh(
    issued_at_ms: i64,
    now_ms: i64,
    lifetime_ms: i64,
    refresh_threshold_ms: i64,
) -> bool {
    let remaining = remaining_lifetime_ms(issued_at_ms, now_ms, lifetime_ms);
    remaining > 0 && remaining < refresh_threshold_ms
}

/// Milliseconds left before the session lifetime runs out (may be negative).
pub fn remaining_lifetime_ms(issued_at_ms: i64, now_ms: i64, lifetime_ms: i64) -> i64 {
    lifetime_ms.saturating_sub(now_ms.saturating_sub(issued_at_ms))
}
