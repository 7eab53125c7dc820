//! Expiration Policy
//!
//! Entries are never deleted when their lease runs out. They become invisible
//! to reads immediately ("lazy expiry") and are physically removed later by a
//! sweep. Everything that asks "is this still valid?" goes through
//! [`is_expired`] so the boundary is decided in exactly one place.

use chrono::{DateTime, Utc};

/// Returns true if `expires_at` is not in the future relative to `now`.
///
/// An entry whose expiration equals `now` is already expired.
#[inline]
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at <= now
}

/// Convenience form of [`is_expired`] against the current wall clock.
#[inline]
pub fn is_expired_now(expires_at: DateTime<Utc>) -> bool {
    is_expired(expires_at, Utc::now())
}
