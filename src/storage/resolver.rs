//! Read Resolution
//!
//! A lookup key can match several things at once: older and newer records
//! written under the same key, plus any number of aliases. Resolution picks
//! the one answer a reader sees:
//!
//! 1. The latest record under the key is a candidate unless it has expired.
//! 2. Each unexpired alias under the key is resolved through its original
//!    key's latest record. If that record is live, the alias is a candidate
//!    carrying the original's payload but the alias's own key, expiration and
//!    creation time.
//! 3. The most recent surviving candidate wins.
//!
//! Expired or dangling entries seen on the way are reported so the caller can
//! schedule a sweep. Resolution itself never mutates either collection.

use crate::storage::alias::AliasEntries;
use crate::storage::expiry::is_expired;
use crate::storage::primary::PrimaryRecords;
use crate::storage::record::Record;
use chrono::{DateTime, Utc};

/// The answer to a lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The winning candidate, if any survived
    pub record: Option<Record>,
    /// True if an expired or dangling record/alias was observed
    pub needs_sweep: bool,
}

/// Resolves `key` against locked views of both collections.
pub fn resolve(
    primary: &PrimaryRecords,
    aliases: &AliasEntries,
    key: &str,
    now: DateTime<Utc>,
) -> Resolution {
    let mut needs_sweep = false;
    let mut best: Option<Record> = None;

    if let Some(record) = primary.latest(key) {
        if is_expired(record.expires_at, now) {
            needs_sweep = true;
        } else {
            best = Some(record.clone());
        }
    }

    for alias in aliases.find_by_key(key) {
        if is_expired(alias.expires_at, now) {
            needs_sweep = true;
            continue;
        }

        let original = match primary.latest(&alias.original_key) {
            Some(original) if !is_expired(original.expires_at, now) => original,
            _ => {
                needs_sweep = true;
                continue;
            }
        };

        let newer = best
            .as_ref()
            .map_or(true, |current| alias.recency() > current.recency());
        if newer {
            best = Some(original.promoted(alias));
        }
    }

    Resolution {
        record: best,
        needs_sweep,
    }
}
