//! Stored Records and Aliases
//!
//! A [`Record`] owns a payload. An [`Alias`] is a second key that shares the
//! payload of an existing record instead of storing another copy.
//!
//! Both carry a `seq` number drawn from one engine-wide [`Sequence`]. Creation
//! times come from the wall clock and can collide, so recency is always the
//! pair `(created_at, seq)`: the later insertion wins a timestamp tie.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// A stored payload with its own key, expiration and creation time.
///
/// Records are never mutated in place. A sweep may replace an expired record
/// with a promoted copy that keeps the payload but takes an alias's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// The key this record was written under
    pub key: String,
    /// The opaque payload, compared byte-for-byte for deduplication
    pub data: Bytes,
    /// When this record stops being visible to reads
    pub expires_at: DateTime<Utc>,
    /// When this record was inserted
    pub created_at: DateTime<Utc>,
    /// Insertion order, used to break `created_at` ties
    pub seq: u64,
}

impl Record {
    /// Creates a record stamped with the current time.
    pub fn new(key: impl Into<String>, data: Bytes, expires_at: DateTime<Utc>, seq: u64) -> Self {
        Self {
            key: key.into(),
            data,
            expires_at,
            created_at: Utc::now(),
            seq,
        }
    }

    /// The zero-valued record returned to readers when nothing matches.
    pub fn absent() -> Self {
        Self::default()
    }

    /// Returns true if this is the zero-valued "not found" record.
    pub fn is_absent(&self) -> bool {
        self.key.is_empty() && self.data.is_empty() && self.seq == 0
    }

    /// Ordering key for the priority rule.
    #[inline]
    pub fn recency(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.seq)
    }

    /// Builds the record that replaces an expired original when `alias` is
    /// promoted: same payload, the alias's key and lease.
    pub fn promoted(&self, alias: &Alias) -> Self {
        Self {
            key: alias.key.clone(),
            data: self.data.clone(),
            expires_at: alias.expires_at,
            created_at: alias.created_at,
            seq: alias.seq,
        }
    }
}

/// A pointer from a client-visible key to another record's payload.
///
/// `original_key` always names a record key, never another alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// The new key written by the client
    pub key: String,
    /// Key of the record whose payload this alias shares
    pub original_key: String,
    /// Expiration, independent of the original record's
    pub expires_at: DateTime<Utc>,
    /// When this alias was inserted
    pub created_at: DateTime<Utc>,
    /// Insertion order, used to break `created_at` ties
    pub seq: u64,
}

impl Alias {
    /// Creates an alias stamped with the current time.
    pub fn new(
        key: impl Into<String>,
        original_key: impl Into<String>,
        expires_at: DateTime<Utc>,
        seq: u64,
    ) -> Self {
        Self {
            key: key.into(),
            original_key: original_key.into(),
            expires_at,
            created_at: Utc::now(),
            seq,
        }
    }

    #[inline]
    pub fn recency(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.seq)
    }
}

/// Monotonic insertion counter shared by the primary store and alias index.
///
/// Starts at 1 so that `seq == 0` only ever appears on the absent record.
#[derive(Debug)]
pub struct Sequence(AtomicU64);

impl Sequence {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Returns the next sequence number.
    #[inline]
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}
