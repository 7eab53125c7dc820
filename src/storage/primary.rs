//! Primary Record Store
//!
//! Holds every stored payload. Records live in an append-only vector in
//! insertion order, with two derived indexes:
//!
//! ```text
//! records:    [ r0 "a" | r1 "k" | r2 "k" | r3 "b" ]
//! by_key:     "a" -> [0]   "k" -> [1, 2]   "b" -> [3]
//! by_content: hash(data) -> [indices with that hash]
//! ```
//!
//! The same key may be written several times, so `by_key` maps to all of its
//! records and the priority rule ("latest wins") is a max-by-recency fold over
//! those indices. `by_content` narrows the dedup lookup to records whose payload
//! hash matches before confirming with an exact byte comparison.
//!
//! All access goes through a single mutex. The resolver and the sweeper need a
//! consistent view of this store together with the alias index, so they hold
//! the guard from [`PrimaryStore::lock`] directly. Lock order is always
//! primary store first, then alias index.

use crate::storage::alias::AliasIndex;
use crate::storage::expiry::is_expired;
use crate::storage::record::{Record, Sequence};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outcome of a deduplicating insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// No record held these bytes; a new record was stored
    Stored,
    /// A record already holds these bytes under `original_key`
    Duplicate { original_key: String },
}

/// Records plus their derived indexes. Only reachable through a lock guard.
#[derive(Debug, Default)]
pub struct PrimaryRecords {
    records: Vec<Record>,
    by_key: HashMap<String, Vec<usize>>,
    by_content: HashMap<u64, Vec<usize>>,
}

impl PrimaryRecords {
    fn push(&mut self, record: Record) {
        let idx = self.records.len();
        self.by_key.entry(record.key.clone()).or_default().push(idx);
        self.by_content
            .entry(content_hash(&record.data))
            .or_default()
            .push(idx);
        self.records.push(record);
    }

    /// Returns the earliest-inserted record whose payload equals `data`.
    ///
    /// Expired records are eligible: content identity outlives key leases.
    pub fn find_by_content(&self, data: &[u8]) -> Option<&Record> {
        self.by_content
            .get(&content_hash(data))?
            .iter()
            .map(|&idx| &self.records[idx])
            .find(|record| record.data.as_ref() == data)
    }

    /// Returns every record written under `key`, live or expired, in insertion order.
    pub fn find_by_key<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a Record> + 'a {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.records[idx])
    }

    /// Returns the record `key` currently resolves to: the one with the
    /// greatest `(created_at, seq)`, expired or not. On equal recency the
    /// later-inserted record wins.
    pub fn latest(&self, key: &str) -> Option<&Record> {
        self.by_key
            .get(key)?
            .iter()
            .map(|&idx| &self.records[idx])
            .max_by_key(|record| record.recency())
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replaces the whole collection and rebuilds both indexes.
    pub(crate) fn replace(&mut self, records: Vec<Record>) {
        self.records.clear();
        self.by_key.clear();
        self.by_content.clear();
        for record in records {
            self.push(record);
        }
    }

    /// Drops every expired record and returns how many were removed.
    pub(crate) fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        let kept: Vec<Record> = std::mem::take(&mut self.records)
            .into_iter()
            .filter(|record| !is_expired(record.expires_at, now))
            .collect();
        self.replace(kept);
        before - self.records.len()
    }
}

/// Thread-safe store of content records keyed by write key.
///
/// Designed to be owned by a [`StorageEngine`](crate::storage::StorageEngine)
/// and shared across connection tasks. No reference to a stored record
/// escapes: lookups return clones (payloads are reference-counted `Bytes`).
#[derive(Debug)]
pub struct PrimaryStore {
    inner: Mutex<PrimaryRecords>,
    sequence: Arc<Sequence>,
}

impl Default for PrimaryStore {
    fn default() -> Self {
        Self::new(Arc::new(Sequence::new()))
    }
}

impl PrimaryStore {
    /// Creates an empty store drawing insertion numbers from `sequence`.
    pub fn new(sequence: Arc<Sequence>) -> Self {
        Self {
            inner: Mutex::new(PrimaryRecords::default()),
            sequence,
        }
    }

    /// Acquires the store's critical section.
    pub(crate) fn lock(&self) -> MutexGuard<'_, PrimaryRecords> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a new record stamped with the current time.
    ///
    /// Does not deduplicate; see [`insert_unique`](Self::insert_unique).
    pub fn insert(&self, key: impl Into<String>, data: Bytes, expires_at: DateTime<Utc>) -> String {
        let mut records = self.lock();
        let record = Record::new(key, data, expires_at, self.sequence.next());
        let key = record.key.clone();
        records.push(record);
        key
    }

    /// Probes for `data` and inserts a new record only if no record holds it.
    /// Otherwise `key` is registered in `aliases` as an alias of the holder.
    ///
    /// The lookup, the record insert and the alias insert all happen under
    /// this store's critical section (alias index taken second), so neither
    /// a concurrent identical write nor a sweep can slip in between.
    pub fn insert_unique(
        &self,
        key: impl Into<String>,
        data: Bytes,
        expires_at: DateTime<Utc>,
        aliases: &AliasIndex,
    ) -> Placement {
        let mut records = self.lock();
        if let Some(existing) = records.find_by_content(&data) {
            let original_key = existing.key.clone();
            aliases.insert(key, original_key.clone(), expires_at);
            return Placement::Duplicate { original_key };
        }
        records.push(Record::new(key, data, expires_at, self.sequence.next()));
        Placement::Stored
    }

    /// Returns the key of the first record (in insertion order) holding `data`.
    pub fn find_by_content(&self, data: &[u8]) -> Option<String> {
        self.lock().find_by_content(data).map(|r| r.key.clone())
    }

    /// Returns every record written under `key`, in insertion order.
    pub fn find_by_key(&self, key: &str) -> Vec<Record> {
        self.lock().find_by_key(key).cloned().collect()
    }

    /// Returns the most recent record written under `key`, expired or not.
    pub fn latest(&self, key: &str) -> Option<Record> {
        self.lock().latest(key).cloned()
    }

    /// Drops every expired record without promoting anything.
    pub fn remove_expired(&self) -> usize {
        self.lock().remove_expired(Utc::now())
    }

    /// Copies out all records in insertion order.
    pub fn snapshot(&self) -> Vec<Record> {
        self.lock().records().to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[inline]
fn content_hash(data: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}
