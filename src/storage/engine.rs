//! Deduplicating Storage Engine
//!
//! This module ties the primary store, the alias index, read resolution and
//! sweeping together behind the two operations clients use: WRITE and READ.
//!
//! ## Write Path
//!
//! ```text
//! write(key, data, expires_at)
//!        │
//!        ▼
//! ┌──────────────────────────┐  no match   ┌──────────────────────┐
//! │ PrimaryStore::insert_    │────────────>│ new Record stored    │
//! │ unique (check + insert)  │             └──────────────────────┘
//! └────────────┬─────────────┘
//!              │ bytes already held under `original`
//!              ▼
//! ┌──────────────────────────┐
//! │ AliasIndex::insert(key,  │
//! │   original, expires_at)  │
//! └──────────────────────────┘
//! ```
//!
//! ## Read Path
//!
//! Both critical sections are taken (primary store first), the resolver picks
//! the winning candidate, and the locks are released. If anything stale was
//! observed a sweep is requested; the read never waits for it.
//!
//! ## Design Decisions
//!
//! 1. **Explicit ownership**: the engine is constructed by the caller and
//!    shared through an `Arc`; there is no process-wide singleton.
//! 2. **Atomic dedup check**: checking for duplicate content and inserting the
//!    new record or alias happen under the primary store's lock, so identical
//!    concurrent writes store exactly one copy and a sweep never sees a
//!    duplicate without its alias.
//! 3. **Content identity outlives leases**: an expired record's payload still
//!    satisfies the dedup check until it is swept.

use crate::storage::alias::AliasIndex;
use crate::storage::primary::{Placement, PrimaryStore};
use crate::storage::record::{Record, Sequence};
use crate::storage::resolver::resolve;
use crate::storage::sweeper::{self, SweepReport, SweepTrigger};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// The storage engine behind WRITE and READ.
///
/// This struct is designed to be wrapped in an `Arc` and shared across all
/// connection tasks and the background sweeper. All operations are
/// thread-safe and complete without blocking on I/O.
///
/// # Example
///
/// ```
/// use dedupkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use chrono::{Duration, Utc};
///
/// let engine = StorageEngine::new();
/// let expires = Utc::now() + Duration::hours(1);
///
/// engine.write("a", Bytes::from("payload"), expires);
/// engine.write("b", Bytes::from("payload"), expires);
///
/// // One stored copy, two readable keys
/// assert_eq!(engine.record_count(), 1);
/// assert_eq!(engine.read("b").unwrap().data, Bytes::from("payload"));
/// ```
pub struct StorageEngine {
    primary: PrimaryStore,
    aliases: AliasIndex,
    trigger: SweepTrigger,

    /// Statistics: total WRITE operations
    write_count: AtomicU64,

    /// Statistics: writes that became aliases
    dedup_count: AtomicU64,

    /// Statistics: total READ operations
    read_count: AtomicU64,

    /// Statistics: reads that found a live entry
    hit_count: AtomicU64,

    /// Statistics: completed sweep passes
    sweep_count: AtomicU64,

    /// Statistics: aliases promoted to records
    promoted_count: AtomicU64,

    /// Statistics: expired records removed
    records_dropped: AtomicU64,

    /// Statistics: aliases removed
    aliases_dropped: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("records", &self.primary.len())
            .field("aliases", &self.aliases.len())
            .field("write_count", &self.write_count.load(Ordering::Relaxed))
            .field("read_count", &self.read_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        let sequence = Arc::new(Sequence::new());

        Self {
            primary: PrimaryStore::new(Arc::clone(&sequence)),
            aliases: AliasIndex::new(sequence),
            trigger: SweepTrigger::new(),
            write_count: AtomicU64::new(0),
            dedup_count: AtomicU64::new(0),
            read_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            sweep_count: AtomicU64::new(0),
            promoted_count: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            aliases_dropped: AtomicU64::new(0),
        }
    }

    /// Stores `data` under `key` until `expires_at`.
    ///
    /// If some record already holds exactly these bytes (even an expired one
    /// that has not been swept yet), no copy is made: `key` becomes an alias
    /// of that record with its own expiration.
    ///
    /// # Returns
    ///
    /// The key the payload is readable under, which is always `key`.
    pub fn write(&self, key: impl Into<String>, data: Bytes, expires_at: DateTime<Utc>) -> String {
        self.write_count.fetch_add(1, Ordering::Relaxed);

        let key = key.into();
        match self
            .primary
            .insert_unique(key.clone(), data, expires_at, &self.aliases)
        {
            Placement::Stored => {
                trace!(key = %key, "Stored new record");
            }
            Placement::Duplicate { original_key } => {
                trace!(key = %key, original = %original_key, "Deduplicated write into alias");
                self.dedup_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        key
    }

    /// Looks up the live entry for `key`.
    ///
    /// Returns `None` when nothing live matches; see [`Record::absent`] for
    /// the zero-valued form. If the lookup observed expired data a sweep is
    /// requested in the background.
    pub fn read(&self, key: &str) -> Option<Record> {
        self.read_count.fetch_add(1, Ordering::Relaxed);

        let resolution = {
            let records = self.primary.lock();
            let aliases = self.aliases.lock();
            resolve(&records, &aliases, key, Utc::now())
        };

        if resolution.needs_sweep {
            trace!(key = %key, "Read observed stale entries, requesting sweep");
            self.trigger.request();
        }

        if resolution.record.is_some() {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
        }

        resolution.record
    }

    /// Runs one sweep pass now, promoting and removing expired entries.
    pub fn sweep(&self) -> SweepReport {
        let report = {
            let mut records = self.primary.lock();
            let mut aliases = self.aliases.lock();
            sweeper::sweep(&mut records, &mut aliases, Utc::now())
        };

        self.sweep_count.fetch_add(1, Ordering::Relaxed);
        self.promoted_count
            .fetch_add(report.promoted, Ordering::Relaxed);
        self.records_dropped
            .fetch_add(report.records_dropped, Ordering::Relaxed);
        self.aliases_dropped
            .fetch_add(report.aliases_dropped, Ordering::Relaxed);

        report
    }

    /// The signal reads use to request a sweep.
    pub fn sweep_trigger(&self) -> &SweepTrigger {
        &self.trigger
    }

    /// The primary record store.
    pub fn primary(&self) -> &PrimaryStore {
        &self.primary
    }

    /// The alias index.
    pub fn aliases(&self) -> &AliasIndex {
        &self.aliases
    }

    /// Number of records physically stored, including expired ones.
    pub fn record_count(&self) -> usize {
        self.primary.len()
    }

    /// Number of aliases physically stored, including expired ones.
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    /// Returns engine statistics.
    pub fn stats(&self) -> StorageStats {
        let reads = self.read_count.load(Ordering::Relaxed);
        let hits = self.hit_count.load(Ordering::Relaxed);

        StorageStats {
            records: self.record_count() as u64,
            aliases: self.alias_count() as u64,
            writes: self.write_count.load(Ordering::Relaxed),
            deduplicated: self.dedup_count.load(Ordering::Relaxed),
            reads,
            hits,
            misses: reads.saturating_sub(hits),
            sweeps: self.sweep_count.load(Ordering::Relaxed),
            promoted: self.promoted_count.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            aliases_dropped: self.aliases_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Engine statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Records currently stored
    pub records: u64,
    /// Aliases currently stored
    pub aliases: u64,
    /// Total WRITE operations
    pub writes: u64,
    /// Writes stored as aliases
    pub deduplicated: u64,
    /// Total READ operations
    pub reads: u64,
    /// Reads that returned an entry
    pub hits: u64,
    /// Reads that returned nothing
    pub misses: u64,
    /// Sweep passes run
    pub sweeps: u64,
    /// Aliases promoted to records
    pub promoted: u64,
    /// Expired records removed
    pub records_dropped: u64,
    /// Aliases removed
    pub aliases_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn future() -> DateTime<Utc> {
        Utc::now() + Duration::hours(1)
    }

    fn past() -> DateTime<Utc> {
        Utc::now() - Duration::hours(1)
    }

    #[test]
    fn test_round_trip() {
        let engine = StorageEngine::new();

        let key = engine.write("x", Bytes::from(vec![1u8, 2, 3]), future());
        assert_eq!(key, "x");

        let record = engine.read("x").unwrap();
        assert_eq!(record.key, "x");
        assert_eq!(record.data, Bytes::from(vec![1u8, 2, 3]));
    }

    #[test]
    fn test_read_missing() {
        let engine = StorageEngine::new();
        assert!(engine.read("nonexistent").is_none());
    }

    #[test]
    fn test_dedup_stores_single_copy() {
        let engine = StorageEngine::new();

        engine.write("a", Bytes::from("D"), future());
        engine.write("b", Bytes::from("D"), future());

        assert_eq!(engine.record_count(), 1);
        assert_eq!(engine.alias_count(), 1);

        let record = engine.read("b").unwrap();
        assert_eq!(record.key, "b");
        assert_eq!(record.data, Bytes::from("D"));
        assert_eq!(engine.read("a").unwrap().data, Bytes::from("D"));
    }

    #[test]
    fn test_priority_later_write_wins() {
        let engine = StorageEngine::new();

        engine.write("k", Bytes::from("first"), future());
        engine.write("k", Bytes::from("second"), future());

        assert_eq!(engine.read("k").unwrap().data, Bytes::from("second"));
    }

    #[test]
    fn test_expired_record_is_hidden() {
        let engine = StorageEngine::new();

        engine.write("k", Bytes::from("v"), past());

        assert!(engine.read("k").is_none());
        // Hidden, not deleted
        assert_eq!(engine.record_count(), 1);
    }

    #[test]
    fn test_dedup_matches_expired_content() {
        let engine = StorageEngine::new();

        engine.write("dead", Bytes::from("D"), past());
        engine.write("live", Bytes::from("D"), future());

        assert_eq!(engine.record_count(), 1);
        assert_eq!(engine.alias_count(), 1);
    }

    #[test]
    fn test_alias_promotion_after_sweep() {
        let engine = StorageEngine::new();

        engine.write("k", Bytes::from("payload"), past());
        let alias_expiry = future();
        engine.write("k2", Bytes::from("payload"), alias_expiry);

        let report = engine.sweep();
        assert_eq!(report.promoted, 1);

        // Served directly by a record now, without the alias
        assert_eq!(engine.alias_count(), 0);
        let stored = engine.primary().find_by_key("k2");
        assert_eq!(stored.len(), 1);

        let record = engine.read("k2").unwrap();
        assert_eq!(record.key, "k2");
        assert_eq!(record.data, Bytes::from("payload"));
        assert_eq!(record.expires_at, alias_expiry);
        assert!(engine.read("k").is_none());
    }

    #[test]
    fn test_sweep_idempotence() {
        let engine = StorageEngine::new();

        engine.write("k", Bytes::from("p"), past());
        engine.write("k2", Bytes::from("p"), future());
        engine.write("gone", Bytes::from("q"), past());
        engine.write("stay", Bytes::from("r"), future());

        engine.sweep();
        let records = engine.primary().snapshot();
        let aliases = engine.aliases().snapshot();

        let second = engine.sweep();
        assert!(!second.changed());
        assert_eq!(engine.primary().snapshot(), records);
        assert_eq!(engine.aliases().snapshot(), aliases);
    }

    #[test]
    fn test_scenario_priority_then_alias() {
        let engine = StorageEngine::new();
        let expired = Utc.with_ymd_and_hms(2012, 11, 1, 22, 8, 41).unwrap();
        let valid = Utc::now() + Duration::days(365);

        engine.write("key2", Bytes::from("lknkjnm"), expired);
        engine.write("key2", Bytes::from("lknkZnm"), valid);

        let record = engine.read("key2").unwrap();
        assert_eq!(record.key, "key2");
        assert_eq!(record.data, Bytes::from("lknkZnm"));
        assert_eq!(record.expires_at, valid);

        engine.write("key3", Bytes::from("lknkZnm"), valid);
        assert_eq!(engine.record_count(), 2);

        let record = engine.read("key3").unwrap();
        assert_eq!(record.key, "key3");
        assert_eq!(record.data, Bytes::from("lknkZnm"));
        assert_eq!(record.expires_at, valid);
    }

    #[test]
    fn test_stale_read_requests_sweep() {
        let engine = StorageEngine::new();
        engine.write("k", Bytes::from("v"), past());

        engine.read("k");

        // The permit is stored until the sweeper task takes it
        let trigger = engine.sweep_trigger().clone();
        let requested = tokio_test::block_on(async {
            tokio::time::timeout(std::time::Duration::from_millis(50), trigger.requested()).await
        });
        assert!(requested.is_ok());
    }

    #[test]
    fn test_fresh_read_does_not_request_sweep() {
        let engine = StorageEngine::new();
        engine.write("k", Bytes::from("v"), future());

        engine.read("k");

        let trigger = engine.sweep_trigger().clone();
        let requested = tokio_test::block_on(async {
            tokio::time::timeout(std::time::Duration::from_millis(20), trigger.requested()).await
        });
        assert!(requested.is_err());
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();

        engine.write("a", Bytes::from("x"), future());
        engine.write("b", Bytes::from("x"), future());
        engine.read("a");
        engine.read("missing");
        engine.sweep();

        let stats = engine.stats();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.aliases, 1);
        assert_eq!(stats.writes, 2);
        assert_eq!(stats.deduplicated, 1);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sweeps, 1);
    }

    #[test]
    fn test_concurrent_access() {
        use std::thread;

        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    // Every thread writes the same 100 payloads
                    engine.write(key.clone(), Bytes::from(format!("value-{}", j)), future());
                    assert!(engine.read(&key).is_some());
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.record_count(), 100);
        assert_eq!(engine.alias_count(), 900);
    }

    #[test]
    fn test_dedup_writes_racing_sweeps_keep_payload() {
        use std::sync::atomic::AtomicBool;
        use std::thread;

        let engine = Arc::new(StorageEngine::new());
        engine.write("k", Bytes::from("A"), past());

        let writing = Arc::new(AtomicBool::new(true));
        let sweeper = {
            let engine = Arc::clone(&engine);
            let writing = Arc::clone(&writing);
            thread::spawn(move || {
                while writing.load(Ordering::Relaxed) {
                    engine.sweep();
                }
            })
        };

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..200 {
                        engine.write(format!("w-{}-{}", t, i), Bytes::from("A"), future());
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        writing.store(false, Ordering::Relaxed);
        sweeper.join().unwrap();
        engine.sweep();

        // Every acknowledged write is readable, nothing points at a vanished key
        for t in 0..4 {
            for i in 0..200 {
                let record = engine.read(&format!("w-{}-{}", t, i)).unwrap();
                assert_eq!(record.data, Bytes::from("A"));
            }
        }
        assert!(engine.read("k").is_none());
    }

    #[test]
    fn test_sweep_promotes_alias_of_shadowed_record() {
        let engine = StorageEngine::new();
        engine.write("k", Bytes::from("A"), past());
        engine.write("k", Bytes::from("B"), future());
        engine.write("k2", Bytes::from("A"), future());

        let report = engine.sweep();
        assert_eq!(report.promoted, 1);
        assert_eq!(report.records_dropped, 0);
        assert_eq!(engine.alias_count(), 0);

        assert_eq!(engine.read("k2").unwrap().data, Bytes::from("A"));
        assert_eq!(engine.read("k").unwrap().data, Bytes::from("B"));
    }
}
