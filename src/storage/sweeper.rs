//! Background Sweeper
//!
//! Reads hide expired entries but never delete them. This module reclaims
//! them and keeps aliased content alive when its original record expires.
//!
//! ## The Sweep Pass
//!
//! For every record in the primary store:
//!
//! 1. Unexpired records are kept as-is.
//! 2. If the record has expired, every unexpired alias pointing at its key
//!    is **promoted**: a new record with the same payload but the alias's
//!    key, expiration and creation time takes the original's place. Several
//!    aliases give several records; no dedup happens here.
//! 3. An expired record that no live alias points at is dropped.
//!
//! Afterwards an alias survives only if it is unexpired and no record under
//! its original key expired in this pass.
//!
//! Running a pass twice in a row changes nothing the second time: promoted
//! records are live and every stale alias is already gone.
//!
//! ## Scheduling
//!
//! A single background task consumes a [`SweepTrigger`]. Reads that observe
//! stale data call [`SweepTrigger::request`]; requests made while a sweep is
//! pending collapse into one. The task also sweeps on a fixed interval so
//! entries that are never read again are still reclaimed.

use crate::storage::alias::AliasEntries;
use crate::storage::expiry::is_expired;
use crate::storage::primary::PrimaryRecords;
use crate::storage::StorageEngine;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, trace};

/// What a single sweep pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Aliases turned into records
    pub promoted: u64,
    /// Expired records removed without a successor
    pub records_dropped: u64,
    /// Aliases removed (expired, promoted or orphaned)
    pub aliases_dropped: u64,
}

impl SweepReport {
    /// Returns true if the pass modified either collection.
    pub fn changed(&self) -> bool {
        self.promoted > 0 || self.records_dropped > 0 || self.aliases_dropped > 0
    }
}

/// Runs one sweep pass over both collections.
///
/// The caller must hold both critical sections (primary store first) so the
/// pass sees, and publishes, one consistent state.
pub(crate) fn sweep(
    primary: &mut PrimaryRecords,
    aliases: &mut AliasEntries,
    now: DateTime<Utc>,
) -> SweepReport {
    let mut report = SweepReport::default();
    let mut expired_keys = HashSet::new();
    let mut kept = Vec::with_capacity(primary.len());

    for record in primary.records() {
        if !is_expired(record.expires_at, now) {
            kept.push(record.clone());
            continue;
        }

        expired_keys.insert(record.key.clone());

        let mut replaced = false;
        for alias in aliases.live_targeting(&record.key, now) {
            trace!(original = %record.key, alias = %alias.key, "Promoting alias");
            kept.push(record.promoted(alias));
            replaced = true;
            report.promoted += 1;
        }

        if !replaced {
            report.records_dropped += 1;
        }
    }

    primary.replace(kept);

    // Aliases of a key that expired this pass are retired whether or not
    // they were promoted. So are expired ones, and any left without a target.
    let dropped = aliases.retain(|alias| {
        !is_expired(alias.expires_at, now)
            && !expired_keys.contains(&alias.original_key)
            && primary.latest(&alias.original_key).is_some()
    });
    report.aliases_dropped = dropped as u64;

    report
}

/// Wakes the background sweeper.
///
/// Cloning shares the same underlying signal. Requests coalesce: however many
/// arrive before the sweeper wakes, it runs once.
#[derive(Debug, Clone, Default)]
pub struct SweepTrigger {
    notify: Arc<Notify>,
}

impl SweepTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks for a sweep. Never blocks.
    pub fn request(&self) {
        self.notify.notify_one();
    }

    /// Waits until a sweep has been requested.
    pub async fn requested(&self) {
        self.notify.notified().await;
    }
}

/// Configuration for the background sweeper.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Interval between unprompted sweeps (None = only sweep on request)
    pub interval: Option<Duration>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Some(Duration::from_secs(1)),
        }
    }
}

/// A handle to the running sweeper task.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct Sweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
}

impl Sweeper {
    /// Starts the sweeper as a background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use dedupkv::storage::{StorageEngine, Sweeper, SweepConfig};
    /// use std::sync::Arc;
    ///
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = Sweeper::start(Arc::clone(&engine), SweepConfig::default());
    ///
    /// // Dropping the handle stops the task
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: SweepConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));

        info!("Background sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the sweeper.
    ///
    /// This is called automatically when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("Background sweeper stopped");
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: SweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let trigger = engine.sweep_trigger().clone();

    loop {
        tokio::select! {
            _ = trigger.requested() => {
                trace!("Sweep requested by a read");
            }
            _ = tick(config.interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Sweeper received shutdown signal");
                    return;
                }
            }
        }

        let report = engine.sweep();

        if report.changed() {
            debug!(
                promoted = report.promoted,
                records_dropped = report.records_dropped,
                aliases_dropped = report.aliases_dropped,
                records_remaining = engine.record_count(),
                aliases_remaining = engine.alias_count(),
                "Sweep reclaimed expired entries"
            );
        }
    }
}

/// Starts the sweeper with default configuration.
///
/// This is a convenience function for simple use cases.
pub fn start_sweeper(engine: Arc<StorageEngine>) -> Sweeper {
    Sweeper::start(engine, SweepConfig::default())
}

async fn tick(interval: Option<Duration>) {
    match interval {
        Some(interval) => tokio::time::sleep(interval).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::alias::AliasIndex;
    use crate::storage::primary::PrimaryStore;
    use crate::storage::record::Sequence;
    use bytes::Bytes;
    use chrono::Duration as TimeDelta;

    fn fixture() -> (PrimaryStore, AliasIndex) {
        let sequence = Arc::new(Sequence::new());
        (
            PrimaryStore::new(Arc::clone(&sequence)),
            AliasIndex::new(sequence),
        )
    }

    fn run(primary: &PrimaryStore, aliases: &AliasIndex) -> SweepReport {
        let mut records = primary.lock();
        let mut entries = aliases.lock();
        sweep(&mut records, &mut entries, Utc::now())
    }

    fn future() -> DateTime<Utc> {
        Utc::now() + TimeDelta::hours(1)
    }

    fn past() -> DateTime<Utc> {
        Utc::now() - TimeDelta::hours(1)
    }

    #[test]
    fn test_keeps_live_records() {
        let (primary, aliases) = fixture();
        primary.insert("a", Bytes::from("x"), future());
        aliases.insert("b", "a", future());

        let report = run(&primary, &aliases);
        assert!(!report.changed());
        assert_eq!(primary.len(), 1);
        assert_eq!(aliases.len(), 1);
    }

    #[test]
    fn test_drops_expired_without_aliases() {
        let (primary, aliases) = fixture();
        primary.insert("a", Bytes::from("x"), past());
        primary.insert("b", Bytes::from("y"), future());

        let report = run(&primary, &aliases);
        assert_eq!(report.records_dropped, 1);
        assert_eq!(report.promoted, 0);
        assert_eq!(primary.len(), 1);
        assert!(primary.find_by_key("a").is_empty());
    }

    #[test]
    fn test_promotes_live_alias() {
        let (primary, aliases) = fixture();
        primary.insert("k", Bytes::from("payload"), past());
        let alias_expiry = future();
        aliases.insert("k2", "k", alias_expiry);

        let report = run(&primary, &aliases);
        assert_eq!(report.promoted, 1);
        assert_eq!(report.records_dropped, 0);
        assert_eq!(report.aliases_dropped, 1);

        let records = primary.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "k2");
        assert_eq!(records[0].data, Bytes::from("payload"));
        assert_eq!(records[0].expires_at, alias_expiry);
        assert!(aliases.is_empty());
    }

    #[test]
    fn test_promotes_each_live_alias() {
        let (primary, aliases) = fixture();
        primary.insert("k", Bytes::from("payload"), past());
        aliases.insert("k2", "k", future());
        aliases.insert("k3", "k", future());
        aliases.insert("k4", "k", past());

        let report = run(&primary, &aliases);
        assert_eq!(report.promoted, 2);
        assert_eq!(report.aliases_dropped, 3);

        let keys: Vec<_> = primary.snapshot().into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["k2", "k3"]);
    }

    #[test]
    fn test_every_expired_copy_promotes() {
        let (primary, aliases) = fixture();
        primary.insert("k", Bytes::from("old"), past());
        primary.insert("k", Bytes::from("new"), past());
        aliases.insert("k2", "k", future());

        let report = run(&primary, &aliases);
        assert_eq!(report.promoted, 2);
        assert_eq!(report.records_dropped, 0);
        assert_eq!(report.aliases_dropped, 1);

        let data: Vec<_> = primary.snapshot().into_iter().map(|r| r.data).collect();
        assert_eq!(data, vec![Bytes::from("old"), Bytes::from("new")]);

        // Equal recency, the copy of the newer original is stored last and wins
        let latest = primary.latest("k2").unwrap();
        assert_eq!(latest.data, Bytes::from("new"));
    }

    #[test]
    fn test_drops_expired_alias_with_live_original() {
        let (primary, aliases) = fixture();
        primary.insert("a", Bytes::from("x"), future());
        aliases.insert("b", "a", past());
        aliases.insert("c", "a", future());

        let report = run(&primary, &aliases);
        assert_eq!(report.aliases_dropped, 1);
        assert_eq!(aliases.find_by_key("c").len(), 1);
        assert!(aliases.find_by_key("b").is_empty());
    }

    #[test]
    fn test_promotes_from_shadowed_expired_record() {
        let (primary, aliases) = fixture();
        primary.insert("k", Bytes::from("A"), past());
        primary.insert("k", Bytes::from("B"), future());
        aliases.insert("k2", "k", future());

        let report = run(&primary, &aliases);
        assert_eq!(report.promoted, 1);
        assert_eq!(report.records_dropped, 0);
        assert_eq!(report.aliases_dropped, 1);
        assert!(aliases.is_empty());

        let promoted = primary.latest("k2").unwrap();
        assert_eq!(promoted.data, Bytes::from("A"));
        assert_eq!(primary.latest("k").unwrap().data, Bytes::from("B"));
    }

    #[test]
    fn test_drops_dangling_alias() {
        let (primary, aliases) = fixture();
        aliases.insert("b", "gone", future());

        let report = run(&primary, &aliases);
        assert_eq!(report.aliases_dropped, 1);
        assert!(aliases.is_empty());
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let (primary, aliases) = fixture();
        primary.insert("k", Bytes::from("p"), past());
        primary.insert("x", Bytes::from("q"), future());
        aliases.insert("k2", "k", future());
        aliases.insert("y", "x", future());
        aliases.insert("z", "x", past());

        let first = run(&primary, &aliases);
        assert!(first.changed());
        let records = primary.snapshot();
        let entries = aliases.snapshot();

        let second = run(&primary, &aliases);
        assert!(!second.changed());
        assert_eq!(primary.snapshot(), records);
        assert_eq!(aliases.snapshot(), entries);
    }

    #[tokio::test]
    async fn test_sweeper_runs_on_request() {
        let engine = Arc::new(StorageEngine::new());
        engine.write("k", Bytes::from("payload"), past());
        engine.write("k2", Bytes::from("payload"), future());

        let config = SweepConfig { interval: None };
        let _sweeper = Sweeper::start(Arc::clone(&engine), config);

        // Stale read schedules a sweep
        assert!(engine.read("k").is_none());

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(engine.alias_count(), 0);
        assert_eq!(engine.record_count(), 1);
        assert_eq!(engine.read("k2").unwrap().data, Bytes::from("payload"));
    }

    #[tokio::test]
    async fn test_sweeper_runs_on_interval() {
        let engine = Arc::new(StorageEngine::new());
        for i in 0..10 {
            engine.write(format!("key{}", i), Bytes::from(format!("v{}", i)), past());
        }
        engine.write("persistent", Bytes::from("value"), future());

        let config = SweepConfig {
            interval: Some(std::time::Duration::from_millis(10)),
        };
        let _sweeper = Sweeper::start(Arc::clone(&engine), config);

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        assert_eq!(engine.record_count(), 1);
        assert!(engine.read("persistent").is_some());
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let engine = Arc::new(StorageEngine::new());

        {
            let config = SweepConfig {
                interval: Some(std::time::Duration::from_millis(10)),
            };
            let _sweeper = Sweeper::start(Arc::clone(&engine), config);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        engine.write("key", Bytes::from("value"), past());
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        // Still physically present, just hidden from reads
        assert_eq!(engine.record_count(), 1);
        assert!(engine.read("key").is_none());
    }

    #[test]
    fn test_trigger_coalesces_without_runtime() {
        let trigger = SweepTrigger::new();
        for _ in 0..100 {
            trigger.request();
        }
    }
}
