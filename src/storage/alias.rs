//! Alias Index
//!
//! When a write carries bytes that some record already holds, the engine
//! stores an [`Alias`] here instead of a second copy of the payload. Aliases
//! keep their own expiration, so a duplicate write gets its own lease even
//! though it shares bytes with an older entry.
//!
//! Like the primary store, aliases are kept in insertion order with a derived
//! key index, all behind one mutex. When both collections are needed, the
//! primary store's lock is taken first.

use crate::storage::expiry::is_expired;
use crate::storage::record::{Alias, Sequence};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Aliases plus their key index. Only reachable through a lock guard.
#[derive(Debug, Default)]
pub struct AliasEntries {
    aliases: Vec<Alias>,
    by_key: HashMap<String, Vec<usize>>,
}

impl AliasEntries {
    fn push(&mut self, alias: Alias) {
        let idx = self.aliases.len();
        self.by_key.entry(alias.key.clone()).or_default().push(idx);
        self.aliases.push(alias);
    }

    /// Returns every alias registered under `key`, live or expired, in insertion order.
    pub fn find_by_key<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a Alias> + 'a {
        self.by_key
            .get(key)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.aliases[idx])
    }

    /// Returns the unexpired aliases whose `original_key` is `original_key`.
    pub fn live_targeting<'a>(
        &'a self,
        original_key: &'a str,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &'a Alias> + 'a {
        self.aliases.iter().filter(move |alias| {
            alias.original_key == original_key && !is_expired(alias.expires_at, now)
        })
    }

    /// All aliases in insertion order.
    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Keeps only the aliases matching `keep` and returns how many were dropped.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&Alias) -> bool) -> usize {
        let before = self.aliases.len();
        let kept: Vec<Alias> = std::mem::take(&mut self.aliases)
            .into_iter()
            .filter(|alias| keep(alias))
            .collect();

        self.by_key.clear();
        for alias in kept {
            self.push(alias);
        }
        before - self.aliases.len()
    }
}

/// Thread-safe index of alias keys pointing at primary record keys.
#[derive(Debug)]
pub struct AliasIndex {
    inner: Mutex<AliasEntries>,
    sequence: Arc<Sequence>,
}

impl Default for AliasIndex {
    fn default() -> Self {
        Self::new(Arc::new(Sequence::new()))
    }
}

impl AliasIndex {
    /// Creates an empty index drawing insertion numbers from `sequence`.
    pub fn new(sequence: Arc<Sequence>) -> Self {
        Self {
            inner: Mutex::new(AliasEntries::default()),
            sequence,
        }
    }

    /// Acquires the index's critical section.
    pub(crate) fn lock(&self) -> MutexGuard<'_, AliasEntries> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `key` as an alias of the record stored under `original_key`.
    pub fn insert(
        &self,
        key: impl Into<String>,
        original_key: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) {
        let mut aliases = self.lock();
        let alias = Alias::new(key, original_key, expires_at, self.sequence.next());
        aliases.push(alias);
    }

    /// Returns every alias registered under `key`, in insertion order.
    pub fn find_by_key(&self, key: &str) -> Vec<Alias> {
        self.lock().find_by_key(key).cloned().collect()
    }

    /// Drops every expired alias and returns how many were removed.
    pub fn remove_expired(&self) -> usize {
        let now = Utc::now();
        self.lock()
            .retain(|alias| !is_expired(alias.expires_at, now))
    }

    /// Drops every alias registered under `key` and returns how many were removed.
    pub fn remove_by_key(&self, key: &str) -> usize {
        self.lock().retain(|alias| alias.key != key)
    }

    /// Copies out all aliases in insertion order.
    pub fn snapshot(&self) -> Vec<Alias> {
        self.lock().aliases().to_vec()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
