//! Storage Engine Module
//!
//! This module provides the deduplication and expiration engine for dedupkv.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │                                                             │
//! │  ┌──────────────────┐  lock order  ┌──────────────────┐     │
//! │  │  PrimaryStore    │ ───────────> │   AliasIndex     │     │
//! │  │  Mutex<records>  │              │  Mutex<aliases>  │     │
//! │  └────────┬─────────┘              └────────┬─────────┘     │
//! │           └──────────────┬──────────────────┘               │
//! │                          ▼                                  │
//! │                  resolver::resolve                          │
//! └──────────────────────────┬──────────────────────────────────┘
//!                            │ stale data seen
//!                            ▼
//!              ┌───────────────────────────┐
//!              │        Sweeper            │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Content Deduplication**: identical payloads are stored once; later
//!   writes become aliases with their own expiration
//! - **Lazy Expiry**: expired entries are hidden from reads immediately
//! - **Alias Promotion**: when a record expires, its live aliases inherit the
//!   payload as records of their own
//! - **Deterministic Priority**: the most recently written entry under a key
//!   wins, ties broken by insertion order
//!
//! ## Example
//!
//! ```
//! use dedupkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use chrono::{Duration, Utc};
//!
//! let engine = StorageEngine::new();
//!
//! engine.write("name", Bytes::from("Ariz"), Utc::now() + Duration::minutes(5));
//! let record = engine.read("name").unwrap();
//! assert_eq!(record.data, Bytes::from("Ariz"));
//! ```

pub mod alias;
pub mod engine;
pub mod expiry;
pub mod primary;
pub mod record;
pub mod resolver;
pub mod sweeper;

// Re-export commonly used types
pub use alias::AliasIndex;
pub use engine::{StorageEngine, StorageStats};
pub use expiry::{is_expired, is_expired_now};
pub use primary::{Placement, PrimaryStore};
pub use record::{Alias, Record};
pub use resolver::Resolution;
pub use sweeper::{start_sweeper, SweepConfig, SweepReport, SweepTrigger, Sweeper};
