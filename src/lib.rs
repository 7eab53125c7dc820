//! # dedupkv - A Content-Deduplicating In-Memory Key-Value Store
//!
//! dedupkv stores binary payloads under keys, each with an expiration time,
//! and serves them over a small JSON-over-HTTP interface.
//!
//! ## Features
//!
//! - **Deduplication**: Writing a payload that is already stored under
//!   another key records an alias instead of a second copy
//! - **Expiry without deletion**: Expired entries are invisible to reads but
//!   stay in memory until the background sweep reconciles them
//! - **Promotion**: When a record expires while aliases to it are still
//!   valid, the sweep promotes the most recent alias into a record under its
//!   own key, so the payload survives
//! - **Async I/O**: Built on Tokio
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              dedupkv                                │
//! │                                                                     │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐              │
//! │  │ TCP Server  │───>│ axum Router │───>│ Wire codec  │              │
//! │  │ (Listener)  │    │  + tracing  │    │ JSON/base64 │              │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘              │
//! │                                               │ write / read        │
//! │                                               ▼                     │
//! │                     ┌──────────────────────────────────────────┐    │
//! │                     │              StorageEngine               │    │
//! │                     │  ┌──────────────┐   ┌──────────────┐     │    │
//! │                     │  │ PrimaryStore │   │  AliasIndex  │     │    │
//! │                     │  └──────────────┘   └──────────────┘     │    │
//! │                     └──────────────────────────────────────────┘    │
//! │                                               ▲                     │
//! │                     ┌─────────────────────────┴───────────────────┐ │
//! │                     │   Sweeper (background task, triggered by    │ │
//! │                     │   reads that saw expired data, or a timer)  │ │
//! │                     └─────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use dedupkv::storage::{StorageEngine, start_sweeper};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = start_sweeper(Arc::clone(&storage));
//!
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     dedupkv::server::serve(listener, storage, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`storage`]: Records, aliases, resolution, and the sweep
//! - [`commands`]: JSON decoding and request routing
//! - [`server`]: Middleware and the listener loop

pub mod commands;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::router;
pub use server::{app, serve};
pub use storage::{start_sweeper, Record, StorageEngine, SweepConfig, Sweeper};

/// The default port dedupkv listens on
pub const DEFAULT_PORT: u16 = 8080;

/// The default host dedupkv binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of dedupkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
