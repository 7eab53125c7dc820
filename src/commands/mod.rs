//! Command Handler Module
//!
//! The request processing layer: it decodes JSON bodies, runs them against
//! the storage engine, and builds the JSON responses.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  axum Router    │  (handler)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  Wire codec     │  (wire)
//! │                 │
//! │  - JSON         │
//! │  - base64       │
//! │  - RFC3339      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;
pub mod wire;

pub use handler::router;
pub use wire::{CommandError, WriteCommand};
