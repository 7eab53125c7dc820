//! JSON Wire Format
//!
//! Request and response bodies, and their conversion to and from the
//! engine's types. Payloads travel as standard base64 strings and
//! expirations as RFC3339 timestamps.
//!
//! ```text
//! POST /  {"key": "k", "data": "aGVsbG8=", "expiration_date": "2030-01-01T00:00:00Z"}
//! GET  /  {"key": "k"}
//! ```
//!
//! The capitalized field names `Key`, `Data` and `Timestamp` are accepted too.

use crate::storage::Record;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding a request body. Each maps to a 400 response.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Body is not JSON of the expected shape
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// `data` is not valid standard base64
    #[error("invalid base64 data: {0}")]
    InvalidData(#[from] base64::DecodeError),

    /// `expiration_date` is not an RFC3339 timestamp
    #[error("invalid expiration_date: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),
}

/// Body of a write request.
#[derive(Debug, Deserialize)]
pub struct WriteBody {
    #[serde(alias = "Key")]
    pub key: String,
    #[serde(alias = "Data", default)]
    pub data: String,
    #[serde(alias = "Timestamp")]
    pub expiration_date: String,
}

/// Body of a read request.
#[derive(Debug, Deserialize)]
pub struct ReadBody {
    #[serde(alias = "Key")]
    pub key: String,
}

/// A decoded, validated write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCommand {
    pub key: String,
    pub data: Bytes,
    pub expires_at: DateTime<Utc>,
}

impl WriteCommand {
    /// Decodes a JSON write body.
    pub fn from_json(body: &[u8]) -> Result<Self, CommandError> {
        let raw: WriteBody = serde_json::from_slice(body)?;
        let data = STANDARD.decode(raw.data.as_bytes())?;
        let expires_at = DateTime::parse_from_rfc3339(&raw.expiration_date)?.with_timezone(&Utc);

        Ok(Self {
            key: raw.key,
            data: Bytes::from(data),
            expires_at,
        })
    }
}

/// Decodes a JSON read body into the lookup key.
pub fn read_key_from_json(body: &[u8]) -> Result<String, CommandError> {
    let raw: ReadBody = serde_json::from_slice(body)?;
    Ok(raw.key)
}

/// Response to a successful write.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WriteResponse {
    pub key: String,
}

/// A record as returned to readers.
///
/// Serialized as `Key`, `Data`, `Timestamp` and `CreateTime`, the names
/// existing clients decode. The snake_case names are accepted on input.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RecordBody {
    #[serde(rename = "Key", alias = "key")]
    pub key: String,
    #[serde(rename = "Data", alias = "data")]
    pub data: String,
    #[serde(rename = "Timestamp", alias = "expiration_date")]
    pub expiration_date: String,
    #[serde(rename = "CreateTime", alias = "created_at")]
    pub created_at: String,
}

impl From<&Record> for RecordBody {
    fn from(record: &Record) -> Self {
        Self {
            key: record.key.clone(),
            data: STANDARD.encode(&record.data),
            expiration_date: format_timestamp(record.expires_at),
            created_at: format_timestamp(record.created_at),
        }
    }
}

/// Error body, also used for unknown routes.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageBody {
    pub message: String,
}

/// RFC3339 with a `Z` suffix and only as many fractional digits as needed.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
