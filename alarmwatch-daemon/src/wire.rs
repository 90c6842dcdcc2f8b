//! Wire format of the alarm record.
//!
//! Alarms arrive in one of two encodings, named by the delivery
//! attribute [`SCHEMA_ENCODING_ATTRIBUTE`]: the compact protobuf form
//! published by the ingress function, or its JSON rendering. The
//! watcher only ever reads the update timestamp; every other field
//! passes through for downstream consumers.
//!
//! The canonical JSON mapping renders 64-bit integers as decimal
//! strings, so the int64 fields accept both string and number forms.

use prost::Message as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

/// Delivery attribute naming the encoding of the payload.
pub const SCHEMA_ENCODING_ATTRIBUTE: &str = "googclient_schemaencoding";

/// A single alarm notification.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Alarm {
    #[prost(int64, tag = "1")]
    #[serde(deserialize_with = "int64::permissive")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub foreign_id: String,
    #[prost(string, tag = "3")]
    pub title: String,
    #[prost(string, tag = "4")]
    pub text: String,
    #[prost(string, tag = "5")]
    pub address: String,
    #[prost(message, optional, tag = "6")]
    pub position: Option<LatLng>,
    #[prost(bool, tag = "7")]
    pub priority: bool,
    #[prost(message, optional, tag = "8")]
    pub created: Option<Timestamp>,
    #[prost(message, optional, tag = "9")]
    pub updated: Option<Timestamp>,
}

/// Geographic position of the alarm.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LatLng {
    #[prost(double, tag = "1")]
    pub latitude: f64,
    #[prost(double, tag = "2")]
    pub longitude: f64,
}

/// Wall-clock second timestamp.
#[derive(Clone, Copy, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    #[serde(deserialize_with = "int64::permissive")]
    pub seconds: i64,
}

mod int64 {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        String(String),
    }

    /// Accept an int64 as a JSON number or its decimal string form.
    pub(super) fn permissive<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::String(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

impl Alarm {
    /// Update time of the alarm, saturating to the epoch when absent or
    /// out of range.
    pub fn updated_at(&self) -> OffsetDateTime {
        self.updated
            .map(|t| t.seconds)
            .and_then(|s| OffsetDateTime::from_unix_timestamp(s).ok())
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

/// Accepted payload encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Binary,
    Json,
}

impl Encoding {
    /// Parse the schema-encoding delivery attribute.
    pub fn from_attribute(value: &str) -> Result<Self, DecodeError> {
        match value {
            "BINARY" => Ok(Encoding::Binary),
            "JSON" => Ok(Encoding::Json),
            other => Err(DecodeError::UnknownEncoding(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown schema encoding {0:?}")]
    UnknownEncoding(String),
    #[error("malformed binary alarm: {0}")]
    Binary(#[from] prost::DecodeError),
    #[error("malformed JSON alarm: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a payload according to its declared encoding.
pub fn decode(data: &[u8], encoding: Encoding) -> Result<Alarm, DecodeError> {
    match encoding {
        Encoding::Binary => Ok(Alarm::decode(data)?),
        Encoding::Json => Ok(serde_json::from_slice(data)?),
    }
}
