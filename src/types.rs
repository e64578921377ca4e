//! Core type definitions for edgefetch.
//!
//! # Key Types
//!
//! - [`ContentId`]: content-derived identifier naming an immutable block
//! - [`EdgeDescriptor`]: a signed, time-bounded capability to download from one edge
//! - [`DownloadReport`]: the outcome of one edge attempt, sent back to the locator
//! - [`Block`]: raw bytes retrieved for a content id
//! - [`BlockOutcome`]: per-item result of a batch fetch
//!
//! # Examples
//!
//! ```rust
//! use edgefetch::types::ContentId;
//!
//! let cid: ContentId = "bafyTEST".parse().unwrap();
//! assert_eq!(cid.as_str(), "bafyTEST");
//! assert!("".parse::<ContentId>().is_err());
//! ```

use crate::error::{FetchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Content identifier.
///
/// Opaque: equality is string equality. Only multibase-safe characters are
/// accepted since the id is placed verbatim into request URLs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Create a content id, validating its characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(FetchError::InvalidContentId("content id is empty".to_string()));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(FetchError::InvalidContentId(format!(
                "unexpected character {:?} in {}",
                c, id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl FromStr for ContentId {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.trim())
    }
}

impl TryFrom<String> for ContentId {
    type Error = FetchError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ContentId> for String {
    fn from(cid: ContentId) -> Self {
        cid.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signed authorization to download content from one specific edge node.
///
/// Field names on the wire follow the locator's JSON encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDescriptor {
    /// Edge retrieval endpoint.
    #[serde(rename = "URL", default)]
    pub url: String,
    /// Capability token issued by the locator.
    #[serde(rename = "Sign", default)]
    pub capability_signature: String,
    /// Serial number identifying this capability in outcome reports.
    #[serde(rename = "SN", default)]
    pub serial_number: i64,
    /// Unix time the capability was signed.
    #[serde(rename = "SignTime", default)]
    pub sign_time: i64,
    /// Validity window in seconds.
    #[serde(rename = "TimeOut", default)]
    pub timeout: i64,
    /// Selection weight. Negative weights are never selected.
    #[serde(rename = "Weight", default)]
    pub weight: i64,
}

impl EdgeDescriptor {
    pub fn new(url: impl Into<String>, capability_signature: impl Into<String>, serial_number: i64) -> Self {
        Self {
            url: url.into(),
            capability_signature: capability_signature.into(),
            serial_number,
            sign_time: 0,
            timeout: 0,
            weight: 0,
        }
    }

    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_validity(mut self, sign_time: i64, timeout: i64) -> Self {
        self.sign_time = sign_time;
        self.timeout = timeout;
        self
    }
}

/// Outcome of one edge attempt, reported to the locator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    #[serde(rename = "SN")]
    pub serial_number: i64,
    /// Client signature over the content id.
    #[serde(rename = "Sign", with = "base64_bytes")]
    pub signature: Vec<u8>,
    #[serde(rename = "Result")]
    pub succeeded: bool,
}

/// Raw block bytes for a content id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub cid: ContentId,
    pub data: Vec<u8>,
}

impl Block {
    pub fn new(cid: ContentId, data: Vec<u8>) -> Self {
        Self { cid, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Per-item result emitted by a batch fetch.
#[derive(Debug, Clone)]
pub struct BlockOutcome {
    pub cid: ContentId,
    pub result: Result<Block>,
}

impl BlockOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<Block> {
        self.result
    }
}

/// Serde helper encoding byte vectors as standard base64 strings.
pub mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
