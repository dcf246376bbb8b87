//! Naming and header codec for the JetStream Key/Value subsystem
//!
//! Pure functions mapping `(bucket, key)` to the stream name and subject
//! strings the server sees, plus header read/write helpers for the three
//! KV-specific headers. Nothing here touches the network.
//!
//! # Subject pattern
//!
//! A bucket named `B` is backed by a stream `KV_B` whose sole subject
//! filter is `$KV.B.>`; a key `K` within it lives on `$KV.B.K`.

use async_nats::{HeaderMap, HeaderValue};

use crate::errors::{Error, Result};

/// Prefix every KV-backed stream name carries.
pub const STREAM_PREFIX: &str = "KV_";

/// Prefix every KV subject lives under.
pub const SUBJECT_PREFIX: &str = "$KV.";

/// Header carrying the per-message KV operation (`DEL` or `PURGE`).
pub const KV_OPERATION: &str = "KV-Operation";

/// Header instructing the server to collapse prior history into this message.
pub const NATS_ROLLUP: &str = "Nats-Rollup";

/// Value of `Nats-Rollup` used by `purge`.
pub const ROLLUP_SUBJECT: &str = "sub";

/// Header carrying the optimistic-concurrency expected sequence.
pub const EXPECTED_LAST_SUBJECT_SEQUENCE: &str = "Nats-Expected-Last-Subject-Sequence";

/// Derive the backing stream name for a bucket: `KV_<bucket>`.
pub fn stream_name(bucket: &str) -> String {
    format!("{STREAM_PREFIX}{bucket}")
}

/// Recover a bucket name from a stream name, if it is KV-shaped.
pub fn bucket_from_stream_name(stream: &str) -> Option<&str> {
    stream.strip_prefix(STREAM_PREFIX)
}

/// Derive the bucket's subject filter: `$KV.<bucket>.>`.
pub fn subject_filter(bucket: &str) -> String {
    format!("{SUBJECT_PREFIX}{bucket}.>")
}

/// Derive the wire subject for key `key` in `bucket`: `$KV.<bucket>.<key>`.
pub fn key_subject(bucket: &str, key: &str) -> String {
    format!("{SUBJECT_PREFIX}{bucket}.{key}")
}

/// Derive the filter subject for a watcher pattern, which may itself
/// contain `*`/`>` wildcard tokens (e.g. `alice.*` or `>`) that are not
/// valid in a plain key and so bypass [`validate_key`].
pub fn watch_subject(bucket: &str, pattern: &str) -> Result<String> {
    if pattern.is_empty() {
        return Err(Error::InvalidArgument(
            "watch subject pattern must not be empty".into(),
        ));
    }
    Ok(format!("{SUBJECT_PREFIX}{bucket}.{pattern}"))
}

/// Recover `key` from a message subject delivered for `bucket`.
///
/// Returns `None` if the subject does not start with the expected
/// `$KV.<bucket>.` prefix.
pub fn key_from_subject<'a>(bucket: &str, subject: &'a str) -> Option<&'a str> {
    let prefix = format!("{SUBJECT_PREFIX}{bucket}.");
    subject.strip_prefix(prefix.as_str())
}

/// Alphabet allowed in bucket names and key segments: ASCII letters,
/// digits, `-`, `_`, `/`, `=`. `.` is reserved as the key separator and
/// is validated separately by [`validate_key`].
fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '=')
}

/// Validate a bucket name against the conservative alphabet.
pub fn validate_bucket_name(bucket: &str) -> Result<()> {
    if bucket.is_empty() {
        return Err(Error::InvalidArgument("bucket name must not be empty".into()));
    }
    if !bucket.chars().all(is_allowed_char) {
        return Err(Error::InvalidArgument(format!(
            "bucket name '{bucket}' contains characters outside [A-Za-z0-9-_/=]"
        )));
    }
    Ok(())
}

/// Validate a dot-separated key: every segment non-empty and restricted
/// to the same alphabet as bucket names.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key must not be empty".into()));
    }
    if key.starts_with('.') || key.ends_with('.') || key.contains("..") {
        return Err(Error::InvalidArgument(format!(
            "key '{key}' has an empty path segment"
        )));
    }
    for segment in key.split('.') {
        if !segment.chars().all(is_allowed_char) {
            return Err(Error::InvalidArgument(format!(
                "key '{key}' contains characters outside [A-Za-z0-9-_/=] in segment '{segment}'"
            )));
        }
    }
    Ok(())
}

/// The three operations an entry can carry, derived from `KV-Operation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Absence of the header, or an explicit `PUT` value.
    Put,
    /// `KV-Operation: DEL`.
    Delete,
    /// `KV-Operation: PURGE`.
    Purge,
}

impl Operation {
    /// Read the operation a message's headers encode. Absent headers,
    /// or an unrecognized value, decode as `Put`.
    pub fn from_headers(headers: Option<&HeaderMap>) -> Self {
        match headers.and_then(|h| h.get(KV_OPERATION)) {
            Some(v) if v.as_str() == "DEL" => Operation::Delete,
            Some(v) if v.as_str() == "PURGE" => Operation::Purge,
            _ => Operation::Put,
        }
    }

    /// Whether this operation is a tombstone (DELETE or PURGE).
    pub fn is_tombstone(self) -> bool {
        !matches!(self, Operation::Put)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Put => write!(f, "PUT"),
            Operation::Delete => write!(f, "DEL"),
            Operation::Purge => write!(f, "PURGE"),
        }
    }
}

/// Build the headers for a `delete` publish: `KV-Operation: DEL`.
pub fn delete_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(KV_OPERATION, HeaderValue::from("DEL"));
    headers
}

/// Build the headers for a `purge` publish: `KV-Operation: PURGE` plus
/// the rollup header instructing the server to collapse prior history.
pub fn purge_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(KV_OPERATION, HeaderValue::from("PURGE"));
    headers.insert(NATS_ROLLUP, HeaderValue::from(ROLLUP_SUBJECT));
    headers
}

/// Build the headers for a `create`/`update` publish expecting `seq` to
/// be the current last sequence on the key's subject.
pub fn expected_sequence_headers(seq: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        EXPECTED_LAST_SUBJECT_SEQUENCE,
        HeaderValue::from(seq.to_string().as_str()),
    );
    headers
}
