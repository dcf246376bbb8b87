//! Entry codec (C3): projecting a raw stream message into a KV [`Entry`]

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::names::{self, Operation};

/// An immutable snapshot of one revision of one key.
///
/// `value` is empty for tombstones (`DELETE`/`PURGE`). `delta` is the
/// number of messages remaining after this one on the same filter, as
/// reported by the server at read time — it is a property of the read,
/// not of the entry itself, but is carried here because every caller
/// that decodes an entry also wants it to detect end-of-data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub bucket: String,
    pub key: String,
    pub value: Bytes,
    pub revision: u64,
    pub delta: u64,
    pub created: DateTime<Utc>,
    pub operation: Operation,
}

impl Entry {
    /// Decode a raw message read off a bucket's stream into an `Entry`.
    ///
    /// `subject` must be the message's delivery subject (used to recover
    /// `key`); `revision` is the stream sequence number assigned to the
    /// message; `delta` is messages remaining on the filter after this
    /// one (0 at the head of a fully-drained read).
    pub fn decode(
        bucket: &str,
        subject: &str,
        headers: Option<&async_nats::HeaderMap>,
        payload: Bytes,
        revision: u64,
        created: DateTime<Utc>,
        delta: u64,
    ) -> Option<Self> {
        let key = names::key_from_subject(bucket, subject)?;
        let operation = Operation::from_headers(headers);
        let value = if operation.is_tombstone() {
            Bytes::new()
        } else {
            payload
        };
        Some(Entry {
            bucket: bucket.to_string(),
            key: key.to_string(),
            value,
            revision,
            delta,
            created,
            operation,
        })
    }

    /// True for PUT entries — the only operation `get` may surface.
    pub fn is_live(&self) -> bool {
        matches!(self.operation, Operation::Put)
    }
}
