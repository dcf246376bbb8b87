//! Store operations (C4): get/put/create/update/delete/purge/keys/history
//! and the tombstone-sweeping `purge_deletes`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_nats::jetstream::consumer::{pull, AckPolicy, DeliverPolicy};
use async_nats::jetstream::stream::Stream;
use async_nats::jetstream::Context;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::debug;

use crate::control_plane::PurgeDeletesThreshold;
use crate::entry::Entry;
use crate::errors::{Error, Result};
use crate::names::{self, Operation};
use crate::watcher::{Watcher, WatcherOptions};

/// How many messages a single short-lived scan (`keys`, `history`,
/// `purge_deletes`) pulls per fetch before checking for more.
const SCAN_BATCH_SIZE: usize = 500;

/// A handle to one bucket's entries.
///
/// Cheap to clone and safe to share across tasks: all state lives in the
/// JetStream [`Context`]/[`Stream`] handles, which are themselves
/// `Arc`-backed.
#[derive(Clone)]
pub struct KeyValueStore {
    bucket: String,
    context: Context,
    stream: Stream,
    request_timeout: Duration,
}

impl KeyValueStore {
    pub(crate) fn new(bucket: String, context: Context, stream: Stream) -> Self {
        Self {
            bucket,
            context,
            stream,
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Override the timeout used for direct gets and scan fetches.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bucket name this store is bound to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn subject(&self, key: &str) -> Result<String> {
        names::validate_key(key)?;
        Ok(names::key_subject(&self.bucket, key))
    }

    fn decode(
        &self,
        subject: &str,
        headers: Option<&async_nats::HeaderMap>,
        payload: Bytes,
        revision: u64,
        published: impl HasTimestamp,
        delta: u64,
    ) -> Option<Entry> {
        Entry::decode(
            &self.bucket,
            subject,
            headers,
            payload,
            revision,
            published.to_chrono(),
            delta,
        )
    }

    /// Last value of `key`, or `None` if absent or the head is a tombstone.
    pub async fn get(&self, key: &str) -> Result<Option<Entry>> {
        let subject = self.subject(key)?;
        let raw = match self.stream.get_last_raw_message_by_subject(&subject).await {
            Ok(raw) => raw,
            Err(e) => {
                let err = Error::from(e);
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };
        let entry = self.decode(
            &subject,
            raw.headers.as_ref(),
            raw.payload,
            raw.sequence,
            raw.time,
            0,
        );
        Ok(entry.filter(|e| e.is_live()))
    }

    /// The value of `key` as of `revision`. Returns `None` if the message
    /// at that sequence does not belong to `key`, or is not a PUT.
    pub async fn get_at_revision(&self, key: &str, revision: u64) -> Result<Option<Entry>> {
        let subject = self.subject(key)?;
        let raw = match self.stream.get_raw_message(revision).await {
            Ok(raw) => raw,
            Err(e) => {
                let err = Error::from(e);
                return if err.is_not_found() { Ok(None) } else { Err(err) };
            }
        };
        if raw.subject != subject {
            return Ok(None);
        }
        let entry = self.decode(
            &subject,
            raw.headers.as_ref(),
            raw.payload,
            raw.sequence,
            raw.time,
            0,
        );
        Ok(entry.filter(|e| e.is_live()))
    }

    /// Publish `value` for `key` with no concurrency constraint. Returns
    /// the assigned revision.
    pub async fn put(&self, key: &str, value: impl Into<Bytes>) -> Result<u64> {
        let subject = self.subject(key)?;
        let ack = self
            .context
            .publish(subject, value.into())
            .await?
            .await?;
        debug!(bucket = %self.bucket, key, revision = ack.sequence, "put");
        Ok(ack.sequence)
    }

    /// Create `key` with `value`, requiring the key to currently be
    /// absent, deleted, or purged.
    ///
    /// If the server rejects the attempt because a live value already
    /// exists but the current head on the subject is itself a tombstone
    /// (a DELETE/PURGE survives as the visible head), this retries once
    /// as an `update` against that tombstone's revision — see the Open
    /// Question recorded in `DESIGN.md`.
    pub async fn create(&self, key: &str, value: impl Into<Bytes>) -> Result<u64> {
        let subject = self.subject(key)?;
        let value = value.into();
        let headers = names::expected_sequence_headers(0);

        match self
            .context
            .publish_with_headers(subject.clone(), headers, value.clone())
            .await?
            .await
        {
            Ok(ack) => {
                debug!(bucket = %self.bucket, key, revision = ack.sequence, "create");
                Ok(ack.sequence)
            }
            Err(e) => {
                let err = Error::from(e);
                if !matches!(err, Error::WrongLastSequence(_)) {
                    return Err(err);
                }
                let head = self.get_head_entry(key).await?;
                match head {
                    Some(head) if head.operation.is_tombstone() => {
                        self.update(key, value, head.revision).await
                    }
                    _ => Err(err),
                }
            }
        }
    }

    /// Publish `value` for `key`, requiring the current head revision to
    /// equal `expected_revision`.
    pub async fn update(
        &self,
        key: &str,
        value: impl Into<Bytes>,
        expected_revision: u64,
    ) -> Result<u64> {
        let subject = self.subject(key)?;
        let headers = names::expected_sequence_headers(expected_revision);
        let ack = self
            .context
            .publish_with_headers(subject, headers, value.into())
            .await?
            .await?;
        debug!(bucket = %self.bucket, key, revision = ack.sequence, "update");
        Ok(ack.sequence)
    }

    /// Mark `key` deleted. Always succeeds (no concurrency check).
    pub async fn delete(&self, key: &str) -> Result<u64> {
        let subject = self.subject(key)?;
        let ack = self
            .context
            .publish_with_headers(subject, names::delete_headers(), Bytes::new())
            .await?
            .await?;
        debug!(bucket = %self.bucket, key, revision = ack.sequence, "delete");
        Ok(ack.sequence)
    }

    /// Purge `key`: the server collapses all prior history for it into
    /// a single PURGE tombstone.
    pub async fn purge(&self, key: &str) -> Result<u64> {
        let subject = self.subject(key)?;
        let ack = self
            .context
            .publish_with_headers(subject, names::purge_headers(), Bytes::new())
            .await?
            .await?;
        debug!(bucket = %self.bucket, key, revision = ack.sequence, "purge");
        Ok(ack.sequence)
    }

    /// All keys whose current head is a PUT.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let heads = self.scan_heads(true).await?;
        Ok(heads
            .into_values()
            .filter(|e| e.operation == Operation::Put)
            .map(|e| e.key)
            .collect())
    }

    /// Full revision history of `key`, ascending by revision. A PURGE,
    /// if present, is always the first surviving element.
    pub async fn history(&self, key: &str) -> Result<Vec<Entry>> {
        let subject = self.subject(key)?;
        let config = pull::Config {
            filter_subject: subject,
            deliver_policy: DeliverPolicy::All,
            ack_policy: AckPolicy::None,
            ..Default::default()
        };
        let mut entries = self.drain(config, false).await?;
        entries.sort_by_key(|e| e.revision);
        Ok(entries)
    }

    /// Sweep tombstones older than `options.delete_marker_threshold`
    /// (resolved via [`PurgeDeletesThreshold::resolve`]).
    ///
    /// Halts and surfaces the first failure; already-purged keys are not
    /// rolled back.
    pub async fn purge_deletes(&self, threshold: PurgeDeletesThreshold) -> Result<usize> {
        let cutoff = threshold.resolve();
        let heads = self.scan_heads(false).await?;
        let now = Utc::now();
        let mut purged = 0;

        for entry in heads.into_values() {
            if !entry.operation.is_tombstone() {
                continue;
            }
            let stale = match cutoff {
                None => true,
                Some(max_age) => {
                    now.signed_duration_since(entry.created)
                        .to_std()
                        .unwrap_or_default()
                        >= max_age
                }
            };
            if !stale {
                continue;
            }
            let subject = names::key_subject(&self.bucket, &entry.key);
            self.stream
                .purge()
                .filter(&subject)
                .keep(0)
                .await
                .map_err(Error::from)?;
            purged += 1;
        }

        debug!(bucket = %self.bucket, purged, "purge_deletes complete");
        Ok(purged)
    }

    /// Start a watcher over `subject_pattern` (a bare key, `key.*`,
    /// `key.>`, or `>` for the whole bucket), delivering to `observer`.
    pub async fn watch<O>(
        &self,
        subject_pattern: &str,
        options: WatcherOptions,
        observer: O,
    ) -> Result<Watcher>
    where
        O: crate::watcher::Observer + 'static,
    {
        Watcher::start(
            self.bucket.clone(),
            self.context.clone(),
            self.stream.clone(),
            subject_pattern.to_string(),
            options,
            observer,
        )
        .await
    }

    async fn get_head_entry(&self, key: &str) -> Result<Option<Entry>> {
        let subject = self.subject(key)?;
        match self.stream.get_last_raw_message_by_subject(&subject).await {
            Ok(raw) => Ok(self.decode(
                &subject,
                raw.headers.as_ref(),
                raw.payload,
                raw.sequence,
                raw.time,
                0,
            )),
            Err(e) => {
                let err = Error::from(e);
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Scan the bucket's last-per-subject heads. `headers_only` matches
    /// `keys()`'s cheaper headers-only scan; `purge_deletes` needs full
    /// payload so tombstone timestamps are as accurate as the stream
    /// records them.
    async fn scan_heads(&self, headers_only: bool) -> Result<BTreeMap<String, Entry>> {
        let config = pull::Config {
            filter_subject: names::subject_filter(&self.bucket),
            deliver_policy: DeliverPolicy::LastPerSubject,
            ack_policy: AckPolicy::None,
            headers_only,
            ..Default::default()
        };
        let entries = self.drain(config, headers_only).await?;
        let mut heads = BTreeMap::new();
        for entry in entries {
            heads.insert(entry.key.clone(), entry);
        }
        Ok(heads)
    }

    /// Open an ephemeral pull consumer per `config` and drain it until
    /// the reported remaining-on-filter count reaches zero.
    async fn drain(&self, config: pull::Config, headers_only: bool) -> Result<Vec<Entry>> {
        let consumer = self
            .stream
            .create_consumer(config)
            .await
            .map_err(Error::from)?;

        let mut entries = Vec::new();
        loop {
            let batch = consumer
                .fetch()
                .max_messages(SCAN_BATCH_SIZE)
                .expires(self.request_timeout)
                .messages()
                .await;

            let mut messages = match batch {
                Ok(messages) => messages,
                Err(e) => {
                    let err = Error::from(e);
                    if err.is_end_of_batch() {
                        break;
                    }
                    return Err(err);
                }
            };

            let mut seen_in_batch = 0;
            let mut exhausted = false;
            while let Some(message) = messages.next().await {
                let message = message.map_err(Error::from)?;
                let info = message.info().map_err(|e| Error::ApiError {
                    code: None,
                    err_code: None,
                    description: e.to_string(),
                })?;
                let remaining = info.pending;
                let payload = if headers_only {
                    Bytes::new()
                } else {
                    message.payload.clone()
                };
                if let Some(entry) = self.decode(
                    &message.subject,
                    message.headers.as_ref(),
                    payload,
                    info.stream_sequence,
                    info.published,
                    remaining,
                ) {
                    entries.push(entry);
                }
                seen_in_batch += 1;
                if remaining == 0 {
                    exhausted = true;
                }
            }

            if exhausted || seen_in_batch < SCAN_BATCH_SIZE {
                break;
            }
        }

        debug!(bucket = %self.bucket, count = entries.len(), "scan drained");
        Ok(entries)
    }
}

/// Bridges `async-nats`'s JetStream message timestamp (`time::OffsetDateTime`)
/// into `chrono`, the timestamp type the rest of the crate uses.
trait HasTimestamp {
    fn to_chrono(&self) -> DateTime<Utc>;
}

impl HasTimestamp for time::OffsetDateTime {
    fn to_chrono(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.unix_timestamp(), self.nanosecond())
            .unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purge_deletes_threshold_drives_staleness() {
        let now = Utc::now();
        let old = now - chrono::Duration::hours(2);
        let recent = now - chrono::Duration::seconds(5);

        let cutoff = PurgeDeletesThreshold::Default.resolve().unwrap();
        assert!(now.signed_duration_since(old).to_std().unwrap() >= cutoff);
        assert!(now.signed_duration_since(recent).to_std().unwrap() < cutoff);
    }
}
