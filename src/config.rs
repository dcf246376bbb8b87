//! Bucket configuration and its mapping onto a JetStream stream config.

use std::time::Duration;

use async_nats::jetstream::stream::{
    Compression, Config as StreamConfig, DiscardPolicy, Placement as StreamPlacement,
    Republish as StreamRepublish, RetentionPolicy, StorageType as StreamStorageType,
};

use crate::errors::{Error, Result};
use crate::names;

/// Storage backend for a bucket's backing stream.
///
/// Immutable after creation — `KvConfig::to_stream_config` is only ever
/// used to build a *new* stream; [`crate::manager::KeyValueManager::update`]
/// refuses a config whose `storage` differs from the existing stream's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    File,
    Memory,
}

/// Placement constraints for the backing stream's replicas.
#[derive(Debug, Clone, Default)]
pub struct Placement {
    pub cluster: String,
    pub tags: Vec<String>,
}

/// Republish a copy of every write to another subject.
#[derive(Debug, Clone)]
pub struct Republish {
    pub source: String,
    pub destination: String,
    pub headers_only: bool,
}

/// Observable bucket configuration (`spec.md` §3, "Bucket configuration").
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Bucket name; validated against [`names::validate_bucket_name`].
    pub bucket: String,
    /// Messages retained per key, 1–64.
    pub max_history: u8,
    /// Maximum total bytes the bucket may occupy (-1 for unlimited).
    pub max_bucket_size: i64,
    /// Maximum size of a single value in bytes (-1 for unlimited).
    pub max_value_size: i32,
    /// Per-entry age limit. `None` means no limit.
    pub ttl: Option<Duration>,
    pub storage: StorageType,
    pub replicas: usize,
    pub description: Option<String>,
    pub placement: Option<Placement>,
    pub republish: Option<Republish>,
    /// Passthrough to the backing stream's `allow_direct`; kept at the
    /// server default (`true`) since direct get is how `get`/`get_by_revision`
    /// are implemented.
    pub allow_direct: bool,
    /// Passthrough to the backing stream's `compression` flag. Off by
    /// default, as the teacher's own `JetStreamConfig` never surfaced it.
    pub compression: bool,
    /// Passthrough to the backing stream's `mirror_direct` flag.
    pub mirror_direct: bool,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            max_history: 1,
            max_bucket_size: -1,
            max_value_size: -1,
            ttl: None,
            storage: StorageType::File,
            replicas: 1,
            description: None,
            placement: None,
            republish: None,
            allow_direct: true,
            compression: false,
            mirror_direct: false,
        }
    }
}

impl KvConfig {
    /// Start from defaults for a named bucket.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    /// Validate the config: bucket name alphabet and `max_history` range.
    pub fn validate(&self) -> Result<()> {
        names::validate_bucket_name(&self.bucket)?;
        if self.max_history == 0 || self.max_history > 64 {
            return Err(Error::InvalidArgument(format!(
                "max_history must be in 1..=64, got {}",
                self.max_history
            )));
        }
        Ok(())
    }

    /// Translate this KV config into the backing stream's configuration,
    /// per the derivation table in `spec.md` §3/§6.
    pub fn to_stream_config(&self) -> Result<StreamConfig> {
        self.validate()?;

        let storage = match self.storage {
            StorageType::File => StreamStorageType::File,
            StorageType::Memory => StreamStorageType::Memory,
        };

        let duplicate_window = self.ttl.unwrap_or(Duration::from_secs(2 * 60));

        Ok(StreamConfig {
            name: names::stream_name(&self.bucket),
            description: self.description.clone(),
            subjects: vec![names::subject_filter(&self.bucket)],
            retention: RetentionPolicy::Limits,
            discard: DiscardPolicy::New,
            max_messages_per_subject: self.max_history as i64,
            max_bytes: self.max_bucket_size,
            max_message_size: self.max_value_size,
            max_age: self.ttl.unwrap_or_default(),
            duplicate_window,
            storage,
            num_replicas: self.replicas,
            allow_rollup: true,
            deny_delete: true,
            deny_purge: false,
            allow_direct: self.allow_direct,
            mirror_direct: self.mirror_direct,
            compression: if self.compression {
                Compression::S2
            } else {
                Compression::None
            },
            placement: self.placement.as_ref().map(|p| StreamPlacement {
                cluster: p.cluster.clone(),
                tags: p.tags.clone(),
            }),
            republish: self.republish.as_ref().map(|r| StreamRepublish {
                source: r.source.clone(),
                destination: r.destination.clone(),
                headers_only: r.headers_only,
            }),
            ..Default::default()
        })
    }

    /// Project an existing stream config back into a `KvConfig`, for
    /// [`crate::manager::KeyValueManager::info`].
    pub fn from_stream_config(bucket: &str, cfg: &StreamConfig) -> Self {
        Self {
            bucket: bucket.to_string(),
            max_history: cfg.max_messages_per_subject.clamp(1, 64) as u8,
            max_bucket_size: cfg.max_bytes,
            max_value_size: cfg.max_message_size,
            ttl: if cfg.max_age.is_zero() {
                None
            } else {
                Some(cfg.max_age)
            },
            storage: match cfg.storage {
                StreamStorageType::File => StorageType::File,
                StreamStorageType::Memory => StorageType::Memory,
            },
            replicas: cfg.num_replicas,
            description: cfg.description.clone(),
            placement: cfg.placement.as_ref().map(|p| Placement {
                cluster: p.cluster.clone(),
                tags: p.tags.clone(),
            }),
            republish: cfg.republish.as_ref().map(|r| Republish {
                source: r.source.clone(),
                destination: r.destination.clone(),
                headers_only: r.headers_only,
            }),
            allow_direct: cfg.allow_direct,
            compression: !matches!(cfg.compression, Compression::None),
            mirror_direct: cfg.mirror_direct,
        }
    }
}

/// Status snapshot returned by [`crate::manager::KeyValueManager::info`].
#[derive(Debug, Clone)]
pub struct BucketStatus {
    pub bucket: String,
    pub values: u64,
    pub max_history: u8,
    pub ttl: Option<Duration>,
    pub replicas: usize,
    pub storage: StorageType,
    pub bytes: u64,
}
