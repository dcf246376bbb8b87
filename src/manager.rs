//! Bucket manager (C2): create/update/delete/info/list for KV buckets.

use async_nats::jetstream::Context;
use futures::TryStreamExt;
use tracing::{debug, info, warn};

use crate::config::{BucketStatus, KvConfig};
use crate::errors::{Error, Result};
use crate::names;
use crate::store::KeyValueStore;

/// Administrative handle over KV buckets on a single JetStream account/domain.
///
/// Cheap to clone: it only wraps a JetStream [`Context`], which is itself
/// `Arc`-backed by `async-nats`.
#[derive(Clone)]
pub struct KeyValueManager {
    context: Context,
}

impl KeyValueManager {
    /// Wrap an already-configured JetStream context.
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Create a bucket from `config`, returning its status.
    ///
    /// Fails with [`Error::AlreadyExists`] if the backing stream is
    /// already present.
    pub async fn create(&self, config: KvConfig) -> Result<BucketStatus> {
        config.validate()?;
        let stream_name = names::stream_name(&config.bucket);

        if self.context.get_stream(&stream_name).await.is_ok() {
            return Err(Error::AlreadyExists(format!(
                "bucket '{}' already exists",
                config.bucket
            )));
        }

        let stream_config = config.to_stream_config()?;
        let stream = self
            .context
            .create_stream(stream_config)
            .await
            .map_err(Error::from)?;

        info!(bucket = %config.bucket, "created KV bucket");
        let info = stream.cached_info();
        Ok(BucketStatus {
            bucket: config.bucket.clone(),
            values: 0,
            max_history: config.max_history,
            ttl: config.ttl,
            replicas: info.config.num_replicas,
            storage: config.storage,
            bytes: 0,
        })
    }

    /// Update an existing bucket's configuration.
    ///
    /// Refuses to change `storage`: storage type is immutable after
    /// creation (`spec.md` §3, invariant 6).
    pub async fn update(&self, config: KvConfig) -> Result<BucketStatus> {
        config.validate()?;
        let stream_name = names::stream_name(&config.bucket);

        let stream = self
            .context
            .get_stream(&stream_name)
            .await
            .map_err(|_| Error::NotFound(format!("bucket '{}' not found", config.bucket)))?;

        let current = KvConfig::from_stream_config(&config.bucket, &stream.cached_info().config);
        if current.storage != config.storage {
            return Err(Error::InvalidArgument(
                "storage type is immutable after bucket creation".into(),
            ));
        }

        let stream_config = config.to_stream_config()?;
        self.context
            .update_stream(stream_config)
            .await
            .map_err(Error::from)?;

        debug!(bucket = %config.bucket, "updated KV bucket");
        self.info(&config.bucket).await
    }

    /// Delete a bucket and its backing stream.
    pub async fn delete(&self, bucket: &str) -> Result<()> {
        names::validate_bucket_name(bucket)?;
        let stream_name = names::stream_name(bucket);
        self.context
            .delete_stream(&stream_name)
            .await
            .map_err(Error::from)?;
        info!(bucket, "deleted KV bucket");
        Ok(())
    }

    /// Fetch the current status of a bucket.
    pub async fn info(&self, bucket: &str) -> Result<BucketStatus> {
        names::validate_bucket_name(bucket)?;
        let stream_name = names::stream_name(bucket);
        let mut stream = self
            .context
            .get_stream(&stream_name)
            .await
            .map_err(|_| Error::NotFound(format!("bucket '{bucket}' not found")))?;

        let info = stream
            .info()
            .await
            .map_err(Error::from)?;
        let cfg = KvConfig::from_stream_config(bucket, &info.config);
        Ok(BucketStatus {
            bucket: bucket.to_string(),
            values: info.state.messages,
            max_history: cfg.max_history,
            ttl: cfg.ttl,
            replicas: info.config.num_replicas,
            storage: cfg.storage,
            bytes: info.state.bytes,
        })
    }

    /// List the names of every KV-backed bucket visible to this account.
    pub async fn list_buckets(&self) -> Result<Vec<String>> {
        let mut names_seen = Vec::new();
        let mut stream_names = self.context.stream_names();
        while let Some(name) = stream_names.try_next().await.map_err(Error::from)? {
            if let Some(bucket) = names::bucket_from_stream_name(&name) {
                names_seen.push(bucket.to_string());
            }
        }
        Ok(names_seen)
    }

    /// Open a handle to an existing bucket without creating it.
    ///
    /// Fails with [`Error::NotFound`] if no KV-shaped stream backs the
    /// requested bucket name.
    pub async fn get(&self, bucket: &str) -> Result<KeyValueStore> {
        names::validate_bucket_name(bucket)?;
        let stream_name = names::stream_name(bucket);
        let stream = self
            .context
            .get_stream(&stream_name)
            .await
            .map_err(|_| Error::NotFound(format!("bucket '{bucket}' not found")))?;

        let expected_filter = names::subject_filter(bucket);
        if !stream
            .cached_info()
            .config
            .subjects
            .iter()
            .any(|s| s == &expected_filter)
        {
            warn!(bucket, "stream exists but is not KV-shaped");
            return Err(Error::InvalidArgument(format!(
                "stream '{stream_name}' is not a KV bucket"
            )));
        }

        Ok(KeyValueStore::new(
            bucket.to_string(),
            self.context.clone(),
            stream,
        ))
    }
}
