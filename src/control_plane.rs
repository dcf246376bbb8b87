//! Request/response plane (C5): turns connection + options into a
//! JetStream [`Context`] that every other component builds on.

use std::time::Duration;

use async_nats::jetstream::{self, Context};
use async_nats::Client;
use tracing::info;

use crate::errors::Result;

/// Options shared by every bucket manager / store handle, covering the
/// account-aware API prefixing and timeouts described in `spec.md` §4.5/§6.
#[derive(Debug, Clone)]
pub struct NatsKvOptions {
    /// JetStream API subject prefix override, e.g. `"FromA.$JS.API"` for
    /// an account-bridged deployment. `None` uses the server default
    /// (`$JS.API`).
    pub api_prefix: Option<String>,
    /// JetStream domain, for leaf-node / domain-scoped deployments.
    pub domain: Option<String>,
    /// Timeout applied to administrative request/reply calls and direct
    /// gets. Consumer drains (`keys`, `history`, `purge_deletes`) use
    /// this as their per-fetch expiry.
    pub request_timeout: Duration,
    /// Default threshold `purge_deletes` applies to tombstones when the
    /// caller passes `None` (`spec.md` §4.4).
    pub delete_marker_threshold: PurgeDeletesThreshold,
    /// Publish without waiting for the server's acknowledgement. Not
    /// compatible with `create`/`update`, which need the ack to learn
    /// the assigned revision or detect `WrongLastSequence`.
    pub publish_no_ack: bool,
}

impl Default for NatsKvOptions {
    fn default() -> Self {
        Self {
            api_prefix: None,
            domain: None,
            request_timeout: Duration::from_secs(5),
            delete_marker_threshold: PurgeDeletesThreshold::Default,
            publish_no_ack: false,
        }
    }
}

/// The age threshold `purge_deletes` uses to decide whether a tombstone
/// is collapsed. See `spec.md` §4.4 and the Open Question resolution in
/// `DESIGN.md`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeDeletesThreshold {
    /// 30 minutes, the server-recommended default.
    Default,
    /// A caller-supplied age; tombstones older than this are purged.
    After(Duration),
    /// No threshold — purge every tombstone regardless of age.
    All,
}

impl PurgeDeletesThreshold {
    /// Resolve to a concrete age cutoff, or `None` meaning "purge all".
    pub fn resolve(self) -> Option<Duration> {
        match self {
            PurgeDeletesThreshold::Default => Some(Duration::from_secs(30 * 60)),
            PurgeDeletesThreshold::After(d) if d.is_zero() => {
                Some(Duration::from_secs(30 * 60))
            }
            PurgeDeletesThreshold::After(d) => Some(d),
            PurgeDeletesThreshold::All => None,
        }
    }
}

/// Build a JetStream [`Context`] from a connected client and [`NatsKvOptions`].
///
/// This is the entirety of C5's "generate... serialize... inject headers"
/// responsibility at the construction boundary: everything downstream
/// (bucket manager, store, watcher) issues calls through the returned
/// `Context`, which is `async-nats`'s own request/reply correlation layer.
pub fn control_plane(client: Client, options: &NatsKvOptions) -> Context {
    let mut js = match (&options.domain, &options.api_prefix) {
        (Some(domain), _) => jetstream::with_domain(client, domain),
        (None, Some(prefix)) => jetstream::with_prefix(client, prefix),
        (None, None) => jetstream::new(client),
    };
    js.set_timeout(options.request_timeout);
    info!(
        timeout_ms = options.request_timeout.as_millis() as u64,
        "JetStream control plane ready"
    );
    js
}

/// Connect to NATS and build the control plane in one call, mirroring
/// the teacher's `NatsClient::new`/`NatsEventStore::connect` constructors.
pub async fn connect(nats_url: &str, options: NatsKvOptions) -> Result<Context> {
    let client = async_nats::connect(nats_url).await?;
    Ok(control_plane(client, &options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_threshold_is_thirty_minutes() {
        assert_eq!(
            PurgeDeletesThreshold::Default.resolve(),
            Some(Duration::from_secs(1800))
        );
    }

    #[test]
    fn zero_duration_falls_back_to_default() {
        assert_eq!(
            PurgeDeletesThreshold::After(Duration::ZERO).resolve(),
            Some(Duration::from_secs(1800))
        );
    }

    #[test]
    fn positive_duration_used_as_is() {
        assert_eq!(
            PurgeDeletesThreshold::After(Duration::from_secs(10)).resolve(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn all_means_no_threshold() {
        assert_eq!(PurgeDeletesThreshold::All.resolve(), None);
    }
}
