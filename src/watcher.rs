//! Watcher subsystem (C6): the long-lived consumer state machine described
//! in `spec.md` §4.6.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_nats::jetstream::consumer::{pull, AckPolicy, DeliverPolicy};
use async_nats::jetstream::stream::Stream;
use async_nats::jetstream::Context;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::entry::Entry;
use crate::errors::{Error, Result};
use crate::names;

/// Caller-supplied sink for watcher deliveries.
///
/// Mirrors the `onEntry`/`onEndOfInitialData` callback pair from
/// `spec.md` §4.6 as an async trait, in the style of the teacher's
/// `MessageHandler` (`src/nats.rs`), which is likewise dispatched from a
/// spawned task rather than called inline.
#[async_trait]
pub trait Observer: Send {
    /// A new entry was delivered, in stream order.
    async fn on_entry(&mut self, entry: Entry);

    /// Fired exactly once: the boundary between replayed history (or,
    /// under `UPDATES_ONLY`, immediately) and the live tail.
    async fn on_end_of_initial_data(&mut self) {}
}

/// Options controlling what a watcher replays and delivers.
///
/// `INCLUDE_HISTORY` and `UPDATES_ONLY` are mutually exclusive; the
/// default (neither set) is "current snapshot then live", matching the
/// deliver-policy table in `spec.md` §4.6.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatcherOptions {
    pub include_history: bool,
    pub updates_only: bool,
    pub ignore_delete: bool,
    pub meta_only: bool,
}

impl WatcherOptions {
    pub fn validate(&self) -> Result<()> {
        if self.include_history && self.updates_only {
            return Err(Error::InvalidArgument(
                "INCLUDE_HISTORY and UPDATES_ONLY are mutually exclusive".into(),
            ));
        }
        Ok(())
    }

    fn deliver_policy(&self) -> DeliverPolicy {
        if self.include_history {
            DeliverPolicy::All
        } else if self.updates_only {
            DeliverPolicy::New
        } else {
            DeliverPolicy::LastPerSubject
        }
    }
}

/// Lifecycle state of a watcher, per the state machine in `spec.md` §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Opening,
    CatchingUp,
    Live,
    Closed,
}

/// A running watcher. Dropping it without calling [`Watcher::unsubscribe`]
/// leaves its background task running until the process exits; callers
/// that need deterministic cleanup should always call `unsubscribe`.
pub struct Watcher {
    state: Arc<Mutex<WatcherState>>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl Watcher {
    /// Start a watcher delivering to `observer` on a dedicated task.
    pub(crate) async fn start<O>(
        bucket: String,
        _context: Context,
        stream: Stream,
        subject_pattern: String,
        options: WatcherOptions,
        observer: O,
    ) -> Result<Self>
    where
        O: Observer + 'static,
    {
        options.validate()?;
        let filter = names::watch_subject(&bucket, &subject_pattern)?;

        let config = pull::Config {
            filter_subject: filter,
            deliver_policy: options.deliver_policy(),
            ack_policy: AckPolicy::None,
            headers_only: options.meta_only,
            ..Default::default()
        };

        let consumer = stream.create_consumer(config).await.map_err(Error::from)?;

        let state = Arc::new(Mutex::new(WatcherState::Opening));
        let (stop_tx, stop_rx) = oneshot::channel();

        let task_state = Arc::clone(&state);
        let task = tokio::spawn(run_watcher(
            bucket,
            consumer,
            options,
            observer,
            task_state,
            stop_rx,
        ));

        Ok(Watcher {
            state,
            stop: Some(stop_tx),
            task: Some(task),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WatcherState {
        *self.state.lock().expect("watcher state mutex poisoned")
    }

    /// Stop the watcher. Synchronous from the caller's view: once this
    /// returns, the observer will not be invoked again.
    pub async fn unsubscribe(mut self) -> Result<()> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    return Err(Error::TransportError(format!(
                        "watcher task panicked: {join_err}"
                    )))
                }
            }
        }
        *self.state.lock().expect("watcher state mutex poisoned") = WatcherState::Closed;
        Ok(())
    }
}

async fn run_watcher<O: Observer>(
    bucket: String,
    consumer: async_nats::jetstream::consumer::Consumer<pull::Config>,
    options: WatcherOptions,
    mut observer: O,
    state: Arc<Mutex<WatcherState>>,
    mut stop: oneshot::Receiver<()>,
) -> Result<()> {
    *state.lock().expect("poisoned") = WatcherState::CatchingUp;

    let mut end_of_data_sent = false;
    if options.updates_only {
        observer.on_end_of_initial_data().await;
        end_of_data_sent = true;
        *state.lock().expect("poisoned") = WatcherState::Live;
    }

    loop {
        if stop.try_recv().is_ok() {
            break;
        }

        let fetch_timeout = if end_of_data_sent {
            Duration::from_secs(30)
        } else {
            Duration::from_secs(2)
        };

        let batch = tokio::select! {
            biased;
            _ = &mut stop => break,
            batch = consumer
                .fetch()
                .max_messages(256)
                .expires(fetch_timeout)
                .messages() => batch,
        };

        let mut messages = match batch {
            Ok(messages) => messages,
            Err(e) => {
                let err = Error::from(e);
                if err.is_end_of_batch() {
                    if !end_of_data_sent {
                        observer.on_end_of_initial_data().await;
                        end_of_data_sent = true;
                        *state.lock().expect("poisoned") = WatcherState::Live;
                    }
                    continue;
                }
                warn!(bucket, error = %err, "watcher fetch failed");
                *state.lock().expect("poisoned") = WatcherState::Closed;
                return Err(err);
            }
        };

        let mut delivered_any = false;
        while let Some(message) = messages.next().await {
            if stop.try_recv().is_ok() {
                *state.lock().expect("poisoned") = WatcherState::Closed;
                return Ok(());
            }

            let message = message.map_err(Error::from)?;
            let info = message.info().map_err(|e| Error::ApiError {
                code: None,
                err_code: None,
                description: e.to_string(),
            })?;
            let remaining = info.pending;
            let payload: Bytes = if options.meta_only {
                Bytes::new()
            } else {
                message.payload.clone()
            };

            if let Some(entry) = Entry::decode(
                &bucket,
                &message.subject,
                message.headers.as_ref(),
                payload,
                info.stream_sequence,
                to_chrono(info.published),
                remaining,
            ) {
                delivered_any = true;
                let suppressed = options.ignore_delete && entry.operation.is_tombstone();
                if !suppressed {
                    observer.on_entry(entry).await;
                }
            }

            if remaining == 0 && !end_of_data_sent {
                observer.on_end_of_initial_data().await;
                end_of_data_sent = true;
                *state.lock().expect("poisoned") = WatcherState::Live;
            }
        }

        if !delivered_any && !end_of_data_sent {
            observer.on_end_of_initial_data().await;
            end_of_data_sent = true;
            *state.lock().expect("poisoned") = WatcherState::Live;
        }
    }

    debug!(bucket, "watcher stopped");
    *state.lock().expect("poisoned") = WatcherState::Closed;
    Ok(())
}

fn to_chrono(ts: time::OffsetDateTime) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(ts.unix_timestamp(), ts.nanosecond())
        .unwrap_or_else(chrono::Utc::now)
}
