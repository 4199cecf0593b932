//! Feed implementation
//!
//! A `Feed` mediates one upstream duplex connection to N downstream
//! subscriber queues, guaranteeing exactly one live connection per topic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::{FeedError, Result};
use crate::wire::{SubscribeRequest, WireMessage};

use super::config::FeedConfig;
use super::connection::{Connection, Connector};
use super::subscription::Subscription;

/// Lifecycle state of a feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// Created, connection not yet opened
    NotStarted,
    /// Connection open, loops running
    Active,
    /// Connection released, all subscriber sequences completed
    Closed,
}

/// Read loop state, tracked for diagnostics
#[derive(Debug, Clone, Copy)]
enum ReadState {
    Connecting,
    Streaming,
    Draining,
    Closed,
}

/// Outcome of one per-subscriber delivery attempt
enum Delivery {
    Delivered,
    /// Queue stayed full through the retry window
    TimedOut,
    /// Receiver side is gone; the registry entry is dead
    Gone(String),
}

/// Mutable feed state, serialized behind one lock
///
/// Subscribe, unsubscribe, close, and publish's registry iteration all go
/// through this mutex; the read loop never touches the registry directly.
struct FeedInner {
    state: FeedState,

    /// Set while a `start` call is dialing; guards duplicate starts without
    /// holding the lock across the handshake
    starting: bool,

    /// Termination signal for both loops; present iff state is `Active`
    shutdown: Option<watch::Sender<bool>>,

    /// Subscription id to that subscriber's private queue
    subscribers: HashMap<String, mpsc::Sender<Bytes>>,
}

/// Statistics for a feed
#[derive(Debug, Clone)]
pub struct FeedStats {
    /// Number of registered subscribers
    pub subscriber_count: usize,
    /// Current lifecycle state
    pub state: FeedState,
    /// Messages handed to fan-out
    pub messages_published: u64,
    /// Per-subscriber deliveries abandoned under backpressure
    pub messages_dropped: u64,
    /// Control frames discarded by the read loop
    pub control_frames_filtered: u64,
}

/// One live topic subscription, fanned out to many consumers
///
/// The feed owns the connection handle (via its read loop) and the registry
/// of subscriber queues. Messages arrive in wire order and each subscriber
/// observes them in that order; a congested subscriber only ever loses its
/// own messages.
pub struct Feed {
    topic: String,
    config: FeedConfig,
    inner: Mutex<FeedInner>,

    published: AtomicU64,
    dropped: AtomicU64,
    filtered: AtomicU64,
}

impl Feed {
    /// Create a feed for a topic with default configuration
    pub fn new(topic: impl Into<String>) -> Self {
        Self::with_config(topic, FeedConfig::default())
    }

    /// Create a feed for a topic with custom configuration
    pub fn with_config(topic: impl Into<String>, config: FeedConfig) -> Self {
        Self {
            topic: topic.into(),
            config,
            inner: Mutex::new(FeedInner {
                state: FeedState::NotStarted,
                starting: false,
                shutdown: None,
                subscribers: HashMap::new(),
            }),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
        }
    }

    /// The topic this feed is subscribed to
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the feed has a live connection
    pub async fn active(&self) -> bool {
        self.inner.lock().await.state == FeedState::Active
    }

    /// Current lifecycle state
    pub async fn state(&self) -> FeedState {
        self.inner.lock().await.state
    }

    /// Number of registered subscribers
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    /// Snapshot of feed statistics
    pub async fn stats(&self) -> FeedStats {
        let inner = self.inner.lock().await;
        FeedStats {
            subscriber_count: inner.subscribers.len(),
            state: inner.state,
            messages_published: self.published.load(Ordering::Relaxed),
            messages_dropped: self.dropped.load(Ordering::Relaxed),
            control_frames_filtered: self.filtered.load(Ordering::Relaxed),
        }
    }

    /// Open the connection and launch the read and dispatch loops
    ///
    /// Fails with `AlreadyStarted` unless the feed is `NotStarted`. Connector
    /// errors propagate unchanged; a failed handshake leaves the feed
    /// `Closed` so a directory will replace it on the next request.
    pub async fn start(
        self: &Arc<Self>,
        request: SubscribeRequest,
        connector: &dyn Connector,
    ) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            if inner.state != FeedState::NotStarted || inner.starting {
                return Err(FeedError::AlreadyStarted);
            }
            inner.starting = true;
        }

        // Dial without holding the registry lock; subscribe, close, and
        // state checks stay responsive while the handshake is in flight.
        let connection = match connector.connect(&request).await {
            Ok(connection) => connection,
            Err(err) => {
                let mut inner = self.inner.lock().await;
                inner.starting = false;
                self.close_locked(&mut inner);
                tracing::warn!(topic = %self.topic, error = %err, "Connection setup failed");
                return Err(err);
            }
        };

        let mut inner = self.inner.lock().await;
        inner.starting = false;
        if inner.state != FeedState::NotStarted {
            // Closed while dialing; release the fresh connection right away
            drop(inner);
            let mut connection = connection;
            connection.close().await;
            return Err(FeedError::Closed);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (frame_tx, frame_rx) = mpsc::channel(self.config.dispatch_capacity);

        inner.state = FeedState::Active;
        inner.shutdown = Some(shutdown_tx);
        drop(inner);

        tracing::info!(topic = %self.topic, "Feed started");

        let reader = Arc::clone(self);
        let read_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            reader.read_loop(connection, read_shutdown, frame_tx).await;
        });

        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.dispatch_loop(frame_rx, shutdown_rx).await;
        });

        Ok(())
    }

    /// Register a new subscriber and return its handle
    ///
    /// Allocates a fresh id and a bounded private queue. Never blocks on
    /// delivery. Fails with `Closed` once the feed has shut down.
    pub async fn subscribe(self: &Arc<Self>) -> Result<Subscription> {
        let mut inner = self.inner.lock().await;
        if inner.state == FeedState::Closed {
            return Err(FeedError::Closed);
        }

        let id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.config.subscriber_capacity);
        inner.subscribers.insert(id.clone(), tx);

        tracing::info!(
            topic = %self.topic,
            subscriber = %id,
            subscribers = inner.subscribers.len(),
            "Subscriber added"
        );

        Ok(Subscription::new(id, Arc::downgrade(self), rx))
    }

    /// Remove a subscriber and complete its sequence
    ///
    /// Removing the last subscriber closes the feed in the same critical
    /// section, so there is no window where the feed idles while still
    /// holding its connection. Unknown ids are a harmless no-op.
    pub async fn unsubscribe(&self, id: &str) {
        let mut inner = self.inner.lock().await;

        if inner.subscribers.remove(id).is_none() {
            tracing::debug!(topic = %self.topic, subscriber = %id, "Unsubscribe for unknown id ignored");
            return;
        }

        tracing::info!(
            topic = %self.topic,
            subscriber = %id,
            subscribers = inner.subscribers.len(),
            "Subscriber removed"
        );

        if inner.subscribers.is_empty() && inner.state == FeedState::Active {
            self.close_locked(&mut inner);
        }
    }

    /// Close the feed: signal both loops, release the connection, and
    /// complete every remaining subscriber sequence
    ///
    /// Idempotent, and safe to race with `unsubscribe` or with a read error
    /// triggering the same close.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        self.close_locked(&mut inner);
    }

    fn close_locked(&self, inner: &mut FeedInner) {
        if inner.state == FeedState::Closed {
            return;
        }
        inner.state = FeedState::Closed;

        if let Some(shutdown) = inner.shutdown.take() {
            let _ = shutdown.send(true);
        }

        for (id, _tx) in inner.subscribers.drain() {
            // Dropping the sender completes the subscriber's sequence
            tracing::debug!(topic = %self.topic, subscriber = %id, "Subscriber sequence completed");
        }

        tracing::info!(topic = %self.topic, "Feed closed");
    }

    /// Deliver one payload to every currently registered subscriber
    ///
    /// Deliveries run concurrently, one short-lived task per subscriber.
    /// A full subscriber queue is retried for `delivery_timeout` and then
    /// the message is dropped for that subscriber only. All deliveries for
    /// one message finish before the next message is fanned out, which
    /// keeps each subscriber's sequence in wire order.
    ///
    /// Returns the number of successful deliveries.
    pub(crate) async fn publish(&self, payload: Bytes) -> Result<usize> {
        if payload.is_empty() {
            tracing::debug!(topic = %self.topic, "Empty payload, nothing to publish");
            return Ok(0);
        }

        let targets: Vec<(String, mpsc::Sender<Bytes>)> = {
            let inner = self.inner.lock().await;
            if inner.subscribers.is_empty() {
                return Err(FeedError::NoSubscribers);
            }
            inner
                .subscribers
                .iter()
                .map(|(id, tx)| (id.clone(), tx.clone()))
                .collect()
        };

        let retry_window = self.config.delivery_timeout;
        let mut deliveries = JoinSet::new();

        for (id, tx) in targets {
            let payload = payload.clone();
            let topic = self.topic.clone();

            deliveries.spawn(async move {
                match tx.try_send(payload) {
                    Ok(()) => Delivery::Delivered,
                    Err(TrySendError::Full(payload)) => {
                        match tx.send_timeout(payload, retry_window).await {
                            Ok(()) => Delivery::Delivered,
                            Err(SendTimeoutError::Timeout(_)) => {
                                tracing::warn!(
                                    topic = %topic,
                                    subscriber = %id,
                                    "Subscriber queue full, message dropped"
                                );
                                Delivery::TimedOut
                            }
                            Err(SendTimeoutError::Closed(_)) => Delivery::Gone(id),
                        }
                    }
                    Err(TrySendError::Closed(_)) => Delivery::Gone(id),
                }
            });
        }

        let mut delivered = 0usize;
        let mut timed_out = 0u64;
        let mut gone = Vec::new();
        while let Some(outcome) = deliveries.join_next().await {
            match outcome {
                Ok(Delivery::Delivered) => delivered += 1,
                Ok(Delivery::TimedOut) => timed_out += 1,
                Ok(Delivery::Gone(id)) => gone.push(id),
                Err(_) => {}
            }
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        self.dropped.fetch_add(timed_out, Ordering::Relaxed);

        // A closed receiver means the handle is gone; scrub those entries so
        // an abandoned subscription cannot pin the feed open.
        if !gone.is_empty() {
            let mut inner = self.inner.lock().await;
            for id in gone {
                if inner.subscribers.remove(&id).is_some() {
                    tracing::debug!(topic = %self.topic, subscriber = %id, "Dead subscriber pruned");
                }
            }
            if inner.subscribers.is_empty() && inner.state == FeedState::Active {
                self.close_locked(&mut inner);
            }
        }

        Ok(delivered)
    }

    /// Read frames from the connection until shutdown, error, or remote close
    async fn read_loop(
        self: Arc<Self>,
        mut connection: Box<dyn Connection>,
        mut shutdown: watch::Receiver<bool>,
        frames: mpsc::Sender<Bytes>,
    ) {
        let mut state = ReadState::Connecting;
        let mut failed = false;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    state = ReadState::Draining;
                    tracing::debug!(topic = %self.topic, state = ?state, "Termination signal received");
                    break;
                }
                frame = connection.next_frame() => match frame {
                    Ok(raw) => {
                        if matches!(state, ReadState::Connecting) {
                            state = ReadState::Streaming;
                            tracing::debug!(topic = %self.topic, state = ?state, "First frame received");
                        }

                        match WireMessage::decode(&raw) {
                            WireMessage::Envelope(envelope) if envelope.is_control() => {
                                self.filtered.fetch_add(1, Ordering::Relaxed);
                                tracing::trace!(
                                    topic = %self.topic,
                                    message_type = %envelope.message_type,
                                    "Control frame discarded"
                                );
                            }
                            _ => {
                                if frames.send(raw).await.is_err() {
                                    state = ReadState::Draining;
                                    tracing::debug!(topic = %self.topic, state = ?state, "Dispatch loop gone");
                                    break;
                                }
                            }
                        }
                    }
                    Err(err) => {
                        state = ReadState::Draining;
                        tracing::warn!(topic = %self.topic, state = ?state, error = %err, "Read failed");
                        failed = true;
                        break;
                    }
                }
            }
        }

        connection.close().await;
        state = ReadState::Closed;
        tracing::debug!(topic = %self.topic, state = ?state, "Read loop finished");

        // A wire failure ends the feed; subscribers see completed sequences
        // rather than a hang. Racing a concurrent close is fine: close is
        // idempotent behind the registry lock.
        if failed {
            self.close().await;
        }
    }

    /// Hand decoded messages to fan-out until shutdown
    async fn dispatch_loop(
        self: Arc<Self>,
        mut frames: mpsc::Receiver<Bytes>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                frame = frames.recv() => match frame {
                    Some(payload) => match self.publish(payload).await {
                        Ok(delivered) => {
                            tracing::trace!(topic = %self.topic, delivered, "Message fanned out");
                        }
                        Err(FeedError::NoSubscribers) => {
                            tracing::debug!(topic = %self.topic, "No subscribers, message discarded");
                        }
                        Err(err) => {
                            tracing::warn!(topic = %self.topic, error = %err, "Publish failed");
                        }
                    },
                    None => break,
                }
            }
        }

        tracing::debug!(topic = %self.topic, "Dispatch loop finished");
    }
}
