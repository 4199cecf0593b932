//! Subscriber handle
//!
//! A `Subscription` is a consumer's membership in a feed: a private bounded
//! queue of payloads plus a close operation. It holds only a weak reference
//! to its feed, so an orphaned handle never keeps a dead feed alive.

use std::sync::Weak;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::feed::Feed;

/// A consumer's handle to one feed's message stream
///
/// The message sequence is lazy, finite, and non-restartable: it ends when
/// the owning feed closes or when [`close`](Subscription::close) is called,
/// and a new subscribe call is required to resume.
pub struct Subscription {
    /// Unique id for this subscription within its feed
    id: String,

    /// Back-reference used to route the close call
    feed: Weak<Feed>,

    /// Private inbound queue
    messages: mpsc::Receiver<Bytes>,

    /// Set once this handle has been closed
    closed: bool,
}

impl Subscription {
    pub(crate) fn new(id: String, feed: Weak<Feed>, messages: mpsc::Receiver<Bytes>) -> Self {
        Self {
            id,
            feed,
            messages,
            closed: false,
        }
    }

    /// The subscription's unique id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next payload
    ///
    /// Returns `None` once the sequence has completed, either because the
    /// feed closed or because this handle was closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        if self.closed {
            return None;
        }
        self.messages.recv().await
    }

    /// Remove this subscription from its feed
    ///
    /// Safe to call more than once. Closing the last subscription closes the
    /// feed and releases its connection.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.messages.close();

        if let Some(feed) = self.feed.upgrade() {
            feed.unsubscribe(&self.id).await;
        }
    }

    /// Whether this handle has been closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.closed {
            return;
        }

        let Some(feed) = self.feed.upgrade() else {
            return;
        };

        // Unregister in the background; an abandoned handle must not keep
        // the feed and its connection alive. Outside a runtime the entry is
        // pruned by the next publish instead.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let id = std::mem::take(&mut self.id);
            handle.spawn(async move {
                feed.unsubscribe(&id).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recv_after_close_yields_nothing() {
        let (tx, rx) = mpsc::channel(4);
        let mut subscription = Subscription::new("s1".into(), Weak::new(), rx);

        tx.send(Bytes::from_static(b"queued")).await.unwrap();
        subscription.close().await;

        // Queued data must not surface after the handle is closed
        assert!(subscription.recv().await.is_none());
        assert!(subscription.is_closed());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_with_dropped_feed() {
        let (_tx, rx) = mpsc::channel(4);
        let mut subscription = Subscription::new("s2".into(), Weak::new(), rx);

        subscription.close().await;
        subscription.close().await;

        assert_eq!(subscription.id(), "s2");
        assert!(subscription.is_closed());
    }

    #[tokio::test]
    async fn test_recv_completes_when_sender_dropped() {
        let (tx, rx) = mpsc::channel(4);
        let mut subscription = Subscription::new("s3".into(), Weak::new(), rx);

        tx.send(Bytes::from_static(b"last")).await.unwrap();
        drop(tx);

        assert_eq!(subscription.recv().await.unwrap(), Bytes::from_static(b"last"));
        assert!(subscription.recv().await.is_none());
    }
}
