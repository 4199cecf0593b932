//! Topic-keyed feed directory
//!
//! Maps each topic to at most one live feed so that repeated stream requests
//! share a single upstream connection. All mutation goes through one lock;
//! there is no ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{FeedError, Result};
use crate::feed::{Connector, Feed, FeedConfig, FeedState, Subscription};
use crate::wire::SubscribeRequest;

/// Directory of live feeds, keyed by topic
pub struct FeedDirectory {
    feeds: RwLock<HashMap<String, Arc<Feed>>>,
    connector: Arc<dyn Connector>,
    config: FeedConfig,
}

impl FeedDirectory {
    /// Create a directory with default feed configuration
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self::with_config(connector, FeedConfig::default())
    }

    /// Create a directory with custom feed configuration
    pub fn with_config(connector: Arc<dyn Connector>, config: FeedConfig) -> Self {
        Self {
            feeds: RwLock::new(HashMap::new()),
            connector,
            config,
        }
    }

    /// Subscribe to a topic, reusing the live feed if one exists
    ///
    /// A feed found in the `Closed` state is treated as absent and replaced
    /// with a fresh connection. Connector errors surface to the caller and
    /// leave no entry behind. The directory lock is only held for map
    /// lookups; dialing happens outside it, so a slow handshake on one
    /// topic never blocks requests for other topics. Concurrent requests
    /// for the same topic land on the same entry and share one connection.
    pub async fn stream_feed(
        &self,
        topic: &str,
        request: SubscribeRequest,
    ) -> Result<Subscription> {
        loop {
            let feed = self.lookup_or_insert(topic).await;

            match feed.start(request.clone(), self.connector.as_ref()).await {
                Ok(()) => {}
                // Another caller owns (or already finished) the dial
                Err(FeedError::AlreadyStarted) => {}
                Err(err) => {
                    self.forget(topic, &feed).await;
                    // The feed closed mid-dial; replace it and try again
                    if matches!(err, FeedError::Closed) {
                        continue;
                    }
                    return Err(err);
                }
            }

            match feed.subscribe().await {
                Ok(subscription) => return Ok(subscription),
                // Lost a race with the feed closing; replace it and retry
                Err(FeedError::Closed) => {
                    self.forget(topic, &feed).await;
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Fetch the feed for a topic, replacing a closed one with a fresh
    /// not-yet-started entry
    async fn lookup_or_insert(&self, topic: &str) -> Arc<Feed> {
        let mut feeds = self.feeds.write().await;

        if let Some(feed) = feeds.get(topic) {
            if feed.state().await != FeedState::Closed {
                return Arc::clone(feed);
            }
            feeds.remove(topic);
            tracing::debug!(topic = %topic, "Closed feed dropped from directory");
        }

        let feed = Arc::new(Feed::with_config(topic, self.config.clone()));
        feeds.insert(topic.to_string(), Arc::clone(&feed));
        tracing::info!(topic = %topic, feeds = feeds.len(), "Feed created");
        feed
    }

    /// Remove a topic's entry, but only if it still maps to the given feed
    async fn forget(&self, topic: &str, feed: &Arc<Feed>) {
        let mut feeds = self.feeds.write().await;
        if let Some(current) = feeds.get(topic) {
            if Arc::ptr_eq(current, feed) {
                feeds.remove(topic);
            }
        }
    }

    /// Look up the feed for a topic, if any is registered
    pub async fn feed(&self, topic: &str) -> Option<Arc<Feed>> {
        self.feeds.read().await.get(topic).cloned()
    }

    /// Number of registered feeds (live or awaiting replacement)
    pub async fn feed_count(&self) -> usize {
        self.feeds.read().await.len()
    }

    /// Close every feed and empty the directory
    pub async fn close_all(&self) {
        let mut feeds = self.feeds.write().await;
        for (topic, feed) in feeds.drain() {
            feed.close().await;
            tracing::debug!(topic = %topic, "Feed closed by directory shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use bytes::Bytes;
    use tokio::time::timeout;
    use tokio_test::assert_ok;

    use crate::error::FeedError;
    use crate::feed::Connection;

    use super::*;

    /// Connection that stays open until dropped by the read loop
    struct PendingConnection;

    #[async_trait]
    impl Connection for PendingConnection {
        async fn next_frame(&mut self) -> Result<Bytes> {
            std::future::pending::<()>().await;
            unreachable!()
        }

        async fn close(&mut self) {}
    }

    struct StubConnector {
        connects: AtomicUsize,
        fail: AtomicBool,
    }

    impl StubConnector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl Connector for StubConnector {
        async fn connect(&self, _request: &SubscribeRequest) -> Result<Box<dyn Connection>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(FeedError::ConnectionFailed("refused".into()));
            }
            Ok(Box::new(PendingConnection))
        }
    }

    fn request() -> SubscribeRequest {
        SubscribeRequest::start("1", "subscription { messages }", serde_json::json!({}))
    }

    #[tokio::test]
    async fn test_same_topic_reuses_one_connection() {
        let connector = StubConnector::new();
        let directory = FeedDirectory::new(connector.clone());

        let _a = directory.stream_feed("chat:alice", request()).await.unwrap();
        let _b = directory.stream_feed("chat:alice", request()).await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(directory.feed_count().await, 1);
        assert_eq!(
            directory.feed("chat:alice").await.unwrap().subscriber_count().await,
            2
        );
    }

    #[tokio::test]
    async fn test_distinct_topics_get_distinct_feeds() {
        let connector = StubConnector::new();
        let directory = FeedDirectory::new(connector.clone());

        let _a = directory.stream_feed("chat:alice", request()).await.unwrap();
        let _b = directory.stream_feed("chat:bob", request()).await.unwrap();

        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(directory.feed_count().await, 2);
    }

    #[tokio::test]
    async fn test_closed_feed_is_replaced() {
        let connector = StubConnector::new();
        let directory = FeedDirectory::new(connector.clone());

        let mut sub = directory.stream_feed("chat:alice", request()).await.unwrap();
        sub.close().await;

        // The feed closed with its last subscriber; the directory still has
        // the stale entry until the next request replaces it
        assert!(!directory.feed("chat:alice").await.unwrap().active().await);

        let _fresh = directory.stream_feed("chat:alice", request()).await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
        assert_eq!(directory.feed_count().await, 1);
        assert!(directory.feed("chat:alice").await.unwrap().active().await);
    }

    #[tokio::test]
    async fn test_connect_failure_leaves_no_entry() {
        let connector = StubConnector::new();
        connector.fail.store(true, Ordering::SeqCst);
        let directory = FeedDirectory::new(connector.clone());

        let result = directory.stream_feed("chat:alice", request()).await;
        assert!(matches!(result, Err(FeedError::ConnectionFailed(_))));
        assert_eq!(directory.feed_count().await, 0);

        // A later attempt dials again
        connector.fail.store(false, Ordering::SeqCst);
        let _sub = directory.stream_feed("chat:alice", request()).await.unwrap();
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    /// Connector whose first dial hangs forever; later dials succeed
    struct SlowThenFastConnector {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector for SlowThenFastConnector {
        async fn connect(&self, _request: &SubscribeRequest) -> Result<Box<dyn Connection>> {
            if self.connects.fetch_add(1, Ordering::SeqCst) == 0 {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Ok(Box::new(PendingConnection))
        }
    }

    #[tokio::test]
    async fn test_slow_dial_does_not_block_other_topics() {
        let connector = Arc::new(SlowThenFastConnector {
            connects: AtomicUsize::new(0),
        });
        let directory = Arc::new(FeedDirectory::new(connector.clone()));

        let slow_directory = Arc::clone(&directory);
        let slow = tokio::spawn(async move {
            slow_directory.stream_feed("chat:slow", request()).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);

        // A hung handshake on one topic must not stall the directory
        let fast = timeout(
            Duration::from_millis(200),
            directory.stream_feed("chat:fast", request()),
        )
        .await
        .expect("directory blocked behind a slow dial");
        tokio_test::assert_ok!(fast);

        slow.abort();
    }

    #[tokio::test]
    async fn test_close_all_completes_subscribers() {
        let connector = StubConnector::new();
        let directory = FeedDirectory::new(connector.clone());

        let mut a = directory.stream_feed("chat:alice", request()).await.unwrap();
        let mut b = directory.stream_feed("chat:bob", request()).await.unwrap();

        directory.close_all().await;

        assert_eq!(directory.feed_count().await, 0);
        for sub in [&mut a, &mut b] {
            assert!(timeout(Duration::from_secs(1), sub.recv())
                .await
                .expect("sequence did not complete")
                .is_none());
        }
    }
}
