//! Feed configuration

use std::time::Duration;

/// Feed configuration options
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Capacity of each subscriber's inbound queue
    pub subscriber_capacity: usize,

    /// Capacity of the channel between the read loop and the dispatch loop
    pub dispatch_capacity: usize,

    /// How long a delivery waits on a full subscriber queue before dropping
    /// the message for that subscriber
    pub delivery_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: 64,
            dispatch_capacity: 256,
            delivery_timeout: Duration::from_secs(1),
        }
    }
}

impl FeedConfig {
    /// Set the subscriber queue capacity (minimum 1)
    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.subscriber_capacity = capacity.max(1);
        self
    }

    /// Set the dispatch channel capacity (minimum 1)
    pub fn dispatch_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_capacity = capacity.max(1);
        self
    }

    /// Set the bounded retry window for congested subscribers
    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }
}
