//! # feedmux
//!
//! Real-time feed multiplexer: one live duplex connection per topic, fanned
//! out to any number of independent consumers.
//!
//! A [`Feed`] owns a single topic-scoped subscription stream produced by a
//! [`Connector`] and delivers every non-control frame to each registered
//! [`Subscription`], each behind its own bounded queue. A congested consumer
//! loses only its own messages after a bounded retry window; it never blocks
//! the others. The [`FeedDirectory`] keys feeds by topic so repeated
//! requests share one connection.
//!
//! Transport, authentication, and query construction live behind the
//! [`Connector`] trait; this crate only multiplexes the resulting stream.
//!
//! # Example
//!
//! ```no_run
//! use feedmux::{FeedDirectory, SubscribeRequest};
//!
//! # async fn demo(directory: FeedDirectory) -> feedmux::Result<()> {
//! let request = SubscribeRequest::start(
//!     "1",
//!     "subscription { messages }",
//!     serde_json::json!({ "streamer": "alice" }),
//! );
//!
//! let mut subscription = directory.stream_feed("chat:alice", request).await?;
//! while let Some(payload) = subscription.recv().await {
//!     println!("received {} bytes", payload.len());
//! }
//! // The sequence completed: the feed closed or the stream ended
//! subscription.close().await;
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod error;
pub mod feed;
pub mod wire;

pub use directory::FeedDirectory;
pub use error::{FeedError, Result};
pub use feed::{Connection, Connector, Feed, FeedConfig, FeedState, FeedStats, Subscription};
pub use wire::{Envelope, SubscribeRequest, WireMessage};
