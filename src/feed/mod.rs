//! Feed multiplexer core
//!
//! A feed owns exactly one live duplex connection for a topic and fans its
//! inbound messages out to any number of independent subscribers, each with
//! a private bounded queue.
//!
//! # Architecture
//!
//! ```text
//!      Connector::connect(request)
//!                │
//!                ▼
//!          ┌──────────┐   frames    ┌───────────────┐
//!          │ read loop ├────────────► dispatch loop │
//!          │ (decode,  │  mpsc      │  publish()    │
//!          │  filter)  │            └──────┬────────┘
//!          └──────────┘                    │ fan-out (one task
//!                                          │  per subscriber)
//!              ┌───────────────┬───────────┴───┐
//!              ▼               ▼               ▼
//!        [Subscription]  [Subscription]  [Subscription]
//!          recv()          recv()          recv()
//! ```
//!
//! Payloads are `bytes::Bytes`, so fan-out clones are reference-counted
//! rather than copied. Both loops observe one shared termination signal and
//! exit at their suspension points; when the last subscriber leaves, the
//! feed closes and releases its connection in the same operation.

pub mod config;
pub mod connection;
#[allow(clippy::module_inception)]
pub mod feed;
pub mod subscription;

pub use config::FeedConfig;
pub use connection::{Connection, Connector};
pub use feed::{Feed, FeedState, FeedStats};
pub use subscription::Subscription;
