//! Connection factory contract
//!
//! A feed never dials its own connection. It is handed one by a [`Connector`],
//! which performs the wire handshake (including any `connection_init`
//! exchange) before returning. The feed owns the handle exclusively from then
//! on: only its read loop reads frames and closes it.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::wire::SubscribeRequest;

/// An established duplex stream carrying one subscription
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next inbound frame
    ///
    /// Returns `FeedError::ReadFailed` on wire failure or remote close.
    async fn next_frame(&mut self) -> Result<Bytes>;

    /// Close the underlying stream
    async fn close(&mut self);
}

/// Factory producing authenticated, handshake-complete connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection for the given subscription request
    ///
    /// Must complete any handshake/init frames before returning, so the
    /// first frame the feed reads is already subscription traffic.
    async fn connect(&self, request: &SubscribeRequest) -> Result<Box<dyn Connection>>;
}
