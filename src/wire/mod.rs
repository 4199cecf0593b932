//! Wire types for the framed duplex stream
//!
//! Each inbound frame decodes to an envelope carrying a string discriminator
//! and an opaque payload. Outbound, a subscription is requested with a
//! `SubscribeRequest` frame serialized by the connection factory.

pub mod envelope;
pub mod request;

pub use envelope::{Envelope, WireMessage, CONNECTION_ACK, CONNECTION_INIT, KEEP_ALIVE};
pub use request::{RequestPayload, SubscribeRequest, START_REQUEST};
