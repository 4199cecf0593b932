//! Subscription request descriptor
//!
//! The outbound frame a connection factory sends to establish a topic-scoped
//! subscription: `{"id", "type", "payload": {"query", "variables"}}`. The
//! query string itself is built by the calling layer and carried opaquely.

use serde::Serialize;

/// Discriminator requesting the start of a subscription
pub const START_REQUEST: &str = "start";

/// The serialized subscription payload embedded in a request
#[derive(Debug, Clone, Serialize)]
pub struct RequestPayload {
    /// Opaque query string produced by the calling layer
    pub query: String,

    /// Query variables
    pub variables: serde_json::Value,
}

/// Request descriptor for one subscription over the duplex stream
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    /// Request id, scoped to the connection
    pub id: String,

    /// Frame discriminator (normally [`START_REQUEST`])
    #[serde(rename = "type")]
    pub kind: String,

    /// The subscription payload
    pub payload: RequestPayload,
}

impl SubscribeRequest {
    /// Create a `start` request for the given query
    pub fn start(
        id: impl Into<String>,
        query: impl Into<String>,
        variables: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            kind: START_REQUEST.into(),
            payload: RequestPayload {
                query: query.into(),
                variables,
            },
        }
    }

    /// Serialize the request to its wire form
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
