//! Tail a chat topic through a scripted connection
//!
//! Run with: cargo run --example chat_tail
//!
//! Two consumers stream the same topic, so the directory opens exactly one
//! connection and fans every chat message out to both. The connection here
//! is scripted: it replays a fixed sequence of frames, including the
//! keep-alive and ack frames a real endpoint interleaves, which the feed
//! filters out before fan-out. Set RUST_LOG=feedmux=trace to watch the
//! frames move through the feed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use feedmux::{
    Connection, Connector, FeedDirectory, FeedError, Result, SubscribeRequest,
};

/// Connection that replays a canned frame sequence, one frame per tick
struct ScriptedConnection {
    frames: VecDeque<Bytes>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn next_frame(&mut self) -> Result<Bytes> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.frames
            .pop_front()
            .ok_or_else(|| FeedError::ReadFailed("script finished".into()))
    }

    async fn close(&mut self) {
        println!("[connection] released");
    }
}

struct ScriptedConnector;

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, request: &SubscribeRequest) -> Result<Box<dyn Connection>> {
        println!(
            "[connector] dialing for query {:?} (request id {})",
            request.payload.query, request.id
        );
        let frames = [
            r#"{"type":"connection_ack","payload":{}}"#,
            r#"{"type":"data","payload":{"sender":"alice","content":"hey chat"}}"#,
            r#"{"type":"ka"}"#,
            r#"{"type":"data","payload":{"sender":"bob","content":"o/"}}"#,
            r#"{"type":"ka"}"#,
            r#"{"type":"data","payload":{"sender":"alice","content":"stream starting soon"}}"#,
        ]
        .into_iter()
        .map(|frame| Bytes::from_static(frame.as_bytes()))
        .collect();
        Ok(Box::new(ScriptedConnection { frames }))
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("feedmux=debug".parse()?),
        )
        .init();

    let directory = Arc::new(FeedDirectory::new(Arc::new(ScriptedConnector)));
    let request = SubscribeRequest::start(
        "1",
        "subscription { messages }",
        serde_json::json!({ "streamer": "alice" }),
    );

    // Two consumers of the same topic share one connection
    let mut a = directory.stream_feed("chat:alice", request.clone()).await?;
    let mut b = directory.stream_feed("chat:alice", request).await?;

    let tail_b = tokio::spawn(async move {
        while let Some(payload) = b.recv().await {
            println!("[b] {}", String::from_utf8_lossy(&payload));
        }
        println!("[b] sequence completed");
    });

    while let Some(payload) = a.recv().await {
        println!("[a] {}", String::from_utf8_lossy(&payload));
    }
    println!("[a] sequence completed");

    tail_b.await?;
    directory.close_all().await;
    Ok(())
}
