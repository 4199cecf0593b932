//! Crate error types
//!
//! Error types for feed lifecycle and delivery operations.

/// Error type for feed operations
#[derive(Debug, Clone)]
pub enum FeedError {
    /// Connection factory or handshake failure, fatal to the feed attempt
    ConnectionFailed(String),
    /// Mid-stream wire failure; the feed closes and all sequences complete
    ReadFailed(String),
    /// `start` was called on a feed that is not in the `NotStarted` state
    AlreadyStarted,
    /// A message was published while the registry was empty
    NoSubscribers,
    /// The feed has already been closed
    Closed,
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::ConnectionFailed(reason) => write!(f, "Connection failed: {}", reason),
            FeedError::ReadFailed(reason) => write!(f, "Read failed: {}", reason),
            FeedError::AlreadyStarted => write!(f, "Feed has already been started"),
            FeedError::NoSubscribers => write!(f, "No subscribers to deliver to"),
            FeedError::Closed => write!(f, "Feed is closed"),
        }
    }
}

impl std::error::Error for FeedError {}

/// Convenience result alias used throughout the crate
pub type Result<T> = std::result::Result<T, FeedError>;
