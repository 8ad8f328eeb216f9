//! Reply generation behind a capability trait
//!
//! The exchange controller only knows [`ReplyGenerator`]; the binary wires in
//! [`SimulatedReply`], which stands in for a real model backend.

use crate::session::Message;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Why a reply could not be produced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplyError {
    /// Raised by network backends; the simulated one never fails
    #[allow(dead_code)]
    #[error("reply backend failed: {0}")]
    Backend(String),
    #[error("no reply within {0:?}")]
    TimedOut(Duration),
}

/// Produces the assistant's answer to a user message
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// `history` holds the conversation as it was before `text` was submitted
    async fn generate_reply(&self, history: &[Message], text: &str) -> Result<String, ReplyError>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

#[async_trait]
impl<T: ReplyGenerator + ?Sized> ReplyGenerator for Arc<T> {
    async fn generate_reply(&self, history: &[Message], text: &str) -> Result<String, ReplyError> {
        (**self).generate_reply(history, text).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Default delay before a simulated reply arrives
pub const DEFAULT_REPLY_DELAY: Duration = Duration::from_millis(1000);

/// Acknowledges every message after a fixed delay
#[derive(Debug, Clone)]
pub struct SimulatedReply {
    delay: Duration,
}

impl SimulatedReply {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn reply_for(text: &str) -> String {
        format!(
            "Received your message \"{}\". A real assistant would generate its answer here.",
            text
        )
    }
}

impl Default for SimulatedReply {
    fn default() -> Self {
        Self::new(DEFAULT_REPLY_DELAY)
    }
}

#[async_trait]
impl ReplyGenerator for SimulatedReply {
    async fn generate_reply(&self, history: &[Message], text: &str) -> Result<String, ReplyError> {
        tracing::debug!(delay_ms = self.delay.as_millis() as u64, history = history.len(), "Simulating reply");
        tokio::time::sleep(self.delay).await;
        Ok(Self::reply_for(text))
    }

    fn name(&self) -> &str {
        "simulated"
    }
}
