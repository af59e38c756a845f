use async_trait::async_trait;
use thiserror::Error;

/// A message as the platform addresses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i32,
}

impl MessageRef {
    pub fn new(chat_id: i64, message_id: i32) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("the recipient has blocked the bot")]
    Blocked,
    #[error("{0}")]
    Api(String),
}

/// The handful of chat primitives the relay needs. Implemented over teloxide
/// in `platform::telegram`, and by an in-memory recorder in tests.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
    ) -> Result<MessageRef, GatewayError>;

    /// Platform-level forward; keeps the original media and the forward header.
    async fn forward(&self, to_chat: i64, source: MessageRef) -> Result<MessageRef, GatewayError>;

    /// Copy without the forward header.
    async fn copy(&self, to_chat: i64, source: MessageRef) -> Result<MessageRef, GatewayError>;

    async fn react(&self, target: MessageRef, emoji: &str) -> Result<(), GatewayError>;
}
