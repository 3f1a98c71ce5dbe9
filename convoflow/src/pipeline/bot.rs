//! The bot-client handle handlers and steps reply through.

use crate::conversation::ConversationId;
use async_trait::async_trait;

/// Outbound side of a platform adapter.
///
/// The engine never calls this itself; it only passes the handle along to
/// handlers and steps.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BotClient: Send + Sync {
    /// Name of the platform (e.g., "telegram", "discord").
    fn platform(&self) -> &'static str;

    /// Sends a text reply into a conversation.
    async fn send_text(
        &self,
        conversation_id: ConversationId,
        reply_to: Option<String>,
        text: String,
    ) -> anyhow::Result<()>;
}
