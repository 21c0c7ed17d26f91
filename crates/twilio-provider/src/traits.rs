//! Provider trait the bot framework programs against

use async_trait::async_trait;

use crate::error::Result;
use crate::twilio::MessageResource;
use crate::types::{NormalizedMessage, SaveFileOptions, SendOptions};

/// Outbound operations a messaging channel exposes to the framework
#[async_trait]
pub trait MessagingProvider: Send + Sync {
    /// Channel name
    fn name(&self) -> &str;

    /// Send a text message, with optional media or buttons
    async fn send_message(
        &self,
        number: &str,
        message: &str,
        options: SendOptions,
    ) -> Result<MessageResource>;

    /// Send a message with an attachment
    async fn send_media(
        &self,
        number: &str,
        message: &str,
        media: Option<&str>,
    ) -> Result<MessageResource>;

    /// Send interactive buttons, where the channel supports them
    async fn send_buttons(&self);

    /// Download the attachment of an inbound message; returns the local
    /// path, or `"ERROR"` if it could not be saved
    async fn save_file(&self, ctx: &NormalizedMessage, options: SaveFileOptions) -> String;
}
