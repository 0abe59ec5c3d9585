//! Transport seam between the relay flows and the Telegram Bot API.
//!
//! Delivery logic talks to [`RelayTransport`] so tests can record outbound
//! traffic without a live bot; [`TelegramRelay`] is the production
//! implementation.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId, ParseMode,
};
use thiserror::Error;

use crate::config::RETRY_PREFIX;
use crate::store::{MediaDescriptor, MediaKind};

/// Label of the re-fetch button under a status message.
pub const RETRY_BUTTON_LABEL: &str = "🔁 Fetch again";

/// Failure classes surfaced by the transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The Bot API could not be reached.
    #[error("network error: {0}")]
    Connectivity(String),
    /// Any other send/edit/delete failure.
    #[error("{0}")]
    Api(String),
}

impl From<teloxide::RequestError> for TransportError {
    fn from(e: teloxide::RequestError) -> Self {
        use teloxide::RequestError;

        let message = e.to_string();
        if matches!(e, RequestError::Network(_) | RequestError::Io(_)) {
            Self::Connectivity(message)
        } else {
            Self::Api(message)
        }
    }
}

/// Outbound operations the relay flows need from the chat platform.
#[async_trait]
pub trait RelayTransport: Send + Sync {
    /// Sends the media referenced by `descriptor` to `chat` and returns
    /// the id of the new message.
    async fn send_media(
        &self,
        chat: ChatId,
        descriptor: &MediaDescriptor,
    ) -> Result<MessageId, TransportError>;

    /// Sends the countdown status message carrying the re-fetch button
    /// for `key`.
    async fn send_status(
        &self,
        chat: ChatId,
        text: &str,
        key: &str,
    ) -> Result<MessageId, TransportError>;

    /// Sends a plain one-off notice (delivery failure reports).
    async fn send_notice(&self, chat: ChatId, text: &str) -> Result<(), TransportError>;

    /// Deletes a previously sent message.
    async fn delete_message(&self, chat: ChatId, message: MessageId)
        -> Result<(), TransportError>;

    /// Replaces the text of a status message, re-attaching the re-fetch
    /// button for `key`.
    async fn edit_status(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        key: &str,
    ) -> Result<(), TransportError>;
}

/// Inline keyboard with the single re-fetch button for `key`.
pub(crate) fn retry_keyboard(key: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(
        RETRY_BUTTON_LABEL,
        format!("{RETRY_PREFIX}{key}"),
    )]])
}

/// Production transport over the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramRelay {
    bot: Bot,
}

impl TelegramRelay {
    /// Wraps a bot handle.
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl RelayTransport for TelegramRelay {
    async fn send_media(
        &self,
        chat: ChatId,
        descriptor: &MediaDescriptor,
    ) -> Result<MessageId, TransportError> {
        let input = InputFile::file_id(FileId(descriptor.file_id.clone()));
        let message = match descriptor.kind {
            MediaKind::Photo => self.bot.send_photo(chat, input).await?,
            MediaKind::Video => self.bot.send_video(chat, input).await?,
        };
        Ok(message.id)
    }

    async fn send_status(
        &self,
        chat: ChatId,
        text: &str,
        key: &str,
    ) -> Result<MessageId, TransportError> {
        let message = self
            .bot
            .send_message(chat, text)
            .reply_markup(retry_keyboard(key))
            .await?;
        Ok(message.id)
    }

    async fn send_notice(&self, chat: ChatId, text: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(chat, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }

    async fn delete_message(
        &self,
        chat: ChatId,
        message: MessageId,
    ) -> Result<(), TransportError> {
        self.bot.delete_message(chat, message).await?;
        Ok(())
    }

    async fn edit_status(
        &self,
        chat: ChatId,
        message: MessageId,
        text: &str,
        key: &str,
    ) -> Result<(), TransportError> {
        self.bot
            .edit_message_text(chat, message, text)
            .reply_markup(retry_keyboard(key))
            .await?;
        Ok(())
    }
}
