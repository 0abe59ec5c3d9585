//! Inbound event handlers: admin uploads, deep-link starts, retry presses.

use std::sync::Arc;

use anyhow::Result;
use lazy_regex::lazy_regex;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, ReplyParameters};
use teloxide::utils::command::BotCommands;
use tracing::debug;

use crate::bot::delivery;
use crate::bot::transport::{RelayTransport, TelegramRelay};
use crate::config::Settings;
use crate::keygen;
use crate::store::{MediaDescriptor, MediaKind, MediaStore};

/// Callback payload of the re-fetch button: `retry_` plus the key.
static RE_RETRY_PAYLOAD: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"^retry_([A-Za-z0-9]+)$");

/// Commands understood by the bot.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Deep-link entry point: `/start <key>[,<key>...]`.
    #[command(description = "Receive the files behind a share link.")]
    Start(String),
}

/// Bot identity resolved once at startup, used to build deep links.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    /// Public username of the bot, without the leading `@`
    pub username: String,
}

/// Builds the shareable deep link for `key`.
#[must_use]
pub fn deep_link(username: &str, key: &str) -> String {
    format!("https://t.me/{username}?start={key}")
}

/// Extracts the share key from a re-fetch button payload.
#[must_use]
pub fn parse_retry_payload(data: &str) -> Option<&str> {
    RE_RETRY_PAYLOAD
        .captures(data)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// True when the message sender is the configured administrator.
///
/// Explicit numeric equality: the sender's id is matched against the
/// parsed `ADMIN_ID`. A missing or malformed configuration value never
/// matches anyone.
#[must_use]
pub fn is_admin(msg: &Message, settings: &Settings) -> bool {
    let Some(admin_id) = settings.admin_id() else {
        return false;
    };
    msg.from
        .as_ref()
        .is_some_and(|user| user.id.0.cast_signed() == admin_id)
}

/// `/start` with a deep-link payload: deliver every listed key.
///
/// A bare `/start` is a no-op; the bot only speaks through share links.
pub async fn start(
    bot: Bot,
    msg: Message,
    store: Arc<dyn MediaStore>,
    settings: Arc<Settings>,
    args: String,
) -> Result<()> {
    let args = args.trim();
    if args.is_empty() {
        return Ok(());
    }

    let transport: Arc<dyn RelayTransport> = Arc::new(TelegramRelay::new(bot));
    delivery::deliver_keys(
        transport,
        store.as_ref(),
        msg.chat.id,
        args,
        settings.delete_delay(),
    )
    .await;

    Ok(())
}

/// Admin photo upload: store the largest size under a fresh key and reply
/// with the share link.
pub async fn admin_photo(
    bot: Bot,
    msg: Message,
    store: Arc<dyn MediaStore>,
    identity: Arc<BotIdentity>,
) -> Result<()> {
    let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) else {
        return Ok(());
    };
    let file_id = photo.file.id.0.clone();
    share(bot, msg, store, identity, file_id, MediaKind::Photo).await
}

/// Admin video upload counterpart of [`admin_photo`].
pub async fn admin_video(
    bot: Bot,
    msg: Message,
    store: Arc<dyn MediaStore>,
    identity: Arc<BotIdentity>,
) -> Result<()> {
    let Some(video) = msg.video() else {
        return Ok(());
    };
    let file_id = video.file.id.0.clone();
    share(bot, msg, store, identity, file_id, MediaKind::Video).await
}

async fn share(
    bot: Bot,
    msg: Message,
    store: Arc<dyn MediaStore>,
    identity: Arc<BotIdentity>,
    file_id: String,
    kind: MediaKind,
) -> Result<()> {
    let key = keygen::generate();
    store.put(key.clone(), MediaDescriptor { file_id, kind }).await;

    let label = match kind {
        MediaKind::Photo => "Photo",
        MediaKind::Video => "Video",
    };
    let link = deep_link(&identity.username, &key);

    bot.send_message(
        msg.chat.id,
        format!("✅ <b>{label} link created:</b>\n{link}"),
    )
    .parse_mode(ParseMode::Html)
    .reply_parameters(ReplyParameters::new(msg.id))
    .await?;

    Ok(())
}

/// Re-fetch button press: re-deliver the key, then always acknowledge the
/// callback, whatever the delivery outcome.
pub async fn retry(
    bot: Bot,
    q: CallbackQuery,
    store: Arc<dyn MediaStore>,
    settings: Arc<Settings>,
) -> Result<()> {
    let key = q
        .data
        .as_deref()
        .and_then(parse_retry_payload)
        .map(str::to_owned);
    let chat = q.message.as_ref().map(|m| m.chat().id);

    if let (Some(key), Some(chat)) = (key, chat) {
        let transport: Arc<dyn RelayTransport> = Arc::new(TelegramRelay::new(bot.clone()));
        delivery::deliver_keys(
            transport,
            store.as_ref(),
            chat,
            &key,
            settings.delete_delay(),
        )
        .await;
    } else {
        debug!("Retry press without a usable payload or source message");
    }

    bot.answer_callback_query(q.id).await?;
    Ok(())
}
