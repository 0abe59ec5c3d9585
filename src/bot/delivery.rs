//! Delivery flow: resolve share keys, send media, arm expiry timers.

use std::sync::Arc;
use std::time::Duration;

use teloxide::types::{ChatId, MessageId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bot::transport::{RelayTransport, TransportError};
use crate::store::MediaStore;
use crate::utils;

/// Status text shown after the media message was removed. The re-fetch
/// button stays attached.
pub const EXPIRED_TEXT: &str = "❌ File deleted! Tap the button below to fetch it again.";

/// Notice shown when the Bot API was unreachable during a send.
pub const NETWORK_ERROR_TEXT: &str = "❌ Network error! Please try again.";

/// Upper bound on raw error text embedded into a failure notice.
const ERROR_TEXT_LIMIT: usize = 3000;

fn countdown_text(delay: Duration) -> String {
    format!(
        "⏳ This file will be deleted in {} seconds.\nSave it before it disappears.",
        delay.as_secs()
    )
}

/// The two messages produced by one successful delivery.
///
/// Owned by the scheduled expiry task for its whole lifetime and dropped
/// when the task finishes.
struct DeliveryTicket {
    chat: ChatId,
    key: String,
    media_msg: MessageId,
    status_msg: MessageId,
}

/// Handle to one scheduled expiry task.
///
/// Production callers drop the handle, which detaches the task: once
/// scheduled, expiry always runs. [`ExpiryHandle::cancel`] exists for
/// shutdown-drain callers.
pub struct ExpiryHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ExpiryHandle {
    /// Stops the timer before it fires. A timer that already entered its
    /// delete/edit phase finishes that phase.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits until the task has finished, fired or cancelled.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Delivers every comma-separated key in `raw_keys` to `chat`.
///
/// Unknown keys are skipped silently. A failed send aborts only that
/// key's delivery: a connectivity failure produces the network notice,
/// any other failure a notice carrying the error text; the loop then
/// continues with the remaining keys. Returns the expiry handles of the
/// successful deliveries without waiting for expiry.
pub async fn deliver_keys(
    transport: Arc<dyn RelayTransport>,
    store: &dyn MediaStore,
    chat: ChatId,
    raw_keys: &str,
    delay: Duration,
) -> Vec<ExpiryHandle> {
    let mut handles = Vec::new();

    for key in raw_keys.split(',') {
        let Some(descriptor) = store.get(key).await else {
            debug!("Ignoring unknown share key {key}");
            continue;
        };

        let media_msg = match transport.send_media(chat, &descriptor).await {
            Ok(id) => id,
            Err(e) => {
                report_send_failure(transport.as_ref(), chat, &e).await;
                continue;
            }
        };

        let status_msg = match transport.send_status(chat, &countdown_text(delay), key).await {
            Ok(id) => id,
            Err(e) => {
                // The media message stays behind: no timer was armed, so
                // nothing will ever delete it.
                report_send_failure(transport.as_ref(), chat, &e).await;
                continue;
            }
        };

        let ticket = DeliveryTicket {
            chat,
            key: key.to_string(),
            media_msg,
            status_msg,
        };
        handles.push(schedule_expiry(Arc::clone(&transport), ticket, delay));
    }

    handles
}

async fn report_send_failure(transport: &dyn RelayTransport, chat: ChatId, error: &TransportError) {
    let notice = match error {
        TransportError::Connectivity(_) => NETWORK_ERROR_TEXT.to_string(),
        TransportError::Api(message) => format!(
            "❌ <b>Failed to send file:</b> {}",
            html_escape::encode_text(&utils::truncate_str(message, ERROR_TEXT_LIMIT))
        ),
    };

    if let Err(e) = transport.send_notice(chat, &notice).await {
        warn!("Failed to report a delivery failure: {e}");
    }
}

/// Arms the one-shot expiry timer for a delivered pair of messages.
///
/// After `delay` the media message is deleted and the status message is
/// edited to [`EXPIRED_TEXT`], keeping its re-fetch button. Both steps
/// are best effort: the messages may already be gone.
fn schedule_expiry(
    transport: Arc<dyn RelayTransport>,
    ticket: DeliveryTicket,
    delay: Duration,
) -> ExpiryHandle {
    let token = CancellationToken::new();
    let cancelled = token.clone();

    let task = tokio::spawn(async move {
        tokio::select! {
            () = cancelled.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        if let Err(e) = transport.delete_message(ticket.chat, ticket.media_msg).await {
            debug!("Expiry delete for key {} skipped: {e}", ticket.key);
        }

        if let Err(e) = transport
            .edit_status(ticket.chat, ticket.status_msg, EXPIRED_TEXT, &ticket.key)
            .await
        {
            debug!("Expiry edit for key {} skipped: {e}", ticket.key);
        }
    });

    ExpiryHandle { token, task }
}
