use crate::db::{Attachment, Db, StoreError};
use crate::menu::{self, Batch};
use crate::telegram::Client;
use teloxide::types::{CallbackQuery, ChatId, MessageId};

pub type HandlerResult = Result<(), anyhow::Error>;

pub const BUSY_TEXT: &str = "قاعدة البيانات مشغولة حالياً. حاول مرة أخرى بعد ثوانٍ.";
pub const GENERIC_ERROR_TEXT: &str = "حصل خطأ. حاول مرة أخرى لاحقاً.";

pub fn store_error_text(error: &StoreError) -> &'static str {
    match error {
        StoreError::Busy => BUSY_TEXT,
        _ => GENERIC_ERROR_TEXT,
    }
}

/// Sends the user-facing status line for a failed store call and logs the
/// real error; the failure stops at this boundary.
pub async fn report_store_error(
    client: &Client,
    chat_id: ChatId,
    context: &'static str,
    error: &StoreError,
) -> HandlerResult {
    tracing::error!(context, error = %error, "Store operation failed");
    client
        .send_text(chat_id, store_error_text(error), None)
        .await?;
    Ok(())
}

pub fn callback_message_target(q: &CallbackQuery) -> Option<(ChatId, MessageId)> {
    q.message.as_ref().map(|msg| (msg.chat().id, msg.id()))
}

/// Sends the root menu. Edits the originating message when a target is
/// given, otherwise sends a fresh one.
pub async fn send_main_menu(
    client: &Client,
    db: &Db,
    chat_id: ChatId,
    edit: Option<MessageId>,
    greeting: &str,
) -> Result<(), StoreError> {
    let roots = db.children_of(0).await?;
    let (text, markup) = if roots.is_empty() {
        ("مرحباً! لا توجد أقسام متاحة حالياً.".to_string(), None)
    } else {
        (
            greeting.to_string(),
            Some(crate::bot::keyboards::menu_markup(&roots, false)),
        )
    };

    let sent = match edit {
        Some(message_id) => client.edit_text(chat_id, message_id, &text, markup).await,
        None => client.send_text(chat_id, &text, markup).await,
    };
    if let Err(error) = sent {
        tracing::warn!(error = %error, "Failed to deliver main menu");
    }
    Ok(())
}

/// Delivers a button's attachments: groupable runs go out as albums, the
/// rest individually. A failed album falls back to one-by-one sends.
pub async fn deliver_attachments(
    client: &Client,
    chat_id: ChatId,
    attachments: &[Attachment],
) -> HandlerResult {
    for batch in menu::plan_batches(attachments) {
        match batch {
            Batch::Album(chunk) => {
                if let Err(error) = client.send_album(chat_id, chunk).await {
                    tracing::warn!(
                        error = %error,
                        items = chunk.len(),
                        "Album send failed, falling back to individual sends"
                    );
                    for attachment in chunk {
                        if let Err(error) = client.send_attachment(chat_id, attachment).await {
                            tracing::error!(error = %error, file_id = %attachment.file_id, "Failed to send attachment");
                        }
                    }
                }
            }
            Batch::Single(attachment) => {
                if let Err(error) = client.send_attachment(chat_id, attachment).await {
                    tracing::error!(error = %error, file_id = %attachment.file_id, "Failed to send attachment");
                }
            }
        }
    }
    Ok(())
}
