//! Outbound Telegram adapter: every API call gets a timeout and a bounded
//! retry budget, with the platform-specified backoff on rate limiting.

use crate::db::{Attachment, ContentKind};
use std::future::Future;
use std::time::Duration;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::requests::Request;
use teloxide::types::{
    CallbackQueryId, ChatMember, FileId, InlineKeyboardMarkup, InputFile, InputMedia,
    InputMediaAnimation, InputMediaPhoto, InputMediaVideo, Me, MessageId, Recipient, UserId,
};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("telegram request timed out")]
    Timeout,
    #[error("telegram api error: {0}")]
    Api(#[from] RequestError),
}

pub struct Client {
    bot: Bot,
    timeout: Duration,
    max_retries: u32,
}

impl Client {
    pub fn new(token: String, timeout: Duration, max_retries: u32) -> Self {
        Self {
            bot: Bot::new(token),
            timeout,
            max_retries,
        }
    }

    /// Runs one API call with the adapter's timeout, retrying on rate
    /// limits (waiting as long as the platform asks) and on timeouts.
    /// Any other error is final.
    async fn call<T, Fut>(
        &self,
        op: &'static str,
        make: impl Fn() -> Fut,
    ) -> Result<T, ClientError>
    where
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let mut attempt = 0;
        loop {
            match tokio::time::timeout(self.timeout, make()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(RequestError::RetryAfter(after))) if attempt < self.max_retries => {
                    let wait = after.duration();
                    tracing::info!(op, wait_secs = wait.as_secs(), "Telegram rate limit, backing off");
                    tokio::time::sleep(wait).await;
                }
                Ok(Err(error)) => return Err(error.into()),
                Err(_) if attempt < self.max_retries => {
                    tracing::warn!(op, attempt, timeout_secs = self.timeout.as_secs(), "Telegram request timed out, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(_) => {
                    tracing::warn!(op, timeout_secs = self.timeout.as_secs(), "Telegram request timed out, giving up");
                    return Err(ClientError::Timeout);
                }
            }
            attempt += 1;
        }
    }

    pub async fn me(&self) -> Result<Me, ClientError> {
        self.call("get_me", || self.bot.get_me().send()).await
    }

    pub async fn set_webhook(&self, url: Url, secret: Option<&str>) -> Result<(), ClientError> {
        self.call("set_webhook", || {
            let mut req = self.bot.set_webhook(url.clone());
            if let Some(secret) = secret {
                req = req.secret_token(secret.to_owned());
            }
            req.send()
        })
        .await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<(), ClientError> {
        self.call("delete_webhook", || self.bot.delete_webhook().send())
            .await?;
        Ok(())
    }

    pub async fn chat_member(
        &self,
        chat: Recipient,
        user_id: UserId,
    ) -> Result<ChatMember, ClientError> {
        self.call("get_chat_member", || {
            self.bot.get_chat_member(chat.clone(), user_id).send()
        })
        .await
    }

    pub async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), ClientError> {
        self.call("send_message", || {
            let mut req = self.bot.send_message(chat_id, text);
            if let Some(markup) = markup.clone() {
                req = req.reply_markup(markup);
            }
            req.send()
        })
        .await?;
        Ok(())
    }

    pub async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        markup: Option<InlineKeyboardMarkup>,
    ) -> Result<(), ClientError> {
        self.call("edit_message_text", || {
            let mut req = self.bot.edit_message_text(chat_id, message_id, text);
            if let Some(markup) = markup.clone() {
                req = req.reply_markup(markup);
            }
            req.send()
        })
        .await?;
        Ok(())
    }

    pub async fn answer_callback(
        &self,
        id: CallbackQueryId,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), ClientError> {
        self.call("answer_callback_query", || {
            let mut req = self.bot.answer_callback_query(id.clone());
            if let Some(text) = text {
                req = req.text(text.to_owned());
            }
            if show_alert {
                req = req.show_alert(true);
            }
            req.send()
        })
        .await?;
        Ok(())
    }

    /// Single dispatch point mapping an attachment kind to its outbound
    /// send operation.
    pub async fn send_attachment(
        &self,
        chat_id: ChatId,
        attachment: &Attachment,
    ) -> Result<(), ClientError> {
        let file = || InputFile::file_id(FileId(attachment.file_id.clone()));
        let caption = attachment.caption.as_deref();
        match attachment.kind {
            ContentKind::Document => {
                self.call("send_document", || {
                    let mut req = self.bot.send_document(chat_id, file());
                    if let Some(caption) = caption {
                        req = req.caption(caption.to_owned());
                    }
                    req.send()
                })
                .await?;
            }
            ContentKind::Photo => {
                self.call("send_photo", || {
                    let mut req = self.bot.send_photo(chat_id, file());
                    if let Some(caption) = caption {
                        req = req.caption(caption.to_owned());
                    }
                    req.send()
                })
                .await?;
            }
            ContentKind::Video => {
                self.call("send_video", || {
                    let mut req = self.bot.send_video(chat_id, file());
                    if let Some(caption) = caption {
                        req = req.caption(caption.to_owned());
                    }
                    req.send()
                })
                .await?;
            }
            ContentKind::Audio => {
                self.call("send_audio", || {
                    let mut req = self.bot.send_audio(chat_id, file());
                    if let Some(caption) = caption {
                        req = req.caption(caption.to_owned());
                    }
                    req.send()
                })
                .await?;
            }
            ContentKind::Voice => {
                self.call("send_voice", || {
                    let mut req = self.bot.send_voice(chat_id, file());
                    if let Some(caption) = caption {
                        req = req.caption(caption.to_owned());
                    }
                    req.send()
                })
                .await?;
            }
            ContentKind::Animation => {
                self.call("send_animation", || {
                    let mut req = self.bot.send_animation(chat_id, file());
                    if let Some(caption) = caption {
                        req = req.caption(caption.to_owned());
                    }
                    req.send()
                })
                .await?;
            }
            ContentKind::Text => {
                self.call("send_message", || {
                    self.bot.send_message(chat_id, &attachment.file_id).send()
                })
                .await?;
            }
        }
        Ok(())
    }

    /// Sends up to ten groupable attachments as one multi-media message.
    /// Callers fall back to individual sends when this fails.
    pub async fn send_album(
        &self,
        chat_id: ChatId,
        attachments: &[Attachment],
    ) -> Result<(), ClientError> {
        let media: Vec<InputMedia> = attachments
            .iter()
            .filter_map(|attachment| {
                let file = InputFile::file_id(FileId(attachment.file_id.clone()));
                let caption = attachment.caption.clone();
                match attachment.kind {
                    ContentKind::Photo => {
                        let mut item = InputMediaPhoto::new(file);
                        if let Some(caption) = caption {
                            item = item.caption(caption);
                        }
                        Some(InputMedia::Photo(item))
                    }
                    ContentKind::Video => {
                        let mut item = InputMediaVideo::new(file);
                        if let Some(caption) = caption {
                            item = item.caption(caption);
                        }
                        Some(InputMedia::Video(item))
                    }
                    ContentKind::Animation => {
                        let mut item = InputMediaAnimation::new(file);
                        if let Some(caption) = caption {
                            item = item.caption(caption);
                        }
                        Some(InputMedia::Animation(item))
                    }
                    _ => None,
                }
            })
            .collect();

        self.call("send_media_group", || {
            self.bot.send_media_group(chat_id, media.clone()).send()
        })
        .await?;
        Ok(())
    }
}

/// Parses a configured chat reference: a numeric chat id or a channel
/// username (`@` is prepended when missing).
pub fn chat_recipient(reference: &str) -> Recipient {
    let trimmed = reference.trim();
    if let Ok(id) = trimmed.parse::<i64>() {
        return Recipient::Id(ChatId(id));
    }
    if let Some(username) = trimmed.strip_prefix('@') {
        Recipient::ChannelUsername(format!("@{}", username))
    } else {
        Recipient::ChannelUsername(format!("@{}", trimmed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_reference_parsing() {
        assert_eq!(
            chat_recipient("-1001234567890"),
            Recipient::Id(ChatId(-1001234567890))
        );
        assert_eq!(
            chat_recipient("@chan1"),
            Recipient::ChannelUsername("@chan1".to_string())
        );
        assert_eq!(
            chat_recipient("chan1"),
            Recipient::ChannelUsername("@chan1".to_string())
        );
    }
}
