//! Required-channel membership gate for `/start`.

use crate::telegram::{Client, ClientError, chat_recipient};
use teloxide::types::{ChatMemberStatus, UserId};

/// Why a required chat counts as missing for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingReason {
    BotNotInitialized,
    UserNotMember,
    BotMustBeAdmin,
    BotCannotAccessMembers,
    ChatNotFound,
    UnknownError,
}

impl MissingReason {
    pub fn as_str(self) -> &'static str {
        match self {
            MissingReason::BotNotInitialized => "bot_not_initialized",
            MissingReason::UserNotMember => "user_not_member",
            MissingReason::BotMustBeAdmin => "bot_must_be_admin",
            MissingReason::BotCannotAccessMembers => "bot_cannot_access_members",
            MissingReason::ChatNotFound => "chat_not_found",
            MissingReason::UnknownError => "unknown_error",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MembershipReport {
    /// Chats the user still has to join, with the reason each one failed.
    pub missing: Vec<(String, MissingReason)>,
}

impl MembershipReport {
    pub fn ok(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Maps an API error to a reason by matching the error text, the way the
/// platform reports these conditions.
fn classify_error(error: &ClientError) -> MissingReason {
    let text = error.to_string().to_lowercase();
    if text.contains("chat_admin_required") {
        MissingReason::BotMustBeAdmin
    } else if text.contains("member list is inaccessible") || text.contains("not enough rights") {
        MissingReason::BotCannotAccessMembers
    } else if text.contains("chat not found") {
        MissingReason::ChatNotFound
    } else {
        MissingReason::UnknownError
    }
}

/// Checks the user against every configured required chat. Never fails:
/// each error path becomes a per-chat missing entry, so one bad channel
/// reference cannot abort the whole check. Safe to call repeatedly.
pub async fn check_membership(
    client: Option<&Client>,
    required: &[String],
    user_id: i64,
) -> MembershipReport {
    let mut report = MembershipReport::default();
    if required.is_empty() {
        return report;
    }

    let Some(client) = client else {
        tracing::warn!(user_id, "Bot not initialized; failing membership check closed");
        report.missing = required
            .iter()
            .map(|chat| (chat.clone(), MissingReason::BotNotInitialized))
            .collect();
        return report;
    };

    for chat in required {
        match client
            .chat_member(chat_recipient(chat), UserId(user_id as u64))
            .await
        {
            Ok(member) => {
                let status = member.status();
                tracing::debug!(user_id, chat = %chat, status = ?status, "get_chat_member");
                if !matches!(
                    status,
                    ChatMemberStatus::Owner
                        | ChatMemberStatus::Administrator
                        | ChatMemberStatus::Member
                ) {
                    report
                        .missing
                        .push((chat.clone(), MissingReason::UserNotMember));
                }
            }
            Err(error) => {
                let reason = classify_error(&error);
                tracing::warn!(
                    user_id,
                    chat = %chat,
                    error = %error,
                    reason = reason.as_str(),
                    "get_chat_member failed"
                );
                report.missing.push((chat.clone(), reason));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::ApiError;

    #[tokio::test]
    async fn no_required_chats_means_ok_for_anyone() {
        let report = check_membership(None, &[], 123).await;
        assert!(report.ok());
        assert!(report.missing.is_empty());
    }

    #[tokio::test]
    async fn missing_client_fails_closed() {
        let required = vec!["@chan1".to_string(), "-100123".to_string()];
        let report = check_membership(None, &required, 123).await;
        assert!(!report.ok());
        assert_eq!(report.missing.len(), 2);
        assert!(
            report
                .missing
                .iter()
                .all(|(_, reason)| *reason == MissingReason::BotNotInitialized)
        );
    }

    #[test]
    fn error_text_classification() {
        let api = |e: ApiError| ClientError::Api(teloxide::RequestError::Api(e));
        assert_eq!(
            classify_error(&api(ApiError::Unknown(
                "Bad Request: CHAT_ADMIN_REQUIRED".to_string()
            ))),
            MissingReason::BotMustBeAdmin
        );
        assert_eq!(
            classify_error(&api(ApiError::Unknown(
                "Bad Request: member list is inaccessible".to_string()
            ))),
            MissingReason::BotCannotAccessMembers
        );
        assert_eq!(
            classify_error(&api(ApiError::Unknown(
                "Bad Request: not enough rights".to_string()
            ))),
            MissingReason::BotCannotAccessMembers
        );
        assert_eq!(
            classify_error(&api(ApiError::ChatNotFound)),
            MissingReason::ChatNotFound
        );
        assert_eq!(
            classify_error(&ClientError::Timeout),
            MissingReason::UnknownError
        );
    }
}
