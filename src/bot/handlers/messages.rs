use super::flows;
use super::format;
use super::shared::{BUSY_TEXT, HandlerResult, report_store_error, send_main_menu};
use super::state::{AppState, sender_is_bot, sender_user_id};
use crate::bot::keyboards;
use crate::db::{Db, StoreError};
use crate::membership::check_membership;
use crate::telegram::Client;
use teloxide::types::Message;
use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    Start,
    Help,
}

const HELP_TEXT: &str = "أرسل /start لعرض الأقسام المتاحة.\n\
للمشرفين: افتح 'الإدارة' من القائمة الرئيسية لإدارة الأزرار والمحتوى.";

pub async fn handle_message(state: &AppState, msg: &Message) -> HandlerResult {
    if sender_is_bot(msg, state.bot_id) {
        return Ok(());
    }
    let Some(user_id) = sender_user_id(msg) else {
        return Ok(());
    };
    let Some(client) = state.client() else {
        tracing::warn!(user_id, "Dropping message: Telegram client not initialized");
        return Ok(());
    };
    let Some(db) = state.db() else {
        client.send_text(msg.chat.id, BUSY_TEXT, None).await?;
        return Ok(());
    };

    // Admin mid-flow input wins over everything else.
    if state.config.is_admin(user_id) {
        if let Some(flow) = state.sessions.get(user_id).await {
            return flows::handle_step(state, client, db, msg, user_id, flow).await;
        }
    }

    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Ok(command) = Command::parse(text, state.bot_username.as_deref().unwrap_or("")) else {
        return Ok(());
    };

    match command {
        Command::Start => start_cmd(state, client, db, msg, user_id).await,
        Command::Help => {
            client.send_text(msg.chat.id, HELP_TEXT, None).await?;
            Ok(())
        }
    }
}

async fn start_cmd(
    state: &AppState,
    client: &Client,
    db: &Db,
    msg: &Message,
    user_id: i64,
) -> HandlerResult {
    let chat_id = msg.chat.id;
    tracing::info!(user_id, chat_id = chat_id.0, "Received /start");

    let report = check_membership(Some(client), &state.config.required_chats, user_id).await;
    if !report.ok() {
        tracing::info!(user_id, missing = report.missing.len(), "Membership gate failed");
        client
            .send_text(
                chat_id,
                &format::membership_report_text(&report, false),
                Some(keyboards::missing_chats_markup()),
            )
            .await?;
        return Ok(());
    }

    let first_name = msg.from.as_ref().map(|user| user.first_name.clone());
    let last_name = msg.from.as_ref().and_then(|user| user.last_name.clone());
    match db
        .register_user(user_id, first_name.as_deref(), last_name.as_deref())
        .await
    {
        Ok(()) => {}
        Err(StoreError::Busy) => {
            client
                .send_text(
                    chat_id,
                    "الخدمة مشغولة حالياً. حاول /start مرة أخرى بعد ثوانٍ.",
                    None,
                )
                .await?;
            return Ok(());
        }
        // Registration failure does not block the menu reply.
        Err(error) => tracing::error!(user_id, error = %error, "Failed to save user"),
    }

    if let Err(error) = send_main_menu(client, db, chat_id, None, "مرحباً! اختر القسم المناسب:").await
    {
        report_store_error(client, chat_id, "main_menu", &error).await?;
    }
    Ok(())
}
