use super::format;
use super::shared::{
    BUSY_TEXT, HandlerResult, callback_message_target, deliver_attachments, report_store_error,
    send_main_menu,
};
use super::state::AppState;
use crate::admin::AdminFlow;
use crate::bot::keyboards;
use crate::membership::check_membership;
use crate::menu::{self, Resolution};
use teloxide::types::CallbackQuery;

const MAIN_MENU_GREETING: &str = "مرحباً! اختر القسم المناسب:";

fn is_admin_callback(data: &str) -> bool {
    matches!(
        data,
        keyboards::CB_ADMIN_PANEL
            | keyboards::CB_ADMIN_ADD
            | keyboards::CB_ADMIN_REMOVE
            | keyboards::CB_ADMIN_UPLOAD
            | keyboards::CB_ADMIN_DELETE_CONTENT
            | keyboards::CB_ADMIN_LIST
    )
}

pub async fn handle_callback(state: &AppState, q: &CallbackQuery) -> HandlerResult {
    let user_id = q.from.id.0 as i64;
    let data = q.data.as_deref().unwrap_or("");
    let Some(client) = state.client() else {
        tracing::warn!(user_id, "Dropping callback: Telegram client not initialized");
        return Ok(());
    };
    tracing::info!(user_id, data, "Callback query");

    if is_admin_callback(data) && !state.config.is_admin(user_id) {
        client
            .answer_callback(
                q.id.clone(),
                Some("ليس لديك صلاحية للوصول إلى هذه الصفحة."),
                true,
            )
            .await?;
        return Ok(());
    }

    // Stop the spinner before doing any store work.
    if let Err(error) = client.answer_callback(q.id.clone(), None, false).await {
        tracing::debug!(error = %error, "answerCallbackQuery failed");
    }

    let target = callback_message_target(q);
    let Some((chat_id, message_id)) = target else {
        tracing::debug!(user_id, data, "Callback without an accessible message");
        return Ok(());
    };
    let Some(db) = state.db() else {
        client.send_text(chat_id, BUSY_TEXT, None).await?;
        return Ok(());
    };

    match data {
        keyboards::CB_CHECK_MEMBERSHIP => {
            let report =
                check_membership(Some(client), &state.config.required_chats, user_id).await;
            if report.ok() {
                if let Err(error) = send_main_menu(
                    client,
                    db,
                    chat_id,
                    Some(message_id),
                    "شكرًا! تم التحقق — يمكنك الآن استخدام البوت:",
                )
                .await
                {
                    report_store_error(client, chat_id, "check_membership", &error).await?;
                }
            } else {
                client
                    .edit_text(
                        chat_id,
                        message_id,
                        &format::membership_report_text(&report, true),
                        Some(keyboards::missing_chats_markup()),
                    )
                    .await?;
            }
        }

        keyboards::CB_ADMIN_PANEL => {
            client
                .edit_text(
                    chat_id,
                    message_id,
                    "لوحة تحكم المشرف:",
                    Some(keyboards::admin_panel_markup()),
                )
                .await?;
        }

        keyboards::CB_ADMIN_ADD => {
            state.sessions.set(user_id, AdminFlow::AwaitingAdd).await;
            client
                .send_text(
                    chat_id,
                    "أرسل اسم الزر الجديد ورقم الزر الأب بالصيغة:\nاسم الزر|رقم الأب (0 للقائمة الرئيسية)",
                    None,
                )
                .await?;
        }

        keyboards::CB_ADMIN_REMOVE => {
            state.sessions.set(user_id, AdminFlow::AwaitingRemove).await;
            client
                .send_text(
                    chat_id,
                    "أرسل رقم الزر الذي تريد حذفه (انظر 'عرض جميع الأزرار').",
                    None,
                )
                .await?;
        }

        keyboards::CB_ADMIN_UPLOAD => {
            state
                .sessions
                .set(user_id, AdminFlow::AwaitingUploadSelect)
                .await;
            client
                .send_text(chat_id, "أرسل رقم الزر أو اسمه لرفع الملفات له.", None)
                .await?;
        }

        keyboards::CB_ADMIN_DELETE_CONTENT => {
            state.sessions.set(user_id, AdminFlow::AwaitingDelete).await;
            client
                .send_text(
                    chat_id,
                    "أرسل رقم الزر واسم المحتوى بالصيغة: رقم الزر|اسم المحتوى",
                    None,
                )
                .await?;
        }

        keyboards::CB_ADMIN_LIST => match db.list_buttons().await {
            Ok(buttons) => {
                client
                    .send_text(chat_id, &format::buttons_list_text(&buttons), None)
                    .await?;
            }
            Err(error) => {
                report_store_error(client, chat_id, "list_buttons", &error).await?;
            }
        },

        keyboards::CB_BACK_TO_MAIN => {
            if let Err(error) =
                send_main_menu(client, db, chat_id, Some(message_id), MAIN_MENU_GREETING).await
            {
                report_store_error(client, chat_id, "back_to_main", &error).await?;
            }
        }

        token => match menu::resolve(db, token).await {
            Ok(Resolution::Content(attachments)) => {
                deliver_attachments(client, chat_id, &attachments).await?;
            }
            Ok(Resolution::Children(children)) => {
                client
                    .edit_text(
                        chat_id,
                        message_id,
                        "اختر من القائمة:",
                        Some(keyboards::menu_markup(&children, true)),
                    )
                    .await?;
            }
            Ok(Resolution::Empty) => {
                client
                    .send_text(chat_id, "هذه القائمة لا تحتوي على محتوى بعد.", None)
                    .await?;
            }
            Ok(Resolution::NotFound) => {
                tracing::info!(token, "Callback token not found");
                client.send_text(chat_id, "الزر غير موجود.", None).await?;
            }
            Err(error) => {
                report_store_error(client, chat_id, "resolve", &error).await?;
            }
        },
    }

    Ok(())
}
