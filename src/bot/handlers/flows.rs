use super::shared::{HandlerResult, store_error_text};
use super::state::AppState;
use crate::admin::{
    AddInputError, AdminFlow, FINISH_WORD, SKIP_WORD, parse_add_input, parse_delete_input,
};
use crate::db::{Button, ContentKind, Db, StoreError};
use crate::telegram::Client;
use teloxide::types::Message;

pub enum AddOutcome {
    Added(Button),
    ParentNotFound,
    /// The parent's chain does not reach the root (missing link or cycle).
    ParentChainBroken,
}

/// The add-button mutation behind the `awaiting_add` step: validates the
/// parent before inserting so a bad admin input cannot corrupt the tree.
pub async fn apply_add(db: &Db, name: &str, parent_id: i64) -> Result<AddOutcome, StoreError> {
    if parent_id != 0 {
        if db.button_by_id(parent_id).await?.is_none() {
            return Ok(AddOutcome::ParentNotFound);
        }
        if !db.parent_chain_terminates(parent_id).await? {
            return Ok(AddOutcome::ParentChainBroken);
        }
    }
    Ok(AddOutcome::Added(db.insert_button(name, parent_id).await?))
}

/// What one step does to the admin's session.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionChange {
    Keep,
    Clear,
    Set(AdminFlow),
}

/// The parts of an incoming admin message a flow step looks at.
pub struct StepInput<'a> {
    pub text: Option<&'a str>,
    pub file: Option<(ContentKind, String)>,
    pub caption: Option<&'a str>,
}

impl<'a> StepInput<'a> {
    pub fn from_message(msg: &'a Message) -> Self {
        Self {
            text: msg.text().map(str::trim),
            file: extract_incoming_file(msg),
            caption: msg.caption(),
        }
    }
}

/// Pulls the attachment out of an incoming admin message, largest photo
/// size winning, the way Telegram orders `photo` arrays.
fn extract_incoming_file(msg: &Message) -> Option<(ContentKind, String)> {
    if let Some(document) = msg.document() {
        return Some((ContentKind::Document, document.file.id.0.clone()));
    }
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        return Some((ContentKind::Photo, photo.file.id.0.clone()));
    }
    if let Some(video) = msg.video() {
        return Some((ContentKind::Video, video.file.id.0.clone()));
    }
    if let Some(audio) = msg.audio() {
        return Some((ContentKind::Audio, audio.file.id.0.clone()));
    }
    if let Some(voice) = msg.voice() {
        return Some((ContentKind::Voice, voice.file.id.0.clone()));
    }
    if let Some(animation) = msg.animation() {
        return Some((ContentKind::Animation, animation.file.id.0.clone()));
    }
    None
}

/// Runs one step of the admin conversation against the store and decides
/// the reply plus the session transition. State only advances on valid
/// input; malformed input keeps the admin where they were, except the
/// delete flow which exits on any error.
pub async fn run_step(db: &Db, input: &StepInput<'_>, flow: AdminFlow) -> (String, SessionChange) {
    match flow {
        AdminFlow::AwaitingAdd => {
            let (name, parent_id) = match parse_add_input(input.text.unwrap_or("")) {
                Ok(parsed) => parsed,
                Err(AddInputError::BadParentId) => {
                    return (
                        "رقم الأب يجب أن يكون عدداً صحيحاً.".to_string(),
                        SessionChange::Keep,
                    );
                }
                Err(_) => {
                    return (
                        "خطأ في الصيغة. استخدم: اسم الزر|رقم الأب (0 للقائمة الرئيسية)"
                            .to_string(),
                        SessionChange::Keep,
                    );
                }
            };

            match apply_add(db, &name, parent_id).await {
                Ok(AddOutcome::Added(button)) => {
                    tracing::info!(
                        button_id = button.id,
                        token = %button.callback_data,
                        "Button added"
                    );
                    (
                        format!(
                            "تم إضافة الزر '{}' بنجاح! (الرمز: {})",
                            name, button.callback_data
                        ),
                        SessionChange::Clear,
                    )
                }
                Ok(AddOutcome::ParentNotFound) => (
                    "لم يتم العثور على الزر الأب. تحقق من الرقم.".to_string(),
                    SessionChange::Keep,
                ),
                Ok(AddOutcome::ParentChainBroken) => (
                    "لا يمكن الإضافة تحت هذا الزر: سلسلة الآباء غير سليمة.".to_string(),
                    SessionChange::Keep,
                ),
                Err(error) => {
                    tracing::error!(error = %error, "Failed to add button");
                    (store_error_text(&error).to_string(), SessionChange::Clear)
                }
            }
        }

        AdminFlow::AwaitingRemove => {
            let Ok(button_id) = input.text.unwrap_or("").parse::<i64>() else {
                return ("يرجى إرسال رقم صحيح.".to_string(), SessionChange::Keep);
            };
            match db.delete_button(button_id).await {
                Ok(true) => {
                    tracing::info!(button_id, "Button deleted");
                    (
                        format!("تم حذف الزر بالمعرف {}.", button_id),
                        SessionChange::Clear,
                    )
                }
                Ok(false) => (
                    "لم يتم العثور على الزر المحدد.".to_string(),
                    SessionChange::Clear,
                ),
                Err(error) => {
                    tracing::error!(error = %error, button_id, "Failed to delete button");
                    (store_error_text(&error).to_string(), SessionChange::Clear)
                }
            }
        }

        AdminFlow::AwaitingUploadSelect => {
            let text = input.text.unwrap_or("");
            let button = if let Ok(id) = text.parse::<i64>() {
                db.button_by_id(id).await
            } else {
                db.button_by_name(text).await
            };
            match button {
                Ok(Some(button)) => (
                    format!(
                        "سيتم الرفع للزر '{}'. أرسل الملف (مستند/صورة/فيديو/صوت)، أو '{}' عند الانتهاء.",
                        button.name, FINISH_WORD
                    ),
                    SessionChange::Set(AdminFlow::AwaitingUpload { button_id: button.id }),
                ),
                Ok(None) => (
                    "لم يتم العثور على الزر. أرسل رقم الزر أو اسمه كما هو.".to_string(),
                    SessionChange::Keep,
                ),
                Err(error) => {
                    tracing::error!(error = %error, "Failed to resolve upload target");
                    (store_error_text(&error).to_string(), SessionChange::Keep)
                }
            }
        }

        AdminFlow::AwaitingUpload { button_id } => {
            if let Some((kind, file_id)) = &input.file {
                match db
                    .attach_media(button_id, *kind, file_id, input.caption)
                    .await
                {
                    Ok(media_id) => {
                        tracing::info!(
                            button_id,
                            media_id,
                            kind = kind.as_str(),
                            "Attachment stored"
                        );
                        (
                            format!(
                                "تم حفظ الملف. أرسل اسماً لهذا المحتوى أو '{}' لتركه بدون اسم.",
                                SKIP_WORD
                            ),
                            SessionChange::Set(AdminFlow::AwaitingName { button_id, media_id }),
                        )
                    }
                    Err(error) => {
                        tracing::error!(error = %error, button_id, "Failed to store attachment");
                        (store_error_text(&error).to_string(), SessionChange::Keep)
                    }
                }
            } else if input.text == Some(FINISH_WORD) {
                ("تم إنهاء الرفع.".to_string(), SessionChange::Clear)
            } else {
                (
                    format!(
                        "لم يتم العثور على ملف في هذه الرسالة. أرسل ملفاً أو '{}' للإنهاء.",
                        FINISH_WORD
                    ),
                    SessionChange::Keep,
                )
            }
        }

        AdminFlow::AwaitingName { button_id, media_id } => {
            let Some(text) = input.text.filter(|t| !t.is_empty()) else {
                return (
                    format!("أرسل اسماً نصياً للمحتوى أو '{}'.", SKIP_WORD),
                    SessionChange::Keep,
                );
            };

            if text == FINISH_WORD {
                return ("تم إنهاء الرفع.".to_string(), SessionChange::Clear);
            }
            if text == SKIP_WORD {
                return (
                    format!("حسناً، بدون اسم. أرسل الملف التالي أو '{}'.", FINISH_WORD),
                    SessionChange::Set(AdminFlow::AwaitingUpload { button_id }),
                );
            }

            match db.set_media_name(media_id, text).await {
                Ok(_) => (
                    format!(
                        "تم حفظ الاسم '{}'. أرسل الملف التالي أو '{}'.",
                        text, FINISH_WORD
                    ),
                    SessionChange::Set(AdminFlow::AwaitingUpload { button_id }),
                ),
                Err(error) => {
                    tracing::error!(error = %error, media_id, "Failed to name attachment");
                    (store_error_text(&error).to_string(), SessionChange::Keep)
                }
            }
        }

        AdminFlow::AwaitingDelete => {
            // Any malformed or non-matching input exits this flow.
            let Some((button_id, name)) = parse_delete_input(input.text.unwrap_or("")) else {
                return (
                    "خطأ في الصيغة. استخدم: رقم الزر|اسم المحتوى".to_string(),
                    SessionChange::Clear,
                );
            };
            match db.delete_media_by_name(button_id, &name).await {
                Ok(true) => {
                    tracing::info!(button_id, name = %name, "Attachment deleted by name");
                    (
                        format!("تم حذف المحتوى '{}'.", name),
                        SessionChange::Clear,
                    )
                }
                Ok(false) => (
                    "لم يتم العثور على محتوى بهذا الاسم.".to_string(),
                    SessionChange::Clear,
                ),
                Err(error) => {
                    tracing::error!(error = %error, button_id, "Failed to delete attachment");
                    (store_error_text(&error).to_string(), SessionChange::Clear)
                }
            }
        }
    }
}

pub async fn handle_step(
    state: &AppState,
    client: &Client,
    db: &Db,
    msg: &Message,
    user_id: i64,
    flow: AdminFlow,
) -> HandlerResult {
    tracing::info!(user_id, flow = ?flow, "Admin flow step");
    let input = StepInput::from_message(msg);
    let (reply, change) = run_step(db, &input, flow).await;

    match change {
        SessionChange::Keep => {}
        SessionChange::Clear => state.sessions.clear(user_id).await,
        SessionChange::Set(next) => state.sessions.set(user_id, next).await,
    }

    client.send_text(msg.chat.id, &reply, None).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_input(text: &str) -> StepInput<'_> {
        StepInput {
            text: Some(text),
            file: None,
            caption: None,
        }
    }

    fn file_input(kind: ContentKind, file_id: &str) -> StepInput<'static> {
        StepInput {
            text: None,
            file: Some((kind, file_id.to_string())),
            caption: None,
        }
    }

    #[tokio::test]
    async fn malformed_add_input_keeps_the_state() {
        let db = Db::open_in_memory().await;
        let (_, change) = run_step(&db, &text_input("بدون فاصل"), AdminFlow::AwaitingAdd).await;
        assert_eq!(change, SessionChange::Keep);

        // A later valid input still succeeds and exits the flow.
        let (reply, change) = run_step(&db, &text_input("Math|0"), AdminFlow::AwaitingAdd).await;
        assert_eq!(change, SessionChange::Clear);
        assert!(reply.contains("Math"));
        assert!(db.button_by_name("Math").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn added_button_appears_in_root_menu() {
        let db = Db::open_in_memory().await;
        let before = db.children_of(0).await.unwrap().len();

        match apply_add(&db, "Math", 0).await.unwrap() {
            AddOutcome::Added(button) => assert_eq!(button.parent_id, 0),
            _ => panic!("expected insert to succeed"),
        }

        let roots = db.children_of(0).await.unwrap();
        assert_eq!(roots.len(), before + 1);
        assert!(roots.iter().any(|b| b.name == "Math"));
    }

    #[tokio::test]
    async fn add_under_missing_parent_is_rejected() {
        let db = Db::open_in_memory().await;
        assert!(matches!(
            apply_add(&db, "orphan", 424242).await.unwrap(),
            AddOutcome::ParentNotFound
        ));
    }

    #[tokio::test]
    async fn add_under_cyclic_chain_is_rejected() {
        let db = Db::open_in_memory().await;
        let a = db.insert_button("a", 0).await.unwrap();
        let b = db.insert_button("b", a.id).await.unwrap();
        sqlx::query("UPDATE buttons SET parent_id = ? WHERE id = ?")
            .bind(b.id)
            .bind(a.id)
            .execute(db.pool_for_tests())
            .await
            .unwrap();

        assert!(matches!(
            apply_add(&db, "c", b.id).await.unwrap(),
            AddOutcome::ParentChainBroken
        ));
    }

    #[tokio::test]
    async fn remove_flow_rejects_non_integer_and_keeps_state() {
        let db = Db::open_in_memory().await;
        let (_, change) = run_step(&db, &text_input("ليس رقماً"), AdminFlow::AwaitingRemove).await;
        assert_eq!(change, SessionChange::Keep);

        let button = db.insert_button("مؤقت", 0).await.unwrap();
        let (_, change) = run_step(
            &db,
            &text_input(&button.id.to_string()),
            AdminFlow::AwaitingRemove,
        )
        .await;
        assert_eq!(change, SessionChange::Clear);
        assert!(db.button_by_id(button.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upload_flow_walks_select_upload_name_and_finish() {
        let db = Db::open_in_memory().await;
        let button = db.insert_button("ملخصات", 0).await.unwrap();

        // Select by exact name.
        let (_, change) = run_step(
            &db,
            &text_input("ملخصات"),
            AdminFlow::AwaitingUploadSelect,
        )
        .await;
        assert_eq!(
            change,
            SessionChange::Set(AdminFlow::AwaitingUpload { button_id: button.id })
        );

        // A file lands and a name is requested.
        let (_, change) = run_step(
            &db,
            &file_input(ContentKind::Document, "FILE1"),
            AdminFlow::AwaitingUpload { button_id: button.id },
        )
        .await;
        let SessionChange::Set(AdminFlow::AwaitingName { media_id, .. }) = change else {
            panic!("expected a name prompt");
        };

        // Naming returns control to the upload state.
        let (_, change) = run_step(
            &db,
            &text_input("الفصل الأول"),
            AdminFlow::AwaitingName {
                button_id: button.id,
                media_id,
            },
        )
        .await;
        assert_eq!(
            change,
            SessionChange::Set(AdminFlow::AwaitingUpload { button_id: button.id })
        );
        let media = db.media_for_button(button.id).await.unwrap();
        assert_eq!(media[0].name.as_deref(), Some("الفصل الأول"));

        // The finish word exits to idle.
        let (_, change) = run_step(
            &db,
            &text_input(FINISH_WORD),
            AdminFlow::AwaitingUpload { button_id: button.id },
        )
        .await;
        assert_eq!(change, SessionChange::Clear);
    }

    #[tokio::test]
    async fn delete_flow_exits_on_malformed_input() {
        let db = Db::open_in_memory().await;
        let (_, change) = run_step(&db, &text_input("غير صالح"), AdminFlow::AwaitingDelete).await;
        assert_eq!(change, SessionChange::Clear);
    }
}
