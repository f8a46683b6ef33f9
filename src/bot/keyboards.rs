//! Inline keyboards: menu tree, admin panel, membership re-check.

use crate::db::Button;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

pub const CB_ADMIN_PANEL: &str = "admin_panel";
pub const CB_ADMIN_ADD: &str = "admin_add_button";
pub const CB_ADMIN_REMOVE: &str = "admin_remove_button";
pub const CB_ADMIN_UPLOAD: &str = "admin_upload_to_button";
pub const CB_ADMIN_DELETE_CONTENT: &str = "admin_delete_content";
pub const CB_ADMIN_LIST: &str = "admin_list_buttons";
pub const CB_BACK_TO_MAIN: &str = "back_to_main";
pub const CB_CHECK_MEMBERSHIP: &str = "check_membership";

/// One button per row, each carrying its own token; submenus get the
/// synthetic back entry pointing at the root.
pub fn menu_markup(buttons: &[Button], with_back: bool) -> InlineKeyboardMarkup {
    let mut markup = InlineKeyboardMarkup::default();
    for button in buttons {
        markup = markup.append_row(vec![InlineKeyboardButton::callback(
            button.name.clone(),
            button.callback_data.clone(),
        )]);
    }
    if with_back {
        markup = markup.append_row(vec![InlineKeyboardButton::callback(
            "العودة",
            CB_BACK_TO_MAIN,
        )]);
    }
    markup
}

pub fn admin_panel_markup() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default()
        .append_row(vec![InlineKeyboardButton::callback(
            "إضافة زر جديد",
            CB_ADMIN_ADD,
        )])
        .append_row(vec![InlineKeyboardButton::callback("حذف زر", CB_ADMIN_REMOVE)])
        .append_row(vec![InlineKeyboardButton::callback(
            "رفع ملف لزر موجود",
            CB_ADMIN_UPLOAD,
        )])
        .append_row(vec![InlineKeyboardButton::callback(
            "حذف محتوى باسمه",
            CB_ADMIN_DELETE_CONTENT,
        )])
        .append_row(vec![InlineKeyboardButton::callback(
            "عرض جميع الأزرار",
            CB_ADMIN_LIST,
        )])
        .append_row(vec![InlineKeyboardButton::callback("العودة", CB_BACK_TO_MAIN)])
}

pub fn missing_chats_markup() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::default().append_row(vec![InlineKeyboardButton::callback(
        "لقد انضممت — تحقق",
        CB_CHECK_MEMBERSHIP,
    )])
}
