use crate::db::Button;
use crate::membership::{MembershipReport, MissingReason};
use chrono::{DateTime, Local, Utc};

pub fn format_date(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.with_timezone(&Local).format("%d.%m.%Y").to_string())
        .unwrap_or_else(|| "—".to_string())
}

fn missing_chat_line(chat: &str, reason: MissingReason) -> String {
    match reason {
        MissingReason::BotMustBeAdmin => {
            format!("- {} — يجب إضافة البوت كمشرف (admin) في هذه القناة.", chat)
        }
        MissingReason::BotCannotAccessMembers => {
            format!(
                "- {} — البوت لا يستطيع الوصول إلى قائمة الأعضاء (تأكد أنه عضو/مشرف).",
                chat
            )
        }
        MissingReason::ChatNotFound => {
            format!("- {} — لم يتم العثور على القناة/المجموعة. تحقق من الاسم أو id.", chat)
        }
        MissingReason::UserNotMember => {
            format!("- {} — لم تنضم بعد إلى هذه القناة/المجموعة.", chat)
        }
        MissingReason::BotNotInitialized | MissingReason::UnknownError => {
            format!("- {} — خطأ: {}", chat, reason.as_str())
        }
    }
}

/// The join-required report shown on `/start` and after a failed re-check.
pub fn membership_report_text(report: &MembershipReport, recheck: bool) -> String {
    let mut lines = vec![
        if recheck {
            "✋ يلزم الانضمام أو إصلاح صلاحيات البوت في التالي:".to_string()
        } else {
            "✋ قبل استخدام البوت، يلزم الانضمام إلى القنوات/المجموعة التالية:".to_string()
        },
    ];
    for (chat, reason) in &report.missing {
        lines.push(missing_chat_line(chat, *reason));
    }
    lines.push(String::new());
    lines.push("بعد الانضمام اضغط: 'لقد انضممت — تحقق'".to_string());
    lines.join("\n")
}

pub fn buttons_list_text(buttons: &[Button]) -> String {
    if buttons.is_empty() {
        return "لا توجد أزرار".to_string();
    }
    let mut lines = vec!["جميع الأزرار:".to_string()];
    for button in buttons {
        lines.push(format!(
            "{}: {} (رمز: {}, أب: {}, أنشئ: {})",
            button.id,
            button.name,
            button.callback_data,
            button.parent_id,
            format_date(button.created_at),
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_lists_each_missing_chat_with_its_reason() {
        let report = MembershipReport {
            missing: vec![
                ("@chan1".to_string(), MissingReason::UserNotMember),
                ("@chan2".to_string(), MissingReason::ChatNotFound),
            ],
        };
        let text = membership_report_text(&report, false);
        assert!(text.contains("@chan1"));
        assert!(text.contains("لم تنضم بعد"));
        assert!(text.contains("@chan2"));
        assert!(text.contains("لقد انضممت — تحقق"));
    }

    #[test]
    fn empty_button_list_renders_placeholder() {
        assert_eq!(buttons_list_text(&[]), "لا توجد أزرار");
    }
}
