//! Per-admin multi-turn flow state and the parsers for its text inputs.

use std::collections::HashMap;
use tokio::sync::Mutex;

/// Literal reply that ends an upload flow.
pub const FINISH_WORD: &str = "انتهيت";
/// Literal reply that leaves an attachment unnamed.
pub const SKIP_WORD: &str = "تخطي";

/// What an admin is in the middle of doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminFlow {
    AwaitingAdd,
    AwaitingRemove,
    AwaitingUploadSelect,
    AwaitingUpload { button_id: i64 },
    AwaitingName { button_id: i64, media_id: i64 },
    AwaitingDelete,
}

/// In-memory session store keyed by admin user id. Volatile by design: a
/// restart drops every in-progress flow and the admin starts over. Call
/// sites only see this interface, so a shared or persistent backend could
/// replace the map without touching them.
#[derive(Default)]
pub struct Sessions {
    inner: Mutex<HashMap<i64, AdminFlow>>,
}

impl Sessions {
    pub async fn get(&self, user_id: i64) -> Option<AdminFlow> {
        self.inner.lock().await.get(&user_id).cloned()
    }

    pub async fn set(&self, user_id: i64, flow: AdminFlow) {
        self.inner.lock().await.insert(user_id, flow);
    }

    pub async fn clear(&self, user_id: i64) {
        self.inner.lock().await.remove(&user_id);
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum AddInputError {
    /// No `|` separator between name and parent id.
    MissingSeparator,
    /// The parent part is not an integer.
    BadParentId,
    /// The name part is empty.
    EmptyName,
}

/// Parses the add-button input `name|parent_id` (0 means the root menu).
pub fn parse_add_input(text: &str) -> Result<(String, i64), AddInputError> {
    let (name_part, parent_part) = text
        .split_once('|')
        .ok_or(AddInputError::MissingSeparator)?;
    let name = name_part.trim();
    if name.is_empty() {
        return Err(AddInputError::EmptyName);
    }
    let parent_id = parent_part
        .trim()
        .parse::<i64>()
        .map_err(|_| AddInputError::BadParentId)?;
    Ok((name.to_string(), parent_id))
}

/// Parses the delete-content input `button_id|content_name`.
pub fn parse_delete_input(text: &str) -> Option<(i64, String)> {
    let (id_part, name_part) = text.split_once('|')?;
    let button_id = id_part.trim().parse::<i64>().ok()?;
    let name = name_part.trim();
    if name.is_empty() {
        return None;
    }
    Some((button_id, name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_input_parsing() {
        assert_eq!(
            parse_add_input("الرياضيات|0"),
            Ok(("الرياضيات".to_string(), 0))
        );
        assert_eq!(
            parse_add_input("  فيزياء | 12 "),
            Ok(("فيزياء".to_string(), 12))
        );
        assert_eq!(
            parse_add_input("بدون فاصل"),
            Err(AddInputError::MissingSeparator)
        );
        assert_eq!(
            parse_add_input("اسم|ليس رقماً"),
            Err(AddInputError::BadParentId)
        );
        assert_eq!(parse_add_input("|3"), Err(AddInputError::EmptyName));
    }

    #[test]
    fn delete_input_parsing() {
        assert_eq!(
            parse_delete_input("4|الفصل الأول"),
            Some((4, "الفصل الأول".to_string()))
        );
        assert_eq!(parse_delete_input("nope"), None);
        assert_eq!(parse_delete_input("x|اسم"), None);
        assert_eq!(parse_delete_input("4|"), None);
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_admin() {
        let sessions = Sessions::default();
        sessions.set(1, AdminFlow::AwaitingAdd).await;
        sessions
            .set(2, AdminFlow::AwaitingUpload { button_id: 9 })
            .await;

        assert_eq!(sessions.get(1).await, Some(AdminFlow::AwaitingAdd));
        assert_eq!(
            sessions.get(2).await,
            Some(AdminFlow::AwaitingUpload { button_id: 9 })
        );

        sessions.clear(1).await;
        assert_eq!(sessions.get(1).await, None);
        assert!(sessions.get(2).await.is_some());
    }
}
