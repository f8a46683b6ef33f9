//! Button-tree engine: resolves a callback token (or display name) to the
//! content it carries, the children to present, or a not-found outcome.

use crate::db::{Attachment, Button, Db, StoreError};

/// Telegram caps a media group at ten items.
pub const MAX_ALBUM_SIZE: usize = 10;

/// Outcome of resolving a button. `Empty` (a real button with nothing
/// behind it yet) is deliberately distinct from `NotFound`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Content(Vec<Attachment>),
    Children(Vec<Button>),
    Empty,
    NotFound,
}

/// Looks a button up by its unique token; the display name works as a
/// convenience alias since inline keyboards always carry the token.
pub async fn resolve(db: &Db, token_or_name: &str) -> Result<Resolution, StoreError> {
    let button = match db.button_by_token(token_or_name).await? {
        Some(button) => Some(button),
        None => db.button_by_name(token_or_name).await?,
    };
    match button {
        Some(button) => resolve_button(db, &button).await,
        None => Ok(Resolution::NotFound),
    }
}

pub async fn resolve_button(db: &Db, button: &Button) -> Result<Resolution, StoreError> {
    let attachments = attachments_for(db, button).await?;
    if !attachments.is_empty() {
        return Ok(Resolution::Content(attachments));
    }
    let children = db.children_of(button.id).await?;
    if !children.is_empty() {
        return Ok(Resolution::Children(children));
    }
    Ok(Resolution::Empty)
}

/// Ordered attachments for a button: its `media_files` rows, or the
/// legacy inline content column when no rows exist.
async fn attachments_for(db: &Db, button: &Button) -> Result<Vec<Attachment>, StoreError> {
    let media = db.media_for_button(button.id).await?;
    let mut attachments = Vec::with_capacity(media.len());
    for item in media {
        match item.content_kind() {
            Some(kind) => attachments.push(Attachment {
                kind,
                file_id: item.file_id,
                caption: item.caption,
            }),
            None => {
                tracing::warn!(
                    media_id = item.id,
                    button_id = button.id,
                    content_type = %item.content_type,
                    "Skipping attachment with unknown content type"
                );
            }
        }
    }

    if attachments.is_empty()
        && let (Some(kind), Some(file_id)) = (button.content_kind(), button.file_id.clone())
    {
        attachments.push(Attachment {
            kind,
            file_id,
            caption: None,
        });
    }

    Ok(attachments)
}

/// One outbound message: a multi-media group or a single send.
#[derive(Debug, PartialEq, Eq)]
pub enum Batch<'a> {
    Album(&'a [Attachment]),
    Single(&'a Attachment),
}

/// Splits an attachment list into outbound messages: contiguous runs of
/// groupable kinds are chunked into albums of at most ten, everything
/// else goes out one by one.
pub fn plan_batches(attachments: &[Attachment]) -> Vec<Batch<'_>> {
    let mut batches = Vec::new();
    let mut start = 0;
    while start < attachments.len() {
        if attachments[start].kind.groupable() {
            let mut end = start;
            while end < attachments.len() && attachments[end].kind.groupable() {
                end += 1;
            }
            for chunk in attachments[start..end].chunks(MAX_ALBUM_SIZE) {
                match chunk {
                    [single] => batches.push(Batch::Single(single)),
                    chunk => batches.push(Batch::Album(chunk)),
                }
            }
            start = end;
        } else {
            batches.push(Batch::Single(&attachments[start]));
            start += 1;
        }
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ContentKind;

    fn attachment(kind: ContentKind, file_id: &str) -> Attachment {
        Attachment {
            kind,
            file_id: file_id.to_string(),
            caption: None,
        }
    }

    #[tokio::test]
    async fn resolution_is_a_pure_function_of_store_state() {
        let db = Db::open_in_memory().await;

        // Unknown token.
        assert_eq!(resolve(&db, "no_such_token").await.unwrap(), Resolution::NotFound);

        // Seeded root section with no children and no content.
        assert_eq!(resolve(&db, "science").await.unwrap(), Resolution::Empty);

        // Interior node.
        let science = db.button_by_token("science").await.unwrap().unwrap();
        let math = db.insert_button("الرياضيات", science.id).await.unwrap();
        match resolve(&db, "science").await.unwrap() {
            Resolution::Children(children) => {
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].name, "الرياضيات");
            }
            other => panic!("expected children, got {:?}", other),
        }

        // Leaf with content wins over (absent) children.
        db.attach_media(math.id, ContentKind::Document, "FILE1", Some("تمارين"))
            .await
            .unwrap();
        match resolve(&db, &math.callback_data).await.unwrap() {
            Resolution::Content(attachments) => {
                assert_eq!(attachments.len(), 1);
                assert_eq!(attachments[0].kind, ContentKind::Document);
                assert_eq!(attachments[0].caption.as_deref(), Some("تمارين"));
            }
            other => panic!("expected content, got {:?}", other),
        }

        // Name works as an alias for the token.
        assert!(matches!(
            resolve(&db, "الرياضيات").await.unwrap(),
            Resolution::Content(_)
        ));
    }

    #[tokio::test]
    async fn legacy_inline_content_still_resolves() {
        let db = Db::open_in_memory().await;
        let button = db.insert_button("قديم", 0).await.unwrap();
        sqlx::query("UPDATE buttons SET content_type = 'text', file_id = 'مرحبا' WHERE id = ?")
            .bind(button.id)
            .execute(db.pool_for_tests())
            .await
            .unwrap();

        match resolve(&db, &button.callback_data).await.unwrap() {
            Resolution::Content(attachments) => {
                assert_eq!(attachments.len(), 1);
                assert_eq!(attachments[0].kind, ContentKind::Text);
                assert_eq!(attachments[0].file_id, "مرحبا");
            }
            other => panic!("expected content, got {:?}", other),
        }
    }

    #[test]
    fn batches_chunk_groupable_runs_at_ten() {
        let attachments: Vec<Attachment> = (0..12)
            .map(|i| attachment(ContentKind::Photo, &format!("P{}", i)))
            .collect();
        let batches = plan_batches(&attachments);
        assert_eq!(batches.len(), 2);
        assert!(matches!(batches[0], Batch::Album(chunk) if chunk.len() == 10));
        assert!(matches!(batches[1], Batch::Album(chunk) if chunk.len() == 2));
    }

    #[test]
    fn non_groupable_kinds_break_runs_and_go_out_single() {
        let attachments = vec![
            attachment(ContentKind::Photo, "P1"),
            attachment(ContentKind::Video, "V1"),
            attachment(ContentKind::Document, "D1"),
            attachment(ContentKind::Photo, "P2"),
            attachment(ContentKind::Audio, "A1"),
        ];
        let batches = plan_batches(&attachments);
        assert_eq!(batches.len(), 4);
        assert!(matches!(batches[0], Batch::Album(chunk) if chunk.len() == 2));
        assert!(matches!(batches[1], Batch::Single(a) if a.file_id == "D1"));
        assert!(matches!(batches[2], Batch::Single(a) if a.file_id == "P2"));
        assert!(matches!(batches[3], Batch::Single(a) if a.file_id == "A1"));
    }

    #[test]
    fn lone_groupable_attachment_is_sent_single() {
        let attachments = vec![attachment(ContentKind::Photo, "P1")];
        let batches = plan_batches(&attachments);
        assert_eq!(batches.len(), 1);
        assert!(matches!(batches[0], Batch::Single(_)));
    }
}
