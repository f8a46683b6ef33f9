//! SQLite layer for the button tree, registered users and media attachments.

use rand::distr::{Alphanumeric, SampleString};
use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Kind of content a button or attachment carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Document,
    Photo,
    Video,
    Audio,
    Voice,
    Animation,
    Text,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Document => "document",
            ContentKind::Photo => "photo",
            ContentKind::Video => "video",
            ContentKind::Audio => "audio",
            ContentKind::Voice => "voice",
            ContentKind::Animation => "animation",
            ContentKind::Text => "text",
        }
    }

    /// Kinds Telegram accepts inside one media-group message.
    pub fn groupable(self) -> bool {
        matches!(
            self,
            ContentKind::Photo | ContentKind::Video | ContentKind::Animation
        )
    }
}

impl FromStr for ContentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(ContentKind::Document),
            "photo" => Ok(ContentKind::Photo),
            "video" => Ok(ContentKind::Video),
            "audio" => Ok(ContentKind::Audio),
            "voice" => Ok(ContentKind::Voice),
            "animation" => Ok(ContentKind::Animation),
            "text" => Ok(ContentKind::Text),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Button {
    pub id: i64,
    pub name: String,
    pub callback_data: String,
    pub parent_id: i64,
    pub content_type: Option<String>,
    pub file_id: Option<String>,
    pub created_at: i64,
}

impl Button {
    pub fn content_kind(&self) -> Option<ContentKind> {
        self.content_type.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MediaFile {
    pub id: i64,
    pub button_id: i64,
    pub file_id: String,
    pub content_type: String,
    pub caption: Option<String>,
    pub sort_order: i64,
    pub name: Option<String>,
    pub created_at: i64,
}

impl MediaFile {
    pub fn content_kind(&self) -> Option<ContentKind> {
        self.content_type.parse().ok()
    }
}

/// One deliverable unit of content: an opaque Telegram file reference
/// (or raw text for `ContentKind::Text`) plus an optional caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: ContentKind,
    pub file_id: String,
    pub caption: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection pool could not hand out a connection in time.
    #[error("database pool busy")]
    Busy,
    #[error("system clock is before UNIX_EPOCH")]
    Clock,
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut => StoreError::Busy,
            other => StoreError::Sqlx(other),
        }
    }
}

const BUTTON_COLUMNS: &str =
    "id, name, callback_data, parent_id, content_type, file_id, created_at";
const MEDIA_COLUMNS: &str =
    "id, button_id, file_id, content_type, caption, sort_order, name, created_at";

/// Parent chains longer than this are treated as cyclic.
const MAX_TREE_DEPTH: usize = 64;

pub struct Db {
    pool: SqlitePool,
}

fn current_unix_timestamp() -> Result<i64, anyhow::Error> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .map_err(|err| anyhow::anyhow!("System time is before UNIX_EPOCH: {}", err))
}

impl Db {
    pub async fn open(
        path: impl AsRef<Path>,
        pool_max: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow::anyhow!("Failed to create database directory: {}", e))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_max.max(1))
            .acquire_timeout(acquire_timeout)
            .connect_with(opts)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to SQLite: {}", e))?;

        let db = Self { pool };
        db.migrate().await?;
        db.seed_defaults().await?;
        Ok(db)
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Self {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .unwrap();
        let db = Self { pool };
        db.migrate().await.unwrap();
        db.seed_defaults().await.unwrap();
        db
    }

    async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS buttons (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                callback_data TEXT UNIQUE NOT NULL,
                parent_id INTEGER NOT NULL DEFAULT 0,
                content_type TEXT,
                file_id TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_buttons_parent ON buttons(parent_id);
            CREATE INDEX IF NOT EXISTS idx_buttons_callback ON buttons(callback_data);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("buttons migration: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                first_name TEXT,
                last_name TEXT,
                class_type TEXT,
                registered_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("users migration: {}", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS media_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                button_id INTEGER NOT NULL REFERENCES buttons(id) ON DELETE CASCADE,
                file_id TEXT NOT NULL,
                content_type TEXT NOT NULL,
                caption TEXT,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_media_button ON media_files(button_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| anyhow::anyhow!("media_files migration: {}", e))?;

        // The name label arrived after the first deployments.
        self.ensure_column_exists("media_files", "name", "TEXT")
            .await?;

        Ok(())
    }

    async fn ensure_column_exists(
        &self,
        table: &str,
        column: &str,
        sql_type: &str,
    ) -> Result<(), anyhow::Error> {
        let count = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM pragma_table_info('{}') WHERE name = '{}'",
            table, column
        ))
        .fetch_one(&self.pool)
        .await?;
        if count == 0 {
            sqlx::query(&format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                table, column, sql_type
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Root sections every fresh install starts with.
    async fn seed_defaults(&self) -> Result<(), anyhow::Error> {
        let now = current_unix_timestamp()?;
        let defaults = [
            ("العلمي", "science"),
            ("الأدبي", "literary"),
            ("الإدارة", "admin_panel"),
        ];
        for (name, callback) in defaults {
            sqlx::query(
                "INSERT INTO buttons (name, callback_data, parent_id, created_at)
                 VALUES (?, ?, 0, ?)
                 ON CONFLICT (callback_data) DO NOTHING",
            )
            .bind(name)
            .bind(callback)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }

    pub async fn button_by_token(&self, token: &str) -> Result<Option<Button>, StoreError> {
        let row = sqlx::query_as::<_, Button>(&format!(
            "SELECT {} FROM buttons WHERE callback_data = ?",
            BUTTON_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Display names are not unique; the earliest match wins.
    pub async fn button_by_name(&self, name: &str) -> Result<Option<Button>, StoreError> {
        let row = sqlx::query_as::<_, Button>(&format!(
            "SELECT {} FROM buttons WHERE name = ? ORDER BY id LIMIT 1",
            BUTTON_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn button_by_id(&self, id: i64) -> Result<Option<Button>, StoreError> {
        let row = sqlx::query_as::<_, Button>(&format!(
            "SELECT {} FROM buttons WHERE id = ?",
            BUTTON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn children_of(&self, parent_id: i64) -> Result<Vec<Button>, StoreError> {
        let rows = sqlx::query_as::<_, Button>(&format!(
            "SELECT {} FROM buttons WHERE parent_id = ? ORDER BY id",
            BUTTON_COLUMNS
        ))
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn list_buttons(&self) -> Result<Vec<Button>, StoreError> {
        let rows = sqlx::query_as::<_, Button>(&format!(
            "SELECT {} FROM buttons ORDER BY id",
            BUTTON_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    fn generate_token(name: &str, salt: Option<&str>) -> Result<String, anyhow::Error> {
        let now = current_unix_timestamp()?;
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        let digest = hasher.finish();
        Ok(match salt {
            Some(salt) => format!("btn_{}_{:x}_{}", now, digest, salt),
            None => format!("btn_{}_{:x}", now, digest),
        })
    }

    /// Inserts a button under `parent_id` with a generated unique token,
    /// retrying with a random suffix when the token collides.
    pub async fn insert_button(&self, name: &str, parent_id: i64) -> Result<Button, StoreError> {
        let now = current_unix_timestamp().map_err(|_| StoreError::Clock)?;

        for attempt in 0..8 {
            let salt = (attempt > 0).then(|| Alphanumeric.sample_string(&mut rand::rng(), 6));
            let token = Self::generate_token(name, salt.as_deref())
                .map_err(|_| StoreError::Clock)?;

            let result = sqlx::query(
                "INSERT INTO buttons (name, callback_data, parent_id, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(name)
            .bind(&token)
            .bind(parent_id)
            .bind(now)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => {
                    if let Some(button) = self.button_by_token(&token).await? {
                        return Ok(button);
                    }
                }
                Err(err) => {
                    if err.to_string().to_lowercase().contains("unique") {
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }

        Err(StoreError::Sqlx(sqlx::Error::RowNotFound))
    }

    /// Deletes a button; dependent media rows go with it via the FK cascade.
    pub async fn delete_button(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM buttons WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn media_for_button(&self, button_id: i64) -> Result<Vec<MediaFile>, StoreError> {
        let rows = sqlx::query_as::<_, MediaFile>(&format!(
            "SELECT {} FROM media_files WHERE button_id = ? ORDER BY sort_order, id",
            MEDIA_COLUMNS
        ))
        .bind(button_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn attach_media(
        &self,
        button_id: i64,
        kind: ContentKind,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<i64, StoreError> {
        let now = current_unix_timestamp().map_err(|_| StoreError::Clock)?;
        let next_order = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM media_files WHERE button_id = ?",
        )
        .bind(button_id)
        .fetch_one(&self.pool)
        .await?;

        let result = sqlx::query(
            "INSERT INTO media_files (button_id, file_id, content_type, caption, sort_order, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(button_id)
        .bind(file_id)
        .bind(kind.as_str())
        .bind(caption)
        .bind(next_order)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    pub async fn set_media_name(&self, media_id: i64, name: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE media_files SET name = ? WHERE id = ?")
            .bind(name)
            .bind(media_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_media_by_name(
        &self,
        button_id: i64,
        name: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM media_files WHERE button_id = ? AND name = ?")
            .bind(button_id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert-if-absent; a repeated `/start` is a no-op.
    pub async fn register_user(
        &self,
        user_id: i64,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = current_unix_timestamp().map_err(|_| StoreError::Clock)?;
        sqlx::query(
            "INSERT INTO users (user_id, first_name, last_name, registered_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(first_name)
        .bind(last_name)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[cfg(test)]
    pub fn pool_for_tests(&self) -> &SqlitePool {
        &self.pool
    }

    #[cfg(test)]
    pub async fn user_count(&self) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    /// Walks the parent chain from `parent_id` towards the root. Returns
    /// false when a link is missing, the chain revisits a node, or the
    /// depth bound is exceeded; inserting under such a chain is rejected.
    pub async fn parent_chain_terminates(&self, parent_id: i64) -> Result<bool, StoreError> {
        let mut current = parent_id;
        let mut seen = std::collections::HashSet::new();
        for _ in 0..MAX_TREE_DEPTH {
            if current == 0 {
                return Ok(true);
            }
            if !seen.insert(current) {
                return Ok(false);
            }
            match self.button_by_id(current).await? {
                Some(button) => current = button.parent_id,
                None => return Ok(false),
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_default_sections_once() {
        let db = Db::open_in_memory().await;
        let roots = db.children_of(0).await.unwrap();
        assert_eq!(roots.len(), 3);
        assert_eq!(roots[0].callback_data, "science");

        db.seed_defaults().await.unwrap();
        assert_eq!(db.children_of(0).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn insert_then_lookup_roundtrip() {
        let db = Db::open_in_memory().await;
        let button = db.insert_button("الرياضيات", 0).await.unwrap();
        assert!(button.callback_data.starts_with("btn_"));

        let found = db
            .button_by_token(&button.callback_data)
            .await
            .unwrap()
            .expect("inserted button resolvable by token");
        assert_eq!(found.id, button.id);
        assert_eq!(found.name, "الرياضيات");

        let by_name = db.button_by_name("الرياضيات").await.unwrap().unwrap();
        assert_eq!(by_name.id, button.id);
    }

    #[tokio::test]
    async fn register_user_is_idempotent() {
        let db = Db::open_in_memory().await;
        db.register_user(7, Some("أحمد"), None).await.unwrap();
        db.register_user(7, Some("أحمد"), None).await.unwrap();
        assert_eq!(db.user_count().await, 1);
    }

    #[tokio::test]
    async fn delete_button_cascades_media() {
        let db = Db::open_in_memory().await;
        let button = db.insert_button("ملخصات", 0).await.unwrap();
        db.attach_media(button.id, ContentKind::Document, "FILE1", None)
            .await
            .unwrap();
        db.attach_media(button.id, ContentKind::Photo, "FILE2", None)
            .await
            .unwrap();
        assert_eq!(db.media_for_button(button.id).await.unwrap().len(), 2);

        assert!(db.delete_button(button.id).await.unwrap());
        assert!(db.button_by_id(button.id).await.unwrap().is_none());
        assert!(db.media_for_button(button.id).await.unwrap().is_empty());
        assert!(!db.children_of(0).await.unwrap().iter().any(|b| b.id == button.id));
    }

    #[tokio::test]
    async fn named_media_can_be_deleted_individually() {
        let db = Db::open_in_memory().await;
        let button = db.insert_button("فيزياء", 0).await.unwrap();
        let media_id = db
            .attach_media(button.id, ContentKind::Document, "FILE1", None)
            .await
            .unwrap();
        db.set_media_name(media_id, "الفصل الأول").await.unwrap();

        assert!(!db.delete_media_by_name(button.id, "غير موجود").await.unwrap());
        assert!(db.delete_media_by_name(button.id, "الفصل الأول").await.unwrap());
        assert!(db.media_for_button(button.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn media_keeps_insertion_order() {
        let db = Db::open_in_memory().await;
        let button = db.insert_button("كيمياء", 0).await.unwrap();
        for file_id in ["A", "B", "C"] {
            db.attach_media(button.id, ContentKind::Photo, file_id, None)
                .await
                .unwrap();
        }
        let media = db.media_for_button(button.id).await.unwrap();
        let ids: Vec<&str> = media.iter().map(|m| m.file_id.as_str()).collect();
        assert_eq!(ids, ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn parent_chain_validation() {
        let db = Db::open_in_memory().await;
        assert!(db.parent_chain_terminates(0).await.unwrap());

        let a = db.insert_button("أ", 0).await.unwrap();
        let b = db.insert_button("ب", a.id).await.unwrap();
        assert!(db.parent_chain_terminates(b.id).await.unwrap());

        // Missing parent.
        assert!(!db.parent_chain_terminates(9999).await.unwrap());

        // Manufactured cycle: a -> b -> a.
        sqlx::query("UPDATE buttons SET parent_id = ? WHERE id = ?")
            .bind(b.id)
            .bind(a.id)
            .execute(&db.pool)
            .await
            .unwrap();
        assert!(!db.parent_chain_terminates(a.id).await.unwrap());
    }
}
