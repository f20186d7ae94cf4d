/*!
 * Repository layer for database operations.
 *
 * This module implements the chapter and context stores on top of SQLite,
 * abstracting away the SQL details. Status transitions and context versions
 * are checked inside the same transaction as the write.
 */

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use super::connection::DatabaseConnection;
use crate::chapter::{Chapter, ChapterLogEntry, ChapterStatus, ChapterUpdate, LogLevel};
use crate::context::{ExtractedContext, StoryContext};
use crate::errors::StoreError;
use crate::store::{check_transition, check_version, ChapterStore, ContextStore};

const CHAPTER_COLUMNS: &str = "id, story_id, chapter_number, title, original_content, \
     translated_content, status, created_at, updated_at";

/// Repository for database operations
#[derive(Clone, Debug)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

/// Fixed-width timestamps so text comparison orders them correctly
fn format_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Database(format!("Invalid timestamp '{}': {}", value, e)))
}

/// Raw chapter row before conversion
struct ChapterRow {
    id: String,
    story_id: String,
    chapter_number: u32,
    title: String,
    original_content: String,
    translated_content: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
}

impl ChapterRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            story_id: row.get(1)?,
            chapter_number: row.get(2)?,
            title: row.get(3)?,
            original_content: row.get(4)?,
            translated_content: row.get(5)?,
            status: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_chapter(self) -> Result<Chapter, StoreError> {
        let status: ChapterStatus = self
            .status
            .parse()
            .map_err(|e: anyhow::Error| StoreError::Database(e.to_string()))?;

        Ok(Chapter {
            id: self.id,
            story_id: self.story_id,
            chapter_number: self.chapter_number,
            title: self.title,
            original_content: self.original_content,
            translated_content: self.translated_content,
            status,
            logs: Vec::new(),
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new(DatabaseConnection::default_path()?)?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    // =========================================================================
    // Chapter Operations
    // =========================================================================

    /// Insert a chapter as produced by the ingestion side
    pub async fn insert_chapter(&self, chapter: &Chapter) -> Result<(), StoreError> {
        let chapter = chapter.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO chapters (
                        id, story_id, chapter_number, title, original_content,
                        translated_content, status, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                    params![
                        chapter.id,
                        chapter.story_id,
                        chapter.chapter_number,
                        chapter.title,
                        chapter.original_content,
                        chapter.translated_content,
                        chapter.status.as_str(),
                        format_time(&chapter.created_at),
                        format_time(&chapter.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Audit trail of a chapter, oldest first
    pub async fn get_logs(&self, chapter_id: &str) -> Result<Vec<ChapterLogEntry>, StoreError> {
        let chapter_id = chapter_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_logs_sync(conn, &chapter_id))
            .await
    }

    /// Overwrite a chapter's last update time
    pub async fn set_updated_at(&self, chapter_id: &str, updated_at: DateTime<Utc>) -> Result<(), StoreError> {
        let chapter_id = chapter_id.to_string();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "UPDATE chapters SET updated_at = ?1 WHERE id = ?2",
                    params![format_time(&updated_at), chapter_id],
                )?;
                Ok(())
            })
            .await
    }

    fn get_chapter_sync(conn: &Connection, chapter_id: &str) -> Result<Option<Chapter>, StoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM chapters WHERE id = ?1", CHAPTER_COLUMNS),
                [chapter_id],
                ChapterRow::from_row,
            )
            .optional()?;

        row.map(ChapterRow::into_chapter).transpose()
    }

    fn get_logs_sync(conn: &Connection, chapter_id: &str) -> Result<Vec<ChapterLogEntry>, StoreError> {
        let mut stmt = conn.prepare(
            r#"
            SELECT timestamp, level, message, data
            FROM chapter_logs WHERE chapter_id = ?1
            ORDER BY id
            "#,
        )?;

        let rows = stmt
            .query_map([chapter_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(timestamp, level, message, data)| {
                Ok(ChapterLogEntry {
                    timestamp: parse_time(&timestamp)?,
                    level: level
                        .parse()
                        .map_err(|e: anyhow::Error| StoreError::Database(e.to_string()))?,
                    message,
                    data: data.map(|d| serde_json::from_str(&d)).transpose()?,
                })
            })
            .collect()
    }

    fn query_chapters<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<Chapter>, StoreError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, ChapterRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(ChapterRow::into_chapter).collect()
    }

    // =========================================================================
    // Context Operations
    // =========================================================================

    fn get_context_sync(conn: &Connection, story_id: &str) -> Result<Option<StoryContext>, StoreError> {
        let row = conn
            .query_row(
                "SELECT context_json, version, updated_at FROM story_contexts WHERE story_id = ?1",
                [story_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((json, version, updated_at)) => Ok(Some(StoryContext {
                story_id: story_id.to_string(),
                context: serde_json::from_str(&json)?,
                version: version as u64,
                updated_at: parse_time(&updated_at)?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ChapterStore for Repository {
    async fn get_by_id(&self, chapter_id: &str) -> Result<Option<Chapter>, StoreError> {
        let chapter_id = chapter_id.to_string();

        self.db
            .execute_async(move |conn| {
                let chapter = Self::get_chapter_sync(conn, &chapter_id)?;
                match chapter {
                    Some(mut chapter) => {
                        chapter.logs = Self::get_logs_sync(conn, &chapter_id)?;
                        Ok(Some(chapter))
                    }
                    None => Ok(None),
                }
            })
            .await
    }

    async fn update(&self, chapter_id: &str, update: ChapterUpdate) -> Result<Chapter, StoreError> {
        let chapter_id = chapter_id.to_string();

        self.db
            .transaction_async(move |tx| {
                let mut chapter = Self::get_chapter_sync(tx, &chapter_id)?
                    .ok_or_else(|| StoreError::NotFound(format!("chapter {}", chapter_id)))?;

                let mut changed = false;
                if let Some(status) = update.status {
                    if check_transition(&chapter, status)? {
                        chapter.status = status;
                        changed = true;
                    }
                }
                if let Some(content) = update.translated_content {
                    chapter.translated_content = Some(content);
                    changed = true;
                }

                if changed {
                    chapter.updated_at = Utc::now();
                    tx.execute(
                        r#"
                        UPDATE chapters
                        SET status = ?1, translated_content = ?2, updated_at = ?3
                        WHERE id = ?4
                        "#,
                        params![
                            chapter.status.as_str(),
                            chapter.translated_content,
                            format_time(&chapter.updated_at),
                            chapter_id,
                        ],
                    )?;
                    debug!("Chapter {} is now {}", chapter_id, chapter.status);
                }

                chapter.logs = Self::get_logs_sync(tx, &chapter_id)?;
                Ok(chapter)
            })
            .await
    }

    async fn append_log(
        &self,
        chapter_id: &str,
        level: LogLevel,
        message: &str,
        data: Option<serde_json::Value>,
    ) -> Result<(), StoreError> {
        let entry = ChapterLogEntry::new(level, message, data);
        let chapter_id = chapter_id.to_string();

        self.db
            .execute_async(move |conn| {
                let data = entry.data.as_ref().map(serde_json::to_string).transpose()?;
                let inserted = conn.execute(
                    r#"
                    INSERT INTO chapter_logs (chapter_id, timestamp, level, message, data)
                    SELECT ?1, ?2, ?3, ?4, ?5 WHERE EXISTS (SELECT 1 FROM chapters WHERE id = ?1)
                    "#,
                    params![
                        chapter_id,
                        format_time(&entry.timestamp),
                        entry.level.to_string(),
                        entry.message,
                        data,
                    ],
                )?;
                if inserted == 0 {
                    return Err(StoreError::NotFound(format!("chapter {}", chapter_id)));
                }
                conn.execute(
                    "UPDATE chapters SET updated_at = ?1 WHERE id = ?2",
                    params![format_time(&entry.timestamp), chapter_id],
                )?;
                Ok(())
            })
            .await
    }

    async fn list_in_status(&self, status: ChapterStatus, limit: usize) -> Result<Vec<Chapter>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.db
            .execute_async(move |conn| {
                Self::query_chapters(
                    conn,
                    &format!(
                        "SELECT {} FROM chapters WHERE status = ?1 ORDER BY created_at, rowid LIMIT ?2",
                        CHAPTER_COLUMNS
                    ),
                    params![status.as_str(), limit],
                )
            })
            .await
    }

    async fn list_by_range(&self, story_id: &str, from: u32, to: u32) -> Result<Vec<Chapter>, StoreError> {
        let story_id = story_id.to_string();

        self.db
            .execute_async(move |conn| {
                Self::query_chapters(
                    conn,
                    &format!(
                        "SELECT {} FROM chapters
                         WHERE story_id = ?1 AND chapter_number BETWEEN ?2 AND ?3
                         ORDER BY chapter_number",
                        CHAPTER_COLUMNS
                    ),
                    params![story_id, from, to],
                )
            })
            .await
    }

    async fn list_stuck(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<Chapter>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.db
            .execute_async(move |conn| {
                Self::query_chapters(
                    conn,
                    &format!(
                        "SELECT {} FROM chapters
                         WHERE status = 'translating' AND updated_at < ?1
                         ORDER BY updated_at LIMIT ?2",
                        CHAPTER_COLUMNS
                    ),
                    params![format_time(&cutoff), limit],
                )
            })
            .await
    }
}

#[async_trait]
impl ContextStore for Repository {
    async fn get(&self, story_id: &str) -> Result<Option<StoryContext>, StoreError> {
        let story_id = story_id.to_string();

        self.db
            .execute_async(move |conn| Self::get_context_sync(conn, &story_id))
            .await
    }

    async fn upsert(
        &self,
        story_id: &str,
        context: ExtractedContext,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let story_id = story_id.to_string();

        self.db
            .transaction_async(move |tx| {
                let actual: Option<i64> = tx
                    .query_row(
                        "SELECT version FROM story_contexts WHERE story_id = ?1",
                        [&story_id],
                        |row| row.get(0),
                    )
                    .optional()?;

                let version = check_version(&story_id, expected_version, actual.map(|v| v as u64))?;
                let json = serde_json::to_string(&context)?;
                let now = format_time(&Utc::now());

                if actual.is_some() {
                    tx.execute(
                        "UPDATE story_contexts SET context_json = ?1, version = ?2, updated_at = ?3 WHERE story_id = ?4",
                        params![json, version as i64, now, story_id],
                    )?;
                } else {
                    tx.execute(
                        "INSERT INTO story_contexts (story_id, context_json, version, updated_at) VALUES (?1, ?2, ?3, ?4)",
                        params![story_id, json, version as i64, now],
                    )?;
                }

                debug!("Story context {} written at version {}", story_id, version);
                Ok(version)
            })
            .await
    }
}
