//! Low-level access to the `comments` / `commentmeta` tables.
//!
//! A tracked record is unique per (post, user, type); the partial unique
//! index `comments_progress_key` enforces it. Every write that touches both
//! the record and its metadata runs in one transaction and starts with the
//! write to `comments`, so the connection takes the write lock up front.

use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::fmt;

use super::meta::{MetaKey, MetaMap};
use crate::persistence::sqlite::helpers::{from_db, placeholders, to_db};
use crate::persistence::PersistenceError;

/// The comment types holding progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentType {
    CourseStatus,
    LessonStatus,
    QuizSubmission,
}

impl CommentType {
    pub const TRACKED: [CommentType; 3] = [
        CommentType::CourseStatus,
        CommentType::LessonStatus,
        CommentType::QuizSubmission,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CommentType::CourseStatus => "course_status",
            CommentType::LessonStatus => "lesson_status",
            CommentType::QuizSubmission => "quiz_submission",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::TRACKED.into_iter().find(|ty| ty.as_str() == raw)
    }

    /// Metadata keys owned by this family.
    pub fn meta_keys(self) -> &'static [MetaKey] {
        match self {
            CommentType::CourseStatus | CommentType::LessonStatus => {
                &[MetaKey::Start, MetaKey::Complete, MetaKey::Created]
            }
            CommentType::QuizSubmission => &[
                MetaKey::Created,
                MetaKey::Grade,
                MetaKey::QuizAnswers,
                MetaKey::QuizGrades,
                MetaKey::AnswersFeedback,
            ],
        }
    }
}

impl fmt::Display for CommentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked comment record with its known metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentRecord {
    /// `None` until inserted.
    pub comment_id: Option<u64>,
    /// Course, lesson or quiz id, depending on the type.
    pub post_id: u64,
    pub user_id: u64,
    pub comment_type: CommentType,
    /// Status label.
    pub approved: String,
    pub content: String,
    /// Last update time.
    pub date: u64,
    pub meta: MetaMap,
}

impl CommentRecord {
    pub fn new(comment_type: CommentType, post_id: u64, user_id: u64, approved: &str, date: u64) -> Self {
        Self {
            comment_id: None,
            post_id,
            user_id,
            comment_type,
            approved: approved.to_string(),
            content: String::new(),
            date,
            meta: MetaMap::new(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    comment_id: i64,
    comment_post_id: i64,
    user_id: i64,
    comment_type: String,
    comment_approved: String,
    comment_content: String,
    comment_date: i64,
}

impl CommentRow {
    fn into_record(self, meta: MetaMap) -> Result<CommentRecord, PersistenceError> {
        let comment_type =
            CommentType::parse(&self.comment_type).ok_or_else(|| PersistenceError::Corrupt {
                entity: "comment",
                id: from_db(self.comment_id),
                reason: format!("untracked comment type '{}'", self.comment_type),
            })?;
        Ok(CommentRecord {
            comment_id: Some(from_db(self.comment_id)),
            post_id: from_db(self.comment_post_id),
            user_id: from_db(self.user_id),
            comment_type,
            approved: self.comment_approved,
            content: self.comment_content,
            date: from_db(self.comment_date),
            meta,
        })
    }
}

const TRACKED_TYPES_SQL: &str = "('course_status', 'lesson_status', 'quiz_submission')";

/// Replace `keys` of a record's metadata with the values present in `meta`.
async fn replace_meta(
    conn: &mut SqliteConnection,
    comment_id: i64,
    meta: &MetaMap,
    keys: &[MetaKey],
) -> Result<(), sqlx::Error> {
    if keys.is_empty() {
        return Ok(());
    }

    let sql = format!(
        "DELETE FROM commentmeta WHERE comment_id = ? AND meta_key IN ({})",
        placeholders(keys.len())
    );
    let mut delete = sqlx::query(&sql).bind(comment_id);
    for key in keys {
        delete = delete.bind(key.as_str());
    }
    delete.execute(&mut *conn).await?;

    for key in keys {
        if let Some(value) = meta.raw(*key) {
            sqlx::query("INSERT INTO commentmeta (comment_id, meta_key, meta_value) VALUES (?, ?, ?)")
                .bind(comment_id)
                .bind(key.as_str())
                .bind(value)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

/// Handle to the legacy comment tables.
#[derive(Clone)]
pub struct CommentStore {
    pool: SqlitePool,
}

impl CommentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_meta(&self, ids: &[i64]) -> Result<BTreeMap<i64, MetaMap>, PersistenceError> {
        if ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        let sql = format!(
            "SELECT comment_id, meta_key, meta_value FROM commentmeta \
             WHERE comment_id IN ({}) ORDER BY meta_id",
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, (i64, String, String)>(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut grouped: BTreeMap<i64, Vec<(String, String)>> = BTreeMap::new();
        for (id, key, value) in rows {
            grouped.entry(id).or_default().push((key, value));
        }
        Ok(grouped
            .into_iter()
            .map(|(id, rows)| (id, MetaMap::from_rows(rows)))
            .collect())
    }

    async fn attach_meta(&self, rows: Vec<CommentRow>) -> Result<Vec<CommentRecord>, PersistenceError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.comment_id).collect();
        let mut meta = self.load_meta(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let entries = meta.remove(&row.comment_id).unwrap_or_default();
                row.into_record(entries)
            })
            .collect()
    }

    pub async fn find(
        &self,
        comment_type: CommentType,
        post_id: u64,
        user_id: u64,
    ) -> Result<Option<CommentRecord>, PersistenceError> {
        let row: Option<CommentRow> = sqlx::query_as(
            r#"
            SELECT comment_id, comment_post_id, user_id, comment_type, comment_approved,
                   comment_content, comment_date
            FROM comments
            WHERE comment_type = ? AND comment_post_id = ? AND user_id = ?
            "#,
        )
        .bind(comment_type.as_str())
        .bind(to_db(post_id))
        .bind(to_db(user_id))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.attach_meta(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Insert a record and its family metadata unless its key is taken.
    /// Returns the new comment id, or `None` on a key conflict.
    pub async fn insert(&self, record: &CommentRecord) -> Result<Option<u64>, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<(i64,)> = sqlx::query_as(
            r#"
            INSERT INTO comments
                (comment_post_id, user_id, comment_type, comment_approved, comment_content, comment_date)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            RETURNING comment_id
            "#,
        )
        .bind(to_db(record.post_id))
        .bind(to_db(record.user_id))
        .bind(record.comment_type.as_str())
        .bind(&record.approved)
        .bind(&record.content)
        .bind(to_db(record.date))
        .fetch_optional(&mut *tx)
        .await?;

        let Some((comment_id,)) = inserted else {
            tx.rollback().await?;
            return Ok(None);
        };

        replace_meta(&mut tx, comment_id, &record.meta, record.comment_type.meta_keys()).await?;
        tx.commit().await?;
        Ok(Some(from_db(comment_id)))
    }

    /// Insert or update a record by its key, replacing the metadata under
    /// `keys` with what `record.meta` holds.
    pub async fn upsert(&self, record: &CommentRecord, keys: &[MetaKey]) -> Result<u64, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            r#"
            INSERT INTO comments
                (comment_post_id, user_id, comment_type, comment_approved, comment_content, comment_date)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (comment_post_id, user_id, comment_type)
                WHERE comment_type IN {TRACKED_TYPES_SQL}
            DO UPDATE SET
                comment_approved = excluded.comment_approved,
                comment_content = excluded.comment_content,
                comment_date = excluded.comment_date
            RETURNING comment_id
            "#
        );
        let (comment_id,): (i64,) = sqlx::query_as(&sql)
            .bind(to_db(record.post_id))
            .bind(to_db(record.user_id))
            .bind(record.comment_type.as_str())
            .bind(&record.approved)
            .bind(&record.content)
            .bind(to_db(record.date))
            .fetch_one(&mut *tx)
            .await?;

        replace_meta(&mut tx, comment_id, &record.meta, keys).await?;
        tx.commit().await?;
        Ok(from_db(comment_id))
    }

    /// Replace metadata under `keys` on an existing record, touching its
    /// date but not its status. Returns `false` when there is no record.
    pub async fn update_meta(
        &self,
        comment_type: CommentType,
        post_id: u64,
        user_id: u64,
        date: u64,
        meta: &MetaMap,
        keys: &[MetaKey],
    ) -> Result<bool, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let touched: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE comments SET comment_date = ?
            WHERE comment_type = ? AND comment_post_id = ? AND user_id = ?
            RETURNING comment_id
            "#,
        )
        .bind(to_db(date))
        .bind(comment_type.as_str())
        .bind(to_db(post_id))
        .bind(to_db(user_id))
        .fetch_optional(&mut *tx)
        .await?;

        let Some((comment_id,)) = touched else {
            tx.rollback().await?;
            return Ok(false);
        };

        replace_meta(&mut tx, comment_id, meta, keys).await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn delete(
        &self,
        comment_type: CommentType,
        post_id: u64,
        user_id: u64,
    ) -> Result<u64, PersistenceError> {
        let result = sqlx::query(
            "DELETE FROM comments WHERE comment_type = ? AND comment_post_id = ? AND user_id = ?",
        )
        .bind(comment_type.as_str())
        .bind(to_db(post_id))
        .bind(to_db(user_id))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_for_user(
        &self,
        comment_type: CommentType,
        user_id: u64,
    ) -> Result<u64, PersistenceError> {
        let result = sqlx::query("DELETE FROM comments WHERE comment_type = ? AND user_id = ?")
            .bind(comment_type.as_str())
            .bind(to_db(user_id))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Count a user's records of one type among `post_ids` whose status is
    /// one of `statuses`.
    pub async fn count_with_status(
        &self,
        comment_type: CommentType,
        user_id: u64,
        post_ids: &[u64],
        statuses: &[&str],
    ) -> Result<u64, PersistenceError> {
        if post_ids.is_empty() || statuses.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "SELECT COUNT(*) FROM comments \
             WHERE comment_type = ? AND user_id = ? \
             AND comment_post_id IN ({}) AND comment_approved IN ({})",
            placeholders(post_ids.len()),
            placeholders(statuses.len())
        );
        let mut query = sqlx::query_as::<_, (i64,)>(&sql)
            .bind(comment_type.as_str())
            .bind(to_db(user_id));
        for post_id in post_ids {
            query = query.bind(to_db(*post_id));
        }
        for status in statuses {
            query = query.bind(*status);
        }
        let row = query.fetch_one(&self.pool).await?;
        Ok(from_db(row.0))
    }

    /// Tracked records with `comment_id > cursor`, oldest first.
    pub async fn list_after(&self, cursor: u64, limit: u32) -> Result<Vec<CommentRecord>, PersistenceError> {
        let sql = format!(
            r#"
            SELECT comment_id, comment_post_id, user_id, comment_type, comment_approved,
                   comment_content, comment_date
            FROM comments
            WHERE comment_type IN {TRACKED_TYPES_SQL} AND comment_id > ?
            ORDER BY comment_id
            LIMIT ?
            "#
        );
        let rows: Vec<CommentRow> = sqlx::query_as(&sql)
            .bind(to_db(cursor))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        self.attach_meta(rows).await
    }

    /// Number of tracked records with `comment_id > cursor`.
    pub async fn count_after(&self, cursor: u64) -> Result<u64, PersistenceError> {
        let sql = format!(
            "SELECT COUNT(*) FROM comments WHERE comment_type IN {TRACKED_TYPES_SQL} AND comment_id > ?"
        );
        let row: (i64,) = sqlx::query_as(&sql)
            .bind(to_db(cursor))
            .fetch_one(&self.pool)
            .await?;
        Ok(from_db(row.0))
    }
}
