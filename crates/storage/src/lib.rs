use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::{debug, warn};
use uuid::Uuid;

use shared::{
    domain::{Attachment, AttachmentId, Chapter, ChapterId, ChapterPosition, Course, CourseId, UserId},
    protocol::UpdateCourseRequest,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const COURSE_COLUMNS: &str =
    "id, owner_id, title, description, image_url, price, is_published, created_at, updated_at";
const CHAPTER_COLUMNS: &str =
    "id, course_id, title, description, video_url, position, is_published, is_free, created_at";
const ATTACHMENT_COLUMNS: &str = "id, course_id, name, url, created_at";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Result of a bulk position update. Anything but `Applied` was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReorderOutcome {
    Applied { updated: usize },
    CourseNotFound,
    NotOwner,
    ForeignChapter(ChapterId),
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_course(&self, owner_id: &UserId, title: &str) -> Result<Course> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO courses (id, owner_id, title, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {COURSE_COLUMNS}"
        ))
        .bind(CourseId::new().0)
        .bind(owner_id.as_str())
        .bind(title)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert course")?;
        course_from_row(&row)
    }

    pub async fn course(&self, course_id: CourseId) -> Result<Option<Course>> {
        let row = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?"
        ))
        .bind(course_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(course_from_row).transpose()
    }

    pub async fn course_owner(&self, course_id: CourseId) -> Result<Option<UserId>> {
        let owner: Option<String> = sqlx::query_scalar("SELECT owner_id FROM courses WHERE id = ?")
            .bind(course_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(owner.map(UserId))
    }

    pub async fn list_courses_for_owner(&self, owner_id: &UserId) -> Result<Vec<Course>> {
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses
             WHERE owner_id = ?
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(owner_id.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(course_from_row).collect()
    }

    /// Applies the fields present in `patch`; returns `None` when the course does not exist.
    pub async fn update_course(
        &self,
        course_id: CourseId,
        patch: &UpdateCourseRequest,
    ) -> Result<Option<Course>> {
        let row = sqlx::query(&format!(
            "UPDATE courses SET
                 title = COALESCE(?, title),
                 description = COALESCE(?, description),
                 image_url = COALESCE(?, image_url),
                 price = COALESCE(?, price),
                 updated_at = ?
             WHERE id = ?
             RETURNING {COURSE_COLUMNS}"
        ))
        .bind(patch.title.as_deref())
        .bind(patch.description.as_deref())
        .bind(patch.image_url.as_deref())
        .bind(patch.price)
        .bind(Utc::now())
        .bind(course_id.0)
        .fetch_optional(&self.pool)
        .await
        .context("failed to update course")?;
        row.as_ref().map(course_from_row).transpose()
    }

    /// Appends a chapter after the current last position, or at 0 for an empty course.
    pub async fn create_chapter(&self, course_id: CourseId, title: &str) -> Result<Chapter> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO chapters (id, course_id, title, position, created_at, updated_at)
             SELECT ?, ?, ?, COALESCE(MAX(position) + 1, 0), ?, ?
             FROM chapters WHERE course_id = ?
             RETURNING {CHAPTER_COLUMNS}"
        ))
        .bind(ChapterId::new().0)
        .bind(course_id.0)
        .bind(title)
        .bind(now)
        .bind(now)
        .bind(course_id.0)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert chapter")?;
        chapter_from_row(&row)
    }

    /// Chapters in display order.
    pub async fn list_chapters(&self, course_id: CourseId) -> Result<Vec<Chapter>> {
        let rows = sqlx::query(&format!(
            "SELECT {CHAPTER_COLUMNS} FROM chapters
             WHERE course_id = ?
             ORDER BY position ASC, created_at ASC, rowid ASC"
        ))
        .bind(course_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chapter_from_row).collect()
    }

    /// Writes every position in `updates` in one transaction, or none of them.
    ///
    /// The first statement touches the course row, which takes the database write
    /// lock before any validation read. A concurrent reorder therefore waits for this
    /// one to commit or roll back instead of interleaving with it.
    pub async fn reorder_chapters(
        &self,
        course_id: CourseId,
        caller: &UserId,
        updates: &[ChapterPosition],
    ) -> Result<ReorderOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to open reorder transaction")?;
        let now = Utc::now();

        let touched = sqlx::query("UPDATE courses SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(course_id.0)
            .execute(&mut *tx)
            .await
            .context("failed to lock course for reorder")?
            .rows_affected();
        if touched == 0 {
            tx.rollback().await?;
            return Ok(ReorderOutcome::CourseNotFound);
        }

        let owner: String = sqlx::query_scalar("SELECT owner_id FROM courses WHERE id = ?")
            .bind(course_id.0)
            .fetch_one(&mut *tx)
            .await?;
        if owner != caller.as_str() {
            tx.rollback().await?;
            return Ok(ReorderOutcome::NotOwner);
        }

        for update in updates {
            let changed = sqlx::query(
                "UPDATE chapters SET position = ?, updated_at = ? WHERE id = ? AND course_id = ?",
            )
            .bind(update.position)
            .bind(now)
            .bind(update.id.0)
            .bind(course_id.0)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("failed to update position of chapter {}", update.id))?
            .rows_affected();
            if changed == 0 {
                warn!(
                    course_id = %course_id,
                    chapter_id = %update.id,
                    "reorder rejected: chapter does not belong to course"
                );
                tx.rollback().await?;
                return Ok(ReorderOutcome::ForeignChapter(update.id));
            }
        }

        tx.commit().await.context("failed to commit reorder")?;
        debug!(course_id = %course_id, updated = updates.len(), "chapter positions committed");
        Ok(ReorderOutcome::Applied {
            updated: updates.len(),
        })
    }

    pub async fn add_attachment(
        &self,
        course_id: CourseId,
        name: &str,
        url: &str,
    ) -> Result<Attachment> {
        let row = sqlx::query(&format!(
            "INSERT INTO attachments (id, course_id, name, url, created_at)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {ATTACHMENT_COLUMNS}"
        ))
        .bind(AttachmentId::new().0)
        .bind(course_id.0)
        .bind(name)
        .bind(url)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("failed to insert attachment")?;
        attachment_from_row(&row)
    }

    /// Newest first.
    pub async fn list_attachments(&self, course_id: CourseId) -> Result<Vec<Attachment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments
             WHERE course_id = ?
             ORDER BY created_at DESC, rowid DESC"
        ))
        .bind(course_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(attachment_from_row).collect()
    }

    pub async fn delete_attachment(
        &self,
        course_id: CourseId,
        attachment_id: AttachmentId,
    ) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM attachments WHERE id = ? AND course_id = ?")
            .bind(attachment_id.0)
            .bind(course_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }
}

fn course_from_row(row: &SqliteRow) -> Result<Course> {
    Ok(Course {
        course_id: CourseId(row.try_get::<Uuid, _>("id")?),
        owner_id: UserId(row.try_get("owner_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        image_url: row.try_get("image_url")?,
        price: row.try_get("price")?,
        is_published: row.try_get("is_published")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn chapter_from_row(row: &SqliteRow) -> Result<Chapter> {
    Ok(Chapter {
        chapter_id: ChapterId(row.try_get::<Uuid, _>("id")?),
        course_id: CourseId(row.try_get::<Uuid, _>("course_id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        video_url: row.try_get("video_url")?,
        position: row.try_get("position")?,
        is_published: row.try_get("is_published")?,
        is_free: row.try_get("is_free")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn attachment_from_row(row: &SqliteRow) -> Result<Attachment> {
    Ok(Attachment {
        attachment_id: AttachmentId(row.try_get::<Uuid, _>("id")?),
        course_id: CourseId(row.try_get::<Uuid, _>("course_id")?),
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
