use rusqlite::{OptionalExtension, Row, params};

use crate::error::{Result, TasklaneError};
use crate::model::{Attachment, Comment};
use crate::store::db::{Db, dt_column, now_text};

const COMMENT_COLUMNS: &str = "id, task_id, author_id, body, edited, created_at, updated_at";
const ATTACHMENT_COLUMNS: &str =
    "id, task_id, uploader_id, file_name, content_type, size_bytes, storage_key, created_at";

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        author_id: row.get(2)?,
        body: row.get(3)?,
        edited: row.get(4)?,
        created_at: dt_column(row, 5)?,
        updated_at: dt_column(row, 6)?,
    })
}

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        task_id: row.get(1)?,
        uploader_id: row.get(2)?,
        file_name: row.get(3)?,
        content_type: row.get(4)?,
        size_bytes: row.get(5)?,
        storage_key: row.get(6)?,
        created_at: dt_column(row, 7)?,
    })
}

/// Attachment metadata as supplied by the client after uploading to object storage.
#[derive(Debug, Clone)]
pub struct NewAttachment<'a> {
    pub task_id: i64,
    pub uploader_id: i64,
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub size_bytes: i64,
    pub storage_key: &'a str,
}

impl Db {
    // -----------------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------------

    pub fn insert_comment(&self, task_id: i64, author_id: i64, body: &str) -> Result<Comment> {
        let now = now_text();
        self.conn.execute(
            "INSERT INTO comments (task_id, author_id, body, edited, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![task_id, author_id, body, &now],
        )?;
        self.get_comment(self.conn.last_insert_rowid())
    }

    pub fn get_comment(&self, id: i64) -> Result<Comment> {
        self.conn
            .query_row(
                &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"),
                params![id],
                comment_from_row,
            )
            .optional()?
            .ok_or(TasklaneError::CommentNotFound(id))
    }

    /// Oldest first.
    pub fn list_comments(&self, task_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE task_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![task_id], comment_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn update_comment_body(&self, id: i64, body: &str) -> Result<Comment> {
        let changes = self.conn.execute(
            "UPDATE comments SET body = ?2, edited = 1, updated_at = ?3 WHERE id = ?1",
            params![id, body, now_text()],
        )?;
        if changes == 0 {
            return Err(TasklaneError::CommentNotFound(id));
        }
        self.get_comment(id)
    }

    pub fn delete_comment(&self, id: i64) -> Result<()> {
        let changes = self
            .conn
            .execute("DELETE FROM comments WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(TasklaneError::CommentNotFound(id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Attachments
    // -----------------------------------------------------------------------

    pub fn insert_attachment(&self, new: &NewAttachment<'_>) -> Result<Attachment> {
        self.conn.execute(
            "INSERT INTO attachments (task_id, uploader_id, file_name, content_type, size_bytes, storage_key, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.task_id,
                new.uploader_id,
                new.file_name,
                new.content_type,
                new.size_bytes,
                new.storage_key,
                now_text()
            ],
        )?;
        self.get_attachment(self.conn.last_insert_rowid())
    }

    pub fn get_attachment(&self, id: i64) -> Result<Attachment> {
        self.conn
            .query_row(
                &format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?1"),
                params![id],
                attachment_from_row,
            )
            .optional()?
            .ok_or(TasklaneError::AttachmentNotFound(id))
    }

    pub fn list_attachments(&self, task_id: i64) -> Result<Vec<Attachment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE task_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![task_id], attachment_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub fn delete_attachment(&self, id: i64) -> Result<()> {
        let changes = self
            .conn
            .execute("DELETE FROM attachments WHERE id = ?1", params![id])?;
        if changes == 0 {
            return Err(TasklaneError::AttachmentNotFound(id));
        }
        Ok(())
    }
}
